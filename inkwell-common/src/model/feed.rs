use crate::model::{Id, group::GroupMarker, user::UserMarker};

/// Which posts a feed is assembled from.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum FeedScope {
    All,
    Group(Id<GroupMarker>),
    Author(Id<UserMarker>),
    /// Posts by every author the given user follows.
    FollowedBy(Id<UserMarker>),
}
