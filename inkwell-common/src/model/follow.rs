use crate::model::{Id, user::UserMarker};
use serde::Serialize;
use std::fmt::{Display, Formatter};

/// Directed subscription of `user` to the posts of `author`.
///
/// A user can never follow themselves, so a `Follow` always relates two distinct users.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
pub struct Follow {
    user: Id<UserMarker>,
    author: Id<UserMarker>,
}

impl Follow {
    #[must_use]
    pub fn new(user: Id<UserMarker>, author: Id<UserMarker>) -> Option<Self> {
        (user != author).then_some(Self { user, author })
    }

    #[must_use]
    pub fn user(self) -> Id<UserMarker> {
        self.user
    }

    #[must_use]
    pub fn author(self) -> Id<UserMarker> {
        self.author
    }
}

impl Display for Follow {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.user, self.author)
    }
}
