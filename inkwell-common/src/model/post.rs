use crate::model::{
    Id, NonBlankText, truncate_chars,
    group::{Group, GroupMarker},
    user::{User, UserMarker},
};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;
use time::OffsetDateTime;

pub const POST_PREVIEW_LEN: usize = 15;
pub const POST_IMAGE_DIR: &str = "posts/";
pub const POST_IMAGE_MAX_LEN: usize = 100;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Post {
    pub id: Id<PostMarker>,
    pub author: User,
    pub group: Option<Group>,
    pub text: NonBlankText,
    pub image: Option<PostImage>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Post {
    /// The first few characters of the text, for log lines and listings.
    #[must_use]
    pub fn preview(&self) -> &str {
        truncate_chars(self.text.get(), POST_PREVIEW_LEN)
    }

    /// Only the author may change a post; anonymous viewers never can.
    #[must_use]
    pub fn is_editable_by(&self, viewer: Option<Id<UserMarker>>) -> bool {
        viewer == Some(self.author.id)
    }
}

impl Display for Post {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.preview())
    }
}

/// The author-controlled parts of a post, as submitted on creation or edit.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct PostContent {
    pub text: NonBlankText,
    pub group: Option<Id<GroupMarker>>,
    pub image: Option<PostImage>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct CreatePost {
    pub author: Id<UserMarker>,
    pub content: PostContent,
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The post image path is invalid: {0:?}")]
pub struct InvalidPostImageError(String);

/// Stored location of a post's picture, always below `posts/`.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct PostImage(String);

impl PostImage {
    /// Places an uploaded file name under the post image directory.
    pub fn from_file_name(file_name: &str) -> Result<Self, InvalidPostImageError> {
        let valid_name = !file_name.is_empty()
            && file_name != "."
            && file_name != ".."
            && !file_name.contains(['/', '\\']);
        if !valid_name {
            return Err(InvalidPostImageError(file_name.to_owned()));
        }

        Self::from_path(format!("{POST_IMAGE_DIR}{file_name}"))
    }

    pub fn from_path(path: String) -> Result<Self, InvalidPostImageError> {
        let valid = path.len() > POST_IMAGE_DIR.len()
            && path.starts_with(POST_IMAGE_DIR)
            && path.chars().count() <= POST_IMAGE_MAX_LEN;

        if valid {
            Ok(Self(path))
        } else {
            Err(InvalidPostImageError(path))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PostImage {
    type Error = InvalidPostImageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_path(value)
    }
}

impl From<PostImage> for String {
    fn from(value: PostImage) -> Self {
        value.0
    }
}
