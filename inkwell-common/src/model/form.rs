//! Validation of user-submitted forms.
//!
//! Each form is the raw, untrusted shape of a request body. Cleaning a form either yields
//! the validated domain values or a [`FormErrors`] map of messages keyed by field name.

use crate::model::{
    Id, NonBlankText,
    auth::PASSWORD_MIN_LEN,
    group::{Group, GroupMarker},
    post::{Post, PostContent, PostImage},
    user::Username,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const REQUIRED_MESSAGE: &str = "This field is required.";
pub const INVALID_CHOICE_MESSAGE: &str =
    "Select a valid choice. That choice is not one of the available choices.";
pub const INVALID_IMAGE_MESSAGE: &str = "Enter a valid image file name.";
pub const INVALID_USERNAME_MESSAGE: &str = "Enter a valid username. This value may contain only \
    letters, numbers, and @/./+/-/_ characters.";
pub const USERNAME_TAKEN_MESSAGE: &str = "A user with that username already exists.";
pub const PASSWORD_MISMATCH_MESSAGE: &str = "The two password fields didn't match.";
pub const CONTRADICTORY_IMAGE_MESSAGE: &str =
    "Please either submit a file or check the clear checkbox, not both.";

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct FormErrors(BTreeMap<String, Vec<String>>);

impl FormErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_owned())
            .or_default()
            .push(message.into());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn field(&self, field: &str) -> &[String] {
        self.0.get(field).map_or(&[], Vec::as_slice)
    }
}

fn required_text(errors: &mut FormErrors, field: &str, value: &str) -> Option<NonBlankText> {
    let text = NonBlankText::new(value).ok();
    if text.is_none() {
        errors.add(field, REQUIRED_MESSAGE);
    }
    text
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct PostForm {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub group: Option<Id<GroupMarker>>,
    #[serde(default)]
    pub image: Option<String>,
    /// Only meaningful when editing: drop the stored image instead of keeping it.
    #[serde(default)]
    pub clear_image: bool,
}

impl PostForm {
    /// The form pre-filled from an existing post, as shown when editing it.
    #[must_use]
    pub fn from_post(post: &Post) -> Self {
        Self {
            text: post.text.get().to_owned(),
            group: post.group.as_ref().map(|group| group.id),
            image: post
                .image
                .as_ref()
                .and_then(|image| image.get().strip_prefix(crate::model::post::POST_IMAGE_DIR))
                .map(str::to_owned),
            clear_image: false,
        }
    }

    /// Validates the form; `groups` are the choices a post may be filed under.
    pub fn clean(&self, groups: &[Group]) -> Result<PostContent, FormErrors> {
        let mut errors = FormErrors::default();

        let text = required_text(&mut errors, "text", &self.text);

        if let Some(group_id) = self.group
            && !groups.iter().any(|group| group.id == group_id)
        {
            errors.add("group", INVALID_CHOICE_MESSAGE);
        }

        let image = match self.image.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(_) if self.clear_image => {
                errors.add("image", CONTRADICTORY_IMAGE_MESSAGE);
                None
            }
            Some(file_name) => PostImage::from_file_name(file_name)
                .inspect_err(|_| errors.add("image", INVALID_IMAGE_MESSAGE))
                .ok(),
        };

        match text {
            Some(text) if errors.is_empty() => Ok(PostContent {
                text,
                group: self.group,
                image,
            }),
            _ => Err(errors),
        }
    }

    /// Validates an edit of `post`. Without a new file name the stored image stays,
    /// unless `clear_image` is set.
    pub fn clean_edit(&self, groups: &[Group], post: &Post) -> Result<PostContent, FormErrors> {
        let mut content = self.clean(groups)?;
        if content.image.is_none() && !self.clear_image {
            content.image.clone_from(&post.image);
        }
        Ok(content)
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct CommentForm {
    #[serde(default)]
    pub text: String,
}

impl CommentForm {
    pub fn clean(&self) -> Result<NonBlankText, FormErrors> {
        let mut errors = FormErrors::default();
        required_text(&mut errors, "text", &self.text).ok_or(errors)
    }
}

#[derive(Clone, Eq, PartialEq, Default, Hash, Deserialize)]
pub struct SignupForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirmation: String,
}

impl std::fmt::Debug for SignupForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignupForm")
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .field("password_confirmation", &"[redacted]")
            .finish()
    }
}

/// A signup that passed validation; the password is still in plain text.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct CleanSignup {
    pub username: Username,
    pub password: String,
}

impl std::fmt::Debug for CleanSignup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanSignup")
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .finish()
    }
}

impl SignupForm {
    /// Checks everything except username uniqueness, which needs the user table.
    pub fn clean(&self) -> Result<CleanSignup, FormErrors> {
        let mut errors = FormErrors::default();

        let username = if self.username.trim().is_empty() {
            errors.add("username", REQUIRED_MESSAGE);
            None
        } else {
            Username::new(self.username.trim().to_owned())
                .inspect_err(|_| errors.add("username", INVALID_USERNAME_MESSAGE))
                .ok()
        };

        if self.password.is_empty() {
            errors.add("password", REQUIRED_MESSAGE);
        } else if self.password.chars().count() < PASSWORD_MIN_LEN {
            errors.add(
                "password",
                format!(
                    "This password is too short. It must contain at least {PASSWORD_MIN_LEN} \
                     characters."
                ),
            );
        }

        if self.password != self.password_confirmation {
            errors.add("password_confirmation", PASSWORD_MISMATCH_MESSAGE);
        }

        match username {
            Some(username) if errors.is_empty() => Ok(CleanSignup {
                username,
                password: self.password.clone(),
            }),
            _ => Err(errors),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{
        Id, NonBlankText,
        form::{
            CONTRADICTORY_IMAGE_MESSAGE, CommentForm, INVALID_CHOICE_MESSAGE,
            INVALID_IMAGE_MESSAGE, PASSWORD_MISMATCH_MESSAGE, PostForm, REQUIRED_MESSAGE,
            SignupForm,
        },
        group::{Group, GroupSlug},
        post::{Post, PostImage},
        user::{User, Username},
    };
    use time::macros::datetime;

    fn groups() -> Vec<Group> {
        vec![Group {
            id: Id::new(3),
            title: "Тестовая группа".to_owned(),
            slug: GroupSlug::new("test-slug".to_owned()).unwrap(),
            description: "Тестовое описание".to_owned(),
        }]
    }

    #[test]
    fn valid_post_form() {
        let form = PostForm {
            text: "  Новый текст ".to_owned(),
            group: Some(Id::new(3)),
            image: Some("small.gif".to_owned()),
            clear_image: false,
        };

        let content = form.clean(&groups()).unwrap();
        assert_eq!(content.text.get(), "Новый текст");
        assert_eq!(content.group, Some(Id::new(3)));
        assert_eq!(content.image.unwrap().get(), "posts/small.gif");
    }

    #[test]
    fn group_and_image_are_optional() {
        let form = PostForm {
            text: "text".to_owned(),
            group: None,
            image: Some(String::new()),
            clear_image: false,
        };

        let content = form.clean(&[]).unwrap();
        assert_eq!(content.group, None);
        assert_eq!(content.image, None);
    }

    #[test]
    fn invalid_post_form_reports_every_field() {
        let form = PostForm {
            text: "   ".to_owned(),
            group: Some(Id::new(99)),
            image: Some("../secret".to_owned()),
            clear_image: false,
        };

        let errors = form.clean(&groups()).unwrap_err();
        assert_eq!(errors.field("text"), [REQUIRED_MESSAGE]);
        assert_eq!(errors.field("group"), [INVALID_CHOICE_MESSAGE]);
        assert_eq!(errors.field("image"), [INVALID_IMAGE_MESSAGE]);
    }

    #[test]
    fn comment_form() {
        let comment = CommentForm {
            text: "Создан комментарий".to_owned(),
        };
        assert_eq!(comment.clean().unwrap().get(), "Создан комментарий");

        let errors = CommentForm::default().clean().unwrap_err();
        assert_eq!(errors.field("text"), [REQUIRED_MESSAGE]);
    }

    #[test]
    fn signup_form() {
        let form = SignupForm {
            username: "leo".to_owned(),
            password: "war and peace".to_owned(),
            password_confirmation: "war and peace".to_owned(),
        };
        let clean = form.clean().unwrap();
        assert_eq!(clean.username.get(), "leo");

        let form = SignupForm {
            username: "leo tolstoy".to_owned(),
            password: "short".to_owned(),
            password_confirmation: "shorter".to_owned(),
        };
        let errors = form.clean().unwrap_err();
        assert_eq!(errors.field("username").len(), 1);
        assert_eq!(errors.field("password").len(), 1);
        assert_eq!(
            errors.field("password_confirmation"),
            [PASSWORD_MISMATCH_MESSAGE]
        );
    }

    fn post_with_image() -> Post {
        Post {
            id: Id::new(1),
            author: User {
                id: Id::new(2),
                username: Username::new("leo".to_owned()).unwrap(),
            },
            group: None,
            text: NonBlankText::new("old text").unwrap(),
            image: Some(PostImage::from_file_name("cat.png").unwrap()),
            created_at: datetime!(2025-10-18 12:00 UTC),
        }
    }

    #[test]
    fn edit_without_new_image_keeps_the_stored_one() {
        let post = post_with_image();
        let form = PostForm {
            text: "new text".to_owned(),
            ..PostForm::default()
        };

        let content = form.clean_edit(&[], &post).unwrap();
        assert_eq!(content.text.get(), "new text");
        assert_eq!(content.image, post.image);
    }

    #[test]
    fn edit_can_replace_or_clear_the_image() {
        let post = post_with_image();

        let replaced = PostForm {
            text: "new text".to_owned(),
            image: Some("dog.png".to_owned()),
            ..PostForm::default()
        };
        let content = replaced.clean_edit(&[], &post).unwrap();
        assert_eq!(content.image.unwrap().get(), "posts/dog.png");

        let cleared = PostForm {
            text: "new text".to_owned(),
            clear_image: true,
            ..PostForm::default()
        };
        assert_eq!(cleared.clean_edit(&[], &post).unwrap().image, None);

        let contradictory = PostForm {
            text: "new text".to_owned(),
            image: Some("dog.png".to_owned()),
            clear_image: true,
            ..PostForm::default()
        };
        let errors = contradictory.clean_edit(&[], &post).unwrap_err();
        assert_eq!(errors.field("image"), [CONTRADICTORY_IMAGE_MESSAGE]);
    }

    #[test]
    fn clean_signup_debug_hides_the_password() {
        let form = SignupForm {
            username: "leo".to_owned(),
            password: "war and peace".to_owned(),
            password_confirmation: "war and peace".to_owned(),
        };

        let debug = format!("{:?}", form.clean().unwrap());
        assert!(debug.contains("leo"));
        assert!(!debug.contains("war and peace"));
    }
}
