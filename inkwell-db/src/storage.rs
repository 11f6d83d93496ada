//! The storage seam between the HTTP layer and a concrete database.

use async_trait::async_trait;
use inkwell_common::{
    model::{
        Id, ModelValidationError,
        auth::{AuthTokenHash, Authentication},
        comment::{Comment, CreateComment},
        feed::FeedScope,
        follow::Follow,
        group::{CreateGroup, Group, GroupMarker, GroupSlug},
        post::{CreatePost, Post, PostContent, PostMarker},
        user::{CreateUser, User, UserCredentials, UserMarker, Username},
    },
    pagination::{Page, PageWindow, Paginator},
};
use std::sync::Arc;
use thiserror::Error;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

pub type DynStorage = Arc<dyn Storage>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error("The username {0} is already taken")]
    UsernameTaken(Username),
    #[error("A group with slug {0} already exists")]
    GroupSlugTaken(GroupSlug),
    #[error("A referenced row does not exist: {0}")]
    MissingReference(String),
    #[error("Running migrations failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Sqlx(sqlx::Error),
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                DbError::MissingReference(db_err.constraint().unwrap_or_default().to_owned())
            }
            _ => DbError::Sqlx(err),
        }
    }
}

/// Persistence operations needed by the blog.
///
/// Deleting a user removes everything they own; deleting a post removes its comments;
/// deleting a group leaves its posts without a group. Post listings are always newest first.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn create_user(&self, user: &CreateUser) -> Result<User>;
    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>>;
    async fn fetch_user_by_username(&self, username: &Username) -> Result<Option<User>>;
    async fn fetch_credentials(&self, username: &Username) -> Result<Option<UserCredentials>>;
    /// Returns whether the user existed.
    async fn delete_user(&self, user_id: Id<UserMarker>) -> Result<bool>;

    async fn create_authentication(&self, authentication: &Authentication) -> Result<()>;
    async fn fetch_authentication(
        &self,
        token_hash: &AuthTokenHash,
    ) -> Result<Option<Authentication>>;

    async fn create_group(&self, group: &CreateGroup) -> Result<Group>;
    async fn fetch_group_by_slug(&self, slug: &GroupSlug) -> Result<Option<Group>>;
    /// All groups, ordered by title.
    async fn list_groups(&self) -> Result<Vec<Group>>;
    async fn delete_group(&self, group_id: Id<GroupMarker>) -> Result<bool>;

    async fn create_post(&self, post: &CreatePost) -> Result<Post>;
    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>>;
    /// Replaces the author-controlled content of a post. `None` if there is no such post.
    async fn update_post(
        &self,
        post_id: Id<PostMarker>,
        content: &PostContent,
    ) -> Result<Option<Post>>;
    async fn delete_post(&self, post_id: Id<PostMarker>) -> Result<bool>;
    async fn count_posts(&self, scope: FeedScope) -> Result<u64>;
    async fn fetch_posts(&self, scope: FeedScope, window: PageWindow) -> Result<Vec<Post>>;

    async fn create_comment(&self, comment: &CreateComment) -> Result<Comment>;
    /// Comments on a post, oldest first.
    async fn fetch_post_comments(&self, post_id: Id<PostMarker>) -> Result<Vec<Comment>>;

    async fn follow_exists(&self, follow: Follow) -> Result<bool>;
    /// Returns whether a new relation was stored; an existing one is left alone.
    async fn create_follow(&self, follow: Follow) -> Result<bool>;
    /// Returns whether a relation was removed.
    async fn delete_follow(&self, follow: Follow) -> Result<bool>;

    /// Counts the posts in `scope` and loads the requested page of them.
    async fn fetch_feed_page(
        &self,
        scope: FeedScope,
        paginator: Paginator,
        requested_page: Option<&str>,
    ) -> Result<Page<Post>> {
        let count = self.count_posts(scope).await?;
        let window = paginator.window(count, requested_page);
        let posts = if window.is_empty() {
            Vec::new()
        } else {
            self.fetch_posts(scope, window).await?
        };

        Ok(Page::new(window, posts))
    }
}
