use crate::server::{
    Result, ServerError, ServerRouter,
    auth::AuthenticatedUser,
    extract::Json,
    routes::PageQuery,
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use inkwell_common::{
    model::{
        feed::FeedScope,
        follow::Follow,
        post::Post,
        user::{User, Username},
    },
    pagination::{Page, Paginator},
};
use inkwell_db::storage::{DynStorage, Storage};
use serde::{Deserialize, Serialize};

pub fn routes() -> ServerRouter {
    ServerRouter::new().typed_get(profile)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/profile/{username}/", rejection(ServerError))]
pub(super) struct ProfilePath {
    pub username: String,
}

/// Looks up the author a `/profile/{username}/...` route is about.
pub(super) async fn fetch_author(db: &dyn Storage, username: String) -> Result<User> {
    let Ok(valid_username) = Username::new(username.clone()) else {
        return Err(ServerError::UserByUsernameNotFound(username));
    };

    db.fetch_user_by_username(&valid_username)
        .await?
        .ok_or(ServerError::UserByUsernameNotFound(username))
}

#[derive(Clone, Debug, Serialize)]
struct Profile {
    author: User,
    page: Page<Post>,
    following: bool,
}

async fn profile(
    ProfilePath { username }: ProfilePath,
    State(db): State<DynStorage>,
    viewer: Option<AuthenticatedUser>,
    PageQuery { page }: PageQuery,
) -> Result<Json<Profile>> {
    let author = fetch_author(db.as_ref(), username).await?;

    let following = match viewer.and_then(|viewer| Follow::new(viewer.user_id(), author.id)) {
        Some(follow) => db.follow_exists(follow).await?,
        None => false,
    };

    let page = db
        .fetch_feed_page(
            FeedScope::Author(author.id),
            Paginator::default(),
            page.as_deref(),
        )
        .await?;

    Ok(Json(Profile {
        author,
        page,
        following,
    }))
}
