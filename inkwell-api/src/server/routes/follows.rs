use crate::server::{
    Result, ServerError, ServerRouter,
    auth::AuthenticatedUser,
    extract::Json,
    routes::{
        PageQuery,
        profiles::{ProfilePath, fetch_author},
    },
};
use axum::{extract::State, response::Redirect};
use axum_extra::routing::{RouterExt, TypedPath};
use inkwell_common::{
    model::{feed::FeedScope, follow::Follow, post::Post},
    pagination::{Page, Paginator},
};
use inkwell_db::storage::DynStorage;
use serde::Deserialize;
use tracing::{debug, info};

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(follow_feed)
        .typed_get(follow_author)
        .typed_post(follow_author)
        .typed_get(unfollow_author)
        .typed_post(unfollow_author)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/follow/", rejection(ServerError))]
struct FollowFeedPath();

async fn follow_feed(
    FollowFeedPath(): FollowFeedPath,
    State(db): State<DynStorage>,
    user: AuthenticatedUser,
    PageQuery { page }: PageQuery,
) -> Result<Json<Page<Post>>> {
    let feed = db
        .fetch_feed_page(
            FeedScope::FollowedBy(user.user_id()),
            Paginator::default(),
            page.as_deref(),
        )
        .await?;

    Ok(Json(feed))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/profile/{username}/follow/", rejection(ServerError))]
struct FollowPath {
    username: String,
}

async fn follow_author(
    FollowPath { username }: FollowPath,
    State(db): State<DynStorage>,
    user: AuthenticatedUser,
) -> Result<Redirect> {
    let author = fetch_author(db.as_ref(), username).await?;

    match Follow::new(user.user_id(), author.id) {
        Some(follow) => {
            if db.create_follow(follow).await? {
                info!(%follow, "Followed author");
            } else {
                debug!(%follow, "Already following");
            }
        }
        None => debug!(user_id = %author.id, "Ignoring attempt to follow oneself"),
    }

    let profile = ProfilePath {
        username: author.username.into_inner(),
    };
    Ok(Redirect::to(&profile.to_string()))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/profile/{username}/unfollow/", rejection(ServerError))]
struct UnfollowPath {
    username: String,
}

async fn unfollow_author(
    UnfollowPath { username }: UnfollowPath,
    State(db): State<DynStorage>,
    user: AuthenticatedUser,
) -> Result<Redirect> {
    let author = fetch_author(db.as_ref(), username).await?;

    if let Some(follow) = Follow::new(user.user_id(), author.id) {
        if db.delete_follow(follow).await? {
            info!(%follow, "Unfollowed author");
        } else {
            debug!(%follow, "Was not following");
        }
    }

    let profile = ProfilePath {
        username: author.username.into_inner(),
    };
    Ok(Redirect::to(&profile.to_string()))
}
