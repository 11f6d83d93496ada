use crate::server::{
    Result, ServerError, ServerRouter,
    extract::Json,
    routes::PageQuery,
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use inkwell_common::{
    model::{
        feed::FeedScope,
        group::{Group, GroupSlug},
        post::Post,
    },
    pagination::{Page, Paginator},
};
use inkwell_db::storage::DynStorage;
use serde::{Deserialize, Serialize};

pub fn routes() -> ServerRouter {
    ServerRouter::new().typed_get(group_posts)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/group/{slug}/", rejection(ServerError))]
struct GroupPostsPath {
    slug: String,
}

#[derive(Clone, Debug, Serialize)]
struct GroupFeed {
    group: Group,
    page: Page<Post>,
}

async fn group_posts(
    GroupPostsPath { slug }: GroupPostsPath,
    State(db): State<DynStorage>,
    PageQuery { page }: PageQuery,
) -> Result<Json<GroupFeed>> {
    // A slug that could never have been stored cannot name a group either.
    let Ok(valid_slug) = GroupSlug::new(slug.clone()) else {
        return Err(ServerError::GroupBySlugNotFound(slug));
    };

    let group = db
        .fetch_group_by_slug(&valid_slug)
        .await?
        .ok_or(ServerError::GroupBySlugNotFound(slug))?;

    let page = db
        .fetch_feed_page(
            FeedScope::Group(group.id),
            Paginator::default(),
            page.as_deref(),
        )
        .await?;

    Ok(Json(GroupFeed { group, page }))
}

#[cfg(test)]
mod tests {
    use crate::server::test_support::TestServer;
    use axum::http::StatusCode;
    use serde_json::Value;

    #[tokio::test]
    async fn group_page_lists_only_posts_of_that_group() {
        let server = TestServer::new();
        let (author, _) = server.signed_up("leo").await;
        let cats = server.group("Cats", "cats").await;
        let dogs = server.group("Dogs", "dogs").await;

        server.post(author, "meow", Some(cats.id)).await;
        server.post(author, "woof", Some(dogs.id)).await;
        server.post(author, "no group at all", None).await;

        let (status, body) = server.get_json("/group/cats/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["group"]["slug"], "cats");
        assert_eq!(body["page"]["count"], 1);

        let texts: Vec<&Value> = body["page"]["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|post| &post["text"])
            .collect();
        assert_eq!(texts, ["meow"]);
    }

    #[tokio::test]
    async fn unknown_or_malformed_slug_is_not_found() {
        let server = TestServer::new();

        let (status, body) = server.get_json("/group/nothing-here/", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], 404);

        let (status, _) = server.get_json("/group/not%20a%20slug/", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
