use crate::server::{
    IndexCache, Result, ServerError, ServerRouter,
    auth::AuthenticatedUser,
    extract::Json,
    routes::{FormOutcome, PageQuery, profiles::ProfilePath},
};
use axum::{
    body::Bytes,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::routing::{RouterExt, TypedPath};
use inkwell_common::{
    model::{
        Id,
        comment::{Comment, CreateComment},
        feed::FeedScope,
        form::{CommentForm, FormErrors, PostForm},
        group::Group,
        post::{CreatePost, Post, PostMarker},
    },
    pagination::{Page, Paginator},
};
use inkwell_db::storage::DynStorage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(index)
        .typed_get(post_detail)
        .typed_get(create_post_form)
        .typed_post(create_post)
        .typed_get(edit_post_form)
        .typed_post(edit_post)
        .typed_post(add_comment)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/", rejection(ServerError))]
struct IndexPath();

async fn index(
    IndexPath(): IndexPath,
    State(db): State<DynStorage>,
    State(cache): State<IndexCache>,
    PageQuery { page }: PageQuery,
) -> Result<Json<Page<Post>>> {
    if let Some(feed) = cache.get(&page).await {
        debug!(?page, "Serving cached index page");
        return Ok(Json(feed));
    }

    let feed = db
        .fetch_feed_page(FeedScope::All, Paginator::default(), page.as_deref())
        .await?;
    cache.insert(page, feed.clone()).await;

    Ok(Json(feed))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/", rejection(ServerError))]
pub(super) struct PostDetailPath {
    pub id: Id<PostMarker>,
}

#[derive(Clone, Debug, Serialize)]
struct PostDetail {
    post: Post,
    comments: Vec<Comment>,
}

async fn fetch_post(db: &DynStorage, id: Id<PostMarker>) -> Result<Post> {
    db.fetch_post(id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))
}

async fn post_detail(
    PostDetailPath { id }: PostDetailPath,
    State(db): State<DynStorage>,
) -> Result<Json<PostDetail>> {
    let post = fetch_post(&db, id).await?;
    let comments = db.fetch_post_comments(id).await?;

    Ok(Json(PostDetail { post, comments }))
}

/// Everything needed to show the post form, filled in or not.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
struct PostFormPage {
    form: PostForm,
    groups: Vec<Group>,
    is_edit: bool,
    post_id: Option<Id<PostMarker>>,
    errors: FormErrors,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/create/", rejection(ServerError))]
struct CreatePostPath();

async fn create_post_form(
    CreatePostPath(): CreatePostPath,
    State(db): State<DynStorage>,
    _user: AuthenticatedUser,
) -> Result<Json<PostFormPage>> {
    Ok(Json(PostFormPage {
        form: PostForm::default(),
        groups: db.list_groups().await?,
        is_edit: false,
        post_id: None,
        errors: FormErrors::default(),
    }))
}

async fn create_post(
    CreatePostPath(): CreatePostPath,
    State(db): State<DynStorage>,
    user: AuthenticatedUser,
    Json(form): Json<PostForm>,
) -> Result<FormOutcome<PostFormPage>> {
    let groups = db.list_groups().await?;

    let content = match form.clean(&groups) {
        Ok(content) => content,
        Err(errors) => {
            return Ok(FormOutcome::Invalid(PostFormPage {
                form,
                groups,
                is_edit: false,
                post_id: None,
                errors,
            }));
        }
    };

    let post = db
        .create_post(&CreatePost {
            author: user.user_id(),
            content,
        })
        .await?;
    info!(post_id = %post.id, author = %post.author.username, preview = %post, "Created post");

    let profile = ProfilePath {
        username: post.author.username.into_inner(),
    };
    Ok(FormOutcome::Redirect(profile.to_string()))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/edit/", rejection(ServerError))]
struct EditPostPath {
    id: Id<PostMarker>,
}

/// Loads the post if `viewer` may edit it, otherwise the redirect back to the post.
async fn editable_post(
    db: &DynStorage,
    id: Id<PostMarker>,
    viewer: Option<AuthenticatedUser>,
) -> Result<Result<Post, Redirect>> {
    let post = fetch_post(db, id).await?;

    if post.is_editable_by(viewer.map(AuthenticatedUser::user_id)) {
        Ok(Ok(post))
    } else {
        debug!(post_id = %id, viewer = ?viewer, "Refusing to edit a foreign post");
        Ok(Err(Redirect::to(&PostDetailPath { id }.to_string())))
    }
}

async fn edit_post_form(
    EditPostPath { id }: EditPostPath,
    State(db): State<DynStorage>,
    viewer: Option<AuthenticatedUser>,
) -> Result<Response> {
    let post = match editable_post(&db, id, viewer).await? {
        Ok(post) => post,
        Err(redirect) => return Ok(redirect.into_response()),
    };

    let page = PostFormPage {
        form: PostForm::from_post(&post),
        groups: db.list_groups().await?,
        is_edit: true,
        post_id: Some(id),
        errors: FormErrors::default(),
    };
    Ok(Json(page).into_response())
}

async fn edit_post(
    EditPostPath { id }: EditPostPath,
    State(db): State<DynStorage>,
    viewer: Option<AuthenticatedUser>,
    body: Bytes,
) -> Result<Response> {
    let post = match editable_post(&db, id, viewer).await? {
        Ok(post) => post,
        Err(redirect) => return Ok(redirect.into_response()),
    };

    let form: PostForm = serde_json::from_slice(&body).map_err(ServerError::FormBody)?;
    let groups = db.list_groups().await?;

    let content = match form.clean_edit(&groups, &post) {
        Ok(content) => content,
        Err(errors) => {
            let page = PostFormPage {
                form,
                groups,
                is_edit: true,
                post_id: Some(id),
                errors,
            };
            return Ok(FormOutcome::Invalid(page).into_response());
        }
    };

    let post = db
        .update_post(id, &content)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;
    info!(post_id = %post.id, preview = %post, "Edited post");

    Ok(Redirect::to(&PostDetailPath { id }.to_string()).into_response())
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/comment/", rejection(ServerError))]
struct AddCommentPath {
    id: Id<PostMarker>,
}

async fn add_comment(
    AddCommentPath { id }: AddCommentPath,
    State(db): State<DynStorage>,
    user: AuthenticatedUser,
    body: Bytes,
) -> Result<Redirect> {
    let post = fetch_post(&db, id).await?;

    // An unreadable or empty comment is dropped; the visitor just lands on the post again.
    let form: CommentForm = serde_json::from_slice(&body).unwrap_or_default();
    match form.clean() {
        Ok(text) => {
            let comment = db
                .create_comment(&CreateComment {
                    post: post.id,
                    author: user.user_id(),
                    text,
                })
                .await?;
            info!(comment_id = %comment.id, post_id = %post.id, "Added comment");
        }
        Err(errors) => debug!(post_id = %post.id, ?errors, "Ignoring invalid comment"),
    }

    Ok(Redirect::to(&PostDetailPath { id }.to_string()))
}

#[cfg(test)]
mod tests {
    use crate::server::test_support::{TestServer, into_json, location};
    use axum::http::StatusCode;
    use inkwell_common::model::form::{INVALID_CHOICE_MESSAGE, REQUIRED_MESSAGE};
    use serde_json::json;

    #[tokio::test]
    async fn index_pages_hold_ten_posts() {
        let server = TestServer::new();
        let (author, _) = server.signed_up("leo").await;
        for i in 0..13 {
            server.post(author, &format!("post number {i}"), None).await;
        }

        let (status, first) = server.get_json("/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["items"].as_array().unwrap().len(), 10);
        assert_eq!(first["items"][0]["text"], "post number 12");
        assert_eq!(first["has_next"], true);

        let (_, second) = server.get_json("/?page=2", None).await;
        assert_eq!(second["items"].as_array().unwrap().len(), 3);
        assert_eq!(second["has_previous"], true);

        let (_, clamped) = server.get_json("/?page=99", None).await;
        assert_eq!(clamped["number"], 2);

        for page in ["0", "abc"] {
            let (_, fallback) = server.get_json(&format!("/?page={page}"), None).await;
            assert_eq!(fallback["number"], 1);
        }
    }

    #[tokio::test]
    async fn index_is_served_from_cache() {
        let server = TestServer::new();
        let (author, _) = server.signed_up("leo").await;
        server.post(author, "before", None).await;

        let (_, before) = server.get_json("/", None).await;
        assert_eq!(before["count"], 1);

        server.post(author, "after", None).await;

        let (_, cached) = server.get_json("/", None).await;
        assert_eq!(cached, before);

        let (_, fresh) = server.get_json("/?page=1", None).await;
        assert_eq!(fresh["count"], 2);
    }

    #[tokio::test]
    async fn detail_shows_post_and_comments() {
        let server = TestServer::new();
        let (author, token) = server.signed_up("leo").await;
        let post = server.post(author, "hello there", None).await;

        let response = server
            .request(
                axum::http::Method::POST,
                &format!("/posts/{}/comment/", post.id),
                Some(&token),
                Some(&json!({"text": "general kenobi"})),
            )
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), format!("/posts/{}/", post.id));

        let (status, body) = server.get_json(&format!("/posts/{}/", post.id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["post"]["text"], "hello there");
        assert_eq!(body["comments"][0]["text"], "general kenobi");
        assert_eq!(body["comments"][0]["author"]["username"], "leo");
    }

    #[tokio::test]
    async fn missing_or_malformed_post_is_not_found() {
        let server = TestServer::new();

        for uri in ["/posts/999/", "/posts/abc/", "/posts/999/edit/"] {
            let (status, body) = server.get_json(uri, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(body, json!({"status": 404, "reason": "Not Found"}));
        }
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let server = TestServer::new();

        let (status, body) = server.get_json("/definitely/not/here/", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"status": 404, "reason": "Not Found"}));
    }

    #[tokio::test]
    async fn guests_are_sent_to_login() {
        let server = TestServer::new();
        let (author, _) = server.signed_up("leo").await;
        let post = server.post(author, "hello", None).await;

        let response = server.get("/create/", None).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/auth/login/?next=%2Fcreate%2F");

        let comment_uri = format!("/posts/{}/comment/", post.id);
        let response = server.post_empty(&comment_uri, None).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            location(&response),
            format!("/auth/login/?next=%2Fposts%2F{}%2Fcomment%2F", post.id)
        );
    }

    #[tokio::test]
    async fn create_form_lists_groups() {
        let server = TestServer::new();
        let (_, token) = server.signed_up("leo").await;
        server.group("Cats", "cats").await;

        let (status, body) = server.get_json("/create/", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_edit"], false);
        assert_eq!(body["groups"][0]["slug"], "cats");
        assert_eq!(body["form"]["text"], "");
    }

    #[tokio::test]
    async fn valid_post_is_created_and_redirects_to_profile() {
        let server = TestServer::new();
        let (_, token) = server.signed_up("leo").await;
        let cats = server.group("Cats", "cats").await;

        let response = server
            .request(
                axum::http::Method::POST,
                "/create/",
                Some(&token),
                Some(&json!({"text": "  a new post  ", "group": cats.id, "image": "cat.png"})),
            )
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/profile/leo/");

        let (_, profile) = server.get_json("/profile/leo/", None).await;
        let post = &profile["page"]["items"][0];
        assert_eq!(post["text"], "a new post");
        assert_eq!(post["group"]["slug"], "cats");
        assert_eq!(post["image"], "posts/cat.png");
    }

    #[tokio::test]
    async fn invalid_post_returns_the_form_with_errors() {
        let server = TestServer::new();
        let (_, token) = server.signed_up("leo").await;

        let (status, body) = server
            .post_json(
                "/create/",
                Some(&token),
                json!({"text": "   ", "group": 12345}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"]["text"][0], REQUIRED_MESSAGE);
        assert_eq!(body["errors"]["group"][0], INVALID_CHOICE_MESSAGE);
        assert_eq!(body["form"]["group"], 12345);

        let (_, feed) = server.get_json("/?page=1", None).await;
        assert_eq!(feed["count"], 0);
    }

    #[tokio::test]
    async fn author_can_edit_their_post() {
        let server = TestServer::new();
        let (author, token) = server.signed_up("leo").await;
        let post = server.post(author, "first draft", None).await;
        let edit_uri = format!("/posts/{}/edit/", post.id);

        let (status, form) = server.get_json(&edit_uri, Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(form["is_edit"], true);
        assert_eq!(form["post_id"], post.id.get());
        assert_eq!(form["form"]["text"], "first draft");

        let response = server
            .request(
                axum::http::Method::POST,
                &edit_uri,
                Some(&token),
                Some(&json!({"text": "final version"})),
            )
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), format!("/posts/{}/", post.id));

        let stored = server.storage.fetch_post(post.id).await.unwrap().unwrap();
        assert_eq!(stored.text.get(), "final version");
    }

    #[tokio::test]
    async fn text_only_edit_keeps_the_image() {
        let server = TestServer::new();
        let (_, token) = server.signed_up("leo").await;

        server
            .request(
                axum::http::Method::POST,
                "/create/",
                Some(&token),
                Some(&json!({"text": "with a picture", "image": "cat.png"})),
            )
            .await;
        let (_, profile) = server.get_json("/profile/leo/", None).await;
        let post_id = profile["page"]["items"][0]["id"].as_i64().unwrap();
        let edit_uri = format!("/posts/{post_id}/edit/");

        let response = server
            .request(
                axum::http::Method::POST,
                &edit_uri,
                Some(&token),
                Some(&json!({"text": "new text"})),
            )
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let (_, detail) = server.get_json(&format!("/posts/{post_id}/"), None).await;
        assert_eq!(detail["post"]["text"], "new text");
        assert_eq!(detail["post"]["image"], "posts/cat.png");

        server
            .request(
                axum::http::Method::POST,
                &edit_uri,
                Some(&token),
                Some(&json!({"text": "new text", "clear_image": true})),
            )
            .await;
        let (_, detail) = server.get_json(&format!("/posts/{post_id}/"), None).await;
        assert_eq!(detail["post"]["image"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn author_edit_with_blank_text_is_rejected() {
        let server = TestServer::new();
        let (author, token) = server.signed_up("leo").await;
        let post = server.post(author, "first draft", None).await;

        let (status, body) = server
            .post_json(
                &format!("/posts/{}/edit/", post.id),
                Some(&token),
                json!({"text": ""}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["is_edit"], true);
        assert_eq!(body["errors"]["text"][0], REQUIRED_MESSAGE);
    }

    #[tokio::test]
    async fn others_cannot_edit() {
        let server = TestServer::new();
        let (author, _) = server.signed_up("leo").await;
        let (_, intruder_token) = server.signed_up("mia").await;
        let post = server.post(author, "original", None).await;
        let edit_uri = format!("/posts/{}/edit/", post.id);
        let detail_uri = format!("/posts/{}/", post.id);

        for token in [Some(intruder_token.as_str()), None] {
            let response = server.get(&edit_uri, token).await;
            assert_eq!(response.status(), StatusCode::SEE_OTHER);
            assert_eq!(location(&response), detail_uri);

            let response = server
                .request(
                    axum::http::Method::POST,
                    &edit_uri,
                    token,
                    Some(&json!({"text": "vandalized"})),
                )
                .await;
            assert_eq!(response.status(), StatusCode::SEE_OTHER);
            assert_eq!(location(&response), detail_uri);
        }

        let stored = server.storage.fetch_post(post.id).await.unwrap().unwrap();
        assert_eq!(stored.text.get(), "original");
    }

    #[tokio::test]
    async fn invalid_comment_is_dropped() {
        let server = TestServer::new();
        let (author, token) = server.signed_up("leo").await;
        let post = server.post(author, "hello", None).await;
        let comment_uri = format!("/posts/{}/comment/", post.id);

        let response = server
            .request(
                axum::http::Method::POST,
                &comment_uri,
                Some(&token),
                Some(&json!({"text": "  "})),
            )
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let response = server.post_empty(&comment_uri, Some(&token)).await;
        let (status, _) = into_json(response).await;
        assert_eq!(status, StatusCode::SEE_OTHER);

        assert!(server.storage.fetch_post_comments(post.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn comment_on_missing_post_is_not_found() {
        let server = TestServer::new();
        let (_, token) = server.signed_up("leo").await;

        let response = server.post_empty("/posts/999/comment/", Some(&token)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
