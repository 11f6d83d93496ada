use crate::server::{AuthSettings, IndexCache, ServerState, auth::issue_token, routes};
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{
        HeaderValue, Method, Request, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE, LOCATION},
    },
    response::Response,
};
use inkwell_common::model::{
    Id, NonBlankText,
    auth::PasswordHash,
    group::{CreateGroup, Group, GroupMarker},
    post::{CreatePost, Post, PostContent},
    user::{CreateUser, UserMarker, Username},
};
use inkwell_db::{memory::MemoryStorage, storage::DynStorage};
use serde_json::Value;
use std::sync::{Arc, LazyLock};
use tower::ServiceExt;

static PASSWORD_HASH: LazyLock<PasswordHash> =
    LazyLock::new(|| PasswordHash::generate("correct horse").unwrap());

/// The full router over a fresh in-memory store.
pub struct TestServer {
    pub storage: DynStorage,
    app: Router,
}

impl TestServer {
    pub fn new() -> Self {
        let storage: DynStorage = Arc::new(MemoryStorage::new());
        let state = ServerState {
            storage: storage.clone(),
            index_cache: IndexCache::default(),
            auth_settings: AuthSettings::default(),
        };

        Self {
            storage,
            app: routes().with_state(state),
        }
    }

    /// Creates a user directly in storage and returns their id and a bearer token.
    pub async fn signed_up(&self, username: &str) -> (Id<UserMarker>, String) {
        let user = self
            .storage
            .create_user(&CreateUser {
                username: Username::new(username.to_owned()).unwrap(),
                password_hash: PASSWORD_HASH.clone(),
            })
            .await
            .unwrap();

        let token = issue_token(self.storage.as_ref(), user.id, AuthSettings::default())
            .await
            .unwrap();

        (user.id, token.as_token_str())
    }

    pub async fn group(&self, title: &str, slug: &str) -> Group {
        let group = CreateGroup::new(title, slug, "").unwrap();
        self.storage.create_group(&group).await.unwrap()
    }

    pub async fn post(
        &self,
        author: Id<UserMarker>,
        text: &str,
        group: Option<Id<GroupMarker>>,
    ) -> Post {
        let post = CreatePost {
            author,
            content: PostContent {
                text: NonBlankText::new(text).unwrap(),
                group,
                image: None,
            },
        };
        self.storage.create_post(&post).await.unwrap()
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<&Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
            );
        }

        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Response {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post_empty(&self, uri: &str, token: Option<&str>) -> Response {
        self.request(Method::POST, uri, token, None).await
    }

    pub async fn get_json(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        into_json(self.get(uri, token).await).await
    }

    pub async fn post_json(
        &self,
        uri: &str,
        token: Option<&str>,
        body: Value,
    ) -> (StatusCode, Value) {
        into_json(self.request(Method::POST, uri, token, Some(&body)).await).await
    }
}

/// Status and parsed body; an empty body parses as `null`.
pub async fn into_json(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

pub fn location(response: &Response) -> &str {
    response.headers()[LOCATION].to_str().unwrap()
}
