use crate::server::{
    AuthSettings, Result, ServerError, ServerRouter,
    auth::issue_token,
    extract::{Json, Query},
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::routing::{RouterExt, TypedPath};
use inkwell_common::model::{
    auth::PasswordHash,
    form::{FormErrors, SignupForm, USERNAME_TAKEN_MESSAGE},
    user::{CreateUser, User, Username},
};
use inkwell_db::storage::{DbError, DynStorage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_post(signup)
        .typed_get(login_info)
        .typed_post(login)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/signup/", rejection(ServerError))]
struct SignupPath();

#[derive(Clone, Debug, Serialize)]
struct SignedUp {
    user: User,
    token: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Serialize)]
struct SignupErrors {
    errors: FormErrors,
}

fn invalid_signup(errors: FormErrors) -> Response {
    (StatusCode::BAD_REQUEST, Json(SignupErrors { errors })).into_response()
}

async fn signup(
    SignupPath(): SignupPath,
    State(db): State<DynStorage>,
    State(auth_settings): State<AuthSettings>,
    Json(form): Json<SignupForm>,
) -> Result<Response> {
    let signup = match form.clean() {
        Ok(signup) => signup,
        Err(errors) => return Ok(invalid_signup(errors)),
    };

    let create_user = CreateUser {
        username: signup.username,
        password_hash: PasswordHash::generate(&signup.password)?,
    };

    let user = match db.create_user(&create_user).await {
        Ok(user) => user,
        Err(DbError::UsernameTaken(username)) => {
            debug!(%username, "Signup with a taken username");
            let mut errors = FormErrors::default();
            errors.add("username", USERNAME_TAKEN_MESSAGE);
            return Ok(invalid_signup(errors));
        }
        Err(err) => return Err(err.into()),
    };
    info!(user_id = %user.id, username = %user.username, "Signed up user");

    let token = issue_token(db.as_ref(), user.id, auth_settings).await?;
    let signed_up = SignedUp {
        user,
        token: token.as_token_str(),
    };

    Ok((StatusCode::CREATED, Json(signed_up)).into_response())
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/login/", rejection(ServerError))]
struct LoginPath();

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
struct LoginQuery {
    next: Option<String>,
}

/// Where login-only pages send anonymous visitors; echoes back where they came from.
async fn login_info(
    LoginPath(): LoginPath,
    Query(query): Query<LoginQuery>,
) -> Json<LoginQuery> {
    Json(query)
}

#[derive(Clone, Eq, PartialEq, Hash, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Clone, Debug, Serialize)]
struct LoggedIn {
    token: String,
}

async fn login(
    LoginPath(): LoginPath,
    State(db): State<DynStorage>,
    State(auth_settings): State<AuthSettings>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoggedIn>> {
    let username = Username::new(request.username).map_err(|_| ServerError::InvalidCredentials)?;

    let credentials = db
        .fetch_credentials(&username)
        .await?
        .ok_or(ServerError::InvalidCredentials)?;

    if !credentials.password_hash.verify(&request.password)? {
        return Err(ServerError::InvalidCredentials);
    }

    let token = issue_token(db.as_ref(), credentials.user.id, auth_settings).await?;
    info!(user_id = %credentials.user.id, "User logged in");

    Ok(Json(LoggedIn {
        token: token.as_token_str(),
    }))
}
