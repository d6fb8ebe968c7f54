use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, HeaderValue},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument};
use utoipa::ToSchema;

use crate::api::error::{ApiError, FieldError};
use crate::auth::guard::SESSION_COOKIE_NAME;
use crate::auth::{password, token::SESSION_TTL_SECONDS, TokenSigner};
use crate::cli::globals::GlobalArgs;
use crate::storage::{with_timeout, Store};

#[derive(ToSchema, Deserialize, Debug)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

pub fn session_cookie(token: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Strict; Max-Age={SESSION_TTL_SECONDS}"
    ))
    .map_err(|_| ApiError::ServiceUnavailable)
}

#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session established", content_type = "application/json"),
        (status = 401, description = "Invalid username or password"),
    ),
    tag = "accounts"
)]
// axum handler for login
#[instrument(skip_all)]
pub async fn login(
    store: Extension<Store>,
    signer: Extension<TokenSigner>,
    globals: Extension<GlobalArgs>,
    payload: Option<Json<LoginRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::Validation(vec![FieldError::new(
            "body",
            "missing or malformed JSON payload",
        )]));
    };

    let account = with_timeout(
        globals.call_timeout,
        store.find_account_by_username(&request.username),
    )
    .await?;

    // Unknown user and wrong password are indistinguishable to the caller
    let Some(account) = account else {
        debug!("login rejected: unknown username");
        return Err(ApiError::InvalidCredentials);
    };

    if !password::verify(&account.password_hash, &request.password) {
        debug!("login rejected: password mismatch");
        return Err(ApiError::InvalidCredentials);
    }

    let token = signer
        .sign(account.id, account.role, Utc::now())
        .map_err(|err| {
            tracing::error!("token signing failed: {err}");
            ApiError::ServiceUnavailable
        })?;

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, session_cookie(&token)?);

    info!(account_id = %account.id, "session established");

    Ok((
        headers,
        Json(json!({
            "token": token,
            "role": account.role,
            "username": account.username,
        })),
    ))
}
