use axum::{
    http::{header::SET_COOKIE, HeaderMap, HeaderValue},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use tracing::instrument;

use crate::api::error::ApiError;
use crate::auth::guard::SESSION_COOKIE_NAME;
use crate::auth::SessionClaims;

#[utoipa::path(
    post,
    path = "/logout",
    responses(
        (status = 200, description = "Session cookie cleared"),
        (status = 401, description = "No valid session"),
    ),
    tag = "accounts"
)]
// axum handler for logout; tokens are stateless so logout is cookie removal
#[instrument(skip_all)]
pub async fn logout(_claims: SessionClaims) -> Result<impl IntoResponse, ApiError> {
    let cookie =
        HeaderValue::from_str(&format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; Max-Age=0"))
            .map_err(|_| ApiError::ServiceUnavailable)?;

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie);

    Ok((headers, Json(json!({ "message": "logged out" }))))
}
