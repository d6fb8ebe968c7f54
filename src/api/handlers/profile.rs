use axum::{extract::Extension, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};
use utoipa::ToSchema;

use crate::api::error::{ApiError, FieldError};
use crate::api::handlers::{validate_email, validate_password, validate_username};
use crate::auth::{password, SessionClaims};
use crate::cli::globals::GlobalArgs;
use crate::storage::{with_timeout, AccountPatch, Store};

#[derive(ToSchema, Deserialize, Debug)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub confirm_password: Option<String>,
}

#[utoipa::path(
    get,
    path = "/profile",
    responses(
        (status = 200, description = "Caller's account details", content_type = "application/json"),
        (status = 401, description = "No valid session"),
    ),
    tag = "accounts"
)]
// axum handler for the caller's own profile; never returns the password hash
#[instrument(skip_all)]
pub async fn profile(
    claims: SessionClaims,
    store: Extension<Store>,
    globals: Extension<GlobalArgs>,
) -> Result<impl IntoResponse, ApiError> {
    let account = with_timeout(
        globals.call_timeout,
        store.find_account_by_id(claims.account_id()),
    )
    .await?
    .ok_or(ApiError::NotFound)?;

    Ok(Json(json!({
        "id": account.id,
        "username": account.username,
        "email": account.email,
        "role": account.role,
        "created_at": account.created_at,
    })))
}

#[utoipa::path(
    post,
    path = "/profile/update",
    request_body = ProfileUpdate,
    responses(
        (status = 200, description = "Profile updated", content_type = "application/json"),
        (status = 401, description = "No valid session"),
        (status = 409, description = "New username or email already taken"),
        (status = 422, description = "Invalid or mismatched fields"),
    ),
    tag = "accounts"
)]
// axum handler for profile updates
#[instrument(skip_all)]
pub async fn update_profile(
    claims: SessionClaims,
    store: Extension<Store>,
    globals: Extension<GlobalArgs>,
    payload: Option<Json<ProfileUpdate>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::Validation(vec![FieldError::new(
            "body",
            "missing or malformed JSON payload",
        )]));
    };

    let mut errors: Vec<FieldError> = Vec::new();

    if let Some(username) = &request.username {
        errors.extend(validate_username(username));
    }
    if let Some(email) = &request.email {
        errors.extend(validate_email(email));
    }

    let password_hash = match &request.password {
        Some(new_password) => {
            errors.extend(validate_password(new_password));

            if request.confirm_password.as_deref() != Some(new_password.as_str()) {
                errors.push(FieldError::new(
                    "confirm_password",
                    "does not match password",
                ));
            }

            if errors.is_empty() {
                Some(password::hash(new_password).map_err(|err| {
                    tracing::error!("password hashing failed: {err}");
                    ApiError::ServiceUnavailable
                })?)
            } else {
                None
            }
        }
        None => None,
    };

    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let patch = AccountPatch {
        username: request.username,
        email: request.email,
        password_hash,
    };

    if patch.is_empty() {
        return Err(ApiError::Validation(vec![FieldError::new(
            "body",
            "nothing to update",
        )]));
    }

    with_timeout(
        globals.call_timeout,
        store.update_account(claims.account_id(), &patch),
    )
    .await?;

    info!(account_id = %claims.account_id(), "profile updated");

    Ok(Json(json!({ "message": "profile updated" })))
}
