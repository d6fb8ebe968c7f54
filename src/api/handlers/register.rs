use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};
use utoipa::ToSchema;

use crate::api::error::{ApiError, FieldError};
use crate::api::handlers::{validate_email, validate_password, validate_username};
use crate::auth::{password, token::Role};
use crate::cli::globals::GlobalArgs;
use crate::storage::{new_account_record, with_timeout, NewAccount, Store};

#[derive(ToSchema, Deserialize, Debug)]
pub struct RegisterRequest {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    pub password: String,
    pub role: Role,
}

#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", content_type = "application/json"),
        (status = 409, description = "Username or email already taken"),
        (status = 422, description = "Invalid username, email or password"),
    ),
    tag = "accounts"
)]
// axum handler for register
#[instrument(skip_all)]
pub async fn register(
    store: Extension<Store>,
    globals: Extension<GlobalArgs>,
    payload: Option<Json<RegisterRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::Validation(vec![FieldError::new(
            "body",
            "missing or malformed JSON payload",
        )]));
    };

    let mut errors: Vec<FieldError> = Vec::new();
    errors.extend(validate_username(&request.username));
    errors.extend(validate_password(&request.password));
    if let Some(email) = &request.email {
        errors.extend(validate_email(email));
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let password_hash = password::hash(&request.password).map_err(|err| {
        tracing::error!("password hashing failed: {err}");
        ApiError::ServiceUnavailable
    })?;

    let account = new_account_record(NewAccount {
        username: request.username,
        email: request.email,
        password_hash,
        role: request.role,
    });

    with_timeout(globals.call_timeout, store.insert_account(&account)).await?;

    info!(account_id = %account.id, role = %account.role, "account registered");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": account.id,
            "username": account.username,
            "role": account.role,
        })),
    ))
}
