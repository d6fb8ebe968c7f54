use axum::{
    extract::{Extension, Path, Query},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};
use tracing::instrument;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::handlers::assessments::{assessment_json, HistoryQuery};
use crate::auth::{token::Role, Doctor};
use crate::cli::globals::GlobalArgs;
use crate::storage::{with_timeout, Store};

#[utoipa::path(
    get,
    path = "/api/patients",
    responses(
        (status = 200, description = "Patient roster with assessment counts", content_type = "application/json"),
        (status = 401, description = "No valid session"),
        (status = 403, description = "Caller is not a doctor"),
    ),
    tag = "patients"
)]
// axum handler for the doctor's patient roster
#[instrument(skip_all)]
pub async fn patients(
    Doctor(_claims): Doctor,
    store: Extension<Store>,
    globals: Extension<GlobalArgs>,
) -> Result<impl IntoResponse, ApiError> {
    let roster = with_timeout(globals.call_timeout, store.list_patients()).await?;

    let items: Vec<Value> = roster
        .iter()
        .map(|patient| {
            json!({
                "id": patient.id,
                "username": patient.username,
                "email": patient.email,
                "created_at": patient.created_at,
                "assessments": patient.assessments,
            })
        })
        .collect();

    Ok(Json(json!({ "patients": items })))
}

#[utoipa::path(
    get,
    path = "/api/patients/{id}/assessments",
    params(
        ("id" = Uuid, Path, description = "Patient account id"),
        HistoryQuery,
    ),
    responses(
        (status = 200, description = "One patient's profile and assessment history, newest first", content_type = "application/json"),
        (status = 401, description = "No valid session"),
        (status = 403, description = "Caller is not a doctor"),
        (status = 404, description = "No patient with this id"),
        (status = 422, description = "Invalid filter parameters"),
    ),
    tag = "patients"
)]
// axum handler for the doctor's per-patient detail view
#[instrument(skip_all)]
pub async fn patient_assessments(
    Doctor(_claims): Doctor,
    store: Extension<Store>,
    globals: Extension<GlobalArgs>,
    Path(id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let account = with_timeout(globals.call_timeout, store.find_account_by_id(id))
        .await?
        .ok_or(ApiError::NotFound)?;

    // Doctor accounts are not patients; their history is not served here
    if account.role != Role::Patient {
        return Err(ApiError::NotFound);
    }

    let page = query.page();
    let filter = query.filter()?;

    let assessments = with_timeout(
        globals.call_timeout,
        store.find_assessments_by_account(id, page, &filter),
    )
    .await?;
    let total = with_timeout(
        globals.call_timeout,
        store.count_assessments(&filter, Some(id)),
    )
    .await?;

    let items: Vec<Value> = assessments.iter().map(assessment_json).collect();

    Ok(Json(json!({
        "patient": {
            "id": account.id,
            "username": account.username,
            "email": account.email,
            "created_at": account.created_at,
        },
        "assessments": items,
        "total": total,
        "page": page.number(),
        "per_page": page.size(),
        "total_pages": page.total_pages(total),
    })))
}
