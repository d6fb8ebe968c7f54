use axum::{
    extract::{Extension, Form},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::instrument;

use crate::api::error::{ApiError, FieldError};
use crate::auth::SessionClaims;
use crate::cli::globals::GlobalArgs;
use crate::risk::{predictor::PredictorHandle, service};
use crate::storage::{Assessment, Store};

fn assessment_response(assessment: &Assessment) -> Json<serde_json::Value> {
    Json(json!({
        "id": assessment.id,
        "probability": assessment.probability,
        "risk_tier": assessment.risk_tier,
        "recommendation": assessment.risk_tier.recommendation(),
        "created_at": assessment.created_at,
    }))
}

#[utoipa::path(
    post,
    path = "/api/predict",
    responses(
        (status = 201, description = "Assessment recorded", content_type = "application/json"),
        (status = 401, description = "No valid session"),
        (status = 422, description = "Invalid feature map"),
        (status = 503, description = "Model or storage unavailable"),
    ),
    tag = "assessments"
)]
// axum handler for predict (JSON API)
#[instrument(skip_all)]
pub async fn predict(
    claims: SessionClaims,
    store: Extension<Store>,
    predictor: Extension<PredictorHandle>,
    globals: Extension<GlobalArgs>,
    payload: Option<Json<BTreeMap<String, f64>>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(features)) = payload else {
        return Err(ApiError::Validation(vec![FieldError::new(
            "body",
            "missing or malformed JSON payload",
        )]));
    };

    let assessment = service::assess(
        &store,
        predictor.get(),
        globals.call_timeout,
        claims.account_id(),
        &features,
    )
    .await?;

    Ok((StatusCode::CREATED, assessment_response(&assessment)))
}

#[utoipa::path(
    post,
    path = "/predict",
    responses(
        (status = 201, description = "Assessment recorded", content_type = "application/json"),
        (status = 401, description = "No valid session"),
        (status = 422, description = "Invalid feature values"),
        (status = 503, description = "Model or storage unavailable"),
    ),
    tag = "assessments"
)]
// axum handler for predict (HTML form submissions send strings)
#[instrument(skip_all)]
pub async fn predict_form(
    claims: SessionClaims,
    store: Extension<Store>,
    predictor: Extension<PredictorHandle>,
    globals: Extension<GlobalArgs>,
    payload: Option<Form<BTreeMap<String, String>>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Form(fields)) = payload else {
        return Err(ApiError::Validation(vec![FieldError::new(
            "body",
            "missing or malformed form payload",
        )]));
    };

    let mut features = BTreeMap::new();
    let mut errors = Vec::new();

    for (name, raw) in &fields {
        match raw.trim().parse::<f64>() {
            Ok(value) => {
                features.insert(name.clone(), value);
            }
            Err(_) => errors.push(FieldError::new(name.clone(), "must be a number")),
        }
    }

    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let assessment = service::assess(
        &store,
        predictor.get(),
        globals.call_timeout,
        claims.account_id(),
        &features,
    )
    .await?;

    Ok((StatusCode::CREATED, assessment_response(&assessment)))
}
