use axum::{
    extract::{Extension, Query},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::instrument;
use utoipa::IntoParams;

use crate::api::error::{ApiError, FieldError};
use crate::auth::{Doctor, SessionClaims};
use crate::cli::globals::GlobalArgs;
use crate::risk::RiskTier;
use crate::storage::{with_timeout, Assessment, AssessmentFilter, Page, Store};

#[derive(Debug, Deserialize, IntoParams)]
pub struct HistoryQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// Risk tier filter: LOW, MEDIUM or HIGH.
    pub risk: Option<String>,
    /// Inclusive lower bound, `YYYY-MM-DD`.
    pub start_date: Option<String>,
    /// Inclusive upper bound, `YYYY-MM-DD`.
    pub end_date: Option<String>,
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

fn day_end(date: NaiveDate) -> DateTime<Utc> {
    // Inclusive upper bound: last representable instant of the day
    match date.and_hms_milli_opt(23, 59, 59, 999) {
        Some(instant) => instant.and_utc(),
        None => day_start(date),
    }
}

impl HistoryQuery {
    pub(super) fn page(&self) -> Page {
        Page::new(self.page, self.per_page)
    }

    pub(super) fn filter(&self) -> Result<AssessmentFilter, ApiError> {
        let mut errors = Vec::new();

        let risk = match &self.risk {
            Some(raw) => match raw.parse::<RiskTier>() {
                Ok(tier) => Some(tier),
                Err(()) => {
                    errors.push(FieldError::new("risk", "must be LOW, MEDIUM or HIGH"));
                    None
                }
            },
            None => None,
        };

        let mut parse_date = |name: &'static str, raw: &Option<String>| {
            raw.as_deref().and_then(|raw| {
                match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                    Ok(date) => Some(date),
                    Err(_) => {
                        errors.push(FieldError::new(name, "must be a YYYY-MM-DD date"));
                        None
                    }
                }
            })
        };

        let since = parse_date("start_date", &self.start_date).map(day_start);
        let until = parse_date("end_date", &self.end_date).map(day_end);

        if !errors.is_empty() {
            return Err(ApiError::Validation(errors));
        }

        Ok(AssessmentFilter { risk, since, until })
    }
}

pub(super) fn assessment_json(assessment: &Assessment) -> Value {
    json!({
        "id": assessment.id,
        "features": assessment.features,
        "probability": assessment.probability,
        "risk_tier": assessment.risk_tier,
        "recommendation": assessment.risk_tier.recommendation(),
        "created_at": assessment.created_at,
    })
}

#[utoipa::path(
    get,
    path = "/api/predictions-log",
    params(HistoryQuery),
    responses(
        (status = 200, description = "Caller's assessment history, newest first", content_type = "application/json"),
        (status = 401, description = "No valid session"),
        (status = 422, description = "Invalid filter parameters"),
    ),
    tag = "assessments"
)]
// axum handler for the caller's own prediction history
#[instrument(skip_all)]
pub async fn predictions_log(
    claims: SessionClaims,
    store: Extension<Store>,
    globals: Extension<GlobalArgs>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = query.page();
    let filter = query.filter()?;
    let account_id = claims.account_id();

    let assessments = with_timeout(
        globals.call_timeout,
        store.find_assessments_by_account(account_id, page, &filter),
    )
    .await?;
    let total = with_timeout(
        globals.call_timeout,
        store.count_assessments(&filter, Some(account_id)),
    )
    .await?;

    let items: Vec<Value> = assessments.iter().map(assessment_json).collect();

    Ok(Json(json!({
        "assessments": items,
        "total": total,
        "page": page.number(),
        "per_page": page.size(),
        "total_pages": page.total_pages(total),
    })))
}

#[utoipa::path(
    get,
    path = "/api/assessments",
    params(HistoryQuery),
    responses(
        (status = 200, description = "All assessments with owner usernames, newest first", content_type = "application/json"),
        (status = 401, description = "No valid session"),
        (status = 403, description = "Caller is not a doctor"),
        (status = 422, description = "Invalid filter parameters"),
    ),
    tag = "assessments"
)]
// axum handler for the doctor-wide assessment view
#[instrument(skip_all)]
pub async fn all_assessments(
    Doctor(_claims): Doctor,
    store: Extension<Store>,
    globals: Extension<GlobalArgs>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = query.page();
    let filter = query.filter()?;

    let rows = with_timeout(
        globals.call_timeout,
        store.find_all_assessments(page, &filter),
    )
    .await?;
    let total = with_timeout(
        globals.call_timeout,
        store.count_assessments(&filter, None),
    )
    .await?;

    let items: Vec<Value> = rows
        .iter()
        .map(|row| {
            let mut value = assessment_json(&row.assessment);
            value["username"] = json!(row.username);
            value
        })
        .collect();

    Ok(Json(json!({
        "assessments": items,
        "total": total,
        "page": page.number(),
        "per_page": page.size(),
        "total_pages": page.total_pages(total),
    })))
}
