use utoipa::OpenApi;

use crate::api::error::FieldError;
use crate::api::handlers;
use crate::auth::token::Role;
use crate::risk::{features::FeatureVector, RiskTier};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::register::register,
        handlers::login::login,
        handlers::logout::logout,
        handlers::predict::predict,
        handlers::predict::predict_form,
        handlers::assessments::predictions_log,
        handlers::assessments::all_assessments,
        handlers::patients::patients,
        handlers::patients::patient_assessments,
        handlers::profile::profile,
        handlers::profile::update_profile,
    ),
    components(schemas(
        handlers::register::RegisterRequest,
        handlers::login::LoginRequest,
        handlers::profile::ProfileUpdate,
        FeatureVector,
        FieldError,
        RiskTier,
        Role,
    )),
    tags(
        (name = "health", description = "Service liveness"),
        (name = "accounts", description = "Registration, sessions and profiles"),
        (name = "assessments", description = "Risk predictions and history"),
        (name = "patients", description = "Doctor-facing patient roster"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_builds() {
        let doc = ApiDoc::openapi();
        let json = doc.to_json().unwrap();

        assert!(json.contains("/api/predict"));
        assert!(json.contains("/api/predictions-log"));
        assert!(json.contains("FeatureVector"));
    }
}
