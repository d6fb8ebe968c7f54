//! Assessment orchestration: validate, predict, tier, persist.
//!
//! Validation happens before the model is consulted, so an invalid request
//! never reaches the predictor and never leaves a record behind. The
//! returned [`Assessment`] is exactly what was persisted.

use chrono::Utc;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::risk::{
    features::FeatureVector,
    predictor::Predictor,
    RiskTier,
};
use crate::storage::{with_timeout, Assessment, Store};

/// Run one assessment for `account_id` from a raw feature map.
///
/// # Errors
/// - [`ApiError::Validation`] when the feature map fails validation; no
///   record is written and the predictor is not called.
/// - [`ApiError::ServiceUnavailable`] when no predictor is loaded, the
///   model fails, or persistence fails or times out.
pub async fn assess(
    store: &Store,
    predictor: Option<&dyn Predictor>,
    call_timeout: Duration,
    account_id: Uuid,
    input: &BTreeMap<String, f64>,
) -> Result<Assessment, ApiError> {
    let features = FeatureVector::from_map(input).map_err(ApiError::Validation)?;

    let Some(predictor) = predictor else {
        error!("prediction requested but no model is loaded");
        return Err(ApiError::ServiceUnavailable);
    };

    let probability = predictor.predict(&features.to_array()).map_err(|err| {
        error!("prediction failed: {err}");
        ApiError::ServiceUnavailable
    })?;

    let risk_tier = RiskTier::from_probability(probability);
    let assessment = Assessment {
        id: Uuid::new_v4(),
        account_id,
        features,
        probability,
        risk_tier,
        created_at: Utc::now(),
    };

    with_timeout(call_timeout, store.insert_assessment(&assessment)).await?;

    info!(
        assessment_id = %assessment.id,
        tier = %risk_tier,
        "assessment recorded"
    );

    Ok(assessment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::features::{sample_map, FEATURE_COUNT};
    use crate::risk::predictor::PredictError;
    use crate::storage::{sqlite::SqliteBackend, AssessmentFilter, Page};
    use std::sync::Arc;

    struct FixedPredictor(f64);

    impl Predictor for FixedPredictor {
        fn predict(&self, _features: &[f64; FEATURE_COUNT]) -> Result<f64, PredictError> {
            Ok(self.0)
        }
    }

    struct BrokenPredictor;

    impl Predictor for BrokenPredictor {
        fn predict(&self, _features: &[f64; FEATURE_COUNT]) -> Result<f64, PredictError> {
            Err(PredictError::OutOfRange(1.5))
        }
    }

    async fn memory_store() -> Store {
        Arc::new(SqliteBackend::connect("sqlite::memory:").await.unwrap())
    }

    #[tokio::test]
    async fn test_assess_persists_and_tiers() {
        let store = memory_store().await;
        let account_id = Uuid::new_v4();
        let predictor = FixedPredictor(0.72);

        let assessment = assess(
            &store,
            Some(&predictor),
            Duration::from_secs(5),
            account_id,
            &sample_map(),
        )
        .await
        .unwrap();

        assert_eq!(assessment.risk_tier, RiskTier::High);
        assert!((assessment.probability - 0.72).abs() < 1e-9);

        let stored = store
            .find_assessments_by_account(account_id, Page::default(), &AssessmentFilter::default())
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, assessment.id);
    }

    #[tokio::test]
    async fn test_invalid_input_leaves_no_record() {
        let store = memory_store().await;
        let account_id = Uuid::new_v4();
        let predictor = FixedPredictor(0.5);

        let mut map = sample_map();
        map.remove("age");

        let err = assess(
            &store,
            Some(&predictor),
            Duration::from_secs(5),
            account_id,
            &map,
        )
        .await
        .unwrap_err();

        match err {
            ApiError::Validation(fields) => {
                assert_eq!(fields[0].field, "age");
            }
            other => panic!("expected validation error, got {other:?}"),
        }

        let count = store
            .count_assessments(&AssessmentFilter::default(), Some(account_id))
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_no_predictor_is_unavailable() {
        let store = memory_store().await;

        let err = assess(
            &store,
            None,
            Duration::from_secs(5),
            Uuid::new_v4(),
            &sample_map(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ApiError::ServiceUnavailable));
    }

    #[tokio::test]
    async fn test_model_failure_is_unavailable() {
        let store = memory_store().await;

        let err = assess(
            &store,
            Some(&BrokenPredictor),
            Duration::from_secs(5),
            Uuid::new_v4(),
            &sample_map(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ApiError::ServiceUnavailable));
    }
}
