//! The opaque prediction function behind the [`Predictor`] trait.
//!
//! The service treats the model as a pure `features -> probability`
//! function. The shipped implementation loads a standardizing logistic
//! model from a JSON artifact exported by the training pipeline; training
//! itself is out of scope here. A missing or unreadable artifact leaves the
//! service running without a predictor, and prediction requests fail with
//! 503 instead of a defaulted score.

use serde::Deserialize;
use std::{path::Path, sync::Arc};
use thiserror::Error;
use tracing::{info, warn};

use crate::risk::features::FEATURE_COUNT;

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("model artifact unavailable: {0}")]
    Artifact(String),
    #[error("model produced an out-of-range probability: {0}")]
    OutOfRange(f64),
}

/// Opaque prediction function: ordered feature vector in, probability out.
pub trait Predictor: Send + Sync {
    /// Predict the event probability for a validated feature vector.
    ///
    /// # Errors
    /// Returns [`PredictError`] if the model cannot produce a probability
    /// in `[0,1]`.
    fn predict(&self, features: &[f64; FEATURE_COUNT]) -> Result<f64, PredictError>;
}

/// Logistic model with per-feature standardization, as exported by the
/// training pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct LogisticModel {
    pub mean: [f64; FEATURE_COUNT],
    pub scale: [f64; FEATURE_COUNT],
    pub coefficients: [f64; FEATURE_COUNT],
    pub intercept: f64,
}

impl LogisticModel {
    /// Load the artifact from disk.
    ///
    /// # Errors
    /// Returns [`PredictError::Artifact`] if the file is missing or not a
    /// valid artifact.
    pub fn load(path: &Path) -> Result<Self, PredictError> {
        let raw = std::fs::read(path)
            .map_err(|err| PredictError::Artifact(format!("{}: {err}", path.display())))?;

        serde_json::from_slice(&raw)
            .map_err(|err| PredictError::Artifact(format!("{}: {err}", path.display())))
    }
}

impl Predictor for LogisticModel {
    fn predict(&self, features: &[f64; FEATURE_COUNT]) -> Result<f64, PredictError> {
        let mut z = self.intercept;
        for i in 0..FEATURE_COUNT {
            // Zero scale would divide by zero; treat the feature as centered only
            let scale = if self.scale[i] == 0.0 { 1.0 } else { self.scale[i] };
            let standardized = (features[i] - self.mean[i]) / scale;
            z += self.coefficients[i] * standardized;
        }

        let probability = 1.0 / (1.0 + (-z).exp());
        if !(0.0..=1.0).contains(&probability) {
            return Err(PredictError::OutOfRange(probability));
        }

        Ok(probability)
    }
}

/// Shared handle to the process-wide predictor, `None` when the artifact
/// was not available at startup.
#[derive(Clone)]
pub struct PredictorHandle(Option<Arc<dyn Predictor>>);

impl PredictorHandle {
    /// Load the model artifact if a path was configured and is readable.
    #[must_use]
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            warn!("no model artifact configured, predictions disabled");
            return Self(None);
        };

        match LogisticModel::load(path) {
            Ok(model) => {
                info!("model artifact loaded from {}", path.display());
                Self(Some(Arc::new(model)))
            }
            Err(err) => {
                warn!("{err}, predictions disabled");
                Self(None)
            }
        }
    }

    #[must_use]
    pub fn from_predictor(predictor: Arc<dyn Predictor>) -> Self {
        Self(Some(predictor))
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self(None)
    }

    #[must_use]
    pub fn get(&self) -> Option<&dyn Predictor> {
        self.0.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_model() -> LogisticModel {
        LogisticModel {
            mean: [0.0; FEATURE_COUNT],
            scale: [1.0; FEATURE_COUNT],
            coefficients: [0.0; FEATURE_COUNT],
            intercept: 0.0,
        }
    }

    #[test]
    fn test_zero_model_is_even_odds() {
        let model = identity_model();
        let probability = model.predict(&[0.0; FEATURE_COUNT]).unwrap();
        assert!((probability - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_monotonic_in_positive_coefficient() {
        let mut model = identity_model();
        model.coefficients[0] = 1.5;

        let mut low = [0.0; FEATURE_COUNT];
        let mut high = [0.0; FEATURE_COUNT];
        low[0] = -2.0;
        high[0] = 2.0;

        assert!(model.predict(&high).unwrap() > model.predict(&low).unwrap());
    }

    #[test]
    fn test_standardization_applied() {
        let mut model = identity_model();
        model.coefficients[0] = 1.0;
        model.mean[0] = 60.0;
        model.scale[0] = 10.0;

        let mut at_mean = [0.0; FEATURE_COUNT];
        at_mean[0] = 60.0;
        let probability = model.predict(&at_mean).unwrap();
        assert!((probability - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_missing_artifact() {
        let err = LogisticModel::load(Path::new("/nonexistent/model.json")).unwrap_err();
        assert!(matches!(err, PredictError::Artifact(_)));

        let handle = PredictorHandle::load(Some(Path::new("/nonexistent/model.json")));
        assert!(handle.get().is_none());
    }
}
