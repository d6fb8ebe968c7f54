//! Risk assessment: feature validation, the opaque predictor and the
//! probability-to-tier mapping.

pub mod features;
pub mod predictor;
pub mod service;

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use utoipa::ToSchema;

/// Risk tier derived from the predicted probability. The mapping is fixed:
/// band lower bounds are inclusive, so 0.33 and 0.67 land in the higher band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    /// Map a probability in `[0,1]` onto a tier.
    #[must_use]
    pub fn from_probability(probability: f64) -> Self {
        if probability < 0.33 {
            Self::Low
        } else if probability < 0.67 {
            Self::Medium
        } else {
            Self::High
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }

    /// Display-only guidance attached to prediction responses.
    #[must_use]
    pub const fn recommendation(self) -> &'static str {
        match self {
            Self::Low => "Continue regular health check-ups. Maintain healthy lifestyle.",
            Self::Medium => "Schedule appointment with cardiologist for further evaluation.",
            Self::High => "URGENT: Consult cardiologist immediately. Consider additional testing.",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskTier {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            _ => Err(()),
        }
    }
}
