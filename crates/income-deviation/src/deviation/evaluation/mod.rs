mod policy;

pub use policy::{DeviationPolicy, MAXIMUM_ALLOWED_DEVIATION_PERCENT};

use serde::{Deserialize, Serialize};

use super::domain::{CalculationBasis, ComparisonBasis};

/// Result of pairing a calculation basis with a comparison basis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Deviation {
    pub percent: f64,
    pub acceptable: bool,
    pub calculated_total: f64,
    pub reported_total: f64,
    pub maximum_allowed_percent: f64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeviationError {
    #[error("deviation is undefined: reported income is zero while calculated income is {calculated_total}")]
    UndefinedDeviation { calculated_total: f64 },
}

/// Receives the verdict of every fresh deviation assessment.
pub trait DeviationObserver: Send + Sync {
    fn deviation_assessed(&self, acceptable: bool, deviation_percent: f64);
}

pub fn evaluate(
    calculation: &CalculationBasis,
    comparison: &ComparisonBasis,
    policy: &DeviationPolicy,
) -> Result<Deviation, DeviationError> {
    let calculated_total = calculation.total();
    let reported_total = comparison.total();

    let percent = if reported_total == 0.0 {
        if calculated_total != 0.0 {
            return Err(DeviationError::UndefinedDeviation { calculated_total });
        }
        0.0
    } else {
        (calculated_total - reported_total).abs() / reported_total * 100.0
    };

    Ok(Deviation {
        percent,
        acceptable: policy.is_acceptable(percent),
        calculated_total,
        reported_total,
        maximum_allowed_percent: policy.maximum_allowed_percent,
    })
}
