use serde::{Deserialize, Serialize};

pub const MAXIMUM_ALLOWED_DEVIATION_PERCENT: f64 = 25.0;

/// Threshold for how far the calculated income may drift from reported income.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviationPolicy {
    pub maximum_allowed_percent: f64,
}

impl DeviationPolicy {
    pub fn new(maximum_allowed_percent: f64) -> Self {
        let sanitized = if maximum_allowed_percent.is_finite() && maximum_allowed_percent >= 0.0 {
            maximum_allowed_percent
        } else {
            MAXIMUM_ALLOWED_DEVIATION_PERCENT
        };

        Self {
            maximum_allowed_percent: sanitized,
        }
    }

    /// The boundary is inclusive: a deviation of exactly the maximum is acceptable.
    pub fn is_acceptable(&self, deviation_percent: f64) -> bool {
        deviation_percent <= self.maximum_allowed_percent
    }
}

impl Default for DeviationPolicy {
    fn default() -> Self {
        Self::new(MAXIMUM_ALLOWED_DEVIATION_PERCENT)
    }
}
