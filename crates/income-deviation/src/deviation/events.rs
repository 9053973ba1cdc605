//! Inbound payloads handed to the service once the transport has validated them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::domain::{BasisError, CalculationBasis, ComparisonBasis, PayerIncome, PayerRef, SubjectId};
use super::reconciliation::LegacyAssessment;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayerAmount {
    pub payer: PayerRef,
    pub amount: f64,
}

/// A freshly computed yearly income, per payer, for one qualifying date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationEvent {
    pub subject: SubjectId,
    pub qualifying_date: NaiveDate,
    pub payer_amounts: Vec<PayerAmount>,
}

impl CalculationEvent {
    pub fn calculation_basis(&self) -> Result<CalculationBasis, BasisError> {
        CalculationBasis::from_amounts(
            self.payer_amounts
                .iter()
                .map(|entry| (entry.payer.clone(), entry.amount)),
        )
    }
}

/// Reported monthly income answering an earlier comparison-basis request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonBasisEvent {
    pub subject: SubjectId,
    pub qualifying_date: NaiveDate,
    pub per_payer: Vec<PayerIncome>,
    /// Calculation that triggered the request; replayed once the basis is recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_calculation: Option<CalculationEvent>,
}

impl ComparisonBasisEvent {
    pub fn comparison_basis(&self) -> ComparisonBasis {
        ComparisonBasis::new(self.per_payer.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyAssessmentBatch {
    pub items: Vec<LegacyAssessment>,
}
