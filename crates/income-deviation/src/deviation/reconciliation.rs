//! Import of assessments produced by the legacy systems.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::assessment::Assessment;
use super::domain::{
    AssessmentId, BasisError, CalculationBasis, ComparisonBasis, ExternalKey, PayerIncome,
    SourceKind, SubjectId,
};
use super::events::PayerAmount;
use super::messages::{AssessmentImportedRecord, CalculationSummary, ComparisonSummary};

/// Assessment already evaluated by a legacy system, keyed by its qualifying condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyAssessment {
    pub external_key: ExternalKey,
    pub subject: SubjectId,
    pub qualifying_date: NaiveDate,
    pub source: SourceKind,
    pub evaluated_at: NaiveDateTime,
    #[serde(default)]
    pub deviation_percent: Option<f64>,
    #[serde(default)]
    pub calculation_total: Option<f64>,
    #[serde(default)]
    pub comparison_total: Option<f64>,
    #[serde(default)]
    pub payer_amounts: Vec<PayerAmount>,
    #[serde(default)]
    pub per_payer: Vec<PayerIncome>,
}

#[derive(Debug, thiserror::Error)]
pub enum ReconciliationError {
    #[error("legacy assessment {0} claims internal origin")]
    InternalSource(ExternalKey),
    #[error("legacy assessment {key} is missing {field}")]
    MissingField {
        key: ExternalKey,
        field: &'static str,
    },
    #[error("legacy assessment {key} has an invalid calculation basis: {source}")]
    InvalidBasis {
        key: ExternalKey,
        #[source]
        source: BasisError,
    },
}

impl LegacyAssessment {
    /// Checks the fields the import relies on before anything is stored.
    pub fn validate(&self) -> Result<(), ReconciliationError> {
        if !self.source.is_legacy() {
            return Err(ReconciliationError::InternalSource(self.external_key.clone()));
        }

        self.calculation_basis()?;

        if self.source.publishes_deviation() {
            let required = [
                ("deviation_percent", self.deviation_percent),
                ("calculation_total", self.calculation_total),
                ("comparison_total", self.comparison_total),
            ];
            for (field, value) in required {
                if value.is_none() {
                    return Err(ReconciliationError::MissingField {
                        key: self.external_key.clone(),
                        field,
                    });
                }
            }
        }

        Ok(())
    }

    fn calculation_basis(&self) -> Result<Option<CalculationBasis>, ReconciliationError> {
        if self.payer_amounts.is_empty() {
            return Ok(None);
        }

        CalculationBasis::from_amounts(
            self.payer_amounts
                .iter()
                .map(|entry| (entry.payer.clone(), entry.amount)),
        )
        .map(Some)
        .map_err(|source| ReconciliationError::InvalidBasis {
            key: self.external_key.clone(),
            source,
        })
    }

    pub fn to_assessment(&self) -> Result<Assessment, ReconciliationError> {
        Ok(Assessment::new(
            self.subject.clone(),
            self.qualifying_date,
            self.calculation_basis()?,
            ComparisonBasis::new(self.per_payer.clone()),
            self.source,
            self.evaluated_at,
        ))
    }

    /// Outbound record for the import; `None` when the source must stay unpublished.
    pub fn imported_record(
        &self,
        assessment_id: AssessmentId,
    ) -> Result<Option<AssessmentImportedRecord>, ReconciliationError> {
        if !self.source.publishes_deviation() {
            return Ok(None);
        }

        let missing = |field| ReconciliationError::MissingField {
            key: self.external_key.clone(),
            field,
        };
        let comparison = ComparisonBasis::new(self.per_payer.clone());

        Ok(Some(AssessmentImportedRecord {
            assessment_id,
            subject: self.subject.clone(),
            qualifying_date: self.qualifying_date,
            source: self.source,
            evaluated_at: self.evaluated_at,
            calculation_basis: CalculationSummary {
                total: self
                    .calculation_total
                    .ok_or_else(|| missing("calculation_total"))?,
                payer_amounts: self.payer_amounts.clone(),
            },
            comparison_basis: ComparisonSummary {
                total: self
                    .comparison_total
                    .ok_or_else(|| missing("comparison_total"))?,
                payers: ComparisonSummary::from(&comparison).payers,
            },
            deviation_percent: self
                .deviation_percent
                .ok_or_else(|| missing("deviation_percent"))?,
        }))
    }
}

/// Validates a whole batch so that a bad item never leaves a partial import behind.
pub fn validate_batch(items: &[LegacyAssessment]) -> Result<(), ReconciliationError> {
    items.iter().try_for_each(LegacyAssessment::validate)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconciliationReport {
    pub imported: Vec<AssessmentId>,
    pub skipped: Vec<ExternalKey>,
    pub published: usize,
}
