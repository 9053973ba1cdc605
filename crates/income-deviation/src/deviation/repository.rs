use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::assessment::Assessment;
use super::domain::{
    AssessmentId, BasisError, CalculationBasis, ComparisonBasis, ExternalKey, IncomeKind,
    MonthlyIncome, PayerIncome, PayerRef, SourceKind, SubjectId, YearMonth,
};
use super::mapping::MappingError;
use super::messages::OutboundMessage;

/// Stored shape of one assessment; enumerations are kept as wire codes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentRecord {
    pub id: AssessmentId,
    pub subject: String,
    pub qualifying_date: NaiveDate,
    pub source_code: String,
    pub created_at: NaiveDateTime,
    pub calculation_basis: Option<BTreeMap<String, f64>>,
    pub comparison_basis: Vec<PayerIncomeRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayerIncomeRecord {
    pub payer: String,
    pub incomes: Vec<MonthlyIncomeRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyIncomeRecord {
    pub amount: f64,
    pub year: i32,
    pub month: u32,
    pub kind_code: String,
    pub benefit: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error(transparent)]
    Basis(#[from] BasisError),
    #[error("stored month {year}-{month} is not a calendar month")]
    InvalidMonth { year: i32, month: u32 },
}

impl AssessmentRecord {
    pub fn restore(self) -> Result<Assessment, RestoreError> {
        let source = SourceKind::from_code(&self.source_code)?;

        let calculation_basis = self
            .calculation_basis
            .map(|amounts| {
                CalculationBasis::from_amounts(
                    amounts
                        .into_iter()
                        .map(|(payer, amount)| (PayerRef(payer), amount)),
                )
            })
            .transpose()?;

        let mut incomes = Vec::with_capacity(self.comparison_basis.len());
        for payer_income in self.comparison_basis {
            let mut entries = Vec::with_capacity(payer_income.incomes.len());
            for income in payer_income.incomes {
                let month = YearMonth::new(income.year, income.month).ok_or(
                    RestoreError::InvalidMonth {
                        year: income.year,
                        month: income.month,
                    },
                )?;
                entries.push(MonthlyIncome {
                    amount: income.amount,
                    month,
                    kind: IncomeKind::from_code(&income.kind_code)?,
                    benefit: income.benefit,
                    description: income.description,
                });
            }
            incomes.push(PayerIncome {
                payer: PayerRef(payer_income.payer),
                entries,
            });
        }

        Ok(Assessment::with_id(
            self.id,
            SubjectId(self.subject),
            self.qualifying_date,
            calculation_basis,
            ComparisonBasis::new(incomes),
            source,
            self.created_at,
        ))
    }
}

/// Storage abstraction for assessment histories and legacy key mappings.
pub trait AssessmentRepository: Send + Sync {
    fn load(
        &self,
        subject: &SubjectId,
        qualifying_date: NaiveDate,
    ) -> Result<Vec<AssessmentRecord>, RepositoryError>;
    /// Inserts new records and replaces existing ones with the same id.
    fn store(&self, records: Vec<AssessmentRecord>) -> Result<(), RepositoryError>;
    fn find_external_key(&self, key: &ExternalKey)
        -> Result<Option<AssessmentId>, RepositoryError>;
    /// Stores an imported assessment together with its external key mapping.
    fn store_imported(
        &self,
        record: AssessmentRecord,
        key: ExternalKey,
    ) -> Result<(), RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Outbound transport hook (message bus, webhook, log sink).
pub trait MessagePublisher: Send + Sync {
    fn publish(&self, message: OutboundMessage) -> Result<(), PublishError>;
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("message transport unavailable: {0}")]
    Transport(String),
}
