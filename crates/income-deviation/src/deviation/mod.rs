//! Deviation assessment between calculated yearly income and reported monthly income.
//!
//! A calculation event is decided against the stored history for the same subject and
//! qualifying date: the first one requests a comparison basis, an unchanged calculation basis
//! reuses the current assessment, and anything else is evaluated against the latest comparison
//! basis and appended as the new current assessment.

pub mod assessment;
pub mod domain;
pub mod evaluation;
pub mod events;
pub mod export;
pub mod history;
pub mod mapping;
pub mod messages;
pub mod reconciliation;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use assessment::Assessment;
pub use domain::{
    AssessmentId, BasisError, CalculationBasis, ComparisonBasis, ExternalKey, IncomeKind,
    MonthlyIncome, PayerIncome, PayerRef, SourceKind, SubjectId, YearMonth,
};
pub use evaluation::{
    evaluate, Deviation, DeviationError, DeviationObserver, DeviationPolicy,
    MAXIMUM_ALLOWED_DEVIATION_PERCENT,
};
pub use events::{CalculationEvent, ComparisonBasisEvent, LegacyAssessmentBatch, PayerAmount};
pub use export::{AssessmentTotals, AssessmentView, AssessmentVisitor};
pub use history::{
    AssessedDeviation, AssessmentHistory, AssessmentOutcome, ComparisonBasisRequest,
    ComparisonOutcome,
};
pub use mapping::MappingError;
pub use messages::OutboundMessage;
pub use reconciliation::{LegacyAssessment, ReconciliationError, ReconciliationReport};
pub use repository::{
    AssessmentRecord, AssessmentRepository, MessagePublisher, PublishError, RepositoryError,
    RestoreError,
};
pub use router::deviation_router;
pub use service::{DeviationService, DeviationServiceError};
