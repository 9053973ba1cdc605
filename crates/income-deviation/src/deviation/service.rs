use std::sync::{Arc, Mutex, PoisonError};

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use super::domain::{BasisError, SubjectId};
use super::evaluation::{DeviationError, DeviationObserver, DeviationPolicy};
use super::events::{CalculationEvent, ComparisonBasisEvent, LegacyAssessmentBatch};
use super::export::{DeviationRecordBuilder, PersistenceRecordBuilder};
use super::history::{AssessmentHistory, AssessmentOutcome, ComparisonOutcome};
use super::messages::{
    count_by_name, ApprovalRequest, DeviationWarning, OutboundMessage, SubsumptionRecord,
};
use super::reconciliation::{validate_batch, ReconciliationError, ReconciliationReport};
use super::repository::{
    AssessmentRecord, AssessmentRepository, MessagePublisher, PublishError, RepositoryError,
    RestoreError,
};

/// Service composing storage, the decision algorithm, and outbound messaging.
///
/// Events for the same subject and qualifying date must be handed in one at a time, in arrival
/// order; a history is loaded, decided on, and stored without isolation.
pub struct DeviationService<R, P> {
    repository: Arc<R>,
    publisher: Arc<P>,
    policy: DeviationPolicy,
}

impl<R, P> DeviationService<R, P>
where
    R: AssessmentRepository + 'static,
    P: MessagePublisher + 'static,
{
    pub fn new(repository: Arc<R>, publisher: Arc<P>, policy: DeviationPolicy) -> Self {
        Self {
            repository,
            publisher,
            policy,
        }
    }

    /// Load the stored history for one subject and qualifying date.
    pub fn history(
        &self,
        subject: &SubjectId,
        qualifying_date: NaiveDate,
    ) -> Result<AssessmentHistory, DeviationServiceError> {
        let assessments = self
            .repository
            .load(subject, qualifying_date)?
            .into_iter()
            .map(AssessmentRecord::restore)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(
            AssessmentHistory::restore(subject.clone(), qualifying_date, assessments)
                .with_policy(self.policy),
        )
    }

    /// Decide on a freshly calculated yearly income and publish the consequences.
    pub fn handle_calculation(
        &self,
        event: CalculationEvent,
    ) -> Result<AssessmentOutcome, DeviationServiceError> {
        info!(
            subject = %event.subject,
            qualifying_date = %event.qualifying_date,
            payers = event.payer_amounts.len(),
            "handling calculation event"
        );

        let calculation_basis = event.calculation_basis()?;
        let mut history = self.history(&event.subject, event.qualifying_date)?;
        let verdicts = Arc::new(VerdictCollector::default());
        history.register(verdicts.clone());

        let outcome = history.decide_calculation(calculation_basis)?;
        let mut messages = Vec::new();

        match &outcome {
            AssessmentOutcome::NeedsComparisonBasis(request) => {
                info!(
                    window_from = %request.window_from,
                    window_to = %request.window_to,
                    "requesting comparison basis"
                );
                messages.push(OutboundMessage::ComparisonBasisNeeded {
                    subject: event.subject.clone(),
                    request: *request,
                });
            }
            AssessmentOutcome::NoNewAssessmentNeeded(current) => {
                debug!(assessment_id = %current.id(), "calculation basis unchanged");
                messages.push(OutboundMessage::ApprovalRequested(ApprovalRequest::from(
                    current,
                )));
            }
            AssessmentOutcome::DeviationAssessed(assessed) => {
                let assessment = &assessed.assessment;
                info!(
                    assessment_id = %assessment.id(),
                    deviation_percent = assessed.deviation.percent,
                    acceptable = assessed.deviation.acceptable,
                    "deviation assessed"
                );

                let mut builder = DeviationRecordBuilder::new(assessed.deviation);
                assessment.accept(&mut builder);
                if let Some(record) = builder.build() {
                    messages.push(OutboundMessage::DeviationAssessed(record));
                }
                if let Some(record) =
                    SubsumptionRecord::deviation_rule(assessment, &assessed.deviation)
                {
                    messages.push(OutboundMessage::Subsumption(record));
                }
                for (acceptable, deviation_percent) in verdicts.take() {
                    if !acceptable {
                        messages.push(OutboundMessage::DeviationWarning(DeviationWarning::new(
                            event.subject.clone(),
                            event.qualifying_date,
                            deviation_percent,
                        )));
                    }
                }
                messages.push(OutboundMessage::ApprovalRequested(ApprovalRequest::from(
                    assessment,
                )));
            }
        }

        self.persist(&history)?;
        self.publish_all(messages)?;
        Ok(outcome)
    }

    /// Record a comparison basis unless one is already assessed for the same qualifying date.
    pub fn handle_comparison_basis(
        &self,
        event: ComparisonBasisEvent,
    ) -> Result<ComparisonOutcome, DeviationServiceError> {
        let mut history = self.history(&event.subject, event.qualifying_date)?;

        match history.decide_comparison(event.comparison_basis()) {
            ComparisonOutcome::Ignored => {
                warn!(
                    subject = %event.subject,
                    qualifying_date = %event.qualifying_date,
                    "ignoring duplicate comparison basis for existing assessment"
                );
                Ok(ComparisonOutcome::Ignored)
            }
            ComparisonOutcome::Recorded(assessment) => {
                info!(
                    subject = %event.subject,
                    qualifying_date = %event.qualifying_date,
                    assessment_id = %assessment.id(),
                    "comparison basis recorded"
                );
                self.persist(&history)?;
                if let Some(pending) = event.pending_calculation {
                    self.publish_all(vec![OutboundMessage::CalculationReplay(pending)])?;
                }
                Ok(ComparisonOutcome::Recorded(assessment))
            }
        }
    }

    /// Import legacy assessments, skipping external keys that are already known.
    pub fn reconcile(
        &self,
        batch: LegacyAssessmentBatch,
    ) -> Result<ReconciliationReport, DeviationServiceError> {
        validate_batch(&batch.items)?;
        let mut report = ReconciliationReport::default();

        for item in batch.items {
            if let Some(existing) = self.repository.find_external_key(&item.external_key)? {
                debug!(
                    external_key = %item.external_key,
                    assessment_id = %existing,
                    "legacy assessment already imported"
                );
                report.skipped.push(item.external_key);
                continue;
            }

            let assessment = item.to_assessment()?;
            let mut builder = PersistenceRecordBuilder::new();
            assessment.accept(&mut builder);
            for record in builder.build() {
                self.repository
                    .store_imported(record, item.external_key.clone())?;
            }
            report.imported.push(assessment.id());

            match item.imported_record(assessment.id())? {
                Some(record) => {
                    self.publisher
                        .publish(OutboundMessage::AssessmentImported(record))?;
                    report.published += 1;
                }
                None => info!(
                    external_key = %item.external_key,
                    source = item.source.code(),
                    "stored legacy assessment without publishing deviation"
                ),
            }
        }

        info!(
            imported = report.imported.len(),
            skipped = report.skipped.len(),
            published = report.published,
            "legacy reconciliation finished"
        );
        Ok(report)
    }

    fn persist(&self, history: &AssessmentHistory) -> Result<(), DeviationServiceError> {
        let mut builder = PersistenceRecordBuilder::new();
        history.accept_added(&mut builder);
        let records = builder.build();
        if records.is_empty() {
            return Ok(());
        }

        self.repository.store(records)?;
        Ok(())
    }

    fn publish_all(&self, messages: Vec<OutboundMessage>) -> Result<(), DeviationServiceError> {
        debug!(messages = ?count_by_name(&messages), "publishing outbound messages");
        for message in messages {
            self.publisher.publish(message)?;
        }
        Ok(())
    }
}

/// Observer buffering verdicts so warnings are emitted after the decision completes.
#[derive(Default)]
struct VerdictCollector {
    verdicts: Mutex<Vec<(bool, f64)>>,
}

impl VerdictCollector {
    fn take(&self) -> Vec<(bool, f64)> {
        std::mem::take(&mut *self.verdicts.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl DeviationObserver for VerdictCollector {
    fn deviation_assessed(&self, acceptable: bool, deviation_percent: f64) {
        self.verdicts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((acceptable, deviation_percent));
    }
}

/// Error raised by the deviation service.
#[derive(Debug, thiserror::Error)]
pub enum DeviationServiceError {
    #[error(transparent)]
    Basis(#[from] BasisError),
    #[error(transparent)]
    Deviation(#[from] DeviationError),
    #[error("stored assessment could not be restored: {0}")]
    Restore(#[from] RestoreError),
    #[error(transparent)]
    Reconciliation(#[from] ReconciliationError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Publish(#[from] PublishError),
}
