use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::assessment::Assessment;
use super::domain::{CalculationBasis, ComparisonBasis, SourceKind, SubjectId, YearMonth};
use super::evaluation::{evaluate, Deviation, DeviationError, DeviationObserver, DeviationPolicy};
use super::export::AssessmentVisitor;

/// Length of the trailing comparison window in months.
const COMPARISON_WINDOW_MONTHS: u32 = 12;

/// Request for reported income covering the twelve months before the qualifying month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonBasisRequest {
    pub qualifying_date: NaiveDate,
    pub window_from: YearMonth,
    pub window_to: YearMonth,
}

impl ComparisonBasisRequest {
    pub fn for_qualifying_date(qualifying_date: NaiveDate) -> Self {
        let qualifying_month = YearMonth::of(qualifying_date);
        Self {
            qualifying_date,
            window_from: qualifying_month.minus_months(COMPARISON_WINDOW_MONTHS),
            window_to: qualifying_month.minus_months(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssessedDeviation {
    pub assessment: Assessment,
    pub deviation: Deviation,
}

/// What a new calculation basis led to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AssessmentOutcome {
    NeedsComparisonBasis(ComparisonBasisRequest),
    NoNewAssessmentNeeded(Assessment),
    DeviationAssessed(AssessedDeviation),
}

impl AssessmentOutcome {
    /// The assessment that stands after the decision, if any.
    pub fn current(&self) -> Option<&Assessment> {
        match self {
            AssessmentOutcome::NeedsComparisonBasis(_) => None,
            AssessmentOutcome::NoNewAssessmentNeeded(assessment) => Some(assessment),
            AssessmentOutcome::DeviationAssessed(assessed) => Some(&assessed.assessment),
        }
    }

    pub const fn label(&self) -> &'static str {
        match self {
            AssessmentOutcome::NeedsComparisonBasis(_) => "needs_comparison_basis",
            AssessmentOutcome::NoNewAssessmentNeeded(_) => "no_new_assessment_needed",
            AssessmentOutcome::DeviationAssessed(_) => "deviation_assessed",
        }
    }
}

/// What an unsolicited comparison basis led to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ComparisonOutcome {
    Recorded(Assessment),
    Ignored,
}

/// Ordered assessments for one subject and qualifying date; the last one is current.
pub struct AssessmentHistory {
    subject: SubjectId,
    qualifying_date: NaiveDate,
    assessments: Vec<Assessment>,
    restored: usize,
    policy: DeviationPolicy,
    observers: Vec<Arc<dyn DeviationObserver>>,
}

impl AssessmentHistory {
    pub fn new(subject: SubjectId, qualifying_date: NaiveDate) -> Self {
        Self::restore(subject, qualifying_date, Vec::new())
    }

    /// Rebuilds a history from stored assessments, ordered by their UTC creation time.
    pub fn restore(
        subject: SubjectId,
        qualifying_date: NaiveDate,
        mut assessments: Vec<Assessment>,
    ) -> Self {
        assessments.retain(|assessment| {
            assessment.subject() == &subject && assessment.qualifying_date() == qualifying_date
        });
        assessments.sort_by_key(Assessment::created_at);

        Self {
            subject,
            qualifying_date,
            restored: assessments.len(),
            assessments,
            policy: DeviationPolicy::default(),
            observers: Vec::new(),
        }
    }

    pub fn with_policy(mut self, policy: DeviationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn register(&mut self, observer: Arc<dyn DeviationObserver>) {
        self.observers.push(observer);
    }

    pub fn subject(&self) -> &SubjectId {
        &self.subject
    }

    pub fn qualifying_date(&self) -> NaiveDate {
        self.qualifying_date
    }

    pub fn assessments(&self) -> &[Assessment] {
        &self.assessments
    }

    /// Assessments appended since the history was restored.
    pub fn added(&self) -> &[Assessment] {
        &self.assessments[self.restored..]
    }

    pub fn current(&self) -> Option<&Assessment> {
        self.assessments.last()
    }

    pub fn is_empty(&self) -> bool {
        self.assessments.is_empty()
    }

    /// Comparison basis of the latest assessment that carries reported income.
    pub fn usable_comparison_basis(&self) -> Option<&ComparisonBasis> {
        self.assessments
            .iter()
            .rev()
            .map(Assessment::comparison_basis)
            .find(|basis| basis.has_entries())
    }

    pub fn decide_calculation(
        &mut self,
        calculation_basis: CalculationBasis,
    ) -> Result<AssessmentOutcome, DeviationError> {
        if let Some(current) = self.assessments.last() {
            if current.calculation_basis() == Some(&calculation_basis) {
                return Ok(AssessmentOutcome::NoNewAssessmentNeeded(current.clone()));
            }
        }

        let Some(comparison_basis) = self.usable_comparison_basis().cloned() else {
            return Ok(AssessmentOutcome::NeedsComparisonBasis(
                ComparisonBasisRequest::for_qualifying_date(self.qualifying_date),
            ));
        };

        let deviation = evaluate(&calculation_basis, &comparison_basis, &self.policy)?;
        let assessment = Assessment::new(
            self.subject.clone(),
            self.qualifying_date,
            Some(calculation_basis),
            comparison_basis,
            SourceKind::Internal,
            Utc::now().naive_utc(),
        );

        for observer in &self.observers {
            observer.deviation_assessed(deviation.acceptable, deviation.percent);
        }

        self.assessments.push(assessment.clone());
        Ok(AssessmentOutcome::DeviationAssessed(AssessedDeviation {
            assessment,
            deviation,
        }))
    }

    /// Records an unsolicited comparison basis unless a usable one is already held.
    pub fn decide_comparison(&mut self, comparison_basis: ComparisonBasis) -> ComparisonOutcome {
        if self.usable_comparison_basis().is_some() {
            return ComparisonOutcome::Ignored;
        }

        let assessment = Assessment::new(
            self.subject.clone(),
            self.qualifying_date,
            None,
            comparison_basis,
            SourceKind::Internal,
            Utc::now().naive_utc(),
        );
        self.assessments.push(assessment.clone());
        ComparisonOutcome::Recorded(assessment)
    }

    pub fn accept<V: AssessmentVisitor + ?Sized>(&self, visitor: &mut V) {
        for assessment in &self.assessments {
            assessment.accept(visitor);
        }
    }

    pub fn accept_added<V: AssessmentVisitor + ?Sized>(&self, visitor: &mut V) {
        for assessment in self.added() {
            assessment.accept(visitor);
        }
    }
}

impl fmt::Debug for AssessmentHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssessmentHistory")
            .field("subject", &self.subject)
            .field("qualifying_date", &self.qualifying_date)
            .field("assessments", &self.assessments)
            .field("restored", &self.restored)
            .field("observers", &self.observers.len())
            .finish()
    }
}
