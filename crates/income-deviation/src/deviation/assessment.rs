use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use super::domain::{AssessmentId, CalculationBasis, ComparisonBasis, SourceKind, SubjectId};
use super::export::{AssessmentTotals, AssessmentView, AssessmentVisitor};

/// One pairing of a calculation basis with a comparison basis. Never mutated once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assessment {
    id: AssessmentId,
    subject: SubjectId,
    qualifying_date: NaiveDate,
    calculation_basis: Option<CalculationBasis>,
    comparison_basis: ComparisonBasis,
    source: SourceKind,
    created_at: NaiveDateTime,
}

impl Assessment {
    pub fn new(
        subject: SubjectId,
        qualifying_date: NaiveDate,
        calculation_basis: Option<CalculationBasis>,
        comparison_basis: ComparisonBasis,
        source: SourceKind,
        created_at: NaiveDateTime,
    ) -> Self {
        Self::with_id(
            AssessmentId::generate(),
            subject,
            qualifying_date,
            calculation_basis,
            comparison_basis,
            source,
            created_at,
        )
    }

    pub fn with_id(
        id: AssessmentId,
        subject: SubjectId,
        qualifying_date: NaiveDate,
        calculation_basis: Option<CalculationBasis>,
        comparison_basis: ComparisonBasis,
        source: SourceKind,
        created_at: NaiveDateTime,
    ) -> Self {
        Self {
            id,
            subject,
            qualifying_date,
            calculation_basis,
            comparison_basis,
            source,
            created_at,
        }
    }

    pub fn id(&self) -> AssessmentId {
        self.id
    }

    pub fn subject(&self) -> &SubjectId {
        &self.subject
    }

    pub fn qualifying_date(&self) -> NaiveDate {
        self.qualifying_date
    }

    /// `None` until a calculation basis has been evaluated against the comparison basis.
    pub fn calculation_basis(&self) -> Option<&CalculationBasis> {
        self.calculation_basis.as_ref()
    }

    pub fn comparison_basis(&self) -> &ComparisonBasis {
        &self.comparison_basis
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }

    pub fn created_at(&self) -> NaiveDateTime {
        self.created_at
    }

    pub fn accept<V: AssessmentVisitor + ?Sized>(&self, visitor: &mut V) {
        visitor.visit_assessment(&AssessmentView {
            id: self.id,
            subject: &self.subject,
            qualifying_date: self.qualifying_date,
            created_at: self.created_at,
            source: self.source,
            calculation_basis: self.calculation_basis.as_ref(),
            comparison_basis: &self.comparison_basis,
        });
        visitor.visit_totals(&AssessmentTotals {
            id: self.id,
            calculation_total: self.calculation_basis.as_ref().map(CalculationBasis::total),
            comparison_total: self.comparison_basis.total(),
        });
    }
}
