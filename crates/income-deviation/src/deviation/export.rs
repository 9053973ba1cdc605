//! Read-only traversal of assessments for storage and message composition.

use chrono::{NaiveDate, NaiveDateTime};

use super::domain::{AssessmentId, CalculationBasis, ComparisonBasis, SourceKind, SubjectId};
use super::evaluation::Deviation;
use super::messages::{CalculationSummary, ComparisonSummary, DeviationAssessedRecord};
use super::repository::{AssessmentRecord, MonthlyIncomeRecord, PayerIncomeRecord};

/// Borrowed snapshot of one assessment handed to visitors.
#[derive(Debug, Clone, Copy)]
pub struct AssessmentView<'a> {
    pub id: AssessmentId,
    pub subject: &'a SubjectId,
    pub qualifying_date: NaiveDate,
    pub created_at: NaiveDateTime,
    pub source: SourceKind,
    pub calculation_basis: Option<&'a CalculationBasis>,
    pub comparison_basis: &'a ComparisonBasis,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssessmentTotals {
    pub id: AssessmentId,
    pub calculation_total: Option<f64>,
    pub comparison_total: f64,
}

pub trait AssessmentVisitor {
    fn visit_assessment(&mut self, view: &AssessmentView<'_>);

    fn visit_totals(&mut self, _totals: &AssessmentTotals) {}
}

/// Collects persisted rows for every visited assessment.
#[derive(Debug, Default)]
pub struct PersistenceRecordBuilder {
    records: Vec<AssessmentRecord>,
}

impl PersistenceRecordBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(self) -> Vec<AssessmentRecord> {
        self.records
    }
}

impl AssessmentVisitor for PersistenceRecordBuilder {
    fn visit_assessment(&mut self, view: &AssessmentView<'_>) {
        let comparison_basis = view
            .comparison_basis
            .incomes()
            .iter()
            .map(|income| PayerIncomeRecord {
                payer: income.payer.0.clone(),
                incomes: income
                    .entries
                    .iter()
                    .map(|entry| MonthlyIncomeRecord {
                        amount: entry.amount,
                        year: entry.month.year(),
                        month: entry.month.month(),
                        kind_code: entry.kind.code().to_string(),
                        benefit: entry.benefit.clone(),
                        description: entry.description.clone(),
                    })
                    .collect(),
            })
            .collect();

        self.records.push(AssessmentRecord {
            id: view.id,
            subject: view.subject.0.clone(),
            qualifying_date: view.qualifying_date,
            source_code: view.source.code().to_string(),
            created_at: view.created_at,
            calculation_basis: view.calculation_basis.map(|basis| {
                basis
                    .yearly_incomes()
                    .iter()
                    .map(|(payer, amount)| (payer.0.clone(), *amount))
                    .collect()
            }),
            comparison_basis,
        });
    }
}

/// Builds the outbound record for a freshly assessed deviation.
pub struct DeviationRecordBuilder {
    deviation: Deviation,
    record: Option<DeviationAssessedRecord>,
}

impl DeviationRecordBuilder {
    pub fn new(deviation: Deviation) -> Self {
        Self {
            deviation,
            record: None,
        }
    }

    pub fn build(self) -> Option<DeviationAssessedRecord> {
        self.record
    }
}

impl AssessmentVisitor for DeviationRecordBuilder {
    fn visit_assessment(&mut self, view: &AssessmentView<'_>) {
        let Some(calculation_basis) = view.calculation_basis else {
            return;
        };

        self.record = Some(DeviationAssessedRecord {
            assessment_id: view.id,
            subject: view.subject.clone(),
            qualifying_date: view.qualifying_date,
            evaluated_at: view.created_at,
            calculation_basis: CalculationSummary::from(calculation_basis),
            comparison_basis: ComparisonSummary::from(view.comparison_basis),
            deviation_percent: self.deviation.percent,
            acceptable: self.deviation.acceptable,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deviation::assessment::Assessment;
    use crate::deviation::domain::{IncomeKind, MonthlyIncome, PayerIncome, PayerRef, YearMonth};

    fn assessment(calculation: Option<f64>) -> Assessment {
        let comparison = ComparisonBasis::new(vec![PayerIncome {
            payer: PayerRef("a1".to_string()),
            entries: vec![MonthlyIncome {
                amount: 20000.0,
                month: YearMonth::new(2018, 1).expect("valid month"),
                kind: IncomeKind::Wage,
                benefit: Some("kontantytelse".to_string()),
                description: None,
            }],
        }]);
        let calculation = calculation.map(|amount| {
            CalculationBasis::from_amounts([(PayerRef("a1".to_string()), amount)])
                .expect("basis")
        });
        Assessment::new(
            SubjectId("12345678910".to_string()),
            NaiveDate::from_ymd_opt(2018, 2, 1).expect("valid date"),
            calculation,
            comparison,
            SourceKind::Internal,
            NaiveDate::from_ymd_opt(2018, 2, 3)
                .expect("valid date")
                .and_hms_opt(8, 0, 0)
                .expect("valid time"),
        )
    }

    #[derive(Default)]
    struct TotalsCollector {
        visited: usize,
        totals: Vec<AssessmentTotals>,
    }

    impl AssessmentVisitor for TotalsCollector {
        fn visit_assessment(&mut self, _view: &AssessmentView<'_>) {
            self.visited += 1;
        }

        fn visit_totals(&mut self, totals: &AssessmentTotals) {
            self.totals.push(*totals);
        }
    }

    #[test]
    fn visitor_receives_assessment_and_totals() {
        let assessment = assessment(Some(240000.0));
        let mut collector = TotalsCollector::default();
        assessment.accept(&mut collector);

        assert_eq!(collector.visited, 1);
        assert_eq!(
            collector.totals,
            vec![AssessmentTotals {
                id: assessment.id(),
                calculation_total: Some(240000.0),
                comparison_total: 20000.0,
            }]
        );
    }

    #[test]
    fn persistence_builder_uses_wire_codes() {
        let assessment = assessment(None);
        let mut builder = PersistenceRecordBuilder::new();
        assessment.accept(&mut builder);
        let records = builder.build();

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.source_code, "SPINNVILL");
        assert!(record.calculation_basis.is_none());
        assert_eq!(record.comparison_basis[0].incomes[0].kind_code, "LOENNSINNTEKT");
        assert_eq!(
            record.comparison_basis[0].incomes[0].benefit.as_deref(),
            Some("kontantytelse")
        );
    }

    #[test]
    fn deviation_builder_skips_assessments_without_calculation() {
        let deviation = Deviation {
            percent: 0.0,
            acceptable: true,
            calculated_total: 0.0,
            reported_total: 20000.0,
            maximum_allowed_percent: 25.0,
        };
        let mut builder = DeviationRecordBuilder::new(deviation);
        assessment(None).accept(&mut builder);
        assert!(builder.build().is_none());
    }
}
