use crate::infra::{InMemoryAssessmentRepository, LoggingPublisher};
use chrono::{Local, NaiveDate};
use clap::Args;
use income_deviation::deviation::messages::count_by_name;
use income_deviation::deviation::{
    AssessmentOutcome, AssessmentTotals, AssessmentView, AssessmentVisitor, CalculationEvent,
    ComparisonBasisEvent, ComparisonOutcome, DeviationPolicy, DeviationService, ExternalKey,
    IncomeKind, LegacyAssessment, LegacyAssessmentBatch, MonthlyIncome, PayerAmount, PayerIncome,
    PayerRef, SourceKind, SubjectId, YearMonth,
};
use income_deviation::error::AppError;
use std::sync::Arc;

const DEMO_SUBJECT: &str = "12345678910";
const DEMO_PAYER: &str = "987654321";

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Qualifying date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) qualifying_date: Option<NaiveDate>,
    /// Calculated yearly income for the demo payer.
    #[arg(long, default_value_t = 600000.0)]
    pub(crate) calculated: f64,
    /// Reported monthly income for each of the twelve comparison months.
    #[arg(long, default_value_t = 50000.0)]
    pub(crate) monthly_reported: f64,
    /// Follow up with a revised yearly income to trigger a second assessment.
    #[arg(long)]
    pub(crate) revised: Option<f64>,
    /// Maximum allowed deviation in percent.
    #[arg(long, default_value_t = 25.0)]
    pub(crate) threshold: f64,
    /// Skip the legacy reconciliation portion of the demo.
    #[arg(long)]
    pub(crate) skip_legacy: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        qualifying_date,
        calculated,
        monthly_reported,
        revised,
        threshold,
        skip_legacy,
    } = args;

    let qualifying_date = qualifying_date.unwrap_or_else(|| Local::now().date_naive());
    let subject = SubjectId(DEMO_SUBJECT.to_string());
    let repository = Arc::new(InMemoryAssessmentRepository::default());
    let publisher = Arc::new(LoggingPublisher::default());
    let service = DeviationService::new(
        repository.clone(),
        publisher.clone(),
        DeviationPolicy::new(threshold),
    );

    println!("Income deviation demo for qualifying date {qualifying_date}");
    let calculation = calculation_event(&subject, qualifying_date, calculated);
    let outcome = service.handle_calculation(calculation.clone())?;
    describe_outcome("Initial calculation", &outcome);

    let AssessmentOutcome::NeedsComparisonBasis(request) = outcome else {
        println!("  History already populated; skipping bootstrap");
        return Ok(());
    };

    let entries = (0..12)
        .rev()
        .map(|offset| MonthlyIncome {
            amount: monthly_reported,
            month: request.window_to.minus_months(offset),
            kind: IncomeKind::Wage,
            benefit: None,
            description: None,
        })
        .collect();
    let comparison = ComparisonBasisEvent {
        subject: subject.clone(),
        qualifying_date,
        per_payer: vec![PayerIncome {
            payer: PayerRef(DEMO_PAYER.to_string()),
            entries,
        }],
        pending_calculation: Some(calculation.clone()),
    };
    match service.handle_comparison_basis(comparison)? {
        ComparisonOutcome::Recorded(assessment) => println!(
            "Comparison basis recorded as {} ({:.2} reported), calculation queued for replay",
            assessment.id(),
            assessment.comparison_basis().total()
        ),
        ComparisonOutcome::Ignored => println!("Comparison basis ignored"),
    }

    let outcome = service.handle_calculation(calculation.clone())?;
    describe_outcome("Replayed calculation", &outcome);

    let outcome = service.handle_calculation(calculation)?;
    describe_outcome("Repeated calculation", &outcome);

    if let Some(amount) = revised {
        let outcome =
            service.handle_calculation(calculation_event(&subject, qualifying_date, amount))?;
        describe_outcome("Revised calculation", &outcome);
    }

    let history = service.history(&subject, qualifying_date)?;
    let mut table = TotalsTable::default();
    history.accept(&mut table);
    println!("\nAssessment history ({} entries, last is current)", table.rows.len());
    for row in &table.rows {
        println!("  - {row}");
    }

    if !skip_legacy {
        let legacy_month = request.window_from.minus_months(1);
        let legacy_date = NaiveDate::from_ymd_opt(legacy_month.year(), legacy_month.month(), 1)
            .unwrap_or(qualifying_date);
        let batch = legacy_batch(&subject, legacy_date, monthly_reported);

        let report = service.reconcile(batch.clone())?;
        println!(
            "\nLegacy import: {} imported, {} skipped, {} published",
            report.imported.len(),
            report.skipped.len(),
            report.published
        );
        let report = service.reconcile(batch)?;
        println!(
            "Legacy import repeated: {} imported, {} skipped, {} published",
            report.imported.len(),
            report.skipped.len(),
            report.published
        );
    }

    println!("\nStored assessments: {}", repository.len());
    println!("Outbound messages:");
    for (name, count) in count_by_name(&publisher.messages()) {
        println!("  - {name}: {count}");
    }

    Ok(())
}

fn calculation_event(
    subject: &SubjectId,
    qualifying_date: NaiveDate,
    amount: f64,
) -> CalculationEvent {
    CalculationEvent {
        subject: subject.clone(),
        qualifying_date,
        payer_amounts: vec![PayerAmount {
            payer: PayerRef(DEMO_PAYER.to_string()),
            amount,
        }],
    }
}

fn describe_outcome(step: &str, outcome: &AssessmentOutcome) {
    match outcome {
        AssessmentOutcome::NeedsComparisonBasis(request) => println!(
            "{step}: comparison basis needed for {} to {}",
            request.window_from, request.window_to
        ),
        AssessmentOutcome::NoNewAssessmentNeeded(current) => {
            println!("{step}: unchanged, assessment {} stands", current.id())
        }
        AssessmentOutcome::DeviationAssessed(assessed) => println!(
            "{step}: deviation {:.2}% ({}), assessment {}",
            assessed.deviation.percent,
            if assessed.deviation.acceptable {
                "acceptable"
            } else {
                "manual review"
            },
            assessed.assessment.id()
        ),
    }
}

fn legacy_batch(
    subject: &SubjectId,
    qualifying_date: NaiveDate,
    monthly_reported: f64,
) -> LegacyAssessmentBatch {
    let evaluated_at = qualifying_date.and_hms_opt(9, 0, 0).unwrap_or_default();
    let comparison_total = monthly_reported * 12.0;
    let month = YearMonth::of(qualifying_date).minus_months(1);

    let item = |key: &str, source: SourceKind| LegacyAssessment {
        external_key: ExternalKey(key.to_string()),
        subject: subject.clone(),
        qualifying_date,
        source,
        evaluated_at,
        deviation_percent: Some(0.0),
        calculation_total: Some(comparison_total),
        comparison_total: Some(comparison_total),
        payer_amounts: vec![PayerAmount {
            payer: PayerRef(DEMO_PAYER.to_string()),
            amount: comparison_total,
        }],
        per_payer: vec![PayerIncome {
            payer: PayerRef(DEMO_PAYER.to_string()),
            entries: vec![MonthlyIncome {
                amount: comparison_total,
                month,
                kind: IncomeKind::Wage,
                benefit: None,
                description: Some("aggregated".to_string()),
            }],
        }],
    };

    LegacyAssessmentBatch {
        items: vec![
            item("legacy-primary-1", SourceKind::LegacyPrimary),
            item("legacy-secondary-1", SourceKind::LegacySecondary),
        ],
    }
}

#[derive(Default)]
struct TotalsTable {
    rows: Vec<String>,
    pending: Option<String>,
}

impl AssessmentVisitor for TotalsTable {
    fn visit_assessment(&mut self, view: &AssessmentView<'_>) {
        self.pending = Some(format!(
            "{} created {} source {}",
            view.id,
            view.created_at.format("%Y-%m-%d %H:%M:%S"),
            view.source.code()
        ));
    }

    fn visit_totals(&mut self, totals: &AssessmentTotals) {
        let header = self.pending.take().unwrap_or_else(|| totals.id.to_string());
        let calculated = totals
            .calculation_total
            .map(|total| format!("{total:.2}"))
            .unwrap_or_else(|| "none".to_string());
        self.rows.push(format!(
            "{header}: calculated {calculated}, reported {:.2}",
            totals.comparison_total
        ));
    }
}
