use std::sync::Arc;

use super::common::*;
use crate::deviation::domain::BasisError;
use crate::deviation::evaluation::{DeviationError, DeviationPolicy};
use crate::deviation::history::{AssessmentOutcome, ComparisonOutcome};
use crate::deviation::mapping::MappingError;
use crate::deviation::messages::{OutboundMessage, DEVIATION_WARNING_CODE};
use crate::deviation::repository::{AssessmentRepository, RepositoryError, RestoreError};
use crate::deviation::service::{DeviationService, DeviationServiceError};

fn bootstrapped() -> (
    DeviationService<MemoryRepository, MemoryPublisher>,
    Arc<MemoryRepository>,
    Arc<MemoryPublisher>,
) {
    let (service, repository, publisher) = build_service();
    match service
        .handle_comparison_basis(comparison_event(50000.0))
        .expect("comparison basis handled")
    {
        ComparisonOutcome::Recorded(_) => (service, repository, publisher),
        ComparisonOutcome::Ignored => panic!("empty history must record the comparison basis"),
    }
}

#[test]
fn first_calculation_requests_comparison_basis() {
    let (service, repository, publisher) = build_service();

    let outcome = service
        .handle_calculation(calculation_event(600000.0))
        .expect("calculation handled");

    assert_eq!(outcome.label(), "needs_comparison_basis");
    assert!(repository.records().is_empty());
    match publisher.messages().as_slice() {
        [OutboundMessage::ComparisonBasisNeeded { subject: who, request }] => {
            assert_eq!(who, &subject());
            assert_eq!(request.window_from.to_string(), "2017-02");
            assert_eq!(request.window_to.to_string(), "2018-01");
        }
        other => panic!("expected a single comparison basis request, got {other:?}"),
    }
}

#[test]
fn comparison_basis_is_stored_without_messages() {
    let (_, repository, publisher) = bootstrapped();

    let records = repository.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].calculation_basis.is_none());
    assert_eq!(records[0].source_code, "SPINNVILL");
    assert_eq!(records[0].comparison_basis[0].incomes.len(), 12);
    assert!(publisher.messages().is_empty());
}

#[test]
fn pending_calculation_is_replayed_after_recording() {
    let (service, _, publisher) = build_service();
    let mut event = comparison_event(50000.0);
    event.pending_calculation = Some(calculation_event(600000.0));

    service
        .handle_comparison_basis(event)
        .expect("comparison basis handled");

    match publisher.messages().as_slice() {
        [OutboundMessage::CalculationReplay(replayed)] => {
            assert_eq!(replayed, &calculation_event(600000.0));
        }
        other => panic!("expected calculation replay, got {other:?}"),
    }
}

#[test]
fn duplicate_comparison_basis_is_ignored() {
    let (service, repository, publisher) = bootstrapped();
    let mut event = comparison_event(65000.0);
    event.pending_calculation = Some(calculation_event(600000.0));

    let outcome = service
        .handle_comparison_basis(event)
        .expect("comparison basis handled");

    assert_eq!(outcome, ComparisonOutcome::Ignored);
    assert_eq!(repository.records().len(), 1);
    assert!(publisher.messages().is_empty(), "ignored basis is not replayed");
}

#[test]
fn acceptable_assessment_publishes_record_subsumption_and_approval() {
    let (service, repository, publisher) = bootstrapped();

    let outcome = service
        .handle_calculation(calculation_event(450000.0))
        .expect("calculation handled");

    let AssessmentOutcome::DeviationAssessed(assessed) = &outcome else {
        panic!("expected a fresh assessment, got {outcome:?}");
    };
    assert_eq!(repository.records().len(), 2);
    assert_eq!(
        publisher.names(),
        vec!["deviation_assessed", "subsumption", "approval_requested"]
    );

    let messages = publisher.messages();
    let OutboundMessage::DeviationAssessed(record) = &messages[0] else {
        panic!("expected deviation record first");
    };
    assert_eq!(record.assessment_id, assessed.assessment.id());
    assert_eq!(record.deviation_percent, 25.0);
    assert!(record.acceptable);
    assert_eq!(record.calculation_basis.total, 450000.0);
    assert_eq!(record.comparison_basis.total, 600000.0);

    let OutboundMessage::ApprovalRequested(approval) = &messages[2] else {
        panic!("expected approval request last");
    };
    assert_eq!(approval.assessment_id, assessed.assessment.id());
}

#[test]
fn unacceptable_assessment_adds_warning() {
    let (service, _, publisher) = bootstrapped();

    service
        .handle_calculation(calculation_event(360000.0))
        .expect("calculation handled");

    assert_eq!(
        publisher.names(),
        vec![
            "deviation_assessed",
            "subsumption",
            "deviation_warning",
            "approval_requested"
        ]
    );
    let warning = publisher
        .messages()
        .into_iter()
        .find_map(|message| match message {
            OutboundMessage::DeviationWarning(warning) => Some(warning),
            _ => None,
        })
        .expect("warning published");
    assert_eq!(warning.code, DEVIATION_WARNING_CODE);
    assert_eq!(warning.subject, subject());
    assert!((warning.deviation_percent - 40.0).abs() < 1e-9);
}

#[test]
fn subsumption_describes_the_deviation_rule() {
    let (service, _, publisher) = bootstrapped();
    service
        .handle_calculation(calculation_event(600000.0))
        .expect("calculation handled");

    let subsumption = publisher
        .messages()
        .into_iter()
        .find_map(|message| match message {
            OutboundMessage::Subsumption(record) => Some(record),
            _ => None,
        })
        .expect("subsumption published");

    assert_eq!(subsumption.paragraph, "8-30");
    assert_eq!(subsumption.subsection, 2);
    assert_eq!(subsumption.sentence, Some(1));
    assert_eq!(subsumption.law_version.to_string(), "2019-01-01");
    assert_eq!(subsumption.input["maximum_allowed_deviation_percent"], 25.0);
    assert_eq!(subsumption.input["calculation_basis"]["total"], 600000.0);
    assert_eq!(
        subsumption.input["comparison_basis"]["reported_monthly_incomes"]
            .as_array()
            .map(Vec::len),
        Some(12)
    );
    assert_eq!(subsumption.output["deviation_percent"], 0.0);
    assert_eq!(subsumption.output["acceptable"], true);
}

#[test]
fn unchanged_calculation_only_forwards_approval() {
    let (service, repository, publisher) = bootstrapped();
    service
        .handle_calculation(calculation_event(600000.0))
        .expect("calculation handled");
    let stored = repository.records().len();
    let published = publisher.messages().len();

    let outcome = service
        .handle_calculation(calculation_event(600000.0))
        .expect("calculation handled");

    let AssessmentOutcome::NoNewAssessmentNeeded(current) = outcome else {
        panic!("expected reuse");
    };
    assert_eq!(repository.records().len(), stored);
    let messages = publisher.messages();
    assert_eq!(messages.len(), published + 1);
    match messages.last() {
        Some(OutboundMessage::ApprovalRequested(approval)) => {
            assert_eq!(approval.assessment_id, current.id());
        }
        other => panic!("expected approval request, got {other:?}"),
    }
}

#[test]
fn configured_threshold_is_applied() {
    let repository = Arc::new(MemoryRepository::default());
    let publisher = Arc::new(MemoryPublisher::default());
    let service = DeviationService::new(
        repository.clone(),
        publisher.clone(),
        DeviationPolicy::new(50.0),
    );
    service
        .handle_comparison_basis(comparison_event(50000.0))
        .expect("comparison basis handled");

    let outcome = service
        .handle_calculation(calculation_event(360000.0))
        .expect("calculation handled");

    let AssessmentOutcome::DeviationAssessed(assessed) = outcome else {
        panic!("expected a fresh assessment");
    };
    assert!(assessed.deviation.acceptable);
    assert!(!publisher.names().contains(&"deviation_warning"));
}

#[test]
fn undefined_deviation_is_reported_and_nothing_published() {
    let (service, repository, publisher) = build_service();
    service
        .handle_comparison_basis(comparison_event(0.0))
        .expect("comparison basis handled");

    let result = service.handle_calculation(calculation_event(250000.0));

    assert!(matches!(
        result,
        Err(DeviationServiceError::Deviation(
            DeviationError::UndefinedDeviation { .. }
        ))
    ));
    assert_eq!(repository.records().len(), 1);
    assert!(publisher.messages().is_empty());
}

#[test]
fn duplicate_payers_in_calculation_event_are_rejected() {
    let (service, _, publisher) = bootstrapped();
    let mut event = calculation_event(300000.0);
    event.payer_amounts.push(event.payer_amounts[0].clone());

    assert!(matches!(
        service.handle_calculation(event),
        Err(DeviationServiceError::Basis(_))
    ));
    assert!(publisher.messages().is_empty());
}

#[test]
fn negative_yearly_income_is_rejected_before_storage() {
    let (service, repository, publisher) = bootstrapped();

    let result = service.handle_calculation(calculation_event(-1.0));

    assert!(matches!(
        result,
        Err(DeviationServiceError::Basis(BasisError::InvalidAmount { amount, .. })) if amount == -1.0
    ));
    assert_eq!(repository.records().len(), 1);
    assert!(publisher.messages().is_empty());
}

#[test]
fn repository_failures_propagate() {
    let service = DeviationService::new(
        Arc::new(UnavailableRepository),
        Arc::new(MemoryPublisher::default()),
        DeviationPolicy::default(),
    );

    assert!(matches!(
        service.handle_calculation(calculation_event(600000.0)),
        Err(DeviationServiceError::Repository(RepositoryError::Unavailable(_)))
    ));
}

#[test]
fn assessments_are_stored_before_publishing() {
    let repository = Arc::new(MemoryRepository::default());
    let service = DeviationService::new(
        repository.clone(),
        Arc::new(OfflinePublisher),
        DeviationPolicy::default(),
    );
    service
        .handle_comparison_basis(comparison_event(50000.0))
        .expect("comparison basis handled");

    let result = service.handle_calculation(calculation_event(600000.0));

    assert!(matches!(result, Err(DeviationServiceError::Publish(_))));
    assert_eq!(repository.records().len(), 2);
}

#[test]
fn unknown_stored_codes_fail_restoration() {
    let (service, repository, _) = bootstrapped();
    let mut records = repository.records();
    records[0].comparison_basis[0].incomes[0].kind_code = "LOTTERIGEVINST".to_string();
    repository.store(records).expect("overwrite record");

    let result = service.history(&subject(), qualifying_date());

    match result {
        Err(DeviationServiceError::Restore(RestoreError::Mapping(
            MappingError::UnknownIncomeKind(code),
        ))) => assert_eq!(code, "LOTTERIGEVINST"),
        other => panic!("expected mapping failure, got {other:?}"),
    }
}
