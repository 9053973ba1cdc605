use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::deviation::domain::{
    AssessmentId, CalculationBasis, ComparisonBasis, ExternalKey, IncomeKind, MonthlyIncome,
    PayerIncome, PayerRef, SourceKind, SubjectId, YearMonth,
};
use crate::deviation::evaluation::{DeviationObserver, DeviationPolicy};
use crate::deviation::events::{CalculationEvent, ComparisonBasisEvent, PayerAmount};
use crate::deviation::messages::OutboundMessage;
use crate::deviation::reconciliation::LegacyAssessment;
use crate::deviation::repository::{
    AssessmentRecord, AssessmentRepository, MessagePublisher, PublishError, RepositoryError,
};
use crate::deviation::service::DeviationService;

pub(super) const PAYER: &str = "987654321";

pub(super) fn subject() -> SubjectId {
    SubjectId("12345678910".to_string())
}

pub(super) fn qualifying_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2018, 2, 1).expect("valid date")
}

pub(super) fn timestamp(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2018, 2, day)
        .expect("valid date")
        .and_hms_opt(hour, 0, 0)
        .expect("valid time")
}

pub(super) fn calculation_basis(amount: f64) -> CalculationBasis {
    CalculationBasis::from_amounts([(PayerRef(PAYER.to_string()), amount)]).expect("basis")
}

/// Twelve monthly wage entries for the window before the qualifying month.
pub(super) fn payer_income(monthly: f64) -> PayerIncome {
    let to = YearMonth::of(qualifying_date()).minus_months(1);
    PayerIncome {
        payer: PayerRef(PAYER.to_string()),
        entries: (0..12)
            .rev()
            .map(|offset| MonthlyIncome {
                amount: monthly,
                month: to.minus_months(offset),
                kind: IncomeKind::Wage,
                benefit: None,
                description: None,
            })
            .collect(),
    }
}

pub(super) fn comparison_basis(monthly: f64) -> ComparisonBasis {
    ComparisonBasis::new(vec![payer_income(monthly)])
}

pub(super) fn calculation_event(amount: f64) -> CalculationEvent {
    CalculationEvent {
        subject: subject(),
        qualifying_date: qualifying_date(),
        payer_amounts: vec![PayerAmount {
            payer: PayerRef(PAYER.to_string()),
            amount,
        }],
    }
}

pub(super) fn comparison_event(monthly: f64) -> ComparisonBasisEvent {
    ComparisonBasisEvent {
        subject: subject(),
        qualifying_date: qualifying_date(),
        per_payer: vec![payer_income(monthly)],
        pending_calculation: None,
    }
}

pub(super) fn legacy_item(key: &str, source: SourceKind) -> LegacyAssessment {
    LegacyAssessment {
        external_key: ExternalKey(key.to_string()),
        subject: subject(),
        qualifying_date: qualifying_date(),
        source,
        evaluated_at: timestamp(1, 12),
        deviation_percent: Some(3.4),
        calculation_total: Some(580000.0),
        comparison_total: Some(600000.0),
        payer_amounts: vec![PayerAmount {
            payer: PayerRef(PAYER.to_string()),
            amount: 580000.0,
        }],
        per_payer: vec![payer_income(50000.0)],
    }
}

pub(super) fn build_service() -> (
    DeviationService<MemoryRepository, MemoryPublisher>,
    Arc<MemoryRepository>,
    Arc<MemoryPublisher>,
) {
    let repository = Arc::new(MemoryRepository::default());
    let publisher = Arc::new(MemoryPublisher::default());
    let service = DeviationService::new(
        repository.clone(),
        publisher.clone(),
        DeviationPolicy::default(),
    );
    (service, repository, publisher)
}

#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    pub(super) records: Arc<Mutex<Vec<AssessmentRecord>>>,
    pub(super) keys: Arc<Mutex<BTreeMap<ExternalKey, AssessmentId>>>,
}

impl MemoryRepository {
    pub(super) fn records(&self) -> Vec<AssessmentRecord> {
        self.records.lock().expect("repository mutex poisoned").clone()
    }
}

impl AssessmentRepository for MemoryRepository {
    fn load(
        &self,
        subject: &SubjectId,
        qualifying_date: NaiveDate,
    ) -> Result<Vec<AssessmentRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard
            .iter()
            .filter(|record| record.subject == subject.0 && record.qualifying_date == qualifying_date)
            .cloned()
            .collect())
    }

    fn store(&self, records: Vec<AssessmentRecord>) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        for record in records {
            match guard.iter_mut().find(|existing| existing.id == record.id) {
                Some(existing) => *existing = record,
                None => guard.push(record),
            }
        }
        Ok(())
    }

    fn find_external_key(
        &self,
        key: &ExternalKey,
    ) -> Result<Option<AssessmentId>, RepositoryError> {
        let guard = self.keys.lock().expect("key mutex poisoned");
        Ok(guard.get(key).copied())
    }

    fn store_imported(
        &self,
        record: AssessmentRecord,
        key: ExternalKey,
    ) -> Result<(), RepositoryError> {
        let mut keys = self.keys.lock().expect("key mutex poisoned");
        if keys.contains_key(&key) {
            return Err(RepositoryError::Conflict);
        }
        keys.insert(key, record.id);
        self.records
            .lock()
            .expect("repository mutex poisoned")
            .push(record);
        Ok(())
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryPublisher {
    messages: Arc<Mutex<Vec<OutboundMessage>>>,
}

impl MemoryPublisher {
    pub(super) fn messages(&self) -> Vec<OutboundMessage> {
        self.messages.lock().expect("publisher mutex poisoned").clone()
    }

    pub(super) fn names(&self) -> Vec<&'static str> {
        self.messages()
            .iter()
            .map(OutboundMessage::name)
            .collect()
    }
}

impl MessagePublisher for MemoryPublisher {
    fn publish(&self, message: OutboundMessage) -> Result<(), PublishError> {
        self.messages
            .lock()
            .expect("publisher mutex poisoned")
            .push(message);
        Ok(())
    }
}

pub(super) struct UnavailableRepository;

impl AssessmentRepository for UnavailableRepository {
    fn load(
        &self,
        _subject: &SubjectId,
        _qualifying_date: NaiveDate,
    ) -> Result<Vec<AssessmentRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn store(&self, _records: Vec<AssessmentRecord>) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn find_external_key(
        &self,
        _key: &ExternalKey,
    ) -> Result<Option<AssessmentId>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn store_imported(
        &self,
        _record: AssessmentRecord,
        _key: ExternalKey,
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

pub(super) struct OfflinePublisher;

impl MessagePublisher for OfflinePublisher {
    fn publish(&self, _message: OutboundMessage) -> Result<(), PublishError> {
        Err(PublishError::Transport("broker offline".to_string()))
    }
}

#[derive(Default)]
pub(super) struct CountingObserver {
    calls: AtomicUsize,
    last: Mutex<Option<(bool, f64)>>,
}

impl CountingObserver {
    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(super) fn last(&self) -> Option<(bool, f64)> {
        *self.last.lock().expect("observer mutex poisoned")
    }
}

impl DeviationObserver for CountingObserver {
    fn deviation_assessed(&self, acceptable: bool, deviation_percent: f64) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().expect("observer mutex poisoned") = Some((acceptable, deviation_percent));
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
