use chrono::NaiveDate;
use income_deviation::deviation::{
    AssessmentId, AssessmentRecord, AssessmentRepository, ExternalKey, MessagePublisher,
    OutboundMessage, PublishError, RepositoryError, SubjectId,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable("repository mutex poisoned".to_string()))
}

/// Keeps stored rows in insertion order, mirroring an append-only assessment table.
#[derive(Default, Clone)]
pub(crate) struct InMemoryAssessmentRepository {
    records: Arc<Mutex<Vec<AssessmentRecord>>>,
    external_keys: Arc<Mutex<HashMap<ExternalKey, AssessmentId>>>,
}

impl InMemoryAssessmentRepository {
    pub(crate) fn len(&self) -> usize {
        lock(&self.records).map(|guard| guard.len()).unwrap_or(0)
    }
}

impl AssessmentRepository for InMemoryAssessmentRepository {
    fn load(
        &self,
        subject: &SubjectId,
        qualifying_date: NaiveDate,
    ) -> Result<Vec<AssessmentRecord>, RepositoryError> {
        let guard = lock(&self.records)?;
        Ok(guard
            .iter()
            .filter(|record| {
                record.subject == subject.0 && record.qualifying_date == qualifying_date
            })
            .cloned()
            .collect())
    }

    fn store(&self, records: Vec<AssessmentRecord>) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.records)?;
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
        let guard = lock(&self.external_keys)?;
        Ok(guard.get(key).copied())
    }

    fn store_imported(
        &self,
        record: AssessmentRecord,
        key: ExternalKey,
    ) -> Result<(), RepositoryError> {
        let mut keys = lock(&self.external_keys)?;
        if keys.contains_key(&key) {
            return Err(RepositoryError::Conflict);
        }
        let id = record.id;
        self.store(vec![record])?;
        keys.insert(key, id);
        Ok(())
    }
}

/// Logs every outbound message and retains it for inspection.
#[derive(Default, Clone)]
pub(crate) struct LoggingPublisher {
    messages: Arc<Mutex<Vec<OutboundMessage>>>,
}

impl LoggingPublisher {
    pub(crate) fn messages(&self) -> Vec<OutboundMessage> {
        self.messages
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl MessagePublisher for LoggingPublisher {
    fn publish(&self, message: OutboundMessage) -> Result<(), PublishError> {
        let payload = serde_json::to_string(&message)
            .map_err(|err| PublishError::Transport(err.to_string()))?;
        info!(kind = message.name(), %payload, "outbound message");

        self.messages
            .lock()
            .map_err(|_| PublishError::Transport("publisher mutex poisoned".to_string()))?
            .push(message);
        Ok(())
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
