use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::assessment::Assessment;
use super::domain::{
    AssessmentId, CalculationBasis, ComparisonBasis, PayerRef, SourceKind, SubjectId, YearMonth,
};
use super::evaluation::Deviation;
use super::events::{CalculationEvent, PayerAmount};
use super::history::ComparisonBasisRequest;

/// Warning code attached to cases whose deviation exceeds the allowed threshold.
pub const DEVIATION_WARNING_CODE: &str = "RV_IV_2";

/// Everything the service hands to the outbound transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    ComparisonBasisNeeded {
        subject: SubjectId,
        request: ComparisonBasisRequest,
    },
    DeviationAssessed(DeviationAssessedRecord),
    DeviationWarning(DeviationWarning),
    ApprovalRequested(ApprovalRequest),
    Subsumption(SubsumptionRecord),
    CalculationReplay(CalculationEvent),
    AssessmentImported(AssessmentImportedRecord),
}

impl OutboundMessage {
    pub const fn name(&self) -> &'static str {
        match self {
            OutboundMessage::ComparisonBasisNeeded { .. } => "comparison_basis_needed",
            OutboundMessage::DeviationAssessed(_) => "deviation_assessed",
            OutboundMessage::DeviationWarning(_) => "deviation_warning",
            OutboundMessage::ApprovalRequested(_) => "approval_requested",
            OutboundMessage::Subsumption(_) => "subsumption",
            OutboundMessage::CalculationReplay(_) => "calculation_replay",
            OutboundMessage::AssessmentImported(_) => "assessment_imported",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationSummary {
    pub total: f64,
    pub payer_amounts: Vec<PayerAmount>,
}

impl From<&CalculationBasis> for CalculationSummary {
    fn from(basis: &CalculationBasis) -> Self {
        Self {
            total: basis.total(),
            payer_amounts: basis
                .yearly_incomes()
                .iter()
                .map(|(payer, amount)| PayerAmount {
                    payer: payer.clone(),
                    amount: *amount,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthAmount {
    pub month: YearMonth,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayerMonthlyAmounts {
    pub payer: PayerRef,
    pub entries: Vec<MonthAmount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSummary {
    pub total: f64,
    pub payers: Vec<PayerMonthlyAmounts>,
}

impl From<&ComparisonBasis> for ComparisonSummary {
    fn from(basis: &ComparisonBasis) -> Self {
        Self {
            total: basis.total(),
            payers: basis
                .incomes()
                .iter()
                .map(|income| PayerMonthlyAmounts {
                    payer: income.payer.clone(),
                    entries: income
                        .entries
                        .iter()
                        .map(|entry| MonthAmount {
                            month: entry.month,
                            amount: entry.amount,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviationAssessedRecord {
    pub assessment_id: AssessmentId,
    pub subject: SubjectId,
    pub qualifying_date: NaiveDate,
    pub evaluated_at: NaiveDateTime,
    pub calculation_basis: CalculationSummary,
    pub comparison_basis: ComparisonSummary,
    pub deviation_percent: f64,
    pub acceptable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviationWarning {
    pub subject: SubjectId,
    pub qualifying_date: NaiveDate,
    pub code: &'static str,
    pub message: String,
    pub deviation_percent: f64,
}

impl DeviationWarning {
    pub fn new(subject: SubjectId, qualifying_date: NaiveDate, deviation_percent: f64) -> Self {
        Self {
            subject,
            qualifying_date,
            code: DEVIATION_WARNING_CODE,
            message: format!(
                "calculated income deviates {deviation_percent:.2}% from reported income"
            ),
            deviation_percent,
        }
    }
}

/// Forwards the approval request together with the assessment that stands.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApprovalRequest {
    pub subject: SubjectId,
    pub qualifying_date: NaiveDate,
    pub assessment_id: AssessmentId,
}

impl From<&Assessment> for ApprovalRequest {
    fn from(assessment: &Assessment) -> Self {
        Self {
            subject: assessment.subject().clone(),
            qualifying_date: assessment.qualifying_date(),
            assessment_id: assessment.id(),
        }
    }
}

/// Legal provenance for applying the deviation rule of the National Insurance Act.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubsumptionRecord {
    pub subject: SubjectId,
    pub qualifying_date: NaiveDate,
    pub assessment_id: AssessmentId,
    pub law: &'static str,
    pub law_version: NaiveDate,
    pub paragraph: &'static str,
    pub subsection: u8,
    pub sentence: Option<u8>,
    pub outcome: &'static str,
    pub input: serde_json::Value,
    pub output: serde_json::Value,
}

impl SubsumptionRecord {
    /// Returns `None` for assessments that have no calculation basis yet.
    pub fn deviation_rule(assessment: &Assessment, deviation: &Deviation) -> Option<Self> {
        let calculation = CalculationSummary::from(assessment.calculation_basis()?);
        let comparison = assessment.comparison_basis();

        let months: Vec<serde_json::Value> = comparison
            .entries_by_month()
            .into_iter()
            .map(|(month, entries)| {
                let incomes: Vec<serde_json::Value> = entries
                    .into_iter()
                    .map(|(payer, entry)| {
                        json!({
                            "payer": payer.0,
                            "amount": entry.amount,
                            "benefit": entry.benefit,
                            "description": entry.description,
                            "income_kind": entry.kind.code(),
                        })
                    })
                    .collect();
                json!({ "month": month.to_string(), "incomes": incomes })
            })
            .collect();

        Some(Self {
            subject: assessment.subject().clone(),
            qualifying_date: assessment.qualifying_date(),
            assessment_id: assessment.id(),
            law: "folketrygdloven",
            law_version: NaiveDate::from_ymd_opt(2019, 1, 1)?,
            paragraph: "8-30",
            subsection: 2,
            sentence: Some(1),
            outcome: "VILKAR_BEREGNET",
            input: json!({
                "maximum_allowed_deviation_percent": deviation.maximum_allowed_percent,
                "calculation_basis": calculation,
                "comparison_basis": {
                    "total": comparison.total(),
                    "reported_monthly_incomes": months,
                },
            }),
            output: json!({
                "deviation_percent": deviation.percent,
                "acceptable": deviation.acceptable,
            }),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssessmentImportedRecord {
    pub assessment_id: AssessmentId,
    pub subject: SubjectId,
    pub qualifying_date: NaiveDate,
    pub source: SourceKind,
    pub evaluated_at: NaiveDateTime,
    pub calculation_basis: CalculationSummary,
    pub comparison_basis: ComparisonSummary,
    pub deviation_percent: f64,
}

/// Groups outbound messages by name for logging and assertions.
pub fn count_by_name(messages: &[OutboundMessage]) -> BTreeMap<&'static str, usize> {
    let mut counts = BTreeMap::new();
    for message in messages {
        *counts.entry(message.name()).or_insert(0) += 1;
    }
    counts
}
