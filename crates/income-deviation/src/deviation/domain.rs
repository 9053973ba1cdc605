use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// National identity of the person an assessment history belongs to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubjectId(pub String);

/// Employer or other income payer, usually an organisation number.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PayerRef(pub String);

/// Qualifying-condition identifier assigned by a legacy system.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExternalKey(pub String);

macro_rules! display_inner {
    ($($ty:ty),+) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        })+
    };
}

display_inner!(SubjectId, PayerRef, ExternalKey);

/// Opaque identifier for a single assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssessmentId(pub Uuid);

impl AssessmentId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for AssessmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Calendar month without a day component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub const fn year(self) -> i32 {
        self.year
    }

    pub const fn month(self) -> u32 {
        self.month
    }

    pub fn minus_months(self, months: u32) -> Self {
        let index = self.year * 12 + self.month as i32 - 1 - months as i32;
        Self {
            year: index.div_euclid(12),
            month: index.rem_euclid(12) as u32 + 1,
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("'{0}' is not a YYYY-MM month")]
pub struct YearMonthParseError(String);

impl FromStr for YearMonth {
    type Err = YearMonthParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || YearMonthParseError(value.to_string());
        let (year, month) = value.trim().split_once('-').ok_or_else(invalid)?;
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        Self::new(year, month).ok_or_else(invalid)
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for YearMonth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Yearly income figures per payer feeding a benefit calculation.
///
/// Only built through [`CalculationBasis::from_amounts`]; it has no `Deserialize` impl so a
/// payload cannot bypass the payer and amount checks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalculationBasis {
    yearly_incomes: BTreeMap<PayerRef, f64>,
}

impl CalculationBasis {
    pub fn from_amounts<I>(amounts: I) -> Result<Self, BasisError>
    where
        I: IntoIterator<Item = (PayerRef, f64)>,
    {
        let mut yearly_incomes = BTreeMap::new();
        for (payer, amount) in amounts {
            if !amount.is_finite() || amount < 0.0 {
                return Err(BasisError::InvalidAmount { payer, amount });
            }
            if yearly_incomes.contains_key(&payer) {
                return Err(BasisError::DuplicatePayer(payer));
            }
            yearly_incomes.insert(payer, amount);
        }
        Ok(Self { yearly_incomes })
    }

    pub fn yearly_incomes(&self) -> &BTreeMap<PayerRef, f64> {
        &self.yearly_incomes
    }

    pub fn total(&self) -> f64 {
        self.yearly_incomes.values().sum()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BasisError {
    #[error("payer {0} appears more than once in the calculation basis")]
    DuplicatePayer(PayerRef),
    #[error("payer {payer} has yearly income {amount}, expected a non-negative amount")]
    InvalidAmount { payer: PayerRef, amount: f64 },
}

/// Monthly income independently reported per payer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ComparisonBasis {
    incomes: Vec<PayerIncome>,
}

impl ComparisonBasis {
    pub fn new(incomes: Vec<PayerIncome>) -> Self {
        Self { incomes }
    }

    pub fn incomes(&self) -> &[PayerIncome] {
        &self.incomes
    }

    /// Whether any payer reported at least one monthly entry.
    pub fn has_entries(&self) -> bool {
        self.incomes.iter().any(|income| !income.entries.is_empty())
    }

    pub fn total(&self) -> f64 {
        self.incomes
            .iter()
            .flat_map(|income| income.entries.iter())
            .map(|entry| entry.amount)
            .sum()
    }

    pub fn entries_by_month(&self) -> BTreeMap<YearMonth, Vec<(&PayerRef, &MonthlyIncome)>> {
        let mut months: BTreeMap<YearMonth, Vec<(&PayerRef, &MonthlyIncome)>> = BTreeMap::new();
        for income in &self.incomes {
            for entry in &income.entries {
                months
                    .entry(entry.month)
                    .or_default()
                    .push((&income.payer, entry));
            }
        }
        months
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayerIncome {
    pub payer: PayerRef,
    pub entries: Vec<MonthlyIncome>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyIncome {
    pub amount: f64,
    pub month: YearMonth,
    pub kind: IncomeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub benefit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Income categories used by the income register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IncomeKind {
    Wage,
    SelfEmployment,
    PensionOrSocialSecurity,
    PublicBenefit,
}

/// Where an assessment was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Internal,
    LegacyPrimary,
    LegacySecondary,
}

impl SourceKind {
    pub const fn is_legacy(self) -> bool {
        matches!(self, Self::LegacyPrimary | Self::LegacySecondary)
    }

    /// Deviation figures from the secondary legacy system are stored but never published.
    pub const fn publishes_deviation(self) -> bool {
        !matches!(self, Self::LegacySecondary)
    }
}
