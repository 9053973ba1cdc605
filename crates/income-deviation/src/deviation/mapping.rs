//! Wire codes for the enumerations shared with upstream systems and storage.
//!
//! Each enum has a single exhaustive `match` producing its code. The reverse direction scans the
//! `ALL` table.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::domain::{IncomeKind, SourceKind};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    #[error("unknown income kind '{0}'")]
    UnknownIncomeKind(String),
    #[error("unknown assessment source '{0}'")]
    UnknownSourceKind(String),
}

impl IncomeKind {
    pub const ALL: [Self; 4] = [
        Self::Wage,
        Self::SelfEmployment,
        Self::PensionOrSocialSecurity,
        Self::PublicBenefit,
    ];

    pub const fn code(self) -> &'static str {
        match self {
            Self::Wage => "LOENNSINNTEKT",
            Self::SelfEmployment => "NAERINGSINNTEKT",
            Self::PensionOrSocialSecurity => "PENSJON_ELLER_TRYGD",
            Self::PublicBenefit => "YTELSE_FRA_OFFENTLIGE",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, MappingError> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.code() == code)
            .ok_or_else(|| MappingError::UnknownIncomeKind(code.to_string()))
    }
}

impl SourceKind {
    pub const ALL: [Self; 3] = [Self::Internal, Self::LegacyPrimary, Self::LegacySecondary];

    pub const fn code(self) -> &'static str {
        match self {
            Self::Internal => "SPINNVILL",
            Self::LegacyPrimary => "SPLEIS",
            Self::LegacySecondary => "INFOTRYGD",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, MappingError> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.code() == code)
            .ok_or_else(|| MappingError::UnknownSourceKind(code.to_string()))
    }
}

macro_rules! serde_via_code {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.code())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                <$ty>::from_code(raw.trim()).map_err(serde::de::Error::custom)
            }
        }
    };
}

serde_via_code!(IncomeKind);
serde_via_code!(SourceKind);
