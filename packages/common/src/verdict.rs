#[cfg(feature = "sea-orm")]
use sea_orm::prelude::StringLen;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ParseEnumError;

/// Outcome of a single finished test.
///
/// A test carries at most one verdict, so the five outcome flags of the
/// grading model are mutually exclusive by construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Checker accepted the output.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "ac"))]
    Ac,
    /// Checker rejected the output.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "wa"))]
    Wa,
    /// CPU time above the evaluation limit.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "tle"))]
    Tle,
    /// Memory above the evaluation limit.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "mle"))]
    Mle,
    /// Non-zero exit, stderr output or termination by signal.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "re"))]
    Re,
}

impl Verdict {
    pub const ALL: &'static [Verdict] = &[Self::Ac, Self::Wa, Self::Tle, Self::Mle, Self::Re];

    /// Returns true for every verdict except `Ac`.
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::Ac)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ac => "ac",
            Self::Wa => "wa",
            Self::Tle => "tle",
            Self::Mle => "mle",
            Self::Re => "re",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verdict {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("verdict", s))
    }
}
