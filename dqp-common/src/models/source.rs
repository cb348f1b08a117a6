//! Federated document sources

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Health information exchange queried independently for an entity's documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Source {
    CommonWell,
    Carequality,
}

impl Source {
    pub const ALL: [Source; 2] = [Source::CommonWell, Source::Carequality];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CommonWell => "COMMONWELL",
            Self::Carequality => "CAREQUALITY",
        }
    }

    /// Two-letter abbreviation used in logs
    pub const fn short_name(&self) -> &'static str {
        match self {
            Self::CommonWell => "CW",
            Self::Carequality => "CQ",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "COMMONWELL" | "CW" => Ok(Self::CommonWell),
            "CAREQUALITY" | "CQ" => Ok(Self::Carequality),
            other => Err(Error::InvalidInput(format!("unknown source '{}'", other))),
        }
    }
}

/// Scope of a reset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetTarget {
    /// One source; the entity view is re-aggregated from the others
    Source(Source),
    /// Every source, plus the entity-level progress itself
    All,
}

impl ResetTarget {
    /// Sources whose progress the reset clears
    pub fn sources(&self) -> Vec<Source> {
        match self {
            Self::Source(source) => vec![*source],
            Self::All => Source::ALL.to_vec(),
        }
    }
}

impl From<Source> for ResetTarget {
    fn from(source: Source) -> Self {
        Self::Source(source)
    }
}
