//! Stage-level progress counters and status

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Status of one pipeline stage, for one source or for the whole entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    /// Items still outstanding
    Processing,
    /// Every expected item was accounted for (successfully or not)
    Completed,
    /// The stage was abandoned outright
    Failed,
}

impl ProgressStatus {
    /// Completed and Failed are terminal: only a reset clears them
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Fetching documents from the source
    Download,
    /// Converting downloaded documents
    Convert,
}

impl Stage {
    pub const ALL: [Stage; 2] = [Stage::Download, Stage::Convert];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Convert => "convert",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "download" => Ok(Self::Download),
            "convert" => Ok(Self::Convert),
            other => Err(Error::InvalidInput(format!("unknown stage '{}'", other))),
        }
    }
}

/// Counters and status for one stage
///
/// `total == 0` means the stage has not been sized yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageProgress {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub successful: u64,
    #[serde(default)]
    pub errors: u64,
    pub status: ProgressStatus,
}

impl StageProgress {
    /// Unsized stage with zero counters
    pub const fn new(status: ProgressStatus) -> Self {
        Self {
            total: 0,
            successful: 0,
            errors: 0,
            status,
        }
    }

    /// What an absent stage counts as when aggregating
    pub const fn vacant() -> Self {
        Self::new(ProgressStatus::Completed)
    }

    /// Items accounted for so far
    pub fn processed(&self) -> u64 {
        self.successful.saturating_add(self.errors)
    }

    pub fn is_sized(&self) -> bool {
        self.total > 0
    }

    /// Counters exceed a known total (upstream miscount)
    pub fn is_overcounted(&self) -> bool {
        self.is_sized() && self.processed() > self.total
    }

    /// True once the tallied items satisfy the total.
    ///
    /// An unsized stage is satisfied by any tally.
    pub fn tallies_reach_total(&self) -> bool {
        !self.is_sized() || self.processed() >= self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!ProgressStatus::Processing.is_terminal());
        assert!(ProgressStatus::Completed.is_terminal());
        assert!(ProgressStatus::Failed.is_terminal());
    }

    #[test]
    fn test_stage_parse() {
        assert_eq!("download".parse::<Stage>().unwrap(), Stage::Download);
        assert_eq!(" Convert ".parse::<Stage>().unwrap(), Stage::Convert);
        assert!(matches!(
            "upload".parse::<Stage>(),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let progress = StageProgress {
            total: 10,
            successful: 8,
            errors: 1,
            status: ProgressStatus::Processing,
        };
        let json = serde_json::to_value(progress).unwrap();
        assert_eq!(json["status"], "processing");
        assert_eq!(json["total"], 10);
    }

    #[test]
    fn test_missing_counters_default_to_zero() {
        let progress: StageProgress =
            serde_json::from_str(r#"{"status":"completed"}"#).unwrap();
        assert_eq!(progress, StageProgress::vacant());
    }

    #[test]
    fn test_tallies_reach_total() {
        let mut progress = StageProgress::new(ProgressStatus::Processing);
        assert!(progress.tallies_reach_total());

        progress.total = 10;
        progress.successful = 7;
        progress.errors = 2;
        assert!(!progress.tallies_reach_total());

        progress.errors = 3;
        assert!(progress.tallies_reach_total());
        assert!(!progress.is_overcounted());

        progress.errors = 4;
        assert!(progress.is_overcounted());
    }
}
