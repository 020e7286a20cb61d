//! Data types shared by the index builder and the query layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Origin table of an indexed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Command,
    Subtask,
    Report,
    Dashboard,
}

impl SourceType {
    pub const ALL: [SourceType; 4] = [
        SourceType::Command,
        SourceType::Subtask,
        SourceType::Report,
        SourceType::Dashboard,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Command => "command",
            SourceType::Subtask => "subtask",
            SourceType::Report => "report",
            SourceType::Dashboard => "dashboard",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown source type: {}", s))
    }
}

/// One row of the search store.
///
/// Metadata fields hold `""` rather than `NULL` when the origin has no value.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchDocument {
    pub source_type: SourceType,
    pub source_id: String,
    pub parent_id: String,
    pub project: String,
    pub worker_id: String,
    pub status: String,
    /// Index tokens, space-joined.
    pub content: String,
}

/// Documents inserted per source type by one build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexCounts {
    pub command: u64,
    pub subtask: u64,
    pub report: u64,
    pub dashboard: u64,
}

impl IndexCounts {
    pub fn record(&mut self, source_type: SourceType) {
        match source_type {
            SourceType::Command => self.command += 1,
            SourceType::Subtask => self.subtask += 1,
            SourceType::Report => self.report += 1,
            SourceType::Dashboard => self.dashboard += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.command + self.subtask + self.report + self.dashboard
    }
}

impl fmt::Display for IndexCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Indexed: {} commands, {} subtasks, {} reports, {} dashboard entries",
            self.command, self.subtask, self.report, self.dashboard
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_type_round_trips_through_str() {
        for t in SourceType::ALL {
            assert_eq!(t.as_str().parse::<SourceType>().unwrap(), t);
        }
        assert!("farm".parse::<SourceType>().is_err());
    }

    #[test]
    fn counts_summary_line() {
        let mut counts = IndexCounts::default();
        counts.record(SourceType::Command);
        counts.record(SourceType::Report);
        counts.record(SourceType::Report);
        assert_eq!(counts.total(), 3);
        assert_eq!(
            counts.to_string(),
            "Indexed: 1 commands, 0 subtasks, 2 reports, 0 dashboard entries"
        );
    }
}
