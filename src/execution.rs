//! Execution records
//!
//! An [`ExecutionRecord`] is the bookkeeping for one `run` invocation:
//! `pending → running → success | failed`, with timestamps, the step log and
//! the files written. The engine never sees it; the caller maps the engine's
//! outcome onto it.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::LogEntry;
use crate::error::{Result, SheetflowError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Success | ExecutionStatus::Failed)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// An output table written to disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFile {
    pub sheet: String,
    pub path: PathBuf,
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: Uuid,
    pub status: ExecutionStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    #[serde(default)]
    pub output_files: Vec<OutputFile>,
}

impl Default for ExecutionRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionRecord {
    /// Fresh pending record with a random id
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            status: ExecutionStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error_message: None,
            logs: Vec::new(),
            output_files: Vec::new(),
        }
    }

    /// pending → running
    pub fn start(&mut self) -> Result<()> {
        self.transition(ExecutionStatus::Pending, ExecutionStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// running → success
    pub fn succeed(&mut self, logs: Vec<LogEntry>, output_files: Vec<OutputFile>) -> Result<()> {
        self.transition(ExecutionStatus::Running, ExecutionStatus::Success)?;
        self.finished_at = Some(Utc::now());
        self.logs = logs;
        self.output_files = output_files;
        Ok(())
    }

    /// running → failed
    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        self.transition(ExecutionStatus::Running, ExecutionStatus::Failed)?;
        self.finished_at = Some(Utc::now());
        self.error_message = Some(message.into());
        Ok(())
    }

    fn transition(&mut self, from: ExecutionStatus, to: ExecutionStatus) -> Result<()> {
        if self.status != from {
            return Err(SheetflowError::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path() {
        let mut record = ExecutionRecord::new();
        assert_eq!(record.status, ExecutionStatus::Pending);
        assert!(record.started_at.is_none());

        record.start().unwrap();
        assert_eq!(record.status, ExecutionStatus::Running);
        assert!(record.started_at.is_some());

        let file = OutputFile {
            sheet: "totals".to_string(),
            path: PathBuf::from("uploads/output_x_totals.json"),
            rows: 2,
        };
        record.succeed(Vec::new(), vec![file]).unwrap();
        assert_eq!(record.status, ExecutionStatus::Success);
        assert!(record.status.is_terminal());
        assert!(record.finished_at >= record.started_at);
        assert_eq!(record.output_files.len(), 1);
    }

    #[test]
    fn failure_keeps_message() {
        let mut record = ExecutionRecord::new();
        record.start().unwrap();
        record.fail("[SF-010] boom").unwrap();
        assert_eq!(record.status, ExecutionStatus::Failed);
        assert_eq!(record.error_message.as_deref(), Some("[SF-010] boom"));
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        let mut record = ExecutionRecord::new();
        let err = record.succeed(Vec::new(), Vec::new()).unwrap_err();
        assert!(err.to_string().contains("from pending to success"));

        record.start().unwrap();
        assert!(record.start().is_err());
        record.fail("x").unwrap();
        assert!(record.fail("again").is_err());
        assert_eq!(record.error_message.as_deref(), Some("x"));
    }

    #[test]
    fn serializes_status_in_snake_case() {
        let record = ExecutionRecord::new();
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["status"], "pending");
        let back: ExecutionRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(ExecutionRecord::new().id, ExecutionRecord::new().id);
    }
}
