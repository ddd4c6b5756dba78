//! Per-invocation execution state
//!
//! One [`ExecutionContext`] lives for exactly one `run`/`preview` call. It owns
//! the current table, the output slots written so far and the step log.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::table::Table;

/// One line of the audit log, appended once per step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub step_index: usize,
    pub step_type: String,
    pub message: String,
    pub affected_rows: usize,
}

/// Successful outcome of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    /// Output slots in first-insertion order
    pub outputs: IndexMap<String, Table>,
    pub logs: Vec<LogEntry>,
}

impl RunResult {
    /// Name of the first output slot written, if any
    pub fn first_sheet(&self) -> Option<(&String, &Table)> {
        self.outputs.first()
    }
}

/// Mutable state threaded through the steps of one invocation
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    current: Table,
    outputs: IndexMap<String, Table>,
    logs: Vec<LogEntry>,
    step_index: usize,
}

impl ExecutionContext {
    pub fn new(input: Table) -> Self {
        Self {
            current: input,
            outputs: IndexMap::new(),
            logs: Vec::new(),
            step_index: 0,
        }
    }

    /// Set the step index stamped on subsequent log entries
    pub fn set_step(&mut self, index: usize) {
        self.step_index = index;
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn current_table(&self) -> &Table {
        &self.current
    }

    pub fn replace_current(&mut self, table: Table) {
        self.current = table;
    }

    /// Write an output slot; an existing slot is overwritten in place
    pub fn insert_output(&mut self, name: impl Into<String>, table: Table) {
        self.outputs.insert(name.into(), table);
    }

    pub fn outputs(&self) -> &IndexMap<String, Table> {
        &self.outputs
    }

    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    pub fn log(&mut self, step_type: &str, message: impl Into<String>, affected_rows: usize) {
        self.logs.push(LogEntry {
            step_index: self.step_index,
            step_type: step_type.to_string(),
            message: message.into(),
            affected_rows,
        });
    }

    pub fn into_result(self) -> RunResult {
        RunResult {
            outputs: self.outputs,
            logs: self.logs,
        }
    }
}
