//! Sheetflow - declarative spreadsheet workflow engine
//!
//! A workflow is an ordered list of steps (`filter`, `move`, `group_sum`)
//! applied to one input table. Running it yields named output tables plus a
//! per-step audit log.

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod execution;
pub mod rules;
pub mod storage;
pub mod table;
pub mod validator;
pub mod workflow;

pub use config::SheetflowConfig;
pub use context::{ExecutionContext, LogEntry, RunResult};
pub use engine::{AfterSnapshot, Engine, PreviewResult, DEFAULT_PREVIEW_ROWS};
pub use error::{FixSuggestion, Result, SheetflowError, StepError, ValidationError};
pub use execution::{ExecutionRecord, ExecutionStatus, OutputFile};
pub use rules::{Rule, RuleFactory, RuleRegistry};
pub use storage::OutputStore;
pub use table::{Cell, Column, ColumnType, Record, Schema, Table};
pub use validator::Validator;
pub use workflow::{Params, Step, Workflow};
