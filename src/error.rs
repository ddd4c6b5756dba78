//! Error types with error codes
//!
//! Error code ranges:
//! - SF-000-009: Workflow validation errors (pre-flight, no step has run)
//! - SF-010-019: Step dispatch and execution errors
//! - SF-020-029: Table errors
//! - SF-030-039: Workflow parsing errors
//! - SF-040-049: Config, storage and execution lifecycle errors

use std::time::Duration;

use thiserror::Error;

use crate::table::ColumnType;

pub type Result<T> = std::result::Result<T, SheetflowError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

// ═══════════════════════════════════════════
// VALIDATION (pre-flight)
// ═══════════════════════════════════════════

/// A workflow rejected before any step executed.
///
/// Every per-step variant carries the index of the failing step.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("[SF-001] Workflow must contain a 'steps' array")]
    MissingSteps,

    #[error("[SF-002] 'steps' must be an array")]
    StepsNotSequence,

    #[error("[SF-003] Workflow must contain at least one step")]
    EmptySteps,

    #[error("[SF-004] Step {index}: step must be an object")]
    StepNotObject { index: usize },

    #[error("[SF-005] Step {index}: missing 'type' field")]
    MissingType { index: usize },

    #[error("[SF-006] Step {index}: {step_type} requires '{field}'")]
    MissingField {
        index: usize,
        step_type: String,
        field: String,
    },

    #[error("[SF-007] Step {index}: '{field}' must be {expected}")]
    InvalidField {
        index: usize,
        field: String,
        expected: String,
    },

    #[error("[SF-008] Step {index}: column '{column}' does not exist in input table")]
    UnknownColumn {
        index: usize,
        column: String,
        available: Vec<String>,
    },

    #[error("[SF-009] Step {index}: column '{column}' is {actual}, expected a numeric column")]
    NonNumericColumn {
        index: usize,
        column: String,
        actual: ColumnType,
    },
}

impl ValidationError {
    /// Index of the offending step, if the failure is tied to one
    pub fn step_index(&self) -> Option<usize> {
        match self {
            ValidationError::MissingSteps
            | ValidationError::StepsNotSequence
            | ValidationError::EmptySteps => None,
            ValidationError::StepNotObject { index }
            | ValidationError::MissingType { index }
            | ValidationError::MissingField { index, .. }
            | ValidationError::InvalidField { index, .. }
            | ValidationError::UnknownColumn { index, .. }
            | ValidationError::NonNumericColumn { index, .. } => Some(*index),
        }
    }

    /// Column hint for unknown-column failures
    pub fn suggestion(&self) -> Option<String> {
        match self {
            ValidationError::UnknownColumn { available, .. } => {
                if available.is_empty() {
                    Some("Input table has no columns".to_string())
                } else if available.len() <= 5 {
                    Some(format!("Available columns: {}", available.join(", ")))
                } else {
                    Some(format!(
                        "Available columns: {} (and {} more)",
                        available[..3].join(", "),
                        available.len() - 3
                    ))
                }
            }
            _ => None,
        }
    }
}

// ═══════════════════════════════════════════
// STEP (dispatch + rule execution)
// ═══════════════════════════════════════════

/// Failure raised while resolving or executing a single step.
///
/// The engine wraps it in [`SheetflowError::Step`] with the step's index and type.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StepError {
    #[error("Unknown rule type: {step_type}")]
    UnknownRuleType {
        step_type: String,
        available: Vec<String>,
    },

    #[error("Column '{column}' not found in current table")]
    ColumnNotFound { column: String },

    #[error("Unsupported operator: {operator}")]
    UnsupportedOperator { operator: String },

    #[error("Missing parameter '{name}'")]
    MissingParam { name: String },

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParam { name: String, reason: String },

    #[error("Cannot compare {column_type} column '{column}' with {value}")]
    TypeMismatch {
        column: String,
        column_type: ColumnType,
        value: String,
    },

    #[error("Column '{column}' is {actual}, expected a numeric column")]
    NonNumeric { column: String, actual: ColumnType },
}

// ═══════════════════════════════════════════
// CRATE ERROR
// ═══════════════════════════════════════════

#[derive(Error, Debug)]
pub enum SheetflowError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("[SF-010] Execution failed at step {step_index} ({step_type}): {source}")]
    Step {
        step_index: usize,
        step_type: String,
        #[source]
        source: StepError,
    },

    #[error("[SF-020] Invalid table: {reason}")]
    InvalidTable { reason: String },

    #[error("[SF-030] Failed to parse workflow: {details}")]
    WorkflowParse { details: String },

    #[error("[SF-040] Invalid configuration: {reason}")]
    ConfigError { reason: String },

    #[error("[SF-041] Invalid output sheet name '{sheet}': {reason}")]
    InvalidSheetName { sheet: String, reason: String },

    #[error("[SF-042] Execution cannot move from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("[SF-043] Execution timed out after {limit:?}")]
    Timeout { limit: Duration },

    #[error("[SF-044] Execution worker failed: {reason}")]
    WorkerFailed { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),
}

impl SheetflowError {
    /// Index of the step this failure is attributed to
    pub fn step_index(&self) -> Option<usize> {
        match self {
            SheetflowError::Validation(e) => e.step_index(),
            SheetflowError::Step { step_index, .. } => Some(*step_index),
            _ => None,
        }
    }

    /// Rule failure underneath a step error
    pub fn step_error(&self) -> Option<&StepError> {
        match self {
            SheetflowError::Step { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, SheetflowError::Validation(_))
    }
}

impl FixSuggestion for SheetflowError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            SheetflowError::Validation(e) => match e {
                ValidationError::MissingSteps
                | ValidationError::StepsNotSequence
                | ValidationError::EmptySteps => {
                    Some("Provide a non-empty 'steps' array: {\"steps\": [...]}")
                }
                ValidationError::StepNotObject { .. } | ValidationError::MissingType { .. } => {
                    Some("Each step needs a 'type' field (filter, move, group_sum)")
                }
                ValidationError::InvalidField { field, .. } if field == "target_sheet" => {
                    Some("Use a target_sheet made of letters, digits, spaces, '-' or '_'")
                }
                ValidationError::MissingField { .. } | ValidationError::InvalidField { .. } => {
                    Some("Add the required field to the step")
                }
                ValidationError::UnknownColumn { .. } => {
                    Some("Use a column name from the input table header")
                }
                ValidationError::NonNumericColumn { .. } => {
                    Some("Sum a column that only holds numbers")
                }
            },
            SheetflowError::Step { source, .. } => match source {
                StepError::UnknownRuleType { .. } => {
                    Some("Run `sheetflow rules` to list the available step types")
                }
                StepError::UnsupportedOperator { .. } => {
                    Some("Use one of: =, !=, >, <, >=, <=, contains")
                }
                StepError::TypeMismatch { .. } => {
                    Some("Compare against a value of the same type as the column")
                }
                StepError::ColumnNotFound { .. } => Some("Check the column name"),
                StepError::MissingParam { .. } | StepError::InvalidParam { .. } => {
                    Some("Check the step parameters")
                }
                StepError::NonNumeric { .. } => Some("Sum a column that only holds numbers"),
            },
            SheetflowError::InvalidTable { .. } => {
                Some("Provide a JSON array of flat objects (one object per row)")
            }
            SheetflowError::WorkflowParse { .. } => Some("Check JSON/YAML syntax"),
            SheetflowError::ConfigError { .. } => {
                Some("Check ~/.config/sheetflow/config.toml and SHEETFLOW_* variables")
            }
            SheetflowError::InvalidSheetName { .. } => {
                Some("Use a target_sheet made of letters, digits, spaces, '-' or '_'")
            }
            SheetflowError::InvalidTransition { .. } => None,
            SheetflowError::Timeout { .. } => {
                Some("Increase --timeout or reduce the input size")
            }
            SheetflowError::WorkerFailed { .. } => {
                Some("A rule panicked; run with RUST_LOG=debug to see the last step")
            }
            SheetflowError::Io(_) => Some("Check file path and permissions"),
            SheetflowError::Json(_) => Some("Check JSON syntax"),
            SheetflowError::YamlParse(_) => Some("Check YAML syntax: indentation and quoting"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_carries_step_index() {
        let err = ValidationError::UnknownColumn {
            index: 2,
            column: "missing".to_string(),
            available: vec!["dept".to_string(), "amt".to_string()],
        };
        assert_eq!(err.step_index(), Some(2));
        assert_eq!(ValidationError::EmptySteps.step_index(), None);

        let msg = err.to_string();
        assert!(msg.contains("Step 2"));
        assert!(msg.contains("'missing'"));
    }

    #[test]
    fn unknown_column_suggestion_lists_columns() {
        let err = ValidationError::UnknownColumn {
            index: 0,
            column: "x".to_string(),
            available: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(err.suggestion(), Some("Available columns: a, b".to_string()));

        let many = ValidationError::UnknownColumn {
            index: 0,
            column: "x".to_string(),
            available: (0..8).map(|i| format!("c{i}")).collect(),
        };
        assert_eq!(
            many.suggestion(),
            Some("Available columns: c0, c1, c2 (and 5 more)".to_string())
        );
    }

    #[test]
    fn step_error_is_attributed() {
        let err = SheetflowError::Step {
            step_index: 3,
            step_type: "filter".to_string(),
            source: StepError::UnsupportedOperator {
                operator: "~".to_string(),
            },
        };
        assert_eq!(err.step_index(), Some(3));
        assert!(!err.is_validation());
        assert!(matches!(
            err.step_error(),
            Some(StepError::UnsupportedOperator { .. })
        ));

        let msg = err.to_string();
        assert!(msg.contains("[SF-010]"));
        assert!(msg.contains("step 3 (filter)"));
        assert!(msg.contains("Unsupported operator: ~"));
    }

    #[test]
    fn validation_converts_into_crate_error() {
        let err: SheetflowError = ValidationError::MissingSteps.into();
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "[SF-001] Workflow must contain a 'steps' array");
        assert!(err.fix_suggestion().is_some());
    }

    #[test]
    fn timeout_reports_the_limit() {
        let err = SheetflowError::Timeout {
            limit: Duration::from_secs(2),
        };
        assert_eq!(err.to_string(), "[SF-043] Execution timed out after 2s");

        let err = SheetflowError::WorkerFailed {
            reason: "task panicked".to_string(),
        };
        assert!(err.to_string().starts_with("[SF-044]"));
        assert!(err.fix_suggestion().is_some());
    }

    #[test]
    fn unknown_rule_suggests_listing_rules() {
        let err = SheetflowError::Step {
            step_index: 0,
            step_type: "bogus".to_string(),
            source: StepError::UnknownRuleType {
                step_type: "bogus".to_string(),
                available: vec!["filter".to_string()],
            },
        };
        assert_eq!(
            err.fix_suggestion(),
            Some("Run `sheetflow rules` to list the available step types")
        );
    }
}
