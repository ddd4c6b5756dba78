//! Rule trait, registry and the built-in rules
//!
//! A rule is a stateless unit of computation applied to the execution context
//! with one step's parameters. The registry maps step-type names to rule
//! factories; adding a rule type means registering a factory, never editing
//! dispatch code.

mod filter;
mod group_sum;
mod move_sheet;

pub use filter::{FilterRule, Operator};
pub use group_sum::GroupSumRule;
pub use move_sheet::MoveRule;

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::error::{StepError, ValidationError};
use crate::storage::sheet_name_problem;
use crate::table::{Schema, Table};
use crate::workflow::Params;

/// A step implementation
pub trait Rule: Send + Sync {
    /// Step type this rule is registered under
    fn name(&self) -> &'static str;

    /// Pre-flight checks against the input schema, run before any step executes
    fn validate(
        &self,
        _index: usize,
        _params: &Params,
        _schema: &Schema,
    ) -> Result<(), ValidationError> {
        Ok(())
    }

    /// Apply the step to the context, appending exactly one log entry
    fn execute(&self, ctx: &mut ExecutionContext, params: &Params) -> Result<(), StepError>;
}

/// Zero-argument constructor for a rule
pub type RuleFactory = fn() -> Box<dyn Rule>;

fn make<R: Rule + Default + 'static>() -> Box<dyn Rule> {
    Box::new(R::default())
}

/// Built once per process, read-only afterwards
static BUILTIN_RULES: Lazy<Arc<RuleRegistry>> = Lazy::new(|| {
    let mut registry = RuleRegistry::new();
    registry.register_rule::<FilterRule>();
    registry.register_rule::<MoveRule>();
    registry.register_rule::<GroupSumRule>();
    Arc::new(registry)
});

/// Mapping from step type to rule factory, in registration order
#[derive(Clone, Default)]
pub struct RuleRegistry {
    factories: IndexMap<String, RuleFactory>,
}

impl RuleRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared registry holding `filter`, `move` and `group_sum`
    pub fn builtin() -> Arc<RuleRegistry> {
        Arc::clone(&BUILTIN_RULES)
    }

    /// Register a factory under `name`, replacing any previous entry
    pub fn register(&mut self, name: impl Into<String>, factory: RuleFactory) {
        self.factories.insert(name.into(), factory);
    }

    /// Register a rule under its own name
    pub fn register_rule<R: Rule + Default + 'static>(&mut self) {
        let name = R::default().name();
        self.register(name, make::<R>);
    }

    /// Instantiate the rule for `step_type`
    pub fn resolve(&self, step_type: &str) -> Result<Box<dyn Rule>, StepError> {
        self.factories
            .get(step_type)
            .map(|factory| factory())
            .ok_or_else(|| StepError::UnknownRuleType {
                step_type: step_type.to_string(),
                available: self.names(),
            })
    }

    pub fn has(&self, step_type: &str) -> bool {
        self.factories.contains_key(step_type)
    }

    /// Registered step types, in registration order
    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleRegistry")
            .field("rules", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ═══════════════════════════════════════════
// VALIDATION HELPERS
// ═══════════════════════════════════════════

/// Field that must be present; null counts as present
pub(crate) fn require_key<'a>(
    index: usize,
    step_type: &str,
    params: &'a Params,
    field: &str,
) -> Result<&'a Value, ValidationError> {
    params.get(field).ok_or_else(|| ValidationError::MissingField {
        index,
        step_type: step_type.to_string(),
        field: field.to_string(),
    })
}

pub(crate) fn require_field<'a>(
    index: usize,
    step_type: &str,
    params: &'a Params,
    field: &str,
) -> Result<&'a Value, ValidationError> {
    params
        .get(field)
        .filter(|v| !v.is_null())
        .ok_or_else(|| ValidationError::MissingField {
            index,
            step_type: step_type.to_string(),
            field: field.to_string(),
        })
}

/// Required field holding a non-empty string
pub(crate) fn require_str<'a>(
    index: usize,
    step_type: &str,
    params: &'a Params,
    field: &str,
) -> Result<&'a str, ValidationError> {
    match require_field(index, step_type, params, field)? {
        Value::String(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(ValidationError::InvalidField {
            index,
            field: field.to_string(),
            expected: "a non-empty string".to_string(),
        }),
    }
}

/// Required output sheet name, usable as part of a file name
pub(crate) fn require_sheet<'a>(
    index: usize,
    step_type: &str,
    params: &'a Params,
    field: &str,
) -> Result<&'a str, ValidationError> {
    let sheet = require_str(index, step_type, params, field)?;
    match sheet_name_problem(sheet) {
        None => Ok(sheet),
        Some(reason) => Err(ValidationError::InvalidField {
            index,
            field: field.to_string(),
            expected: format!("a sheet name of letters, digits, spaces, '-' or '_' ({})", reason),
        }),
    }
}

/// Required column-name field that must exist in the input schema
pub(crate) fn require_column<'a>(
    index: usize,
    step_type: &str,
    params: &'a Params,
    field: &str,
    schema: &Schema,
) -> Result<&'a str, ValidationError> {
    let column = require_str(index, step_type, params, field)?;
    if schema.contains(column) {
        Ok(column)
    } else {
        Err(ValidationError::UnknownColumn {
            index,
            column: column.to_string(),
            available: schema.names(),
        })
    }
}

// ═══════════════════════════════════════════
// EXECUTION HELPERS
// ═══════════════════════════════════════════

pub(crate) fn param<'a>(params: &'a Params, name: &str) -> Result<&'a Value, StepError> {
    params
        .get(name)
        .filter(|v| !v.is_null())
        .ok_or_else(|| StepError::MissingParam {
            name: name.to_string(),
        })
}

pub(crate) fn param_str<'a>(params: &'a Params, name: &str) -> Result<&'a str, StepError> {
    match param(params, name)? {
        Value::String(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(StepError::InvalidParam {
            name: name.to_string(),
            reason: "expected a non-empty string".to_string(),
        }),
    }
}

pub(crate) fn column_index(table: &Table, column: &str) -> Result<usize, StepError> {
    table
        .column_index(column)
        .ok_or_else(|| StepError::ColumnNotFound {
            column: column.to_string(),
        })
}
