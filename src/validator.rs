//! Workflow validator
//!
//! Runs once before any step executes and stops at the first failure:
//!
//! 1. Structure: `steps` exists, is an array and is not empty
//! 2. Per step, in order: the step is an object with a string `type`
//! 3. Per step: the checks of the rule registered for that type
//!
//! Unknown step types pass; dispatch reports them.

use serde_json::Value;

use crate::error::ValidationError;
use crate::rules::RuleRegistry;
use crate::table::Schema;
use crate::workflow::{Step, Workflow};

/// Pre-flight checker bound to a rule registry
#[derive(Debug, Clone, Copy)]
pub struct Validator<'a> {
    registry: &'a RuleRegistry,
}

impl<'a> Validator<'a> {
    pub fn new(registry: &'a RuleRegistry) -> Self {
        Self { registry }
    }

    /// Check `workflow` against the schema of the input table
    ///
    /// Column references are resolved against the input schema for every step.
    /// That holds only while no rule changes the column set of the current
    /// table; a rule that adds, drops or renames columns needs each step
    /// checked against the schema projected by the steps before it.
    pub fn validate(
        &self,
        workflow: &Workflow,
        schema: &Schema,
    ) -> Result<Vec<Step>, ValidationError> {
        let steps = match workflow.definition().get("steps") {
            None | Some(Value::Null) => return Err(ValidationError::MissingSteps),
            Some(Value::Array(steps)) => steps,
            Some(_) => return Err(ValidationError::StepsNotSequence),
        };
        if steps.is_empty() {
            return Err(ValidationError::EmptySteps);
        }

        steps
            .iter()
            .enumerate()
            .map(|(index, raw)| self.validate_step(index, raw, schema))
            .collect()
    }

    fn validate_step(
        &self,
        index: usize,
        raw: &Value,
        schema: &Schema,
    ) -> Result<Step, ValidationError> {
        let object = raw
            .as_object()
            .ok_or(ValidationError::StepNotObject { index })?;

        let step_type = match object.get("type") {
            None | Some(Value::Null) => return Err(ValidationError::MissingType { index }),
            Some(Value::String(t)) => t,
            Some(_) => {
                return Err(ValidationError::InvalidField {
                    index,
                    field: "type".to_string(),
                    expected: "a string".to_string(),
                })
            }
        };

        let step = Step::new(index, step_type.as_str(), object);
        if let Ok(rule) = self.registry.resolve(step_type) {
            rule.validate(index, &step.params, schema)?;
        }
        Ok(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Table;
    use serde_json::json;

    fn schema() -> Schema {
        Table::from_records(&[json!({"dept": "A", "amt": 1})])
            .unwrap()
            .schema()
    }

    fn validate(definition: serde_json::Value) -> Result<Vec<Step>, ValidationError> {
        let registry = RuleRegistry::builtin();
        Validator::new(&registry).validate(&Workflow::from_value(definition), &schema())
    }

    #[test]
    fn structural_failures() {
        assert_eq!(validate(json!({})), Err(ValidationError::MissingSteps));
        assert_eq!(validate(json!([])), Err(ValidationError::MissingSteps));
        assert_eq!(
            validate(json!({"steps": {"type": "move"}})),
            Err(ValidationError::StepsNotSequence)
        );
        assert_eq!(validate(json!({"steps": []})), Err(ValidationError::EmptySteps));
    }

    #[test]
    fn step_shape_failures_carry_index() {
        assert_eq!(
            validate(json!({"steps": [{"type": "move", "target_sheet": "A"}, 7]})),
            Err(ValidationError::StepNotObject { index: 1 })
        );
        assert_eq!(
            validate(json!({"steps": [{"target_sheet": "A"}]})),
            Err(ValidationError::MissingType { index: 0 })
        );
        assert!(matches!(
            validate(json!({"steps": [{"type": 3}]})),
            Err(ValidationError::InvalidField { index: 0, .. })
        ));
    }

    #[test]
    fn unknown_types_pass_validation() {
        let steps = validate(json!({"steps": [{"type": "bogus", "x": 1}]})).unwrap();
        assert_eq!(steps[0].step_type, "bogus");
        assert_eq!(steps[0].params.get("x"), Some(&json!(1)));
    }

    #[test]
    fn first_failing_step_wins() {
        let err = validate(json!({"steps": [
            {"type": "move", "target_sheet": "ok"},
            {"type": "filter", "column": "missing", "operator": "=", "value": 1},
            {"type": "move"}
        ]}))
        .unwrap_err();
        assert_eq!(err.step_index(), Some(1));
        assert!(matches!(
            err,
            ValidationError::UnknownColumn { ref column, .. } if column == "missing"
        ));
    }

    #[test]
    fn columns_are_checked_against_the_input_schema() {
        // A filter that empties the table does not change its columns, so a
        // later step may still name any input column.
        let steps = validate(json!({"steps": [
            {"type": "filter", "column": "amt", "operator": ">", "value": 100},
            {"type": "group_sum", "group_by": "dept", "field": "amt", "target_sheet": "t"}
        ]}))
        .unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].index, 1);
    }
}
