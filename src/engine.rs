//! Workflow engine
//!
//! Validates a workflow, then runs its steps strictly in order against one
//! [`ExecutionContext`]. The engine keeps no state between calls; the only
//! thing it holds is a shared read-only rule registry, so one instance can
//! serve concurrent invocations.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, info_span};

use crate::context::{ExecutionContext, LogEntry, RunResult};
use crate::error::{Result, SheetflowError};
use crate::rules::RuleRegistry;
use crate::table::{Record, Table};
use crate::validator::Validator;
use crate::workflow::{Step, Workflow};

/// Rows shown per table by `preview` unless told otherwise
pub const DEFAULT_PREVIEW_ROWS: usize = 20;

/// First rows of the first output slot written by a previewed run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AfterSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    pub rows: Vec<Record>,
}

/// Outcome of [`Engine::preview`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewResult {
    pub before: Vec<Record>,
    pub after: AfterSnapshot,
    pub logs: Vec<LogEntry>,
}

#[derive(Debug, Clone)]
pub struct Engine {
    registry: Arc<RuleRegistry>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Engine over the built-in rules
    pub fn new() -> Self {
        Self::with_registry(RuleRegistry::builtin())
    }

    pub fn with_registry(registry: Arc<RuleRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Pre-flight check of `workflow` against `table`'s schema
    pub fn validate(&self, table: &Table, workflow: &Workflow) -> Result<Vec<Step>> {
        let steps = Validator::new(&self.registry).validate(workflow, &table.schema())?;
        Ok(steps)
    }

    /// Execute every step and return the output slots and the step log
    ///
    /// Fails on the first validation or step error; nothing partial is returned.
    pub fn run(&self, table: Table, workflow: &Workflow) -> Result<RunResult> {
        let steps = self.validate(&table, workflow)?;

        let span = info_span!("run", steps = steps.len(), rows = table.row_count());
        let _guard = span.enter();
        info!("Workflow started");

        let mut ctx = ExecutionContext::new(table);
        for step in &steps {
            ctx.set_step(step.index);
            if let Err(err) = self.execute_step(&mut ctx, step) {
                ctx.log(
                    "error",
                    format!("Step {} ({}) failed: {}", step.index, step.step_type, err),
                    0,
                );
                error!(
                    step_index = step.index,
                    step_type = %step.step_type,
                    error = %err,
                    "Step failed"
                );
                return Err(err);
            }
        }

        let result = ctx.into_result();
        info!(outputs = result.outputs.len(), "Workflow completed");
        Ok(result)
    }

    /// Run the workflow and report the first rows before and after
    pub fn preview(
        &self,
        table: Table,
        workflow: &Workflow,
        max_rows: usize,
    ) -> Result<PreviewResult> {
        self.validate(&table, workflow)?;
        let before = table.head(max_rows);

        let result = self.run(table, workflow)?;
        let after = match result.first_sheet() {
            Some((sheet, output)) => AfterSnapshot {
                sheet: Some(sheet.clone()),
                rows: output.head(max_rows),
            },
            None => AfterSnapshot {
                sheet: None,
                rows: Vec::new(),
            },
        };

        Ok(PreviewResult {
            before,
            after,
            logs: result.logs,
        })
    }

    fn execute_step(&self, ctx: &mut ExecutionContext, step: &Step) -> Result<()> {
        let attribute = |source| SheetflowError::Step {
            step_index: step.index,
            step_type: step.step_type.clone(),
            source,
        };

        let rule = self.registry.resolve(&step.step_type).map_err(attribute)?;
        rule.execute(ctx, &step.params).map_err(attribute)?;

        if let Some(entry) = ctx.logs().last() {
            debug!(
                step_index = step.index,
                step_type = %step.step_type,
                affected_rows = entry.affected_rows,
                "{}",
                entry.message
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StepError;
    use serde_json::json;

    fn sales() -> Table {
        Table::from_records(&[
            json!({"dept": "A", "amt": 10}),
            json!({"dept": "B", "amt": 5}),
            json!({"dept": "A", "amt": 7}),
        ])
        .unwrap()
    }

    fn workflow(steps: serde_json::Value) -> Workflow {
        Workflow::from_value(json!({ "steps": steps }))
    }

    #[test]
    fn engine_is_send_sync_clone() {
        fn assert_traits<T: Send + Sync + Clone>() {}
        assert_traits::<Engine>();
    }

    #[test]
    fn run_chains_steps() {
        let result = Engine::new()
            .run(
                sales(),
                &workflow(json!([
                    {"type": "filter", "column": "dept", "operator": "=", "value": "A"},
                    {"type": "move", "target_sheet": "A only"}
                ])),
            )
            .unwrap();
        assert_eq!(result.outputs["A only"].row_count(), 2);
        assert_eq!(result.logs.len(), 2);
        assert_eq!(result.logs[1].step_index, 1);
    }

    #[test]
    fn step_failure_is_attributed() {
        let err = Engine::new()
            .run(
                sales(),
                &workflow(json!([
                    {"type": "move", "target_sheet": "x"},
                    {"type": "filter", "column": "amt", "operator": "between", "value": 1}
                ])),
            )
            .unwrap_err();
        assert_eq!(err.step_index(), Some(1));
        assert!(matches!(
            err.step_error(),
            Some(StepError::UnsupportedOperator { .. })
        ));
    }

    #[test]
    fn preview_without_outputs_has_no_sheet() {
        let preview = Engine::new()
            .preview(
                sales(),
                &workflow(json!([
                    {"type": "filter", "column": "amt", "operator": ">", "value": 6}
                ])),
                2,
            )
            .unwrap();
        assert_eq!(preview.before.len(), 2);
        assert_eq!(preview.after.sheet, None);
        assert!(preview.after.rows.is_empty());
        assert_eq!(
            serde_json::to_value(&preview.after).unwrap(),
            json!({"rows": []})
        );
    }

    #[test]
    fn preview_rejects_invalid_workflow_before_running() {
        let err = Engine::new()
            .preview(sales(), &workflow(json!([])), 5)
            .unwrap_err();
        assert!(err.is_validation());
    }
}
