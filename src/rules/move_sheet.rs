//! `move`: copy the current table into an output slot

use super::{param_str, require_sheet, Rule};
use crate::context::ExecutionContext;
use crate::error::{StepError, ValidationError};
use crate::table::Schema;
use crate::workflow::Params;

#[derive(Debug, Default)]
pub struct MoveRule;

impl Rule for MoveRule {
    fn name(&self) -> &'static str {
        "move"
    }

    fn validate(
        &self,
        index: usize,
        params: &Params,
        _schema: &Schema,
    ) -> Result<(), ValidationError> {
        require_sheet(index, self.name(), params, "target_sheet")?;
        Ok(())
    }

    fn execute(&self, ctx: &mut ExecutionContext, params: &Params) -> Result<(), StepError> {
        let target = param_str(params, "target_sheet")?;

        // Tables are values: the slot gets its own copy.
        let snapshot = ctx.current_table().clone();
        let rows = snapshot.row_count();
        ctx.insert_output(target, snapshot);
        ctx.log(
            self.name(),
            format!("Moved {} rows to sheet '{}'", rows, target),
            rows,
        );
        Ok(())
    }
}
