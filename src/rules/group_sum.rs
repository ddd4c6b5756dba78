//! `group_sum`: sum a numeric column per distinct key into a new output table
//!
//! Groups come out in ascending key order. Rows with a null key are left out;
//! null values in the summed column count as zero. Integer sums stay integers
//! until they overflow, then continue as floats.
//!
//! The summed column must be typed numeric. A column holding only nulls has
//! no numeric evidence, is typed string, and is rejected.

use std::collections::BTreeMap;

use super::{column_index, param_str, require_column, require_sheet, require_str, Rule};
use crate::context::ExecutionContext;
use crate::error::{StepError, ValidationError};
use crate::table::{Cell, Column, ColumnType, Schema, Table};
use crate::workflow::Params;

#[derive(Debug, Default)]
pub struct GroupSumRule;

impl Rule for GroupSumRule {
    fn name(&self) -> &'static str {
        "group_sum"
    }

    fn validate(
        &self,
        index: usize,
        params: &Params,
        schema: &Schema,
    ) -> Result<(), ValidationError> {
        let name = self.name();
        require_str(index, name, params, "group_by")?;
        require_str(index, name, params, "field")?;
        require_sheet(index, name, params, "target_sheet")?;

        let group_by = require_column(index, name, params, "group_by", schema)?;
        let field = require_column(index, name, params, "field", schema)?;
        if group_by == field {
            return Err(ValidationError::InvalidField {
                index,
                field: "field".to_string(),
                expected: "a column other than group_by".to_string(),
            });
        }

        match schema.column_type(field) {
            Some(ColumnType::Numeric) | None => Ok(()),
            Some(actual) => Err(ValidationError::NonNumericColumn {
                index,
                column: field.to_string(),
                actual,
            }),
        }
    }

    fn execute(&self, ctx: &mut ExecutionContext, params: &Params) -> Result<(), StepError> {
        let group_by = param_str(params, "group_by")?;
        let field = param_str(params, "field")?;
        let target = param_str(params, "target_sheet")?;
        if group_by == field {
            return Err(StepError::InvalidParam {
                name: "field".to_string(),
                reason: "must differ from group_by".to_string(),
            });
        }

        let table = ctx.current_table();
        let key_idx = column_index(table, group_by)?;
        let value_idx = column_index(table, field)?;

        let key_column = &table.columns()[key_idx];
        let value_type = table.columns()[value_idx].column_type;
        if value_type != ColumnType::Numeric {
            return Err(StepError::NonNumeric {
                column: field.to_string(),
                actual: value_type,
            });
        }

        let mut groups: BTreeMap<Cell, Sum> = BTreeMap::new();
        for row in table.rows() {
            let key = &row[key_idx];
            if key.is_null() {
                continue;
            }
            groups.entry(key.clone()).or_default().add(&row[value_idx]);
        }

        let columns = vec![
            Column::new(group_by, key_column.column_type),
            Column::new(field, ColumnType::Numeric),
        ];
        let rows: Vec<Vec<Cell>> = groups
            .into_iter()
            .map(|(key, sum)| vec![key, sum.into_cell()])
            .collect();
        let group_count = rows.len();

        ctx.insert_output(target, Table::from_parts(columns, rows));
        ctx.log(
            self.name(),
            format!(
                "Grouped by '{}', summed '{}', created sheet '{}'",
                group_by, field, target
            ),
            group_count,
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Sum {
    Int(i64),
    Float(f64),
}

impl Default for Sum {
    fn default() -> Self {
        Sum::Int(0)
    }
}

impl Sum {
    fn add(&mut self, cell: &Cell) {
        *self = match (*self, cell) {
            (Sum::Int(acc), Cell::Int(v)) => match acc.checked_add(*v) {
                Some(total) => Sum::Int(total),
                None => Sum::Float(acc as f64 + *v as f64),
            },
            (acc, Cell::Int(_) | Cell::Float(_)) => {
                Sum::Float(acc.as_f64() + cell.as_f64().unwrap_or(0.0))
            }
            (acc, _) => acc,
        };
    }

    fn as_f64(self) -> f64 {
        match self {
            Sum::Int(i) => i as f64,
            Sum::Float(f) => f,
        }
    }

    fn into_cell(self) -> Cell {
        match self {
            Sum::Int(i) => Cell::Int(i),
            Sum::Float(f) => Cell::Float(f),
        }
    }
}
