//! `filter`: keep the rows whose column satisfies a comparison

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use super::{column_index, param_str, require_column, require_key, require_str, Rule};
use crate::context::ExecutionContext;
use crate::error::{StepError, ValidationError};
use crate::table::{parse_date, Cell, ColumnType, Schema};
use crate::workflow::Params;

/// Comparison operators accepted by `filter`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Contains,
}

impl Operator {
    pub const ALL: [Operator; 7] = [
        Operator::Eq,
        Operator::Ne,
        Operator::Gt,
        Operator::Lt,
        Operator::Ge,
        Operator::Le,
        Operator::Contains,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Ge => ">=",
            Operator::Le => "<=",
            Operator::Contains => "contains",
        }
    }

    fn accepts(&self, ord: Ordering) -> bool {
        match self {
            Operator::Eq => ord == Ordering::Equal,
            Operator::Ne => ord != Ordering::Equal,
            Operator::Gt => ord == Ordering::Greater,
            Operator::Lt => ord == Ordering::Less,
            Operator::Ge => ord != Ordering::Less,
            Operator::Le => ord != Ordering::Greater,
            Operator::Contains => false,
        }
    }
}

impl FromStr for Operator {
    type Err = StepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operator::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| StepError::UnsupportedOperator {
                operator: s.to_string(),
            })
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison target, already coerced to the column's type
enum Target {
    Text(String),
    Typed(Cell),
}

#[derive(Debug, Default)]
pub struct FilterRule;

impl Rule for FilterRule {
    fn name(&self) -> &'static str {
        "filter"
    }

    fn validate(
        &self,
        index: usize,
        params: &Params,
        schema: &Schema,
    ) -> Result<(), ValidationError> {
        require_column(index, self.name(), params, "column", schema)?;
        require_str(index, self.name(), params, "operator")?;
        // An explicit null is a value: nothing equals it.
        require_key(index, self.name(), params, "value")?;
        Ok(())
    }

    fn execute(&self, ctx: &mut ExecutionContext, params: &Params) -> Result<(), StepError> {
        let column = param_str(params, "column")?;
        let operator: Operator = param_str(params, "operator")?.parse()?;
        let value = params.get("value").ok_or_else(|| StepError::MissingParam {
            name: "value".to_string(),
        })?;

        let table = ctx.current_table();
        let idx = column_index(table, column)?;
        let column_type = table.columns()[idx].column_type;

        let filtered = if value.is_null() {
            table.filter_rows(|_| operator == Operator::Ne)
        } else if operator == Operator::Contains {
            let needle = value_text(value).to_lowercase();
            table.filter_rows(|row| {
                row[idx]
                    .to_text()
                    .map(|text| text.to_lowercase().contains(&needle))
                    .unwrap_or(false)
            })
        } else {
            let target = coerce(column, column_type, value)?;
            table.filter_rows(|row| matches_cell(&row[idx], operator, &target))
        };

        let rows = filtered.row_count();
        ctx.replace_current(filtered);
        ctx.log(
            self.name(),
            format!("Filtered by {} {} {}", column, operator, value_text(value)),
            rows,
        );
        Ok(())
    }
}

fn matches_cell(cell: &Cell, operator: Operator, target: &Target) -> bool {
    if cell.is_null() {
        return operator == Operator::Ne;
    }
    let ord = match target {
        Target::Text(expected) => cell.to_string().as_str().cmp(expected.as_str()),
        Target::Typed(expected) => cell.cmp(expected),
    };
    operator.accepts(ord)
}

fn coerce(column: &str, column_type: ColumnType, value: &Value) -> Result<Target, StepError> {
    let coerced = match (column_type, value) {
        (ColumnType::String, Value::String(s)) => Some(Target::Text(s.clone())),
        (ColumnType::String, Value::Number(_) | Value::Bool(_)) => {
            Some(Target::Text(value.to_string()))
        }
        (ColumnType::Numeric, Value::Number(n)) => Some(Target::Typed(match n.as_i64() {
            Some(i) => Cell::Int(i),
            None => Cell::Float(n.as_f64().unwrap_or(f64::NAN)),
        })),
        (ColumnType::Numeric, Value::String(s)) => parse_number(s).map(Target::Typed),
        (ColumnType::Boolean, Value::Bool(b)) => Some(Target::Typed(Cell::Bool(*b))),
        (ColumnType::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(Target::Typed(Cell::Bool(true))),
            "false" => Some(Target::Typed(Cell::Bool(false))),
            _ => None,
        },
        (ColumnType::Date, Value::String(s)) => parse_date(s).map(|d| Target::Typed(Cell::Date(d))),
        _ => None,
    };

    coerced.ok_or_else(|| StepError::TypeMismatch {
        column: column.to_string(),
        column_type,
        value: value.to_string(),
    })
}

fn parse_number(raw: &str) -> Option<Cell> {
    let raw = raw.trim();
    raw.parse::<i64>()
        .map(Cell::Int)
        .ok()
        .or_else(|| raw.parse::<f64>().ok().filter(|f| f.is_finite()).map(Cell::Float))
}

/// Strings render without quotes, everything else as JSON
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
