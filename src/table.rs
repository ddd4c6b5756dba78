//! In-memory tables
//!
//! A [`Table`] is an ordered list of typed columns plus rows of [`Cell`]s.
//! Column types are fixed when the table is built, either inferred from the
//! cells or given explicitly, so comparisons and sums never depend on
//! whatever happens to sit in a single cell.
//!
//! Tables enter and leave the crate as JSON "records": an array of flat
//! objects, one per row, keys in column order.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use indexmap::IndexSet;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Number, Value};

use crate::error::{Result, SheetflowError};

/// One row rendered as a JSON object, keys in column order
pub type Record = Map<String, Value>;

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Semantic type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Text, and the fallback for mixed or all-null columns
    String,
    Numeric,
    Date,
    Boolean,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::String => write!(f, "string"),
            ColumnType::Numeric => write!(f, "numeric"),
            ColumnType::Date => write!(f, "date"),
            ColumnType::Boolean => write!(f, "boolean"),
        }
    }
}

/// A single cell value
///
/// Equality and ordering are total: `Int` and `Float` compare by exact
/// numeric value (`-0.0 == 0`, NaN after every number), and different kinds
/// order as `Null < Bool < number < Date < Text`.
#[derive(Debug, Clone)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDateTime),
}

impl Cell {
    /// Convert a JSON scalar into a cell; arrays and objects are rejected
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Cell::Null),
            Value::Bool(b) => Ok(Cell::Bool(*b)),
            Value::Number(n) => Ok(match n.as_i64() {
                Some(i) => Cell::Int(i),
                None => Cell::Float(n.as_f64().unwrap_or(f64::NAN)),
            }),
            Value::String(s) => Ok(Cell::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => Err(SheetflowError::InvalidTable {
                reason: format!("nested value {} cannot be stored in a cell", value),
            }),
        }
    }

    /// Render the cell as JSON (non-finite floats become null)
    pub fn to_json(&self) -> Value {
        match self {
            Cell::Null => Value::Null,
            Cell::Bool(b) => Value::Bool(*b),
            Cell::Int(i) => Value::Number((*i).into()),
            Cell::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
            Cell::Text(s) => Value::String(s.clone()),
            Cell::Date(d) => Value::String(format_date(d)),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Numeric view of `Int` and `Float` cells
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(i) => Some(*i as f64),
            Cell::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Text coercion used by `contains` and string columns; `None` for null
    pub fn to_text(&self) -> Option<String> {
        if self.is_null() {
            None
        } else {
            Some(self.to_string())
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Cell::Null => 0,
            Cell::Bool(_) => 1,
            Cell::Int(_) | Cell::Float(_) => 2,
            Cell::Date(_) => 3,
            Cell::Text(_) => 4,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Bool(b) => write!(f, "{}", b),
            Cell::Int(i) => write!(f, "{}", i),
            Cell::Float(x) => write!(f, "{}", x),
            Cell::Text(s) => write!(f, "{}", s),
            Cell::Date(d) => write!(f, "{}", format_date(d)),
        }
    }
}

impl Ord for Cell {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Cell::Null, Cell::Null) => Ordering::Equal,
            (Cell::Bool(a), Cell::Bool(b)) => a.cmp(b),
            (Cell::Int(a), Cell::Int(b)) => a.cmp(b),
            (Cell::Float(a), Cell::Float(b)) => cmp_floats(*a, *b),
            (Cell::Int(a), Cell::Float(b)) => cmp_int_float(*a, *b),
            (Cell::Float(a), Cell::Int(b)) => cmp_int_float(*b, *a).reverse(),
            (Cell::Date(a), Cell::Date(b)) => a.cmp(b),
            (Cell::Text(a), Cell::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// NaN equals NaN and sorts after every number; `-0.0` equals `0.0`
fn cmp_floats(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Exact comparison; the integer is never rounded through `f64`
fn cmp_int_float(i: i64, f: f64) -> Ordering {
    // 2^63, the first float past i64::MAX
    const I64_END: f64 = 9_223_372_036_854_775_808.0;

    if f.is_nan() || f >= I64_END {
        return Ordering::Less;
    }
    if f < -I64_END {
        return Ordering::Greater;
    }

    let whole = f.trunc();
    // In range, so the cast is exact.
    match i.cmp(&(whole as i64)) {
        Ordering::Equal => whole.partial_cmp(&f).unwrap_or(Ordering::Equal),
        ord => ord,
    }
}

impl PartialOrd for Cell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Cell {}

/// Parse `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM:SS` or `YYYY-MM-DD HH:MM:SS`
pub fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn format_date(d: &NaiveDateTime) -> String {
    if d.hour() == 0 && d.minute() == 0 && d.second() == 0 && d.nanosecond() == 0 {
        d.format(DATE_FORMAT).to_string()
    } else {
        d.format(DATETIME_FORMATS[0]).to_string()
    }
}

/// A named, typed column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// Column names and types of a table, in order
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.column_type)
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Tabular value: typed columns plus rows, each row one cell per column
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Build a table and infer each column's type from its cells
    pub fn new(names: Vec<String>, rows: Vec<Vec<Cell>>) -> Result<Self> {
        check_shape(&names, &rows)?;
        let columns = names
            .into_iter()
            .enumerate()
            .map(|(idx, name)| {
                let column_type = infer_column_type(rows.iter().map(|r| &r[idx]));
                Column { name, column_type }
            })
            .collect();
        Self::with_columns(columns, rows)
    }

    /// Build a table with explicit column types
    ///
    /// Text cells in date columns are parsed into dates; any other cell that
    /// does not fit its column type is rejected. String columns accept any
    /// cell.
    pub fn with_columns(columns: Vec<Column>, mut rows: Vec<Vec<Cell>>) -> Result<Self> {
        let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        check_shape(&names, &rows)?;

        for row in rows.iter_mut() {
            for (cell, column) in row.iter_mut().zip(&columns) {
                conform(cell, column)?;
            }
        }

        Ok(Self { columns, rows })
    }

    /// Assemble a table whose cells are already known to fit their columns
    pub(crate) fn from_parts(columns: Vec<Column>, rows: Vec<Vec<Cell>>) -> Self {
        debug_assert!(rows.iter().all(|r| r.len() == columns.len()));
        Self { columns, rows }
    }

    /// Build a table from JSON records, columns in first-seen key order
    pub fn from_records(records: &[Value]) -> Result<Self> {
        let mut names: IndexSet<String> = IndexSet::new();
        for (idx, record) in records.iter().enumerate() {
            let obj = record.as_object().ok_or_else(|| SheetflowError::InvalidTable {
                reason: format!("row {} is not an object", idx),
            })?;
            names.extend(obj.keys().cloned());
        }

        let rows = records
            .iter()
            .filter_map(Value::as_object)
            .map(|obj| {
                names
                    .iter()
                    .map(|name| obj.get(name).map(Cell::from_json).unwrap_or(Ok(Cell::Null)))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(names.into_iter().collect(), rows)
    }

    /// Parse a JSON document holding an array of records
    pub fn from_json_str(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        match value {
            Value::Array(records) => Self::from_records(&records),
            other => Err(SheetflowError::InvalidTable {
                reason: format!("expected an array of records, got {}", json_kind(&other)),
            }),
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn schema(&self) -> Schema {
        Schema::new(self.columns.clone())
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// New table holding the rows that satisfy `keep`, in their original order
    pub fn filter_rows<F>(&self, mut keep: F) -> Table
    where
        F: FnMut(&[Cell]) -> bool,
    {
        Table {
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }

    /// First `n` rows as records
    pub fn head(&self, n: usize) -> Vec<Record> {
        self.rows.iter().take(n).map(|r| self.to_record(r)).collect()
    }

    pub fn to_records(&self) -> Vec<Record> {
        self.head(self.rows.len())
    }

    fn to_record(&self, row: &[Cell]) -> Record {
        self.columns
            .iter()
            .zip(row)
            .map(|(col, cell)| (col.name.clone(), cell.to_json()))
            .collect()
    }
}

impl Serialize for Table {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for row in &self.rows {
            seq.serialize_element(&self.to_record(row))?;
        }
        seq.end()
    }
}

fn check_shape(names: &[String], rows: &[Vec<Cell>]) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name.as_str()) {
            return Err(SheetflowError::InvalidTable {
                reason: format!("duplicate column '{}'", name),
            });
        }
    }

    if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != names.len()) {
        return Err(SheetflowError::InvalidTable {
            reason: format!(
                "row {} has {} cells, expected {}",
                idx,
                row.len(),
                names.len()
            ),
        });
    }
    Ok(())
}

fn infer_column_type<'a>(cells: impl Iterator<Item = &'a Cell>) -> ColumnType {
    let mut seen: Option<ColumnType> = None;
    for cell in cells {
        let ty = match cell {
            Cell::Null => continue,
            Cell::Bool(_) => ColumnType::Boolean,
            Cell::Int(_) | Cell::Float(_) => ColumnType::Numeric,
            Cell::Date(_) => ColumnType::Date,
            Cell::Text(s) if parse_date(s).is_some() => ColumnType::Date,
            Cell::Text(_) => return ColumnType::String,
        };
        match seen {
            None => seen = Some(ty),
            Some(prev) if prev == ty => {}
            Some(_) => return ColumnType::String,
        }
    }
    seen.unwrap_or(ColumnType::String)
}

fn conform(cell: &mut Cell, column: &Column) -> Result<()> {
    let fits = match (column.column_type, &*cell) {
        (_, Cell::Null) | (ColumnType::String, _) => true,
        (ColumnType::Numeric, Cell::Int(_) | Cell::Float(_)) => true,
        (ColumnType::Boolean, Cell::Bool(_)) => true,
        (ColumnType::Date, Cell::Date(_)) => true,
        (ColumnType::Date, Cell::Text(s)) => match parse_date(s) {
            Some(d) => {
                *cell = Cell::Date(d);
                true
            }
            None => false,
        },
        _ => false,
    };

    if fits {
        Ok(())
    } else {
        Err(SheetflowError::InvalidTable {
            reason: format!(
                "value '{}' does not fit {} column '{}'",
                cell, column.column_type, column.name
            ),
        })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
