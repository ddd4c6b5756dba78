//! File layer
//!
//! Loads input tables and workflows from disk and writes output tables and
//! execution records under one output directory:
//!
//! ```text
//! <root>/output_<execution id>_<sheet>.json
//! <root>/executions/<execution id>.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use uuid::Uuid;

use crate::error::{Result, SheetflowError};
use crate::execution::{ExecutionRecord, OutputFile};
use crate::table::Table;
use crate::workflow::Workflow;

const EXECUTIONS_DIR: &str = "executions";

/// Read a JSON records file into a table
pub fn load_table(path: &Path) -> Result<Table> {
    let content = fs::read_to_string(path)?;
    Table::from_json_str(&content)
}

/// Read a workflow; `.yaml`/`.yml` files are YAML, anything else JSON
pub fn load_workflow(path: &Path) -> Result<Workflow> {
    let content = fs::read_to_string(path)?;
    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
        .unwrap_or(false);

    if is_yaml {
        Workflow::from_yaml_str(&content)
    } else {
        Workflow::from_json_str(&content)
    }
}

/// Reject sheet names that are empty or could escape the output directory
///
/// Letters, digits, spaces, `-` and `_` are allowed.
pub fn validate_sheet_name(sheet: &str) -> Result<()> {
    match sheet_name_problem(sheet) {
        Some(reason) => Err(SheetflowError::InvalidSheetName {
            sheet: sheet.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// Why `sheet` cannot name an output file, if it cannot
pub(crate) fn sheet_name_problem(sheet: &str) -> Option<&'static str> {
    if sheet.trim().is_empty() {
        Some("name is empty")
    } else if sheet.contains("..") || sheet.contains('/') || sheet.contains('\\') {
        Some("name contains a path separator")
    } else if !sheet
        .chars()
        .all(|c| c.is_alphanumeric() || c == ' ' || c == '-' || c == '_')
    {
        Some("name contains characters other than letters, digits, spaces, '-' or '_'")
    } else {
        None
    }
}

/// Output directory for one or more executions
#[derive(Debug, Clone)]
pub struct OutputStore {
    root: PathBuf,
}

impl OutputStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path an output table of `execution_id` is written to
    pub fn table_path(&self, execution_id: &Uuid, sheet: &str) -> Result<PathBuf> {
        validate_sheet_name(sheet)?;
        Ok(self
            .root
            .join(format!("output_{}_{}.json", execution_id, sheet)))
    }

    pub fn execution_path(&self, execution_id: &Uuid) -> PathBuf {
        self.root
            .join(EXECUTIONS_DIR)
            .join(format!("{}.json", execution_id))
    }

    /// Write one output table as JSON records
    pub fn save_table(
        &self,
        execution_id: &Uuid,
        sheet: &str,
        table: &Table,
    ) -> Result<OutputFile> {
        let path = self.table_path(execution_id, sheet)?;
        fs::create_dir_all(&self.root)?;
        fs::write(&path, serde_json::to_string_pretty(table)?)?;

        tracing::info!(path = %path.display(), rows = table.row_count(), "Saved output table");

        Ok(OutputFile {
            sheet: sheet.to_string(),
            path,
            rows: table.row_count(),
        })
    }

    /// Write every output table of a run, or none of them
    ///
    /// All sheet names are checked before the first write. If a write fails,
    /// the files already written for this run are removed again.
    pub fn save_tables(
        &self,
        execution_id: &Uuid,
        outputs: &IndexMap<String, Table>,
    ) -> Result<Vec<OutputFile>> {
        for sheet in outputs.keys() {
            validate_sheet_name(sheet)?;
        }

        let mut written = Vec::with_capacity(outputs.len());
        for (sheet, table) in outputs {
            match self.save_table(execution_id, sheet, table) {
                Ok(file) => written.push(file),
                Err(err) => {
                    for file in &written {
                        if let Err(e) = fs::remove_file(&file.path) {
                            tracing::warn!(
                                path = %file.path.display(),
                                error = %e,
                                "Failed to remove partial output"
                            );
                        }
                    }
                    return Err(err);
                }
            }
        }
        Ok(written)
    }

    pub fn save_execution(&self, record: &ExecutionRecord) -> Result<PathBuf> {
        let path = self.execution_path(&record.id);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, serde_json::to_string_pretty(record)?)?;

        tracing::debug!(path = %path.display(), status = %record.status, "Saved execution record");
        Ok(path)
    }

    pub fn load_execution(&self, execution_id: &Uuid) -> Result<ExecutionRecord> {
        let content = fs::read_to_string(self.execution_path(execution_id))?;
        Ok(serde_json::from_str(&content)?)
    }
}
