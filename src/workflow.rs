//! Workflow definitions
//!
//! A [`Workflow`] is kept as the raw JSON document it was submitted as, so the
//! validator can report structural problems (missing `steps`, wrong shapes)
//! with step indices instead of failing inside a deserializer. Validation
//! turns it into typed [`Step`]s.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SheetflowError};

/// Step parameters: every field of a step object except `type`
pub type Params = Map<String, Value>;

/// Raw workflow document (`{"steps": [...]}`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Workflow {
    definition: Value,
}

impl Workflow {
    pub fn from_value(definition: Value) -> Self {
        Self { definition }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map(Self::from_value)
            .map_err(|e| SheetflowError::WorkflowParse {
                details: e.to_string(),
            })
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str::<Value>(yaml)
            .map(Self::from_value)
            .map_err(|e| SheetflowError::WorkflowParse {
                details: e.to_string(),
            })
    }

    pub fn definition(&self) -> &Value {
        &self.definition
    }

    /// Number of entries under `steps`, when it is an array
    pub fn step_count(&self) -> Option<usize> {
        self.definition
            .get("steps")
            .and_then(Value::as_array)
            .map(Vec::len)
    }
}

impl From<Value> for Workflow {
    fn from(definition: Value) -> Self {
        Self::from_value(definition)
    }
}

/// A validated step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    /// Zero-based position in the workflow
    pub index: usize,
    #[serde(rename = "type")]
    pub step_type: String,
    pub params: Params,
}

impl Step {
    /// Split a step object into its `type` and the remaining fields
    pub fn new(index: usize, step_type: impl Into<String>, object: &Map<String, Value>) -> Self {
        let params = object
            .iter()
            .filter(|(k, _)| k.as_str() != "type")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self {
            index,
            step_type: step_type.into(),
            params,
        }
    }
}
