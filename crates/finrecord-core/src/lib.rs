use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod backend;
pub mod caller;
pub mod config_file;
pub mod export;
pub mod generator;
pub mod parser;
pub mod pipeline;
pub mod prompt;
pub mod table;

// Re-export for convenience
pub use backend::{BackendError, PdfBackend, join_pages};
pub use caller::{CallerConfig, call_model};
pub use generator::{GenerationError, GeneratorConfig, GeneratorKind, TextGenerator};
pub use parser::{SchemaMode, parse_response, validate_schema};
pub use pipeline::{process_documents, run_pipeline};
pub use prompt::{EXPECTED_FIELDS, build_prompt};
pub use table::ResultTable;

/// Default output file written at the end of a run.
pub const DEFAULT_OUTPUT_PATH: &str = "extracted_financial_data.json";

/// A source PDF identified by a human-readable label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub label: String,
    pub path: PathBuf,
}

impl DocumentRef {
    pub fn new(label: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            path: path.into(),
        }
    }
}

/// Parses `LABEL=PATH`. The label may contain spaces; the first `=` splits.
impl FromStr for DocumentRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (label, path) = s
            .split_once('=')
            .ok_or_else(|| format!("expected LABEL=PATH, got {:?}", s))?;
        let label = label.trim();
        let path = path.trim();
        if label.is_empty() {
            return Err(format!("empty label in {:?}", s));
        }
        if path.is_empty() {
            return Err(format!("empty path for document {:?}", label));
        }
        Ok(Self::new(label, path))
    }
}

/// Reject document lists that would break the one-record-per-label invariant.
pub fn validate_documents(documents: &[DocumentRef]) -> Result<(), CoreError> {
    if documents.is_empty() {
        return Err(CoreError::Config("no documents configured".into()));
    }
    let mut seen = std::collections::HashSet::new();
    for doc in documents {
        if !seen.insert(doc.label.as_str()) {
            return Err(CoreError::Config(format!(
                "duplicate document label {:?}",
                doc.label
            )));
        }
    }
    Ok(())
}

/// Placeholder stored when a document produced no usable structured output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FallbackRecord {
    pub error: String,
    pub raw_response: String,
}

/// Per-document unit of output.
///
/// Serialized untagged: a `Parsed` record is written exactly as the model
/// produced it, a `Fallback` record as `{"error": ..., "raw_response": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FinancialRecord {
    Fallback(FallbackRecord),
    Parsed(serde_json::Value),
}

impl FinancialRecord {
    pub fn fallback(error: impl Into<String>, raw_response: impl Into<String>) -> Self {
        FinancialRecord::Fallback(FallbackRecord {
            error: error.into(),
            raw_response: raw_response.into(),
        })
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, FinancialRecord::Fallback(_))
    }

    /// Error message if this is a fallback record.
    pub fn error(&self) -> Option<&str> {
        match self {
            FinancialRecord::Fallback(f) => Some(&f.error),
            FinancialRecord::Parsed(_) => None,
        }
    }
}

/// All records of a run, keyed by document label in input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultCollection {
    records: IndexMap<String, FinancialRecord>,
}

impl ResultCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: impl Into<String>, record: FinancialRecord) {
        self.records.insert(label.into(), record);
    }

    pub fn get(&self, label: &str) -> Option<&FinancialRecord> {
        self.records.get(label)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FinancialRecord)> {
        self.records.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn fallback_count(&self) -> usize {
        self.records.values().filter(|r| r.is_fallback()).count()
    }
}

/// Progress events emitted while processing documents.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Extracting {
        index: usize,
        total: usize,
        label: String,
    },
    Extracted {
        index: usize,
        total: usize,
        label: String,
        chars: usize,
    },
    /// Document text was cut to `max_input_chars` before prompting.
    Truncated {
        index: usize,
        label: String,
        original_chars: usize,
        kept_chars: usize,
    },
    Generating {
        index: usize,
        total: usize,
        label: String,
    },
    Retrying {
        index: usize,
        label: String,
        attempt: u32,
        error: String,
    },
    Completed {
        index: usize,
        total: usize,
        label: String,
        /// `None` when the record was extracted, otherwise the fallback error.
        error: Option<String>,
    },
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to replace output file: {0}")]
    Persist(#[from] tempfile::PersistError),
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Configuration for a pipeline run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Cap on generated tokens passed to the model.
    pub max_length: u32,
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Truncate document text to this many characters before prompting.
    pub max_input_chars: Option<usize>,
    pub schema_mode: SchemaMode,
    pub output_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_length: 512,
            timeout_secs: 120,
            max_retries: 1,
            max_input_chars: None,
            schema_mode: SchemaMode::Strict,
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
        }
    }
}

impl Config {
    pub fn caller_config(&self) -> CallerConfig {
        CallerConfig {
            max_length: self.max_length,
            timeout: Duration::from_secs(self.timeout_secs),
            max_retries: self.max_retries,
            ..CallerConfig::default()
        }
    }
}
