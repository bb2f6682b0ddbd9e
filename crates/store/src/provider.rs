//! Bulk-fetch collaborators feeding the item store.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use serde_json::Value;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("reading {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("decoding catalog: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("unexpected catalog document: {0}")]
    Shape(String),
}

/// Source of raw item records. One call per load; no retry inside the store.
#[async_trait::async_trait]
pub trait ItemProvider: Send + Sync {
    async fn fetch_all_items(&self) -> Result<Vec<Value>, FetchError>;
}

/// In-memory provider. Records can be swapped between loads and a failure
/// can be scripted, which is what tests and embedders need.
pub struct StaticProvider {
    records: Mutex<Result<Vec<Value>, String>>,
    calls: AtomicUsize,
}

impl StaticProvider {
    pub fn new(records: Vec<Value>) -> Self {
        Self { records: Mutex::new(Ok(records)), calls: AtomicUsize::new(0) }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self { records: Mutex::new(Err(message.into())), calls: AtomicUsize::new(0) }
    }

    pub fn set_records(&self, records: Vec<Value>) {
        *self.records.lock().unwrap_or_else(|e| e.into_inner()) = Ok(records);
    }

    pub fn set_failure(&self, message: impl Into<String>) {
        *self.records.lock().unwrap_or_else(|e| e.into_inner()) = Err(message.into());
    }

    /// Number of fetches served so far.
    pub fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }
}

#[async_trait::async_trait]
impl ItemProvider for StaticProvider {
    async fn fetch_all_items(&self) -> Result<Vec<Value>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let guard = self.records.lock().unwrap_or_else(|e| e.into_inner());
        guard.clone().map_err(FetchError::Transport)
    }
}

/// Reads a catalog export from disk on every fetch.
pub struct JsonFileProvider {
    path: PathBuf,
}

impl JsonFileProvider {
    pub fn new(path: impl AsRef<Path>) -> Self { Self { path: path.as_ref().to_path_buf() } }

    pub fn path(&self) -> &Path { &self.path }
}

#[async_trait::async_trait]
impl ItemProvider for JsonFileProvider {
    async fn fetch_all_items(&self) -> Result<Vec<Value>, FetchError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|source| FetchError::Io { path: self.path.clone(), source })?;
        let doc: Value = serde_json::from_slice(&bytes)?;
        let records = records_from_document(doc)?;
        debug!(path = %self.path.display(), records = records.len(), "provider: file read");
        Ok(records)
    }
}

/// Accepts a bare array, `{ "items": [...] }`, or a collection export keyed
/// by document id (the id is injected into records that lack one).
pub fn records_from_document(doc: Value) -> Result<Vec<Value>, FetchError> {
    match doc {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => {
            if let Some(items) = map.remove("items") {
                return match items {
                    Value::Array(items) => Ok(items),
                    other => Err(FetchError::Shape(format!("`items` must be an array, got {}", kind(&other)))),
                };
            }
            let mut out = Vec::with_capacity(map.len());
            for (id, rec) in map {
                match rec {
                    Value::Object(mut fields) => {
                        fields.entry("id").or_insert(Value::String(id));
                        out.push(Value::Object(fields));
                    }
                    other => return Err(FetchError::Shape(format!("record {} is {}", id, kind(&other)))),
                }
            }
            Ok(out)
        }
        other => Err(FetchError::Shape(format!("top level is {}", kind(&other)))),
    }
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
