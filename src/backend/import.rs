use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::value::Value;

use super::MemoryBackend;

/// Settings for loading objects from a CSV file.
#[derive(Debug, Clone)]
pub struct ObjectImport {
    /// Path to the CSV file.
    pub path: PathBuf,
    /// Column holding the integer object id. Every other column becomes an
    /// attribute.
    pub id_column: String,
}

impl ObjectImport {
    /// Objects keyed by the `id` column.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            id_column: "id".to_owned(),
        }
    }
}

/// Settings for loading links from a CSV file.
#[derive(Debug, Clone)]
pub struct LinkImport {
    /// Path to the CSV file.
    pub path: PathBuf,
    /// Column holding the integer link id.
    pub id_column: String,
    /// Column holding the source object id.
    pub o1_column: String,
    /// Column holding the target object id.
    pub o2_column: String,
}

impl LinkImport {
    /// Links keyed by `id`, `o1_id` and `o2_id`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            id_column: "id".to_owned(),
            o1_column: "o1_id".to_owned(),
            o2_column: "o2_id".to_owned(),
        }
    }
}

/// Counts of loaded rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    /// Objects loaded.
    pub objects_imported: u64,
    /// Links loaded.
    pub links_imported: u64,
}

/// Failures while loading CSV data.
#[derive(Error, Debug)]
pub enum ImportError {
    /// Malformed content.
    #[error("{0}")]
    Message(String),
    /// IO error from file operations.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// CSV parsing error.
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl MemoryBackend {
    /// Loads objects and, optionally, links. Links may reference objects that
    /// were not loaded; they simply never match a vertex.
    pub fn load_csv(
        &self,
        objects: &ObjectImport,
        links: Option<&LinkImport>,
    ) -> Result<ImportSummary, ImportError> {
        let mut summary = ImportSummary::default();
        for (id, attrs) in read_rows(&objects.path, &[&objects.id_column])? {
            self.add_object(id[0], attrs);
            summary.objects_imported += 1;
        }
        if let Some(cfg) = links {
            let keys = [
                cfg.id_column.as_str(),
                cfg.o1_column.as_str(),
                cfg.o2_column.as_str(),
            ];
            for (ids, attrs) in read_rows(&cfg.path, &keys)? {
                self.add_link(ids[0], ids[1], ids[2], attrs);
                summary.links_imported += 1;
            }
        }
        info!(
            objects = summary.objects_imported,
            links = summary.links_imported,
            "import.csv_loaded"
        );
        Ok(summary)
    }
}

type ParsedRow = (Vec<i64>, BTreeMap<String, Value>);

fn read_rows(path: &Path, keys: &[&str]) -> Result<Vec<ParsedRow>, ImportError> {
    let mut reader = ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?.clone();
    let key_index: Vec<usize> = keys
        .iter()
        .map(|k| find_column(&headers, k, path))
        .collect::<Result<_, _>>()?;

    let mut rows = Vec::new();
    for (line, result) in reader.records().enumerate() {
        let record = result?;
        let mut ids = Vec::with_capacity(keys.len());
        for (key, idx) in keys.iter().zip(&key_index) {
            let raw = record.get(*idx).map(str::trim).unwrap_or_default();
            let id = raw.parse::<i64>().map_err(|_| {
                ImportError::Message(format!(
                    "{}: row {} has non-integer '{key}' value '{raw}'",
                    path.display(),
                    line + 1
                ))
            })?;
            ids.push(id);
        }
        let attrs = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| !key_index.contains(i))
            .filter_map(|(i, name)| {
                let raw = record.get(i)?.trim();
                (!raw.is_empty()).then(|| (name.to_owned(), Value::infer(raw)))
            })
            .collect();
        rows.push((ids, attrs));
    }
    Ok(rows)
}

fn find_column(headers: &StringRecord, name: &str, path: &Path) -> Result<usize, ImportError> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| {
            ImportError::Message(format!("{} has no '{name}' column", path.display()))
        })
}
