//! Building record table
//!
//! Loads the campus building dataset once at startup. Every row keeps all
//! of its columns as opaque fact fields; only the identifier and name
//! columns carry meaning for retrieval.

use serde_json::Value;
use std::io::Read;
use std::path::Path;

use campus_guide_core::{FieldMap, RetrievedDocument};

use crate::RagError;

/// One row of the building dataset
#[derive(Debug, Clone, PartialEq)]
pub struct BuildingRecord {
    /// Building identifier (e.g. "50.34")
    pub id: String,
    /// Display name, empty when the row has none
    pub name: String,
    /// All columns of the row, identifier and name included
    pub fields: FieldMap,
}

impl BuildingRecord {
    /// Text indexed for embedding search: `"<name> <identifier>"`,
    /// hyphens and underscores replaced by spaces
    pub fn document_text(&self) -> String {
        let text = if self.name.is_empty() {
            self.id.clone()
        } else {
            format!("{} {}", self.name, self.id)
        };
        normalize_text(&text)
    }

    pub fn to_document(&self, relevance_score: f32) -> RetrievedDocument {
        RetrievedDocument::new(self.id.clone(), self.fields.clone(), relevance_score)
    }
}

/// Replace `-` and `_` with spaces
pub fn normalize_text(text: &str) -> String {
    text.replace(|c: char| c == '-' || c == '_', " ")
}

/// Render a cell value as plain text
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// In-memory building table, read-only after loading
#[derive(Debug, Clone, Default)]
pub struct RecordTable {
    records: Vec<BuildingRecord>,
    columns: Vec<String>,
    id_column: String,
    name_column: String,
}

impl RecordTable {
    /// Build a table from rows of field maps
    ///
    /// Rows without an identifier cannot be addressed and are skipped.
    pub fn from_rows(
        rows: Vec<FieldMap>,
        id_column: &str,
        name_column: &str,
    ) -> Result<Self, RagError> {
        let mut columns: Vec<String> = Vec::new();
        let mut records = Vec::with_capacity(rows.len());

        for (line, mut fields) in rows.into_iter().enumerate() {
            for key in fields.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }

            let id = fields.get(id_column).map(value_to_text).unwrap_or_default();
            let id = id.trim().to_string();
            if id.is_empty() {
                tracing::warn!(row = line, column = id_column, "Skipping record without identifier");
                continue;
            }

            let name = fields.get(name_column).map(value_to_text).unwrap_or_default();
            fields
                .entry(name_column.to_string())
                .or_insert_with(|| Value::String(String::new()));

            records.push(BuildingRecord { id, name, fields });
        }

        if !records.is_empty() && !columns.iter().any(|c| c == id_column) {
            return Err(RagError::Data(format!(
                "Identifier column '{}' not found",
                id_column
            )));
        }
        if !columns.iter().any(|c| c == name_column) {
            columns.push(name_column.to_string());
        }
        columns.sort();

        Ok(Self {
            records,
            columns,
            id_column: id_column.to_string(),
            name_column: name_column.to_string(),
        })
    }

    /// Load the dataset, choosing the format by file extension
    pub fn load(path: &Path, id_column: &str, name_column: &str) -> Result<Self, RagError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        let content = std::fs::read(path).map_err(|e| {
            RagError::Data(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let table = match extension.as_str() {
            "csv" => Self::from_csv(content.as_slice(), id_column, name_column)?,
            "json" => {
                let rows: Vec<FieldMap> = serde_json::from_slice(&content)
                    .map_err(|e| RagError::Data(format!("JSON parse error: {}", e)))?;
                Self::from_rows(rows, id_column, name_column)?
            },
            "yaml" | "yml" => {
                let rows: Vec<FieldMap> = serde_yaml::from_slice(&content)
                    .map_err(|e| RagError::Data(format!("YAML parse error: {}", e)))?;
                Self::from_rows(rows, id_column, name_column)?
            },
            other => {
                return Err(RagError::Data(format!(
                    "Unsupported dataset format '{}': {}",
                    other,
                    path.display()
                )))
            },
        };

        tracing::info!(
            path = %path.display(),
            records = table.len(),
            columns = table.columns.len(),
            "Building records loaded"
        );
        Ok(table)
    }

    /// Parse CSV with a header row; all cells are kept as strings
    pub fn from_csv<R: Read>(
        reader: R,
        id_column: &str,
        name_column: &str,
    ) -> Result<Self, RagError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let headers = reader
            .headers()
            .map_err(|e| RagError::Data(format!("CSV header error: {}", e)))?
            .clone();
        if !headers.iter().any(|h| h == id_column) {
            return Err(RagError::Data(format!(
                "Identifier column '{}' not found in CSV header",
                id_column
            )));
        }

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result.map_err(|e| RagError::Data(format!("CSV row error: {}", e)))?;
            let row: FieldMap = headers
                .iter()
                .enumerate()
                .map(|(i, header)| {
                    let cell = record.get(i).unwrap_or_default();
                    (header.to_string(), Value::String(cell.to_string()))
                })
                .collect();
            rows.push(row);
        }

        Self::from_rows(rows, id_column, name_column)
    }

    pub fn records(&self) -> &[BuildingRecord] {
        &self.records
    }

    pub fn get(&self, index: usize) -> Option<&BuildingRecord> {
        self.records.get(index)
    }

    /// Column names, sorted
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    pub fn name_column(&self) -> &str {
        &self.name_column
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
