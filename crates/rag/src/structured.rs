//! Structured Query Engine
//!
//! Answers aggregate questions ("all wheelchair accessible lecture halls
//! near me") over the whole building table. The LLM does not write code:
//! it returns a JSON query plan (filters, sort, columns, limit) that is
//! validated against the table schema and executed here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use campus_guide_config::LlmSettings;
use campus_guide_core::{FieldMap, GenerationConfig, LanguageModel, RetrievedDocument, StructuredQuery};
use campus_guide_llm::{parse_json, Llama3PromptBuilder, ModelOutputError};

use crate::records::{value_to_text, RecordTable};

/// Id of the document returned when a plan cannot be used
pub const ERROR_DOCUMENT_ID: &str = "structured_query_error";

/// Name of the identifier column in structured results
pub const RESULT_ID_FIELD: &str = "gebäude_id";

/// Column added when the user's position is known
pub const DISTANCE_FIELD: &str = "distance_meters";

const NOT_AVAILABLE: &str = "Not available";
const DROPPED_COLUMNS: &[&str] = &["id", "funktion", "old_identifikator"];
const COORDINATES_FIELD: &str = "koordinaten";
const POSTCODE_FIELD: &str = "postleitzahl";
const ACCESSIBILITY_FIELD: &str = "rollstuhlgerechtigkeit";
const HEAD_ROWS: usize = 5;
const EARTH_RADIUS_M: f64 = 6_371_000.0;

const PLAN_INSTRUCTIONS: &str = r#"You answer questions about campus buildings by writing a query plan for a table.

{schema}

These are the first rows of the table:
{head}

Reply with a single JSON object and nothing else:
{"filters": [{"field": "<column>", "op": "<op>", "value": <value>}], "sort_by": "<column or null>", "descending": false, "columns": ["<column>", ...], "limit": <number or null>}

Allowed ops: eq, ne, contains, gt, lt, gte, lte, is_true, is_false.
- Use "contains" on the "fakten" column for specific facilities or features, with the most promising keyword as value.
- If the user asks about buildings near them, sort by "distance_meters" (if it exists) and include it in "columns".
- "columns" lists only the columns needed to answer the question; identifier and name are always included.
- Combine several filters instead of asking for more than one query."#;

/// Comparison operator of a plan filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Ne,
    Contains,
    Gt,
    Lt,
    Gte,
    Lte,
    IsTrue,
    IsFalse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    #[serde(default)]
    pub value: Value,
}

/// Query plan produced by the LLM
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub descending: bool,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Engine options
#[derive(Debug, Clone)]
pub struct StructuredOptions {
    pub generation: GenerationConfig,
    /// Row cap for results
    pub max_results: usize,
}

impl Default for StructuredOptions {
    fn default() -> Self {
        Self {
            generation: LlmSettings::default().structured,
            max_results: 10,
        }
    }
}

/// Parse `"[49.01, 8.41]"`, `"['49.01', '8.41']"` or `"49.01,8.41"`
pub fn parse_coordinates(text: &str) -> Option<(f64, f64)> {
    let inner = text
        .trim()
        .trim_start_matches(|c: char| c == '[' || c == '(')
        .trim_end_matches(|c: char| c == ']' || c == ')');
    let mut parts = inner
        .split(',')
        .map(|p| p.trim().trim_matches(|c: char| c == '\'' || c == '"').trim());
    let lat = parts.next()?.parse::<f64>().ok()?;
    let lon = parts.next()?.parse::<f64>().ok()?;
    if parts.next().is_some() || !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return None;
    }
    Some((lat, lon))
}

/// Great-circle distance in metres (haversine)
pub fn haversine_meters(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lon1) = from;
    let (lat2, lon2) = to;
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_M * c
}

fn is_missing(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "ja"),
        _ => false,
    }
}

/// Normalise one record for structured querying
fn preprocess_row(mut row: FieldMap, id_column: &str, user: Option<(f64, f64)>) -> FieldMap {
    for column in DROPPED_COLUMNS {
        if *column != id_column {
            row.remove(*column);
        }
    }

    if let Some(postcode) = row.get_mut(POSTCODE_FIELD) {
        let text = match &*postcode {
            Value::Number(n) => match n.as_f64() {
                Some(f) if f.fract() == 0.0 => format!("{}", f as i64),
                _ => n.to_string(),
            },
            other => value_to_text(other).replace(".0", ""),
        };
        *postcode = Value::String(text);
    }

    if let Some(access) = row.get_mut(ACCESSIBILITY_FIELD) {
        let accessible = matches!(
            value_to_text(access).trim().to_lowercase().as_str(),
            "yes" | "limited" | "true"
        ) || *access == Value::Bool(true);
        *access = Value::Bool(accessible);
    }

    if let Some(user) = user {
        let distance = row
            .get(COORDINATES_FIELD)
            .map(value_to_text)
            .and_then(|text| {
                let parsed = parse_coordinates(&text);
                if parsed.is_none() && !text.trim().is_empty() {
                    tracing::debug!(coordinates = %text, "Unparsable building coordinates");
                }
                parsed
            })
            .map(|building| Value::from(haversine_meters(user, building).round() as i64))
            .unwrap_or(Value::Null);
        row.insert(DISTANCE_FIELD.to_string(), distance);
    }

    for value in row.values_mut() {
        if is_missing(value) {
            *value = Value::String(NOT_AVAILABLE.to_string());
        }
    }
    row
}

/// Compare two cells: numbers first (numerically), then text
fn compare_cells(a: &Value, b: &Value, descending: bool) -> Ordering {
    let ordered = |o: Ordering| if descending { o.reverse() } else { o };
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => ordered(x.total_cmp(&y)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => ordered(value_to_text(a).to_lowercase().cmp(&value_to_text(b).to_lowercase())),
    }
}

impl Filter {
    fn matches(&self, row: &FieldMap) -> bool {
        let Some(cell) = row.get(&self.field) else {
            return false;
        };
        let numeric = || as_number(cell).zip(as_number(&self.value));
        match self.op {
            FilterOp::Eq => self.equals(cell),
            FilterOp::Ne => !self.equals(cell),
            FilterOp::Contains => value_to_text(cell)
                .to_lowercase()
                .contains(&value_to_text(&self.value).to_lowercase()),
            FilterOp::Gt => numeric().is_some_and(|(c, v)| c > v),
            FilterOp::Lt => numeric().is_some_and(|(c, v)| c < v),
            FilterOp::Gte => numeric().is_some_and(|(c, v)| c >= v),
            FilterOp::Lte => numeric().is_some_and(|(c, v)| c <= v),
            FilterOp::IsTrue => is_truthy(cell),
            FilterOp::IsFalse => !is_truthy(cell),
        }
    }

    fn equals(&self, cell: &Value) -> bool {
        if let (Value::Bool(_), _) | (_, Value::Bool(_)) = (cell, &self.value) {
            return is_truthy(cell) == is_truthy(&self.value);
        }
        match (as_number(cell), as_number(&self.value)) {
            (Some(c), Some(v)) => (c - v).abs() < f64::EPSILON,
            _ => value_to_text(cell).trim().to_lowercase() == value_to_text(&self.value).trim().to_lowercase(),
        }
    }
}

/// LLM-planned filtering and sorting over the building table
pub struct StructuredQueryEngine {
    llm: Arc<dyn LanguageModel>,
    rows: Vec<FieldMap>,
    columns: BTreeSet<String>,
    id_column: String,
    name_column: String,
    prompt: Llama3PromptBuilder,
    options: StructuredOptions,
}

impl StructuredQueryEngine {
    /// Preprocess the table and prepare the planning prompt
    ///
    /// `user_coords` enables the `distance_meters` column; unparsable
    /// coordinates are logged and ignored.
    pub fn new(
        table: &RecordTable,
        llm: Arc<dyn LanguageModel>,
        user_coords: Option<&str>,
        options: StructuredOptions,
    ) -> Self {
        let user = user_coords.and_then(|text| {
            let parsed = parse_coordinates(text);
            if parsed.is_none() {
                tracing::warn!(coordinates = %text, "Could not parse user coordinates");
            }
            parsed
        });

        let rows: Vec<FieldMap> = table
            .records()
            .iter()
            .map(|r| preprocess_row(r.fields.clone(), table.id_column(), user))
            .collect();
        let columns: BTreeSet<String> = rows.iter().flat_map(|r| r.keys().cloned()).collect();

        let prompt = Llama3PromptBuilder::new(
            PLAN_INSTRUCTIONS
                .replace("{schema}", &Self::schema_description(&rows, &columns))
                .replace("{head}", &Self::head(&rows)),
        );

        Self {
            llm,
            rows,
            columns,
            id_column: table.id_column().to_string(),
            name_column: table.name_column().to_string(),
            prompt,
            options,
        }
    }

    /// Column overview with distinct-value counts
    fn schema_description(rows: &[FieldMap], columns: &BTreeSet<String>) -> String {
        let mut lines = vec!["Columns of the table:".to_string()];
        for column in columns {
            let values: BTreeSet<String> = rows
                .iter()
                .filter_map(|r| r.get(column))
                .map(value_to_text)
                .collect();
            let mut line = format!("- `{}`: Contains {} unique values.", column, values.len());
            if values.len() > 1 && values.len() <= 5 {
                let listed: Vec<&str> = values.iter().map(String::as_str).collect();
                line.push_str(&format!(" The values are: {:?}", listed));
            }
            lines.push(line);
        }
        lines.join("\n")
    }

    fn head(rows: &[FieldMap]) -> String {
        rows.iter()
            .take(HEAD_ROWS)
            .filter_map(|r| serde_json::to_string(r).ok())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// System prompt sent with every plan request
    pub fn system_prompt(&self) -> &str {
        self.prompt.system_prompt()
    }

    /// Preprocessed rows
    pub fn rows(&self) -> &[FieldMap] {
        &self.rows
    }

    fn known_field(&self, field: &str) -> bool {
        field == RESULT_ID_FIELD || self.columns.contains(field)
    }

    fn resolve_field<'a>(&'a self, field: &'a str) -> &'a str {
        if field == RESULT_ID_FIELD {
            &self.id_column
        } else {
            field
        }
    }

    /// Reject plans that name columns the table does not have
    pub fn validate(&self, plan: &QueryPlan) -> Result<(), ModelOutputError> {
        let referenced = plan
            .filters
            .iter()
            .map(|f| f.field.as_str())
            .chain(plan.sort_by.as_deref())
            .chain(plan.columns.iter().map(String::as_str));
        for field in referenced {
            if !self.known_field(field) {
                return Err(ModelOutputError::UnknownValue(format!("unknown column '{}'", field)));
            }
        }
        Ok(())
    }

    /// Run a validated plan over the table
    pub fn execute(&self, plan: &QueryPlan) -> Vec<RetrievedDocument> {
        let filters: Vec<Filter> = plan
            .filters
            .iter()
            .map(|f| Filter {
                field: self.resolve_field(&f.field).to_string(),
                ..f.clone()
            })
            .collect();

        let mut matched: Vec<&FieldMap> = self
            .rows
            .iter()
            .filter(|row| filters.iter().all(|f| f.matches(row)))
            .collect();

        if let Some(sort_by) = plan.sort_by.as_deref().map(|f| self.resolve_field(f)) {
            let missing = Value::Null;
            matched.sort_by(|a, b| {
                compare_cells(
                    a.get(sort_by).unwrap_or(&missing),
                    b.get(sort_by).unwrap_or(&missing),
                    plan.descending,
                )
            });
        }

        // identifier and name first, then the columns the answer needs
        let mut wanted: Vec<&str> = Vec::new();
        let relevant = plan
            .columns
            .iter()
            .map(String::as_str)
            .chain(plan.sort_by.as_deref())
            .chain(plan.filters.iter().map(|f| f.field.as_str()))
            .map(|f| self.resolve_field(f));
        for field in relevant {
            if field != self.id_column && field != self.name_column && !wanted.contains(&field) {
                wanted.push(field);
            }
        }

        let limit = plan
            .limit
            .unwrap_or(self.options.max_results)
            .min(self.options.max_results);

        matched
            .into_iter()
            .take(limit)
            .map(|row| {
                let id = row.get(&self.id_column).map(value_to_text).unwrap_or_default();
                let mut data = FieldMap::new();
                data.insert(RESULT_ID_FIELD.to_string(), Value::String(id.clone()));
                if let Some(name) = row.get(&self.name_column) {
                    data.insert(self.name_column.clone(), name.clone());
                }
                for field in &wanted {
                    if let Some(value) = row.get(*field) {
                        data.insert(field.to_string(), value.clone());
                    }
                }
                RetrievedDocument::exact(id, data)
            })
            .collect()
    }

    fn error_document(error: &ModelOutputError, response: &str) -> RetrievedDocument {
        let mut data = FieldMap::new();
        data.insert("error".to_string(), Value::String(error.to_string()));
        data.insert("response".to_string(), Value::String(response.to_string()));
        RetrievedDocument::exact(ERROR_DOCUMENT_ID, data)
    }
}

#[async_trait]
impl StructuredQuery for StructuredQueryEngine {
    async fn query(
        &self,
        natural_language_query: &str,
    ) -> campus_guide_core::Result<Vec<RetrievedDocument>> {
        if self.rows.is_empty() {
            return Ok(Vec::new());
        }

        let prompt = self.prompt.single(natural_language_query);
        let response = self.llm.generate(&prompt, &self.options.generation).await?;

        let plan = parse_json::<QueryPlan>(&response).and_then(|plan| {
            self.validate(&plan)?;
            Ok(plan)
        });

        match plan {
            Ok(plan) => {
                tracing::debug!(?plan, "Executing structured query plan");
                let documents = self.execute(&plan);
                tracing::info!(documents = documents.len(), "Structured query complete");
                Ok(documents)
            },
            Err(error) => {
                tracing::error!(
                    reason = error.tag(),
                    %error,
                    response = %response,
                    "Structured query plan rejected"
                );
                Ok(vec![Self::error_document(&error, &response)])
            },
        }
    }
}
