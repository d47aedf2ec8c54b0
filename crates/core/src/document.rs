//! Retrieval and turn result types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field name to value mapping of one building record
pub type FieldMap = BTreeMap<String, serde_json::Value>;

/// Score given to documents found by identifier match
pub const EXACT_MATCH_SCORE: f32 = 1.0;

/// A building record returned by a retrieval call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    /// Building identifier, unique within one result list
    pub id: String,
    /// Fact fields of the record
    pub data: FieldMap,
    /// Relevance in [0, 1]; 1.0 is reserved for exact matches
    pub relevance_score: f32,
}

impl RetrievedDocument {
    pub fn new(id: impl Into<String>, data: FieldMap, relevance_score: f32) -> Self {
        Self {
            id: id.into(),
            data,
            relevance_score: relevance_score.clamp(0.0, 1.0),
        }
    }

    /// Document found through an identifier match
    pub fn exact(id: impl Into<String>, data: FieldMap) -> Self {
        Self::new(id, data, EXACT_MATCH_SCORE)
    }

    pub fn is_exact_match(&self) -> bool {
        self.relevance_score >= EXACT_MATCH_SCORE
    }

    /// Keys whose values carry information (not null, empty string or empty list)
    pub fn non_empty_keys(&self) -> impl Iterator<Item = &String> {
        self.data
            .iter()
            .filter(|(_, value)| !is_empty_value(value))
            .map(|(key, _)| key)
    }

    /// Copy of this document restricted to the given keys
    pub fn with_fields<'a, I>(&self, keys: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let data = keys
            .into_iter()
            .filter_map(|key| self.data.get_key_value(key))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self {
            id: self.id.clone(),
            data,
            relevance_score: self.relevance_score,
        }
    }
}

fn is_empty_value(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.is_empty(),
        serde_json::Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Which retrieval strategy a query needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    /// Lookup of one or a few buildings
    #[default]
    Normal,
    /// Aggregation or filtering across many records
    Complex,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Normal => "normal",
            QueryType::Complex => "complex",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "normal" => Some(QueryType::Normal),
            "complex" => Some(QueryType::Complex),
            _ => None,
        }
    }
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Final value of one conversational turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub answer: String,
    pub link: Option<String>,
}

impl PipelineResult {
    pub fn new(answer: impl Into<String>, link: Option<String>) -> Self {
        Self {
            answer: answer.into(),
            link,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> RetrievedDocument {
        let mut data = FieldMap::new();
        data.insert("name".into(), json!("Mensa"));
        data.insert("adresse".into(), json!("Adenauerring 7"));
        data.insert("oeffnungszeiten".into(), json!(""));
        data.insert("tags".into(), json!([]));
        data.insert("rollstuhlgerecht".into(), json!(true));
        RetrievedDocument::new("30.95", data, 0.4)
    }

    #[test]
    fn test_non_empty_keys() {
        let doc = sample();
        let keys: Vec<&String> = doc.non_empty_keys().collect();
        assert_eq!(keys, vec!["adresse", "name", "rollstuhlgerecht"]);
    }

    #[test]
    fn test_with_fields_ignores_unknown_keys() {
        let doc = sample();
        let filtered = doc.with_fields(["adresse", "unbekannt"]);
        assert_eq!(filtered.data.len(), 1);
        assert!(filtered.data.contains_key("adresse"));
        assert_eq!(filtered.id, "30.95");
    }

    #[test]
    fn test_score_is_clamped() {
        let doc = RetrievedDocument::new("1", FieldMap::new(), 3.5);
        assert_eq!(doc.relevance_score, 1.0);
        assert!(RetrievedDocument::exact("1", FieldMap::new()).is_exact_match());
    }

    #[test]
    fn test_query_type_parse() {
        assert_eq!(QueryType::parse(" Complex "), Some(QueryType::Complex));
        assert_eq!(QueryType::parse("normal"), Some(QueryType::Normal));
        assert_eq!(QueryType::parse("other"), None);
    }
}
