//! Building identifier matching
//!
//! Campus identifiers come in two shapes: a two-segment decimal code
//! (`50.34`, `1.12`) and a bare three or four digit code (`412`, `0412`).
//! Decimal codes are extracted first and take precedence; within a shape,
//! longer tokens rank before shorter ones.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use campus_guide_core::RetrievedDocument;

use crate::records::RecordTable;

static DECIMAL_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{1,2}\.\d{1,2}\b").unwrap());

static BARE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{3,4}\b").unwrap());

/// Extract identifier-shaped tokens, most specific first
///
/// Bare codes that are part of an already extracted decimal token are not
/// repeated.
pub fn extract_identifier_tokens(query: &str) -> Vec<String> {
    let mut decimals: Vec<&str> = DECIMAL_ID.find_iter(query).map(|m| m.as_str()).collect();
    let mut bare: Vec<&str> = BARE_CODE
        .find_iter(query)
        .map(|m| m.as_str())
        .filter(|code| !decimals.iter().any(|d| d.contains(code)))
        .collect();

    // stable sorts keep query order among equally long tokens
    decimals.sort_by_key(|t| std::cmp::Reverse(t.len()));
    bare.sort_by_key(|t| std::cmp::Reverse(t.len()));

    let mut seen = HashSet::new();
    decimals
        .into_iter()
        .chain(bare)
        .filter(|t| seen.insert(*t))
        .map(str::to_string)
        .collect()
}

/// How an identifier relates to a query token
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MatchKind {
    /// Identifier equals the token
    Exact,
    /// Token appears inside the identifier, not glued to other digits
    Contained,
}

/// Find `token` in `identifier` without a digit directly before or after
fn match_kind(identifier: &str, token: &str) -> Option<MatchKind> {
    if identifier == token {
        return Some(MatchKind::Exact);
    }
    identifier.match_indices(token).find_map(|(start, _)| {
        let before = identifier[..start].chars().next_back();
        let after = identifier[start + token.len()..].chars().next();
        let glued = before.is_some_and(|c| c.is_ascii_digit())
            || after.is_some_and(|c| c.is_ascii_digit());
        (!glued).then_some(MatchKind::Contained)
    })
}

/// Phase-one retrieval: records addressed by identifier in the query
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentifierMatcher;

impl IdentifierMatcher {
    /// Exact-match documents ordered by specificity, at most `limit`
    ///
    /// Records are ranked by the most specific token they match, exact
    /// identifier equality before containment, then by table order.
    pub fn find(&self, table: &RecordTable, query: &str, limit: usize) -> Vec<RetrievedDocument> {
        let tokens = extract_identifier_tokens(query);
        if tokens.is_empty() || limit == 0 {
            return Vec::new();
        }
        tracing::debug!(?tokens, "Identifier tokens extracted");

        let mut ranked: Vec<(usize, MatchKind, usize)> = table
            .records()
            .iter()
            .enumerate()
            .filter_map(|(row, record)| {
                tokens
                    .iter()
                    .enumerate()
                    .filter_map(|(rank, token)| {
                        match_kind(&record.id, token).map(|kind| (rank, kind, row))
                    })
                    .min()
            })
            .collect();
        ranked.sort();

        let mut seen = HashSet::new();
        ranked
            .into_iter()
            .filter_map(|(_, _, row)| table.get(row))
            .filter(|record| seen.insert(record.id.clone()))
            .take(limit)
            .map(|record| RetrievedDocument::exact(record.id.clone(), record.fields.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_guide_core::FieldMap;

    fn table(ids: &[&str]) -> RecordTable {
        let rows: Vec<FieldMap> = ids
            .iter()
            .map(|id| {
                let mut row = FieldMap::new();
                row.insert("identifikator".into(), serde_json::json!(id));
                row
            })
            .collect();
        RecordTable::from_rows(rows, "identifikator", "name").unwrap()
    }

    fn ids(docs: &[RetrievedDocument]) -> Vec<&str> {
        docs.iter().map(|d| d.id.as_str()).collect()
    }

    #[test]
    fn test_extract_tokens() {
        assert_eq!(extract_identifier_tokens("Wo ist Gebäude 50.34?"), vec!["50.34"]);
        assert_eq!(extract_identifier_tokens("Raum 0412 bitte"), vec!["0412"]);
        assert_eq!(
            extract_identifier_tokens("von 1.1 nach 20.30 über 412"),
            vec!["20.30", "1.1", "412"]
        );
        assert!(extract_identifier_tokens("Wo ist die Mensa?").is_empty());
        // two digit numbers and years beyond four digits are not identifiers
        assert!(extract_identifier_tokens("in 15 Minuten, Jahr 20245").is_empty());
        assert_eq!(
            extract_identifier_tokens("Gebäude 1.12 oder 20.3"),
            vec!["1.12", "20.3"]
        );
    }

    #[test]
    fn test_exact_match_scores_one() {
        let table = table(&["50.34", "20.30", "11.10"]);
        let docs = IdentifierMatcher.find(&table, "Wo ist Gebäude 50.34?", 5);
        assert_eq!(ids(&docs), vec!["50.34"]);
        assert_eq!(docs[0].relevance_score, 1.0);
        assert!(docs[0].is_exact_match());
    }

    #[test]
    fn test_exact_identifier_before_containing_identifier() {
        let table = table(&["50.34 Anbau", "50.34", "50.341", "150.34"]);
        let docs = IdentifierMatcher.find(&table, "50.34", 5);
        // glued digits never count as a match
        assert_eq!(ids(&docs), vec!["50.34", "50.34 Anbau"]);
    }

    #[test]
    fn test_decimal_token_ranks_before_bare_code() {
        let table = table(&["0412", "30.22"]);
        let docs = IdentifierMatcher.find(&table, "Raum 0412 in Gebäude 30.22", 5);
        assert_eq!(ids(&docs), vec!["30.22", "0412"]);
    }

    #[test]
    fn test_limit_and_deduplication() {
        let table = table(&["10.11", "10.11", "10.11 West", "10.11 Ost"]);
        let docs = IdentifierMatcher.find(&table, "10.11", 2);
        assert_eq!(ids(&docs), vec!["10.11", "10.11 West"]);
        assert!(IdentifierMatcher.find(&table, "10.11", 0).is_empty());
    }
}
