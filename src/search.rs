use serde::{Serialize, ser::SerializeMap};
use serde_json::Value;

use crate::index::{CodeIndex, IndexEntry};

/// Separators accepted when terms arrive as one delimited string.
const TERM_SEPARATORS: [char; 3] = [',', ';', '\n'];

/// Matches for one queried term, most recent first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermMatches {
    pub term: String,
    pub entries: Vec<IndexEntry>,
}

/// Per-term results in the order the terms were given.
///
/// A term that was queried but matched nothing maps to an empty list; a
/// term that was never queried is absent. Serializes as a JSON object whose
/// keys keep the query order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResults {
    terms: Vec<TermMatches>,
}

impl SearchResults {
    /// `None` if `term` was not part of the query.
    pub fn get(&self, term: &str) -> Option<&[IndexEntry]> {
        self.terms
            .iter()
            .find(|t| t.term == term)
            .map(|t| t.entries.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = &TermMatches> {
        self.terms.iter()
    }

    /// Number of queried terms.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl Serialize for SearchResults {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.terms.len()))?;
        for t in &self.terms {
            map.serialize_entry(&t.term, &t.entries)?;
        }
        map.end()
    }
}

/// Trim and case-fold raw terms, dropping empty ones and repeats.
pub fn normalize_terms<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut terms: Vec<String> = Vec::new();
    for term in raw {
        let term = term.as_ref().trim().to_lowercase();
        if !term.is_empty() && !terms.contains(&term) {
            terms.push(term);
        }
    }
    terms
}

/// Read query terms out of a request payload.
///
/// Accepts `{"codes": ...}`, a list of strings, or one string delimited by
/// `,` `;` or newlines. Non-string list items are ignored. Any other shape
/// yields no terms.
pub fn parse_terms(payload: &Value) -> Vec<String> {
    match payload {
        Value::Object(fields) => {
            fields.get("codes").map(parse_terms).unwrap_or_default()
        }
        Value::Array(items) => {
            normalize_terms(items.iter().filter_map(Value::as_str))
        }
        Value::String(joined) => normalize_terms(joined.split(TERM_SEPARATORS)),
        _ => Vec::new(),
    }
}

/// Answer substring queries against the index.
///
/// For each term, every entry filed under a code that contains the term is
/// collected; entries reached through several codes appear once per code.
/// Each list is sorted by period, newest first, keeping build order among
/// equal periods. `terms` are normalized here, so raw input is fine.
pub fn search<S: AsRef<str>>(index: &CodeIndex, terms: &[S]) -> SearchResults {
    let terms = normalize_terms(terms)
        .into_iter()
        .map(|term| {
            let mut entries: Vec<IndexEntry> = index
                .iter()
                .filter(|(code, _)| code.contains(term.as_str()))
                .flat_map(|(_, entries)| entries.iter().cloned())
                .collect();
            // Stable: equal periods keep build order.
            entries.sort_by(|a, b| b.period.cmp(&a.period));
            TermMatches { term, entries }
        })
        .collect();
    SearchResults { terms }
}

/// Every indexed code, sorted.
pub fn list_codes(index: &CodeIndex) -> Vec<String> {
    index.codes().map(str::to_string).collect()
}

/// Format results for human-readable terminal output.
pub fn format_human(results: &SearchResults) {
    if results.is_empty() {
        println!("No search terms given.");
        return;
    }

    for (i, t) in results.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("{}", t.term);
        if t.entries.is_empty() {
            println!("  No matches");
            continue;
        }
        for e in &t.entries {
            let pages = e
                .pages
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(",");
            println!(
                "  [{}] {}  {}  p.{}  ({}x)",
                e.period, e.code, e.document_id, pages, e.occurrences
            );
        }
    }
}

/// Format results as a JSON object keyed by term.
pub fn format_json(results: &SearchResults) -> serde_json::Result<()> {
    println!("{}", serde_json::to_string_pretty(results)?);
    Ok(())
}
