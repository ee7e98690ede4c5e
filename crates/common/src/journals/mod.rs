//! Journal impact-factor enrichment
//!
//! An embedded JCR-derived table maps journal names to impact factor and
//! percentile. Lookups go through the same whitespace/case normalization as
//! paper titles, so "ACS CATALYSIS" and "ACS Catalysis " hit the same row.

use crate::normalize_text;
use crate::providers::PaperRecord;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::warn;

const JOURNALS_JSON: &str = include_str!("journals.json");

#[derive(Debug, Clone, Deserialize)]
pub struct JournalInfo {
    pub name: String,
    pub impact_factor: f64,
    pub jcr_percentile: f64,
    /// Rank within the journal's JCR category
    pub rank: u32,
    pub category: String,
}

fn journal_table() -> &'static HashMap<String, JournalInfo> {
    static TABLE: OnceLock<HashMap<String, JournalInfo>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let entries: Vec<JournalInfo> = match serde_json::from_str(JOURNALS_JSON) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Embedded journal table failed to parse");
                Vec::new()
            }
        };
        entries
            .into_iter()
            .map(|info| (normalize_text(&info.name), info))
            .collect()
    })
}

/// Look up a journal by name, normalization-insensitive
pub fn lookup(journal: &str) -> Option<&'static JournalInfo> {
    let key = normalize_text(journal);
    if key.is_empty() {
        return None;
    }
    journal_table().get(&key)
}

/// Fill impact factor fields on a record when its journal is known.
/// Already-populated fields are left alone.
pub fn enrich(record: &mut PaperRecord) {
    let Some(ref journal) = record.journal else {
        return;
    };
    if let Some(info) = lookup(journal) {
        record.impact_factor.get_or_insert(info.impact_factor);
        record.jcr_percentile.get_or_insert(info.jcr_percentile);
    }
}

/// Enrich a whole result set in place
pub fn enrich_all(records: &mut [PaperRecord]) {
    for record in records.iter_mut() {
        enrich(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::PaperSource;

    fn record(journal: Option<&str>) -> PaperRecord {
        PaperRecord {
            title: "t".into(),
            authors: vec![],
            abstract_text: None,
            journal: journal.map(String::from),
            year: None,
            source: PaperSource::Pubmed,
            url: None,
            citations: None,
            doi: None,
            impact_factor: None,
            jcr_percentile: None,
        }
    }

    #[test]
    fn test_lookup_is_case_and_space_insensitive() {
        let info = lookup("  acs   CATALYSIS ").unwrap();
        assert_eq!(info.name, "ACS Catalysis");
        assert!(info.impact_factor > 10.0);
    }

    #[test]
    fn test_lookup_unknown_journal() {
        assert!(lookup("Journal of Imaginary Results").is_none());
        assert!(lookup("").is_none());
    }

    #[test]
    fn test_enrich_fills_fields() {
        let mut r = record(Some("Applied Catalysis B: Environmental"));
        enrich(&mut r);
        assert_eq!(r.impact_factor, Some(20.2));
        assert_eq!(r.jcr_percentile, Some(97.6));
    }

    #[test]
    fn test_enrich_keeps_existing_values() {
        let mut r = record(Some("ACS Catalysis"));
        r.impact_factor = Some(1.0);
        enrich(&mut r);
        assert_eq!(r.impact_factor, Some(1.0));
        // percentile was empty, so it still gets filled
        assert!(r.jcr_percentile.is_some());
    }

    #[test]
    fn test_enrich_without_journal_is_noop() {
        let mut r = record(None);
        enrich(&mut r);
        assert!(r.impact_factor.is_none());
    }
}
