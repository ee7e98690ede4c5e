//! Trend aggregation over a user's saved papers
//!
//! Pure in-memory counting over the paper rows: distribution by source and
//! year, most frequent authors, journals, co-author pairs and title/abstract
//! keywords. Ordering is deterministic (count descending, then name) so the
//! endpoint returns stable output for the same library.

use crate::db::models::paper;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_TOP_N: usize = 10;
const MIN_KEYWORD_LEN: usize = 4;

/// Words too common in titles/abstracts to count as keywords
const STOPWORDS: &[&str] = &[
    "about", "after", "against", "also", "analysis", "based", "been", "before", "being",
    "between", "both", "could", "density", "different", "during", "each", "effect", "effects",
    "enhanced", "from", "have", "high", "however", "into", "investigation", "like", "more",
    "most", "novel", "only", "other", "over", "paper", "performance", "process", "properties",
    "results", "show", "shown", "some", "study", "studies", "such", "than", "that", "their",
    "them", "then", "there", "these", "they", "this", "through", "toward", "towards", "under",
    "using", "various", "very", "were", "when", "where", "which", "while", "with", "within",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CountEntry {
    pub name: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct YearCount {
    pub year: i32,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendReport {
    pub total_papers: u64,
    pub by_source: Vec<CountEntry>,
    /// Ascending by year
    pub by_year: Vec<YearCount>,
    pub top_authors: Vec<CountEntry>,
    pub top_journals: Vec<CountEntry>,
    /// Unordered co-author pairs, rendered "A & B"
    pub top_coauthor_pairs: Vec<CountEntry>,
    pub top_keywords: Vec<CountEntry>,
}

/// Pull the author list out of a paper row's JSON column
fn paper_authors(paper: &paper::Model) -> Vec<String> {
    serde_json::from_value(paper.authors.clone()).unwrap_or_default()
}

fn sorted_top(counts: HashMap<String, u64>, limit: usize) -> Vec<CountEntry> {
    let mut entries: Vec<CountEntry> = counts
        .into_iter()
        .map(|(name, count)| CountEntry { name, count })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    entries.truncate(limit);
    entries
}

fn keyword_tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .filter(|w| {
            w.len() >= MIN_KEYWORD_LEN
                && !w.chars().all(|c| c.is_ascii_digit())
                && !STOPWORDS.contains(&w.as_str())
        })
}

/// Build the full trend report for a set of papers. `top_n` bounds the
/// top-authors/journals/pairs/keywords lists.
pub fn build_report(papers: &[paper::Model], top_n: usize) -> TrendReport {
    let top_n = top_n.max(1);
    let mut by_source: HashMap<String, u64> = HashMap::new();
    let mut by_year: HashMap<i32, u64> = HashMap::new();
    let mut authors: HashMap<String, u64> = HashMap::new();
    let mut journals: HashMap<String, u64> = HashMap::new();
    let mut pairs: HashMap<String, u64> = HashMap::new();
    let mut keywords: HashMap<String, u64> = HashMap::new();

    for paper in papers {
        *by_source.entry(paper.source.clone()).or_default() += 1;

        if let Some(year) = paper.year {
            *by_year.entry(year).or_default() += 1;
        }

        if let Some(ref journal) = paper.journal {
            if !journal.is_empty() {
                *journals.entry(journal.clone()).or_default() += 1;
            }
        }

        let names = paper_authors(paper);
        for name in &names {
            *authors.entry(name.clone()).or_default() += 1;
        }
        // Unordered pairs in canonical order so (A, B) and (B, A) collapse
        for i in 0..names.len() {
            for j in (i + 1)..names.len() {
                let (a, b) = if names[i] <= names[j] {
                    (&names[i], &names[j])
                } else {
                    (&names[j], &names[i])
                };
                *pairs.entry(format!("{} & {}", a, b)).or_default() += 1;
            }
        }

        for token in keyword_tokens(&paper.title) {
            *keywords.entry(token).or_default() += 1;
        }
        if let Some(ref abstract_text) = paper.abstract_text {
            for token in keyword_tokens(abstract_text) {
                *keywords.entry(token).or_default() += 1;
            }
        }
    }

    let mut by_year: Vec<YearCount> = by_year
        .into_iter()
        .map(|(year, count)| YearCount { year, count })
        .collect();
    by_year.sort_by_key(|e| e.year);

    TrendReport {
        total_papers: papers.len() as u64,
        by_source: sorted_top(by_source, usize::MAX),
        by_year,
        top_authors: sorted_top(authors, top_n),
        top_journals: sorted_top(journals, top_n),
        top_coauthor_pairs: sorted_top(pairs, top_n),
        top_keywords: sorted_top(keywords, top_n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn paper(
        title: &str,
        authors: &[&str],
        journal: Option<&str>,
        year: Option<i32>,
        source: &str,
    ) -> paper::Model {
        let now = Utc::now().fixed_offset();
        paper::Model {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: title.to_string(),
            title_norm: title.to_lowercase(),
            authors: json!(authors),
            abstract_text: None,
            journal: journal.map(String::from),
            year,
            source: source.to_string(),
            url: None,
            citations: None,
            doi: None,
            impact_factor: None,
            jcr_percentile: None,
            metadata: json!({}),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_empty_library() {
        let report = build_report(&[], DEFAULT_TOP_N);
        assert_eq!(report.total_papers, 0);
        assert!(report.by_source.is_empty());
        assert!(report.top_authors.is_empty());
    }

    #[test]
    fn test_counts_and_ordering() {
        let papers = vec![
            paper(
                "Plasma catalysis review",
                &["A Bogaerts", "X Tu"],
                Some("ACS Catalysis"),
                Some(2020),
                "google_scholar",
            ),
            paper(
                "Plasma reactor design",
                &["A Bogaerts"],
                Some("ACS Catalysis"),
                Some(2021),
                "google_scholar",
            ),
            paper(
                "Ammonia synthesis patent",
                &["J Park"],
                None,
                Some(2021),
                "patent",
            ),
        ];

        let report = build_report(&papers, DEFAULT_TOP_N);
        assert_eq!(report.total_papers, 3);

        assert_eq!(report.by_source[0].name, "google_scholar");
        assert_eq!(report.by_source[0].count, 2);

        assert_eq!(
            report.by_year,
            vec![
                YearCount { year: 2020, count: 1 },
                YearCount { year: 2021, count: 2 }
            ]
        );

        assert_eq!(report.top_authors[0].name, "A Bogaerts");
        assert_eq!(report.top_authors[0].count, 2);

        assert_eq!(report.top_journals[0].name, "ACS Catalysis");
        assert_eq!(report.top_journals[0].count, 2);
    }

    #[test]
    fn test_coauthor_pairs_are_unordered() {
        let papers = vec![
            paper("p1", &["B Second", "A First"], None, None, "pubmed"),
            paper("p2", &["A First", "B Second"], None, None, "pubmed"),
        ];
        let report = build_report(&papers, DEFAULT_TOP_N);
        assert_eq!(report.top_coauthor_pairs.len(), 1);
        assert_eq!(report.top_coauthor_pairs[0].name, "A First & B Second");
        assert_eq!(report.top_coauthor_pairs[0].count, 2);
    }

    #[test]
    fn test_keywords_skip_stopwords_and_short_words() {
        let papers = vec![paper(
            "Study of CO2 conversion using plasma catalysis",
            &[],
            None,
            None,
            "pubmed",
        )];
        let report = build_report(&papers, DEFAULT_TOP_N);
        let names: Vec<&str> = report.top_keywords.iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"plasma"));
        assert!(names.contains(&"conversion"));
        assert!(!names.contains(&"study"));
        assert!(!names.contains(&"co2")); // below minimum length
        assert!(!names.contains(&"of"));
    }

    #[test]
    fn test_ties_break_alphabetically() {
        let papers = vec![paper("p", &["Zed", "Ann"], None, None, "pubmed")];
        let report = build_report(&papers, DEFAULT_TOP_N);
        assert_eq!(report.top_authors[0].name, "Ann");
        assert_eq!(report.top_authors[1].name, "Zed");
    }
}
