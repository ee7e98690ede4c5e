//! Google Scholar provider via SerpAPI
//!
//! SerpAPI returns Scholar results as JSON `organic_results`; author and
//! venue metadata arrives as a single "summary" line (`authors - venue,
//! year - publisher`) that has to be split apart.

use super::{
    build_client, parse_year, provider_error, PaperRecord, PaperSource, ProviderQuery,
    SearchProvider,
};
use crate::config::ProvidersConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

pub struct ScholarProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct SerpApiResponse {
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    title: String,
    link: Option<String>,
    snippet: Option<String>,
    publication_info: Option<PublicationInfo>,
    inline_links: Option<InlineLinks>,
}

#[derive(Debug, Deserialize)]
struct PublicationInfo {
    summary: Option<String>,
    #[serde(default)]
    authors: Vec<SerpAuthor>,
}

#[derive(Debug, Deserialize)]
struct SerpAuthor {
    name: String,
}

#[derive(Debug, Deserialize)]
struct InlineLinks {
    cited_by: Option<CitedBy>,
}

#[derive(Debug, Deserialize)]
struct CitedBy {
    total: Option<i32>,
}

impl ScholarProvider {
    pub fn new(config: &ProvidersConfig) -> Result<Self> {
        let api_key = config
            .serpapi_key
            .clone()
            .ok_or_else(|| AppError::Configuration {
                message: "providers.serpapi_key is not set".to_string(),
            })?;

        Ok(Self {
            client: build_client(config)?,
            base_url: config.serpapi_base.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn map_result(result: OrganicResult) -> Option<PaperRecord> {
        if result.title.is_empty() {
            return None;
        }

        let info = result.publication_info;
        let summary = info.as_ref().and_then(|i| i.summary.clone());

        // Structured author list when SerpAPI provides one, otherwise the
        // leading segment of the summary line
        let mut authors: Vec<String> = info
            .as_ref()
            .map(|i| i.authors.iter().map(|a| a.name.clone()).collect())
            .unwrap_or_default();

        let (summary_authors, journal) = summary
            .as_deref()
            .map(split_summary)
            .unwrap_or((Vec::new(), None));

        if authors.is_empty() {
            authors = summary_authors;
        }

        let year = summary.as_deref().and_then(parse_year);
        let citations = result
            .inline_links
            .and_then(|l| l.cited_by)
            .and_then(|c| c.total);

        Some(PaperRecord {
            title: result.title,
            authors,
            abstract_text: result.snippet,
            journal,
            year,
            source: PaperSource::GoogleScholar,
            url: result.link,
            citations,
            doi: None,
            impact_factor: None,
            jcr_percentile: None,
        })
    }
}

/// Split a Scholar summary line ("A Author, B Author - Venue, 2021 - pub")
/// into author names and venue
fn split_summary(summary: &str) -> (Vec<String>, Option<String>) {
    let parts: Vec<&str> = summary.split(" - ").collect();

    let authors = parts
        .first()
        .map(|a| {
            a.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let journal = parts.get(1).and_then(|venue_year| {
        let venue = match regex_lite::Regex::new(r"\b(19|20)\d{2}\b")
            .ok()
            .and_then(|re| re.find(venue_year))
        {
            Some(m) => venue_year[..m.start()].trim().trim_end_matches(','),
            None => venue_year.trim(),
        };
        (!venue.is_empty()).then(|| venue.to_string())
    });

    (authors, journal)
}

#[async_trait]
impl SearchProvider for ScholarProvider {
    fn id(&self) -> &'static str {
        "google_scholar"
    }

    fn name(&self) -> &'static str {
        "Google Scholar (SerpAPI)"
    }

    async fn search(&self, query: &ProviderQuery) -> Result<Vec<PaperRecord>> {
        let url = format!("{}/search", self.base_url);
        let start = (query.page * query.limit).to_string();
        let num = query.limit.to_string();

        let mut params = vec![
            ("engine", "google_scholar".to_string()),
            ("q", query.query.clone()),
            ("hl", "en".to_string()),
            ("num", num),
            ("start", start),
            ("api_key", self.api_key.clone()),
        ];
        if let Some(ylo) = query.year_from {
            params.push(("as_ylo", ylo.to_string()));
        }
        if let Some(yhi) = query.year_to {
            params.push(("as_yhi", yhi.to_string()));
        }

        debug!(query = %query.query, "Fetching Google Scholar results");

        let response = self.client.get(&url).query(&params).send().await?;

        if !response.status().is_success() {
            return Err(provider_error(self.id(), response).await);
        }

        let body: SerpApiResponse = response.json().await.map_err(|e| AppError::Provider {
            provider: self.id().to_string(),
            message: format!("Invalid JSON response: {}", e),
        })?;

        let records: Vec<PaperRecord> = body
            .organic_results
            .into_iter()
            .filter_map(Self::map_result)
            .take(query.limit)
            .collect();

        info!(
            query = %query.query,
            count = records.len(),
            "Google Scholar search complete"
        );

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_summary() {
        let (authors, journal) =
            split_summary("J Kim, H Lee - Applied Catalysis B: Environmental, 2022 - Elsevier");
        assert_eq!(authors, vec!["J Kim", "H Lee"]);
        assert_eq!(journal.as_deref(), Some("Applied Catalysis B: Environmental"));
    }

    #[test]
    fn test_split_summary_no_year() {
        let (authors, journal) = split_summary("A Author - Some Venue");
        assert_eq!(authors, vec!["A Author"]);
        assert_eq!(journal.as_deref(), Some("Some Venue"));
    }

    #[test]
    fn test_map_result_from_fixture() {
        let json = r#"{
            "organic_results": [
                {
                    "title": "Plasma catalysis for CO2 conversion",
                    "link": "https://example.org/paper",
                    "snippet": "Nonthermal plasma coupled with catalysts...",
                    "publication_info": {
                        "summary": "X Tu, JC Whitehead - Applied Catalysis B, 2019 - Elsevier"
                    },
                    "inline_links": {"cited_by": {"total": 412}}
                },
                {"title": ""}
            ]
        }"#;

        let parsed: SerpApiResponse = serde_json::from_str(json).unwrap();
        let records: Vec<PaperRecord> = parsed
            .organic_results
            .into_iter()
            .filter_map(ScholarProvider::map_result)
            .collect();

        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.title, "Plasma catalysis for CO2 conversion");
        assert_eq!(r.authors, vec!["X Tu", "JC Whitehead"]);
        assert_eq!(r.journal.as_deref(), Some("Applied Catalysis B"));
        assert_eq!(r.year, Some(2019));
        assert_eq!(r.citations, Some(412));
        assert_eq!(r.source, PaperSource::GoogleScholar);
    }
}
