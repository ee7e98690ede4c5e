//! PubMed provider via NCBI E-utilities
//!
//! Two-step flow: `esearch.fcgi` resolves the query to a PMID list, then
//! `esummary.fcgi` fetches document summaries for those ids. The esummary
//! result object is keyed by PMID, so docsums are pulled out in idlist
//! order to preserve relevance ranking.

use super::{parse_year, provider_error, PaperRecord, PaperSource, ProviderQuery, SearchProvider};
use crate::config::ProvidersConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info};

pub struct PubMedProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EsearchResponse {
    esearchresult: EsearchResult,
}

#[derive(Debug, Deserialize)]
struct EsearchResult {
    #[serde(default)]
    idlist: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EsummaryResponse {
    result: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct DocSum {
    #[serde(default)]
    title: String,
    #[serde(default)]
    authors: Vec<DocSumAuthor>,
    fulljournalname: Option<String>,
    pubdate: Option<String>,
    elocationid: Option<String>,
    #[serde(default)]
    articleids: Vec<ArticleId>,
}

#[derive(Debug, Deserialize)]
struct DocSumAuthor {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ArticleId {
    idtype: String,
    value: String,
}

impl PubMedProvider {
    pub fn new(config: &ProvidersConfig) -> Result<Self> {
        Ok(Self {
            client: super::build_client(config)?,
            base_url: config.pubmed_base.trim_end_matches('/').to_string(),
            api_key: config.pubmed_api_key.clone(),
        })
    }

    fn map_docsum(pmid: &str, docsum: DocSum) -> Option<PaperRecord> {
        if docsum.title.is_empty() {
            return None;
        }

        let doi = docsum
            .articleids
            .iter()
            .find(|a| a.idtype == "doi")
            .map(|a| a.value.clone())
            .or_else(|| extract_doi(docsum.elocationid.as_deref()));

        Some(PaperRecord {
            title: strip_trailing_period(&docsum.title),
            authors: docsum.authors.into_iter().map(|a| a.name).collect(),
            abstract_text: None, // esummary docsums carry no abstract
            journal: docsum.fulljournalname,
            year: docsum.pubdate.as_deref().and_then(parse_year),
            source: PaperSource::Pubmed,
            url: Some(format!("https://pubmed.ncbi.nlm.nih.gov/{}/", pmid)),
            citations: None,
            doi,
            impact_factor: None,
            jcr_percentile: None,
        })
    }
}

/// Pull a DOI out of an elocationid like "doi: 10.1016/j.apcatb.2021.120234"
fn extract_doi(elocationid: Option<&str>) -> Option<String> {
    let text = elocationid?;
    let re = regex_lite::Regex::new(r"10\.\d{4,9}/\S+").ok()?;
    re.find(text).map(|m| m.as_str().trim_end_matches('.').to_string())
}

fn strip_trailing_period(title: &str) -> String {
    title.trim().trim_end_matches('.').to_string()
}

#[async_trait]
impl SearchProvider for PubMedProvider {
    fn id(&self) -> &'static str {
        "pubmed"
    }

    fn name(&self) -> &'static str {
        "PubMed (NCBI E-utilities)"
    }

    async fn search(&self, query: &ProviderQuery) -> Result<Vec<PaperRecord>> {
        // Step 1: resolve the query to PMIDs
        let esearch_url = format!("{}/esearch.fcgi", self.base_url);
        let retmax = query.limit.to_string();

        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("term", query.query.clone()),
            ("retmax", retmax),
            ("retmode", "json".to_string()),
            ("sort", "relevance".to_string()),
        ];
        if let (Some(from), Some(to)) = (query.year_from, query.year_to) {
            params.push(("mindate", from.to_string()));
            params.push(("maxdate", to.to_string()));
            params.push(("datetype", "pdat".to_string()));
        }
        if let Some(ref key) = self.api_key {
            params.push(("api_key", key.clone()));
        }

        debug!(query = %query.query, "Running PubMed esearch");

        let response = self.client.get(&esearch_url).query(&params).send().await?;
        if !response.status().is_success() {
            return Err(provider_error(self.id(), response).await);
        }

        let esearch: EsearchResponse = response.json().await.map_err(|e| AppError::Provider {
            provider: self.id().to_string(),
            message: format!("Invalid esearch response: {}", e),
        })?;

        let idlist = esearch.esearchresult.idlist;
        if idlist.is_empty() {
            info!(query = %query.query, "PubMed search returned no ids");
            return Ok(Vec::new());
        }

        // Step 2: fetch document summaries
        let esummary_url = format!("{}/esummary.fcgi", self.base_url);
        let ids = idlist.join(",");

        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("id", ids),
            ("retmode", "json".to_string()),
        ];
        if let Some(ref key) = self.api_key {
            params.push(("api_key", key.clone()));
        }

        let response = self.client.get(&esummary_url).query(&params).send().await?;
        if !response.status().is_success() {
            return Err(provider_error(self.id(), response).await);
        }

        let esummary: EsummaryResponse = response.json().await.map_err(|e| AppError::Provider {
            provider: self.id().to_string(),
            message: format!("Invalid esummary response: {}", e),
        })?;

        let records: Vec<PaperRecord> = idlist
            .iter()
            .filter_map(|pmid| {
                let value = esummary.result.get(pmid)?.clone();
                let docsum: DocSum = serde_json::from_value(value).ok()?;
                Self::map_docsum(pmid, docsum)
            })
            .collect();

        info!(
            query = %query.query,
            count = records.len(),
            "PubMed search complete"
        );

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_doi() {
        assert_eq!(
            extract_doi(Some("doi: 10.1016/j.apcatb.2021.120234.")),
            Some("10.1016/j.apcatb.2021.120234".to_string())
        );
        assert_eq!(extract_doi(Some("pii: S0926-3373")), None);
        assert_eq!(extract_doi(None), None);
    }

    #[test]
    fn test_map_docsum_from_fixture() {
        let json = r#"{
            "title": "Nonthermal plasma-assisted ammonia synthesis over Ru catalysts.",
            "authors": [{"name": "Kim HH"}, {"name": "Teramoto Y"}],
            "fulljournalname": "ACS Catalysis",
            "pubdate": "2017 May 5",
            "elocationid": "doi: 10.1021/acscatal.6b03644",
            "articleids": [
                {"idtype": "pubmed", "value": "28413690"},
                {"idtype": "doi", "value": "10.1021/acscatal.6b03644"}
            ]
        }"#;

        let docsum: DocSum = serde_json::from_str(json).unwrap();
        let record = PubMedProvider::map_docsum("28413690", docsum).unwrap();

        assert_eq!(
            record.title,
            "Nonthermal plasma-assisted ammonia synthesis over Ru catalysts"
        );
        assert_eq!(record.authors, vec!["Kim HH", "Teramoto Y"]);
        assert_eq!(record.journal.as_deref(), Some("ACS Catalysis"));
        assert_eq!(record.year, Some(2017));
        assert_eq!(record.doi.as_deref(), Some("10.1021/acscatal.6b03644"));
        assert_eq!(
            record.url.as_deref(),
            Some("https://pubmed.ncbi.nlm.nih.gov/28413690/")
        );
        assert_eq!(record.source, PaperSource::Pubmed);
    }

    #[test]
    fn test_esummary_order_follows_idlist() {
        let json = r#"{
            "result": {
                "uids": ["2", "1"],
                "1": {"title": "First"},
                "2": {"title": "Second"}
            }
        }"#;
        let parsed: EsummaryResponse = serde_json::from_str(json).unwrap();

        let idlist = vec!["2".to_string(), "1".to_string()];
        let titles: Vec<String> = idlist
            .iter()
            .filter_map(|pmid| {
                let docsum: DocSum =
                    serde_json::from_value(parsed.result.get(pmid)?.clone()).ok()?;
                Some(docsum.title)
            })
            .collect();

        assert_eq!(titles, vec!["Second", "First"]);
    }
}
