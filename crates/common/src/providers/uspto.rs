//! USPTO patent provider via PatentsView
//!
//! PatentsView takes a JSON query document (field match clauses under `q`,
//! requested fields under `f`, options under `o`) POSTed with an X-Api-Key
//! header. Patents map into [`PaperRecord`]s with inventors as authors and
//! the assignee organization standing in for a venue.

use super::{parse_year, provider_error, PaperRecord, PaperSource, ProviderQuery, SearchProvider};
use crate::config::ProvidersConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

pub struct UsptoProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct PatentsViewResponse {
    #[serde(default)]
    patents: Vec<Patent>,
}

#[derive(Debug, Deserialize)]
struct Patent {
    patent_id: String,
    #[serde(default)]
    patent_title: String,
    patent_abstract: Option<String>,
    patent_date: Option<String>,
    #[serde(default)]
    inventors: Vec<Inventor>,
    #[serde(default)]
    assignees: Vec<Assignee>,
}

#[derive(Debug, Deserialize)]
struct Inventor {
    inventor_name_first: Option<String>,
    inventor_name_last: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Assignee {
    assignee_organization: Option<String>,
}

impl UsptoProvider {
    pub fn new(config: &ProvidersConfig) -> Result<Self> {
        let api_key = config
            .patentsview_key
            .clone()
            .ok_or_else(|| AppError::Configuration {
                message: "providers.patentsview_key is not set".to_string(),
            })?;

        Ok(Self {
            client: super::build_client(config)?,
            base_url: config.patentsview_base.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn map_patent(patent: Patent) -> Option<PaperRecord> {
        if patent.patent_title.is_empty() {
            return None;
        }

        let authors: Vec<String> = patent
            .inventors
            .iter()
            .filter_map(|inv| {
                match (inv.inventor_name_first.as_deref(), inv.inventor_name_last.as_deref()) {
                    (Some(first), Some(last)) => Some(format!("{} {}", first, last)),
                    (Some(first), None) => Some(first.to_string()),
                    (None, Some(last)) => Some(last.to_string()),
                    (None, None) => None,
                }
            })
            .collect();

        let assignee = patent
            .assignees
            .iter()
            .find_map(|a| a.assignee_organization.clone());

        let url = format!("https://patents.google.com/patent/US{}", patent.patent_id);

        Some(PaperRecord {
            title: patent.patent_title,
            authors,
            abstract_text: patent.patent_abstract,
            journal: assignee,
            year: patent.patent_date.as_deref().and_then(parse_year),
            source: PaperSource::Patent,
            url: Some(url),
            citations: None,
            doi: None,
            impact_factor: None,
            jcr_percentile: None,
        })
    }
}

#[async_trait]
impl SearchProvider for UsptoProvider {
    fn id(&self) -> &'static str {
        "uspto"
    }

    fn name(&self) -> &'static str {
        "USPTO (PatentsView)"
    }

    async fn search(&self, query: &ProviderQuery) -> Result<Vec<PaperRecord>> {
        let url = format!("{}/patent/", self.base_url);

        let mut clauses = vec![json!({
            "_or": [
                {"_text_any": {"patent_title": query.query}},
                {"_text_any": {"patent_abstract": query.query}}
            ]
        })];
        if let Some(from) = query.year_from {
            clauses.push(json!({"_gte": {"patent_date": format!("{}-01-01", from)}}));
        }
        if let Some(to) = query.year_to {
            clauses.push(json!({"_lte": {"patent_date": format!("{}-12-31", to)}}));
        }

        let body = json!({
            "q": {"_and": clauses},
            "f": [
                "patent_id",
                "patent_title",
                "patent_abstract",
                "patent_date",
                "inventors.inventor_name_first",
                "inventors.inventor_name_last",
                "assignees.assignee_organization"
            ],
            "o": {"size": query.limit},
            "s": [{"patent_date": "desc"}]
        });

        debug!(query = %query.query, "Running PatentsView search");

        let response = self
            .client
            .post(&url)
            .header("X-Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(provider_error(self.id(), response).await);
        }

        let parsed: PatentsViewResponse =
            response.json().await.map_err(|e| AppError::Provider {
                provider: self.id().to_string(),
                message: format!("Invalid JSON response: {}", e),
            })?;

        let records: Vec<PaperRecord> = parsed
            .patents
            .into_iter()
            .filter_map(Self::map_patent)
            .collect();

        info!(
            query = %query.query,
            count = records.len(),
            "PatentsView search complete"
        );

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_patent_from_fixture() {
        let json = r#"{
            "patents": [
                {
                    "patent_id": "11123456",
                    "patent_title": "Plasma reactor with packed-bed catalyst",
                    "patent_abstract": "A dielectric barrier discharge reactor...",
                    "patent_date": "2023-09-12",
                    "inventors": [
                        {"inventor_name_first": "Ji-Ho", "inventor_name_last": "Park"},
                        {"inventor_name_first": null, "inventor_name_last": "Chen"}
                    ],
                    "assignees": [{"assignee_organization": "Plasma Dynamics Inc."}]
                }
            ]
        }"#;

        let parsed: PatentsViewResponse = serde_json::from_str(json).unwrap();
        let records: Vec<PaperRecord> = parsed
            .patents
            .into_iter()
            .filter_map(UsptoProvider::map_patent)
            .collect();

        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.title, "Plasma reactor with packed-bed catalyst");
        assert_eq!(r.authors, vec!["Ji-Ho Park", "Chen"]);
        assert_eq!(r.journal.as_deref(), Some("Plasma Dynamics Inc."));
        assert_eq!(r.year, Some(2023));
        assert_eq!(
            r.url.as_deref(),
            Some("https://patents.google.com/patent/US11123456")
        );
        assert_eq!(r.source, PaperSource::Patent);
        assert!(r.doi.is_none());
    }

    #[test]
    fn test_untitled_patent_dropped() {
        let patent = Patent {
            patent_id: "1".into(),
            patent_title: String::new(),
            patent_abstract: None,
            patent_date: None,
            inventors: vec![],
            assignees: vec![],
        };
        assert!(UsptoProvider::map_patent(patent).is_none());
    }
}
