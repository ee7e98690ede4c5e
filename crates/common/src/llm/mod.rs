//! LLM relay client (Perplexity chat completions)
//!
//! Sends prompt-engineered requests to an OpenAI-compatible chat endpoint
//! and turns the textual responses into structured JSON. Responses often
//! arrive wrapped in markdown fences or prose, so parsing goes through
//! [`extract_json`]; a parse failure is not an error, the caller receives a
//! fallback payload flagged with `parse_error`.

pub mod prompts;

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Chat completion client
#[derive(Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    pub model: String,
    pub default_temperature: f64,
    max_tokens: u32,
    timeout_secs: u64,
    max_concurrency: usize,
}

/// Token usage reported by the API
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// A single completed chat call
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub content: String,
    pub usage: ChatUsage,
}

/// OpenAI-compatible API response structures
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to build LLM HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            default_temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_secs: config.timeout_secs,
            max_concurrency: config.max_concurrency.max(1),
        })
    }

    fn resolve_key<'a>(&'a self, override_key: Option<&'a str>) -> Result<&'a str> {
        override_key
            .or(self.api_key.as_deref())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AppError::Configuration {
                message: "No LLM API key configured (llm.api_key)".to_string(),
            })
    }

    /// Run one chat completion
    pub async fn chat(
        &self,
        system: &str,
        user: &str,
        temperature: f64,
        api_key: Option<&str>,
    ) -> Result<ChatOutcome> {
        let key = self.resolve_key(api_key)?;
        let url = format!("{}/chat/completions", self.base_url);

        let request_body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user}
            ],
            "temperature": temperature,
            "max_tokens": self.max_tokens
        });

        debug!(model = %self.model, temperature, "Sending LLM request");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", key))
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::LlmTimeout {
                        timeout_secs: self.timeout_secs,
                    }
                } else {
                    AppError::Llm {
                        message: e.to_string(),
                    }
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(300).collect();
            return Err(AppError::Llm {
                message: format!("HTTP {}: {}", status, preview),
            });
        }

        let api_response: ChatCompletionResponse =
            response.json().await.map_err(|e| AppError::Llm {
                message: format!("Invalid completion response: {}", e),
            })?;

        let usage = api_response
            .usage
            .map(|u| ChatUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        let content = api_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AppError::Llm {
                message: "Completion response had no choices".to_string(),
            })?;

        info!(
            model = %self.model,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "LLM request complete"
        );

        Ok(ChatOutcome { content, usage })
    }

    /// Run several chat completions with a bounded concurrency fan-out.
    /// Results come back in input order; individual failures stay per-slot.
    pub async fn chat_many(
        &self,
        system: &str,
        user_prompts: Vec<String>,
        temperature: f64,
        api_key: Option<&str>,
    ) -> Vec<Result<ChatOutcome>> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));

        let mut results: Vec<(usize, Result<ChatOutcome>)> =
            stream::iter(user_prompts.into_iter().enumerate())
                .map(|(idx, prompt)| {
                    let semaphore = Arc::clone(&semaphore);
                    async move {
                        let permit = semaphore.acquire().await.map_err(|_| AppError::Internal {
                            message: "LLM concurrency semaphore closed".to_string(),
                        });
                        match permit {
                            Ok(_permit) => {
                                let result =
                                    self.chat(system, &prompt, temperature, api_key).await;
                                if let Err(ref e) = result {
                                    warn!(idx, error = %e, "LLM fan-out request failed");
                                }
                                (idx, result)
                            }
                            Err(e) => (idx, Err(e)),
                        }
                    }
                })
                .buffer_unordered(self.max_concurrency)
                .collect()
                .await;

        results.sort_by_key(|(idx, _)| *idx);
        results.into_iter().map(|(_, r)| r).collect()
    }
}

/// Extract JSON from an LLM response (handles markdown code blocks and
/// objects embedded in prose)
pub fn extract_json(content: &str) -> String {
    let trimmed = content.trim();

    // Check for markdown code block
    if trimmed.starts_with("```") {
        let lines: Vec<&str> = trimmed.lines().collect();
        if lines.len() >= 2 {
            let start = if lines[0].starts_with("```") { 1 } else { 0 };
            let end = if lines.last().map(|l| l.trim()) == Some("```") {
                lines.len() - 1
            } else {
                lines.len()
            };
            return lines[start..end].join("\n");
        }
    }

    // Try to find a JSON object in the text
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if end > start {
                return trimmed[start..=end].to_string();
            }
        }
    }

    trimmed.to_string()
}

/// Parse a response as a JSON object; on failure build the operation's
/// fallback structure from the raw text and flag it. The boolean reports
/// whether the fallback was used.
pub fn parse_payload<F>(content: &str, fallback: F) -> (Value, bool)
where
    F: FnOnce(&str) -> Value,
{
    let json_str = extract_json(content);

    match serde_json::from_str::<Value>(&json_str) {
        Ok(value) if value.is_object() => (value, false),
        _ => {
            let preview: String = content.chars().take(200).collect();
            info!(content_preview = %preview, "LLM output parse failed - using fallback payload");

            let mut payload = fallback(content);
            if let Some(obj) = payload.as_object_mut() {
                obj.insert("parse_error".to_string(), Value::Bool(true));
            }
            (payload, true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_plain() {
        let input = r#"{"summary": "plasma catalysis", "key_findings": []}"#;
        let result = extract_json(input);
        assert!(result.contains("\"summary\""));
    }

    #[test]
    fn test_extract_json_code_block() {
        let input = "```json\n{\"summary\": \"x\"}\n```";
        let result = extract_json(input);
        assert_eq!(result.trim(), "{\"summary\": \"x\"}");
    }

    #[test]
    fn test_extract_json_with_text() {
        let input = r#"Here is the analysis: {"summary": "y"} hope this helps"#;
        let result = extract_json(input);
        assert!(result.starts_with('{'));
        assert!(result.ends_with('}'));
    }

    #[test]
    fn test_parse_payload_ok() {
        let (payload, fell_back) = parse_payload(
            r#"{"summary": "ok", "key_findings": ["a"]}"#,
            |raw| json!({"summary": raw}),
        );
        assert!(!fell_back);
        assert_eq!(payload["key_findings"][0], "a");
        assert!(payload.get("parse_error").is_none());
    }

    #[test]
    fn test_parse_payload_fallback_keeps_raw_text() {
        let raw = "The model refused to emit JSON today.";
        let (payload, fell_back) =
            parse_payload(raw, |raw| json!({"summary": raw, "key_findings": []}));
        assert!(fell_back);
        assert_eq!(payload["parse_error"], true);
        assert_eq!(payload["summary"], raw);
        assert_eq!(payload["key_findings"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_parse_payload_rejects_bare_array() {
        // Top-level arrays are not the documented shape; treat as fallback
        let (payload, fell_back) = parse_payload("[1, 2, 3]", |raw| json!({"raw": raw}));
        assert!(fell_back);
        assert_eq!(payload["raw"], "[1, 2, 3]");
    }
}
