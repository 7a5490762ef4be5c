use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{Result, ScrapeError};

const SERPER_URL: &str = "https://google.serper.dev/search";

/// Google results via Serper.
pub struct SerperClient {
    api_key: String,
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SerperHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

/// One search call. Quota exhaustion is reported as a warning, not an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SerperPage {
    pub hits: Vec<SerperHit>,
    pub warning: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperResult>,
}

#[derive(Debug, Deserialize)]
struct SerperResult {
    #[serde(default)]
    link: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
}

impl SerperClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            endpoint: SERPER_URL.to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<SerperPage> {
        if query.trim().is_empty() {
            return Ok(SerperPage::default());
        }
        info!(query, limit, "Serper search");

        let body = serde_json::json!({ "q": query, "num": limit });
        let resp = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            if is_quota_failure(status.as_u16(), &message) {
                warn!(query, status = status.as_u16(), "Serper quota exhausted");
                return Ok(SerperPage {
                    hits: Vec::new(),
                    warning: Some("Search quota exceeded".to_string()),
                });
            }
            return Err(ScrapeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let data: SerperResponse = resp.json().await?;
        let hits: Vec<SerperHit> = data
            .organic
            .into_iter()
            .filter(|r| !r.link.is_empty())
            .take(limit)
            .map(|r| SerperHit {
                url: r.link,
                title: r.title,
                snippet: r.snippet,
            })
            .collect();

        info!(query, count = hits.len(), "Serper search complete");
        Ok(SerperPage {
            hits,
            warning: None,
        })
    }
}

fn is_quota_failure(status: u16, message: &str) -> bool {
    let lowered = message.to_lowercase();
    status == 429 || (status == 403 && (lowered.contains("credit") || lowered.contains("quota")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_detection() {
        assert!(is_quota_failure(429, ""));
        assert!(is_quota_failure(403, "Not enough credits"));
        assert!(!is_quota_failure(403, "Unauthorized"));
        assert!(!is_quota_failure(500, "quota"));
    }

    #[test]
    fn organic_results_tolerate_missing_fields() {
        let data: SerperResponse = serde_json::from_value(serde_json::json!({
            "organic": [{ "link": "https://avery.film" }, { "title": "no link" }]
        }))
        .unwrap();
        assert_eq!(data.organic.len(), 2);
        assert_eq!(data.organic[1].link, "");
    }
}
