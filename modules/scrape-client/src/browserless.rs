use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Result, ScrapeError};
use crate::page::parse_page;

/// Headless Chrome rendering through a Browserless instance.
pub struct BrowserlessClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

/// Rendered page plus, optionally, the text of its "about" page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageCapture {
    pub url: String,
    pub final_url: String,
    pub title: String,
    pub description: String,
    pub text: String,
    pub links: Vec<String>,
    pub emails: Vec<String>,
    pub about_url: Option<String>,
    pub about_text: Option<String>,
}

impl BrowserlessClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        }
    }

    /// Fetch fully-rendered HTML content for a URL via Browserless /content endpoint.
    pub async fn content(&self, url: &str) -> Result<String> {
        let mut endpoint = format!("{}/content", self.base_url);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }

        let body = serde_json::json!({ "url": url });

        let resp = self
            .client
            .post(&endpoint)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ScrapeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.text().await?)
    }

    /// Render `url` and parse it. With `include_about`, a same-host about page is
    /// rendered too; failure there only drops the about text.
    pub async fn fetch_page(&self, url: &str, include_about: bool) -> Result<PageCapture> {
        if url::Url::parse(url).is_err() {
            return Err(ScrapeError::InvalidUrl(url.to_string()));
        }

        let html = self.content(url).await?;
        let parsed = parse_page(&html, url);
        debug!(url, links = parsed.links.len(), "Rendered page");

        let mut capture = PageCapture {
            url: url.to_string(),
            final_url: url.to_string(),
            title: parsed.title,
            description: parsed.description,
            text: parsed.text,
            links: parsed.links,
            emails: parsed.emails,
            about_url: parsed.about_url,
            about_text: None,
        };

        if include_about {
            if let Some(about_url) = capture.about_url.clone() {
                match self.content(&about_url).await {
                    Ok(about_html) => {
                        let about = parse_page(&about_html, &about_url);
                        for email in about.emails {
                            if !capture.emails.contains(&email) {
                                capture.emails.push(email);
                            }
                        }
                        capture.about_text = Some(about.text).filter(|t| !t.is_empty());
                    }
                    Err(e) => warn!(url = about_url.as_str(), error = %e, "About page fetch failed"),
                }
            }
        }

        Ok(capture)
    }
}
