use std::time::Duration;

use reqwest::redirect::Policy;
use tracing::debug;
use url::Url;

/// Follows `Location` headers one hop at a time so link shorteners can be
/// expanded without downloading the target.
pub struct RedirectResolver {
    client: reqwest::Client,
    max_hops: usize,
}

impl RedirectResolver {
    pub fn new(max_hops: usize) -> Self {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { client, max_hops }
    }

    /// Final destination of `url`. Any failure returns the last URL reached,
    /// which is `url` itself when the first hop fails.
    pub async fn resolve(&self, url: &str) -> String {
        let mut current = url.to_string();
        for _ in 0..self.max_hops {
            let Ok(base) = Url::parse(&current) else {
                break;
            };
            let resp = match self.client.head(base.as_str()).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    debug!(url = current.as_str(), error = %e, "Redirect probe failed");
                    break;
                }
            };
            if !resp.status().is_redirection() {
                break;
            }
            let Some(location) = resp
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
            else {
                break;
            };
            match base.join(location) {
                Ok(next) => current = next.to_string(),
                Err(_) => break,
            }
        }
        current
    }
}
