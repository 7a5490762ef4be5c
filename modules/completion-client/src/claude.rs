use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{CompletionError, Result};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const TOOL_NAME: &str = "structured_response";

/// Claude client that forces a single tool call so the reply is schema-shaped JSON.
#[derive(Clone)]
pub struct Claude {
    api_key: String,
    model: String,
    base_url: String,
    http: reqwest::Client,
}

impl Claude {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: ANTHROPIC_API_URL.to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&self.api_key)
            .map_err(|e| CompletionError::Network(format!("invalid API key header: {e}")))?;
        headers.insert("x-api-key", key);
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// Ask for a reply matching `schema`. The schema should already be strict.
    pub async fn complete_json(&self, system: &str, user: &str, schema: &Value) -> Result<Value> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: 2048,
            temperature: 0.0,
            system,
            messages: vec![WireMessage {
                role: "user",
                content: user,
            }],
            tools: vec![ToolDefinition {
                name: TOOL_NAME,
                description: "Return the structured answer.",
                input_schema: schema,
            }],
            tool_choice: serde_json::json!({ "type": "tool", "name": TOOL_NAME }),
        };

        debug!(model = %self.model, "Claude structured completion request");

        let response = self
            .http
            .post(format!("{}/messages", self.base_url))
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CompletionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: MessagesResponse = response.json().await?;
        tool_input(body)
    }
}

fn tool_input(body: MessagesResponse) -> Result<Value> {
    body.content
        .into_iter()
        .find_map(|block| match block {
            ContentBlock::ToolUse { input, .. } => Some(input),
            ContentBlock::Other => None,
        })
        .ok_or(CompletionError::Empty)
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<WireMessage<'a>>,
    tools: Vec<ToolDefinition<'a>>,
    tool_choice: Value,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ToolDefinition<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "tool_use")]
    ToolUse { input: Value },
    #[serde(other)]
    Other,
}
