//! Claude API Client
//!
//! Anthropic Messages API client used as the matching backend.
//! The system block is marked `cache_control: ephemeral` so repeated
//! instructions are served from Anthropic's prompt cache.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::matching::{BackendError, MatchingBackend};
use crate::prompt::MatchRequest;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Fallback chain used when `MATCHING_MODELS` is not set, highest priority first
pub const DEFAULT_MODEL_CHAIN: &[&str] = &[
    "claude-sonnet-4-20250514",
    "claude-3-7-sonnet-20250219",
    "claude-3-5-haiku-20241022",
];

/// Claude API client
#[derive(Clone)]
pub struct ClaudeClient {
    client: Client,
    api_url: String,
    api_key: Option<String>,
}

/// System message block with optional cache control
#[derive(Debug, Serialize)]
struct SystemBlock {
    r#type: String,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_control: Option<CacheControl>,
}

#[derive(Debug, Serialize)]
struct CacheControl {
    r#type: String,
}

/// Message in conversation
#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

/// API request
#[derive(Debug, Serialize)]
struct MessageRequest {
    model: String,
    max_tokens: usize,
    system: Vec<SystemBlock>,
    messages: Vec<Message>,
}

/// API response
#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    r#type: String,
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: usize,
    #[serde(default)]
    output_tokens: usize,
    #[serde(default)]
    cache_read_input_tokens: usize,
}

impl ClaudeClient {
    pub fn new(api_key: Option<&str>) -> Self {
        Self {
            client: Client::new(),
            api_url: ANTHROPIC_API_URL.to_string(),
            api_key: api_key.map(|s| s.to_string()),
        }
    }

    /// Create from config
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self::new(config.anthropic_api_key.as_deref())
    }

    /// Point the client at a different endpoint (proxies, gateways)
    pub fn with_api_url(mut self, url: &str) -> Self {
        self.api_url = url.to_string();
        self
    }

    /// Check if API key is configured
    pub fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    /// Resolve short aliases to full model ids; anything else passes through
    pub fn model_id(model: &str) -> String {
        match model.to_lowercase().as_str() {
            "haiku" => "claude-3-5-haiku-20241022".to_string(),
            "sonnet" => "claude-sonnet-4-20250514".to_string(),
            "opus" => "claude-opus-4-20250514".to_string(),
            _ => model.to_string(),
        }
    }

    fn build_request(model_id: &str, request: &MatchRequest) -> MessageRequest {
        MessageRequest {
            model: model_id.to_string(),
            max_tokens: request.max_tokens,
            system: vec![SystemBlock {
                r#type: "text".to_string(),
                text: request.system.clone(),
                cache_control: Some(CacheControl {
                    r#type: "ephemeral".to_string(),
                }),
            }],
            messages: vec![Message {
                role: "user".to_string(),
                content: request.prompt.clone(),
            }],
        }
    }
}

/// Join the text blocks of a response
fn response_text(response: MessageResponse) -> String {
    response
        .content
        .into_iter()
        .filter_map(|b| if b.r#type == "text" { b.text } else { None })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl MatchingBackend for ClaudeClient {
    async fn generate(&self, model: &str, request: &MatchRequest) -> Result<String, BackendError> {
        let model_id = Self::model_id(model);
        let api_key = self.api_key.as_ref().ok_or(BackendError::MissingApiKey)?;

        debug!("Calling Claude API: model={}, prompt_len={}", model_id, request.prompt.len());

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&Self::build_request(&model_id, request))
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Api { status, body });
        }

        let result: MessageResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        info!(
            "Claude response: model={}, in={}, out={}, cache_read={}",
            model_id,
            result.usage.input_tokens,
            result.usage.output_tokens,
            result.usage.cache_read_input_tokens
        );

        let content = response_text(result);
        if content.trim().is_empty() {
            return Err(BackendError::EmptyResponse);
        }

        Ok(content)
    }
}
