//! Configuration management

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::claude::DEFAULT_MODEL_CHAIN;
use crate::dataset::DATASET_TTL_MS;
use crate::matching::DEFAULT_MAX_TOKENS;
use crate::whitelist::Whitelist;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram bot token (only needed in bot mode)
    pub telegram_token: Option<String>,

    /// Bot username used as the mention token; resolved via getMe when unset
    pub bot_username: Option<String>,

    /// Authorization policy
    pub whitelist: Whitelist,

    /// Google spreadsheet holding the expert table
    pub sheet_id: String,

    /// A1 range to read
    pub sheet_range: String,

    /// Google API key for the Sheets values endpoint
    pub google_api_key: String,

    /// Anthropic API key (matching fails fast without it)
    pub anthropic_api_key: Option<String>,

    /// Model identifiers, highest priority first
    pub model_chain: Vec<String>,

    /// Max response tokens per matching call
    pub max_tokens: usize,

    /// SQLite file for the dataset cache
    pub cache_path: PathBuf,

    /// Dataset TTL in milliseconds
    pub cache_ttl_ms: i64,

    /// Listen address of the HTTP read path
    pub http_addr: SocketAddr,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let telegram_token = non_empty_var("TELEGRAM_BOT_TOKEN");
        let bot_username = non_empty_var("BOT_USERNAME")
            .map(|u| u.trim_start_matches('@').to_string());

        let whitelist = Whitelist::parse(
            &std::env::var("ALLOWED_GROUP_IDS").unwrap_or_default(),
            &std::env::var("ALLOWED_USER_IDS").unwrap_or_default(),
        )?;

        let sheet_id = std::env::var("GOOGLE_SHEET_ID").context("GOOGLE_SHEET_ID must be set")?;
        let sheet_range = std::env::var("GOOGLE_SHEET_RANGE").unwrap_or_else(|_| "A:Z".to_string());
        let google_api_key = std::env::var("GOOGLE_API_KEY").context("GOOGLE_API_KEY must be set")?;

        let anthropic_api_key = non_empty_var("ANTHROPIC_API_KEY");

        let model_chain = parse_model_chain(&std::env::var("MATCHING_MODELS").unwrap_or_default());

        let max_tokens = std::env::var("MATCHING_MAX_TOKENS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_TOKENS);

        let cache_path = std::env::var("DATASET_CACHE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_cache_path());

        let cache_ttl_ms = std::env::var("DATASET_CACHE_TTL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DATASET_TTL_MS);

        let http_addr = std::env::var("HTTP_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .context("HTTP_ADDR must be a socket address like 0.0.0.0:8080")?;

        Ok(Self {
            telegram_token,
            bot_username,
            whitelist,
            sheet_id,
            sheet_range,
            google_api_key,
            anthropic_api_key,
            model_chain,
            max_tokens,
            cache_path,
            cache_ttl_ms,
            http_addr,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Comma-separated model ids; empty input yields the built-in chain
pub fn parse_model_chain(raw: &str) -> Vec<String> {
    let chain: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    if chain.is_empty() {
        DEFAULT_MODEL_CHAIN.iter().map(|s| s.to_string()).collect()
    } else {
        chain
    }
}

fn default_cache_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("expert-finder")
        .join("cache.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_chain_keeps_order() {
        assert_eq!(parse_model_chain(" b , a,,c "), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_model_chain_default() {
        let chain = parse_model_chain("");
        assert_eq!(chain.len(), DEFAULT_MODEL_CHAIN.len());
        assert_eq!(chain[0], DEFAULT_MODEL_CHAIN[0]);
    }

    #[test]
    fn test_default_cache_path_file_name() {
        let path = default_cache_path();
        assert!(path.ends_with("expert-finder/cache.db"));
    }
}
