//! Expert Finder - Entry Point
//!
//! Modes:
//! - Default: Telegram bot plus HTTP read path
//! - --http-only: HTTP read path without the bot
//! - --no-persist: keep the dataset cache in memory only

use anyhow::Context;
use expert_finder::{
    http, telegram, ClaudeClient, Config, DatasetCacheManager, GoogleSheetsSource,
    MatchingOrchestrator, MemoryCacheStore, Pipeline, QueryIntentClassifier, SqliteCacheStore,
};
use expert_finder::store::CacheStore;
use std::sync::Arc;
use teloxide::Bot;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Parse args
    let args: Vec<String> = std::env::args().collect();
    let http_only = args.iter().any(|a| a == "--http-only");
    let no_persist = args.iter().any(|a| a == "--no-persist");
    let json_logs = args.iter().any(|a| a == "--json-logs");
    let help_mode = args.iter().any(|a| a == "--help" || a == "-h");

    if help_mode {
        println!("Expert Finder v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: expert-finder [OPTIONS]");
        println!();
        println!("Options:");
        println!("  --http-only     Serve the HTTP read path without the Telegram bot");
        println!("  --no-persist    Keep the dataset cache in memory only");
        println!("  --json-logs     Log as JSON");
        println!("  --help, -h      Show this help");
        println!();
        println!("Environment variables:");
        println!("  TELEGRAM_BOT_TOKEN    Telegram bot token");
        println!("  BOT_USERNAME          Bot mention (default: resolved via getMe)");
        println!("  ALLOWED_GROUP_IDS     Comma-separated group chat ids");
        println!("  ALLOWED_USER_IDS      Comma-separated user ids");
        println!("  GOOGLE_SHEET_ID       Expert spreadsheet id");
        println!("  GOOGLE_SHEET_RANGE    Range to read (default: A:Z)");
        println!("  GOOGLE_API_KEY        Google Sheets API key");
        println!("  ANTHROPIC_API_KEY     Claude API key");
        println!("  MATCHING_MODELS       Comma-separated model chain, highest priority first");
        println!("  DATASET_CACHE_PATH    SQLite cache file");
        println!("  HTTP_ADDR             Read path address (default: 0.0.0.0:8080)");
        return Ok(());
    }

    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    if json_logs {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_ansi(false)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_ansi(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    info!("Expert Finder v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    info!(
        "Whitelist: {} group(s), {} user(s); model chain: {:?}",
        config.whitelist.group_count(),
        config.whitelist.user_count(),
        config.model_chain
    );

    let store: Arc<dyn CacheStore> = if no_persist {
        info!("Dataset cache: in-memory");
        Arc::new(MemoryCacheStore::new())
    } else {
        Arc::new(SqliteCacheStore::open(&config.cache_path).context("opening dataset cache")?)
    };

    let datasets = DatasetCacheManager::with_ttl(
        Arc::new(GoogleSheetsSource::from_config(&config)),
        store,
        config.cache_ttl_ms,
    );

    let http_state = Arc::new(http::AppState::new(datasets.clone()));

    if http_only {
        return http::serve(config.http_addr, http_state).await;
    }

    let claude = ClaudeClient::from_config(&config);
    if !claude.is_available() {
        warn!("ANTHROPIC_API_KEY not set - every match request will fail");
    }
    let orchestrator = MatchingOrchestrator::new(Arc::new(claude), config.model_chain.clone())
        .with_max_tokens(config.max_tokens);

    let token = config
        .telegram_token
        .clone()
        .context("TELEGRAM_BOT_TOKEN must be set")?;
    let bot = Bot::new(token);
    let bot_username = telegram::resolve_username(&bot, config.bot_username.as_deref()).await?;

    let pipeline = Pipeline::new(
        Arc::new(config.whitelist.clone()),
        QueryIntentClassifier::new(&bot_username),
        datasets,
        orchestrator,
    );

    let http_addr = config.http_addr;
    tokio::spawn(async move {
        if let Err(e) = http::serve(http_addr, http_state).await {
            tracing::error!("HTTP read path stopped: {:#}", e);
        }
    });

    telegram::run_telegram_bot(bot, pipeline, bot_username).await
}
