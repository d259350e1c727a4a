//! Expert Finder
//!
//! Answers "who in this community can help with X" in Telegram by matching the
//! request against the community's expert spreadsheet with Claude.
//!
//! # Features
//!
//! - **Whitelist**: group-chat and direct-message allow lists, checked before any paid call
//! - **Intent**: mention stripping and multilingual "show all" detection
//! - **Dataset Cache**: one-hour cache-or-fetch over Google Sheets (SQLite or Moka)
//! - **Matching**: ordered Claude model fallback chain with typed error classification
//! - **Delivery**: localized replies, Telegram HTML, threaded group replies
//! - **Read Path**: `/experts` and `/health` over HTTP
//!
//! # Architecture
//!
//! ```text
//! Telegram ──► Pipeline ──► Whitelist
//!                  │
//!                  ├── Intent Classifier
//!                  ├── Dataset Cache ──► Google Sheets
//!                  │        └── Cache Store (SQLite / Moka)
//!                  ├── Matching ──► Claude API (model chain)
//!                  └── Delivery ──► Telegram reply
//! ```

pub mod claude;
pub mod config;
pub mod dataset;
pub mod delivery;
pub mod error;
pub mod http;
pub mod intent;
pub mod matching;
pub mod pipeline;
pub mod prompt;
pub mod sheets;
pub mod store;
pub mod telegram;
pub mod whitelist;

pub use claude::ClaudeClient;
pub use config::Config;
pub use dataset::{CachedDataset, DatasetCacheManager, DATASET_CACHE_KEY, DATASET_TTL_MS};
pub use delivery::Reply;
pub use error::{ErrorEnvelope, PipelineError};
pub use intent::{ExtractedQuery, QueryIntentClassifier};
pub use matching::{
    classify, BackendError, FailureClass, FormatMode, MatchResponse, MatchingBackend,
    MatchingOrchestrator, ModelAttempt,
};
pub use pipeline::{InboundRequest, Outcome, Pipeline};
pub use prompt::MatchRequest;
pub use sheets::{DataSource, DataSourceError, GoogleSheetsSource, Rows};
pub use store::{CacheStore, CacheStoreError, MemoryCacheStore, SqliteCacheStore};
pub use whitelist::{Authorization, AuthorizationContext, ChatKind, Whitelist};
