//! Pipeline Integration Tests
//!
//! End-to-end runs of the request pipeline without Telegram, Google or
//! Anthropic: the data source and matching backend are in-process fakes that
//! count their calls.

use async_trait::async_trait;
use expert_finder::delivery::{
    DENIED_TEXT, EMPTY_QUERY_DIRECT_TEXT, SERVICE_UNAVAILABLE_TEXT,
};
use expert_finder::{
    BackendError, CacheStore, CachedDataset, ChatKind, DataSource, DataSourceError,
    DatasetCacheManager, FormatMode, InboundRequest, MatchRequest, MatchingBackend,
    MatchingOrchestrator, MemoryCacheStore, Outcome, Pipeline, PipelineError,
    QueryIntentClassifier, Reply, Rows, SqliteCacheStore, Whitelist, DATASET_CACHE_KEY,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

const BOT: &str = "expert_bot";
const GROUP: i64 = -100;
const USER: i64 = 4242;

// ============ Fakes ============

struct FakeSource {
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl DataSource for FakeSource {
    fn identity(&self) -> String {
        "fake-sheet".to_string()
    }

    async fn fetch(&self) -> Result<Rows, DataSourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(DataSourceError::Api { status: 500, body: "sheet exploded".into() });
        }
        Ok(vec![
            vec!["Name".into(), "Graduation".into(), "City".into(), "Contacts".into(), "Expertise".into()],
            vec!["Anna".into(), "2012".into(), "Berlin".into(), "@anna".into(), "iOS, Swift".into()],
            vec!["Oleg".into(), "2015".into(), "Tbilisi".into(), "@oleg".into(), "Tax law".into()],
        ])
    }
}

/// Pops one scripted result per call and records which model was asked
struct FakeBackend {
    script: Mutex<VecDeque<Result<String, BackendError>>>,
    calls: Mutex<Vec<String>>,
    requests: Mutex<Vec<MatchRequest>>,
}

impl FakeBackend {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn last_request(&self) -> Option<MatchRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl MatchingBackend for FakeBackend {
    async fn generate(&self, model: &str, request: &MatchRequest) -> Result<String, BackendError> {
        self.calls.lock().unwrap().push(model.to_string());
        self.requests.lock().unwrap().push(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("**Name:** Anna".to_string()))
    }
}

fn overloaded() -> BackendError {
    BackendError::Api { status: 529, body: r#"{"error":{"type":"overloaded_error"}}"#.into() }
}

fn unauthorized() -> BackendError {
    BackendError::Api { status: 401, body: r#"{"error":{"type":"authentication_error"}}"#.into() }
}

// ============ Harness ============

struct Harness {
    source: Arc<FakeSource>,
    backend: Arc<FakeBackend>,
    store: Arc<MemoryCacheStore>,
    pipeline: Pipeline,
}

impl Harness {
    fn new(script: Vec<Result<String, BackendError>>) -> Self {
        Self::build(script, false)
    }

    fn with_failing_source() -> Self {
        Self::build(vec![], true)
    }

    fn build(script: Vec<Result<String, BackendError>>, fail_source: bool) -> Self {
        let source = Arc::new(FakeSource { calls: AtomicUsize::new(0), fail: fail_source });
        let backend = Arc::new(FakeBackend {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        });
        let store = Arc::new(MemoryCacheStore::new());

        let pipeline = Pipeline::new(
            Arc::new(Whitelist::new([GROUP], [USER])),
            QueryIntentClassifier::new(BOT),
            DatasetCacheManager::new(source.clone(), store.clone()),
            MatchingOrchestrator::new(
                backend.clone(),
                vec!["model-a".into(), "model-b".into(), "model-c".into()],
            ),
        );

        Self { source, backend, store, pipeline }
    }

    fn fetches(&self) -> usize {
        self.source.calls.load(Ordering::SeqCst)
    }

    async fn run(&self, request: InboundRequest) -> (Outcome, Reply) {
        let outcome = self.pipeline.process(&request).await;
        let reply = Reply::from_outcome(&outcome, BOT);
        (outcome, reply)
    }
}

fn group_message(chat_id: i64, text: &str) -> InboundRequest {
    InboundRequest { chat_id, user_id: USER, chat_kind: ChatKind::Group, text: text.to_string() }
}

fn direct_message(user_id: i64, text: &str) -> InboundRequest {
    InboundRequest { chat_id: user_id, user_id, chat_kind: ChatKind::Direct, text: text.to_string() }
}

// ============ Authorization ============

mod authorization {
    use super::*;

    #[tokio::test]
    async fn test_whitelisted_group_gets_matches() {
        let h = Harness::new(vec![]);
        let (outcome, reply) = h.run(group_message(GROUP, "@expert_bot iOS developer")).await;

        assert!(matches!(outcome, Outcome::Matched(_)));
        assert_eq!(reply.format, FormatMode::Rich);
        assert_eq!(h.fetches(), 1);
    }

    #[tokio::test]
    async fn test_foreign_group_denied_without_downstream_calls() {
        let h = Harness::new(vec![]);
        let (outcome, reply) = h.run(group_message(-200, "@expert_bot iOS developer")).await;

        assert!(matches!(outcome, Outcome::Denied));
        assert_eq!(reply.text, DENIED_TEXT);
        assert_eq!(reply.format, FormatMode::Plain);
        assert_eq!(h.fetches(), 0);
        assert!(h.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_direct_user_denied() {
        let h = Harness::new(vec![]);
        let (outcome, _) = h.run(direct_message(999, "iOS developer")).await;

        assert!(matches!(outcome, Outcome::Denied));
        assert_eq!(h.fetches(), 0);
        assert!(h.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_denied_even_when_query_empty() {
        let h = Harness::new(vec![]);
        let (outcome, _) = h.run(group_message(-200, "@expert_bot")).await;
        assert!(matches!(outcome, Outcome::Denied));
    }
}

// ============ Query extraction ============

mod query {
    use super::*;

    #[tokio::test]
    async fn test_mention_only_group_message_is_empty() {
        let h = Harness::new(vec![]);
        let (outcome, reply) = h.run(group_message(GROUP, "@expert_bot   ")).await;

        assert!(matches!(outcome, Outcome::EmptyQuery(ChatKind::Group)));
        assert_eq!(
            reply.text,
            "Пожалуйста, укажите запрос. Например: @expert_bot найди мне iOS разработчика"
        );
        assert_eq!(h.fetches(), 0);
        assert!(h.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_blank_direct_message_is_empty() {
        let h = Harness::new(vec![]);
        let (outcome, reply) = h.run(direct_message(USER, "  \n ")).await;

        assert!(matches!(outcome, Outcome::EmptyQuery(ChatKind::Direct)));
        assert_eq!(reply.text, EMPTY_QUERY_DIRECT_TEXT);
        assert_eq!(h.fetches(), 0);
        assert!(h.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_help_command_short_circuits() {
        let h = Harness::new(vec![]);
        let (outcome, reply) = h.run(direct_message(USER, "/start")).await;

        assert!(matches!(outcome, Outcome::Help(ChatKind::Direct)));
        assert_eq!(reply.text, EMPTY_QUERY_DIRECT_TEXT);
        assert_eq!(h.fetches(), 0);
    }

    #[tokio::test]
    async fn test_mentioned_help_command_in_group() {
        let h = Harness::new(vec![]);
        let (outcome, reply) = h.run(group_message(GROUP, "@expert_bot /help")).await;

        assert!(matches!(outcome, Outcome::Help(ChatKind::Group)));
        assert_eq!(
            reply.text,
            "Пожалуйста, укажите запрос. Например: @expert_bot найди мне iOS разработчика"
        );
        assert_eq!(h.fetches(), 0);
        assert!(h.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_mentions_stripped_before_matching() {
        let h = Harness::new(vec![]);
        h.run(group_message(GROUP, "@Expert_Bot кто знает Swift @EXPERT_BOT")).await;

        let request = h.backend.last_request().unwrap();
        assert!(request.prompt.contains("Request:\nкто знает Swift\n"));
        assert!(!request.prompt.to_lowercase().contains("@expert_bot"));
    }

    #[tokio::test]
    async fn test_show_all_forwards_ceiling_20() {
        let h = Harness::new(vec![]);
        h.run(direct_message(USER, "show all ios developers")).await;

        let request = h.backend.last_request().unwrap();
        assert!(request.system.contains("at most 20 people"));
    }

    #[tokio::test]
    async fn test_plain_query_forwards_ceiling_5() {
        let h = Harness::new(vec![]);
        h.run(direct_message(USER, "ios developer")).await;

        let request = h.backend.last_request().unwrap();
        assert!(request.system.contains("at most 5 people"));
    }

    #[tokio::test]
    async fn test_full_dataset_forwarded() {
        let h = Harness::new(vec![]);
        h.run(direct_message(USER, "tax lawyer")).await;

        let request = h.backend.last_request().unwrap();
        assert!(request.prompt.contains("Name | Graduation | City | Contacts | Expertise"));
        assert!(request.prompt.contains("Anna | 2012"));
        assert!(request.prompt.contains("Oleg | 2015"));
    }
}

// ============ Dataset cache ============

mod dataset_cache {
    use super::*;

    #[tokio::test]
    async fn test_second_request_served_from_cache() {
        let h = Harness::new(vec![]);
        h.run(direct_message(USER, "ios")).await;
        h.run(direct_message(USER, "android")).await;

        assert_eq!(h.fetches(), 1);
        assert_eq!(h.backend.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_stale_entry_refetched_once() {
        let h = Harness::new(vec![]);
        let now = chrono::Utc::now().timestamp_millis();
        assert_ok!(
            h.store
                .write(
                    DATASET_CACHE_KEY,
                    &CachedDataset {
                        timestamp: now - 4_000_000,
                        source: "fake-sheet".into(),
                        data: vec![vec!["Name".into()], vec!["Stale".into()]],
                    },
                )
                .await
        );

        h.run(direct_message(USER, "ios")).await;

        assert_eq!(h.fetches(), 1);
        let entry = h.store.read(DATASET_CACHE_KEY).await.unwrap().unwrap();
        assert!(entry.timestamp >= now);
        assert_eq!(entry.data[1][0], "Anna");
    }

    #[tokio::test]
    async fn test_source_failure_returns_generic_text() {
        let h = Harness::with_failing_source();
        let (outcome, reply) = h.run(direct_message(USER, "ios")).await;

        assert!(matches!(outcome, Outcome::Failed(PipelineError::DataSourceUnavailable(_))));
        assert_eq!(reply.text, SERVICE_UNAVAILABLE_TEXT);
        assert!(!reply.text.contains("exploded"));
        assert!(h.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_sqlite_store_shared_between_managers() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteCacheStore::open(&dir.path().join("cache.db")).unwrap());
        let source = Arc::new(FakeSource { calls: AtomicUsize::new(0), fail: false });

        let first = DatasetCacheManager::new(source.clone(), store.clone());
        let second = DatasetCacheManager::new(source.clone(), store.clone());

        let a = assert_ok!(first.get_dataset().await);
        let b = assert_ok!(second.get_dataset().await);

        assert_eq!(a, b);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_cold_requests_all_succeed() {
        let h = Arc::new(Harness::new(vec![]));
        let mut handles = Vec::new();
        for i in 0..4 {
            let h = Arc::clone(&h);
            handles.push(tokio::spawn(async move {
                let (outcome, _) = h.run(direct_message(USER, &format!("query {}", i))).await;
                matches!(outcome, Outcome::Matched(_))
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap());
        }
        // Duplicate upstream fetches are allowed, at most one per request
        let fetches = h.fetches();
        assert!((1..=4).contains(&fetches));
    }
}

// ============ Fallback chain ============

mod fallback {
    use super::*;

    #[tokio::test]
    async fn test_overload_then_success() {
        let h = Harness::new(vec![Err(overloaded()), Ok("from model-b".into())]);
        let (outcome, reply) = h.run(direct_message(USER, "ios")).await;

        match outcome {
            Outcome::Matched(response) => {
                assert_eq!(response.body, "from model-b");
                assert_eq!(response.model, "model-b");
                assert_eq!(response.attempts.len(), 2);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(reply.text, "from model-b");
        assert_eq!(h.backend.calls(), vec!["model-a", "model-b"]);
    }

    #[tokio::test]
    async fn test_fatal_error_stops_chain() {
        let h = Harness::new(vec![Err(unauthorized()), Ok("never".into())]);
        let (outcome, reply) = h.run(direct_message(USER, "ios")).await;

        assert!(matches!(
            outcome,
            Outcome::Failed(PipelineError::MatchingServiceUnavailable { attempts: 1, .. })
        ));
        assert_eq!(reply.text, SERVICE_UNAVAILABLE_TEXT);
        assert_eq!(h.backend.calls(), vec!["model-a"]);
    }

    #[tokio::test]
    async fn test_all_models_overloaded() {
        let h = Harness::new(vec![Err(overloaded()), Err(overloaded()), Err(overloaded())]);
        let (outcome, reply) = h.run(direct_message(USER, "ios")).await;

        let err = match outcome {
            Outcome::Failed(err) => err,
            other => panic!("unexpected outcome: {:?}", other),
        };
        let envelope = err.envelope();
        assert_eq!(envelope.user_message, SERVICE_UNAVAILABLE_TEXT);
        assert!(envelope.detail.contains("overloaded_error"));
        assert!(!reply.text.contains("overloaded"));
        assert_eq!(h.backend.calls(), vec!["model-a", "model-b", "model-c"]);
    }

    #[tokio::test]
    async fn test_orchestrator_direct_failure_is_err() {
        let h = Harness::new(vec![Err(unauthorized())]);
        let orchestrator = MatchingOrchestrator::new(h.backend.clone(), vec!["only".into()]);
        let dataset = CachedDataset { timestamp: 0, source: String::new(), data: vec![] };

        assert_err!(orchestrator.find_matches("ios", &dataset, 5).await);
    }
}
