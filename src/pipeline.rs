//! Request-processing pipeline
//!
//! ```text
//! InboundRequest ──► Whitelist ──► Intent ──► Dataset cache ──► Matching ──► Outcome
//!                       │            │             │                │
//!                     Denied     EmptyQuery    Failed(..)       Failed(..)
//! ```
//!
//! Stages run strictly in order within one run. A denied or empty request
//! never reaches the dataset cache or the matching service.

use std::sync::Arc;
use tracing::{debug, error, info};

use crate::dataset::DatasetCacheManager;
use crate::error::PipelineError;
use crate::intent::QueryIntentClassifier;
use crate::matching::{AttemptOutcome, MatchResponse, MatchingOrchestrator};
use crate::whitelist::{AuthorizationContext, ChatKind, Whitelist};

/// Transport-independent inbound update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRequest {
    pub chat_id: i64,
    pub user_id: i64,
    pub chat_kind: ChatKind,
    pub text: String,
}

impl InboundRequest {
    pub fn context(&self) -> AuthorizationContext {
        AuthorizationContext {
            chat_id: self.chat_id,
            user_id: self.user_id,
            chat_kind: self.chat_kind,
        }
    }

}

/// `/start` or `/help`, optionally addressed as `/help@bot`
fn is_help_command(text: &str) -> bool {
    let command = text.split_whitespace().next().unwrap_or("");
    let command = command.split('@').next().unwrap_or("");
    matches!(command, "/start" | "/help")
}

/// Result of one pipeline run
#[derive(Debug)]
pub enum Outcome {
    Denied,
    EmptyQuery(ChatKind),
    Help(ChatKind),
    Matched(MatchResponse),
    Failed(PipelineError),
}

/// The four pipeline stages wired together
#[derive(Clone)]
pub struct Pipeline {
    whitelist: Arc<Whitelist>,
    classifier: QueryIntentClassifier,
    datasets: DatasetCacheManager,
    orchestrator: MatchingOrchestrator,
}

impl Pipeline {
    pub fn new(
        whitelist: Arc<Whitelist>,
        classifier: QueryIntentClassifier,
        datasets: DatasetCacheManager,
        orchestrator: MatchingOrchestrator,
    ) -> Self {
        Self {
            whitelist,
            classifier,
            datasets,
            orchestrator,
        }
    }

    pub fn classifier(&self) -> &QueryIntentClassifier {
        &self.classifier
    }

    pub fn datasets(&self) -> &DatasetCacheManager {
        &self.datasets
    }

    pub async fn process(&self, request: &InboundRequest) -> Outcome {
        let ctx = request.context();

        if !self.whitelist.authorize(&ctx).is_authorized() {
            info!(
                "Denied: chat={}, user={}, kind={:?}",
                ctx.chat_id, ctx.user_id, ctx.chat_kind
            );
            return Outcome::Denied;
        }

        // Mention is stripped first so `@bot /help` in a group is still a command
        let query = self.classifier.extract(&request.text, request.chat_kind);
        if is_help_command(&query.text) {
            return Outcome::Help(request.chat_kind);
        }

        if query.is_empty() {
            debug!("Empty query from chat={}", ctx.chat_id);
            return Outcome::EmptyQuery(request.chat_kind);
        }

        debug!(
            "Query: {:?} (all_results={}, ceiling={})",
            query.text,
            query.all_results,
            query.result_ceiling()
        );

        let dataset = match self.datasets.get_dataset().await {
            Ok(dataset) => dataset,
            Err(e) => return self.fail(e),
        };

        match self
            .orchestrator
            .find_matches(&query.text, &dataset, query.result_ceiling())
            .await
        {
            Ok(response) => {
                log_attempts(&response);
                Outcome::Matched(response)
            }
            Err(e) => self.fail(e),
        }
    }

    fn fail(&self, err: PipelineError) -> Outcome {
        error!("Request failed: {}", err.detail());
        Outcome::Failed(err)
    }
}

fn log_attempts(response: &MatchResponse) {
    let trail = response
        .attempts
        .iter()
        .map(|a| match &a.outcome {
            AttemptOutcome::Success => format!("{}=ok", a.model),
            AttemptOutcome::Failure { class, .. } => format!("{}={:?}", a.model, class),
        })
        .collect::<Vec<_>>()
        .join(", ");
    info!("Model attempts: [{}]", trail);
}
