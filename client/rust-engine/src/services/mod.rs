use std::sync::Arc;

use crate::config::Config;
use crate::error::EngineError;
use crate::models::Challenge;
use crate::utils::retry::RetryConfig;

use attempt_reconciler::AttemptReconciler;
use challenge_api::ChallengeApi;
use challenge_session::ChallengeSession;
use progress_store::{ProgressSink, ProgressStore};
use question_bank::QuestionBank;

pub mod attempt_reconciler;
pub mod challenge_api;
pub mod challenge_session;
pub mod progress_store;
pub mod question_bank;

/// Everything a front-end needs to list and play challenges.
pub struct EngineState {
    pub config: Config,
    pub questions: QuestionBank,
    pub reconciler: AttemptReconciler,
    pub progress: Arc<ProgressStore>,
}

impl EngineState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let progress = Arc::new(ProgressStore::load(&config.progress_path).await?);
        Self::with_progress(config, progress)
    }

    pub fn with_progress(config: Config, progress: Arc<ProgressStore>) -> anyhow::Result<Self> {
        let (questions, reconciler) = if config.offline {
            tracing::info!("Offline mode: serving bundled challenges and grading locally");
            (QuestionBank::offline(), AttemptReconciler::offline())
        } else {
            let api = ChallengeApi::from_config(&config)?;
            tracing::info!("Using challenge API at {}", api.base_url());
            (
                QuestionBank::new(api.clone(), RetryConfig::with_retries(config.fetch_retries)),
                AttemptReconciler::new(Arc::new(api)),
            )
        };

        Ok(Self {
            config,
            questions,
            reconciler,
            progress,
        })
    }

    /// Starts a session wired to this state's reconciler, progress and config.
    pub fn start_session(
        &self,
        challenge: Challenge,
        on_complete: impl Fn(u32, u32) + Send + Sync + 'static,
    ) -> Result<ChallengeSession, EngineError> {
        let sink: Arc<dyn ProgressSink> = self.progress.clone();
        ChallengeSession::builder(self.reconciler.clone(), sink)
            .result_delay(self.config.result_delay())
            .credit_policy(self.config.credit_policy)
            .on_complete(on_complete)
            .start(challenge)
    }
}
