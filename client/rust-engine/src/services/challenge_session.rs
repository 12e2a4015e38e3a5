use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::attempt_reconciler::AttemptReconciler;
use super::progress_store::ProgressSink;
use crate::config::{CreditPolicy, DEFAULT_RESULT_DELAY_MS};
use crate::error::EngineError;
use crate::metrics::CHALLENGE_RUNS_TOTAL;
use crate::models::{AttemptResult, Challenge, Phase, Question};
use crate::runner::{Advance, AnswerOutcome, ChallengeRunner, CompletedRun};

/// Called once per run with `(score, correct)` after progress was credited.
pub type CompletionCallback = Box<dyn Fn(u32, u32) + Send + Sync>;

/// What observers see of the runner after every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub current_index: usize,
    pub total_questions: usize,
    pub cumulative_score: u32,
    pub correct_count: u32,
    pub streak: u32,
    pub was_revealed: bool,
}

impl SessionSnapshot {
    fn of(runner: &ChallengeRunner) -> Self {
        let state = runner.state();
        Self {
            phase: state.phase,
            current_index: state.current_index,
            total_questions: runner.challenge().questions.len(),
            cumulative_score: state.cumulative_score,
            correct_count: state.correct_count,
            streak: state.streak,
            was_revealed: state.was_revealed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SettledAttempt {
    pub attempt_id: Uuid,
    pub live: AttemptResult,
    /// `None` when the session was disposed before reconciliation returned.
    pub reconciled: Option<AttemptResult>,
    pub credited_points: u32,
    pub policy: CreditPolicy,
    pub best_streak: u32,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum Settlement {
    Pending,
    Settled(SettledAttempt),
    /// Disposed before any points were credited.
    Discarded,
}

pub struct SessionBuilder {
    reconciler: AttemptReconciler,
    sink: Arc<dyn ProgressSink>,
    result_delay: Duration,
    policy: CreditPolicy,
    on_complete: Option<CompletionCallback>,
}

impl SessionBuilder {
    pub fn result_delay(mut self, delay: Duration) -> Self {
        self.result_delay = delay;
        self
    }

    pub fn credit_policy(mut self, policy: CreditPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn on_complete(mut self, callback: impl Fn(u32, u32) + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    pub fn start(self, challenge: Challenge) -> Result<ChallengeSession, EngineError> {
        let runner = ChallengeRunner::new(challenge)?;
        let (snapshots, _) = watch::channel(SessionSnapshot::of(&runner));
        let (settlement, _) = watch::channel(Settlement::Pending);

        Ok(ChallengeSession {
            inner: Arc::new(Inner {
                slot: Mutex::new(RunnerSlot {
                    runner,
                    pending_advance: None,
                }),
                disposed: AtomicBool::new(false),
                result_delay: self.result_delay,
                snapshots,
                settler: Settler {
                    reconciler: self.reconciler,
                    sink: self.sink,
                    policy: self.policy,
                    on_complete: self.on_complete,
                    settlement,
                },
            }),
        })
    }
}

/// Async host around a [`ChallengeRunner`]: owns the display delay between a
/// graded answer and the next question, and is the only place where a
/// finished run turns into a point award.
#[derive(Clone)]
pub struct ChallengeSession {
    inner: Arc<Inner>,
}

struct Inner {
    slot: Mutex<RunnerSlot>,
    disposed: AtomicBool,
    result_delay: Duration,
    snapshots: watch::Sender<SessionSnapshot>,
    settler: Settler,
}

struct RunnerSlot {
    runner: ChallengeRunner,
    pending_advance: Option<JoinHandle<()>>,
}

struct Settler {
    reconciler: AttemptReconciler,
    sink: Arc<dyn ProgressSink>,
    policy: CreditPolicy,
    on_complete: Option<CompletionCallback>,
    settlement: watch::Sender<Settlement>,
}

impl ChallengeSession {
    pub fn builder(reconciler: AttemptReconciler, sink: Arc<dyn ProgressSink>) -> SessionBuilder {
        SessionBuilder {
            reconciler,
            sink,
            result_delay: Duration::from_millis(DEFAULT_RESULT_DELAY_MS),
            policy: CreditPolicy::default(),
            on_complete: None,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.snapshots.subscribe()
    }

    pub fn settlement(&self) -> Settlement {
        self.inner.settler.settlement.borrow().clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// `None` once the run is complete.
    pub async fn current_question(&self) -> Option<Question> {
        let slot = self.inner.slot.lock().await;
        (slot.runner.phase() != Phase::Complete).then(|| slot.runner.current_question().clone())
    }

    pub async fn supports_reveal(&self) -> bool {
        self.inner.slot.lock().await.runner.supports_reveal()
    }

    /// Grades `answer` and schedules the move to the next question.
    pub async fn submit(&self, answer: &str) -> Option<AnswerOutcome> {
        let mut slot = self.inner.slot.lock().await;
        if self.is_disposed() {
            return None;
        }

        let outcome = slot.runner.submit(answer)?;
        self.inner.publish(&slot.runner);

        let inner = Arc::downgrade(&self.inner);
        let delay = self.inner.result_delay;
        slot.pending_advance = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            advance_after_delay(inner).await;
        }));

        Some(outcome)
    }

    pub async fn reveal(&self) -> Option<String> {
        let mut slot = self.inner.slot.lock().await;
        if self.is_disposed() {
            return None;
        }

        let answer = slot.runner.reveal()?.to_string();
        self.inner.publish(&slot.runner);
        Some(answer)
    }

    /// Skips the current question. Settlement of a skipped last question runs
    /// in the background; observe it with [`ChallengeSession::wait_settled`].
    pub async fn skip(&self) -> bool {
        let completed = {
            let mut slot = self.inner.slot.lock().await;
            if self.is_disposed() {
                return false;
            }

            let Some(advance) = slot.runner.skip() else {
                return false;
            };
            self.inner.publish(&slot.runner);

            match advance {
                Advance::Completed(run) => Some(run),
                Advance::NextQuestion(_) => None,
            }
        };

        if let Some(run) = completed {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.settle(run).await });
        }
        true
    }

    /// Waits until the run is settled or discarded.
    pub async fn wait_settled(&self) -> Settlement {
        let mut settlement = self.inner.settler.settlement.subscribe();
        let settled = match settlement
            .wait_for(|s| !matches!(s, Settlement::Pending))
            .await
        {
            Ok(s) => s.clone(),
            Err(_) => Settlement::Discarded,
        };
        settled
    }

    /// Stops the session: cancels a pending advance and drops any late
    /// reconciliation result. Idempotent.
    pub async fn dispose(&self) {
        let mut slot = self.inner.slot.lock().await;
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(handle) = slot.pending_advance.take() {
            handle.abort();
            tracing::debug!(
                "Cancelled pending advance: attempt={}",
                slot.runner.attempt_id()
            );
        }

        if slot.runner.phase() != Phase::Complete {
            CHALLENGE_RUNS_TOTAL.with_label_values(&["abandoned"]).inc();
            self.inner
                .settler
                .settlement
                .send_replace(Settlement::Discarded);
            tracing::info!(
                "Challenge run abandoned: attempt={}, index={}",
                slot.runner.attempt_id(),
                slot.runner.current_index()
            );
        }
    }
}

async fn advance_after_delay(inner: Weak<Inner>) {
    let Some(inner) = inner.upgrade() else {
        return;
    };

    let completed = {
        let mut slot = inner.slot.lock().await;
        slot.pending_advance = None;
        if inner.disposed.load(Ordering::SeqCst) {
            return;
        }

        match slot.runner.advance() {
            Some(Advance::Completed(run)) => {
                inner.publish(&slot.runner);
                Some(run)
            }
            Some(Advance::NextQuestion(_)) => {
                inner.publish(&slot.runner);
                None
            }
            None => None,
        }
    };

    if let Some(run) = completed {
        inner.settle(run).await;
    }
}

impl Inner {
    fn publish(&self, runner: &ChallengeRunner) {
        self.snapshots.send_replace(SessionSnapshot::of(runner));
    }

    // Called without the runner lock held; reconciliation may hit the network.
    async fn settle(&self, run: CompletedRun) {
        let settler = &self.settler;
        let live = run.result().clone();

        let mut credited = None;
        if settler.policy == CreditPolicy::LiveScore {
            if self.disposed.load(Ordering::SeqCst) {
                settler.settlement.send_replace(Settlement::Discarded);
                return;
            }
            settler.credit(live.points, live.correct_count).await;
            credited = Some(live.points);
        }

        let reconciled = settler.reconciler.reconcile(run.challenge(), run.answers()).await;

        if self.disposed.load(Ordering::SeqCst) {
            tracing::info!(
                "Session disposed before reconciliation finished, discarding {} result: attempt={}",
                reconciled.source.as_str(),
                run.attempt_id()
            );
            let settlement = match credited {
                Some(points) => Settlement::Settled(SettledAttempt {
                    attempt_id: run.attempt_id(),
                    live,
                    reconciled: None,
                    credited_points: points,
                    policy: settler.policy,
                    best_streak: run.best_streak(),
                    completed_at: run.completed_at(),
                }),
                None => Settlement::Discarded,
            };
            settler.settlement.send_replace(settlement);
            return;
        }

        if reconciled.correct_count != live.correct_count
            || reconciled.total_questions != live.total_questions
        {
            tracing::warn!(
                "Live and {} results diverge: attempt={}, live={}/{}, reconciled={}/{}",
                reconciled.source.as_str(),
                run.attempt_id(),
                live.correct_count,
                live.total_questions,
                reconciled.correct_count,
                reconciled.total_questions
            );
        }

        let credited_points = match credited {
            Some(points) => points,
            None => {
                settler
                    .credit(reconciled.points, reconciled.correct_count)
                    .await;
                reconciled.points
            }
        };

        tracing::info!(
            "Attempt settled: attempt={}, policy={:?}, credited={}, source={}",
            run.attempt_id(),
            settler.policy,
            credited_points,
            reconciled.source.as_str()
        );

        settler
            .settlement
            .send_replace(Settlement::Settled(SettledAttempt {
                attempt_id: run.attempt_id(),
                live,
                reconciled: Some(reconciled),
                credited_points,
                policy: settler.policy,
                best_streak: run.best_streak(),
                completed_at: run.completed_at(),
            }));
    }
}

impl Settler {
    async fn credit(&self, points: u32, correct: u32) {
        self.sink.add_points(points).await;
        if let Some(on_complete) = &self.on_complete {
            on_complete(points, correct);
        }
    }
}
