use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::EngineError;
use crate::metrics::{CHALLENGE_ANSWERS_TOTAL, CHALLENGE_RUNS_TOTAL, CHALLENGE_SKIPS_TOTAL};
use crate::models::{AttemptResult, Challenge, Phase, Question, QuestionFeedback, ResultSource};
use crate::scoring::{rule_for, ScoringRule};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptState {
    pub current_index: usize,
    pub cumulative_score: u32,
    pub correct_count: u32,
    pub streak: u32,
    pub best_streak: u32,
    pub phase: Phase,
    pub was_revealed: bool,
    pub selection: Option<String>,
}

impl AttemptState {
    fn new() -> Self {
        Self {
            current_index: 0,
            cumulative_score: 0,
            correct_count: 0,
            streak: 0,
            best_streak: 0,
            phase: Phase::AwaitingAnswer,
            was_revealed: false,
            selection: None,
        }
    }
}

/// A graded submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerOutcome {
    pub index: usize,
    pub was_correct: bool,
    pub points_awarded: u32,
    pub expected_answer: String,
    /// Lyric line with the blank filled by the expected answer.
    pub completed_line: String,
    pub streak: u32,
    pub cumulative_score: u32,
}

#[derive(Debug)]
pub enum Advance {
    NextQuestion(usize),
    Completed(CompletedRun),
}

/// Everything a finished run hands over for settlement.
///
/// Produced exactly once per run and deliberately not `Clone`: whoever holds
/// it owns the single point award for the run.
#[derive(Debug)]
pub struct CompletedRun {
    attempt_id: Uuid,
    challenge: Arc<Challenge>,
    answers: Vec<String>,
    result: AttemptResult,
    best_streak: u32,
    final_streak: u32,
    completed_at: DateTime<Utc>,
}

impl CompletedRun {
    pub fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    pub fn challenge(&self) -> &Challenge {
        &self.challenge
    }

    /// Submitted answers in question order; skipped questions are empty strings.
    pub fn answers(&self) -> &[String] {
        &self.answers
    }

    pub fn result(&self) -> &AttemptResult {
        &self.result
    }

    pub fn live_score(&self) -> u32 {
        self.result.total_score
    }

    pub fn best_streak(&self) -> u32 {
        self.best_streak
    }

    pub fn final_streak(&self) -> u32 {
        self.final_streak
    }

    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }
}

/// Per-attempt state machine:
/// `AwaitingAnswer --submit--> ShowingResult --advance--> AwaitingAnswer | Complete`,
/// with `skip` moving straight past the current question. The display delay
/// before `advance` belongs to the host session.
pub struct ChallengeRunner {
    attempt_id: Uuid,
    challenge: Arc<Challenge>,
    rule: Box<dyn ScoringRule>,
    state: AttemptState,
    answers: Vec<String>,
    feedback: Vec<QuestionFeedback>,
}

impl ChallengeRunner {
    pub fn new(challenge: Challenge) -> Result<Self, EngineError> {
        let rule = rule_for(challenge.kind);
        Self::with_rule(challenge, rule)
    }

    pub fn with_rule(challenge: Challenge, rule: Box<dyn ScoringRule>) -> Result<Self, EngineError> {
        challenge.check()?;

        let attempt_id = Uuid::new_v4();
        CHALLENGE_RUNS_TOTAL.with_label_values(&["started"]).inc();
        tracing::info!(
            "Challenge run started: attempt={}, challenge={}, type={}, questions={}",
            attempt_id,
            challenge.id,
            challenge.kind,
            challenge.questions.len()
        );

        Ok(Self {
            attempt_id,
            answers: Vec::with_capacity(challenge.questions.len()),
            feedback: Vec::with_capacity(challenge.questions.len()),
            challenge: Arc::new(challenge),
            rule,
            state: AttemptState::new(),
        })
    }

    pub fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    pub fn challenge(&self) -> &Challenge {
        &self.challenge
    }

    pub fn state(&self) -> &AttemptState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn current_index(&self) -> usize {
        self.state.current_index
    }

    pub fn current_question(&self) -> &Question {
        &self.challenge.questions[self.state.current_index]
    }

    pub fn cumulative_score(&self) -> u32 {
        self.state.cumulative_score
    }

    pub fn correct_count(&self) -> u32 {
        self.state.correct_count
    }

    pub fn streak(&self) -> u32 {
        self.state.streak
    }

    pub fn best_streak(&self) -> u32 {
        self.state.best_streak
    }

    pub fn is_revealed(&self) -> bool {
        self.state.was_revealed
    }

    pub fn supports_reveal(&self) -> bool {
        self.rule.supports_reveal()
    }

    pub fn answers(&self) -> &[String] {
        &self.answers
    }

    pub fn feedback(&self) -> &[QuestionFeedback] {
        &self.feedback
    }

    /// Fraction of the challenge reached, counting the current question.
    pub fn progress(&self) -> f64 {
        (self.state.current_index + 1) as f64 / self.challenge.questions.len() as f64
    }

    /// Grades `answer` for the current question.
    ///
    /// Returns `None` without touching state when the runner is not awaiting an
    /// answer or the answer is not gradable (blank text, unknown option).
    pub fn submit(&mut self, answer: &str) -> Option<AnswerOutcome> {
        if self.state.phase != Phase::AwaitingAnswer {
            tracing::debug!(
                "Ignoring submit in phase {:?}: attempt={}",
                self.state.phase,
                self.attempt_id
            );
            return None;
        }

        let question = &self.challenge.questions[self.state.current_index];
        if !self.rule.accepts(question, answer) {
            tracing::debug!(
                "Ignoring ungradable answer: attempt={}, question={}",
                self.attempt_id,
                question.id
            );
            return None;
        }

        let points = self.rule.score(question, answer, self.state.was_revealed);
        let was_correct = points > 0;
        let expected_answer = question.correct_answer.clone();
        let completed_line = if question.has_blank() {
            question.fill_blank(&expected_answer)
        } else {
            question.lyric_line.clone()
        };

        self.state.cumulative_score += points;
        if was_correct {
            self.state.correct_count += 1;
            self.state.streak += 1;
            self.state.best_streak = self.state.best_streak.max(self.state.streak);
        } else {
            self.state.streak = 0;
        }
        self.state.selection = Some(answer.to_string());
        self.state.phase = Phase::ShowingResult;

        self.answers.push(answer.to_string());
        self.feedback.push(QuestionFeedback {
            index: self.state.current_index,
            was_correct,
            expected_answer: (!was_correct).then(|| expected_answer.clone()),
        });

        let correct_label = if was_correct { "true" } else { "false" };
        CHALLENGE_ANSWERS_TOTAL
            .with_label_values(&[self.challenge.kind.as_str(), correct_label])
            .inc();

        tracing::debug!(
            "Answer graded: attempt={}, index={}, correct={}, points={}, streak={}",
            self.attempt_id,
            self.state.current_index,
            was_correct,
            points,
            self.state.streak
        );

        Some(AnswerOutcome {
            index: self.state.current_index,
            was_correct,
            points_awarded: points,
            expected_answer,
            completed_line,
            streak: self.state.streak,
            cumulative_score: self.state.cumulative_score,
        })
    }

    /// Marks the current answer as revealed and returns it for display.
    ///
    /// Idempotent while the question is open. Any later correct submit for this
    /// question earns half points.
    pub fn reveal(&mut self) -> Option<&str> {
        if self.state.phase != Phase::AwaitingAnswer || !self.rule.supports_reveal() {
            return None;
        }
        if !self.state.was_revealed {
            self.state.was_revealed = true;
            tracing::debug!(
                "Answer revealed: attempt={}, index={}",
                self.attempt_id,
                self.state.current_index
            );
        }
        Some(self.challenge.questions[self.state.current_index].correct_answer.as_str())
    }

    /// Gives up on the current question: no points, streak reset, no display delay.
    pub fn skip(&mut self) -> Option<Advance> {
        if self.state.phase != Phase::AwaitingAnswer {
            tracing::debug!(
                "Ignoring skip in phase {:?}: attempt={}",
                self.state.phase,
                self.attempt_id
            );
            return None;
        }

        let question = &self.challenge.questions[self.state.current_index];
        self.answers.push(String::new());
        self.feedback.push(QuestionFeedback {
            index: self.state.current_index,
            was_correct: false,
            expected_answer: Some(question.correct_answer.clone()),
        });
        self.state.streak = 0;
        CHALLENGE_SKIPS_TOTAL.inc();

        Some(self.move_on())
    }

    /// Leaves `ShowingResult`. The host calls this once the display delay elapsed.
    pub fn advance(&mut self) -> Option<Advance> {
        if self.state.phase != Phase::ShowingResult {
            tracing::debug!(
                "Ignoring advance in phase {:?}: attempt={}",
                self.state.phase,
                self.attempt_id
            );
            return None;
        }
        Some(self.move_on())
    }

    fn move_on(&mut self) -> Advance {
        let last_index = self.challenge.questions.len() - 1;
        if self.state.current_index >= last_index {
            self.state.phase = Phase::Complete;
            return Advance::Completed(self.finish());
        }

        self.state.current_index += 1;
        self.state.phase = Phase::AwaitingAnswer;
        self.state.was_revealed = false;
        self.state.selection = None;
        Advance::NextQuestion(self.state.current_index)
    }

    // Only reachable through the single transition into `Complete`.
    fn finish(&self) -> CompletedRun {
        let result = AttemptResult {
            total_score: self.state.cumulative_score,
            points: self.state.cumulative_score,
            correct_count: self.state.correct_count,
            total_questions: self.challenge.questions.len() as u32,
            per_question_feedback: self.feedback.clone(),
            source: ResultSource::Live,
        };

        CHALLENGE_RUNS_TOTAL.with_label_values(&["completed"]).inc();
        tracing::info!(
            "Challenge run complete: attempt={}, challenge={}, score={}, correct={}/{}",
            self.attempt_id,
            self.challenge.id,
            result.total_score,
            result.correct_count,
            result.total_questions
        );

        CompletedRun {
            attempt_id: self.attempt_id,
            challenge: Arc::clone(&self.challenge),
            answers: self.answers.clone(),
            result,
            best_streak: self.state.best_streak,
            final_streak: self.state.streak,
            completed_at: Utc::now(),
        }
    }
}
