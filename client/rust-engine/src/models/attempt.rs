use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    AwaitingAnswer,
    ShowingResult,
    Complete,
}

/// Which path produced an [`AttemptResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    /// Graded question by question while the run was played.
    Live,
    /// Adopted from the remote scoring endpoint.
    Remote,
    /// Recomputed from the submitted answers after the remote call failed.
    LocalFallback,
}

impl ResultSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultSource::Live => "live",
            ResultSource::Remote => "remote",
            ResultSource::LocalFallback => "local_fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionFeedback {
    pub index: usize,
    pub was_correct: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_answer: Option<String>,
}

/// Terminal summary of one challenge attempt.
///
/// `total_score` is the score as reported by the producing path: accumulated
/// question points for [`ResultSource::Live`], a 0-100 percentage for the
/// reconciled paths. `points` is what the result would credit to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptResult {
    pub total_score: u32,
    pub points: u32,
    pub correct_count: u32,
    pub total_questions: u32,
    pub per_question_feedback: Vec<QuestionFeedback>,
    pub source: ResultSource,
}

#[derive(Debug, Serialize)]
pub struct SubmitAttemptRequest<'a> {
    pub answers: &'a [String],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptFeedbackEntry {
    pub index: usize,
    pub correct: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
}

/// Body returned by `POST /challenges/{id}/attempt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitAttemptResponse {
    pub success: bool,
    pub score: f64,
    pub correct: u32,
    pub total: u32,
    pub points: u32,
    #[serde(default)]
    pub feedback: Vec<AttemptFeedbackEntry>,
}

impl SubmitAttemptResponse {
    pub fn into_result(self, source: ResultSource) -> AttemptResult {
        AttemptResult {
            total_score: self.score.max(0.0).round() as u32,
            points: self.points,
            correct_count: self.correct,
            total_questions: self.total,
            per_question_feedback: self
                .feedback
                .into_iter()
                .map(|entry| QuestionFeedback {
                    index: entry.index,
                    was_correct: entry.correct,
                    expected_answer: entry.expected,
                })
                .collect(),
            source,
        }
    }
}
