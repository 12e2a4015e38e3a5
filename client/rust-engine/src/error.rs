use thiserror::Error;

/// Errors raised when a challenge cannot be turned into a run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Challenge {0} has no questions")]
    EmptyChallenge(String),

    #[error("Challenge {challenge_id} is malformed: {reason}")]
    InvalidChallenge { challenge_id: String, reason: String },

    #[error("Question {question_id} has no options")]
    MissingOptions { question_id: String },

    #[error("Correct answer of question {question_id} is not one of its options")]
    AnswerNotInOptions { question_id: String },

    #[error("Correct answer of question {question_id} must be a single non-empty token")]
    InvalidCorrectAnswer { question_id: String },
}
