pub mod attempt;
pub mod challenge;
pub mod progress;

pub use attempt::{AttemptResult, Phase, QuestionFeedback, ResultSource, SubmitAttemptResponse};
pub use challenge::{Challenge, ChallengeType, Question};
pub use progress::{UserProgress, WordCategory};
