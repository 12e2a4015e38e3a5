pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod runner;
pub mod scoring;
pub mod services;
pub mod utils;

pub use config::{Config, CreditPolicy};
pub use error::EngineError;
pub use runner::{Advance, AnswerOutcome, ChallengeRunner, CompletedRun};
pub use services::challenge_session::{ChallengeSession, Settlement};
pub use services::EngineState;
