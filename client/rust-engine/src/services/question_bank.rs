use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::challenge_api::ChallengeApi;
use crate::metrics::CATALOGUE_FALLBACKS_TOTAL;
use crate::models::{Challenge, ChallengeType, Question};
use crate::utils::retry::{retry_async_with_config, RetryConfig};

const BUNDLED_CHALLENGES: &str = include_str!("../../data/challenges.json");

pub const DEFAULT_NUM_BLANKS: u32 = 5;
pub const DEFAULT_NUM_QUESTIONS: u32 = 5;

/// Challenges shipped with the client for when the API is unreachable.
pub fn bundled_challenges() -> Result<Vec<Challenge>> {
    serde_json::from_str(BUNDLED_CHALLENGES).context("Failed to parse bundled challenge dataset")
}

/// Challenge catalogue: remote API first, bundled dataset as fallback.
pub struct QuestionBank {
    api: Option<ChallengeApi>,
    retry: RetryConfig,
    generated: RwLock<HashMap<(String, ChallengeType), Vec<Question>>>,
}

impl QuestionBank {
    pub fn new(api: ChallengeApi, retry: RetryConfig) -> Self {
        Self {
            api: Some(api),
            retry,
            generated: RwLock::new(HashMap::new()),
        }
    }

    /// Serves the bundled dataset only.
    pub fn offline() -> Self {
        Self {
            api: None,
            retry: RetryConfig::once(),
            generated: RwLock::new(HashMap::new()),
        }
    }

    pub async fn all_challenges(&self) -> Result<Vec<Challenge>> {
        if let Some(api) = &self.api {
            let fetched = retry_async_with_config("list challenges", self.retry.clone(), || {
                api.list_challenges()
            })
            .await;

            match fetched {
                Ok(challenges) => return Ok(challenges),
                Err(e) => {
                    tracing::warn!("Challenge API unavailable, using bundled data: {:#}", e);
                }
            }
        }

        CATALOGUE_FALLBACKS_TOTAL.with_label_values(&["all"]).inc();
        bundled_challenges()
    }

    pub async fn challenges_for_song(&self, song_id: &str) -> Result<Vec<Challenge>> {
        if song_id.is_empty() {
            anyhow::bail!("Song ID is required");
        }

        if let Some(api) = &self.api {
            let fetched = retry_async_with_config("song challenges", self.retry.clone(), || {
                api.challenges_for_song(song_id)
            })
            .await;

            match fetched {
                Ok(challenges) => return Ok(challenges),
                Err(e) => {
                    tracing::warn!(
                        "Challenge API unavailable for song {}, using bundled data: {:#}",
                        song_id,
                        e
                    );
                }
            }
        }

        CATALOGUE_FALLBACKS_TOTAL.with_label_values(&["song"]).inc();
        Ok(bundled_challenges()?
            .into_iter()
            .filter(|c| c.song_id == song_id)
            .collect())
    }

    pub async fn challenge(&self, challenge_id: &str) -> Result<Challenge> {
        self.all_challenges()
            .await?
            .into_iter()
            .find(|c| c.id == challenge_id)
            .ok_or_else(|| anyhow!("Challenge {} not found", challenge_id))
    }

    /// Generation has no offline fallback; failures surface to the caller.
    pub async fn generate_fill_blank(&self, song_id: &str, num_blanks: u32) -> Result<Vec<Question>> {
        let api = self.require_api()?;
        let questions = api.generate_fill_blank(song_id, num_blanks).await?;
        self.remember(song_id, ChallengeType::FillBlank, questions.clone())
            .await;
        Ok(questions)
    }

    pub async fn generate_multiple_choice(
        &self,
        song_id: &str,
        num_questions: u32,
    ) -> Result<Vec<Question>> {
        let api = self.require_api()?;
        let questions = api.generate_multiple_choice(song_id, num_questions).await?;
        self.remember(song_id, ChallengeType::MultipleChoice, questions.clone())
            .await;
        Ok(questions)
    }

    /// Last generated question set for `song_id`, if any.
    pub async fn generated_questions(&self, song_id: &str, kind: ChallengeType) -> Vec<Question> {
        self.generated
            .read()
            .await
            .get(&(song_id.to_string(), kind))
            .cloned()
            .unwrap_or_default()
    }

    /// Wraps the cached generated questions into a playable challenge.
    /// Without a title the song id is shown instead.
    pub async fn generated_challenge(
        &self,
        song_id: &str,
        song_title: Option<&str>,
        kind: ChallengeType,
    ) -> Option<Challenge> {
        let questions = self.generated_questions(song_id, kind).await;
        if questions.is_empty() {
            return None;
        }

        Some(Challenge {
            id: format!("generated_{}_{}", song_id, kind),
            kind,
            song_id: song_id.to_string(),
            song_title: song_title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or(song_id)
                .to_string(),
            questions,
        })
    }

    fn require_api(&self) -> Result<&ChallengeApi> {
        self.api
            .as_ref()
            .ok_or_else(|| anyhow!("Challenge generation requires the challenge API"))
    }

    async fn remember(&self, song_id: &str, kind: ChallengeType, questions: Vec<Question>) {
        self.generated
            .write()
            .await
            .insert((song_id.to_string(), kind), questions);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_dataset_is_playable() {
        let challenges = bundled_challenges().unwrap();
        assert_eq!(challenges.len(), 2);
        for challenge in &challenges {
            assert!(challenge.check().is_ok(), "{} is invalid", challenge.id);
        }
        assert_eq!(challenges[0].kind, ChallengeType::FillBlank);
        assert_eq!(challenges[1].kind, ChallengeType::MultipleChoice);
    }

    #[tokio::test]
    async fn offline_bank_filters_by_song() {
        let bank = QuestionBank::offline();
        let piaf = bank.challenges_for_song("song_001").await.unwrap();
        assert_eq!(piaf.len(), 1);
        assert_eq!(piaf[0].id, "challenge_002");
        assert!(bank.challenges_for_song("song_999").await.unwrap().is_empty());
        assert!(bank.challenges_for_song("").await.is_err());
    }

    #[tokio::test]
    async fn offline_bank_cannot_generate() {
        let bank = QuestionBank::offline();
        assert!(bank.generate_fill_blank("song_002", 5).await.is_err());
        assert!(bank
            .generated_challenge("song_002", None, ChallengeType::FillBlank)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn looks_up_challenge_by_id() {
        let bank = QuestionBank::offline();
        let challenge = bank.challenge("challenge_001").await.unwrap();
        assert_eq!(challenge.song_title, "Despacito - Luis Fonsi");
        assert!(bank.challenge("missing").await.is_err());
    }
}
