use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::Config;
use crate::metrics::track_remote_call;
use crate::models::attempt::SubmitAttemptRequest;
use crate::models::{Challenge, Question, SubmitAttemptResponse};

#[derive(Debug, Deserialize)]
struct ChallengeListResponse {
    #[serde(default = "default_success")]
    success: bool,
    challenges: Vec<Challenge>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateFillBlankRequest {
    num_blanks: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateFillBlankResponse {
    #[serde(default = "default_success")]
    success: bool,
    challenges: Vec<Question>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateMultipleChoiceRequest {
    num_questions: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateMultipleChoiceResponse {
    #[serde(default = "default_success")]
    success: bool,
    questions: Vec<Question>,
}

fn default_success() -> bool {
    true
}

/// Remote grading of a whole attempt.
#[async_trait]
pub trait RemoteScoring: Send + Sync {
    async fn submit_attempt(
        &self,
        challenge_id: &str,
        answers: &[String],
    ) -> Result<SubmitAttemptResponse>;
}

/// JSON client for the LyricLab challenge API.
#[derive(Clone)]
pub struct ChallengeApi {
    http_client: Client,
    base_url: String,
}

impl ChallengeApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        url::Url::parse(base_url).with_context(|| format!("Invalid API base URL: {}", base_url))?;

        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.api_base_url, config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET /challenges
    pub async fn list_challenges(&self) -> Result<Vec<Challenge>> {
        let url = format!("{}/challenges", self.base_url);
        let body: ChallengeListResponse =
            track_remote_call("list_challenges", self.get_json(&url)).await?;
        ensure_success(body.success, &url)?;
        Ok(body.challenges)
    }

    /// GET /challenges/song/{song_id}
    pub async fn challenges_for_song(&self, song_id: &str) -> Result<Vec<Challenge>> {
        let url = format!("{}/challenges/song/{}", self.base_url, song_id);
        let body: ChallengeListResponse =
            track_remote_call("challenges_for_song", self.get_json(&url)).await?;
        ensure_success(body.success, &url)?;
        Ok(body.challenges)
    }

    /// POST /challenges/{song_id}/fill-blank
    pub async fn generate_fill_blank(&self, song_id: &str, num_blanks: u32) -> Result<Vec<Question>> {
        let url = format!("{}/challenges/{}/fill-blank", self.base_url, song_id);
        let body: GenerateFillBlankResponse = track_remote_call(
            "generate_fill_blank",
            self.post_json(&url, &GenerateFillBlankRequest { num_blanks }),
        )
        .await?;
        ensure_success(body.success, &url)?;

        tracing::info!(
            "Generated {} fill-blank questions for song {}",
            body.challenges.len(),
            song_id
        );
        Ok(body.challenges)
    }

    /// POST /challenges/{song_id}/multiple-choice
    pub async fn generate_multiple_choice(
        &self,
        song_id: &str,
        num_questions: u32,
    ) -> Result<Vec<Question>> {
        let url = format!("{}/challenges/{}/multiple-choice", self.base_url, song_id);
        let body: GenerateMultipleChoiceResponse = track_remote_call(
            "generate_multiple_choice",
            self.post_json(&url, &GenerateMultipleChoiceRequest { num_questions }),
        )
        .await?;
        ensure_success(body.success, &url)?;

        tracing::info!(
            "Generated {} multiple-choice questions for song {}",
            body.questions.len(),
            song_id
        );
        Ok(body.questions)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        tracing::debug!("[API] GET {}", url);

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to call {}", url))?;

        read_json(response, url).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T> {
        tracing::debug!("[API] POST {}", url);

        let response = self
            .http_client
            .post(url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to call {}", url))?;

        read_json(response, url).await
    }
}

#[async_trait]
impl RemoteScoring for ChallengeApi {
    /// POST /challenges/{challenge_id}/attempt
    async fn submit_attempt(
        &self,
        challenge_id: &str,
        answers: &[String],
    ) -> Result<SubmitAttemptResponse> {
        let url = format!("{}/challenges/{}/attempt", self.base_url, challenge_id);
        let body: SubmitAttemptResponse = track_remote_call(
            "submit_attempt",
            self.post_json(&url, &SubmitAttemptRequest { answers }),
        )
        .await?;
        ensure_success(body.success, &url)?;
        Ok(body)
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response, url: &str) -> Result<T> {
    if !response.status().is_success() {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(anyhow!(
            "Challenge API returned error {} for {}: {}",
            status,
            url,
            error_text
        ));
    }

    response
        .json()
        .await
        .with_context(|| format!("Failed to parse response from {}", url))
}

fn ensure_success(success: bool, url: &str) -> Result<()> {
    if success {
        Ok(())
    } else {
        Err(anyhow!("Challenge API reported failure for {}", url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_base_url() {
        assert!(ChallengeApi::new("not a url", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn trims_trailing_slash() {
        let api = ChallengeApi::new("http://localhost:5000/api/", Duration::from_secs(1)).unwrap();
        assert_eq!(api.base_url(), "http://localhost:5000/api");
    }

    #[test]
    fn generate_requests_use_camel_case() {
        let json = serde_json::to_value(GenerateFillBlankRequest { num_blanks: 5 }).unwrap();
        assert_eq!(json["numBlanks"], 5);
        let json =
            serde_json::to_value(GenerateMultipleChoiceRequest { num_questions: 3 }).unwrap();
        assert_eq!(json["numQuestions"], 3);
    }
}
