#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lyriclab_engine::models::{Challenge, ChallengeType, Question, SubmitAttemptResponse};
use lyriclab_engine::services::challenge_api::{ChallengeApi, RemoteScoring};
use lyriclab_engine::services::progress_store::ProgressSink;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn fill_blank_question(id: &str, line: &str, answer: &str, points: u32) -> Question {
    Question {
        id: id.to_string(),
        lyric_line: line.to_string(),
        blanks: None,
        correct_answer: answer.to_string(),
        options: None,
        points,
        difficulty: None,
    }
}

/// Two-question fill-blank challenge, 10 points each.
pub fn despacito() -> Challenge {
    Challenge {
        id: "challenge_001".to_string(),
        kind: ChallengeType::FillBlank,
        song_id: "song_002".to_string(),
        song_title: "Despacito - Luis Fonsi".to_string(),
        questions: vec![
            fill_blank_question("q1", "Quiero _____ tu cuello despacito", "respirar", 10),
            fill_blank_question("q2", "Deja que te diga cosas al _____", "oído", 10),
        ],
    }
}

/// Multiple-choice challenge where every correct answer is "yeux".
pub fn multiple_choice(points: &[u32]) -> Challenge {
    Challenge {
        id: "challenge_mc".to_string(),
        kind: ChallengeType::MultipleChoice,
        song_id: "song_001".to_string(),
        song_title: "La Vie En Rose - Édith Piaf".to_string(),
        questions: points
            .iter()
            .enumerate()
            .map(|(i, p)| Question {
                id: format!("q{}", i + 1),
                lyric_line: "Des _____ qui font baisser les miens".to_string(),
                blanks: None,
                correct_answer: "yeux".to_string(),
                options: Some(vec![
                    "yeux".to_string(),
                    "mains".to_string(),
                    "cœurs".to_string(),
                    "mots".to_string(),
                ]),
                points: *p,
                difficulty: Some("medium".to_string()),
            })
            .collect(),
    }
}

/// The bundled La Vie En Rose challenge; its lines carry no blank marker.
pub fn bundled_multiple_choice() -> Challenge {
    lyriclab_engine::services::question_bank::bundled_challenges()
        .unwrap()
        .into_iter()
        .find(|c| c.id == "challenge_002")
        .unwrap()
}

pub fn answers(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Progress sink that records every award.
#[derive(Default)]
pub struct RecordingSink {
    awards: Mutex<Vec<u32>>,
}

impl RecordingSink {
    pub fn awards(&self) -> Vec<u32> {
        self.awards.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressSink for RecordingSink {
    async fn add_points(&self, points: u32) {
        self.awards.lock().unwrap().push(points);
    }
}

/// In-process remote scorer with a fixed answer and optional latency.
pub struct ScriptedScoring {
    response: Option<SubmitAttemptResponse>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedScoring {
    pub fn responding(response: SubmitAttemptResponse) -> Self {
        Self {
            response: Some(response),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            response: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteScoring for ScriptedScoring {
    async fn submit_attempt(
        &self,
        _challenge_id: &str,
        _answers: &[String],
    ) -> anyhow::Result<SubmitAttemptResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.response
            .clone()
            .ok_or_else(|| anyhow::anyhow!("scripted remote failure"))
    }
}

pub fn remote_response(score: f64, correct: u32, total: u32, points: u32) -> SubmitAttemptResponse {
    serde_json::from_value(json!({
        "success": true,
        "score": score,
        "correct": correct,
        "total": total,
        "points": points,
        "feedback": []
    }))
    .unwrap()
}

/// How the fake API answers `POST /challenges/{id}/attempt`.
#[derive(Clone)]
pub enum AttemptReply {
    Json(Value),
    Status(StatusCode),
    Malformed,
}

struct FakeState {
    attempt_reply: AttemptReply,
    catalogue_status: Option<StatusCode>,
    catalogue_calls: AtomicUsize,
    attempt_calls: AtomicUsize,
    last_answers: Mutex<Option<Vec<String>>>,
    last_generate_body: Mutex<Option<Value>>,
}

/// Throwaway challenge API on 127.0.0.1.
pub struct FakeApi {
    pub base_url: String,
    state: Arc<FakeState>,
}

impl FakeApi {
    pub async fn start(attempt_reply: AttemptReply) -> Self {
        Self::start_with(attempt_reply, None).await
    }

    /// Catalogue endpoints answer with `catalogue_status` when set.
    pub async fn start_with(attempt_reply: AttemptReply, catalogue_status: Option<StatusCode>) -> Self {
        let state = Arc::new(FakeState {
            attempt_reply,
            catalogue_status,
            catalogue_calls: AtomicUsize::new(0),
            attempt_calls: AtomicUsize::new(0),
            last_answers: Mutex::new(None),
            last_generate_body: Mutex::new(None),
        });

        let routes = Router::new()
            .route("/challenges", get(list_challenges))
            .route("/challenges/song/{id}", get(song_challenges))
            .route("/challenges/{id}/attempt", post(submit_attempt))
            .route("/challenges/{id}/fill-blank", post(generate_fill_blank))
            .route("/challenges/{id}/multiple-choice", post(generate_multiple_choice));
        let app = Router::new().nest("/api", routes).with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}/api", addr),
            state,
        }
    }

    pub fn client(&self) -> ChallengeApi {
        ChallengeApi::new(&self.base_url, Duration::from_secs(5)).unwrap()
    }

    pub fn catalogue_calls(&self) -> usize {
        self.state.catalogue_calls.load(Ordering::SeqCst)
    }

    pub fn attempt_calls(&self) -> usize {
        self.state.attempt_calls.load(Ordering::SeqCst)
    }

    pub fn last_answers(&self) -> Option<Vec<String>> {
        self.state.last_answers.lock().unwrap().clone()
    }

    pub fn last_generate_body(&self) -> Option<Value> {
        self.state.last_generate_body.lock().unwrap().clone()
    }
}

/// Base URL on which nothing is listening.
pub async fn unreachable_base_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/api", addr)
}

fn remote_catalogue() -> Value {
    json!([{
        "id": "remote_001",
        "type": "fill_blank",
        "songId": "song_003",
        "songTitle": "Bella Ciao",
        "questions": [{
            "id": "q1",
            "lyricLine": "O bella ciao, bella ciao, bella _____ ciao ciao ciao",
            "correctAnswer": "ciao",
            "points": 10
        }]
    }])
}

async fn list_challenges(State(state): State<Arc<FakeState>>) -> Response {
    state.catalogue_calls.fetch_add(1, Ordering::SeqCst);
    if let Some(status) = state.catalogue_status {
        return (status, "catalogue unavailable").into_response();
    }
    Json(json!({ "success": true, "challenges": remote_catalogue() })).into_response()
}

async fn song_challenges(
    State(state): State<Arc<FakeState>>,
    Path(song_id): Path<String>,
) -> Response {
    state.catalogue_calls.fetch_add(1, Ordering::SeqCst);
    if let Some(status) = state.catalogue_status {
        return (status, "catalogue unavailable").into_response();
    }
    let challenges = if song_id == "song_003" {
        remote_catalogue()
    } else {
        json!([])
    };
    Json(json!({ "success": true, "challenges": challenges })).into_response()
}

async fn submit_attempt(
    State(state): State<Arc<FakeState>>,
    Path(_challenge_id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    state.attempt_calls.fetch_add(1, Ordering::SeqCst);
    let submitted = body["answers"].as_array().map(|values| {
        values
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    });
    *state.last_answers.lock().unwrap() = submitted;

    match &state.attempt_reply {
        AttemptReply::Json(value) => Json(value.clone()).into_response(),
        AttemptReply::Status(status) => (*status, "scoring failed").into_response(),
        AttemptReply::Malformed => (StatusCode::OK, "definitely not json").into_response(),
    }
}

async fn generate_fill_blank(
    State(state): State<Arc<FakeState>>,
    Path(_song_id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    *state.last_generate_body.lock().unwrap() = Some(body);
    Json(json!({
        "success": true,
        "challenges": [{
            "id": "gen_q1",
            "lyricLine": "Quiero _____ tu cuello despacito",
            "correctAnswer": "respirar",
            "points": 10
        }]
    }))
    .into_response()
}

async fn generate_multiple_choice(
    State(state): State<Arc<FakeState>>,
    Path(_song_id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    *state.last_generate_body.lock().unwrap() = Some(body);
    Json(json!({
        "success": true,
        "questions": [{
            "id": "gen_mc1",
            "lyricLine": "Des _____ qui font baisser les miens",
            "correctAnswer": "yeux",
            "options": ["yeux", "mains", "cœurs", "mots"],
            "points": 15
        }]
    }))
    .into_response()
}
