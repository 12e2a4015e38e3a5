use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::metrics::POINTS_AWARDED_TOTAL;
use crate::models::{UserProgress, WordCategory};
use crate::scoring::level_for_points;

/// Receives the single point award of each completed run.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn add_points(&self, points: u32);
}

/// User progress kept in memory, optionally mirrored to a JSON file.
pub struct ProgressStore {
    progress: Mutex<UserProgress>,
    path: Option<PathBuf>,
}

impl ProgressStore {
    pub fn new(progress: UserProgress) -> Self {
        Self {
            progress: Mutex::new(progress),
            path: None,
        }
    }

    /// Loads progress from `path`, starting fresh when the file does not exist yet.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let progress = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse progress file {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    "No progress file at {}, starting fresh",
                    path.display()
                );
                UserProgress::default()
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read progress file {}", path.display()))
            }
        };

        Ok(Self {
            progress: Mutex::new(progress),
            path: Some(path),
        })
    }

    pub async fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let json = {
            let progress = self.progress.lock().await;
            serde_json::to_string_pretty(&*progress).context("Failed to serialize progress")?
        };

        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write progress file {}", path.display()))?;

        tracing::debug!("Progress saved to {}", path.display());
        Ok(())
    }

    pub async fn snapshot(&self) -> UserProgress {
        self.progress.lock().await.clone()
    }

    /// Returns `false` when the word was already in that category.
    pub async fn add_word(&self, word: &str, category: WordCategory) -> bool {
        let mut progress = self.progress.lock().await;
        if progress.words(category).iter().any(|w| w == word) {
            return false;
        }
        progress.words_mut(category).push(word.to_string());
        if category == WordCategory::Known {
            progress.total_words_learned += 1;
        }
        true
    }

    pub async fn remove_word(&self, word: &str) {
        let mut progress = self.progress.lock().await;
        for category in [WordCategory::Known, WordCategory::Learning, WordCategory::Review] {
            progress.words_mut(category).retain(|w| w != word);
        }
    }

    pub async fn move_word(&self, word: &str, from: WordCategory, to: WordCategory) {
        let mut progress = self.progress.lock().await;
        progress.words_mut(from).retain(|w| w != word);
        if !progress.words(to).iter().any(|w| w == word) {
            progress.words_mut(to).push(word.to_string());
        }
    }

    pub async fn increment_streak(&self) -> u32 {
        let mut progress = self.progress.lock().await;
        progress.current_streak += 1;
        progress.current_streak
    }
}

#[async_trait]
impl ProgressSink for ProgressStore {
    async fn add_points(&self, points: u32) {
        let mut progress = self.progress.lock().await;
        progress.total_points = progress.total_points.saturating_add(points);
        // Level never goes down, even if it was set above the points curve.
        progress.level = progress.level.max(level_for_points(progress.total_points));
        POINTS_AWARDED_TOTAL.inc_by(points as u64);

        tracing::info!(
            "Points added: +{}, total={}, level={}",
            points,
            progress.total_points,
            progress.level
        );
    }
}
