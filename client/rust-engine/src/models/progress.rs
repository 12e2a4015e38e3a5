use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WordCategory {
    Known,
    Learning,
    Review,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyProgress {
    pub day: String,
    pub words: u32,
    pub points: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProgress {
    pub total_words_learned: u32,
    /// Consecutive study days.
    pub current_streak: u32,
    pub total_points: u32,
    pub level: u32,
    #[serde(default)]
    pub languages: BTreeMap<String, u32>,
    #[serde(default)]
    pub weekly_progress: Vec<DailyProgress>,
    #[serde(default)]
    pub words_known: Vec<String>,
    #[serde(default)]
    pub words_learning: Vec<String>,
    #[serde(default)]
    pub words_to_review: Vec<String>,
}

impl Default for UserProgress {
    fn default() -> Self {
        Self {
            total_words_learned: 0,
            current_streak: 0,
            total_points: 0,
            level: 1,
            languages: BTreeMap::new(),
            weekly_progress: Vec::new(),
            words_known: Vec::new(),
            words_learning: Vec::new(),
            words_to_review: Vec::new(),
        }
    }
}

impl UserProgress {
    pub fn words(&self, category: WordCategory) -> &Vec<String> {
        match category {
            WordCategory::Known => &self.words_known,
            WordCategory::Learning => &self.words_learning,
            WordCategory::Review => &self.words_to_review,
        }
    }

    pub fn words_mut(&mut self, category: WordCategory) -> &mut Vec<String> {
        match category {
            WordCategory::Known => &mut self.words_known,
            WordCategory::Learning => &mut self.words_learning,
            WordCategory::Review => &mut self.words_to_review,
        }
    }
}
