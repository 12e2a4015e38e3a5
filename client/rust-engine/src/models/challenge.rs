use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

use crate::error::EngineError;

lazy_static! {
    /// Lyric lines mark the missing word with a run of underscores ("_____").
    static ref BLANK_MARKER: Regex = Regex::new(r"_{3,}").expect("blank marker regex is valid");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeType {
    FillBlank,
    MultipleChoice,
    WordAssociation,
}

impl ChallengeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeType::FillBlank => "fill_blank",
            ChallengeType::MultipleChoice => "multiple_choice",
            ChallengeType::WordAssociation => "word_association",
        }
    }
}

impl fmt::Display for ChallengeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    #[validate(length(min = 1, message = "Question id must not be empty"))]
    pub id: String,
    pub lyric_line: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blanks: Option<Vec<String>>,
    pub correct_answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[validate(range(min = 1, message = "Question points must be positive"))]
    pub points: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
}

impl Question {
    pub fn has_blank(&self) -> bool {
        BLANK_MARKER.is_match(&self.lyric_line)
    }

    /// Lyric line with the blank marker replaced by `word`.
    pub fn fill_blank(&self, word: &str) -> String {
        BLANK_MARKER
            .replace(&self.lyric_line, regex::NoExpand(word))
            .into_owned()
    }

    pub fn options(&self) -> &[String] {
        self.options.as_deref().unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    #[validate(length(min = 1, message = "Challenge id must not be empty"))]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ChallengeType,
    pub song_id: String,
    pub song_title: String,
    #[validate(nested)]
    pub questions: Vec<Question>,
}

impl Challenge {
    pub fn total_points(&self) -> u32 {
        self.questions.iter().map(|q| q.points).sum()
    }

    /// Rejects challenges a run cannot start from.
    pub fn check(&self) -> Result<(), EngineError> {
        if self.questions.is_empty() {
            return Err(EngineError::EmptyChallenge(self.id.clone()));
        }

        self.validate()
            .map_err(|e| EngineError::InvalidChallenge {
                challenge_id: self.id.clone(),
                reason: e.to_string(),
            })?;

        for question in &self.questions {
            match self.kind {
                ChallengeType::MultipleChoice => {
                    if question.options().is_empty() {
                        return Err(EngineError::MissingOptions {
                            question_id: question.id.clone(),
                        });
                    }
                    if !question.options().contains(&question.correct_answer) {
                        return Err(EngineError::AnswerNotInOptions {
                            question_id: question.id.clone(),
                        });
                    }
                }
                ChallengeType::FillBlank => {
                    let token = question.correct_answer.trim();
                    if token.is_empty() || token.contains(char::is_whitespace) {
                        return Err(EngineError::InvalidCorrectAnswer {
                            question_id: question.id.clone(),
                        });
                    }
                }
                ChallengeType::WordAssociation => {
                    if question.correct_answer.trim().is_empty() {
                        return Err(EngineError::InvalidCorrectAnswer {
                            question_id: question.id.clone(),
                        });
                    }
                }
            }
        }

        Ok(())
    }
}
