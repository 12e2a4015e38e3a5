use crate::models::{ChallengeType, Question};

/// Points needed per level.
pub const POINTS_PER_LEVEL: u32 = 300;

/// Case-fold and trim. Accents are kept as typed.
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

pub fn answers_match(submitted: &str, correct_answer: &str) -> bool {
    normalize(submitted) == normalize(correct_answer)
}

/// Full points for a matching answer, half (floored) once the answer was revealed.
pub fn score_fill_blank(
    submitted: &str,
    correct_answer: &str,
    was_revealed: bool,
    max_points: u32,
) -> u32 {
    if !answers_match(submitted, correct_answer) {
        return 0;
    }
    if was_revealed {
        max_points / 2
    } else {
        max_points
    }
}

/// Exact, case-sensitive comparison against the option text.
pub fn score_multiple_choice(selected: &str, correct_answer: &str, max_points: u32) -> u32 {
    if selected == correct_answer {
        max_points
    } else {
        0
    }
}

pub fn level_for_points(total_points: u32) -> u32 {
    total_points / POINTS_PER_LEVEL + 1
}

/// Wraps the scoring functions so a single runner can drive every challenge type.
pub trait ScoringRule: Send + Sync {
    /// Whether `answer` is a gradable submission for `question`.
    fn accepts(&self, question: &Question, answer: &str) -> bool;

    fn score(&self, question: &Question, answer: &str, was_revealed: bool) -> u32;

    fn supports_reveal(&self) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FillBlankRule;

impl ScoringRule for FillBlankRule {
    fn accepts(&self, _question: &Question, answer: &str) -> bool {
        !answer.trim().is_empty()
    }

    fn score(&self, question: &Question, answer: &str, was_revealed: bool) -> u32 {
        score_fill_blank(answer, &question.correct_answer, was_revealed, question.points)
    }

    fn supports_reveal(&self) -> bool {
        true
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MultipleChoiceRule;

impl ScoringRule for MultipleChoiceRule {
    fn accepts(&self, question: &Question, answer: &str) -> bool {
        question.options().iter().any(|option| option == answer)
    }

    // Reveal is not offered for multiple choice, so the flag is ignored.
    fn score(&self, question: &Question, answer: &str, _was_revealed: bool) -> u32 {
        score_multiple_choice(answer, &question.correct_answer, question.points)
    }

    fn supports_reveal(&self) -> bool {
        false
    }
}

/// Word association answers are free text and graded like blanks.
pub fn rule_for(kind: ChallengeType) -> Box<dyn ScoringRule> {
    match kind {
        ChallengeType::FillBlank | ChallengeType::WordAssociation => Box::new(FillBlankRule),
        ChallengeType::MultipleChoice => Box::new(MultipleChoiceRule),
    }
}
