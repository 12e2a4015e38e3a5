use std::sync::Arc;

use super::challenge_api::RemoteScoring;
use crate::metrics::ATTEMPT_RESULTS_TOTAL;
use crate::models::{AttemptResult, Challenge, QuestionFeedback, ResultSource};
use crate::scoring::answers_match;

/// Points the offline fallback hands out for a perfect attempt.
pub const FALLBACK_MAX_POINTS: f64 = 50.0;

/// Turns the answers of a finished run into a canonical [`AttemptResult`].
///
/// Remote first, one attempt; any failure falls back to [`grade_locally`].
/// The reconciler never credits points itself.
#[derive(Clone)]
pub struct AttemptReconciler {
    remote: Option<Arc<dyn RemoteScoring>>,
}

impl AttemptReconciler {
    pub fn new(remote: Arc<dyn RemoteScoring>) -> Self {
        Self {
            remote: Some(remote),
        }
    }

    /// Always grades locally.
    pub fn offline() -> Self {
        Self { remote: None }
    }

    pub fn is_offline(&self) -> bool {
        self.remote.is_none()
    }

    pub async fn reconcile(&self, challenge: &Challenge, answers: &[String]) -> AttemptResult {
        let result = match &self.remote {
            Some(remote) => match remote.submit_attempt(&challenge.id, answers).await {
                Ok(response) => {
                    tracing::info!(
                        "Attempt scored remotely: challenge={}, correct={}/{}, points={}",
                        challenge.id,
                        response.correct,
                        response.total,
                        response.points
                    );
                    response.into_result(ResultSource::Remote)
                }
                Err(e) => {
                    tracing::warn!(
                        "Remote scoring unavailable for challenge={}, calculating locally: {:#}",
                        challenge.id,
                        e
                    );
                    grade_locally(challenge, answers)
                }
            },
            None => grade_locally(challenge, answers),
        };

        ATTEMPT_RESULTS_TOTAL
            .with_label_values(&[result.source.as_str()])
            .inc();

        result
    }
}

/// Offline grading from answers alone.
///
/// Coarser than live scoring: no per-question weights and no reveal penalty.
/// `total_score` is the percentage of correct answers and `points` is
/// `round(50 * correct / total)`.
pub fn grade_locally(challenge: &Challenge, answers: &[String]) -> AttemptResult {
    let per_question_feedback: Vec<QuestionFeedback> = answers
        .iter()
        .enumerate()
        .map(|(index, answer)| {
            let question = challenge.questions.get(index);
            match question {
                Some(q) if answers_match(answer, &q.correct_answer) => QuestionFeedback {
                    index,
                    was_correct: true,
                    expected_answer: None,
                },
                _ => QuestionFeedback {
                    index,
                    was_correct: false,
                    expected_answer: question.map(|q| q.correct_answer.clone()),
                },
            }
        })
        .collect();

    let correct = per_question_feedback.iter().filter(|f| f.was_correct).count() as u32;
    let total = answers.len() as u32;

    let (score, points) = if total == 0 {
        (0, 0)
    } else {
        let ratio = correct as f64 / total as f64;
        (
            (100.0 * ratio).round() as u32,
            (FALLBACK_MAX_POINTS * ratio).round() as u32,
        )
    };

    AttemptResult {
        total_score: score,
        points,
        correct_count: correct,
        total_questions: total,
        per_question_feedback,
        source: ResultSource::LocalFallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChallengeType, Question};

    fn despacito() -> Challenge {
        let question = |id: &str, answer: &str| Question {
            id: id.to_string(),
            lyric_line: "_____".to_string(),
            blanks: None,
            correct_answer: answer.to_string(),
            options: None,
            points: 10,
            difficulty: None,
        };
        Challenge {
            id: "challenge_001".to_string(),
            kind: ChallengeType::FillBlank,
            song_id: "song_002".to_string(),
            song_title: "Despacito - Luis Fonsi".to_string(),
            questions: vec![question("q1", "respirar"), question("q2", "oído")],
        }
    }

    fn answers(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn all_correct_yields_full_fallback_points() {
        let result = grade_locally(&despacito(), &answers(&["respirar", "oído"]));
        assert_eq!(result.correct_count, 2);
        assert_eq!(result.total_questions, 2);
        assert_eq!(result.total_score, 100);
        assert_eq!(result.points, 50);
        assert_eq!(result.source, ResultSource::LocalFallback);
    }

    #[test]
    fn comparison_is_case_insensitive() {
        let result = grade_locally(&despacito(), &answers(&["RESPIRAR", "wrong"]));
        assert_eq!(result.correct_count, 1);
        assert_eq!(result.total_score, 50);
        assert_eq!(result.points, 25);
        assert_eq!(
            result.per_question_feedback[1],
            QuestionFeedback {
                index: 1,
                was_correct: false,
                expected_answer: Some("oído".to_string()),
            }
        );
    }

    #[test]
    fn fallback_points_are_rounded() {
        let mut challenge = despacito();
        challenge.questions.push(challenge.questions[0].clone());
        let result = grade_locally(&challenge, &answers(&["respirar", "x", "x"]));
        // 50 / 3 = 16.67
        assert_eq!(result.points, 17);
        assert_eq!(result.total_score, 33);
    }

    #[test]
    fn empty_answers_score_zero() {
        let result = grade_locally(&despacito(), &[]);
        assert_eq!(result.total_questions, 0);
        assert_eq!(result.points, 0);
        assert_eq!(result.total_score, 0);
    }

    #[test]
    fn extra_answers_count_as_wrong() {
        let result = grade_locally(&despacito(), &answers(&["respirar", "oído", "extra"]));
        assert_eq!(result.correct_count, 2);
        assert_eq!(result.total_questions, 3);
        assert_eq!(result.per_question_feedback[2].expected_answer, None);
    }

    #[tokio::test]
    async fn offline_reconciler_grades_locally() {
        let reconciler = AttemptReconciler::offline();
        assert!(reconciler.is_offline());
        let result = reconciler
            .reconcile(&despacito(), &answers(&["respirar", "oído"]))
            .await;
        assert_eq!(result.source, ResultSource::LocalFallback);
        assert_eq!(result.points, 50);
    }
}
