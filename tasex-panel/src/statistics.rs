//! Panel statistics
//!
//! Counts correct and wrong verdicts and runs an exact one-sided binomial
//! test against the chance rate of a triangle test (one in three).

use serde::Serialize;
use sqlx::SqlitePool;
use tasex_common::Result;
use uuid::Uuid;

use crate::db::{questions, results};

/// Probability of picking the odd sample by guessing
pub const CHANCE_RATE: f64 = 1.0 / 3.0;

/// Level at which a panel is reported as telling the products apart
pub const SIGNIFICANCE_LEVEL: f64 = 0.05;

/// Upper tail of the binomial distribution, `P(X >= k)` for `X ~ B(n, p)`
///
/// Terms are summed in log space with `log C(n, i)` built incrementally, so
/// large panels do not overflow.
pub fn binomial_test_greater(k: u32, n: u32, p: f64) -> f64 {
    if n == 0 || k == 0 {
        return 1.0;
    }
    if k > n {
        return 0.0;
    }
    if p <= 0.0 {
        return 0.0;
    }
    if p >= 1.0 {
        return 1.0;
    }

    let (n, k) = (n as usize, k as usize);
    let ln_p = p.ln();
    let ln_1mp = (1.0 - p).ln();

    // log C(n, k)
    let mut log_binom = 0.0_f64;
    for i in 1..=k {
        log_binom += ((n - i + 1) as f64).ln() - (i as f64).ln();
    }

    let mut tail = 0.0_f64;
    for i in k..=n {
        if i > k {
            log_binom += ((n - i + 1) as f64).ln() - (i as f64).ln();
        }
        tail += (log_binom + ln_p * i as f64 + ln_1mp * (n - i) as f64).exp();
    }

    tail.clamp(0.0, 1.0)
}

/// Headline numbers for a panel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub participants: u32,
    pub correct: u32,
    pub wrong: u32,
    /// Rounded to a whole percent; 0 when nobody took part
    pub percent_correct: u32,
    pub p_value: f64,
    /// `p_value` below [`SIGNIFICANCE_LEVEL`]
    pub significant: bool,
}

impl Summary {
    pub fn from_counts(correct: u32, participants: u32) -> Self {
        let percent_correct = if participants == 0 {
            0
        } else {
            (correct as f64 * 100.0 / participants as f64).round() as u32
        };

        let mut summary = Self {
            participants,
            correct,
            wrong: participants.saturating_sub(correct),
            percent_correct,
            p_value: binomial_test_greater(correct, participants, CHANCE_RATE),
            significant: false,
        };
        summary.significant = summary.is_significant(SIGNIFICANCE_LEVEL);
        summary
    }

    /// Whether the panel discriminates better than chance at `alpha`
    pub fn is_significant(&self, alpha: f64) -> bool {
        self.participants > 0 && self.p_value < alpha
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointCount {
    pub code: String,
    pub text: String,
    pub count: u32,
}

/// Answer distribution for one question, over correct results only
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionBreakdown {
    pub question_id: i64,
    pub position: i64,
    pub question_text: String,
    pub points: Vec<PointCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelStatistics {
    #[serde(flatten)]
    pub summary: Summary,
    pub questions: Vec<QuestionBreakdown>,
}

pub async fn panel_statistics(pool: &SqlitePool, panel_id: Uuid) -> Result<PanelStatistics> {
    let counts = results::panel_result_counts(pool, panel_id).await?;
    let answer_counts = results::correct_answer_counts(pool, panel_id).await?;
    let panel_questions = questions::list_questions_with_scales(pool, panel_id).await?;

    let questions = panel_questions
        .into_iter()
        .map(|entry| {
            let points = entry
                .scale
                .points
                .iter()
                .map(|point| PointCount {
                    code: point.code.clone(),
                    text: point.text.clone(),
                    count: answer_counts
                        .iter()
                        .find(|c| c.question_id == entry.question.id && c.answer_code == point.code)
                        .map_or(0, |c| c.count),
                })
                .collect();

            QuestionBreakdown {
                question_id: entry.question.id,
                position: entry.question.position,
                question_text: entry.question.question_text,
                points,
            }
        })
        .collect();

    let summary = Summary::from_counts(counts.correct, counts.total);
    tracing::debug!(
        panel_id = %panel_id,
        participants = summary.participants,
        correct = summary.correct,
        p_value = summary.p_value,
        "Computed panel statistics"
    );

    Ok(PanelStatistics { summary, questions })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nine_of_ten_rejects_chance() {
        // (10 * 2 + 1) / 3^10
        let p = binomial_test_greater(9, 10, CHANCE_RATE);
        assert!((p - 21.0 / 59049.0).abs() < 1e-12);
        assert!(p < 0.001);
    }

    #[test]
    fn test_three_of_nine_is_chance() {
        let p = binomial_test_greater(3, 9, CHANCE_RATE);
        assert!((p - 0.6228).abs() < 1e-3);
    }

    #[test]
    fn test_all_wrong_gives_one() {
        assert_eq!(binomial_test_greater(0, 12, CHANCE_RATE), 1.0);
    }

    #[test]
    fn test_all_correct_tail_is_single_term() {
        let p = binomial_test_greater(5, 5, CHANCE_RATE);
        assert!((p - CHANCE_RATE.powi(5)).abs() < 1e-12);
    }

    #[test]
    fn test_large_panel_stays_finite() {
        let p = binomial_test_greater(400, 1000, CHANCE_RATE);
        assert!(p.is_finite());
        assert!(p > 0.0 && p < 0.001);
    }

    #[test]
    fn test_summary_percent_and_wrong() {
        let summary = Summary::from_counts(9, 10);
        assert_eq!(summary.participants, 10);
        assert_eq!(summary.wrong, 1);
        assert_eq!(summary.percent_correct, 90);
        assert!(summary.is_significant(0.05));
        assert!(summary.significant);
        // 9 of 10 is not enough at a stricter level
        assert!(!summary.is_significant(0.0001));

        let summary = Summary::from_counts(2, 3);
        assert_eq!(summary.percent_correct, 67);
        assert!(!summary.significant);
    }

    #[test]
    fn test_summary_without_participants() {
        let summary = Summary::from_counts(0, 0);
        assert_eq!(summary.percent_correct, 0);
        assert_eq!(summary.p_value, 1.0);
        assert!(!summary.is_significant(0.05));
        assert!(!summary.significant);
    }
}
