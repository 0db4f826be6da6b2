//! Result recording
//!
//! Persists a panelist's odd-sample verdict and the survey answers tied to
//! it. Correctness is derived by [`determine_odd_product`], which is kept
//! free of any database access.

use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use tasex_common::db::{begin_write, Answer, Sample, TastingResult};
use tasex_common::{Error, Result};

use crate::allocator::SAMPLES_PER_SET;
use crate::db::{questions, results, samples};

/// Find the product that appears exactly once in a kit
///
/// A kit must hold exactly three samples split 2 vs 1 between two products.
/// Anything else is reported as [`Error::Invariant`].
pub fn determine_odd_product(samples: &[Sample]) -> Result<i64> {
    if samples.len() != SAMPLES_PER_SET {
        return Err(Error::Invariant(format!(
            "Sample set holds {} samples, expected {}",
            samples.len(),
            SAMPLES_PER_SET
        )));
    }

    let mut counts: HashMap<i64, usize> = HashMap::new();
    for sample in samples {
        *counts.entry(sample.product_id).or_insert(0) += 1;
    }

    if counts.len() != 2 {
        return Err(Error::Invariant(format!(
            "Sample set holds {} distinct products, expected 2",
            counts.len()
        )));
    }

    counts
        .into_iter()
        .find(|(_, count)| *count == 1)
        .map(|(product_id, _)| product_id)
        .ok_or_else(|| Error::Invariant("Sample set has no minority product".to_string()))
}

/// One entry of an answer submission; `None` means left unanswered
#[derive(Debug, Clone)]
pub struct AnswerSubmission {
    pub question_id: i64,
    pub code: Option<String>,
}

/// Result Recorder
pub struct ResultRecorder {
    db: Pool<Sqlite>,
}

impl ResultRecorder {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    /// Record which sample the panelist picked as odd
    ///
    /// Fails with [`Error::InvalidInput`] when the sample is not part of the
    /// set and with [`Error::DuplicateResult`] when the set already has a
    /// result. Marks the set used in the same transaction.
    pub async fn record(&self, sample_set_id: i64, chosen_sample_id: i64) -> Result<TastingResult> {
        tracing::debug!(sample_set_id, chosen_sample_id, "Recording result");

        let mut tx = begin_write(&self.db).await?;

        samples::get_sample_set(&mut *tx, sample_set_id).await?;
        let kit = samples::samples_in_set(&mut *tx, sample_set_id).await?;

        let chosen = kit
            .iter()
            .find(|s| s.id == chosen_sample_id)
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "Sample {} is not part of sample set {}",
                    chosen_sample_id, sample_set_id
                ))
            })?;

        let odd_product = determine_odd_product(&kit)?;
        let is_correct = chosen.product_id == odd_product;

        let id = results::insert_result(&mut *tx, sample_set_id, chosen_sample_id, is_correct).await?;
        results::mark_sample_set_used(&mut *tx, sample_set_id).await?;

        tx.commit().await?;

        tracing::info!(result_id = id, sample_set_id, is_correct, "Recorded result");

        Ok(TastingResult {
            id,
            sample_set_id,
            odd_sample_id: chosen_sample_id,
            is_correct,
        })
    }

    /// Record survey answers for a result, at most once
    ///
    /// Unanswered entries are skipped. Every answered question must belong to
    /// the result's panel and use a code from the question's scale.
    pub async fn record_answers(
        &self,
        result_id: i64,
        submissions: &[AnswerSubmission],
    ) -> Result<Vec<Answer>> {
        let panel_id = results::result_panel_id(&self.db, result_id).await?;

        if results::answers_exist(&self.db, result_id).await? {
            return Err(Error::AnswersAlreadyRecorded { result_id });
        }

        let panel_questions = questions::list_questions_with_scales(&self.db, panel_id).await?;

        // Validate everything before writing anything
        let mut resolved = Vec::with_capacity(submissions.len());
        for submission in submissions {
            let Some(code) = submission.code.as_deref() else {
                continue;
            };
            let entry = panel_questions
                .iter()
                .find(|q| q.question.id == submission.question_id)
                .ok_or_else(|| {
                    Error::InvalidInput(format!(
                        "Question {} is not part of panel {}",
                        submission.question_id, panel_id
                    ))
                })?;
            let point = entry.scale.point(code).ok_or_else(|| {
                Error::InvalidInput(format!(
                    "'{}' is not a valid answer to question {}",
                    code, submission.question_id
                ))
            })?;
            resolved.push((submission.question_id, point.code.clone(), point.text.clone()));
        }

        let mut tx = begin_write(&self.db).await?;

        // Re-checked inside the transaction; the UNIQUE constraint backs this up
        if results::answers_exist(&mut *tx, result_id).await? {
            return Err(Error::AnswersAlreadyRecorded { result_id });
        }

        let mut answers = Vec::with_capacity(resolved.len());
        for (question_id, code, text) in &resolved {
            answers.push(results::insert_answer(&mut *tx, result_id, *question_id, code, text).await?);
        }

        tx.commit().await?;

        tracing::info!(result_id, answers = answers.len(), "Recorded answers");

        Ok(answers)
    }
}
