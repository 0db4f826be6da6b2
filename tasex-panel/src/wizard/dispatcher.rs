//! Wizard dispatch
//!
//! Every request re-reads the panel, decides from (status, stored step)
//! what to do via [`route`], and only then runs a step handler. The handler
//! is chosen from the stored step alone; nothing in the submitted form can
//! select a different one.

use serde::Deserialize;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use tasex_common::db::{Experiment, Panel, PanelStatus};
use tasex_common::{Error, Result};
use tracing::{debug, info};
use uuid::Uuid;

use super::state::{WizardState, WizardStep};
use super::store::{SessionKey, WizardSessions};
use super::view::{PanelHeader, QuestionPrompt, SampleChoice, View};
use crate::db::{catalog, panels, questions, samples};
use crate::lifecycle::{self, Audience};
use crate::recorder::{AnswerSubmission, ResultRecorder};
use crate::statistics;

/// What to do with a request, given the panel status and stored step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Run the handler for this step
    Step(WizardStep),
    NotStarted,
    Results,
    Denied,
}

/// Dispatch table
///
/// `step` is `None` when the visitor has no entry for this panel yet.
pub fn route(status: PanelStatus, step: Option<WizardStep>) -> Route {
    match (status, step) {
        (PanelStatus::Hidden, _) => Route::Denied,
        (PanelStatus::Planned, _) => Route::NotStarted,
        (PanelStatus::PresentingResults, _) => Route::Results,
        (PanelStatus::AcceptingAnswers, None) => Route::Step(WizardStep::VerifyCode),
        (PanelStatus::AcceptingAnswers, Some(step)) => Route::Step(step),
    }
}

/// Submitted form; only the fields of the current step are read
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WizardForm {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub are_samples_correct: Option<bool>,
    #[serde(default)]
    pub odd_sample: Option<i64>,
    /// Scale code per panel question id
    #[serde(default)]
    pub answers: BTreeMap<i64, String>,
}

/// View to render, and whether the submission moved the wizard forward
#[derive(Debug, Clone)]
pub struct WizardOutcome {
    pub view: View,
    pub accepted: bool,
}

impl WizardOutcome {
    fn accepted(view: View) -> Self {
        Self { view, accepted: true }
    }

    fn rejected(view: View) -> Self {
        Self { view, accepted: false }
    }
}

struct PanelContext {
    panel: Panel,
    experiment: Experiment,
}

impl PanelContext {
    fn header(&self, after_tasting: bool) -> PanelHeader {
        PanelHeader::new(&self.panel, &self.experiment, after_tasting)
    }
}

/// Session Wizard
#[derive(Clone)]
pub struct Wizard {
    db: SqlitePool,
    sessions: WizardSessions,
}

impl Wizard {
    pub fn new(db: SqlitePool, sessions: WizardSessions) -> Self {
        Self { db, sessions }
    }

    fn recorder(&self) -> ResultRecorder {
        ResultRecorder::new(self.db.clone())
    }

    async fn load_context(&self, panel_id: Uuid) -> Result<PanelContext> {
        let panel = panels::get_panel(&self.db, panel_id).await?;
        lifecycle::check_access(panel.status, Audience::Anonymous)?;
        let experiment = catalog::get_experiment(&self.db, panel.experiment_id).await?;
        Ok(PanelContext { panel, experiment })
    }

    /// Stored state, only consulted while the panel accepts answers
    async fn stored_state(&self, key: &SessionKey, panel: &Panel) -> Result<Option<WizardState>> {
        if lifecycle::accepts_answers(panel.status) {
            self.sessions.get(key, panel.id).await
        } else {
            Ok(None)
        }
    }

    /// Stored state, or a fresh one saved on first visit
    async fn state_or_new(
        &self,
        key: &SessionKey,
        panel_id: Uuid,
        stored: Option<WizardState>,
    ) -> Result<WizardState> {
        match stored {
            Some(state) => Ok(state),
            None => {
                let state = WizardState::new(panel_id);
                self.sessions.put(key, &state).await?;
                info!(panel_id = %panel_id, "Started wizard session");
                Ok(state)
            }
        }
    }

    /// Render the page for the visitor's current position
    pub async fn show(&self, key: &SessionKey, panel_id: Uuid) -> Result<View> {
        let ctx = self.load_context(panel_id).await?;
        let stored = self.stored_state(key, &ctx.panel).await?;

        match route(ctx.panel.status, stored.as_ref().map(WizardState::step)) {
            Route::Denied => Err(Error::AccessDenied("This panel is not available".to_string())),
            Route::NotStarted => Ok(View::NotStarted { panel: ctx.header(false) }),
            Route::Results => self.results_view(&ctx).await,
            Route::Step(_) => {
                let state = self.state_or_new(key, panel_id, stored).await?;
                self.render_step(&ctx, &state, Vec::new()).await
            }
        }
    }

    /// Handle a form submission for the visitor's current step
    pub async fn submit(
        &self,
        key: &SessionKey,
        panel_id: Uuid,
        form: WizardForm,
    ) -> Result<WizardOutcome> {
        let ctx = self.load_context(panel_id).await?;
        let stored = self.stored_state(key, &ctx.panel).await?;

        match route(ctx.panel.status, stored.as_ref().map(WizardState::step)) {
            Route::Denied => Err(Error::AccessDenied("This panel is not available".to_string())),
            Route::NotStarted => Ok(WizardOutcome::rejected(View::NotStarted {
                panel: ctx.header(false),
            })),
            Route::Results => Ok(WizardOutcome::rejected(self.results_view(&ctx).await?)),
            Route::Step(step) => {
                let state = self.state_or_new(key, panel_id, stored).await?;
                debug!(panel_id = %panel_id, step = step.number(), "Dispatching submission");
                match step {
                    WizardStep::VerifyCode => self.verify_code(key, &ctx, state, form).await,
                    WizardStep::ConfirmSet => self.confirm_set(key, &ctx, state, form).await,
                    WizardStep::PickOddSample => self.pick_odd_sample(key, &ctx, state, form).await,
                    WizardStep::AnswerQuestions => {
                        self.answer_questions(key, &ctx, state, form).await
                    }
                    WizardStep::Complete => Ok(WizardOutcome::accepted(View::Complete {
                        panel: ctx.header(true),
                    })),
                }
            }
        }
    }

    async fn verify_code(
        &self,
        key: &SessionKey,
        ctx: &PanelContext,
        mut state: WizardState,
        form: WizardForm,
    ) -> Result<WizardOutcome> {
        let panel_id = ctx.panel.id;
        let reject = |message: &str| {
            debug!(panel_id = %panel_id, reason = message, "Rejected sample code");
            WizardOutcome::rejected(View::VerifyCode {
                panel: ctx.header(false),
                errors: vec![message.to_string()],
            })
        };

        let raw = form.code.as_deref().map(str::trim).unwrap_or_default();
        if raw.is_empty() {
            return Ok(reject("Please enter one of your sample codes"));
        }
        let Ok(code) = raw.parse::<u16>() else {
            return Ok(reject("Unknown sample code"));
        };
        let Some(lookup) = samples::find_sample_by_code(&self.db, code).await? else {
            return Ok(reject("Unknown sample code"));
        };
        if lookup.panel_id != panel_id {
            return Ok(reject("This sample code belongs to a different panel"));
        }
        if lookup.set_is_used {
            return Ok(reject("This sample set has already been used"));
        }

        let sample_set_id = lookup.sample.sample_set_id;
        state.verified(sample_set_id)?;
        self.sessions.put(key, &state).await?;
        info!(panel_id = %panel_id, sample_set_id, step = state.step().number(), "Sample code verified");

        let view = self.render_step(ctx, &state, Vec::new()).await?;
        Ok(WizardOutcome::accepted(view))
    }

    async fn confirm_set(
        &self,
        key: &SessionKey,
        ctx: &PanelContext,
        mut state: WizardState,
        form: WizardForm,
    ) -> Result<WizardOutcome> {
        let panel_id = ctx.panel.id;
        let sample_set_id = required(state.sample_set(), "sample_set")?;

        match form.are_samples_correct {
            None => {
                let view = self
                    .render_step(ctx, &state, vec!["Please confirm whether these are your samples".to_string()])
                    .await?;
                Ok(WizardOutcome::rejected(view))
            }
            Some(false) => {
                state.reset();
                self.sessions.put(key, &state).await?;
                info!(panel_id = %panel_id, sample_set_id, "Sample set rejected by panelist, restarting");
                let view = self.render_step(ctx, &state, Vec::new()).await?;
                Ok(WizardOutcome::accepted(view))
            }
            Some(true) => {
                if samples::claim_sample_set(&self.db, sample_set_id).await? {
                    state.confirmed()?;
                    self.sessions.put(key, &state).await?;
                    info!(panel_id = %panel_id, sample_set_id, step = state.step().number(), "Sample set claimed");
                    let view = self.render_step(ctx, &state, Vec::new()).await?;
                    Ok(WizardOutcome::accepted(view))
                } else {
                    state.reset();
                    self.sessions.put(key, &state).await?;
                    debug!(panel_id = %panel_id, sample_set_id, "Sample set claimed by someone else");
                    let view = self
                        .render_step(ctx, &state, vec!["This sample set has already been used".to_string()])
                        .await?;
                    Ok(WizardOutcome::rejected(view))
                }
            }
        }
    }

    async fn pick_odd_sample(
        &self,
        key: &SessionKey,
        ctx: &PanelContext,
        mut state: WizardState,
        form: WizardForm,
    ) -> Result<WizardOutcome> {
        let panel_id = ctx.panel.id;
        let sample_set_id = required(state.sample_set(), "sample_set")?;

        let Some(chosen) = form.odd_sample else {
            let view = self
                .render_step(ctx, &state, vec!["Please choose the sample you think is different".to_string()])
                .await?;
            return Ok(WizardOutcome::rejected(view));
        };

        let message = match self.recorder().record(sample_set_id, chosen).await {
            Ok(result) => {
                state.recorded(result.id)?;
                self.sessions.put(key, &state).await?;
                info!(
                    panel_id = %panel_id,
                    sample_set_id,
                    result_id = result.id,
                    step = state.step().number(),
                    "Odd sample recorded"
                );
                let view = self.render_step(ctx, &state, Vec::new()).await?;
                return Ok(WizardOutcome::accepted(view));
            }
            Err(Error::InvalidInput(_)) => "Please choose one of your own samples",
            Err(Error::DuplicateResult { .. }) => {
                "A result has already been recorded for this sample set"
            }
            Err(e) => return Err(e),
        };

        debug!(panel_id = %panel_id, sample_set_id, chosen, reason = message, "Rejected odd sample");
        let view = self.render_step(ctx, &state, vec![message.to_string()]).await?;
        Ok(WizardOutcome::rejected(view))
    }

    async fn answer_questions(
        &self,
        key: &SessionKey,
        ctx: &PanelContext,
        mut state: WizardState,
        form: WizardForm,
    ) -> Result<WizardOutcome> {
        let panel_id = ctx.panel.id;
        let result_id = required(state.result(), "result")?;
        let panel_questions = questions::list_questions_with_scales(&self.db, panel_id).await?;

        let mut question_errors = BTreeMap::new();
        let mut submissions = Vec::with_capacity(panel_questions.len());
        for entry in &panel_questions {
            let id = entry.question.id;
            match form.answers.get(&id) {
                None => {
                    question_errors.insert(id, "Please answer this question".to_string());
                }
                Some(code) if entry.scale.point(code).is_none() => {
                    question_errors.insert(id, "Please choose one of the offered answers".to_string());
                }
                Some(code) => submissions.push(AnswerSubmission {
                    question_id: id,
                    code: Some(code.clone()),
                }),
            }
        }

        if !question_errors.is_empty() {
            debug!(panel_id = %panel_id, result_id, unresolved = question_errors.len(), "Rejected answers");
            let view = self
                .answers_view(ctx, &form.answers, Vec::new(), question_errors)
                .await?;
            return Ok(WizardOutcome::rejected(view));
        }

        let message = match self.recorder().record_answers(result_id, &submissions).await {
            Ok(answers) => {
                state.finished()?;
                self.sessions.put(key, &state).await?;
                info!(panel_id = %panel_id, result_id, answers = answers.len(), "Wizard complete");
                return Ok(WizardOutcome::accepted(View::Complete {
                    panel: ctx.header(true),
                }));
            }
            Err(Error::AnswersAlreadyRecorded { .. }) => {
                "Your answers have already been recorded".to_string()
            }
            Err(Error::InvalidInput(message)) => message,
            Err(e) => return Err(e),
        };

        debug!(panel_id = %panel_id, result_id, reason = %message, "Rejected answers");
        let view = self
            .answers_view(ctx, &form.answers, vec![message], BTreeMap::new())
            .await?;
        Ok(WizardOutcome::rejected(view))
    }

    async fn render_step(
        &self,
        ctx: &PanelContext,
        state: &WizardState,
        errors: Vec<String>,
    ) -> Result<View> {
        let panel = ctx.header(false);
        match state.step() {
            WizardStep::VerifyCode => Ok(View::VerifyCode { panel, errors }),
            WizardStep::ConfirmSet => {
                let set_id = required(state.sample_set(), "sample_set")?;
                let kit = samples::samples_in_set(&self.db, set_id).await?;
                Ok(View::ConfirmSet {
                    panel,
                    codes: kit.iter().map(|s| s.code).collect(),
                    errors,
                })
            }
            WizardStep::PickOddSample => {
                let set_id = required(state.sample_set(), "sample_set")?;
                let kit = samples::samples_in_set(&self.db, set_id).await?;
                Ok(View::PickOddSample {
                    panel,
                    samples: kit
                        .iter()
                        .map(|s| SampleChoice { id: s.id, code: s.code })
                        .collect(),
                    errors,
                })
            }
            WizardStep::AnswerQuestions => {
                self.answers_view(ctx, &BTreeMap::new(), errors, BTreeMap::new())
                    .await
            }
            WizardStep::Complete => Ok(View::Complete { panel: ctx.header(true) }),
        }
    }

    async fn answers_view(
        &self,
        ctx: &PanelContext,
        selected: &BTreeMap<i64, String>,
        errors: Vec<String>,
        question_errors: BTreeMap<i64, String>,
    ) -> Result<View> {
        let prompts = questions::list_questions_with_scales(&self.db, ctx.panel.id)
            .await?
            .into_iter()
            .map(|entry| QuestionPrompt {
                id: entry.question.id,
                position: entry.question.position,
                text: entry.question.question_text,
                options: entry.scale.points.iter().map(Into::into).collect(),
                selected: selected.get(&entry.question.id).cloned(),
            })
            .collect();

        Ok(View::AnswerQuestions {
            panel: ctx.header(false),
            questions: prompts,
            errors,
            question_errors,
        })
    }

    async fn results_view(&self, ctx: &PanelContext) -> Result<View> {
        let statistics = statistics::panel_statistics(&self.db, ctx.panel.id).await?;
        Ok(View::Results {
            panel: ctx.header(true),
            statistics,
        })
    }
}

/// Validated states always carry these; a miss is a bug
fn required(value: Option<i64>, field: &str) -> Result<i64> {
    value.ok_or_else(|| Error::Invariant(format!("Wizard state is missing {}", field)))
}
