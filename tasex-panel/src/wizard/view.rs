//! What the rendering layer is asked to show
//!
//! A [`View`] names a template and carries the context it needs. Markup is
//! produced elsewhere.

use serde::Serialize;
use std::collections::BTreeMap;
use tasex_common::db::{Experiment, Panel, ScalePoint, ShowExperimentDescription};
use uuid::Uuid;

use crate::statistics::PanelStatistics;

/// Common header for every panel page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelHeader {
    pub panel_id: Uuid,
    pub title: String,
    pub description: String,
    /// Present only when the panel is configured to show it on this page
    pub experiment_description: Option<String>,
}

impl PanelHeader {
    /// Build a header; `after_tasting` is true on completion and results pages
    pub fn new(panel: &Panel, experiment: &Experiment, after_tasting: bool) -> Self {
        let show = match panel.show_exp_description {
            ShowExperimentDescription::No => false,
            ShowExperimentDescription::BeforeTasting => true,
            ShowExperimentDescription::AfterTasting => after_tasting,
        };

        Self {
            panel_id: panel.id,
            title: experiment.title.clone(),
            description: panel.description.clone(),
            experiment_description: show.then(|| experiment.description.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleChoice {
    pub id: i64,
    pub code: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerOption {
    pub code: String,
    pub text: String,
}

impl From<&ScalePoint> for AnswerOption {
    fn from(point: &ScalePoint) -> Self {
        Self {
            code: point.code.clone(),
            text: point.text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionPrompt {
    pub id: i64,
    pub position: i64,
    pub text: String,
    pub options: Vec<AnswerOption>,
    /// Previously submitted code, kept when re-rendering with errors
    pub selected: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "template", content = "context", rename_all = "snake_case")]
pub enum View {
    VerifyCode {
        panel: PanelHeader,
        errors: Vec<String>,
    },
    ConfirmSet {
        panel: PanelHeader,
        codes: Vec<u16>,
        errors: Vec<String>,
    },
    PickOddSample {
        panel: PanelHeader,
        samples: Vec<SampleChoice>,
        errors: Vec<String>,
    },
    AnswerQuestions {
        panel: PanelHeader,
        questions: Vec<QuestionPrompt>,
        errors: Vec<String>,
        /// Per-question messages keyed by question id
        question_errors: BTreeMap<i64, String>,
    },
    Complete {
        panel: PanelHeader,
    },
    NotStarted {
        panel: PanelHeader,
    },
    Results {
        panel: PanelHeader,
        statistics: PanelStatistics,
    },
}

impl View {
    pub fn template(&self) -> &'static str {
        match self {
            View::VerifyCode { .. } => "verify_code",
            View::ConfirmSet { .. } => "confirm_set",
            View::PickOddSample { .. } => "pick_odd_sample",
            View::AnswerQuestions { .. } => "answer_questions",
            View::Complete { .. } => "complete",
            View::NotStarted { .. } => "not_started",
            View::Results { .. } => "results",
        }
    }

    /// True when the view is re-presenting a form with validation messages
    pub fn has_errors(&self) -> bool {
        match self {
            View::VerifyCode { errors, .. }
            | View::ConfirmSet { errors, .. }
            | View::PickOddSample { errors, .. } => !errors.is_empty(),
            View::AnswerQuestions {
                errors,
                question_errors,
                ..
            } => !errors.is_empty() || !question_errors.is_empty(),
            View::Complete { .. } | View::NotStarted { .. } | View::Results { .. } => false,
        }
    }
}
