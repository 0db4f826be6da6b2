//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::Error;

/// Reference product being tasted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    /// Internal brewing identifier, never shown to panelists
    pub brew_id: String,
    /// Internal name, never shown to panelists
    pub internal_name: String,
    /// Public-facing name
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalePoint {
    pub id: i64,
    pub scale_id: i64,
    pub code: String,
    pub text: String,
}

/// Answer scale (set of valid code + text pairs)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scale {
    pub id: i64,
    pub name: String,
    pub points: Vec<ScalePoint>,
}

impl Scale {
    /// Find the point matching an answer code
    pub fn point(&self, code: &str) -> Option<&ScalePoint> {
        self.points.iter().find(|p| p.code == code)
    }
}

/// Reusable question template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub question_text: String,
    pub scale_id: i64,
}

/// Named, ordered list of question templates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSet {
    pub id: i64,
    pub name: String,
    /// Question ids in presentation order
    pub question_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub id: Uuid,
    pub internal_title: String,
    pub title: String,
    pub description: String,
    pub product_a_id: i64,
    pub product_b_id: i64,
    /// Default question set copied into new panels
    pub question_set_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Panel lifecycle status
///
/// PLANNED → ACCEPTING_ANSWERS → PRESENTING_RESULTS, with HIDDEN making the
/// panel inaccessible to anonymous visitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PanelStatus {
    Planned,
    AcceptingAnswers,
    PresentingResults,
    Hidden,
}

impl PanelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PanelStatus::Planned => "PLANNED",
            PanelStatus::AcceptingAnswers => "ACCEPTING_ANSWERS",
            PanelStatus::PresentingResults => "PRESENTING_RESULTS",
            PanelStatus::Hidden => "HIDDEN",
        }
    }
}

impl fmt::Display for PanelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PanelStatus {
    type Err = Error;

    /// An unrecognized status in storage is a data error, not user input
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PLANNED" => Ok(PanelStatus::Planned),
            "ACCEPTING_ANSWERS" => Ok(PanelStatus::AcceptingAnswers),
            "PRESENTING_RESULTS" => Ok(PanelStatus::PresentingResults),
            "HIDDEN" => Ok(PanelStatus::Hidden),
            other => Err(Error::Invariant(format!("Unknown panel status '{}'", other))),
        }
    }
}

/// When the experiment description is shown to panelists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShowExperimentDescription {
    #[default]
    No,
    AfterTasting,
    BeforeTasting,
}

impl ShowExperimentDescription {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShowExperimentDescription::No => "NO",
            ShowExperimentDescription::AfterTasting => "AFTER_TASTING",
            ShowExperimentDescription::BeforeTasting => "BEFORE_TASTING",
        }
    }
}

impl FromStr for ShowExperimentDescription {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NO" => Ok(ShowExperimentDescription::No),
            "AFTER_TASTING" => Ok(ShowExperimentDescription::AfterTasting),
            "BEFORE_TASTING" => Ok(ShowExperimentDescription::BeforeTasting),
            other => Err(Error::Invariant(format!(
                "Unknown show_exp_description '{}'",
                other
            ))),
        }
    }
}

/// One run of an experiment across a set of panelists
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Panel {
    pub id: Uuid,
    pub experiment_id: Uuid,
    pub description: String,
    /// Fixed at creation
    pub planned_panelists: u16,
    pub show_exp_description: ShowExperimentDescription,
    pub status: PanelStatus,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// One panelist's kit of three coded samples
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleSet {
    pub id: i64,
    pub panel_id: Uuid,
    pub is_used: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sample {
    pub id: i64,
    pub sample_set_id: i64,
    pub product_id: i64,
    /// Globally unique numeric code printed on the cup
    pub code: u16,
}

/// A panelist's verdict on which sample was odd
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TastingResult {
    pub id: i64,
    pub sample_set_id: i64,
    pub odd_sample_id: i64,
    pub is_correct: bool,
}

/// Question frozen into a panel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelQuestion {
    pub id: i64,
    pub panel_id: Uuid,
    pub position: i64,
    pub question_text: String,
    pub scale_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub id: i64,
    pub question_id: i64,
    pub result_id: i64,
    pub answer_code: String,
    /// Denormalized scale point text at answer time
    pub answer_text: String,
}
