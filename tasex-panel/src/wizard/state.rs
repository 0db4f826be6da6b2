//! Wizard session state
//!
//! VERIFY_CODE → CONFIRM_SET → PICK_ODD_SAMPLE → ANSWER_QUESTIONS → COMPLETE,
//! with CONFIRM_SET able to fall back to VERIFY_CODE.
//!
//! Stored entries are untyped JSON; [`WizardState::from_stored`] checks them
//! before the wizard trusts anything they say.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tasex_common::{Error, Result};
use uuid::Uuid;

/// Wizard step, numbered from 1 as stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WizardStep {
    VerifyCode,
    ConfirmSet,
    PickOddSample,
    AnswerQuestions,
    Complete,
}

impl WizardStep {
    pub fn number(&self) -> u8 {
        match self {
            WizardStep::VerifyCode => 1,
            WizardStep::ConfirmSet => 2,
            WizardStep::PickOddSample => 3,
            WizardStep::AnswerQuestions => 4,
            WizardStep::Complete => 5,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(WizardStep::VerifyCode),
            2 => Some(WizardStep::ConfirmSet),
            3 => Some(WizardStep::PickOddSample),
            4 => Some(WizardStep::AnswerQuestions),
            5 => Some(WizardStep::Complete),
            _ => None,
        }
    }
}

/// Wire form of a session entry
#[derive(Debug, Serialize, Deserialize)]
struct StoredState {
    panel_id: Uuid,
    step: u8,
    sample_set: Option<i64>,
    result: Option<i64>,
}

/// Progress of one panelist through one panel
///
/// Fields are only changed through the transition methods, which keep
/// `sample_set` and `result` consistent with the step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WizardState {
    panel_id: Uuid,
    step: WizardStep,
    sample_set: Option<i64>,
    result: Option<i64>,
}

impl WizardState {
    /// Fresh state at VERIFY_CODE
    pub fn new(panel_id: Uuid) -> Self {
        Self {
            panel_id,
            step: WizardStep::VerifyCode,
            sample_set: None,
            result: None,
        }
    }

    pub fn panel_id(&self) -> Uuid {
        self.panel_id
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn sample_set(&self) -> Option<i64> {
        self.sample_set
    }

    pub fn result(&self) -> Option<i64> {
        self.result
    }

    /// Validate a stored entry for `panel_id`
    ///
    /// Returns [`Error::Invariant`] describing the first problem found.
    pub fn from_stored(value: Value, panel_id: Uuid) -> Result<Self> {
        let stored: StoredState = serde_json::from_value(value)
            .map_err(|e| Error::Invariant(format!("Unreadable session entry: {}", e)))?;

        if stored.panel_id != panel_id {
            return Err(Error::Invariant(format!(
                "Session entry belongs to panel {}",
                stored.panel_id
            )));
        }

        let step = WizardStep::from_number(stored.step)
            .ok_or_else(|| Error::Invariant(format!("Unknown wizard step {}", stored.step)))?;

        let consistent = match step {
            WizardStep::VerifyCode => stored.sample_set.is_none() && stored.result.is_none(),
            WizardStep::ConfirmSet | WizardStep::PickOddSample => {
                stored.sample_set.is_some() && stored.result.is_none()
            }
            WizardStep::AnswerQuestions | WizardStep::Complete => {
                stored.sample_set.is_some() && stored.result.is_some()
            }
        };
        if !consistent {
            return Err(Error::Invariant(format!(
                "Session entry at step {} has sample_set={:?} result={:?}",
                stored.step, stored.sample_set, stored.result
            )));
        }

        Ok(Self {
            panel_id,
            step,
            sample_set: stored.sample_set,
            result: stored.result,
        })
    }

    pub fn to_stored(&self) -> Value {
        serde_json::json!({
            "panel_id": self.panel_id,
            "step": self.step.number(),
            "sample_set": self.sample_set,
            "result": self.result,
        })
    }

    fn expect_step(&self, expected: WizardStep, transition: &str) -> Result<()> {
        if self.step == expected {
            Ok(())
        } else {
            Err(Error::Invariant(format!(
                "Cannot {} from step {}",
                transition,
                self.step.number()
            )))
        }
    }

    /// VERIFY_CODE → CONFIRM_SET
    pub fn verified(&mut self, sample_set: i64) -> Result<()> {
        self.expect_step(WizardStep::VerifyCode, "verify a code")?;
        self.step = WizardStep::ConfirmSet;
        self.sample_set = Some(sample_set);
        Ok(())
    }

    /// CONFIRM_SET → PICK_ODD_SAMPLE
    pub fn confirmed(&mut self) -> Result<()> {
        self.expect_step(WizardStep::ConfirmSet, "confirm a sample set")?;
        self.step = WizardStep::PickOddSample;
        Ok(())
    }

    /// PICK_ODD_SAMPLE → ANSWER_QUESTIONS
    pub fn recorded(&mut self, result: i64) -> Result<()> {
        self.expect_step(WizardStep::PickOddSample, "record a result")?;
        self.step = WizardStep::AnswerQuestions;
        self.result = Some(result);
        Ok(())
    }

    /// ANSWER_QUESTIONS → COMPLETE
    pub fn finished(&mut self) -> Result<()> {
        self.expect_step(WizardStep::AnswerQuestions, "finish")?;
        self.step = WizardStep::Complete;
        Ok(())
    }

    /// Back to VERIFY_CODE, forgetting the sample set
    pub fn reset(&mut self) {
        *self = Self::new(self.panel_id);
    }
}
