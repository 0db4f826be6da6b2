//! Panel lifecycle rules
//!
//! Status transitions are driven by the panel owner; nothing expires on a
//! timer. Callers read the current status on every request and ask these
//! helpers what is allowed.

use tasex_common::db::PanelStatus;
use tasex_common::{Error, Result};

/// Who is looking at a panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Anonymous,
    Owner,
}

/// Reject anonymous access to hidden panels
///
/// Hidden panels produce an explicit denial rather than a redirect, so the
/// caller can tell "forbidden" apart from a content state.
pub fn check_access(status: PanelStatus, audience: Audience) -> Result<()> {
    match (status, audience) {
        (PanelStatus::Hidden, Audience::Anonymous) => Err(Error::AccessDenied(
            "This panel is not available".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Whether the tasting wizard runs for this status
pub fn accepts_answers(status: PanelStatus) -> bool {
    status == PanelStatus::AcceptingAnswers
}

/// Panel questions are frozen once a panel leaves PLANNED
pub fn ensure_questions_editable(status: PanelStatus, action: &str) -> Result<()> {
    if status == PanelStatus::Planned {
        Ok(())
    } else {
        Err(Error::Lifecycle(format!(
            "Cannot {} questions once panel is started (status {})",
            action, status
        )))
    }
}

/// `planned_panelists` is fixed at creation
pub fn ensure_planned_panelists_unchanged(current: u16, requested: u16) -> Result<()> {
    if current == requested {
        Ok(())
    } else {
        Err(Error::Lifecycle(format!(
            "Cannot change planned_panelists from {} to {}",
            current, requested
        )))
    }
}

/// A panel is closed the first time it starts presenting results
pub fn closes_panel(old: PanelStatus, new: PanelStatus) -> bool {
    old != PanelStatus::PresentingResults && new == PanelStatus::PresentingResults
}
