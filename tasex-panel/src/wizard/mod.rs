//! Anonymous panelist wizard
//!
//! Walks one visitor through one panel: verify a sample code, confirm the
//! kit, pick the odd sample, answer the panel questions.

pub mod dispatcher;
pub mod state;
pub mod store;
pub mod view;

pub use dispatcher::{route, Route, Wizard, WizardForm, WizardOutcome};
pub use state::{WizardState, WizardStep};
pub use store::{MemorySessionStore, SessionKey, SessionStore, WizardSessions};
pub use view::View;
