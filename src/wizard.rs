//! Ride wizard
//!
//! A step-by-step conversation that collects or edits the fields of a ride.
//! Implements the Elm Architecture: a pure transition function over
//! the conversation state and an engine that executes the resulting effects.

mod effect;
mod engine;
mod event;
mod session;
mod state;
mod step;
mod transition;

pub use engine::{WizardEngine, CATEGORY_PREFIX};
pub use event::WizardAction;
pub use session::SessionStore;
pub use state::{SessionKey, WizardMode};
