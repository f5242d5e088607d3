pub mod actions;
pub mod codec;
pub mod config;
pub mod detect;
pub mod error;
pub mod handlers;
pub mod orchestrator;
pub mod progress;
pub mod resolver;
pub mod security;

pub mod prelude {
    pub use crate::actions::{Action, ActionOutcome};
    pub use crate::error::*;
    pub use crate::orchestrator::{Orchestrator, Report, Request};
    pub use crate::progress::{ProgressSnapshot, ProgressState};
    pub use crate::resolver::{BuiltinResolver, FormatResolver};
}
