//! Hook bus - typed, priority-ordered event dispatch.
//!
//! Replaces ambient hook tables with an explicit registry object owned by
//! [`crate::state::AppState`] and passed by reference to consumers.

mod bus;
mod events;

pub use bus::{DefinitionFilterFn, HookBus, HookCallback};
pub use events::HookEvent;
