//! Native notification → [`CanonicalEvent`](crate::state::CanonicalEvent) translation
//!
//! Translators are pure functions over values. They never touch a task handle; the
//! session's drain loop applies what they return.

pub mod segmented;
pub mod swarm;

pub use swarm::{PauseDirective, SwarmLevel};
