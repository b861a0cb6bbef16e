#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
// The ultimate strictness: catches things like missing documentation or overflow risks
#![warn(clippy::restriction)]
pub mod core;

pub use crate::core::alerts::engine::{EngineOutput, TriggerEngine};
pub use crate::core::alerts::model::{TriggerDefinition, TriggerSet, ZoneFilter};
pub use crate::core::config::EngineConfig;
pub use crate::core::model::{Alert, EventType, LogEvent};
