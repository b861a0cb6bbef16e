// Trigger system: definitions, matching, scheduling and output.
//
// Architecture:
// - model.rs: Trigger definitions, trigger sets and callback types
// - registry.rs: Load-time validation and the per-zone lookup table
// - triggers.rs: Matcher compilation and per-event qualification
// - scheduler.rs: Immediate and deferred fires, cancellation, suppression
// - engine.rs: Orchestrates lifecycle, matching and scheduling
// - conditions.rs / responses.rs: Reusable callbacks for trigger authors
// - declarative.rs: JSON trigger files

pub mod conditions;
pub mod declarative;
pub mod engine;
pub mod model;
pub mod registry;
pub mod responses;
pub mod scheduler;
pub mod triggers;
