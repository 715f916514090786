//! examforge-core - Attempt lifecycle and grading engine.
//!
//! This crate defines the assessment and attempt data model, the error
//! taxonomy, the collaborator traits (catalog, store, events), and the
//! pure pieces of the engine: the access window guard, the auto-grader and
//! the attempt state machine. [`engine::AttemptEngine`] composes them.

pub mod access;
pub mod catalog;
pub mod clock;
pub mod engine;
pub mod error;
pub mod events;
pub mod gateway;
pub mod grader;
pub mod lifecycle;
pub mod model;
pub mod parser;
pub mod traits;

pub use engine::{AttemptEngine, EngineConfig};
pub use error::{DenyReason, EngineError, ErrorKind};
