//! Adaptive challenge selection engine.
//!
//! Picks one challenge per user per day from their attempt history, the bias
//! exposure of what they have read, and the active challenge pool. The
//! `routes` and `state` modules wrap the engine in a small HTTP host.

pub mod analyzer;
pub mod config;
pub mod difficulty;
pub mod domain;
pub mod error;
pub mod exposure;
pub mod progress;
pub mod protocol;
pub mod routes;
pub mod scoring;
pub mod seeds;
pub mod selection;
pub mod state;
pub mod store;
pub mod telemetry;

#[cfg(test)]
mod fixtures;

pub use error::{EngineError, EngineResult};
pub use selection::SelectionEngine;
