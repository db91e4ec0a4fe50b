//! Error taxonomy shared by the engine and its collaborators.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
  /// A read dependency (history, pool, exposure, selection store) failed.
  /// Never retried inside the engine.
  #[error("Data unavailable: {0}")]
  DataUnavailable(String),

  /// The active pool is empty, so there is nothing to fall back to.
  #[error("No active candidates for user {user_id}")]
  NoActiveCandidates { user_id: String },

  /// A record could not be interpreted (unknown type, difficulty, viewpoint).
  #[error("Invalid state: {0}")]
  InvalidState(String),

  #[error("Config error: {0}")]
  Config(String),
}

impl EngineError {
  /// Short stable label used in logs and HTTP error bodies.
  pub fn kind(&self) -> &'static str {
    match self {
      EngineError::DataUnavailable(_) => "data_unavailable",
      EngineError::NoActiveCandidates { .. } => "no_active_candidates",
      EngineError::InvalidState(_) => "invalid_state",
      EngineError::Config(_) => "config",
    }
  }
}

pub type EngineResult<T> = Result<T, EngineError>;
