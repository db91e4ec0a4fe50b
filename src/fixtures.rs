//! Test builders shared by the module tests.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::domain::{ChallengeCandidate, ChallengeType, Difficulty, StoredAttempt, Viewpoint};
use crate::selection::SelectionEngine;
use crate::store::MemoryStore;

/// Fixed "now" at midday UTC so day arithmetic never straddles midnight by accident.
pub fn t0() -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
}

pub fn day_of(now: DateTime<Utc>) -> NaiveDate {
  now.date_naive()
}

pub fn candidate(id: &str, challenge_type: ChallengeType, difficulty: Difficulty, viewpoints: &[Viewpoint]) -> ChallengeCandidate {
  ChallengeCandidate {
    id: id.into(),
    challenge_type,
    difficulty,
    estimated_seconds: 300,
    viewpoints: viewpoints.to_vec(),
    active: true,
    created_at: t0() - Duration::days(90),
    expires_at: None,
  }
}

pub fn attempt(
  user_id: &str,
  challenge_id: &str,
  challenge_type: ChallengeType,
  difficulty: Difficulty,
  correct: bool,
  at: DateTime<Utc>,
) -> StoredAttempt {
  StoredAttempt {
    id: Uuid::new_v4().to_string(),
    user_id: user_id.into(),
    challenge_id: challenge_id.into(),
    challenge_type: challenge_type.as_str().into(),
    difficulty: difficulty.as_str().into(),
    correct,
    time_spent_seconds: 240,
    estimated_seconds: Some(300),
    viewpoints: vec![],
    submitted_at: at,
  }
}

pub fn bias_attempt(user_id: &str, challenge_id: &str, viewpoints: &[&str], at: DateTime<Utc>) -> StoredAttempt {
  StoredAttempt {
    viewpoints: viewpoints.iter().map(|v| v.to_string()).collect(),
    ..attempt(user_id, challenge_id, ChallengeType::BiasSwap, Difficulty::Beginner, true, at)
  }
}

pub fn engine_over(store: &Arc<MemoryStore>) -> SelectionEngine {
  SelectionEngine::new(
    Arc::new(EngineConfig::default()),
    store.clone(),
    store.clone(),
    store.clone(),
    store.clone(),
  )
}
