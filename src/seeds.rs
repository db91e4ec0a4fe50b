//! Built-in challenge bank so the host is useful without a config file.

use chrono::{DateTime, Utc};

use crate::domain::{ChallengeCandidate, ChallengeType, Difficulty, Viewpoint};

fn seed(
  id: &str,
  challenge_type: ChallengeType,
  difficulty: Difficulty,
  estimated_seconds: u32,
  viewpoints: &[Viewpoint],
  now: DateTime<Utc>,
) -> ChallengeCandidate {
  ChallengeCandidate {
    id: id.into(),
    challenge_type,
    difficulty,
    estimated_seconds,
    viewpoints: viewpoints.to_vec(),
    active: true,
    created_at: now,
    expires_at: None,
  }
}

/// One or two challenges per type, spread over difficulties and viewpoints.
pub fn seed_candidates(now: DateTime<Utc>) -> Vec<ChallengeCandidate> {
  use ChallengeType::*;
  use Difficulty::*;
  vec![
    seed("seed-bias-1", BiasSwap, Beginner, 240, &[Viewpoint::Left, Viewpoint::Center], now),
    seed("seed-bias-2", BiasSwap, Intermediate, 360, &[Viewpoint::Right, Viewpoint::CenterRight], now),
    seed("seed-bias-3", BiasSwap, Advanced, 480, &[Viewpoint::CenterLeft, Viewpoint::Right], now),
    seed("seed-logic-1", LogicPuzzle, Beginner, 180, &[], now),
    seed("seed-logic-2", LogicPuzzle, Advanced, 420, &[], now),
    seed("seed-data-1", DataLiteracy, Beginner, 300, &[], now),
    seed("seed-data-2", DataLiteracy, Intermediate, 420, &[], now),
    seed("seed-counter-1", CounterArgument, Intermediate, 360, &[], now),
    seed("seed-synthesis-1", Synthesis, Intermediate, 600, &[], now),
    seed("seed-synthesis-2", Synthesis, Advanced, 720, &[], now),
    seed("seed-ethics-1", EthicalDilemma, Beginner, 300, &[], now),
  ]
}
