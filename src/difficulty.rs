//! Per-user difficulty progression, recomputed from the profile on every call.

use serde::Serialize;

use crate::analyzer::UserPerformanceProfile;
use crate::config::DifficultyRules;
use crate::domain::Difficulty;

/// Which way the state machine moved, for selection reasons and progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
  /// Not enough attempts to adjust yet.
  Initial,
  Up,
  Down,
  Hold,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct DifficultyDecision {
  pub current: Difficulty,
  pub target: Difficulty,
  pub transition: Transition,
}

/// Next target level. Below the minimum attempt count everyone is a beginner;
/// otherwise move one step from the profile's ceiling level with hysteresis.
pub fn target_difficulty(profile: &UserPerformanceProfile, rules: &DifficultyRules) -> DifficultyDecision {
  if profile.attempt_count() < rules.min_attempts_for_adjustment {
    return DifficultyDecision {
      current: Difficulty::Beginner,
      target: Difficulty::Beginner,
      transition: Transition::Initial,
    };
  }

  let current = profile.ceiling_difficulty;
  let (target, transition) = match profile.recent.value() {
    Some(rate) if rate >= rules.promote_at => (current.up(), Transition::Up),
    Some(rate) if rate < rules.demote_below => (current.down(), Transition::Down),
    _ => (current, Transition::Hold),
  };
  // Saturated moves are holds.
  let transition = if target == current && transition != Transition::Hold { Transition::Hold } else { transition };
  DifficultyDecision { current, target, transition }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::analyzer::build_profile;
  use crate::config::EngineConfig;
  use crate::domain::{decode_attempts, ChallengeType};
  use crate::fixtures::{attempt, t0};
  use chrono::Duration;

  fn decide(rows: &[crate::domain::StoredAttempt]) -> DifficultyDecision {
    let cfg = EngineConfig::default();
    let profile = build_profile("u", &decode_attempts(rows), t0(), &cfg);
    target_difficulty(&profile, &cfg.difficulty)
  }

  fn run(difficulty: Difficulty, correct: usize, wrong: usize) -> Vec<crate::domain::StoredAttempt> {
    let now = t0();
    let mut rows = Vec::new();
    for i in 0..(correct + wrong) {
      let at = now - Duration::days(1 + (i as i64 % 13));
      rows.push(attempt("u", &format!("c{i}"), ChallengeType::BiasSwap, difficulty, i < correct, at));
    }
    rows
  }

  #[test]
  fn new_users_start_at_beginner() {
    let d = decide(&[]);
    assert_eq!(d.target, Difficulty::Beginner);
    assert_eq!(d.transition, Transition::Initial);

    // Two perfect attempts are still below the adjustment threshold.
    let d = decide(&run(Difficulty::Intermediate, 2, 0));
    assert_eq!(d.target, Difficulty::Beginner);
  }

  #[test]
  fn nine_of_ten_moves_up() {
    let d = decide(&run(Difficulty::Beginner, 9, 1));
    assert_eq!(d.current, Difficulty::Beginner);
    assert_eq!(d.target, Difficulty::Intermediate);
    assert_eq!(d.transition, Transition::Up);
  }

  #[test]
  fn struggling_moves_down_and_middling_holds() {
    let d = decide(&run(Difficulty::Advanced, 1, 4));
    assert_eq!(d.target, Difficulty::Intermediate);
    assert_eq!(d.transition, Transition::Down);

    let d = decide(&run(Difficulty::Intermediate, 6, 4));
    assert_eq!(d.target, Difficulty::Intermediate);
    assert_eq!(d.transition, Transition::Hold);
  }

  #[test]
  fn bounds_saturate() {
    let d = decide(&run(Difficulty::Advanced, 10, 0));
    assert_eq!(d.target, Difficulty::Advanced);
    assert_eq!(d.transition, Transition::Hold);

    let d = decide(&run(Difficulty::Beginner, 0, 5));
    assert_eq!(d.target, Difficulty::Beginner);
  }

  #[test]
  fn an_easy_latest_attempt_does_not_reset_the_level() {
    let now = t0();
    let mut rows = run(Difficulty::Advanced, 5, 0);
    rows.push(attempt("u", "easy", ChallengeType::DataLiteracy, Difficulty::Beginner, true, now - Duration::hours(1)));
    let d = decide(&rows);
    assert_eq!(d.current, Difficulty::Advanced);
    assert_eq!(d.target, Difficulty::Advanced);
  }

  #[test]
  fn stale_history_without_recent_rate_holds() {
    let now = t0();
    let rows: Vec<_> = (0..4)
      .map(|i| attempt("u", &format!("c{i}"), ChallengeType::Synthesis, Difficulty::Intermediate, true, now - Duration::days(20)))
      .collect();
    let d = decide(&rows);
    assert_eq!(d.target, Difficulty::Intermediate);
    assert_eq!(d.transition, Transition::Hold);
  }
}
