//! Domain models used by the engine: challenge types, difficulty levels, bias
//! viewpoints, published candidates and recorded attempts.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// What kind of exercise is presented to the user?
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeType {
  /// Bias comparison: the same story told from different viewpoints.
  #[serde(alias = "bias_comparison")]
  BiasSwap,
  LogicPuzzle,
  DataLiteracy,
  CounterArgument,
  Synthesis,
  EthicalDilemma,
}

impl ChallengeType {
  pub const ALL: [ChallengeType; 6] = [
    ChallengeType::BiasSwap,
    ChallengeType::LogicPuzzle,
    ChallengeType::DataLiteracy,
    ChallengeType::CounterArgument,
    ChallengeType::Synthesis,
    ChallengeType::EthicalDilemma,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      ChallengeType::BiasSwap => "bias_swap",
      ChallengeType::LogicPuzzle => "logic_puzzle",
      ChallengeType::DataLiteracy => "data_literacy",
      ChallengeType::CounterArgument => "counter_argument",
      ChallengeType::Synthesis => "synthesis",
      ChallengeType::EthicalDilemma => "ethical_dilemma",
    }
  }

  /// Only bias-comparison challenges count towards viewpoint exposure.
  pub fn is_bias_comparison(&self) -> bool {
    matches!(self, ChallengeType::BiasSwap)
  }
}

impl fmt::Display for ChallengeType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for ChallengeType {
  type Err = EngineError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
      "bias_swap" | "bias_comparison" => Ok(ChallengeType::BiasSwap),
      "logic_puzzle" => Ok(ChallengeType::LogicPuzzle),
      "data_literacy" => Ok(ChallengeType::DataLiteracy),
      "counter_argument" => Ok(ChallengeType::CounterArgument),
      "synthesis" => Ok(ChallengeType::Synthesis),
      "ethical_dilemma" => Ok(ChallengeType::EthicalDilemma),
      other => Err(EngineError::InvalidState(format!("unknown challenge type '{}'", other))),
    }
  }
}

/// Ordered difficulty levels. Derives `Ord` so `Beginner < Intermediate < Advanced`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
  Beginner,
  Intermediate,
  Advanced,
}

impl Default for Difficulty {
  fn default() -> Self { Difficulty::Beginner }
}

impl Difficulty {
  pub fn as_str(&self) -> &'static str {
    match self {
      Difficulty::Beginner => "beginner",
      Difficulty::Intermediate => "intermediate",
      Difficulty::Advanced => "advanced",
    }
  }

  fn level(&self) -> i8 {
    match self {
      Difficulty::Beginner => 0,
      Difficulty::Intermediate => 1,
      Difficulty::Advanced => 2,
    }
  }

  /// One level up, saturating at `Advanced`.
  pub fn up(self) -> Self {
    match self {
      Difficulty::Beginner => Difficulty::Intermediate,
      Difficulty::Intermediate | Difficulty::Advanced => Difficulty::Advanced,
    }
  }

  /// One level down, saturating at `Beginner`.
  pub fn down(self) -> Self {
    match self {
      Difficulty::Advanced => Difficulty::Intermediate,
      Difficulty::Intermediate | Difficulty::Beginner => Difficulty::Beginner,
    }
  }

  pub fn is_adjacent(&self, other: &Difficulty) -> bool {
    (self.level() - other.level()).abs() == 1
  }
}

impl fmt::Display for Difficulty {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Difficulty {
  type Err = EngineError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "beginner" => Ok(Difficulty::Beginner),
      "intermediate" => Ok(Difficulty::Intermediate),
      "advanced" => Ok(Difficulty::Advanced),
      other => Err(EngineError::InvalidState(format!("unknown difficulty '{}'", other))),
    }
  }
}

/// Political viewpoint represented by a bias-comparison challenge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Viewpoint {
  Left,
  CenterLeft,
  Center,
  CenterRight,
  Right,
}

impl Viewpoint {
  pub const ALL: [Viewpoint; 5] = [
    Viewpoint::Left,
    Viewpoint::CenterLeft,
    Viewpoint::Center,
    Viewpoint::CenterRight,
    Viewpoint::Right,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Viewpoint::Left => "left",
      Viewpoint::CenterLeft => "center_left",
      Viewpoint::Center => "center",
      Viewpoint::CenterRight => "center_right",
      Viewpoint::Right => "right",
    }
  }

  /// Position on the same scale as the self-reported lean: -1.0 (left) to 1.0 (right).
  pub fn position(&self) -> f64 {
    match self {
      Viewpoint::Left => -1.0,
      Viewpoint::CenterLeft => -0.5,
      Viewpoint::Center => 0.0,
      Viewpoint::CenterRight => 0.5,
      Viewpoint::Right => 1.0,
    }
  }
}

impl fmt::Display for Viewpoint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Viewpoint {
  type Err = EngineError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
      "left" => Ok(Viewpoint::Left),
      "center_left" | "centre_left" => Ok(Viewpoint::CenterLeft),
      "center" | "centre" => Ok(Viewpoint::Center),
      "center_right" | "centre_right" => Ok(Viewpoint::CenterRight),
      "right" => Ok(Viewpoint::Right),
      other => Err(EngineError::InvalidState(format!("unknown viewpoint '{}'", other))),
    }
  }
}

/// A published challenge. Immutable once published; owned by the content side.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChallengeCandidate {
  pub id: String,
  pub challenge_type: ChallengeType,
  pub difficulty: Difficulty,
  pub estimated_seconds: u32,
  #[serde(default)] pub viewpoints: Vec<Viewpoint>,
  pub active: bool,
  pub created_at: DateTime<Utc>,
  #[serde(default)] pub expires_at: Option<DateTime<Utc>>,
}

impl ChallengeCandidate {
  pub fn is_available(&self, now: DateTime<Utc>) -> bool {
    self.active && self.created_at <= now && self.expires_at.map_or(true, |exp| exp > now)
  }
}

/// Attempt row as the history store keeps it. Type, difficulty and viewpoints
/// are plain strings here; `AttemptRecord::try_from` does the checking.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredAttempt {
  pub id: String,
  pub user_id: String,
  pub challenge_id: String,
  pub challenge_type: String,
  pub difficulty: String,
  pub correct: bool,
  pub time_spent_seconds: u32,
  /// Estimate of the challenge at submission time, when the writer knew it.
  #[serde(default)] pub estimated_seconds: Option<u32>,
  #[serde(default)] pub viewpoints: Vec<String>,
  pub submitted_at: DateTime<Utc>,
}

/// Typed view of one attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct AttemptRecord {
  pub user_id: String,
  pub challenge_id: String,
  pub challenge_type: ChallengeType,
  pub difficulty: Difficulty,
  pub correct: bool,
  pub time_spent_seconds: u32,
  pub estimated_seconds: Option<u32>,
  pub viewpoints: Vec<Viewpoint>,
  pub submitted_at: DateTime<Utc>,
}

impl AttemptRecord {
  /// actual / estimated, when the estimate is known and positive.
  pub fn time_ratio(&self) -> Option<f64> {
    match self.estimated_seconds {
      Some(est) if est > 0 => Some(self.time_spent_seconds as f64 / est as f64),
      _ => None,
    }
  }
}

impl TryFrom<&StoredAttempt> for AttemptRecord {
  type Error = EngineError;

  fn try_from(row: &StoredAttempt) -> Result<Self, Self::Error> {
    let viewpoints = row
      .viewpoints
      .iter()
      .map(|v| v.parse::<Viewpoint>())
      .collect::<Result<Vec<_>, _>>()?;
    Ok(Self {
      user_id: row.user_id.clone(),
      challenge_id: row.challenge_id.clone(),
      challenge_type: row.challenge_type.parse()?,
      difficulty: row.difficulty.parse()?,
      correct: row.correct,
      time_spent_seconds: row.time_spent_seconds,
      estimated_seconds: row.estimated_seconds,
      viewpoints,
      submitted_at: row.submitted_at,
    })
  }
}

/// Decode rows, skipping (and logging) the ones that don't parse, so one bad
/// record cannot block selection for a user.
pub fn decode_attempts(rows: &[StoredAttempt]) -> Vec<AttemptRecord> {
  rows
    .iter()
    .filter_map(|row| match AttemptRecord::try_from(row) {
      Ok(rec) => Some(rec),
      Err(e) => {
        tracing::warn!(target: "engine", attempt_id = %row.id, user_id = %row.user_id, error = %e, "Skipping unreadable attempt record");
        None
      }
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn difficulty_transitions_saturate() {
    assert_eq!(Difficulty::Beginner.down(), Difficulty::Beginner);
    assert_eq!(Difficulty::Beginner.up(), Difficulty::Intermediate);
    assert_eq!(Difficulty::Advanced.up(), Difficulty::Advanced);
    assert!(Difficulty::Beginner < Difficulty::Advanced);
    assert!(Difficulty::Beginner.is_adjacent(&Difficulty::Intermediate));
    assert!(!Difficulty::Beginner.is_adjacent(&Difficulty::Advanced));
    assert!(!Difficulty::Advanced.is_adjacent(&Difficulty::Advanced));
  }

  #[test]
  fn bias_comparison_is_an_alias() {
    assert_eq!("bias_comparison".parse::<ChallengeType>(), Ok(ChallengeType::BiasSwap));
    assert_eq!("Bias-Swap".parse::<ChallengeType>(), Ok(ChallengeType::BiasSwap));
    let parsed: ChallengeType = serde_json::from_str("\"bias_comparison\"").expect("alias");
    assert_eq!(parsed, ChallengeType::BiasSwap);
  }

  #[test]
  fn unknown_type_is_invalid_state_and_skipped() {
    let now = Utc::now();
    let good = StoredAttempt {
      id: "a1".into(),
      user_id: "u".into(),
      challenge_id: "c1".into(),
      challenge_type: "logic_puzzle".into(),
      difficulty: "beginner".into(),
      correct: true,
      time_spent_seconds: 60,
      estimated_seconds: Some(120),
      viewpoints: vec![],
      submitted_at: now,
    };
    let bad = StoredAttempt { id: "a2".into(), challenge_type: "astrology".into(), ..good.clone() };

    assert!(matches!(AttemptRecord::try_from(&bad), Err(EngineError::InvalidState(_))));
    let decoded = decode_attempts(&[good, bad]);
    assert_eq!(decoded.len(), 1);
    assert_eq!(decoded[0].time_ratio(), Some(0.5));
  }

  #[test]
  fn expired_candidates_are_unavailable() {
    let now = Utc::now();
    let mut c = ChallengeCandidate {
      id: "c".into(),
      challenge_type: ChallengeType::Synthesis,
      difficulty: Difficulty::Beginner,
      estimated_seconds: 300,
      viewpoints: vec![],
      active: true,
      created_at: now - chrono::Duration::days(1),
      expires_at: Some(now + chrono::Duration::hours(1)),
    };
    assert!(c.is_available(now));
    c.expires_at = Some(now);
    assert!(!c.is_available(now));
    c.expires_at = None;
    c.active = false;
    assert!(!c.is_available(now));
  }
}
