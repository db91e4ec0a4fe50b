//! Human-facing progress summary: strengths, weaknesses, trend, readiness.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;

use crate::analyzer::{PerformanceAnalyzer, UserPerformanceProfile};
use crate::config::EngineConfig;
use crate::difficulty::target_difficulty;
use crate::domain::{ChallengeType, Difficulty};
use crate::error::EngineResult;
use crate::store::HistoryReader;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
  Improving,
  Stable,
  Declining,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TypeStanding {
  pub challenge_type: ChallengeType,
  pub success_rate: f64,
  pub attempts: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProgressReport {
  pub user_id: String,
  pub strengths: Vec<TypeStanding>,
  pub weaknesses: Vec<TypeStanding>,
  pub trend: Trend,
  pub ready_for_advanced: bool,
  pub current_difficulty: Difficulty,
  pub target_difficulty: Difficulty,
  pub streak_days: u32,
  pub overall_success_rate: Option<f64>,
  pub recent_success_rate: Option<f64>,
  pub attempts: usize,
}

pub struct ProgressReporter {
  analyzer: PerformanceAnalyzer,
  config: Arc<EngineConfig>,
}

impl ProgressReporter {
  pub fn new(history: Arc<dyn HistoryReader>, config: Arc<EngineConfig>) -> Self {
    Self { analyzer: PerformanceAnalyzer::new(history, config.clone()), config }
  }

  #[instrument(level = "info", skip(self), fields(%user_id))]
  pub async fn analyze_progress(&self, user_id: &str, now: DateTime<Utc>) -> EngineResult<ProgressReport> {
    let profile = self.analyzer.analyze(user_id, now).await?;
    Ok(build_report(&profile, &self.config))
  }
}

pub fn build_report(profile: &UserPerformanceProfile, config: &EngineConfig) -> ProgressReport {
  let rules = &config.progress;
  let mut strengths = Vec::new();
  let mut weaknesses = Vec::new();

  // Iterate in a fixed order so reports are stable.
  for t in ChallengeType::ALL {
    let Some(rate) = profile.by_type.get(&t) else { continue };
    let Some(value) = rate.value() else { continue };
    if rate.total < rules.min_sample {
      continue;
    }
    let standing = TypeStanding { challenge_type: t, success_rate: value, attempts: rate.total };
    if value > rules.strength_above {
      strengths.push(standing);
    } else if value < rules.weakness_below {
      weaknesses.push(standing);
    }
  }

  let trend = match (profile.recent.value(), profile.overall.value()) {
    (Some(recent), Some(overall)) if recent - overall > rules.trend_delta => Trend::Improving,
    (Some(recent), Some(overall)) if overall - recent > rules.trend_delta => Trend::Declining,
    _ => Trend::Stable,
  };

  let decision = target_difficulty(profile, &config.difficulty);

  ProgressReport {
    user_id: profile.user_id.clone(),
    strengths,
    weaknesses,
    trend,
    ready_for_advanced: decision.target == Difficulty::Advanced,
    current_difficulty: decision.current,
    target_difficulty: decision.target,
    streak_days: profile.streak_days,
    overall_success_rate: profile.overall.value(),
    recent_success_rate: profile.recent.value(),
    attempts: profile.attempt_count(),
  }
}
