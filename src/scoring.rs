//! Composite candidate scoring.
//!
//! `total = base × fit^w1 × weakness^w2 × bias^w3 × variety^w4 × streak × time`
//!
//! Sub-scores live in [0, 1] and the weights are exponents, so a single very
//! low sub-score (say, a type done twice in a row) drags the whole product
//! down without additive penalties. Every factor is kept in `ScoreBreakdown`
//! so a persisted selection can say why it won.

use std::sync::Arc;

use serde::Serialize;

use crate::analyzer::UserPerformanceProfile;
use crate::config::EngineConfig;
use crate::difficulty::{target_difficulty, DifficultyDecision};
use crate::domain::{ChallengeCandidate, ChallengeType, Difficulty, Viewpoint};
use crate::exposure::BiasExposureProfile;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScoreBreakdown {
  pub challenge_type: ChallengeType,
  pub difficulty: Difficulty,
  pub target_difficulty: Difficulty,
  pub base: f64,
  pub difficulty_fit: f64,
  pub weakness_focus: f64,
  pub bias_diversity: f64,
  pub type_diversity: f64,
  pub streak_multiplier: f64,
  pub time_adjustment: f64,
  /// Success rate for the candidate's type, if the user ever tried it.
  pub type_success_rate: Option<f64>,
  pub time_ratio: Option<f64>,
  pub underexposed_viewpoints: Vec<Viewpoint>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SelectionScore {
  pub challenge_id: String,
  pub total: f64,
  pub breakdown: ScoreBreakdown,
}

impl SelectionScore {
  /// Human-readable reasons, stored with the daily selection.
  pub fn reasons(&self) -> Vec<String> {
    let b = &self.breakdown;
    let mut out = Vec::new();

    if b.difficulty == b.target_difficulty {
      out.push(format!("difficulty {} matches target", b.difficulty));
    } else if b.difficulty.is_adjacent(&b.target_difficulty) {
      out.push(format!("difficulty {} is next to target {}", b.difficulty, b.target_difficulty));
    } else {
      out.push(format!("difficulty {} is far from target {}", b.difficulty, b.target_difficulty));
    }

    match b.type_success_rate {
      Some(rate) if rate < 0.5 => out.push(format!("practice weak area {} ({:.0}% success)", b.challenge_type, rate * 100.0)),
      Some(rate) => out.push(format!("{} success so far {:.0}%", b.challenge_type, rate * 100.0)),
      None => out.push(format!("unexplored type {}", b.challenge_type)),
    }

    if !b.underexposed_viewpoints.is_empty() {
      let names: Vec<&str> = b.underexposed_viewpoints.iter().map(|v| v.as_str()).collect();
      out.push(format!("covers underexposed viewpoint: {}", names.join(", ")));
    }

    if b.type_diversity < 1.0 {
      out.push(format!("{} was done recently (variety {:.2})", b.challenge_type, b.type_diversity));
    }
    if b.streak_multiplier > 1.0 {
      out.push(format!("streak bonus x{:.2}", b.streak_multiplier));
    }
    if let (true, Some(ratio)) = (b.time_adjustment < 1.0, b.time_ratio) {
      out.push(format!("usually takes {:.1}x the estimate for {}", ratio, b.challenge_type));
    }
    out.push(format!("score {:.4}", self.total));
    out
  }
}

pub struct ScoringEngine {
  config: Arc<EngineConfig>,
}

impl ScoringEngine {
  pub fn new(config: Arc<EngineConfig>) -> Self { Self { config } }

  pub fn difficulty(&self, profile: &UserPerformanceProfile) -> DifficultyDecision {
    target_difficulty(profile, &self.config.difficulty)
  }

  /// Score one candidate. Profile and exposure are computed once per request
  /// and shared across all candidates.
  pub fn score(&self, candidate: &ChallengeCandidate, profile: &UserPerformanceProfile, exposure: &BiasExposureProfile) -> SelectionScore {
    let target = self.difficulty(profile).target;
    self.score_for_target(candidate, profile, exposure, target)
  }

  pub fn score_for_target(
    &self,
    candidate: &ChallengeCandidate,
    profile: &UserPerformanceProfile,
    exposure: &BiasExposureProfile,
    target: Difficulty,
  ) -> SelectionScore {
    let rules = &self.config.scoring;
    let weights = &self.config.weights;
    let kind = candidate.challenge_type;

    let difficulty_fit = if candidate.difficulty == target {
      rules.fit_exact
    } else if candidate.difficulty.is_adjacent(&target) {
      rules.fit_adjacent
    } else {
      rules.fit_distant
    };

    let type_success_rate = profile.type_rate(kind);
    let weakness_focus = match type_success_rate {
      Some(rate) => (1.0 - rate).clamp(rules.weakness_floor, 1.0),
      None => rules.weakness_untried,
    };

    let underexposed_viewpoints: Vec<Viewpoint> = if kind.is_bias_comparison() {
      let mut v: Vec<Viewpoint> = candidate.viewpoints.iter().copied().filter(|vp| exposure.is_underexposed(*vp)).collect();
      v.sort();
      v.dedup();
      v
    } else {
      Vec::new()
    };
    let bias_diversity = if kind.is_bias_comparison() {
      let mut s = rules.bias_base;
      if !underexposed_viewpoints.is_empty() {
        s += rules.bias_underexposed_bonus;
      }
      if let Some(lean) = exposure.political_lean {
        if candidate.viewpoints.iter().any(|vp| vp.position() * lean < 0.0) {
          s += rules.bias_lean_counterweight;
        }
      }
      s.min(1.0)
    } else {
      rules.bias_neutral
    };

    let window = rules.type_recent_window;
    let type_diversity = match profile.recent_types.iter().take(window).position(|t| *t == kind) {
      Some(pos) if window > 0 => rules.type_recent_floor + (1.0 - rules.type_recent_floor) * pos as f64 / window as f64,
      _ => 1.0,
    };

    let cap = rules.streak_cap_days.max(1);
    let streak_multiplier = 1.0 + rules.streak_max_bonus * profile.streak_days.min(cap) as f64 / cap as f64;

    let time_ratio = profile.time_ratio_by_type.get(&kind).copied();
    let time_adjustment = match time_ratio {
      Some(ratio) if ratio > rules.time_ratio_limit => rules.time_penalty,
      _ => 1.0,
    };

    let total = rules.base
      * difficulty_fit.powf(weights.difficulty_fit)
      * weakness_focus.powf(weights.weakness_focus)
      * bias_diversity.powf(weights.bias_diversity)
      * type_diversity.powf(weights.type_diversity)
      * streak_multiplier
      * time_adjustment;

    SelectionScore {
      challenge_id: candidate.id.clone(),
      total,
      breakdown: ScoreBreakdown {
        challenge_type: kind,
        difficulty: candidate.difficulty,
        target_difficulty: target,
        base: rules.base,
        difficulty_fit,
        weakness_focus,
        bias_diversity,
        type_diversity,
        streak_multiplier,
        time_adjustment,
        type_success_rate,
        time_ratio,
        underexposed_viewpoints,
      },
    }
  }
}
