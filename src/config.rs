//! Loading engine configuration (tuning knobs + optional challenge bank) from TOML.
//!
//! See `AppConfig` and `EngineConfig` for expected schema. Every field has a
//! default, so an empty file (or no file at all) yields the stock tuning.

use chrono::Duration;
use serde::Deserialize;
use tracing::{error, info};

use crate::domain::Viewpoint;
use crate::error::EngineError;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  #[serde(default)]
  pub engine: EngineConfig,
  #[serde(default)]
  pub challenges: Vec<ChallengeCfg>,
}

/// Challenge entry accepted in TOML configuration. Type and difficulty stay
/// strings here so one bad entry can be skipped instead of failing the file.
#[derive(Clone, Debug, Deserialize)]
pub struct ChallengeCfg {
  #[serde(default)] pub id: Option<String>,
  #[serde(rename = "type")]
  pub challenge_type: String,
  pub difficulty: String,
  #[serde(default = "default_estimated_seconds")] pub estimated_seconds: u32,
  #[serde(default)] pub viewpoints: Vec<Viewpoint>,
}

fn default_estimated_seconds() -> u32 { 300 }

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
  pub windows: Windows,
  pub difficulty: DifficultyRules,
  pub weights: Weights,
  pub scoring: ScoringRules,
  pub exposure: ExposureRules,
  pub progress: ProgressRules,
  pub batch: BatchRules,
}

/// Lookback windows, in days.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Windows {
  pub overall_days: i64,
  pub recent_days: i64,
  pub repeat_prevention_days: i64,
  pub exposure_days: i64,
}

impl Default for Windows {
  fn default() -> Self {
    Self { overall_days: 30, recent_days: 14, repeat_prevention_days: 7, exposure_days: 30 }
  }
}

impl Windows {
  pub fn overall(&self) -> Duration { Duration::days(self.overall_days) }
  pub fn recent(&self) -> Duration { Duration::days(self.recent_days) }
  pub fn repeat_prevention(&self) -> Duration { Duration::days(self.repeat_prevention_days) }
  pub fn exposure(&self) -> Duration { Duration::days(self.exposure_days) }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DifficultyRules {
  pub min_attempts_for_adjustment: usize,
  pub promote_at: f64,
  pub demote_below: f64,
}

impl Default for DifficultyRules {
  fn default() -> Self {
    Self { min_attempts_for_adjustment: 3, promote_at: 0.85, demote_below: 0.40 }
  }
}

/// Exponents applied to the normalized sub-scores.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Weights {
  pub difficulty_fit: f64,
  pub weakness_focus: f64,
  pub bias_diversity: f64,
  pub type_diversity: f64,
}

impl Default for Weights {
  fn default() -> Self {
    Self { difficulty_fit: 0.3, weakness_focus: 0.25, bias_diversity: 0.3, type_diversity: 0.2 }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ScoringRules {
  pub base: f64,
  pub fit_exact: f64,
  pub fit_adjacent: f64,
  pub fit_distant: f64,
  pub weakness_floor: f64,
  pub weakness_untried: f64,
  pub bias_base: f64,
  pub bias_underexposed_bonus: f64,
  pub bias_lean_counterweight: f64,
  pub bias_neutral: f64,
  pub type_recent_window: usize,
  pub type_recent_floor: f64,
  pub streak_cap_days: u32,
  pub streak_max_bonus: f64,
  pub time_ratio_limit: f64,
  pub time_penalty: f64,
}

impl Default for ScoringRules {
  fn default() -> Self {
    Self {
      base: 1.0,
      fit_exact: 1.0,
      fit_adjacent: 0.5,
      fit_distant: 0.1,
      weakness_floor: 0.1,
      weakness_untried: 0.5,
      bias_base: 0.5,
      bias_underexposed_bonus: 0.5,
      bias_lean_counterweight: 0.1,
      bias_neutral: 0.7,
      type_recent_window: 5,
      type_recent_floor: 0.2,
      streak_cap_days: 10,
      streak_max_bonus: 0.1,
      time_ratio_limit: 2.0,
      time_penalty: 0.7,
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ExposureRules {
  pub underexposed_share: f64,
  pub min_bias_attempts: u32,
}

impl Default for ExposureRules {
  fn default() -> Self { Self { underexposed_share: 0.15, min_bias_attempts: 3 } }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ProgressRules {
  pub strength_above: f64,
  pub weakness_below: f64,
  pub min_sample: u32,
  pub trend_delta: f64,
}

impl Default for ProgressRules {
  fn default() -> Self {
    Self { strength_above: 0.80, weakness_below: 0.50, min_sample: 5, trend_delta: 0.10 }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BatchRules {
  pub max_concurrency: usize,
}

impl Default for BatchRules {
  fn default() -> Self { Self { max_concurrency: 8 } }
}

impl EngineConfig {
  pub fn from_toml_str(s: &str) -> Result<Self, EngineError> {
    let cfg: EngineConfig = toml::from_str(s).map_err(|e| EngineError::Config(e.to_string()))?;
    cfg.validate()?;
    Ok(cfg)
  }

  pub fn validate(&self) -> Result<(), EngineError> {
    let w = &self.windows;
    if w.overall_days <= 0 || w.recent_days <= 0 || w.repeat_prevention_days <= 0 || w.exposure_days <= 0 {
      return Err(EngineError::Config("all windows must be positive".into()));
    }
    if w.recent_days > w.overall_days {
      return Err(EngineError::Config("recent window cannot exceed the overall window".into()));
    }
    let weights = &self.weights;
    if [weights.difficulty_fit, weights.weakness_focus, weights.bias_diversity, weights.type_diversity]
      .iter()
      .any(|x| !x.is_finite() || *x < 0.0)
    {
      return Err(EngineError::Config("weights must be finite and non-negative".into()));
    }
    if self.difficulty.demote_below >= self.difficulty.promote_at {
      return Err(EngineError::Config("demote threshold must be below promote threshold".into()));
    }
    if self.batch.max_concurrency == 0 {
      return Err(EngineError::Config("batch.max_concurrency must be at least 1".into()));
    }
    Ok(())
  }
}

impl AppConfig {
  pub fn from_toml_str(s: &str) -> Result<Self, EngineError> {
    let cfg: AppConfig = toml::from_str(s).map_err(|e| EngineError::Config(e.to_string()))?;
    cfg.engine.validate()?;
    Ok(cfg)
  }
}

/// Attempt to load `AppConfig` from ENGINE_CONFIG_PATH. On any IO, parse or
/// validation error, returns None and the caller uses defaults.
pub fn load_app_config_from_env() -> Option<AppConfig> {
  let path = std::env::var("ENGINE_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match AppConfig::from_toml_str(&s) {
      Ok(cfg) => {
        info!(target: "engine", %path, bank = cfg.challenges.len(), "Loaded engine config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "engine", %path, error = %e, "Failed to load TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "engine", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
