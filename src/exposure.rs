//! Bias exposure: how much of each viewpoint a user has seen through
//! bias-comparison challenges, and which viewpoints are underexposed.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, instrument};

use crate::config::{EngineConfig, ExposureRules};
use crate::domain::Viewpoint;
use crate::error::EngineResult;
use crate::store::{ExposureReader, ViewpointExposure};

#[derive(Clone, Debug, PartialEq)]
pub struct BiasExposureProfile {
  pub counts: HashMap<Viewpoint, u32>,
  /// Sum over viewpoint tags; the denominator for shares.
  pub total: u32,
  /// Bias-comparison attempts; the minimum-sample gate counts these, not tags.
  pub attempts: u32,
  pub underexposed: BTreeSet<Viewpoint>,
  /// Self-reported lean in [-1, 1], negative = left.
  pub political_lean: Option<f64>,
}

impl BiasExposureProfile {
  /// Share of all bias-comparison exposure; `None` with no exposure at all.
  pub fn share(&self, vp: Viewpoint) -> Option<f64> {
    if self.total == 0 {
      return None;
    }
    Some(self.counts.get(&vp).copied().unwrap_or(0) as f64 / self.total as f64)
  }

  pub fn is_underexposed(&self, vp: Viewpoint) -> bool { self.underexposed.contains(&vp) }

  /// Zero bias-comparison attempts marks every viewpoint underexposed
  /// (uniform prior); below the minimum number of attempts nothing is.
  pub fn from_exposure(seen: ViewpointExposure, political_lean: Option<f64>, rules: &ExposureRules) -> Self {
    let ViewpointExposure { counts, attempts } = seen;
    let total: u32 = counts.values().sum();
    let mut profile = Self { counts, total, attempts, underexposed: BTreeSet::new(), political_lean };
    if attempts == 0 {
      profile.underexposed = Viewpoint::ALL.iter().copied().collect();
    } else if attempts >= rules.min_bias_attempts {
      profile.underexposed = Viewpoint::ALL
        .iter()
        .copied()
        .filter(|vp| profile.share(*vp).unwrap_or(0.0) < rules.underexposed_share)
        .collect();
    }
    profile
  }
}

pub struct BiasExposureTracker {
  reader: Arc<dyn ExposureReader>,
  config: Arc<EngineConfig>,
}

impl BiasExposureTracker {
  pub fn new(reader: Arc<dyn ExposureReader>, config: Arc<EngineConfig>) -> Self {
    Self { reader, config }
  }

  #[instrument(level = "debug", skip(self), fields(%user_id))]
  pub async fn exposure(&self, user_id: &str, now: DateTime<Utc>) -> EngineResult<BiasExposureProfile> {
    let since = now - self.config.windows.exposure();
    let (seen, lean) = tokio::try_join!(
      self.reader.exposure_since(user_id, since),
      self.reader.political_lean(user_id),
    )
    .map_err(|e| {
      error!(target: "engine", %user_id, error = %e, "Exposure read failed");
      e
    })?;
    let profile = BiasExposureProfile::from_exposure(seen, lean, &self.config.exposure);
    debug!(target: "engine", %user_id, attempts = profile.attempts, tags = profile.total, underexposed = ?profile.underexposed, "Bias exposure computed");
    Ok(profile)
  }
}
