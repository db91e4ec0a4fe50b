//! Application state for the host: the in-memory store and the engine wired over it.
//!
//! This module owns:
//!   - the `MemoryStore` (attempts, published candidates, daily selections)
//!   - the selection engine and progress reporter, sharing one config
//!
//! The candidate bank comes from the TOML config when present; built-in seeds
//! are always published as well (config ids win on collision).

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::config::{load_app_config_from_env, AppConfig, ChallengeCfg};
use crate::domain::{ChallengeCandidate, ChallengeType, Difficulty};
use crate::error::EngineResult;
use crate::progress::ProgressReporter;
use crate::seeds::seed_candidates;
use crate::selection::SelectionEngine;
use crate::store::{CandidatePool, MemoryStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MemoryStore>,
    pub selection: Arc<SelectionEngine>,
    pub progress: Arc<ProgressReporter>,
}

impl AppState {
    /// Build state from env: load config (or defaults), publish the bank, wire the engine.
    #[instrument(level = "info", skip_all)]
    pub async fn new() -> Self {
        let cfg = load_app_config_from_env().unwrap_or_default();
        Self::from_config(cfg).await
    }

    pub async fn from_config(cfg: AppConfig) -> Self {
        let now = Utc::now();
        let store = Arc::new(MemoryStore::new());

        // Config bank first, so its ids take precedence over seeds.
        for cc in &cfg.challenges {
            match candidate_from_cfg(cc, now) {
                Ok(c) => {
                    store.publish(c).await;
                }
                Err(e) => {
                    error!(target: "engine", id = ?cc.id, error = %e, "Skipping bank item");
                }
            }
        }
        for c in seed_candidates(now) {
            store.publish(c).await;
        }

        // Inventory summary by type/difficulty.
        let mut inventory: HashMap<(ChallengeType, Difficulty), usize> = HashMap::new();
        if let Ok(active) = store.active(now).await {
            for c in active {
                *inventory.entry((c.challenge_type, c.difficulty)).or_insert(0) += 1;
            }
        }
        for ((kind, difficulty), count) in inventory {
            info!(target: "engine", %kind, %difficulty, count, "Startup challenge inventory");
        }

        let config = Arc::new(cfg.engine);
        let selection = SelectionEngine::new(config.clone(), store.clone(), store.clone(), store.clone(), store.clone());
        let progress = ProgressReporter::new(store.clone(), config);

        Self {
            store,
            selection: Arc::new(selection),
            progress: Arc::new(progress),
        }
    }
}

fn candidate_from_cfg(cc: &ChallengeCfg, now: DateTime<Utc>) -> EngineResult<ChallengeCandidate> {
    Ok(ChallengeCandidate {
        id: cc.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string()),
        challenge_type: cc.challenge_type.parse()?,
        difficulty: cc.difficulty.parse()?,
        estimated_seconds: cc.estimated_seconds,
        viewpoints: cc.viewpoints.clone(),
        active: true,
        created_at: now,
        expires_at: None,
    })
}
