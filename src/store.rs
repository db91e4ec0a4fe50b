//! Collaborator boundaries (history, candidate pool, exposure, daily selections)
//! and an in-memory implementation of all of them.
//!
//! The engine only ever sees the traits, injected as `Arc<dyn _>`. `MemoryStore`
//! backs the demo host and the tests; a database-backed store would implement
//! the same traits and map its driver errors into `EngineError::DataUnavailable`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, instrument};

use crate::domain::{decode_attempts, ChallengeCandidate, StoredAttempt, Viewpoint};
use crate::error::{EngineError, EngineResult};
use crate::scoring::ScoreBreakdown;

/// How the daily pick was made.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionOrigin {
  Scored,
  /// Everything was recently completed; least-recently-seen challenge served.
  Fallback,
}

/// The authoritative challenge for a user on a calendar day (UTC).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DailySelection {
  pub user_id: String,
  pub day: NaiveDate,
  pub challenge: ChallengeCandidate,
  pub reasons: Vec<String>,
  pub breakdown: Option<ScoreBreakdown>,
  pub origin: SelectionOrigin,
  pub created_at: DateTime<Utc>,
}

impl DailySelection {
  pub fn challenge_id(&self) -> &str { &self.challenge.id }
}

/// Viewpoint tags seen through bias-comparison attempts in a window.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ViewpointExposure {
  /// Tag occurrences; one attempt may carry several viewpoints.
  pub counts: HashMap<Viewpoint, u32>,
  /// Bias-comparison attempts, however many tags each carried.
  pub attempts: u32,
}

#[async_trait]
pub trait HistoryReader: Send + Sync {
  /// Attempts submitted strictly after `since`, in any order.
  async fn attempts_since(&self, user_id: &str, since: DateTime<Utc>) -> EngineResult<Vec<StoredAttempt>>;
}

#[async_trait]
pub trait CandidatePool: Send + Sync {
  /// Active, unexpired challenges at `now`.
  async fn active(&self, now: DateTime<Utc>) -> EngineResult<Vec<ChallengeCandidate>>;
}

#[async_trait]
pub trait ExposureReader: Send + Sync {
  /// Bias-comparison attempts and their viewpoint tags, strictly after `since`.
  async fn exposure_since(&self, user_id: &str, since: DateTime<Utc>) -> EngineResult<ViewpointExposure>;

  /// Self-reported lean in [-1, 1] (negative = left), if the user gave one.
  async fn political_lean(&self, user_id: &str) -> EngineResult<Option<f64>>;
}

#[async_trait]
pub trait DailySelectionStore: Send + Sync {
  /// Return the selection for `(user_id, day)`, running `compute` to create it
  /// only if absent. Concurrent callers for the same key observe one record.
  /// The flag is true when this call created it.
  async fn get_or_create<'a>(
    &'a self,
    user_id: &'a str,
    day: NaiveDate,
    compute: BoxFuture<'a, EngineResult<DailySelection>>,
  ) -> EngineResult<(DailySelection, bool)>;
}

type SelectionKey = (String, NaiveDate);

/// In-memory stores keyed the way a relational schema would be.
#[derive(Default)]
pub struct MemoryStore {
  attempts: RwLock<HashMap<String, Vec<StoredAttempt>>>,
  candidates: RwLock<HashMap<String, ChallengeCandidate>>,
  leans: RwLock<HashMap<String, f64>>,
  // One cell per (user, day); the cell does the insert-if-absent.
  selections: Mutex<HashMap<SelectionKey, Arc<OnceCell<DailySelection>>>>,
}

impl MemoryStore {
  pub fn new() -> Self { Self::default() }

  /// Append an attempt. Attempts are never mutated or deleted.
  #[instrument(level = "debug", skip(self, attempt), fields(user_id = %attempt.user_id, challenge_id = %attempt.challenge_id))]
  pub async fn record_attempt(&self, attempt: StoredAttempt) {
    self.attempts.write().await.entry(attempt.user_id.clone()).or_default().push(attempt);
  }

  /// Publish a candidate. Ids are unique; republishing an id is ignored.
  pub async fn publish(&self, candidate: ChallengeCandidate) -> bool {
    let mut map = self.candidates.write().await;
    if map.contains_key(&candidate.id) {
      return false;
    }
    map.insert(candidate.id.clone(), candidate);
    true
  }

  pub async fn get_candidate(&self, id: &str) -> Option<ChallengeCandidate> {
    self.candidates.read().await.get(id).cloned()
  }

  pub async fn set_political_lean(&self, user_id: &str, lean: f64) {
    self.leans.write().await.insert(user_id.to_string(), lean.clamp(-1.0, 1.0));
  }

  /// Stored selection for a key, if one was created. Test/inspection helper.
  pub fn selection(&self, user_id: &str, day: NaiveDate) -> Option<DailySelection> {
    let map = self.selections.lock().ok()?;
    map.get(&(user_id.to_string(), day)).and_then(|cell| cell.get().cloned())
  }

  fn selection_cell(&self, user_id: &str, day: NaiveDate) -> EngineResult<Arc<OnceCell<DailySelection>>> {
    let mut map = self
      .selections
      .lock()
      .map_err(|_| EngineError::DataUnavailable("selection store lock poisoned".into()))?;
    Ok(map.entry((user_id.to_string(), day)).or_default().clone())
  }

  /// Drop a cell whose compute failed, unless another caller still holds it
  /// (that caller may yet fill it). Clones are only handed out under the map
  /// lock, so the count checked here cannot grow underneath us.
  fn evict_failed_cell(&self, user_id: &str, day: NaiveDate, cell: &Arc<OnceCell<DailySelection>>) {
    let Ok(mut map) = self.selections.lock() else { return };
    let key = (user_id.to_string(), day);
    let unused = map
      .get(&key)
      .map_or(false, |held| Arc::ptr_eq(held, cell) && !held.initialized() && Arc::strong_count(held) == 2);
    if unused {
      map.remove(&key);
    }
  }

  #[cfg(test)]
  fn selection_cells(&self) -> usize {
    self.selections.lock().map(|m| m.len()).unwrap_or(0)
  }
}

#[async_trait]
impl HistoryReader for MemoryStore {
  async fn attempts_since(&self, user_id: &str, since: DateTime<Utc>) -> EngineResult<Vec<StoredAttempt>> {
    let map = self.attempts.read().await;
    Ok(
      map
        .get(user_id)
        .map(|rows| rows.iter().filter(|a| a.submitted_at > since).cloned().collect())
        .unwrap_or_default(),
    )
  }
}

#[async_trait]
impl CandidatePool for MemoryStore {
  async fn active(&self, now: DateTime<Utc>) -> EngineResult<Vec<ChallengeCandidate>> {
    let map = self.candidates.read().await;
    let mut out: Vec<ChallengeCandidate> = map.values().filter(|c| c.is_available(now)).cloned().collect();
    out.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(out)
  }
}

#[async_trait]
impl ExposureReader for MemoryStore {
  async fn exposure_since(&self, user_id: &str, since: DateTime<Utc>) -> EngineResult<ViewpointExposure> {
    let rows = self.attempts_since(user_id, since).await?;
    let mut seen = ViewpointExposure::default();
    for rec in decode_attempts(&rows) {
      if !rec.challenge_type.is_bias_comparison() {
        continue;
      }
      seen.attempts += 1;
      for vp in rec.viewpoints {
        *seen.counts.entry(vp).or_insert(0) += 1;
      }
    }
    Ok(seen)
  }

  async fn political_lean(&self, user_id: &str) -> EngineResult<Option<f64>> {
    Ok(self.leans.read().await.get(user_id).copied())
  }
}

#[async_trait]
impl DailySelectionStore for MemoryStore {
  async fn get_or_create<'a>(
    &'a self,
    user_id: &'a str,
    day: NaiveDate,
    compute: BoxFuture<'a, EngineResult<DailySelection>>,
  ) -> EngineResult<(DailySelection, bool)> {
    let cell = self.selection_cell(user_id, day)?;
    let created = AtomicBool::new(false);
    let selection = match cell
      .get_or_try_init(|| {
        created.store(true, Ordering::SeqCst);
        compute
      })
      .await
    {
      Ok(selection) => selection.clone(),
      Err(e) => {
        self.evict_failed_cell(user_id, day, &cell);
        return Err(e);
      }
    };
    let created = created.load(Ordering::SeqCst);
    if !created {
      debug!(target: "selection", %user_id, %day, challenge_id = %selection.challenge.id, "Daily selection already exists");
    }
    Ok((selection, created))
  }
}
