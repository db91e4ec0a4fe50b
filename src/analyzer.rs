//! Performance analysis: turns a user's attempt history into a profile.
//!
//! The profile is a pure function of history plus "now". Nothing is cached or
//! persisted here; every call re-reads the overall window.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, error, instrument};

use crate::config::EngineConfig;
use crate::domain::{decode_attempts, AttemptRecord, ChallengeType, Difficulty};
use crate::error::EngineResult;
use crate::store::HistoryReader;

/// Correct over total. Zero attempts means "undefined", never 0%.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SuccessRate {
  pub correct: u32,
  pub total: u32,
}

impl SuccessRate {
  pub fn record(&mut self, correct: bool) {
    self.total += 1;
    if correct {
      self.correct += 1;
    }
  }

  pub fn value(&self) -> Option<f64> {
    if self.total == 0 { None } else { Some(self.correct as f64 / self.total as f64) }
  }
}

#[derive(Clone, Debug, PartialEq)]
pub struct UserPerformanceProfile {
  pub user_id: String,
  pub computed_at: DateTime<Utc>,
  /// Overall window (30 days by default).
  pub overall: SuccessRate,
  /// Recent window (14 days by default).
  pub recent: SuccessRate,
  /// Types never tried are absent, not zero.
  pub by_type: HashMap<ChallengeType, SuccessRate>,
  pub by_difficulty: HashMap<Difficulty, SuccessRate>,
  pub streak_days: u32,
  /// Mean actual/estimated time per type.
  pub time_ratio_by_type: HashMap<ChallengeType, f64>,
  /// Highest difficulty attempted in the recent window, else in the overall
  /// window; `Beginner` with no history. A single easier attempt can't lower it.
  pub ceiling_difficulty: Difficulty,
  /// Types of completed attempts, newest first.
  pub recent_types: Vec<ChallengeType>,
  /// Attempts per challenge id inside the overall window only; older
  /// presentations are not counted.
  pub presentations: HashMap<String, u32>,
  pub last_seen: HashMap<String, DateTime<Utc>>,
}

impl UserPerformanceProfile {
  pub fn attempt_count(&self) -> usize { self.overall.total as usize }

  pub fn type_rate(&self, t: ChallengeType) -> Option<f64> {
    self.by_type.get(&t).and_then(SuccessRate::value)
  }

  pub fn presentations_of(&self, challenge_id: &str) -> u32 {
    self.presentations.get(challenge_id).copied().unwrap_or(0)
  }

  /// True when the challenge was attempted strictly after `since`.
  pub fn seen_since(&self, challenge_id: &str, since: DateTime<Utc>) -> bool {
    self.last_seen.get(challenge_id).map_or(false, |at| *at > since)
  }
}

pub struct PerformanceAnalyzer {
  history: Arc<dyn HistoryReader>,
  config: Arc<EngineConfig>,
}

impl PerformanceAnalyzer {
  pub fn new(history: Arc<dyn HistoryReader>, config: Arc<EngineConfig>) -> Self {
    Self { history, config }
  }

  /// Read the overall window and derive the profile. A history failure is
  /// returned as-is: an unreadable history is not a new user.
  #[instrument(level = "debug", skip(self), fields(%user_id))]
  pub async fn analyze(&self, user_id: &str, now: DateTime<Utc>) -> EngineResult<UserPerformanceProfile> {
    let since = now - self.config.windows.overall();
    let rows = self.history.attempts_since(user_id, since).await.map_err(|e| {
      error!(target: "engine", %user_id, error = %e, "History read failed");
      e
    })?;
    let records: Vec<AttemptRecord> = decode_attempts(&rows).into_iter().filter(|r| r.submitted_at <= now).collect();
    let profile = build_profile(user_id, &records, now, &self.config);
    debug!(
      target: "engine",
      %user_id,
      attempts = profile.attempt_count(),
      overall = ?profile.overall.value(),
      recent = ?profile.recent.value(),
      streak = profile.streak_days,
      "Performance profile computed"
    );
    Ok(profile)
  }
}

/// Pure profile computation over already-decoded records inside the overall window.
pub fn build_profile(user_id: &str, records: &[AttemptRecord], now: DateTime<Utc>, config: &EngineConfig) -> UserPerformanceProfile {
  let recent_since = now - config.windows.recent();

  let mut ordered: Vec<&AttemptRecord> = records.iter().collect();
  ordered.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at).then_with(|| a.challenge_id.cmp(&b.challenge_id)));

  let mut overall = SuccessRate::default();
  let mut recent = SuccessRate::default();
  let mut by_type: HashMap<ChallengeType, SuccessRate> = HashMap::new();
  let mut by_difficulty: HashMap<Difficulty, SuccessRate> = HashMap::new();
  let mut ratio_sums: HashMap<ChallengeType, (f64, u32)> = HashMap::new();
  let mut presentations: HashMap<String, u32> = HashMap::new();
  let mut last_seen: HashMap<String, DateTime<Utc>> = HashMap::new();
  let mut active_days: BTreeSet<NaiveDate> = BTreeSet::new();
  let mut recent_ceiling: Option<Difficulty> = None;
  let mut overall_ceiling: Option<Difficulty> = None;

  for rec in &ordered {
    overall.record(rec.correct);
    overall_ceiling = overall_ceiling.max(Some(rec.difficulty));
    if rec.submitted_at > recent_since {
      recent.record(rec.correct);
      recent_ceiling = recent_ceiling.max(Some(rec.difficulty));
    }
    by_type.entry(rec.challenge_type).or_default().record(rec.correct);
    by_difficulty.entry(rec.difficulty).or_default().record(rec.correct);
    if let Some(ratio) = rec.time_ratio() {
      let slot = ratio_sums.entry(rec.challenge_type).or_insert((0.0, 0));
      slot.0 += ratio;
      slot.1 += 1;
    }
    *presentations.entry(rec.challenge_id.clone()).or_insert(0) += 1;
    // Newest first, so the first sighting is the latest.
    last_seen.entry(rec.challenge_id.clone()).or_insert(rec.submitted_at);
    active_days.insert(rec.submitted_at.date_naive());
  }

  let time_ratio_by_type = ratio_sums
    .into_iter()
    .map(|(t, (sum, n))| (t, sum / n as f64))
    .collect();

  UserPerformanceProfile {
    user_id: user_id.to_string(),
    computed_at: now,
    overall,
    recent,
    by_type,
    by_difficulty,
    streak_days: streak_days(&active_days, now.date_naive()),
    time_ratio_by_type,
    ceiling_difficulty: recent_ceiling.or(overall_ceiling).unwrap_or_default(),
    recent_types: ordered.iter().map(|r| r.challenge_type).collect(),
    presentations,
    last_seen,
  }
}

/// Consecutive active days ending today, or yesterday when today has nothing
/// yet (today's challenge may still be done).
pub fn streak_days(active_days: &BTreeSet<NaiveDate>, today: NaiveDate) -> u32 {
  let mut cursor = match today.pred_opt() {
    _ if active_days.contains(&today) => today,
    Some(yesterday) if active_days.contains(&yesterday) => yesterday,
    _ => return 0,
  };
  let mut streak = 0;
  while active_days.contains(&cursor) {
    streak += 1;
    cursor = match cursor.pred_opt() {
      Some(prev) => prev,
      None => break,
    };
  }
  streak
}
