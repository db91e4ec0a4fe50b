//! Public protocol structs for the HTTP host (serde ready).
//! Keep this small and stable so the engine types can evolve independently.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{ChallengeCandidate, ChallengeType, Difficulty, Viewpoint};
use crate::store::{DailySelection, SelectionOrigin};

/// DTO used for every challenge delivery.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeOut {
    pub id: String,
    #[serde(rename = "type")]
    pub challenge_type: ChallengeType,
    pub difficulty: Difficulty,
    pub estimated_seconds: u32,
    pub viewpoints: Vec<Viewpoint>,
}

/// Convert a candidate (internal) to the public DTO.
pub fn to_out(c: &ChallengeCandidate) -> ChallengeOut {
    ChallengeOut {
        id: c.id.clone(),
        challenge_type: c.challenge_type,
        difficulty: c.difficulty,
        estimated_seconds: c.estimated_seconds,
        viewpoints: c.viewpoints.clone(),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyChallengeOut {
    pub challenge: ChallengeOut,
    pub day: NaiveDate,
    pub origin: SelectionOrigin,
    pub reasons: Vec<String>,
}

impl From<&DailySelection> for DailyChallengeOut {
    fn from(sel: &DailySelection) -> Self {
        Self {
            challenge: to_out(&sel.challenge),
            day: sel.day,
            origin: sel.origin,
            reasons: sel.reasons.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RecommendQuery {
    pub count: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecommendationsOut {
    pub challenges: Vec<ChallengeOut>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptIn {
    pub user_id: String,
    pub challenge_id: String,
    pub correct: bool,
    pub time_spent_seconds: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AttemptOut {
    pub id: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorOut {
    pub error: String,
    pub kind: String,
}
