use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;
use crate::candidates::MAX_VOTES_PER_VOTER;

/// Candidate id to current count, ordered by id.
pub type Tallies = BTreeMap<String, u32>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "backend", derive(sqlx::FromRow))]
pub struct Voter {
    pub id: String,
    #[cfg_attr(feature = "backend", sqlx(try_from = "i32"))]
    pub votes_cast: u32,
}

impl Voter {
    pub fn remaining(&self) -> u32 {
        MAX_VOTES_PER_VOTER.saturating_sub(self.votes_cast)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "backend", derive(sqlx::FromRow))]
pub struct CandidateTally {
    pub id: String,
    #[cfg_attr(feature = "backend", sqlx(try_from = "i32"))]
    pub count: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub character_id: Option<String>,
    pub voter_id: Option<String>,
}

/// Result of a successful cast: both counters after the increment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteReceipt {
    pub candidate_id: String,
    pub new_count: u32,
    pub votes_used: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoteResponse {
    pub success: bool,
    pub new_count: u32,
    pub votes_used: u32,
}

impl From<VoteReceipt> for VoteResponse {
    fn from(receipt: VoteReceipt) -> Self {
        Self {
            success: true,
            new_count: receipt.new_count,
            votes_used: receipt.votes_used,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoterStatus {
    pub votes_used: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResetResponse {
    pub message: String,
}
