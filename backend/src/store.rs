use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::error;
use shared::models::*;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Transient contention on a row or table lock.
    #[error("Transaction conflict: {0}")]
    Conflict(String),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CastOutcome {
    Recorded(VoteReceipt),
    /// The voter as stored; nothing was written.
    LimitReached(Voter),
    UnknownCandidate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSnapshot {
    pub tallies: Tallies,
    pub voters: Vec<Voter>,
}

/// Durable home of voters and candidate tallies.
///
/// `record_vote` is the one read-modify-write in the system: the cap check,
/// the voter increment and the tally increment commit together or not at all,
/// and calls for the same voter are linearized. `reset` never interleaves with
/// a `record_vote` commit.
#[rocket::async_trait]
pub trait VoteStore: Send + Sync {
    /// Inserts missing candidates at zero and returns how many were new.
    async fn seed_candidates(&self, candidates: &[&str]) -> Result<usize, StoreError>;

    async fn tallies(&self) -> Result<Tallies, StoreError>;

    /// Zero for a voter with no record.
    async fn votes_cast(&self, voter_id: &str) -> Result<u32, StoreError>;

    async fn record_vote(
        &self,
        voter_id: &str,
        candidate_id: &str,
        max_votes: u32,
    ) -> Result<CastOutcome, StoreError>;

    /// Zeroes every tally and removes every voter.
    async fn reset(&self) -> Result<(), StoreError>;

    async fn snapshot(&self) -> Result<StoreSnapshot, StoreError>;
}

#[derive(Debug, Default)]
struct Tables {
    tallies: Tallies,
    voters: HashMap<String, u32>,
}

/// Process-local store. Every operation is a single short critical section
/// over both tables, so all operations are linearizable.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables.lock().map_err(|e| {
            error!("Failed to acquire store lock: {}", e);
            StoreError::Unavailable("store lock poisoned".into())
        })
    }
}

#[rocket::async_trait]
impl VoteStore for MemoryStore {
    async fn seed_candidates(&self, candidates: &[&str]) -> Result<usize, StoreError> {
        let mut tables = self.lock()?;
        let mut inserted = 0;
        for id in candidates {
            if !tables.tallies.contains_key(*id) {
                tables.tallies.insert(id.to_string(), 0);
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn tallies(&self) -> Result<Tallies, StoreError> {
        Ok(self.lock()?.tallies.clone())
    }

    async fn votes_cast(&self, voter_id: &str) -> Result<u32, StoreError> {
        Ok(self.lock()?.voters.get(voter_id).copied().unwrap_or(0))
    }

    async fn record_vote(
        &self,
        voter_id: &str,
        candidate_id: &str,
        max_votes: u32,
    ) -> Result<CastOutcome, StoreError> {
        let mut tables = self.lock()?;

        let votes_cast = tables.voters.get(voter_id).copied().unwrap_or(0);
        if votes_cast >= max_votes {
            return Ok(CastOutcome::LimitReached(Voter {
                id: voter_id.to_string(),
                votes_cast,
            }));
        }

        let Some(count) = tables.tallies.get_mut(candidate_id) else {
            return Ok(CastOutcome::UnknownCandidate);
        };
        *count += 1;
        let new_count = *count;

        let votes_used = votes_cast + 1;
        tables.voters.insert(voter_id.to_string(), votes_used);

        Ok(CastOutcome::Recorded(VoteReceipt {
            candidate_id: candidate_id.to_string(),
            new_count,
            votes_used,
        }))
    }

    async fn reset(&self) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        tables.voters.clear();
        tables.tallies.values_mut().for_each(|count| *count = 0);
        Ok(())
    }

    async fn snapshot(&self) -> Result<StoreSnapshot, StoreError> {
        let tables = self.lock()?;
        let mut voters: Vec<Voter> = tables.voters
            .iter()
            .map(|(id, &votes_cast)| Voter { id: id.clone(), votes_cast })
            .collect();
        voters.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(StoreSnapshot {
            tallies: tables.tallies.clone(),
            voters,
        })
    }
}
