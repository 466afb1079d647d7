use std::future::Future;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};
use shared::{
    error::{Result, VotingError},
    models::*,
    validation::{validate_candidate_id, validate_voter_id},
    MAX_VOTES_PER_VOTER,
};
use crate::store::{CastOutcome, StoreError, VoteStore};

/// Extra attempts after a transient storage conflict.
pub const MAX_STORE_RETRIES: u32 = 3;
const RETRY_BACKOFF_MS: u64 = 20;

impl From<StoreError> for VotingError {
    fn from(e: StoreError) -> Self {
        VotingError::StorageUnavailable(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Audit {
    pub total_tallied: u64,
    pub total_cast: u64,
    pub voters: usize,
}

impl Audit {
    /// Every counted vote moved exactly one tally and one voter counter.
    pub fn is_conserved(&self) -> bool {
        self.total_tallied == self.total_cast
    }
}

/// Voting rules over a [`VoteStore`]. Holds no state of its own: every call
/// reads and writes storage.
#[derive(Clone)]
pub struct VotingService {
    store: Arc<dyn VoteStore>,
}

impl VotingService {
    pub fn new(store: Arc<dyn VoteStore>) -> Self {
        Self { store }
    }

    /// Seeds the candidate set. Run once at process start; safe to repeat.
    pub async fn bootstrap(&self, candidates: &[&str]) -> Result<Tallies> {
        let inserted = self.with_retry("seed", || self.store.seed_candidates(candidates)).await?;
        if inserted > 0 {
            info!("🌱 Seeded {} candidates", inserted);
        }

        let tallies = self.get_tallies().await?;
        if tallies.is_empty() {
            return Err(VotingError::StorageUnavailable(
                "candidate set is empty after seeding".into(),
            ));
        }
        Ok(tallies)
    }

    pub async fn get_tallies(&self) -> Result<Tallies> {
        self.with_retry("tallies", || self.store.tallies()).await
    }

    /// A missing or blank voter id reads as zero votes used.
    pub async fn get_voter_status(&self, voter_id: Option<&str>) -> Result<u32> {
        let Ok(voter_id) = validate_voter_id(voter_id) else {
            return Ok(0);
        };
        self.with_retry("voter_status", || self.store.votes_cast(voter_id)).await
    }

    pub async fn cast_vote(
        &self,
        voter_id: Option<&str>,
        candidate_id: Option<&str>,
    ) -> Result<VoteReceipt> {
        let voter_id = validate_voter_id(voter_id)?;

        // A voter at the cap hears about the cap even when the candidate is malformed.
        let candidate_id = match validate_candidate_id(candidate_id) {
            Ok(id) => id,
            Err(e) => {
                let votes_cast = self.with_retry("voter_status", || self.store.votes_cast(voter_id)).await?;
                if votes_cast >= MAX_VOTES_PER_VOTER {
                    return Err(VotingError::VoteLimitExceeded { remaining: 0 });
                }
                return Err(e);
            }
        };

        let outcome = self
            .with_retry("cast_vote", || {
                self.store.record_vote(voter_id, candidate_id, MAX_VOTES_PER_VOTER)
            })
            .await?;

        match outcome {
            CastOutcome::Recorded(receipt) => {
                debug!(
                    "Vote for {} recorded ({} of {} used)",
                    candidate_id, receipt.votes_used, MAX_VOTES_PER_VOTER
                );
                Ok(receipt)
            }
            CastOutcome::LimitReached(voter) => {
                debug!("Voter at limit ({} votes cast)", voter.votes_cast);
                Err(VotingError::VoteLimitExceeded {
                    remaining: voter.remaining(),
                })
            }
            CastOutcome::UnknownCandidate => {
                Err(VotingError::UnknownCandidate(candidate_id.to_string()))
            }
        }
    }

    pub async fn admin_reset(&self) -> Result<()> {
        self.with_retry("reset", || self.store.reset()).await?;
        warn!("🧹 All votes have been reset");
        Ok(())
    }

    pub async fn audit(&self) -> Result<Audit> {
        let snapshot = self.with_retry("audit", || self.store.snapshot()).await?;
        Ok(Audit {
            total_tallied: snapshot.tallies.values().map(|&c| u64::from(c)).sum(),
            total_cast: snapshot.voters.iter().map(|v| u64::from(v.votes_cast)).sum(),
            voters: snapshot.voters.len(),
        })
    }

    async fn with_retry<T, F, Fut>(&self, op: &str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, StoreError>>,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && retries < MAX_STORE_RETRIES => {
                    retries += 1;
                    warn!("{} conflicted, retry {}/{}: {}", op, retries, MAX_STORE_RETRIES, e);
                    sleep(Duration::from_millis(RETRY_BACKOFF_MS * u64::from(retries))).await;
                }
                Err(e) => {
                    error!("{} failed: {}", op, e);
                    return Err(e.into());
                }
            }
        }
    }
}
