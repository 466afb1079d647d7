//! Postgres-backed [`VoteStore`].
//!
//! Concurrency rests on two things Postgres already gives us:
//!
//! - A conditional `UPDATE ... WHERE votes_cast < $cap` takes the voter's row
//!   lock and re-checks the predicate against the latest committed row, so
//!   concurrent casts for one voter queue on that lock and the cap cannot be
//!   overshot. Casts for different voters only meet on the tally row, and only
//!   for the few microseconds of the increment.
//! - `reset` takes both tables in `ACCESS EXCLUSIVE` mode, so it waits for
//!   in-flight casts to commit and holds new ones until it is done.

use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Transaction};
use tracing::{debug, error, info};
use shared::models::*;
use crate::store::{CastOutcome, StoreError, StoreSnapshot, VoteStore};

const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

fn map_db_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &e {
        if let Some(code) = db_err.code() {
            if code == SERIALIZATION_FAILURE || code == DEADLOCK_DETECTED {
                debug!("Transaction conflict ({}): {}", code, db_err.message());
                return StoreError::Conflict(db_err.message().to_string());
            }
        }
    }
    error!("Database error: {}", e);
    StoreError::Unavailable(e.to_string())
}

fn to_count(value: i32) -> Result<u32, StoreError> {
    u32::try_from(value)
        .map_err(|_| StoreError::Unavailable(format!("negative counter in storage: {}", value)))
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(map_db_error)?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(map_db_error)?;

        info!("Database connection verified");
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        self.pool.begin().await.map_err(map_db_error)
    }
}

#[rocket::async_trait]
impl VoteStore for PgStore {
    async fn seed_candidates(&self, candidates: &[&str]) -> Result<usize, StoreError> {
        let mut tx = self.begin().await?;
        let mut inserted = 0;

        for id in candidates {
            let result = sqlx::query(
                "INSERT INTO candidate_tallies (id, count) VALUES ($1, 0)
                 ON CONFLICT (id) DO NOTHING"
            )
            .bind(*id)
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;
            inserted += result.rows_affected() as usize;
        }

        tx.commit().await.map_err(map_db_error)?;
        Ok(inserted)
    }

    async fn tallies(&self) -> Result<Tallies, StoreError> {
        let rows = sqlx::query_as::<_, CandidateTally>(
            "SELECT id, count FROM candidate_tallies ORDER BY id"
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(rows.into_iter().map(|row| (row.id, row.count)).collect())
    }

    async fn votes_cast(&self, voter_id: &str) -> Result<u32, StoreError> {
        let votes = sqlx::query_scalar::<_, i32>("SELECT votes_cast FROM voters WHERE id = $1")
            .bind(voter_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;

        votes.map(to_count).transpose().map(Option::unwrap_or_default)
    }

    async fn record_vote(
        &self,
        voter_id: &str,
        candidate_id: &str,
        max_votes: u32,
    ) -> Result<CastOutcome, StoreError> {
        let cap = i32::try_from(max_votes)
            .map_err(|_| StoreError::Unavailable(format!("vote cap out of range: {}", max_votes)))?;
        let mut tx = self.begin().await?;

        sqlx::query(
            "INSERT INTO voters (id, votes_cast) VALUES ($1, 0)
             ON CONFLICT (id) DO NOTHING"
        )
        .bind(voter_id)
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;

        let votes_used = sqlx::query_scalar::<_, i32>(
            "UPDATE voters SET votes_cast = votes_cast + 1
             WHERE id = $1 AND votes_cast < $2
             RETURNING votes_cast"
        )
        .bind(voter_id)
        .bind(cap)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_db_error)?;

        let Some(votes_used) = votes_used else {
            let voter = sqlx::query_as::<_, Voter>("SELECT id, votes_cast FROM voters WHERE id = $1")
                .bind(voter_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(map_db_error)?;
            tx.rollback().await.map_err(map_db_error)?;
            return Ok(CastOutcome::LimitReached(voter));
        };

        let new_count = sqlx::query_scalar::<_, i32>(
            "UPDATE candidate_tallies SET count = count + 1
             WHERE id = $1
             RETURNING count"
        )
        .bind(candidate_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_db_error)?;

        let Some(new_count) = new_count else {
            tx.rollback().await.map_err(map_db_error)?;
            return Ok(CastOutcome::UnknownCandidate);
        };

        tx.commit().await.map_err(map_db_error)?;

        Ok(CastOutcome::Recorded(VoteReceipt {
            candidate_id: candidate_id.to_string(),
            new_count: to_count(new_count)?,
            votes_used: to_count(votes_used)?,
        }))
    }

    async fn reset(&self) -> Result<(), StoreError> {
        let mut tx = self.begin().await?;

        sqlx::query("LOCK TABLE voters, candidate_tallies IN ACCESS EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;

        let removed = sqlx::query("DELETE FROM voters")
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?
            .rows_affected();

        sqlx::query("UPDATE candidate_tallies SET count = 0")
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;

        tx.commit().await.map_err(map_db_error)?;
        info!("Reset removed {} voters", removed);
        Ok(())
    }

    async fn snapshot(&self) -> Result<StoreSnapshot, StoreError> {
        let mut tx = self.begin().await?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;

        let tallies = sqlx::query_as::<_, CandidateTally>(
            "SELECT id, count FROM candidate_tallies ORDER BY id"
        )
        .fetch_all(&mut *tx)
        .await
        .map_err(map_db_error)?
        .into_iter()
        .map(|row| (row.id, row.count))
        .collect();

        let voters = sqlx::query_as::<_, Voter>("SELECT id, votes_cast FROM voters ORDER BY id")
            .fetch_all(&mut *tx)
            .await
            .map_err(map_db_error)?;

        tx.commit().await.map_err(map_db_error)?;
        Ok(StoreSnapshot { tallies, voters })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use shared::{CANDIDATES, MAX_VOTES_PER_VOTER};

    // `reset` wipes every row, so the database tests take turns.
    static DB_LOCK: Mutex<()> = Mutex::const_new(());

    async fn store() -> PgStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let store = PgStore::connect(&url, 20).await.unwrap();
        store.migrate().await.unwrap();
        store.seed_candidates(&CANDIDATES).await.unwrap();
        store
    }

    #[tokio::test]
    #[ignore] // Only run with database available
    async fn test_seed_is_idempotent() {
        let _guard = DB_LOCK.lock().await;
        let store = store().await;
        assert_eq!(store.seed_candidates(&CANDIDATES).await.unwrap(), 0);
        assert_eq!(store.tallies().await.unwrap().len(), CANDIDATES.len());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore] // Only run with database available
    async fn test_concurrent_casts_respect_cap() {
        let _guard = DB_LOCK.lock().await;
        let store = Arc::new(store().await);
        let voter = format!("pg-test-{}", uuid::Uuid::new_v4());

        let handles: Vec<_> = (0..12)
            .map(|_| {
                let store = store.clone();
                let voter = voter.clone();
                tokio::spawn(async move {
                    store.record_vote(&voter, "jon", MAX_VOTES_PER_VOTER).await
                })
            })
            .collect();

        let mut recorded = 0;
        for handle in handles {
            if let Ok(CastOutcome::Recorded(_)) = handle.await.unwrap() {
                recorded += 1;
            }
        }

        assert_eq!(recorded, MAX_VOTES_PER_VOTER);
        assert_eq!(store.votes_cast(&voter).await.unwrap(), MAX_VOTES_PER_VOTER);
    }

    #[tokio::test]
    #[ignore] // Only run with database available
    async fn test_unknown_candidate_leaves_no_voter_row() {
        let _guard = DB_LOCK.lock().await;
        let store = store().await;
        let voter = format!("pg-test-{}", uuid::Uuid::new_v4());

        let outcome = store.record_vote(&voter, "drogo", MAX_VOTES_PER_VOTER).await.unwrap();
        assert_eq!(outcome, CastOutcome::UnknownCandidate);

        let snapshot = store.snapshot().await.unwrap();
        assert!(snapshot.voters.iter().all(|v| v.id != voter));
    }

    #[tokio::test]
    #[ignore] // Only run with database available
    async fn test_limit_reached_rolls_back() {
        let _guard = DB_LOCK.lock().await;
        let store = store().await;
        let voter = format!("pg-test-{}", uuid::Uuid::new_v4());

        for _ in 0..MAX_VOTES_PER_VOTER {
            let outcome = store.record_vote(&voter, "dany", MAX_VOTES_PER_VOTER).await.unwrap();
            assert!(matches!(outcome, CastOutcome::Recorded(_)));
        }
        let before = store.tallies().await.unwrap();

        let outcome = store.record_vote(&voter, "tywin", MAX_VOTES_PER_VOTER).await.unwrap();
        let CastOutcome::LimitReached(stored) = outcome else {
            panic!("expected LimitReached, got {:?}", outcome);
        };
        assert_eq!(stored.id, voter);
        assert_eq!(stored.votes_cast, MAX_VOTES_PER_VOTER);

        assert_eq!(store.tallies().await.unwrap(), before);
        assert_eq!(store.votes_cast(&voter).await.unwrap(), MAX_VOTES_PER_VOTER);
    }

    #[tokio::test]
    #[ignore] // Only run with database available
    async fn test_reset_clears_voters_and_tallies() {
        let _guard = DB_LOCK.lock().await;
        let store = store().await;
        let voter = format!("pg-test-{}", uuid::Uuid::new_v4());

        store.record_vote(&voter, "arya", MAX_VOTES_PER_VOTER).await.unwrap();
        store.record_vote(&voter, "sansa", MAX_VOTES_PER_VOTER).await.unwrap();

        store.reset().await.unwrap();

        let snapshot = store.snapshot().await.unwrap();
        assert!(snapshot.voters.is_empty());
        assert_eq!(snapshot.tallies.len(), CANDIDATES.len());
        assert!(snapshot.tallies.values().all(|&count| count == 0));
        assert_eq!(store.votes_cast(&voter).await.unwrap(), 0);
    }
}
