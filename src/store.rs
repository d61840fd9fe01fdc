// Reservation persistence
// The uniqueness of (room_id, starting day) is enforced here, by the store itself, so that
// concurrent bookings for the same key cannot both succeed regardless of any pre-check.

use std::{
    collections::HashSet,
    sync::atomic::{AtomicI64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::{mapref::entry::Entry, DashMap};
use serde::Deserialize;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use thiserror::Error;
use tracing::{debug, info};

use crate::model::{Deadline, NewReservation, Reservation, ReservationId, RoomId};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Reservation for room {room_id} on {date} already exists")]
    Conflict { room_id: RoomId, date: NaiveDate },

    #[error("Store deadline exceeded")]
    DeadlineExceeded,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait ReservationStore: Send + Sync + 'static {
    async fn has_conflict(
        &self,
        room_id: RoomId,
        date: NaiveDate,
        deadline: Deadline,
    ) -> Result<bool, StoreError>;

    // Fails with StoreError::Conflict when the (room_id, starting day) key is taken
    async fn insert(
        &self,
        reservation: &NewReservation,
        deadline: Deadline,
    ) -> Result<ReservationId, StoreError>;

    /// Hard-deletes a reservation, returning the number of rows removed.
    async fn delete(&self, id: ReservationId, deadline: Deadline) -> Result<u64, StoreError>;

    /// Rooms holding a reservation whose starting day is on or after `date`.
    async fn select_conflicting_room_ids(
        &self,
        date: NaiveDate,
        deadline: Deadline,
    ) -> Result<HashSet<RoomId>, StoreError>;

    // Releases connections; the store is not used afterwards
    async fn close(&self) {}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/reservations".to_string(),
            max_connections: 10,
            connect_timeout_ms: 5000,
        }
    }
}

const CREATE_TABLE: &str = r"
    CREATE TABLE IF NOT EXISTS reservations (
        id BIGSERIAL PRIMARY KEY,
        room_id BIGINT NOT NULL,
        starting_date DATE NOT NULL,
        end_date DATE NOT NULL,
        CHECK (starting_date <= end_date)
    )
";

const CREATE_UNIQUE_INDEX: &str = r"
    CREATE UNIQUE INDEX IF NOT EXISTS reservations_room_starting_date_key
        ON reservations (room_id, starting_date)
";

#[derive(Clone)]
pub struct PgReservationStore {
    pool: PgPool,
}

impl PgReservationStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_millis(config.connect_timeout_ms))
            .connect(&config.url)
            .await?;

        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // Idempotent, safe to run on every start
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_UNIQUE_INDEX).execute(&self.pool).await?;
        info!("reservations schema ready");
        Ok(())
    }

    async fn insert_in_tx(
        &self,
        reservation: &NewReservation,
        deadline: Deadline,
    ) -> Result<ReservationId, StoreError> {
        let mut tx = self.pool.begin().await?;

        // server-side bound, so an abandoned insert does not keep running
        let budget_ms = deadline.remaining().as_millis().max(1);
        sqlx::query(&format!("SET LOCAL statement_timeout = {budget_ms}"))
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query(
            "INSERT INTO reservations (room_id, starting_date, end_date)
             VALUES ($1, $2, $3)
             RETURNING id",
        )
        .bind(reservation.room_id)
        .bind(reservation.starting_day())
        .bind(reservation.end_date.date_naive())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.is_unique_violation() {
                    return StoreError::Conflict {
                        room_id: reservation.room_id,
                        date: reservation.starting_day(),
                    };
                }
            }
            StoreError::Database(e)
        })?;

        // dropping `tx` before this point rolls the insert back
        tx.commit().await?;
        Ok(row.try_get("id")?)
    }
}

async fn within<T, F>(deadline: Deadline, fut: F) -> Result<T, StoreError>
where
    F: std::future::Future<Output = Result<T, StoreError>>,
{
    if deadline.is_expired() {
        return Err(StoreError::DeadlineExceeded);
    }
    deadline
        .run(fut)
        .await
        .map_err(|_| StoreError::DeadlineExceeded)?
}

#[async_trait]
impl ReservationStore for PgReservationStore {
    async fn has_conflict(
        &self,
        room_id: RoomId,
        date: NaiveDate,
        deadline: Deadline,
    ) -> Result<bool, StoreError> {
        within(deadline, async {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(
                     SELECT 1 FROM reservations WHERE room_id = $1 AND starting_date = $2
                 )",
            )
            .bind(room_id)
            .bind(date)
            .fetch_one(&self.pool)
            .await?;
            Ok::<_, StoreError>(exists)
        })
        .await
    }

    async fn insert(
        &self,
        reservation: &NewReservation,
        deadline: Deadline,
    ) -> Result<ReservationId, StoreError> {
        within(deadline, self.insert_in_tx(reservation, deadline)).await
    }

    async fn delete(&self, id: ReservationId, deadline: Deadline) -> Result<u64, StoreError> {
        within(deadline, async {
            let result = sqlx::query("DELETE FROM reservations WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok::<_, StoreError>(result.rows_affected())
        })
        .await
    }

    async fn select_conflicting_room_ids(
        &self,
        date: NaiveDate,
        deadline: Deadline,
    ) -> Result<HashSet<RoomId>, StoreError> {
        within(deadline, async {
            let ids: Vec<RoomId> = sqlx::query_scalar(
                "SELECT DISTINCT room_id FROM reservations WHERE starting_date >= $1",
            )
            .bind(date)
            .fetch_all(&self.pool)
            .await?;
            Ok::<_, StoreError>(ids.into_iter().collect())
        })
        .await
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("reservation store closed");
    }
}

/// Process-local store. Uniqueness holds within one process only, so it suits a
/// single-instance deployment or tests, never a multi-instance one.
#[derive(Debug)]
pub struct InMemoryReservationStore {
    by_key: DashMap<(RoomId, NaiveDate), Reservation>,
    keys_by_id: DashMap<ReservationId, (RoomId, NaiveDate)>,
    next_id: AtomicI64,
}

impl Default for InMemoryReservationStore {
    fn default() -> Self {
        Self {
            by_key: DashMap::new(),
            keys_by_id: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }
}

impl InMemoryReservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.keys_by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys_by_id.is_empty()
    }

    pub fn get(&self, id: ReservationId) -> Option<Reservation> {
        let key = *self.keys_by_id.get(&id)?;
        self.by_key.get(&key).map(|r| r.clone())
    }

    fn check(deadline: Deadline) -> Result<(), StoreError> {
        if deadline.is_expired() {
            return Err(StoreError::DeadlineExceeded);
        }
        Ok(())
    }
}

#[async_trait]
impl ReservationStore for InMemoryReservationStore {
    async fn has_conflict(
        &self,
        room_id: RoomId,
        date: NaiveDate,
        deadline: Deadline,
    ) -> Result<bool, StoreError> {
        Self::check(deadline)?;
        Ok(self.by_key.contains_key(&(room_id, date)))
    }

    async fn insert(
        &self,
        reservation: &NewReservation,
        deadline: Deadline,
    ) -> Result<ReservationId, StoreError> {
        Self::check(deadline)?;

        let key = (reservation.room_id, reservation.starting_day());
        // the entry guard holds the shard lock, making check-and-insert atomic per key
        match self.by_key.entry(key) {
            Entry::Occupied(_) => Err(StoreError::Conflict {
                room_id: key.0,
                date: key.1,
            }),
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                slot.insert(reservation.clone().into_reservation(id));
                self.keys_by_id.insert(id, key);
                debug!(id, room_id = key.0, "reservation stored in memory");
                Ok(id)
            }
        }
    }

    async fn delete(&self, id: ReservationId, deadline: Deadline) -> Result<u64, StoreError> {
        Self::check(deadline)?;

        match self.keys_by_id.remove(&id) {
            Some((_, key)) => {
                self.by_key.remove(&key);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn select_conflicting_room_ids(
        &self,
        date: NaiveDate,
        deadline: Deadline,
    ) -> Result<HashSet<RoomId>, StoreError> {
        Self::check(deadline)?;

        Ok(self
            .by_key
            .iter()
            .filter(|entry| entry.key().1 >= date)
            .map(|entry| entry.key().0)
            .collect())
    }
}
