// Reservation data model, request deadlines and the wire contract exposed to gateways

use std::{future::Future, time::Duration};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::{error::Elapsed, Instant};

pub type RoomId = i64;
pub type ReservationId = i64;

/// A persisted booking. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: ReservationId,
    pub room_id: RoomId,
    pub starting_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

// Validated booking that has not been assigned an id yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    pub room_id: RoomId,
    pub starting_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl NewReservation {
    /// Day component of the uniqueness key `(room_id, starting day)`.
    pub fn starting_day(&self) -> NaiveDate {
        self.starting_date.date_naive()
    }

    pub fn into_reservation(self, id: ReservationId) -> Reservation {
        Reservation {
            id,
            room_id: self.room_id,
            starting_date: self.starting_date,
            end_date: self.end_date,
        }
    }
}

/// Room as served by the catalog service. Read-only from the booking side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub room_type: String,
    pub price: f64,
}

/// Absolute point in time after which a request and everything it triggered is abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn at(instant: Instant) -> Self {
        Self(instant)
    }

    pub fn after(budget: Duration) -> Self {
        Self(Instant::now() + budget)
    }

    pub fn instant(&self) -> Instant {
        self.0
    }

    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.0
    }

    pub fn earliest(self, other: Deadline) -> Deadline {
        self.min(other)
    }

    /// Drives `fut` to completion unless the deadline passes first, in which case it is dropped.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, Elapsed>
    where
        F: Future<Output = T>,
    {
        tokio::time::timeout_at(self.0, fut).await
    }
}

/// Per-request metadata propagated from the gateway.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub correlation_id: String,
    pub deadline: Option<Deadline>,
}

impl RequestContext {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = Some(deadline);
        self
    }

    // Inbound deadline, or a fresh one with the given budget when the caller sent none
    pub fn deadline_or(&self, budget: Duration) -> Deadline {
        self.deadline.unwrap_or_else(|| Deadline::after(budget))
    }
}

// Wire contract

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateReservationRequest {
    pub room_id: RoomId,
    pub starting_date: String,
    pub end_date: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CancelReservationRequest {
    pub id: ReservationId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelReservationResponse {
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomAvailabilityRequest {
    pub starting_date: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomAvailabilityResponse {
    pub rooms: Vec<Room>,
}
