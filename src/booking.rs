// Booking service
// Validates requests, confirms the room with the catalog, and persists or removes
// reservations. Conflicts are decided by the store's uniqueness guarantee; the pre-check
// only saves a write when the outcome is already known.

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    config::ServiceConfig,
    error::BookingError,
    model::{
        CancelReservationResponse, CreateReservationRequest, Deadline, NewReservation,
        RequestContext, Reservation, ReservationId, Room, RoomAvailabilityRequest,
        RoomAvailabilityResponse,
    },
    notify::{Notification, NotificationDispatcher},
    room_client::RoomValidationClient,
    store::{PgReservationStore, ReservationStore},
};

pub const CANCELLED_MESSAGE: &str = "Reservation cancelled successfully";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BookingConfig {
    // upper bound for the room existence check, shortened further by the inbound deadline
    pub catalog_deadline_ms: u64,
    // store budget for requests that arrive without a deadline
    pub store_timeout_ms: u64,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            catalog_deadline_ms: 5000,
            store_timeout_ms: 10_000,
        }
    }
}

pub struct BookingService {
    store: Arc<dyn ReservationStore>,
    catalog: Arc<RoomValidationClient>,
    notifier: NotificationDispatcher,
    config: BookingConfig,
}

impl BookingService {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        catalog: Arc<RoomValidationClient>,
        notifier: NotificationDispatcher,
        config: BookingConfig,
    ) -> Self {
        Self {
            store,
            catalog,
            notifier,
            config,
        }
    }

    /// Connects to PostgreSQL (bootstrapping the schema), builds the catalog client and
    /// starts the notification task.
    pub async fn connect(config: &ServiceConfig) -> anyhow::Result<Self> {
        let store = PgReservationStore::connect(&config.database)
            .await
            .context("failed to open reservation store")?;
        let catalog = RoomValidationClient::from_config(&config.catalog)
            .context("failed to build room catalog client")?;
        let notifier = NotificationDispatcher::from_config(&config.notifications)
            .context("failed to start notification dispatcher")?;

        info!(replicas = ?catalog.replica_names(), "booking service ready");
        Ok(Self::new(
            Arc::new(store),
            Arc::new(catalog),
            notifier,
            config.booking.clone(),
        ))
    }

    // Flushes pending notifications, then closes the store
    pub async fn shutdown(self) {
        self.notifier.shutdown().await;
        self.store.close().await;
        info!("booking service stopped");
    }

    pub fn catalog(&self) -> &RoomValidationClient {
        &self.catalog
    }

    fn catalog_deadline(&self, ctx: &RequestContext) -> Deadline {
        let budget = Duration::from_millis(self.config.catalog_deadline_ms);
        ctx.deadline_or(budget).earliest(Deadline::after(budget))
    }

    fn store_deadline(&self, ctx: &RequestContext) -> Deadline {
        ctx.deadline_or(Duration::from_millis(self.config.store_timeout_ms))
    }

    #[tracing::instrument(
        skip_all,
        fields(correlation_id = %ctx.correlation_id, room_id = request.room_id)
    )]
    pub async fn create_reservation(
        &self,
        ctx: &RequestContext,
        request: &CreateReservationRequest,
    ) -> Result<Reservation, BookingError> {
        let new = validate_reservation(request, Utc::now())?;
        ensure_live(ctx)?;

        match self.catalog.exists(new.room_id, self.catalog_deadline(ctx)).await {
            Ok(true) => {}
            Ok(false) => {
                info!("room unknown to the catalog");
                return Err(BookingError::RoomNotFound(new.room_id));
            }
            Err(e) => {
                warn!(error = %e, "could not validate room");
                return Err(BookingError::from_catalog(e));
            }
        }

        let deadline = self.store_deadline(ctx);
        let day = new.starting_day();
        if self.store.has_conflict(new.room_id, day, deadline).await? {
            info!(%day, "room already reserved");
            return Err(BookingError::Conflict {
                room_id: new.room_id,
                date: day,
            });
        }

        let id = self.store.insert(&new, deadline).await.map_err(|e| {
            warn!(error = %e, "reservation insert failed");
            BookingError::from(e)
        })?;

        let reservation = new.into_reservation(id);
        info!(id, "reservation created");
        self.notifier.notify(Notification::reservation_confirmed(&reservation));

        Ok(reservation)
    }

    #[tracing::instrument(skip_all, fields(correlation_id = %ctx.correlation_id, id = id))]
    pub async fn cancel_reservation(
        &self,
        ctx: &RequestContext,
        id: ReservationId,
    ) -> Result<CancelReservationResponse, BookingError> {
        if id <= 0 {
            return Err(BookingError::invalid(format!(
                "reservation id must be positive, got {id}"
            )));
        }
        ensure_live(ctx)?;

        let removed = self.store.delete(id, self.store_deadline(ctx)).await?;
        if removed == 0 {
            info!("reservation not found");
            return Err(BookingError::NotFound(id));
        }

        info!("reservation cancelled");
        self.notifier.notify(Notification::reservation_cancelled(id));

        Ok(CancelReservationResponse {
            message: CANCELLED_MESSAGE.to_string(),
        })
    }

    /// Rooms from the catalog with no reservation starting on or after `starting_date`.
    #[tracing::instrument(skip_all, fields(correlation_id = %ctx.correlation_id))]
    pub async fn list_available_rooms(
        &self,
        ctx: &RequestContext,
        starting_date: &str,
    ) -> Result<Vec<Room>, BookingError> {
        let date = parse_timestamp("startingDate", starting_date)?.date_naive();
        ensure_live(ctx)?;

        let (rooms, taken) = tokio::join!(
            self.catalog.list_rooms(self.catalog_deadline(ctx)),
            self.store.select_conflicting_room_ids(date, self.store_deadline(ctx)),
        );
        let rooms = rooms.map_err(|e| {
            warn!(error = %e, "could not list catalog rooms");
            BookingError::from_catalog(e)
        })?;
        let taken = taken?;

        Ok(rooms
            .into_iter()
            .filter(|room| !taken.contains(&room.id))
            .collect())
    }

    pub async fn check_room_availability(
        &self,
        ctx: &RequestContext,
        request: &RoomAvailabilityRequest,
    ) -> Result<RoomAvailabilityResponse, BookingError> {
        let rooms = self.list_available_rooms(ctx, &request.starting_date).await?;
        Ok(RoomAvailabilityResponse { rooms })
    }
}

fn ensure_live(ctx: &RequestContext) -> Result<(), BookingError> {
    if ctx.deadline.is_some_and(|d| d.is_expired()) {
        return Err(BookingError::unavailable("request deadline exceeded"));
    }
    Ok(())
}

fn parse_timestamp(field: &str, raw: &str) -> Result<DateTime<Utc>, BookingError> {
    if raw.trim().is_empty() {
        return Err(BookingError::invalid(format!("{field} cannot be blank")));
    }
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| BookingError::invalid(format!("invalid {field}: {raw}")))
}

// Pure input checks, no I/O
pub fn validate_reservation(
    request: &CreateReservationRequest,
    now: DateTime<Utc>,
) -> Result<NewReservation, BookingError> {
    if request.room_id <= 0 {
        return Err(BookingError::invalid("roomId is required"));
    }

    let starting_date = parse_timestamp("startingDate", &request.starting_date)?;
    let end_date = parse_timestamp("endDate", &request.end_date)?;

    if starting_date < now {
        return Err(BookingError::invalid(format!(
            "startingDate can't be in the past: {}",
            request.starting_date
        )));
    }
    if end_date < starting_date {
        return Err(BookingError::invalid(format!(
            "endDate can't be before startingDate: {}",
            request.end_date
        )));
    }

    Ok(NewReservation {
        room_id: request.room_id,
        starting_date,
        end_date,
    })
}
