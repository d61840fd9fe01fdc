// Main library file for the room reservation engine

pub mod booking;
pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod model;
pub mod notify;
pub mod room_client;
pub mod store;

// Re-export key types for convenience
pub use booking::{BookingConfig, BookingService};
pub use crate::config::{init_logging, ServiceConfig};
pub use error::BookingError;
pub use model::{
    CancelReservationRequest, CancelReservationResponse, CreateReservationRequest, Deadline,
    RequestContext, Reservation, ReservationId, Room, RoomAvailabilityRequest,
    RoomAvailabilityResponse, RoomId,
};
pub use notify::{NotificationDispatcher, NotificationSink};
pub use room_client::{CatalogError, CatalogReplica, RoomValidationClient};
pub use store::{InMemoryReservationStore, PgReservationStore, ReservationStore, StoreError};
