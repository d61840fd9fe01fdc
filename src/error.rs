// Error taxonomy surfaced by the booking engine

use chrono::NaiveDate;
use thiserror::Error;

use crate::{
    model::{ReservationId, RoomId},
    room_client::CatalogError,
    store::StoreError,
};

type Cause = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum BookingError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Room with id {0} not found")]
    RoomNotFound(RoomId),

    #[error("There is already a reservation for room {room_id} on {date}")]
    Conflict { room_id: RoomId, date: NaiveDate },

    #[error("Service unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Option<Cause>,
    },

    #[error("Reservation with id {0} not found")]
    NotFound(ReservationId),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Cause>,
    },
}

impl BookingError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
            source: None,
        }
    }

    /// Status a gateway should answer with when it maps this error onto HTTP.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidInput(_) => 400,
            Self::RoomNotFound(_) | Self::NotFound(_) => 404,
            Self::Conflict { .. } => 409,
            Self::Unavailable { .. } => 503,
            Self::Internal { .. } => 500,
        }
    }

    pub(crate) fn from_catalog(err: CatalogError) -> Self {
        Self::Unavailable {
            message: "room catalog call failed".to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { room_id, date } => Self::Conflict { room_id, date },
            StoreError::DeadlineExceeded => Self::Unavailable {
                message: "reservation store deadline exceeded".to_string(),
                source: Some(Box::new(err)),
            },
            other => Self::Internal {
                message: "reservation store failure".to_string(),
                source: Some(Box::new(other)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_store_errors_are_reclassified() {
        let date = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        let err = BookingError::from(StoreError::Conflict { room_id: 7, date });
        assert!(matches!(err, BookingError::Conflict { room_id: 7, .. }));
        assert_eq!(err.http_status(), 409);

        let err = BookingError::from(StoreError::DeadlineExceeded);
        assert!(matches!(err, BookingError::Unavailable { .. }));
        assert_eq!(err.http_status(), 503);

        let err = BookingError::from(StoreError::Backend("disk full".to_string()));
        assert!(matches!(err, BookingError::Internal { .. }));
        assert!(err.source().unwrap().to_string().contains("disk full"));
    }

    #[test]
    fn test_catalog_errors_keep_their_cause() {
        let err = BookingError::from_catalog(CatalogError::Timeout(5000));
        assert_eq!(err.http_status(), 503);
        assert_eq!(
            err.source().unwrap().to_string(),
            "Request timeout after 5000ms"
        );
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(BookingError::invalid("x").http_status(), 400);
        assert_eq!(BookingError::RoomNotFound(1).http_status(), 404);
        assert_eq!(BookingError::NotFound(1).http_status(), 404);
    }
}
