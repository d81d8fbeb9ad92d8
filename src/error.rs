use crate::{MemberId, MovieId, ReservationId, ShowingId, TheaterId};
use thiserror::Error;

/// Missing entity named by a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Member(MemberId),
    Movie(MovieId),
    Theater(TheaterId),
    Showing(ShowingId),
    Reservation(ReservationId),
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entity::Member(id) => write!(f, "member {}", id),
            Entity::Movie(id) => write!(f, "movie {}", id),
            Entity::Theater(id) => write!(f, "theater {}", id),
            Entity::Showing(id) => write!(f, "showing {}", id),
            Entity::Reservation(id) => write!(f, "reservation {}", id),
        }
    }
}

/// Why a seat request could not be admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeatConflict {
    /// Another confirmed reservation holds the seat.
    Taken { seat: String },
    /// Aggregate capacity of the showing is exhausted.
    Insufficient { requested: u32 },
}

impl std::fmt::Display for SeatConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeatConflict::Taken { seat } => write!(f, "seat {} is already reserved", seat),
            SeatConflict::Insufficient { requested } => {
                write!(f, "not enough seats left for {} ticket(s)", requested)
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum BookingError {
    #[error("Not found: {0}")]
    NotFound(Entity),

    #[error("Age restricted: member is {age}, movie requires {minimum_age}")]
    AgeRestricted { age: u32, minimum_age: u32 },

    #[error("Seat unavailable: {0}")]
    SeatUnavailable(SeatConflict),

    #[error("Member {member_id} may not modify reservation {reservation_id}")]
    Forbidden {
        reservation_id: ReservationId,
        member_id: MemberId,
    },

    #[error("Cancellation window expired: showing starts in {minutes_left} minute(s), cutoff is {window_minutes}")]
    CancellationWindowExpired { minutes_left: i64, window_minutes: i64 },

    #[error("Reservation {0} is already cancelled")]
    AlreadyCancelled(ReservationId),

    #[error("Transient store error: {0}")]
    TransientStore(String),

    #[error("Inconsistent state for reservation {reservation_id} on showing {showing_id}: {detail}")]
    Inconsistent {
        reservation_id: ReservationId,
        showing_id: ShowingId,
        detail: String,
    },

    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("RocksDB error: {0}")]
    RocksDB(rocksdb::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metrics error: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("Shutdown error: {0}")]
    Shutdown(String),
}

impl BookingError {
    /// Failures a caller may retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BookingError::TransientStore(_))
    }

    /// Failures that need manual reconciliation.
    pub fn is_critical(&self) -> bool {
        matches!(self, BookingError::Inconsistent { .. } | BookingError::DataIntegrity(_))
    }

    /// Short label used as a metric dimension.
    pub fn reason(&self) -> &'static str {
        match self {
            BookingError::NotFound(_) => "not_found",
            BookingError::AgeRestricted { .. } => "age_restricted",
            BookingError::SeatUnavailable(SeatConflict::Taken { .. }) => "seat_taken",
            BookingError::SeatUnavailable(SeatConflict::Insufficient { .. }) => "sold_out",
            BookingError::Forbidden { .. } => "forbidden",
            BookingError::CancellationWindowExpired { .. } => "window_expired",
            BookingError::AlreadyCancelled(_) => "already_cancelled",
            BookingError::TransientStore(_) => "transient",
            BookingError::Inconsistent { .. } => "inconsistent",
            BookingError::DataIntegrity(_) => "data_integrity",
            BookingError::InvalidArgument(_) => "invalid_argument",
            BookingError::RocksDB(_)
            | BookingError::Json(_)
            | BookingError::Config(_)
            | BookingError::Io(_)
            | BookingError::Prometheus(_)
            | BookingError::Shutdown(_) => "internal",
        }
    }

    pub fn seat_taken(seat: impl Into<String>) -> Self {
        BookingError::SeatUnavailable(SeatConflict::Taken { seat: seat.into() })
    }
}

impl From<rocksdb::Error> for BookingError {
    fn from(e: rocksdb::Error) -> Self {
        use rocksdb::ErrorKind;
        match e.kind() {
            ErrorKind::Busy | ErrorKind::TryAgain | ErrorKind::TimedOut => {
                BookingError::TransientStore(e.to_string())
            }
            _ => BookingError::RocksDB(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, BookingError>;
