use super::{MemberId, MovieId, ReservationId, Showing, ShowingId, TheaterId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Confirmed,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = crate::BookingError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "CONFIRMED" => Ok(ReservationStatus::Confirmed),
            "CANCELLED" | "CANCELED" => Ok(ReservationStatus::Cancelled),
            other => Err(crate::BookingError::InvalidArgument(format!(
                "Unknown reservation status: {}",
                other
            ))),
        }
    }
}

/// A physical seat at a point in time. At most one confirmed reservation may hold it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeatSlot {
    pub theater_id: TheaterId,
    pub showing_time: DateTime<Utc>,
    pub seat_label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reservation {
    pub id: ReservationId,
    pub member_id: MemberId,
    pub showing_id: ShowingId,
    pub movie_id: MovieId,
    pub theater_id: TheaterId,
    pub showing_time: DateTime<Utc>,
    pub seat_label: String,
    pub ticket_count: u32,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    pub fn slot(&self) -> SeatSlot {
        SeatSlot {
            theater_id: self.theater_id,
            showing_time: self.showing_time,
            seat_label: self.seat_label.clone(),
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == ReservationStatus::Confirmed
    }
}

/// A reservation that has passed admission checks but has no identity yet.
#[derive(Debug, Clone)]
pub struct NewReservation {
    pub member_id: MemberId,
    pub showing_id: ShowingId,
    pub movie_id: MovieId,
    pub theater_id: TheaterId,
    pub showing_time: DateTime<Utc>,
    pub seat_label: String,
    pub ticket_count: u32,
}

impl NewReservation {
    /// One ticket for one seat of `showing`.
    pub fn single_seat(member_id: MemberId, showing: &Showing, seat_label: &str) -> Self {
        Self {
            member_id,
            showing_id: showing.id,
            movie_id: showing.movie_id,
            theater_id: showing.theater_id,
            showing_time: showing.start_time,
            seat_label: seat_label.to_string(),
            ticket_count: 1,
        }
    }

    pub fn slot(&self) -> SeatSlot {
        SeatSlot {
            theater_id: self.theater_id,
            showing_time: self.showing_time,
            seat_label: self.seat_label.clone(),
        }
    }

    pub fn into_reservation(self, id: ReservationId, created_at: DateTime<Utc>) -> Reservation {
        Reservation {
            id,
            member_id: self.member_id,
            showing_id: self.showing_id,
            movie_id: self.movie_id,
            theater_id: self.theater_id,
            showing_time: self.showing_time,
            seat_label: self.seat_label,
            ticket_count: self.ticket_count,
            status: ReservationStatus::Confirmed,
            created_at,
        }
    }
}

/// Result of a cancellation request that did not fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    Cancelled { seats_restored: u32 },
    AlreadyCancelled,
}
