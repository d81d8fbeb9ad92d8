use super::ReservationDesk;
use crate::{BookingError, Entity, Result, ShowingId};
use serde::Serialize;
use tracing::warn;

/// Recorded seat counter of a showing against the count derived from its reservations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryAudit {
    pub showing_id: ShowingId,
    pub total_seats: u32,
    pub recorded_available: u32,
    pub confirmed_tickets: u32,
    pub expected_available: i64,
    /// `recorded_available - expected_available`. Zero when the ledger is consistent.
    pub drift: i64,
}

impl InventoryAudit {
    pub fn is_consistent(&self) -> bool {
        self.drift == 0
    }
}

impl ReservationDesk {
    pub fn audit_showing(&self, showing_id: ShowingId) -> Result<InventoryAudit> {
        let showing = self
            .store
            .showing(showing_id)?
            .ok_or(BookingError::NotFound(Entity::Showing(showing_id)))?;
        let confirmed_tickets: u32 = self
            .store
            .reservations_by_showing(showing_id)?
            .iter()
            .filter(|r| r.is_confirmed())
            .map(|r| r.ticket_count)
            .sum();

        let expected_available = i64::from(showing.total_seats) - i64::from(confirmed_tickets);
        let audit = InventoryAudit {
            showing_id,
            total_seats: showing.total_seats,
            recorded_available: showing.available_seats,
            confirmed_tickets,
            expected_available,
            drift: i64::from(showing.available_seats) - expected_available,
        };
        if !audit.is_consistent() {
            warn!("Showing {} seat counter drifted by {}", showing_id, audit.drift);
        }
        Ok(audit)
    }
}
