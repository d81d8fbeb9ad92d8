//! Booking and cancellation workflows over a [`SeatStore`].
//!
//! [`ReservationDesk`] is synchronous: every call runs to completion on the calling
//! thread, touching the store through one transaction per request. The async
//! [`crate::BookingService`] moves these calls onto the blocking pool.

use crate::{
    BookingPolicy, CatalogLookup, Clock, MemberId, Reservation, ReservationId, Result, SeatStore,
    Showing, ShowingId, SystemClock,
};
use std::sync::Arc;

mod audit;
mod booking;
mod cancellation;

pub use audit::InventoryAudit;

/// Who is asking for a cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requester {
    /// Must own the reservation and respect the cancellation window.
    Member(MemberId),
    /// Bypasses ownership and the cancellation window.
    Admin,
}

#[derive(Clone)]
pub struct ReservationDesk {
    store: Arc<dyn SeatStore>,
    catalog: Arc<dyn CatalogLookup>,
    policy: BookingPolicy,
    clock: Arc<dyn Clock>,
}

impl ReservationDesk {
    pub fn new(
        store: Arc<dyn SeatStore>,
        catalog: Arc<dyn CatalogLookup>,
        policy: BookingPolicy,
    ) -> Self {
        Self::with_clock(store, catalog, policy, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn SeatStore>,
        catalog: Arc<dyn CatalogLookup>,
        policy: BookingPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            catalog,
            policy,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<dyn SeatStore> {
        &self.store
    }

    /// Every scheduled showing, ordered by id.
    pub fn list_showings(&self) -> Result<Vec<Showing>> {
        self.store.showings()
    }

    pub fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>> {
        self.store.reservation(id)
    }

    /// Confirmed reservations of a member.
    pub fn list_reservations(&self, member_id: MemberId) -> Result<Vec<Reservation>> {
        self.store.reservations_by_member(member_id, false)
    }

    /// Every reservation a member ever made, cancelled ones included.
    pub fn list_reservation_history(&self, member_id: MemberId) -> Result<Vec<Reservation>> {
        self.store.reservations_by_member(member_id, true)
    }

    pub fn list_all_reservations(&self) -> Result<Vec<Reservation>> {
        self.store.reservations()
    }

    pub fn list_showing_reservations(&self, showing_id: ShowingId) -> Result<Vec<Reservation>> {
        self.store.reservations_by_showing(showing_id)
    }
}
