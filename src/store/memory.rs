use super::{ReservationWriter, SeatLedger, SeatStore, StoreTxn};
use crate::{
    BookingError, NewReservation, NewShowing, RebookPolicy, Reservation, ReservationId,
    ReservationStatus, Result, SeatSlot, Showing, ShowingId,
};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// DashMap-backed store.
///
/// Ledger updates hold the showing's shard lock for the whole check-and-decrement, so
/// they are atomic on their own. Slot claims hold the slot's shard lock while the
/// reservation row is written. Lock order is always slots before reservations.
pub struct MemoryStore {
    showings: DashMap<ShowingId, Showing>,
    reservations: DashMap<ReservationId, Reservation>,
    // Last reservation that claimed each slot; it may since have been cancelled.
    slots: DashMap<SeatSlot, ReservationId>,
    next_showing_id: AtomicU64,
    next_reservation_id: AtomicU64,
}

/// How to put a slot back the way it was.
#[derive(Debug)]
struct SlotRestore {
    slot: SeatSlot,
    holder: Option<ReservationId>,
}

#[derive(Debug)]
enum Undo {
    Decreased {
        showing_id: ShowingId,
        count: u32,
    },
    Increased {
        showing_id: ShowingId,
        count: u32,
    },
    Wrote {
        id: ReservationId,
        previous: Option<Reservation>,
        slot: SlotRestore,
    },
    StatusChanged {
        id: ReservationId,
        previous: ReservationStatus,
        slot: Option<SlotRestore>,
    },
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            showings: DashMap::new(),
            reservations: DashMap::new(),
            slots: DashMap::new(),
            next_showing_id: AtomicU64::new(1),
            next_reservation_id: AtomicU64::new(1),
        }
    }

    fn try_decrease(&self, showing_id: ShowingId, count: u32) -> bool {
        match self.showings.get_mut(&showing_id) {
            Some(mut showing) if showing.available_seats >= count => {
                showing.available_seats -= count;
                true
            }
            _ => false,
        }
    }

    fn try_increase(&self, showing_id: ShowingId, count: u32) -> bool {
        match self.showings.get_mut(&showing_id) {
            Some(mut showing) => match showing.available_seats.checked_add(count) {
                Some(next) if next <= showing.total_seats => {
                    showing.available_seats = next;
                    true
                }
                _ => false,
            },
            None => false,
        }
    }

    fn is_confirmed(&self, id: ReservationId) -> bool {
        self.reservations
            .get(&id)
            .map(|r| r.is_confirmed())
            .unwrap_or(false)
    }

    fn claim(&self, draft: NewReservation, policy: RebookPolicy) -> Result<(ReservationId, Undo)> {
        let slot = draft.slot();
        match self.slots.entry(slot.clone()) {
            Entry::Occupied(mut entry) => {
                let holder = *entry.get();
                let holder_exists = self.reservations.contains_key(&holder);
                if self.is_confirmed(holder) {
                    return Err(BookingError::seat_taken(&draft.seat_label));
                }
                let id = match policy {
                    RebookPolicy::ReuseCancelled if holder_exists => holder,
                    _ => self.next_reservation_id.fetch_add(1, Ordering::SeqCst),
                };
                let previous = self
                    .reservations
                    .insert(id, draft.into_reservation(id, Utc::now()));
                entry.insert(id);
                Ok((
                    id,
                    Undo::Wrote {
                        id,
                        previous,
                        slot: SlotRestore {
                            slot,
                            holder: Some(holder),
                        },
                    },
                ))
            }
            Entry::Vacant(entry) => {
                let id = self.next_reservation_id.fetch_add(1, Ordering::SeqCst);
                let previous = self
                    .reservations
                    .insert(id, draft.into_reservation(id, Utc::now()));
                entry.insert(id);
                Ok((
                    id,
                    Undo::Wrote {
                        id,
                        previous,
                        slot: SlotRestore { slot, holder: None },
                    },
                ))
            }
        }
    }

    fn change_status(
        &self,
        id: ReservationId,
        status: ReservationStatus,
        expected: Option<ReservationStatus>,
    ) -> Result<Option<Undo>> {
        let current = match self.reservations.get(&id).map(|r| r.value().clone()) {
            Some(current) => current,
            None => return Ok(None),
        };

        match status {
            ReservationStatus::Cancelled => {
                let Some(mut row) = self.reservations.get_mut(&id) else {
                    return Ok(None);
                };
                if expected.is_some_and(|e| e != row.status) {
                    return Ok(None);
                }
                let previous = row.status;
                row.status = status;
                Ok(Some(Undo::StatusChanged {
                    id,
                    previous,
                    slot: None,
                }))
            }
            ReservationStatus::Confirmed => {
                let slot = current.slot();
                let entry = self.slots.entry(slot.clone());
                let holder = match &entry {
                    Entry::Occupied(occupied) => Some(*occupied.get()),
                    Entry::Vacant(_) => None,
                };
                if let Some(holder) = holder {
                    if holder != id && self.is_confirmed(holder) {
                        return Err(BookingError::seat_taken(&current.seat_label));
                    }
                }
                let previous = {
                    let Some(mut row) = self.reservations.get_mut(&id) else {
                        return Ok(None);
                    };
                    if expected.is_some_and(|e| e != row.status) {
                        return Ok(None);
                    }
                    let previous = row.status;
                    row.status = status;
                    previous
                };
                match entry {
                    Entry::Occupied(mut occupied) => {
                        occupied.insert(id);
                    }
                    Entry::Vacant(vacant) => {
                        vacant.insert(id);
                    }
                }
                Ok(Some(Undo::StatusChanged {
                    id,
                    previous,
                    slot: Some(SlotRestore { slot, holder }),
                }))
            }
        }
    }

    fn restore_slot(&self, id: ReservationId, restore: SlotRestore) {
        match restore.holder {
            Some(holder) => {
                self.slots.insert(restore.slot, holder);
            }
            None => {
                self.slots.remove_if(&restore.slot, |_, current| *current == id);
            }
        }
    }

    fn undo(&self, step: Undo) {
        debug!("Undoing {:?}", step);
        match step {
            Undo::Decreased { showing_id, count } => {
                if let Some(mut showing) = self.showings.get_mut(&showing_id) {
                    showing.available_seats += count;
                }
            }
            Undo::Increased { showing_id, count } => {
                if let Some(mut showing) = self.showings.get_mut(&showing_id) {
                    showing.available_seats = showing.available_seats.saturating_sub(count);
                }
            }
            Undo::Wrote { id, previous, slot } => {
                match previous {
                    Some(previous) => {
                        self.reservations.insert(id, previous);
                    }
                    None => {
                        self.reservations.remove(&id);
                    }
                }
                self.restore_slot(id, slot);
            }
            Undo::StatusChanged { id, previous, slot } => {
                if let Some(mut row) = self.reservations.get_mut(&id) {
                    row.status = previous;
                }
                if let Some(slot) = slot {
                    self.restore_slot(id, slot);
                }
            }
        }
    }
}

impl SeatStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn begin(&self) -> Result<Box<dyn StoreTxn + '_>> {
        Ok(Box::new(MemoryTxn {
            store: self,
            journal: Vec::new(),
            finished: false,
        }))
    }

    fn insert_showing(&self, draft: NewShowing) -> Result<Showing> {
        let id = self.next_showing_id.fetch_add(1, Ordering::SeqCst);
        let showing = draft.into_showing(id);
        self.showings.insert(id, showing.clone());
        Ok(showing)
    }

    fn showing(&self, id: ShowingId) -> Result<Option<Showing>> {
        Ok(self.showings.get(&id).map(|s| s.value().clone()))
    }

    fn showings(&self) -> Result<Vec<Showing>> {
        let mut showings: Vec<Showing> = self.showings.iter().map(|s| s.value().clone()).collect();
        showings.sort_by_key(|s| s.id);
        Ok(showings)
    }

    fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>> {
        Ok(self.reservations.get(&id).map(|r| r.value().clone()))
    }

    fn reservations(&self) -> Result<Vec<Reservation>> {
        let mut reservations: Vec<Reservation> =
            self.reservations.iter().map(|r| r.value().clone()).collect();
        reservations.sort_by_key(|r| r.id);
        Ok(reservations)
    }

    fn delete_reservation(&self, id: ReservationId) -> Result<bool> {
        match self.reservations.remove(&id) {
            Some((_, removed)) => {
                self.slots.remove_if(&removed.slot(), |_, holder| *holder == id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Eagerly applied changes plus the journal needed to take them back.
pub struct MemoryTxn<'a> {
    store: &'a MemoryStore,
    journal: Vec<Undo>,
    finished: bool,
}

impl MemoryTxn<'_> {
    fn unwind(&mut self) {
        while let Some(step) = self.journal.pop() {
            self.store.undo(step);
        }
        self.finished = true;
    }
}

impl SeatLedger for MemoryTxn<'_> {
    fn decrease(&mut self, showing_id: ShowingId, count: u32) -> Result<bool> {
        if !self.store.try_decrease(showing_id, count) {
            return Ok(false);
        }
        self.journal.push(Undo::Decreased { showing_id, count });
        Ok(true)
    }

    fn increase(&mut self, showing_id: ShowingId, count: u32) -> Result<bool> {
        if !self.store.try_increase(showing_id, count) {
            return Ok(false);
        }
        self.journal.push(Undo::Increased { showing_id, count });
        Ok(true)
    }
}

impl ReservationWriter for MemoryTxn<'_> {
    fn showing(&mut self, id: ShowingId) -> Result<Option<Showing>> {
        self.store.showing(id)
    }

    fn reservation(&mut self, id: ReservationId) -> Result<Option<Reservation>> {
        self.store.reservation(id)
    }

    fn confirmed_holder(&mut self, slot: &SeatSlot) -> Result<Option<Reservation>> {
        let holder = self.store.slots.get(slot).map(|h| *h.value());
        Ok(holder
            .and_then(|id| self.store.reservations.get(&id).map(|r| r.value().clone()))
            .filter(|r| r.is_confirmed()))
    }

    fn create(&mut self, draft: NewReservation, policy: RebookPolicy) -> Result<ReservationId> {
        let (id, undo) = self.store.claim(draft, policy)?;
        self.journal.push(undo);
        Ok(id)
    }

    fn set_status(
        &mut self,
        id: ReservationId,
        status: ReservationStatus,
        expected: Option<ReservationStatus>,
    ) -> Result<bool> {
        match self.store.change_status(id, status, expected)? {
            Some(undo) => {
                self.journal.push(undo);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl StoreTxn for MemoryTxn<'_> {
    fn commit(mut self: Box<Self>) -> Result<()> {
        self.journal.clear();
        self.finished = true;
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> Result<()> {
        self.unwind();
        Ok(())
    }
}

impl Drop for MemoryTxn<'_> {
    fn drop(&mut self) {
        if !self.finished && !self.journal.is_empty() {
            warn!(
                "Memory transaction dropped with {} uncommitted change(s); rolling back",
                self.journal.len()
            );
            self.unwind();
        }
    }
}
