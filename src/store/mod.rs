//! Seat inventory ledger and reservation store.
//!
//! Both live behind [`SeatStore`]. Mutations go through a [`StoreTxn`] so that a ledger
//! adjustment and the reservation write it pays for commit or roll back together. The
//! RocksDB backend runs each unit inside an optimistic transaction; the in-memory backend
//! applies changes eagerly and keeps an undo journal that is replayed on rollback.

use crate::{
    NewReservation, NewShowing, RebookPolicy, Reservation, ReservationId, ReservationStatus,
    Result, SeatSlot, Showing, ShowingId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

pub mod memory;
pub mod rocksdb_store;

pub use memory::MemoryStore;
pub use rocksdb_store::RocksDBStore;

/// Atomic adjustments of a showing's `available_seats` counter.
pub trait SeatLedger {
    /// Takes `count` seats only if at least `count` remain. Returns `false` without
    /// mutating when the showing is missing or short on seats.
    fn decrease(&mut self, showing_id: ShowingId, count: u32) -> Result<bool>;

    /// Gives `count` seats back. Returns `false` without mutating when the showing is
    /// missing or the result would exceed the showing's `total_seats`.
    fn increase(&mut self, showing_id: ShowingId, count: u32) -> Result<bool>;
}

/// Reservation reads and writes that take part in a transaction.
pub trait ReservationWriter {
    fn showing(&mut self, id: ShowingId) -> Result<Option<Showing>>;

    fn reservation(&mut self, id: ReservationId) -> Result<Option<Reservation>>;

    /// The confirmed reservation currently holding `slot`, if any.
    fn confirmed_holder(&mut self, slot: &SeatSlot) -> Result<Option<Reservation>>;

    /// Stores a confirmed reservation and claims its seat slot. Fails with
    /// `SeatUnavailable` when a different confirmed reservation holds the slot.
    fn create(&mut self, draft: NewReservation, policy: RebookPolicy) -> Result<ReservationId>;

    /// Overwrites the status of `id`. With `expected` set, only applies when the current
    /// status matches. Returns whether a row changed. Confirming a row claims its slot.
    fn set_status(
        &mut self,
        id: ReservationId,
        status: ReservationStatus,
        expected: Option<ReservationStatus>,
    ) -> Result<bool>;
}

pub trait StoreTxn: SeatLedger + ReservationWriter {
    fn commit(self: Box<Self>) -> Result<()>;

    /// Discards every change made through this transaction. Dropping an uncommitted
    /// transaction has the same effect.
    fn rollback(self: Box<Self>) -> Result<()>;
}

pub trait SeatStore: Send + Sync {
    fn name(&self) -> &str;

    fn begin(&self) -> Result<Box<dyn StoreTxn + '_>>;

    /// Persists a showing with `available_seats` equal to its capacity.
    fn insert_showing(&self, draft: NewShowing) -> Result<Showing>;

    fn showing(&self, id: ShowingId) -> Result<Option<Showing>>;

    fn showings(&self) -> Result<Vec<Showing>>;

    fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>>;

    /// Every reservation, ordered by id.
    fn reservations(&self) -> Result<Vec<Reservation>>;

    /// Administrative hard delete. Does not touch the ledger.
    fn delete_reservation(&self, id: ReservationId) -> Result<bool>;

    fn flush(&self) -> Result<()>;

    fn decrease(&self, showing_id: ShowingId, count: u32) -> Result<bool> {
        let mut txn = self.begin()?;
        let applied = txn.decrease(showing_id, count)?;
        txn.commit()?;
        Ok(applied)
    }

    fn increase(&self, showing_id: ShowingId, count: u32) -> Result<bool> {
        let mut txn = self.begin()?;
        let applied = txn.increase(showing_id, count)?;
        txn.commit()?;
        Ok(applied)
    }

    fn create_reservation(&self, draft: NewReservation, policy: RebookPolicy) -> Result<ReservationId> {
        let mut txn = self.begin()?;
        let id = txn.create(draft, policy)?;
        txn.commit()?;
        Ok(id)
    }

    /// Unconditional status overwrite.
    fn set_status(&self, id: ReservationId, status: ReservationStatus) -> Result<bool> {
        let mut txn = self.begin()?;
        let applied = txn.set_status(id, status, None)?;
        txn.commit()?;
        Ok(applied)
    }

    fn reservations_by_member(
        &self,
        member_id: crate::MemberId,
        include_cancelled: bool,
    ) -> Result<Vec<Reservation>> {
        Ok(self
            .reservations()?
            .into_iter()
            .filter(|r| r.member_id == member_id && (include_cancelled || r.is_confirmed()))
            .collect())
    }

    fn reservations_by_showing(&self, showing_id: ShowingId) -> Result<Vec<Reservation>> {
        Ok(self
            .reservations()?
            .into_iter()
            .filter(|r| r.showing_id == showing_id)
            .collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    RocksDB,
}

impl std::str::FromStr for StorageBackend {
    type Err = crate::BookingError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "in-memory" => Ok(StorageBackend::Memory),
            "rocksdb" => Ok(StorageBackend::RocksDB),
            other => Err(crate::BookingError::InvalidArgument(format!(
                "Unknown storage backend: {}",
                other
            ))),
        }
    }
}

/// Open the store selected by configuration.
pub fn open_store(config: &crate::StorageConfig) -> Result<Arc<dyn SeatStore>> {
    info!("Storage: {:?} at {}", config.backend, config.path);

    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageBackend::RocksDB => {
            std::fs::create_dir_all(&config.path)?;
            Ok(Arc::new(RocksDBStore::open(&config.path)?))
        }
    }
}
