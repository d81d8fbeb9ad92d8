use super::{ReservationWriter, SeatLedger, SeatStore, StoreTxn};
use crate::{
    id_from_key, reservation_key, seat_slot_key, showing_key, BookingError, Keys, NewReservation,
    NewShowing, RebookPolicy, Reservation, ReservationId, ReservationStatus, Result, SeatSlot,
    Showing, ShowingId,
};
use chrono::Utc;
use rocksdb::{Direction, IteratorMode, OptimisticTransactionDB, Options, Transaction};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// RocksDB-backed ledger and reservation store.
///
/// Every unit of work runs in an optimistic transaction. Keys read through
/// `get_for_update` are validated at commit; a concurrent writer makes the commit fail
/// with `Busy`, which surfaces as a retryable `TransientStore` error.
pub struct RocksDBStore {
    db: OptimisticTransactionDB,
    next_showing_id: AtomicU64,
    next_reservation_id: AtomicU64,
}

impl RocksDBStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_max_open_files(10000);
        opts.set_use_fsync(false);
        opts.set_bytes_per_sync(8388608);
        opts.optimize_for_point_lookup(1024);

        let db: OptimisticTransactionDB = OptimisticTransactionDB::open(&opts, path.as_ref())?;
        let next_showing_id = max_id(&db, Keys::SHOWING)? + 1;
        let next_reservation_id = max_id(&db, Keys::RESERVATION)? + 1;
        info!(
            "Opened RocksDB store at {:?} (next showing {}, next reservation {})",
            path.as_ref(),
            next_showing_id,
            next_reservation_id
        );

        Ok(Self {
            db,
            next_showing_id: AtomicU64::new(next_showing_id),
            next_reservation_id: AtomicU64::new(next_reservation_id),
        })
    }

    fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        match self.db.get(key)? {
            Some(value) => Ok(Some(decode(key, &value)?)),
            None => Ok(None),
        }
    }

    fn put<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        let serialized = serde_json::to_vec(value)?;
        self.db.put(key, serialized)?;
        Ok(())
    }

    fn scan<T>(&self, prefix: &str) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let mut values = Vec::new();
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            values.push(decode(&String::from_utf8_lossy(&key), &value)?);
        }
        Ok(values)
    }

    #[cfg(test)]
    fn put_raw(&self, key: &str, value: &[u8]) -> Result<()> {
        self.db.put(key, value)?;
        Ok(())
    }
}

fn max_id(db: &OptimisticTransactionDB, prefix: &str) -> Result<u64> {
    let mut max = 0;
    let iter = db.iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward));
    for item in iter {
        let (key, _) = item?;
        if !key.starts_with(prefix.as_bytes()) {
            break;
        }
        if let Some(id) = id_from_key(&key, prefix) {
            max = max.max(id);
        }
    }
    Ok(max)
}

// A stored row that no longer decodes (e.g. an unknown status) is a data problem, not a
// serialization bug.
fn decode<T: DeserializeOwned>(key: &str, value: &[u8]) -> Result<T> {
    serde_json::from_slice(value)
        .map_err(|e| BookingError::DataIntegrity(format!("undecodable record {}: {}", key, e)))
}

impl SeatStore for RocksDBStore {
    fn name(&self) -> &str {
        "rocksdb"
    }

    fn begin(&self) -> Result<Box<dyn StoreTxn + '_>> {
        Ok(Box::new(RocksDBTxn {
            txn: self.db.transaction(),
            store: self,
        }))
    }

    fn insert_showing(&self, draft: NewShowing) -> Result<Showing> {
        let id = self.next_showing_id.fetch_add(1, Ordering::SeqCst);
        let showing = draft.into_showing(id);
        self.put(&showing_key(id), &showing)?;
        Ok(showing)
    }

    fn showing(&self, id: ShowingId) -> Result<Option<Showing>> {
        self.get(&showing_key(id))
    }

    fn showings(&self) -> Result<Vec<Showing>> {
        self.scan(Keys::SHOWING)
    }

    fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>> {
        self.get(&reservation_key(id))
    }

    fn reservations(&self) -> Result<Vec<Reservation>> {
        self.scan(Keys::RESERVATION)
    }

    fn delete_reservation(&self, id: ReservationId) -> Result<bool> {
        let txn = self.db.transaction();
        let key = reservation_key(id);
        let Some(value) = txn.get_for_update(&key, true)? else {
            return Ok(false);
        };
        let reservation: Reservation = decode(&key, &value)?;
        let slot_key = seat_slot_key(&reservation.slot());
        let holder = txn
            .get_for_update(&slot_key, true)?
            .map(|v| decode::<ReservationId>(&slot_key, &v))
            .transpose()?;
        txn.delete(&key)?;
        if holder == Some(id) {
            txn.delete(&slot_key)?;
        }
        txn.commit()?;
        Ok(true)
    }

    fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

pub struct RocksDBTxn<'a> {
    txn: Transaction<'a, OptimisticTransactionDB>,
    store: &'a RocksDBStore,
}

impl RocksDBTxn<'_> {
    fn read<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        match self.txn.get_for_update(key, true)? {
            Some(value) => Ok(Some(decode(key, &value)?)),
            None => Ok(None),
        }
    }

    fn write<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        self.txn.put(key, serde_json::to_vec(value)?)?;
        Ok(())
    }

    fn slot_holder(&self, slot: &SeatSlot) -> Result<Option<Reservation>> {
        match self.read::<ReservationId>(&seat_slot_key(slot))? {
            Some(holder) => self.read(&reservation_key(holder)),
            None => Ok(None),
        }
    }
}

impl SeatLedger for RocksDBTxn<'_> {
    fn decrease(&mut self, showing_id: ShowingId, count: u32) -> Result<bool> {
        let key = showing_key(showing_id);
        let Some(mut showing) = self.read::<Showing>(&key)? else {
            return Ok(false);
        };
        if showing.available_seats < count {
            return Ok(false);
        }
        showing.available_seats -= count;
        self.write(&key, &showing)?;
        Ok(true)
    }

    fn increase(&mut self, showing_id: ShowingId, count: u32) -> Result<bool> {
        let key = showing_key(showing_id);
        let Some(mut showing) = self.read::<Showing>(&key)? else {
            return Ok(false);
        };
        match showing.available_seats.checked_add(count) {
            Some(next) if next <= showing.total_seats => {
                showing.available_seats = next;
                self.write(&key, &showing)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

impl ReservationWriter for RocksDBTxn<'_> {
    fn showing(&mut self, id: ShowingId) -> Result<Option<Showing>> {
        self.read(&showing_key(id))
    }

    fn reservation(&mut self, id: ReservationId) -> Result<Option<Reservation>> {
        self.read(&reservation_key(id))
    }

    fn confirmed_holder(&mut self, slot: &SeatSlot) -> Result<Option<Reservation>> {
        Ok(self.slot_holder(slot)?.filter(|r| r.is_confirmed()))
    }

    fn create(&mut self, draft: NewReservation, policy: RebookPolicy) -> Result<ReservationId> {
        let slot = draft.slot();
        let holder = self.slot_holder(&slot)?;
        if holder.as_ref().is_some_and(|h| h.is_confirmed()) {
            return Err(BookingError::seat_taken(&draft.seat_label));
        }
        let id = match (policy, holder) {
            (RebookPolicy::ReuseCancelled, Some(cancelled)) => cancelled.id,
            _ => self.store.next_reservation_id.fetch_add(1, Ordering::SeqCst),
        };
        let reservation = draft.into_reservation(id, Utc::now());
        self.write(&reservation_key(id), &reservation)?;
        self.write(&seat_slot_key(&slot), &id)?;
        Ok(id)
    }

    fn set_status(
        &mut self,
        id: ReservationId,
        status: ReservationStatus,
        expected: Option<ReservationStatus>,
    ) -> Result<bool> {
        let key = reservation_key(id);
        let Some(mut reservation) = self.read::<Reservation>(&key)? else {
            return Ok(false);
        };
        if expected.is_some_and(|e| e != reservation.status) {
            return Ok(false);
        }
        if status == ReservationStatus::Confirmed {
            let slot = reservation.slot();
            if let Some(holder) = self.confirmed_holder(&slot)? {
                if holder.id != id {
                    return Err(BookingError::seat_taken(&reservation.seat_label));
                }
            }
            self.write(&seat_slot_key(&slot), &id)?;
        }
        reservation.status = status;
        self.write(&key, &reservation)?;
        Ok(true)
    }
}

impl StoreTxn for RocksDBTxn<'_> {
    fn commit(self: Box<Self>) -> Result<()> {
        self.txn.commit()?;
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<()> {
        self.txn.rollback()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn new_showing(seats: u32) -> NewShowing {
        NewShowing {
            movie_id: 1,
            theater_id: 4,
            start_time: Utc.with_ymd_and_hms(2030, 1, 15, 19, 30, 0).unwrap(),
            total_seats: seats,
        }
    }

    #[test]
    fn test_ledger_survives_reopen() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("ledger");

        let (showing_id, reservation_id) = {
            let store = RocksDBStore::open(&path).unwrap();
            let showing = store.insert_showing(new_showing(10)).unwrap();
            assert!(store.decrease(showing.id, 1).unwrap());
            let id = store
                .create_reservation(
                    NewReservation::single_seat(3, &showing, "F9"),
                    RebookPolicy::AlwaysInsert,
                )
                .unwrap();
            store.flush().unwrap();
            (showing.id, id)
        };

        let store = RocksDBStore::open(&path).unwrap();
        assert_eq!(store.showing(showing_id).unwrap().unwrap().available_seats, 9);
        assert_eq!(store.reservation(reservation_id).unwrap().unwrap().seat_label, "F9");

        // Id allocation continues after the highest persisted id.
        let next = store.insert_showing(new_showing(5)).unwrap();
        assert_eq!(next.id, showing_id + 1);
    }

    #[test]
    fn test_conditional_decrease_and_capped_increase() {
        let temp_dir = tempdir().unwrap();
        let store = RocksDBStore::open(temp_dir.path()).unwrap();
        let showing = store.insert_showing(new_showing(2)).unwrap();

        assert!(!store.increase(showing.id, 1).unwrap());
        assert!(store.decrease(showing.id, 2).unwrap());
        assert!(!store.decrease(showing.id, 1).unwrap());
        assert!(store.increase(showing.id, 1).unwrap());
        assert!(!store.decrease(showing.id + 100, 1).unwrap());
        assert_eq!(store.showing(showing.id).unwrap().unwrap().available_seats, 1);
    }

    #[test]
    fn test_rollback_discards_writes() {
        let temp_dir = tempdir().unwrap();
        let store = RocksDBStore::open(temp_dir.path()).unwrap();
        let showing = store.insert_showing(new_showing(3)).unwrap();

        let mut txn = store.begin().unwrap();
        assert!(txn.decrease(showing.id, 1).unwrap());
        txn.create(
            NewReservation::single_seat(1, &showing, "A1"),
            RebookPolicy::AlwaysInsert,
        )
        .unwrap();
        txn.rollback().unwrap();

        assert_eq!(store.showing(showing.id).unwrap().unwrap().available_seats, 3);
        assert!(store.reservations().unwrap().is_empty());
    }

    #[test]
    fn test_reuse_cancelled_keeps_identity() {
        let temp_dir = tempdir().unwrap();
        let store = RocksDBStore::open(temp_dir.path()).unwrap();
        let showing = store.insert_showing(new_showing(3)).unwrap();

        let first = store
            .create_reservation(
                NewReservation::single_seat(1, &showing, "B2"),
                RebookPolicy::ReuseCancelled,
            )
            .unwrap();
        assert!(store.set_status(first, ReservationStatus::Cancelled).unwrap());
        let second = store
            .create_reservation(
                NewReservation::single_seat(2, &showing, "B2"),
                RebookPolicy::ReuseCancelled,
            )
            .unwrap();

        assert_eq!(first, second);
        let row = store.reservation(second).unwrap().unwrap();
        assert_eq!(row.member_id, 2);
        assert_eq!(row.status, ReservationStatus::Confirmed);
        assert_eq!(store.reservations().unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_status_is_a_data_integrity_error() {
        let temp_dir = tempdir().unwrap();
        let store = RocksDBStore::open(temp_dir.path()).unwrap();
        let showing = store.insert_showing(new_showing(3)).unwrap();
        let id = store
            .create_reservation(
                NewReservation::single_seat(1, &showing, "D1"),
                RebookPolicy::AlwaysInsert,
            )
            .unwrap();

        let mut raw = serde_json::to_value(store.reservation(id).unwrap().unwrap()).unwrap();
        raw["status"] = serde_json::Value::String("PENDING".to_string());
        store
            .put_raw(&reservation_key(id), &serde_json::to_vec(&raw).unwrap())
            .unwrap();

        let err = store.reservation(id).unwrap_err();
        assert!(matches!(err, BookingError::DataIntegrity(_)));
        assert!(err.is_critical());
    }

    #[test]
    fn test_concurrent_commit_is_transient() {
        let temp_dir = tempdir().unwrap();
        let store = RocksDBStore::open(temp_dir.path()).unwrap();
        let showing = store.insert_showing(new_showing(3)).unwrap();

        let mut first = store.begin().unwrap();
        let mut second = store.begin().unwrap();
        assert!(first.decrease(showing.id, 1).unwrap());
        assert!(second.decrease(showing.id, 1).unwrap());
        first.commit().unwrap();

        let err = second.commit().unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(store.showing(showing.id).unwrap().unwrap().available_seats, 2);
    }
}
