use super::{ReservationDesk, Requester};
use crate::{
    BookingError, CancelOutcome, Entity, RecancelPolicy, Reservation, ReservationId,
    ReservationStatus, ReservationWriter, Result, SeatLedger, StoreTxn,
};
use tracing::{error, info, warn};

impl ReservationDesk {
    pub fn cancel_reservation(
        &self,
        reservation_id: ReservationId,
        requester: Requester,
    ) -> Result<CancelOutcome> {
        let reservation = self
            .store
            .reservation(reservation_id)?
            .ok_or(BookingError::NotFound(Entity::Reservation(reservation_id)))?;

        if let Requester::Member(member_id) = requester {
            if reservation.member_id != member_id {
                warn!(
                    "Member {} tried to cancel reservation {} owned by {}",
                    member_id, reservation_id, reservation.member_id
                );
                return Err(BookingError::Forbidden {
                    reservation_id,
                    member_id,
                });
            }
        }

        if !reservation.is_confirmed() {
            return self.already_cancelled(reservation_id);
        }

        if requester != Requester::Admin {
            self.check_window(&reservation)?;
        }

        self.transition(&reservation)
    }

    /// Admin status override. Does not touch the seat ledger.
    pub fn set_reservation_status(
        &self,
        reservation_id: ReservationId,
        status: ReservationStatus,
    ) -> Result<bool> {
        let changed = self.store.set_status(reservation_id, status)?;
        if changed {
            warn!(
                "Reservation {} status overridden to {}; inventory not adjusted",
                reservation_id, status
            );
        }
        Ok(changed)
    }

    /// Admin hard delete. Does not touch the seat ledger.
    pub fn delete_reservation(&self, reservation_id: ReservationId) -> Result<bool> {
        let deleted = self.store.delete_reservation(reservation_id)?;
        if deleted {
            warn!("Reservation {} deleted; inventory not adjusted", reservation_id);
        }
        Ok(deleted)
    }

    fn already_cancelled(&self, reservation_id: ReservationId) -> Result<CancelOutcome> {
        match self.policy.recancel {
            RecancelPolicy::Idempotent => {
                info!("Reservation {} already cancelled", reservation_id);
                Ok(CancelOutcome::AlreadyCancelled)
            }
            RecancelPolicy::Reject => Err(BookingError::AlreadyCancelled(reservation_id)),
        }
    }

    fn check_window(&self, reservation: &Reservation) -> Result<()> {
        let left = reservation.showing_time - self.clock.now();
        if left < self.policy.cancellation_window() {
            warn!(
                "Cancellation of reservation {} refused, showing starts in {} minute(s)",
                reservation.id,
                left.num_minutes()
            );
            return Err(BookingError::CancellationWindowExpired {
                minutes_left: left.num_minutes(),
                window_minutes: self.policy.cancellation_window_minutes,
            });
        }
        Ok(())
    }

    fn transition(&self, reservation: &Reservation) -> Result<CancelOutcome> {
        let mut txn = self.store.begin()?;

        let cancelled = match txn.set_status(
            reservation.id,
            ReservationStatus::Cancelled,
            Some(ReservationStatus::Confirmed),
        ) {
            Ok(cancelled) => cancelled,
            Err(e) => {
                discard(txn, reservation.id);
                return Err(e);
            }
        };
        if !cancelled {
            // Someone else changed the row since it was read.
            discard(txn, reservation.id);
            return match self.store.reservation(reservation.id)? {
                Some(current) if !current.is_confirmed() => self.already_cancelled(reservation.id),
                Some(_) => Err(BookingError::TransientStore(format!(
                    "reservation {} changed during cancellation",
                    reservation.id
                ))),
                None => Err(BookingError::NotFound(Entity::Reservation(reservation.id))),
            };
        }

        let restored = match txn.increase(reservation.showing_id, reservation.ticket_count) {
            Ok(restored) => restored,
            Err(e) => {
                discard(txn, reservation.id);
                return Err(e);
            }
        };
        txn.commit()?;

        if !restored {
            error!(
                "Reservation {} cancelled but {} seat(s) could not be returned to showing {}",
                reservation.id, reservation.ticket_count, reservation.showing_id
            );
            return Err(BookingError::Inconsistent {
                reservation_id: reservation.id,
                showing_id: reservation.showing_id,
                detail: format!("{} seat(s) not restored", reservation.ticket_count),
            });
        }

        info!(
            "Reservation {} for seat {} cancelled, showing {} regained {} seat(s)",
            reservation.id, reservation.seat_label, reservation.showing_id, reservation.ticket_count
        );
        Ok(CancelOutcome::Cancelled {
            seats_restored: reservation.ticket_count,
        })
    }
}

/// Rolls back an abandoned cancellation. A failed rollback is logged so the error that
/// caused it reaches the caller.
fn discard(txn: Box<dyn StoreTxn + '_>, reservation_id: ReservationId) {
    if let Err(e) = txn.rollback() {
        error!("Rollback of cancellation {} failed: {}", reservation_id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::testing::*;
    use crate::{
        BookingPolicy, FixedClock, MemoryStore, NewReservation, NewShowing, RebookPolicy,
        SeatSlot, SeatStore, Showing, ShowingId,
    };
    use chrono::Duration;
    use std::sync::Arc;

    #[test]
    fn test_cancel_restores_seat_and_allows_rebook() {
        let (desk, _) = desk(BookingPolicy::default());
        let showing = showing(&desk, FAMILY_MOVIE, 5, Duration::minutes(40));
        let id = desk.book_tickets(ADULT, showing.id, &seats(&["A1"])).unwrap()[0];

        let outcome = desk.cancel_reservation(id, Requester::Member(ADULT)).unwrap();

        assert_eq!(outcome, CancelOutcome::Cancelled { seats_restored: 1 });
        assert_eq!(desk.store().showing(showing.id).unwrap().unwrap().available_seats, 5);
        assert_eq!(
            desk.reservation(id).unwrap().unwrap().status,
            ReservationStatus::Cancelled
        );
        let rebooked = desk.book_tickets(OTHER_ADULT, showing.id, &seats(&["A1"])).unwrap();
        assert_ne!(rebooked[0], id);
    }

    #[test]
    fn test_window_boundary() {
        let (desk, clock) = desk(BookingPolicy::default());
        let showing = showing(&desk, FAMILY_MOVIE, 5, Duration::minutes(60));
        let ids = desk
            .book_tickets(ADULT, showing.id, &seats(&["A1", "A2"]))
            .unwrap();

        clock.advance(Duration::minutes(30));
        assert!(desk.cancel_reservation(ids[0], Requester::Member(ADULT)).is_ok());

        clock.advance(Duration::seconds(1));
        let err = desk
            .cancel_reservation(ids[1], Requester::Member(ADULT))
            .unwrap_err();
        assert!(matches!(
            err,
            BookingError::CancellationWindowExpired {
                minutes_left: 29,
                window_minutes: 30
            }
        ));

        // Admins are not bound by the window.
        assert!(desk.cancel_reservation(ids[1], Requester::Admin).is_ok());
    }

    #[test]
    fn test_only_owner_may_cancel() {
        let (desk, _) = desk(BookingPolicy::default());
        let showing = showing(&desk, FAMILY_MOVIE, 5, Duration::hours(3));
        let id = desk.book_tickets(ADULT, showing.id, &seats(&["A1"])).unwrap()[0];

        let err = desk
            .cancel_reservation(id, Requester::Member(OTHER_ADULT))
            .unwrap_err();

        assert!(matches!(err, BookingError::Forbidden { member_id: OTHER_ADULT, .. }));
        assert!(desk.reservation(id).unwrap().unwrap().is_confirmed());
    }

    #[test]
    fn test_recancel_policies() {
        let (idempotent, _) = desk(BookingPolicy::default());
        let showing_a = showing(&idempotent, FAMILY_MOVIE, 5, Duration::hours(3));
        let id = idempotent
            .book_tickets(ADULT, showing_a.id, &seats(&["A1"]))
            .unwrap()[0];
        idempotent.cancel_reservation(id, Requester::Member(ADULT)).unwrap();
        assert_eq!(
            idempotent.cancel_reservation(id, Requester::Member(ADULT)).unwrap(),
            CancelOutcome::AlreadyCancelled
        );
        assert_eq!(
            idempotent.store().showing(showing_a.id).unwrap().unwrap().available_seats,
            5
        );

        let (rejecting, _) = desk(BookingPolicy {
            recancel: RecancelPolicy::Reject,
            ..BookingPolicy::default()
        });
        let showing_b = showing(&rejecting, FAMILY_MOVIE, 5, Duration::hours(3));
        let id = rejecting
            .book_tickets(ADULT, showing_b.id, &seats(&["A1"]))
            .unwrap()[0];
        rejecting.cancel_reservation(id, Requester::Member(ADULT)).unwrap();
        assert!(matches!(
            rejecting.cancel_reservation(id, Requester::Member(ADULT)).unwrap_err(),
            BookingError::AlreadyCancelled(rid) if rid == id
        ));
    }

    #[test]
    fn test_failed_restore_keeps_cancellation() {
        let (desk, _) = desk(BookingPolicy::default());
        let showing = showing(&desk, FAMILY_MOVIE, 1, Duration::hours(3));
        let id = desk.book_tickets(ADULT, showing.id, &seats(&["A1"])).unwrap()[0];
        // Seat handed back out of band, so the counter is already at capacity.
        assert!(desk.store().increase(showing.id, 1).unwrap());

        let err = desk.cancel_reservation(id, Requester::Member(ADULT)).unwrap_err();

        assert!(err.is_critical());
        assert!(matches!(err, BookingError::Inconsistent { reservation_id, .. } if reservation_id == id));
        assert_eq!(
            desk.reservation(id).unwrap().unwrap().status,
            ReservationStatus::Cancelled
        );
        assert_eq!(desk.store().showing(showing.id).unwrap().unwrap().available_seats, 1);
    }

    #[test]
    fn test_missing_reservation() {
        let (desk, _) = desk(BookingPolicy::default());
        assert!(matches!(
            desk.cancel_reservation(77, Requester::Admin).unwrap_err(),
            BookingError::NotFound(Entity::Reservation(77))
        ));
    }

    #[test]
    fn test_admin_overrides_skip_the_ledger() {
        let (desk, _) = desk(BookingPolicy::default());
        let showing = showing(&desk, FAMILY_MOVIE, 5, Duration::hours(3));
        let id = desk.book_tickets(ADULT, showing.id, &seats(&["A1"])).unwrap()[0];

        assert!(desk
            .set_reservation_status(id, ReservationStatus::Cancelled)
            .unwrap());
        assert_eq!(desk.store().showing(showing.id).unwrap().unwrap().available_seats, 4);

        assert!(desk.delete_reservation(id).unwrap());
        assert!(!desk.delete_reservation(id).unwrap());
        assert!(desk.reservation(id).unwrap().is_none());
    }

    /// Memory store whose transactions refuse to hand seats back and then fail to roll
    /// back as well.
    struct BrokenRestore(MemoryStore);

    struct BrokenRestoreTxn<'a>(Box<dyn StoreTxn + 'a>);

    impl SeatLedger for BrokenRestoreTxn<'_> {
        fn decrease(&mut self, showing_id: ShowingId, count: u32) -> Result<bool> {
            self.0.decrease(showing_id, count)
        }

        fn increase(&mut self, _showing_id: ShowingId, _count: u32) -> Result<bool> {
            Err(BookingError::TransientStore("restore refused".into()))
        }
    }

    impl ReservationWriter for BrokenRestoreTxn<'_> {
        fn showing(&mut self, id: ShowingId) -> Result<Option<Showing>> {
            self.0.showing(id)
        }

        fn reservation(&mut self, id: ReservationId) -> Result<Option<Reservation>> {
            self.0.reservation(id)
        }

        fn confirmed_holder(&mut self, slot: &SeatSlot) -> Result<Option<Reservation>> {
            self.0.confirmed_holder(slot)
        }

        fn create(&mut self, draft: NewReservation, policy: RebookPolicy) -> Result<ReservationId> {
            self.0.create(draft, policy)
        }

        fn set_status(
            &mut self,
            id: ReservationId,
            status: ReservationStatus,
            expected: Option<ReservationStatus>,
        ) -> Result<bool> {
            self.0.set_status(id, status, expected)
        }
    }

    impl StoreTxn for BrokenRestoreTxn<'_> {
        fn commit(self: Box<Self>) -> Result<()> {
            self.0.commit()
        }

        fn rollback(self: Box<Self>) -> Result<()> {
            self.0.rollback()?;
            Err(BookingError::DataIntegrity("undo journal lost".into()))
        }
    }

    impl SeatStore for BrokenRestore {
        fn name(&self) -> &str {
            "broken-restore"
        }

        fn begin(&self) -> Result<Box<dyn StoreTxn + '_>> {
            Ok(Box::new(BrokenRestoreTxn(self.0.begin()?)))
        }

        fn insert_showing(&self, draft: NewShowing) -> Result<Showing> {
            self.0.insert_showing(draft)
        }

        fn showing(&self, id: ShowingId) -> Result<Option<Showing>> {
            SeatStore::showing(&self.0, id)
        }

        fn showings(&self) -> Result<Vec<Showing>> {
            self.0.showings()
        }

        fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>> {
            SeatStore::reservation(&self.0, id)
        }

        fn reservations(&self) -> Result<Vec<Reservation>> {
            self.0.reservations()
        }

        fn delete_reservation(&self, id: ReservationId) -> Result<bool> {
            self.0.delete_reservation(id)
        }

        fn flush(&self) -> Result<()> {
            self.0.flush()
        }
    }

    #[test]
    fn test_failed_rollback_keeps_the_original_error() {
        let desk = ReservationDesk::with_clock(
            Arc::new(BrokenRestore(MemoryStore::new())),
            Arc::new(catalog()),
            BookingPolicy::default(),
            Arc::new(FixedClock::new(now())),
        );
        let showing = showing(&desk, FAMILY_MOVIE, 5, Duration::hours(3));
        let id = desk.book_tickets(ADULT, showing.id, &seats(&["A1"])).unwrap()[0];

        let err = desk.cancel_reservation(id, Requester::Member(ADULT)).unwrap_err();

        assert!(matches!(err, BookingError::TransientStore(ref msg) if msg == "restore refused"));
        assert!(desk.reservation(id).unwrap().unwrap().is_confirmed());
        assert_eq!(desk.store().showing(showing.id).unwrap().unwrap().available_seats, 4);
    }
}
