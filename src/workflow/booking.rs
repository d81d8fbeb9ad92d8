use super::ReservationDesk;
use crate::{
    BookingError, Entity, MemberId, MovieId, NewReservation, NewShowing, RebookPolicy,
    ReservationId, Result, SeatConflict, Showing, ShowingId, StoreTxn, TheaterId,
};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

impl ReservationDesk {
    /// Books one seat per label for `member_id`, all or nothing.
    ///
    /// Returns the new reservation ids in request order.
    pub fn book_tickets(
        &self,
        member_id: MemberId,
        showing_id: ShowingId,
        seat_labels: &[String],
    ) -> Result<Vec<ReservationId>> {
        let seats = normalize_labels(seat_labels)?;

        let member = self
            .catalog
            .member(member_id)?
            .ok_or(BookingError::NotFound(Entity::Member(member_id)))?;
        let showing = self
            .store
            .showing(showing_id)?
            .ok_or(BookingError::NotFound(Entity::Showing(showing_id)))?;
        let movie = self
            .catalog
            .movie(showing.movie_id)?
            .ok_or(BookingError::NotFound(Entity::Movie(showing.movie_id)))?;

        if !self.policy.ratings.admits(movie.rating, member.age) {
            warn!(
                "Member {} (age {}) refused for '{}' rated {}",
                member_id, member.age, movie.title, movie.rating
            );
            return Err(BookingError::AgeRestricted {
                age: member.age,
                minimum_age: self.policy.ratings.minimum_age(movie.rating),
            });
        }

        let mut txn = self.store.begin()?;
        match reserve_seats(txn.as_mut(), member_id, &showing, &seats, self.policy.rebook) {
            Ok(ids) => {
                txn.commit()?;
                info!(
                    "Member {} booked {} seat(s) {:?} for showing {}",
                    member_id,
                    ids.len(),
                    seats,
                    showing_id
                );
                Ok(ids)
            }
            Err(e) => {
                if let Err(rollback) = txn.rollback() {
                    error!("Rollback after failed booking on showing {} failed: {}", showing_id, rollback);
                }
                warn!("Booking for member {} on showing {} rejected: {}", member_id, showing_id, e);
                Err(e)
            }
        }
    }

    /// Creates a showing with every seat of the theater available.
    pub fn schedule_showing(
        &self,
        movie_id: MovieId,
        theater_id: TheaterId,
        start_time: DateTime<Utc>,
    ) -> Result<Showing> {
        self.catalog
            .movie(movie_id)?
            .ok_or(BookingError::NotFound(Entity::Movie(movie_id)))?;
        let theater = self
            .catalog
            .theater(theater_id)?
            .ok_or(BookingError::NotFound(Entity::Theater(theater_id)))?;

        let showing = self.store.insert_showing(NewShowing {
            movie_id,
            theater_id,
            start_time,
            total_seats: theater.total_seats,
        })?;
        info!(
            "Scheduled showing {} of movie {} in {} at {} ({} seats)",
            showing.id, movie_id, theater.label, start_time, showing.total_seats
        );
        Ok(showing)
    }
}

/// Seat conflict check, inventory decrement and persistence, inside one transaction.
fn reserve_seats<T>(
    txn: &mut T,
    member_id: MemberId,
    showing: &Showing,
    seats: &[String],
    policy: RebookPolicy,
) -> Result<Vec<ReservationId>>
where
    T: StoreTxn + ?Sized,
{
    let drafts: Vec<NewReservation> = seats
        .iter()
        .map(|seat| NewReservation::single_seat(member_id, showing, seat))
        .collect();

    for draft in &drafts {
        if let Some(holder) = txn.confirmed_holder(&draft.slot())? {
            debug!("Seat {} held by reservation {}", draft.seat_label, holder.id);
            return Err(BookingError::seat_taken(&draft.seat_label));
        }
    }

    let requested = drafts.iter().map(|d| d.ticket_count).sum();
    if !txn.decrease(showing.id, requested)? {
        return Err(BookingError::SeatUnavailable(SeatConflict::Insufficient { requested }));
    }

    drafts
        .into_iter()
        .map(|draft| txn.create(draft, policy))
        .collect()
}

fn normalize_labels(seat_labels: &[String]) -> Result<Vec<String>> {
    if seat_labels.is_empty() {
        return Err(BookingError::InvalidArgument(
            "At least one seat must be requested".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    let mut seats = Vec::with_capacity(seat_labels.len());
    for label in seat_labels {
        let label = label.trim();
        if label.is_empty() {
            return Err(BookingError::InvalidArgument("Seat label is empty".to_string()));
        }
        if !seen.insert(label.to_string()) {
            return Err(BookingError::InvalidArgument(format!(
                "Seat {} requested more than once",
                label
            )));
        }
        seats.push(label.to_string());
    }
    Ok(seats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::testing::*;
    use crate::{BookingPolicy, ReservationStatus};
    use chrono::Duration;

    #[test]
    fn test_books_seats_in_request_order() {
        let (desk, _) = desk(BookingPolicy::default());
        let showing = showing(&desk, FAMILY_MOVIE, 5, Duration::hours(2));

        let ids = desk
            .book_tickets(ADULT, showing.id, &seats(&["C3", " A1 "]))
            .unwrap();

        assert_eq!(ids.len(), 2);
        let first = desk.reservation(ids[0]).unwrap().unwrap();
        let second = desk.reservation(ids[1]).unwrap().unwrap();
        assert_eq!(first.seat_label, "C3");
        assert_eq!(second.seat_label, "A1");
        assert_eq!(first.ticket_count, 1);
        assert_eq!(first.status, ReservationStatus::Confirmed);
        assert_eq!(desk.store().showing(showing.id).unwrap().unwrap().available_seats, 3);
    }

    #[test]
    fn test_age_restriction_leaves_inventory_alone() {
        let (desk, _) = desk(BookingPolicy::default());
        let showing = showing(&desk, TEEN_MOVIE, 5, Duration::hours(2));

        let err = desk.book_tickets(CHILD, showing.id, &seats(&["A1"])).unwrap_err();

        assert!(matches!(
            err,
            BookingError::AgeRestricted {
                age: 10,
                minimum_age: 13
            }
        ));
        assert_eq!(desk.store().showing(showing.id).unwrap().unwrap().available_seats, 5);
        assert!(desk.list_all_reservations().unwrap().is_empty());
    }

    #[test]
    fn test_taken_seat_fails_whole_request() {
        let (desk, _) = desk(BookingPolicy::default());
        let showing = showing(&desk, FAMILY_MOVIE, 5, Duration::hours(2));
        desk.book_tickets(ADULT, showing.id, &seats(&["B2"])).unwrap();

        let err = desk
            .book_tickets(OTHER_ADULT, showing.id, &seats(&["B1", "B2"]))
            .unwrap_err();

        assert!(matches!(
            err,
            BookingError::SeatUnavailable(SeatConflict::Taken { ref seat }) if seat == "B2"
        ));
        assert_eq!(desk.store().showing(showing.id).unwrap().unwrap().available_seats, 4);
        assert!(desk.list_reservations(OTHER_ADULT).unwrap().is_empty());
    }

    #[test]
    fn test_insufficient_capacity() {
        let (desk, _) = desk(BookingPolicy::default());
        let showing = showing(&desk, FAMILY_MOVIE, 2, Duration::hours(2));

        let err = desk
            .book_tickets(ADULT, showing.id, &seats(&["A1", "A2", "A3"]))
            .unwrap_err();

        assert!(matches!(
            err,
            BookingError::SeatUnavailable(SeatConflict::Insufficient { requested: 3 })
        ));
        assert_eq!(desk.store().showing(showing.id).unwrap().unwrap().available_seats, 2);
    }

    #[test]
    fn test_rejects_bad_labels() {
        let (desk, _) = desk(BookingPolicy::default());
        let showing = showing(&desk, FAMILY_MOVIE, 5, Duration::hours(2));

        for labels in [vec![], seats(&["A1", "A1 "]), seats(&["  "])] {
            let err = desk.book_tickets(ADULT, showing.id, &labels).unwrap_err();
            assert!(matches!(err, BookingError::InvalidArgument(_)));
        }
    }

    #[test]
    fn test_unknown_member_and_showing() {
        let (desk, _) = desk(BookingPolicy::default());
        let showing = showing(&desk, FAMILY_MOVIE, 5, Duration::hours(2));

        assert!(matches!(
            desk.book_tickets(99, showing.id, &seats(&["A1"])).unwrap_err(),
            BookingError::NotFound(Entity::Member(99))
        ));
        assert!(matches!(
            desk.book_tickets(ADULT, 404, &seats(&["A1"])).unwrap_err(),
            BookingError::NotFound(Entity::Showing(404))
        ));
    }

    #[test]
    fn test_schedule_uses_theater_capacity() {
        let (desk, _) = desk(BookingPolicy::default());

        let showing = desk
            .schedule_showing(FAMILY_MOVIE, HALL, now() + Duration::days(1))
            .unwrap();

        assert_eq!(showing.total_seats, 5);
        assert_eq!(showing.available_seats, 5);
        assert!(matches!(
            desk.schedule_showing(FAMILY_MOVIE, 999, now()).unwrap_err(),
            BookingError::NotFound(Entity::Theater(999))
        ));
    }
}
