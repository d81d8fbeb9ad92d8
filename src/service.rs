use crate::retry::{retry_with_backoff, with_timeout};
use crate::{
    BookingError, CancelOutcome, InventoryAudit, MemberId, Metrics, MovieId, Requester,
    Reservation, ReservationDesk, ReservationId, ReservationStatus, Result, RetryConfig, Showing,
    ShowingId, TheaterId,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::error;

/// Async front door to the reservation workflows.
///
/// Each call runs the synchronous workflow on tokio's blocking pool and retries it when
/// the store reports a transient conflict.
#[derive(Clone)]
pub struct BookingService {
    desk: Arc<ReservationDesk>,
    retry: RetryConfig,
    metrics: Arc<Metrics>,
}

impl BookingService {
    pub fn new(desk: ReservationDesk, retry: RetryConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            desk: Arc::new(desk),
            retry,
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn desk(&self) -> &ReservationDesk {
        &self.desk
    }

    async fn run<T, F>(&self, operation_name: &str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: Fn(&ReservationDesk) -> Result<T> + Send + Sync + Clone + 'static,
    {
        let metrics = self.metrics.clone();
        let limit = self.retry.attempt_timeout;
        retry_with_backoff(
            &self.retry,
            operation_name,
            || {
                let desk = self.desk.clone();
                let f = f.clone();
                // A timed-out attempt keeps running on the blocking pool and may still
                // commit. Its retry then finds the seats held and fails cleanly.
                let attempt = async move {
                    tokio::task::spawn_blocking(move || f(&desk))
                        .await
                        .map_err(|e| BookingError::Io(std::io::Error::other(e)))?
                };
                with_timeout(limit, operation_name, attempt)
            },
            |_| metrics.record_retry(),
        )
        .await
    }

    pub async fn book_tickets(
        &self,
        member_id: MemberId,
        showing_id: ShowingId,
        seat_labels: Vec<String>,
    ) -> Result<Vec<ReservationId>> {
        let started = Instant::now();
        let seats = Arc::new(seat_labels);
        let result = self
            .run("book_tickets", move |desk| {
                desk.book_tickets(member_id, showing_id, &seats)
            })
            .await;
        self.metrics.record_booking(
            result.as_ref().map(|ids| ids.len()),
            started.elapsed(),
        );
        result
    }

    pub async fn cancel_reservation(
        &self,
        reservation_id: ReservationId,
        member_id: MemberId,
    ) -> Result<CancelOutcome> {
        self.cancel(reservation_id, Requester::Member(member_id)).await
    }

    pub async fn cancel_reservation_as_admin(
        &self,
        reservation_id: ReservationId,
    ) -> Result<CancelOutcome> {
        self.cancel(reservation_id, Requester::Admin).await
    }

    async fn cancel(&self, reservation_id: ReservationId, requester: Requester) -> Result<CancelOutcome> {
        let started = Instant::now();
        let result = self
            .run("cancel_reservation", move |desk| {
                desk.cancel_reservation(reservation_id, requester)
            })
            .await;

        if let Err(e) = &result {
            if e.is_critical() {
                error!("Cancellation of reservation {} needs reconciliation: {}", reservation_id, e);
            }
        }
        self.metrics.record_cancellation(
            result.as_ref().map(|outcome| match outcome {
                CancelOutcome::Cancelled { seats_restored } => *seats_restored,
                CancelOutcome::AlreadyCancelled => 0,
            }),
            started.elapsed(),
        );
        result
    }

    pub async fn schedule_showing(
        &self,
        movie_id: MovieId,
        theater_id: TheaterId,
        start_time: DateTime<Utc>,
    ) -> Result<Showing> {
        self.run("schedule_showing", move |desk| {
            desk.schedule_showing(movie_id, theater_id, start_time)
        })
        .await
    }

    pub async fn showing(&self, showing_id: ShowingId) -> Result<Option<Showing>> {
        self.run("showing", move |desk| desk.store().showing(showing_id))
            .await
    }

    pub async fn list_showings(&self) -> Result<Vec<Showing>> {
        self.run("list_showings", |desk| desk.list_showings()).await
    }

    pub async fn audit_showing(&self, showing_id: ShowingId) -> Result<InventoryAudit> {
        self.run("audit_showing", move |desk| desk.audit_showing(showing_id))
            .await
    }

    pub async fn reservation(&self, reservation_id: ReservationId) -> Result<Option<Reservation>> {
        self.run("reservation", move |desk| desk.reservation(reservation_id))
            .await
    }

    pub async fn list_reservations(&self, member_id: MemberId) -> Result<Vec<Reservation>> {
        self.run("list_reservations", move |desk| desk.list_reservations(member_id))
            .await
    }

    pub async fn list_reservation_history(&self, member_id: MemberId) -> Result<Vec<Reservation>> {
        self.run("list_reservation_history", move |desk| {
            desk.list_reservation_history(member_id)
        })
        .await
    }

    pub async fn list_all_reservations(&self) -> Result<Vec<Reservation>> {
        self.run("list_all_reservations", |desk| desk.list_all_reservations())
            .await
    }

    pub async fn list_showing_reservations(&self, showing_id: ShowingId) -> Result<Vec<Reservation>> {
        self.run("list_showing_reservations", move |desk| {
            desk.list_showing_reservations(showing_id)
        })
        .await
    }

    pub async fn set_reservation_status(
        &self,
        reservation_id: ReservationId,
        status: ReservationStatus,
    ) -> Result<bool> {
        self.run("set_reservation_status", move |desk| {
            desk.set_reservation_status(reservation_id, status)
        })
        .await
    }

    pub async fn delete_reservation(&self, reservation_id: ReservationId) -> Result<bool> {
        self.run("delete_reservation", move |desk| {
            desk.delete_reservation(reservation_id)
        })
        .await
    }
}
