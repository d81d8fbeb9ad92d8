use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use cinema_reservations::{
    BookingError, BookingService, CancelOutcome, InventoryAudit, MemberId, MovieId, Reservation,
    ReservationId, ReservationStatus, Result, Showing, ShowingId, TheaterId,
};
use serde::{Deserialize, Serialize};
use tracing::error;

#[derive(Debug, Deserialize)]
pub struct ScheduleShowingRequest {
    movie_id: MovieId,
    theater_id: TheaterId,
    start_time: String,
}

#[derive(Debug, Deserialize)]
pub struct BookTicketsRequest {
    member_id: MemberId,
    seats: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    member_id: MemberId,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    status: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default)]
    history: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

type Reply<T> = (StatusCode, Json<ApiResponse<T>>);

pub fn router(service: BookingService) -> Router {
    Router::new()
        .route("/showings", get(list_showings).post(schedule_showing))
        .route("/showings/:showing_id", get(get_showing))
        .route("/showings/:showing_id/audit", get(audit_showing))
        .route("/showings/:showing_id/reservations", get(showing_reservations))
        .route("/showings/:showing_id/bookings", post(book_tickets))
        .route("/members/:member_id/reservations", get(member_reservations))
        .route("/reservations/:reservation_id", get(get_reservation))
        .route("/reservations/:reservation_id/cancel", post(cancel_reservation))
        .route("/admin/reservations", get(all_reservations))
        .route(
            "/admin/reservations/:reservation_id",
            axum::routing::delete(delete_reservation),
        )
        .route("/admin/reservations/:reservation_id/cancel", post(admin_cancel))
        .route("/admin/reservations/:reservation_id/status", put(set_status))
        .with_state(service)
}

fn status_for(e: &BookingError) -> StatusCode {
    match e {
        BookingError::NotFound(_) => StatusCode::NOT_FOUND,
        BookingError::AgeRestricted { .. } | BookingError::Forbidden { .. } => StatusCode::FORBIDDEN,
        BookingError::SeatUnavailable(_)
        | BookingError::CancellationWindowExpired { .. }
        | BookingError::AlreadyCancelled(_) => StatusCode::CONFLICT,
        BookingError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        BookingError::TransientStore(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reply<T>(context: &str, result: Result<T>) -> Reply<T> {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::success(data))),
        Err(e) => {
            let status = status_for(&e);
            if status.is_server_error() {
                error!("Error {}: {}", context, e);
            }
            (status, Json(ApiResponse::error(e.to_string())))
        }
    }
}

fn found<T>(what: &str, result: Result<Option<T>>) -> Reply<T> {
    match result {
        Ok(Some(data)) => (StatusCode::OK, Json(ApiResponse::success(data))),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("{} not found", what))),
        ),
        Err(e) => reply(what, Err(e)),
    }
}

async fn schedule_showing(
    State(service): State<BookingService>,
    Json(request): Json<ScheduleShowingRequest>,
) -> Reply<Showing> {
    let result = match parse_timestamp(&request.start_time) {
        Ok(start_time) => {
            service
                .schedule_showing(request.movie_id, request.theater_id, start_time)
                .await
        }
        Err(e) => Err(e),
    };
    reply("scheduling showing", result)
}

async fn list_showings(State(service): State<BookingService>) -> Reply<Vec<Showing>> {
    reply("listing showings", service.list_showings().await)
}

async fn get_showing(
    State(service): State<BookingService>,
    Path(showing_id): Path<ShowingId>,
) -> Reply<Showing> {
    found("Showing", service.showing(showing_id).await)
}

async fn audit_showing(
    State(service): State<BookingService>,
    Path(showing_id): Path<ShowingId>,
) -> Reply<InventoryAudit> {
    reply("auditing showing", service.audit_showing(showing_id).await)
}

async fn showing_reservations(
    State(service): State<BookingService>,
    Path(showing_id): Path<ShowingId>,
) -> Reply<Vec<Reservation>> {
    reply(
        "listing showing reservations",
        service.list_showing_reservations(showing_id).await,
    )
}

async fn book_tickets(
    State(service): State<BookingService>,
    Path(showing_id): Path<ShowingId>,
    Json(request): Json<BookTicketsRequest>,
) -> Reply<Vec<ReservationId>> {
    reply(
        "booking tickets",
        service
            .book_tickets(request.member_id, showing_id, request.seats)
            .await,
    )
}

async fn member_reservations(
    State(service): State<BookingService>,
    Path(member_id): Path<MemberId>,
    Query(params): Query<HistoryParams>,
) -> Reply<Vec<Reservation>> {
    let result = if params.history {
        service.list_reservation_history(member_id).await
    } else {
        service.list_reservations(member_id).await
    };
    reply("listing member reservations", result)
}

async fn all_reservations(State(service): State<BookingService>) -> Reply<Vec<Reservation>> {
    reply("listing reservations", service.list_all_reservations().await)
}

async fn get_reservation(
    State(service): State<BookingService>,
    Path(reservation_id): Path<ReservationId>,
) -> Reply<Reservation> {
    found("Reservation", service.reservation(reservation_id).await)
}

async fn cancel_reservation(
    State(service): State<BookingService>,
    Path(reservation_id): Path<ReservationId>,
    Json(request): Json<CancelRequest>,
) -> Reply<CancelOutcome> {
    reply(
        "cancelling reservation",
        service
            .cancel_reservation(reservation_id, request.member_id)
            .await,
    )
}

async fn admin_cancel(
    State(service): State<BookingService>,
    Path(reservation_id): Path<ReservationId>,
) -> Reply<CancelOutcome> {
    reply(
        "cancelling reservation",
        service.cancel_reservation_as_admin(reservation_id).await,
    )
}

async fn set_status(
    State(service): State<BookingService>,
    Path(reservation_id): Path<ReservationId>,
    Json(request): Json<StatusRequest>,
) -> Reply<bool> {
    let result = match request.status.parse::<ReservationStatus>() {
        Ok(status) => service.set_reservation_status(reservation_id, status).await,
        Err(e) => Err(e),
    };
    reply("overriding reservation status", result)
}

async fn delete_reservation(
    State(service): State<BookingService>,
    Path(reservation_id): Path<ReservationId>,
) -> Reply<bool> {
    reply(
        "deleting reservation",
        service.delete_reservation(reservation_id).await,
    )
}

fn parse_timestamp(timestamp_str: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(timestamp_str) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(millis) = timestamp_str.parse::<i64>() {
        if let Some(dt) = DateTime::from_timestamp_millis(millis) {
            return Ok(dt);
        }
    }

    Err(BookingError::InvalidArgument(format!(
        "Invalid timestamp format: {}",
        timestamp_str
    )))
}
