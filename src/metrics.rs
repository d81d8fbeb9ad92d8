use crate::Result;
use prometheus::{
    register_counter_vec_with_registry, register_counter_with_registry,
    register_histogram_vec_with_registry, Counter, CounterVec, Encoder, HistogramOpts,
    HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

/// Metrics collector for the reservation service
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,

    // Booking
    pub booking_requests: Counter,
    pub bookings_confirmed: Counter,
    pub booking_rejections: CounterVec,
    pub seats_reserved: Counter,

    // Cancellation
    pub cancellation_requests: Counter,
    pub cancellations: Counter,
    pub seats_restored: Counter,
    pub cancellation_rejections: CounterVec,

    // Store
    pub store_retries: Counter,
    pub inconsistencies: Counter,

    pub workflow_duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let booking_requests = register_counter_with_registry!(
            Opts::new("booking_requests_total", "Total number of booking requests"),
            registry
        )?;

        let bookings_confirmed = register_counter_with_registry!(
            Opts::new("bookings_confirmed_total", "Total number of bookings confirmed"),
            registry
        )?;

        let booking_rejections = register_counter_vec_with_registry!(
            Opts::new("booking_rejections_total", "Booking requests rejected, by reason"),
            &["reason"],
            registry
        )?;

        let seats_reserved = register_counter_with_registry!(
            Opts::new("seats_reserved_total", "Total number of seats reserved"),
            registry
        )?;

        let cancellation_requests = register_counter_with_registry!(
            Opts::new("cancellation_requests_total", "Total number of cancellation requests"),
            registry
        )?;

        let cancellations = register_counter_with_registry!(
            Opts::new("cancellations_total", "Total number of reservations cancelled"),
            registry
        )?;

        let seats_restored = register_counter_with_registry!(
            Opts::new("seats_restored_total", "Total number of seats returned to inventory"),
            registry
        )?;

        let cancellation_rejections = register_counter_vec_with_registry!(
            Opts::new(
                "cancellation_rejections_total",
                "Cancellation requests rejected, by reason"
            ),
            &["reason"],
            registry
        )?;

        let store_retries = register_counter_with_registry!(
            Opts::new("store_retries_total", "Store operations retried after a transient failure"),
            registry
        )?;

        let inconsistencies = register_counter_with_registry!(
            Opts::new(
                "inventory_inconsistencies_total",
                "Cancellations whose seats could not be restored"
            ),
            registry
        )?;

        let workflow_duration = register_histogram_vec_with_registry!(
            HistogramOpts::new("workflow_duration_seconds", "Time spent running workflows")
                .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["workflow"],
            registry
        )?;

        Ok(Self {
            registry,
            booking_requests,
            bookings_confirmed,
            booking_rejections,
            seats_reserved,
            cancellation_requests,
            cancellations,
            seats_restored,
            cancellation_rejections,
            store_retries,
            inconsistencies,
            workflow_duration,
        })
    }

    /// Export metrics in Prometheus format
    pub fn export(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| crate::BookingError::InvalidArgument(e.to_string()))
    }

    pub fn record_booking(&self, outcome: std::result::Result<usize, &crate::BookingError>, duration: Duration) {
        self.booking_requests.inc();
        self.workflow_duration
            .with_label_values(&["booking"])
            .observe(duration.as_secs_f64());
        match outcome {
            Ok(seats) => {
                self.bookings_confirmed.inc();
                self.seats_reserved.inc_by(seats as f64);
            }
            Err(e) => self.booking_rejections.with_label_values(&[e.reason()]).inc(),
        }
    }

    pub fn record_cancellation(
        &self,
        outcome: std::result::Result<u32, &crate::BookingError>,
        duration: Duration,
    ) {
        self.cancellation_requests.inc();
        self.workflow_duration
            .with_label_values(&["cancellation"])
            .observe(duration.as_secs_f64());
        match outcome {
            Ok(0) => {}
            Ok(seats) => {
                self.cancellations.inc();
                self.seats_restored.inc_by(f64::from(seats));
            }
            Err(e) => {
                if e.is_critical() {
                    self.inconsistencies.inc();
                }
                self.cancellation_rejections
                    .with_label_values(&[e.reason()])
                    .inc();
            }
        }
    }

    pub fn record_retry(&self) {
        self.store_retries.inc();
    }
}

/// Health check endpoint
pub async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": "cinema-reservations"
    }))
}

/// Metrics endpoint for Prometheus scraping
pub async fn metrics_endpoint(
    axum::extract::State(metrics): axum::extract::State<Arc<Metrics>>,
) -> axum::response::Result<String> {
    match metrics.export() {
        Ok(metrics_data) => Ok(metrics_data),
        Err(e) => {
            tracing::error!("Failed to export metrics: {}", e);
            Err(axum::response::ErrorResponse::from(
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            ))
        }
    }
}
