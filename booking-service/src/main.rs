use anyhow::Context;
use axum::{routing::get, Router};
use cinema_reservations::metrics::{health_check, metrics_endpoint};
use cinema_reservations::shutdown::shutdown_signal;
use cinema_reservations::{
    apply_env_overrides, open_store, parse_properties_file, BookingService, Catalog, Metrics,
    ReservationDesk, ServiceConfig, ShutdownCoordinator, StoreShutdown,
};
use clap::Parser;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

mod api;

const APPLICATION_ID: &str = "booking-service";

#[derive(Parser, Debug)]
#[command(name = "booking-service")]
#[command(about = "Seat booking and cancellation REST API for cinema showings")]
struct Args {
    /// Port to listen on
    #[arg(short = 'p', long = "port", default_value = "8080")]
    port: u16,

    /// Properties file with storage, booking and retry settings
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// JSON snapshot of members, movies and theaters
    #[arg(long = "catalog")]
    catalog: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    info!("Starting Booking Service on port {}", args.port);

    let config = load_config(args.config.as_ref())?;
    let catalog = match &args.catalog {
        Some(path) => Catalog::load_json(path)
            .with_context(|| format!("loading catalog {:?}", path))?,
        None => {
            warn!("No catalog given; every member, movie and theater lookup will miss");
            Catalog::new()
        }
    };
    info!("Catalog holds {} entries", catalog.len());

    let store = open_store(&config.storage).context("opening seat store")?;
    let metrics = Arc::new(Metrics::new()?);
    let desk = ReservationDesk::new(store.clone(), Arc::new(catalog), config.booking.clone());
    let service = BookingService::new(desk, config.retry.clone(), metrics.clone());

    let coordinator = ShutdownCoordinator::default();
    coordinator
        .register_component(Box::new(StoreShutdown::new(store)))
        .await;

    let app = api::router(service)
        .merge(
            Router::new()
                .route("/metrics", get(metrics_endpoint))
                .with_state(metrics),
        )
        .route("/health", get(health_check))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!("Booking Service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    coordinator.shutdown().await?;
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<ServiceConfig> {
    let config = match path {
        Some(path) => {
            info!("Config file: {:?}", path);
            parse_properties_file(path, APPLICATION_ID)
                .with_context(|| format!("loading config {:?}", path))?
        }
        None => ServiceConfig::new(APPLICATION_ID),
    };
    Ok(apply_env_overrides(config)?)
}
