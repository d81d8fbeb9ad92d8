pub mod catalog;
pub mod clock;
pub mod config;
pub mod config_parser;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod service;
pub mod shutdown;
pub mod store;
pub mod workflow;

pub use catalog::*;
pub use clock::*;
pub use config::*;
pub use config_parser::*;
pub use domain::*;
pub use error::*;
pub use metrics::Metrics;
pub use retry::RetryConfig;
pub use service::BookingService;
pub use shutdown::{ShutdownComponent, ShutdownCoordinator, StoreShutdown};
pub use store::*;
pub use workflow::*;
