use crate::{BookingPolicy, RetryConfig, StorageBackend};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: "/tmp/cinema-reservations".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub application_id: String,
    pub storage: StorageConfig,
    pub booking: BookingPolicy,
    pub retry: RetryConfig,
}

impl ServiceConfig {
    pub fn new(application_id: &str) -> Self {
        Self {
            application_id: application_id.to_string(),
            storage: StorageConfig::default(),
            booking: BookingPolicy::default(),
            retry: RetryConfig::state_store(),
        }
    }
}
