use crate::{BookingError, Rating, Result, ServiceConfig};
use config::{Config, ConfigError, Environment};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

pub const ENV_PREFIX: &str = "CINEMA";

const RATING_MIN_AGE_PREFIX: &str = "booking.rating.min.age.";

/// Keys that may be overridden from the environment, e.g. `CINEMA_STORAGE__BACKEND`.
const ENV_KEYS: &[&str] = &[
    "storage.backend",
    "storage.path",
    "booking.cancellation.window.minutes",
    "booking.rebook.policy",
    "booking.recancel.policy",
    "retry.max.attempts",
    "retry.initial.delay.ms",
    "retry.max.delay.ms",
    "retry.attempt.timeout.ms",
];

/// Parse Java properties file into ServiceConfig
pub fn parse_properties_file<P: AsRef<Path>>(path: P, application_id: &str) -> Result<ServiceConfig> {
    merge_properties_file(ServiceConfig::new(application_id), path)
}

/// Apply a properties file on top of an existing config
pub fn merge_properties_file<P: AsRef<Path>>(mut config: ServiceConfig, path: P) -> Result<ServiceConfig> {
    for (key, value) in read_properties(path)? {
        apply_property(&mut config, &key, &value)?;
    }
    Ok(config)
}

/// Apply `CINEMA_*` environment overrides
pub fn apply_env_overrides(config: ServiceConfig) -> Result<ServiceConfig> {
    apply_env_source(config, Environment::with_prefix(ENV_PREFIX))
}

fn apply_env_source(mut config: ServiceConfig, source: Environment) -> Result<ServiceConfig> {
    let settings = Config::builder()
        .add_source(source.prefix_separator("_").separator("__"))
        .build()?;

    for key in ENV_KEYS {
        match settings.get_string(key) {
            Ok(value) => {
                debug!("Environment override for {}", key);
                apply_property(&mut config, key, &value)?;
            }
            Err(ConfigError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(config)
}

fn read_properties<P: AsRef<Path>>(path: P) -> Result<HashMap<String, String>> {
    let file = File::open(&path).map_err(|e| {
        BookingError::InvalidArgument(format!("Failed to open config file {:?}: {}", path.as_ref(), e))
    })?;

    let reader = BufReader::new(file);
    java_properties::read(reader)
        .map_err(|e| BookingError::InvalidArgument(format!("Failed to parse properties: {}", e)))
}

fn apply_property(config: &mut ServiceConfig, key: &str, value: &str) -> Result<()> {
    let value = value.trim();
    match key {
        "storage.backend" => config.storage.backend = value.parse()?,
        "storage.path" => config.storage.path = value.to_string(),
        "booking.cancellation.window.minutes" => {
            config.booking.cancellation_window_minutes = parse_number(key, value)?
        }
        "booking.rebook.policy" => config.booking.rebook = value.parse()?,
        "booking.recancel.policy" => config.booking.recancel = value.parse()?,
        "retry.max.attempts" => config.retry.max_attempts = parse_number(key, value)?,
        "retry.initial.delay.ms" => {
            config.retry.initial_delay = Duration::from_millis(parse_number(key, value)?)
        }
        "retry.max.delay.ms" => {
            config.retry.max_delay = Duration::from_millis(parse_number(key, value)?)
        }
        "retry.attempt.timeout.ms" => {
            config.retry.attempt_timeout = Duration::from_millis(parse_number(key, value)?)
        }
        _ => match key.strip_prefix(RATING_MIN_AGE_PREFIX) {
            Some(rating) => {
                let rating = Rating::from_label(rating).ok_or_else(|| {
                    BookingError::InvalidArgument(format!("Unknown rating in {}", key))
                })?;
                config
                    .booking
                    .ratings
                    .set_minimum_age(rating, parse_number(key, value)?);
            }
            None => debug!("Ignoring unknown property {}", key),
        },
    }
    Ok(())
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| BookingError::InvalidArgument(format!("Invalid value for {}: {}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RebookPolicy, RecancelPolicy, StorageBackend};
    use tempfile::tempdir;

    #[test]
    fn test_unknown_keys_are_ignored() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("service.properties");
        std::fs::write(&path, "num.stream.threads=4\nbooking.rebook.policy=reuse-cancelled\n").unwrap();

        let config = parse_properties_file(&path, "desk").unwrap();
        assert_eq!(config.booking.rebook, RebookPolicy::ReuseCancelled);
    }

    #[test]
    fn test_bad_values_are_rejected() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("service.properties");
        std::fs::write(&path, "booking.cancellation.window.minutes=soon\n").unwrap();
        assert!(matches!(
            parse_properties_file(&path, "desk").unwrap_err(),
            BookingError::InvalidArgument(_)
        ));

        std::fs::write(&path, "booking.recancel.policy=maybe\n").unwrap();
        assert!(parse_properties_file(&path, "desk").is_err());
    }

    #[test]
    fn test_rating_thresholds() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("service.properties");
        std::fs::write(&path, "booking.rating.min.age.PG-13=15\nbooking.rating.min.age.nc17=21\n").unwrap();

        let config = parse_properties_file(&path, "desk").unwrap();
        assert_eq!(config.booking.ratings.minimum_age(Rating::Pg13), 15);
        assert_eq!(config.booking.ratings.minimum_age(Rating::Nc17), 21);
        assert_eq!(config.booking.ratings.minimum_age(Rating::Unrated), 0);
    }

    #[test]
    fn test_misspelled_rating_is_rejected() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("service.properties");
        std::fs::write(&path, "booking.rating.min.age.PG_13=18\n").unwrap();

        assert!(matches!(
            parse_properties_file(&path, "desk").unwrap_err(),
            BookingError::InvalidArgument(_)
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(parse_properties_file("/nonexistent/service.properties", "desk").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<String, String> = [
            ("CINEMA_STORAGE__BACKEND", "rocksdb"),
            ("CINEMA_BOOKING__RECANCEL__POLICY", "reject"),
            ("CINEMA_RETRY__MAX__ATTEMPTS", "7"),
            ("CINEMA_RETRY__ATTEMPT__TIMEOUT__MS", "250"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = apply_env_source(
            ServiceConfig::new("desk"),
            Environment::with_prefix(ENV_PREFIX).source(Some(vars)),
        )
        .unwrap();

        assert_eq!(config.storage.backend, StorageBackend::RocksDB);
        assert_eq!(config.booking.recancel, RecancelPolicy::Reject);
        assert_eq!(config.retry.max_attempts, 7);
        assert_eq!(config.retry.attempt_timeout, Duration::from_millis(250));
        assert_eq!(config.booking.cancellation_window_minutes, 30);
    }
}
