use super::Rating;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// What happens when a seat slot whose last holder was cancelled is booked again.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RebookPolicy {
    /// Every booking gets a fresh row; cancelled rows stay as history.
    #[default]
    AlwaysInsert,
    /// The cancelled row is overwritten and keeps its id.
    ReuseCancelled,
}

/// What a cancellation of an already cancelled reservation returns.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RecancelPolicy {
    #[default]
    Idempotent,
    Reject,
}

impl FromStr for RebookPolicy {
    type Err = crate::BookingError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "always-insert" => Ok(RebookPolicy::AlwaysInsert),
            "reuse-cancelled" => Ok(RebookPolicy::ReuseCancelled),
            other => Err(crate::BookingError::InvalidArgument(format!(
                "Invalid rebook policy: {}",
                other
            ))),
        }
    }
}

impl FromStr for RecancelPolicy {
    type Err = crate::BookingError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "idempotent" => Ok(RecancelPolicy::Idempotent),
            "reject" => Ok(RecancelPolicy::Reject),
            other => Err(crate::BookingError::InvalidArgument(format!(
                "Invalid recancel policy: {}",
                other
            ))),
        }
    }
}

/// Minimum member age per content rating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingPolicy {
    thresholds: HashMap<Rating, u32>,
}

impl Default for RatingPolicy {
    fn default() -> Self {
        let thresholds = [
            (Rating::G, 0),
            (Rating::Pg, 7),
            (Rating::Pg13, 13),
            (Rating::R, 17),
            (Rating::Nc17, 18),
        ]
        .into_iter()
        .collect();
        Self { thresholds }
    }
}

impl RatingPolicy {
    pub fn minimum_age(&self, rating: Rating) -> u32 {
        self.thresholds.get(&rating).copied().unwrap_or(0)
    }

    pub fn set_minimum_age(&mut self, rating: Rating, age: u32) {
        self.thresholds.insert(rating, age);
    }

    pub fn admits(&self, rating: Rating, age: u32) -> bool {
        age >= self.minimum_age(rating)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingPolicy {
    pub cancellation_window_minutes: i64,
    pub rebook: RebookPolicy,
    pub recancel: RecancelPolicy,
    pub ratings: RatingPolicy,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            cancellation_window_minutes: 30,
            rebook: RebookPolicy::default(),
            recancel: RecancelPolicy::default(),
            ratings: RatingPolicy::default(),
        }
    }
}

impl BookingPolicy {
    pub fn cancellation_window(&self) -> Duration {
        Duration::minutes(self.cancellation_window_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rating_table() {
        let policy = RatingPolicy::default();
        assert_eq!(policy.minimum_age(Rating::G), 0);
        assert_eq!(policy.minimum_age(Rating::Pg), 7);
        assert_eq!(policy.minimum_age(Rating::Pg13), 13);
        assert_eq!(policy.minimum_age(Rating::R), 17);
        assert_eq!(policy.minimum_age(Rating::Nc17), 18);
        assert_eq!(policy.minimum_age(Rating::Unrated), 0);
    }

    #[test]
    fn test_admits_at_threshold() {
        let policy = RatingPolicy::default();
        assert!(policy.admits(Rating::Pg13, 13));
        assert!(!policy.admits(Rating::Pg13, 12));
        assert!(policy.admits(Rating::Unrated, 0));
    }

    #[test]
    fn test_override_threshold() {
        let mut policy = RatingPolicy::default();
        policy.set_minimum_age(Rating::R, 18);
        assert!(!policy.admits(Rating::R, 17));
    }

    #[test]
    fn test_policy_names() {
        assert_eq!("reuse-cancelled".parse::<RebookPolicy>().unwrap(), RebookPolicy::ReuseCancelled);
        assert_eq!("Reject".parse::<RecancelPolicy>().unwrap(), RecancelPolicy::Reject);
        assert!("sometimes".parse::<RecancelPolicy>().is_err());
    }
}
