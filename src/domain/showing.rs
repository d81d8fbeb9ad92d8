use super::{MemberId, MovieId, ShowingId, TheaterId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Member {
    pub id: MemberId,
    pub email: String,
    pub age: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Theater {
    pub id: TheaterId,
    pub label: String,
    pub total_seats: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Movie {
    pub id: MovieId,
    pub title: String,
    pub duration_minutes: u32,
    pub rating: Rating,
}

/// Content rating of a movie. Unknown ratings carry no age restriction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Rating {
    #[serde(rename = "G")]
    G,
    #[serde(rename = "PG")]
    Pg,
    #[serde(rename = "PG-13")]
    Pg13,
    #[serde(rename = "R")]
    R,
    #[serde(rename = "NC-17")]
    Nc17,
    #[serde(other)]
    Unrated,
}

impl Rating {
    pub const ALL: [Rating; 6] = [
        Rating::G,
        Rating::Pg,
        Rating::Pg13,
        Rating::R,
        Rating::Nc17,
        Rating::Unrated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Rating::G => "G",
            Rating::Pg => "PG",
            Rating::Pg13 => "PG-13",
            Rating::R => "R",
            Rating::Nc17 => "NC-17",
            Rating::Unrated => "UNRATED",
        }
    }

    /// Strict lookup of a known rating label. `PG13` and `NC17` are accepted
    /// without the dash.
    pub fn from_label(label: &str) -> Option<Rating> {
        let label = label.trim();
        Rating::ALL.into_iter().find(|rating| {
            let name = rating.as_str();
            name.eq_ignore_ascii_case(label) || name.replace('-', "").eq_ignore_ascii_case(label)
        })
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rating {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Rating::from_label(s).unwrap_or(Rating::Unrated))
    }
}

/// A scheduled screening and its seat inventory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Showing {
    pub id: ShowingId,
    pub movie_id: MovieId,
    pub theater_id: TheaterId,
    pub start_time: DateTime<Utc>,
    /// Theater capacity at scheduling time; upper bound for `available_seats`.
    pub total_seats: u32,
    pub available_seats: u32,
}

#[derive(Debug, Clone)]
pub struct NewShowing {
    pub movie_id: MovieId,
    pub theater_id: TheaterId,
    pub start_time: DateTime<Utc>,
    pub total_seats: u32,
}

impl NewShowing {
    pub fn into_showing(self, id: ShowingId) -> Showing {
        Showing {
            id,
            movie_id: self.movie_id,
            theater_id: self.theater_id,
            start_time: self.start_time,
            total_seats: self.total_seats,
            available_seats: self.total_seats,
        }
    }
}
