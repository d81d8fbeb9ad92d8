use crate::{Member, MemberId, Movie, MovieId, Result, Theater, TheaterId};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

pub trait MemberDirectory: Send + Sync {
    fn member(&self, id: MemberId) -> Result<Option<Member>>;
}

pub trait MovieCatalog: Send + Sync {
    fn movie(&self, id: MovieId) -> Result<Option<Movie>>;
}

pub trait TheaterCatalog: Send + Sync {
    fn theater(&self, id: TheaterId) -> Result<Option<Theater>>;
}

/// Every lookup the reservation core needs from outside.
pub trait CatalogLookup: MemberDirectory + MovieCatalog + TheaterCatalog {}

impl<T: MemberDirectory + MovieCatalog + TheaterCatalog> CatalogLookup for T {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub movies: Vec<Movie>,
    #[serde(default)]
    pub theaters: Vec<Theater>,
}

/// In-memory members, movies and theaters.
#[derive(Clone, Default)]
pub struct Catalog {
    members: Arc<DashMap<MemberId, Member>>,
    movies: Arc<DashMap<MovieId, Movie>>,
    theaters: Arc<DashMap<TheaterId, Theater>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: CatalogSnapshot) -> Self {
        let catalog = Self::new();
        for member in snapshot.members {
            catalog.add_member(member);
        }
        for movie in snapshot.movies {
            catalog.add_movie(movie);
        }
        for theater in snapshot.theaters {
            catalog.add_theater(theater);
        }
        catalog
    }

    /// Load a JSON snapshot with `members`, `movies` and `theaters` arrays.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(path)?;
        let snapshot: CatalogSnapshot = serde_json::from_slice(&data)?;
        Ok(Self::from_snapshot(snapshot))
    }

    pub fn add_member(&self, member: Member) {
        self.members.insert(member.id, member);
    }

    pub fn add_movie(&self, movie: Movie) {
        self.movies.insert(movie.id, movie);
    }

    pub fn add_theater(&self, theater: Theater) {
        self.theaters.insert(theater.id, theater);
    }

    pub fn len(&self) -> usize {
        self.members.len() + self.movies.len() + self.theaters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MemberDirectory for Catalog {
    fn member(&self, id: MemberId) -> Result<Option<Member>> {
        Ok(self.members.get(&id).map(|entry| entry.value().clone()))
    }
}

impl MovieCatalog for Catalog {
    fn movie(&self, id: MovieId) -> Result<Option<Movie>> {
        Ok(self.movies.get(&id).map(|entry| entry.value().clone()))
    }
}

impl TheaterCatalog for Catalog {
    fn theater(&self, id: TheaterId) -> Result<Option<Theater>> {
        Ok(self.theaters.get(&id).map(|entry| entry.value().clone()))
    }
}
