pub mod policy;
pub mod reservation;
pub mod schemas;
pub mod showing;

pub use policy::*;
pub use reservation::*;
pub use schemas::*;
pub use showing::*;

pub type MemberId = u64;
pub type MovieId = u64;
pub type TheaterId = u64;
pub type ShowingId = u64;
pub type ReservationId = u64;
