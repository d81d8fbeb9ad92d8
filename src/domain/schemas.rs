use super::{ReservationId, SeatSlot, ShowingId};

// RocksDB key prefixes
pub struct Keys;

impl Keys {
    pub const SHOWING: &'static str = "showing#";
    pub const RESERVATION: &'static str = "reservation#";
    pub const SEAT_SLOT: &'static str = "slot#";
}

// Ids are zero padded so that lexicographic key order matches numeric order.
pub fn showing_key(id: ShowingId) -> String {
    format!("{}{:020}", Keys::SHOWING, id)
}

pub fn reservation_key(id: ReservationId) -> String {
    format!("{}{:020}", Keys::RESERVATION, id)
}

pub fn seat_slot_key(slot: &SeatSlot) -> String {
    format!(
        "{}{:020}#{}#{}",
        Keys::SEAT_SLOT,
        slot.theater_id,
        slot.showing_time.timestamp(),
        slot.seat_label
    )
}

/// Parses the id suffix of a showing or reservation key.
pub fn id_from_key(key: &[u8], prefix: &str) -> Option<u64> {
    std::str::from_utf8(key)
        .ok()?
        .strip_prefix(prefix)?
        .parse()
        .ok()
}
