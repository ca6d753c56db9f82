use std::collections::BTreeSet;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

// ── Occupancy Index ──────────────────────────────────────────────

/// Every night currently claimed on a room: the union of the nights of all
/// stays that are neither checked out nor voided.
pub fn occupied_nights(rs: &RoomState) -> BTreeSet<NaiveDate> {
    occupied_nights_except(rs, None)
}

/// Same as [`occupied_nights`] but ignoring one stay, so a stay being
/// rescheduled does not collide with its own current nights.
pub fn occupied_nights_except(rs: &RoomState, skip: Option<Ulid>) -> BTreeSet<NaiveDate> {
    rs.stays
        .iter()
        .filter(|s| s.holds_nights() && Some(s.id) != skip)
        .flat_map(|s| s.nights())
        .collect()
}

/// Nights claimed by more than one active stay. Empty whenever the room is consistent.
pub fn double_booked_nights(rs: &RoomState) -> BTreeSet<NaiveDate> {
    let mut seen = BTreeSet::new();
    let mut doubled = BTreeSet::new();
    for night in rs.stays.iter().filter(|s| s.holds_nights()).flat_map(|s| s.nights()) {
        if !seen.insert(night) {
            doubled.insert(night);
        }
    }
    doubled
}
