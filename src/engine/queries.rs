use std::collections::BTreeSet;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::calendar::window_bounds;
use super::conflict;
use super::occupancy;
use super::{Engine, EngineError};

impl Engine {
    pub async fn get_room(&self, id: Ulid) -> Result<Room, EngineError> {
        let rs = self.get_room_state(&id).ok_or(EngineError::NotFound(id))?;
        let guard = rs.read().await;
        Ok(guard.room.clone())
    }

    /// All rooms, ordered by id.
    pub async fn list_rooms(&self) -> Vec<Room> {
        self.read_all_rooms()
            .await
            .iter()
            .map(|rs| rs.room.clone())
            .collect()
    }

    /// The stays of `booking`, in the order they were requested.
    async fn stays_of(&self, booking: &Booking) -> Vec<Stay> {
        let mut stays = Vec::with_capacity(booking.stay_ids.len());
        for sid in &booking.stay_ids {
            let Some(rs) = self.room_for_stay(sid).and_then(|rid| self.get_room_state(&rid)) else {
                continue;
            };
            let guard = rs.read().await;
            if let Some(stay) = guard.stay(*sid) {
                stays.push(stay.clone());
            }
        }
        stays
    }

    fn live_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        self.bookings
            .get(&id)
            .filter(|b| !b.is_deleted())
            .map(|b| b.value().clone())
            .ok_or(EngineError::NotFound(id))
    }

    pub async fn get_booking(&self, id: Ulid) -> Result<BookingView, EngineError> {
        let booking = self.live_booking(id)?;
        let stays = self.stays_of(&booking).await;
        Ok(BookingView { booking, stays })
    }

    /// Live bookings created inside the filter's window (and by its
    /// receptionist, if given), newest first.
    pub async fn list_bookings(&self, filter: &BookingFilter) -> Result<Vec<BookingView>, EngineError> {
        let (lo, hi) = window_bounds(&filter.window)?;
        let mut bookings: Vec<Booking> = self
            .bookings
            .iter()
            .filter(|e| {
                let b = e.value();
                !b.is_deleted()
                    && b.created_at >= lo
                    && b.created_at < hi
                    && filter.receptionist.is_none_or(|r| r == b.receptionist)
            })
            .map(|e| e.value().clone())
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let mut views = Vec::with_capacity(bookings.len());
        for booking in bookings {
            let stays = self.stays_of(&booking).await;
            views.push(BookingView { booking, stays });
        }
        Ok(views)
    }

    /// One stay, only if it belongs to `booking_id`.
    pub async fn get_stay(&self, booking_id: Ulid, stay_id: Ulid) -> Result<Stay, EngineError> {
        let booking = self.live_booking(booking_id)?;
        if !booking.stay_ids.contains(&stay_id) {
            return Err(EngineError::NotFound(stay_id));
        }
        let room_id = self
            .room_for_stay(&stay_id)
            .ok_or(EngineError::NotFound(stay_id))?;
        let rs = self
            .get_room_state(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = rs.read().await;
        guard.stay(stay_id).cloned().ok_or(EngineError::NotFound(stay_id))
    }

    /// Nights currently claimed on a room. Recomputed on every call.
    pub async fn occupied_nights(&self, room_id: Ulid) -> Result<BTreeSet<NaiveDate>, EngineError> {
        let rs = self
            .get_room_state(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = rs.read().await;
        Ok(occupancy::occupied_nights(&guard))
    }

    /// [`Engine::occupied_nights`] as an ascending list.
    pub async fn booked_dates(&self, room_id: Ulid) -> Result<Vec<NaiveDate>, EngineError> {
        Ok(self.occupied_nights(room_id).await?.into_iter().collect())
    }

    /// Side-effect-free availability check for `nights` nights from `arrival`.
    pub async fn check_available(
        &self,
        room_id: Ulid,
        arrival: NaiveDate,
        nights: u32,
    ) -> Result<(), EngineError> {
        conflict::validate_nights(nights)?;
        let rs = self
            .get_room_state(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = rs.read().await;
        conflict::check_available(&guard, arrival, nights, None, None).map(|_| ())
    }
}
