use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::booking::stay_amount;
use super::conflict::{check_available, now_ms, validate_nights, validate_rate};
use super::{Engine, EngineError, RoomLocks};

fn validate_room_name(name: &str) -> Result<(), EngineError> {
    if name.trim().is_empty() {
        return Err(EngineError::InvalidRequest("room name must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("room name too long"));
    }
    Ok(())
}

impl Engine {
    pub async fn create_room(&self, id: Ulid, name: String, rate: Money) -> Result<Room, EngineError> {
        validate_room_name(&name)?;
        validate_rate(rate)?;

        let _catalog = self.room_catalog.lock().await;
        if self.rooms.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        if self.rooms.len() >= MAX_ROOMS {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }

        let room = Room {
            id,
            name,
            rate,
            status: RoomStatus::Available,
        };
        let mut locks = RoomLocks::acquire(self, std::iter::empty()).await?;
        self.persist_and_apply(&mut locks, Event::RoomCreated { room: room.clone() })
            .await?;
        info!(room = %id, name = %room.name, "room created");
        Ok(room)
    }

    /// Rename or re-rate a room. Existing stays keep the rate they were booked at.
    pub async fn update_room(&self, id: Ulid, name: String, rate: Money) -> Result<Room, EngineError> {
        validate_room_name(&name)?;
        validate_rate(rate)?;

        let mut locks = RoomLocks::acquire(self, [id]).await?;
        self.persist_and_apply(&mut locks, Event::RoomUpdated { id, name, rate })
            .await?;
        locks
            .get(&id)
            .map(|rs| rs.room.clone())
            .ok_or(EngineError::NotFound(id))
    }

    /// Lock every room holding a stay of `booking_id`, then confirm the booking
    /// is still live. Deletion and payment of one booking serialize here.
    async fn lock_live_booking(&self, booking_id: Ulid) -> Result<RoomLocks, EngineError> {
        let stay_ids = self
            .bookings
            .get(&booking_id)
            .filter(|b| !b.is_deleted())
            .map(|b| b.stay_ids.clone())
            .ok_or(EngineError::NotFound(booking_id))?;
        let room_ids: Vec<Ulid> = stay_ids
            .iter()
            .filter_map(|sid| self.room_for_stay(sid))
            .collect();

        let locks = RoomLocks::acquire(self, room_ids).await?;
        let live = self
            .bookings
            .get(&booking_id)
            .is_some_and(|b| !b.is_deleted());
        if !live {
            return Err(EngineError::NotFound(booking_id));
        }
        Ok(locks)
    }

    pub async fn mark_paid(&self, booking_id: Ulid, method: String) -> Result<Booking, EngineError> {
        if method.len() > MAX_PAYMENT_METHOD_LEN {
            return Err(EngineError::LimitExceeded("payment method too long"));
        }
        let mut locks = self.lock_live_booking(booking_id).await?;
        self.persist_and_apply(&mut locks, Event::BookingPaid { id: booking_id, method })
            .await?;
        info!(booking = %booking_id, "booking paid");
        self.bookings
            .get(&booking_id)
            .map(|b| b.value().clone())
            .ok_or(EngineError::NotFound(booking_id))
    }

    /// Soft delete: the booking keeps its record but its stays stop holding nights.
    pub async fn delete_booking(&self, booking_id: Ulid) -> Result<(), EngineError> {
        let mut locks = self.lock_live_booking(booking_id).await?;
        let event = Event::BookingDeleted {
            id: booking_id,
            at: now_ms(),
        };
        self.persist_and_apply(&mut locks, event).await?;
        info!(booking = %booking_id, "booking deleted");
        Ok(())
    }

    /// Move or resize one stay on its room. The stay's own current nights never
    /// conflict with the new range.
    pub async fn reschedule_stay(
        &self,
        stay_id: Ulid,
        req: RescheduleRequest,
    ) -> Result<Stay, EngineError> {
        validate_nights(req.nights)?;
        if let Some(amount) = req.amount {
            validate_rate(amount)?;
        }
        let room_id = self
            .room_for_stay(&stay_id)
            .ok_or(EngineError::NotFound(stay_id))?;
        let mut locks = RoomLocks::acquire(self, [room_id]).await?;

        let rs = locks.get(&room_id).ok_or(EngineError::NotFound(room_id))?;
        let stay = rs
            .stay(stay_id)
            .filter(|s| !s.voided)
            .ok_or(EngineError::NotFound(stay_id))?;
        if stay.checked_out {
            return Err(EngineError::InvalidRequest("stay is already checked out"));
        }

        let arrival = req.arrival.unwrap_or(stay.arrival);
        let rate = req.amount.unwrap_or(stay.rate);
        check_available(rs, arrival, req.nights, Some(stay_id), None)?;
        let amount = stay_amount(rate, req.nights)?;

        let event = Event::StayRescheduled {
            id: stay_id,
            room_id,
            arrival,
            span: super::calendar::stay_span(arrival, req.nights),
            nights: req.nights,
            rate,
            amount,
        };
        self.persist_and_apply(&mut locks, event).await?;

        let stay = locks
            .get(&room_id)
            .and_then(|rs| rs.stay(stay_id))
            .cloned()
            .ok_or(EngineError::NotFound(stay_id))?;
        info!(stay = %stay_id, %arrival, nights = req.nights, "stay rescheduled");
        Ok(stay)
    }

    /// Rewrite the store with the minimal history that recreates current state:
    /// one `RoomCreated` per room, then one `BookingCreated` per booking in
    /// creation order. Returns the snapshot length.
    pub async fn compact(&self) -> Result<usize, EngineError> {
        let _quiet = self.commit_gate.write().await;
        let rooms = self.read_all_rooms().await;

        let mut events: Vec<Event> = rooms
            .iter()
            .map(|rs| Event::RoomCreated { room: rs.room.clone() })
            .collect();

        let mut bookings: Vec<Booking> = self.bookings.iter().map(|e| e.value().clone()).collect();
        bookings.sort_by_key(|b| (b.created_at, b.id));
        for booking in bookings {
            let stays: Vec<Stay> = booking
                .stay_ids
                .iter()
                .filter_map(|sid| {
                    let room_id = self.room_for_stay(sid)?;
                    let idx = rooms.binary_search_by_key(&room_id, |rs| rs.room.id).ok()?;
                    rooms[idx].stay(*sid).cloned()
                })
                .collect();
            events.push(Event::BookingCreated { booking, stays });
        }
        drop(rooms);

        let len = events.len();
        self.store.compact(events).await?;
        info!("compacted store to {len} events");
        Ok(len)
    }

    pub async fn appends_since_compact(&self) -> u64 {
        self.store.appends_since_compact().await
    }
}
