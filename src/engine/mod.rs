mod booking;
pub mod calendar;
mod conflict;
mod error;
mod lifecycle;
mod mutations;
pub mod occupancy;
mod queries;
mod summary;

pub use error::EngineError;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::info;
use ulid::Ulid;

use crate::model::*;
use crate::store::RecordStore;

pub type SharedRoomState = Arc<RwLock<RoomState>>;

pub struct Engine {
    pub(super) rooms: DashMap<Ulid, SharedRoomState>,
    pub(super) bookings: DashMap<Ulid, Booking>,
    /// Reverse lookup: stay id → room id. A stay never changes room.
    pub(super) stay_to_room: DashMap<Ulid, Ulid>,
    store: Arc<dyn RecordStore>,
    /// Every mutation holds this shared for its whole lock-check-commit-apply
    /// window; compaction takes it exclusively to snapshot a quiet state.
    commit_gate: Arc<RwLock<()>>,
    /// Serializes room creation so the id and capacity checks hold until apply.
    room_catalog: Mutex<()>,
}

/// Write guards on every room one mutation touches, taken in ascending id
/// order so concurrent multi-room operations cannot deadlock.
pub(super) struct RoomLocks {
    _gate: OwnedRwLockReadGuard<()>,
    guards: BTreeMap<Ulid, OwnedRwLockWriteGuard<RoomState>>,
}

impl RoomLocks {
    /// Fails with `NotFound` on the first (lowest) room id that does not exist.
    pub(super) async fn acquire(
        engine: &Engine,
        room_ids: impl IntoIterator<Item = Ulid>,
    ) -> Result<Self, EngineError> {
        let ids: BTreeSet<Ulid> = room_ids.into_iter().collect();
        let gate = engine.commit_gate.clone().read_owned().await;
        let mut guards = BTreeMap::new();
        for id in ids {
            let rs = engine.get_room_state(&id).ok_or(EngineError::NotFound(id))?;
            guards.insert(id, rs.write_owned().await);
        }
        Ok(Self { _gate: gate, guards })
    }

    /// Like `acquire` but silently skips unknown rooms. Used during replay.
    async fn acquire_present(engine: &Engine, room_ids: impl IntoIterator<Item = Ulid>) -> Self {
        let ids: BTreeSet<Ulid> = room_ids.into_iter().collect();
        let gate = engine.commit_gate.clone().read_owned().await;
        let mut guards = BTreeMap::new();
        for id in ids {
            if let Some(rs) = engine.get_room_state(&id) {
                guards.insert(id, rs.write_owned().await);
            }
        }
        Self { _gate: gate, guards }
    }

    pub(super) fn get(&self, id: &Ulid) -> Option<&RoomState> {
        self.guards.get(id).map(|g| &**g)
    }

    pub(super) fn get_mut(&mut self, id: &Ulid) -> Option<&mut RoomState> {
        self.guards.get_mut(id).map(|g| &mut **g)
    }
}

impl Engine {
    /// Rebuild in-memory state from the store's history.
    pub async fn open(store: Arc<dyn RecordStore>) -> Result<Self, EngineError> {
        let events = store.replay().await?;
        let engine = Self {
            rooms: DashMap::new(),
            bookings: DashMap::new(),
            stay_to_room: DashMap::new(),
            store,
            commit_gate: Arc::new(RwLock::new(())),
            room_catalog: Mutex::new(()),
        };

        for event in &events {
            let touched = engine.rooms_touched(event);
            let mut locks = RoomLocks::acquire_present(&engine, touched).await;
            engine.apply(&mut locks, event);
        }

        info!(
            "replayed {} events: {} rooms, {} bookings",
            events.len(),
            engine.rooms.len(),
            engine.bookings.len()
        );
        Ok(engine)
    }

    pub fn get_room_state(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub fn room_for_stay(&self, stay_id: &Ulid) -> Option<Ulid> {
        self.stay_to_room.get(stay_id).map(|e| *e.value())
    }

    /// Read guards on every room, in ascending id order. While held, no
    /// mutation can be half-applied on any of these rooms.
    pub(super) async fn read_all_rooms(&self) -> Vec<OwnedRwLockReadGuard<RoomState>> {
        let mut rooms: Vec<(Ulid, SharedRoomState)> = self
            .rooms
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        rooms.sort_by_key(|(id, _)| *id);
        let mut guards = Vec::with_capacity(rooms.len());
        for (_, rs) in rooms {
            guards.push(rs.read_owned().await);
        }
        guards
    }

    /// Store-append then apply. Nothing becomes visible if the append fails.
    pub(super) async fn persist_and_apply(
        &self,
        locks: &mut RoomLocks,
        event: Event,
    ) -> Result<(), EngineError> {
        self.store.append(&event).await?;
        self.apply(locks, &event);
        Ok(())
    }

    fn rooms_touched(&self, event: &Event) -> Vec<Ulid> {
        match event {
            Event::RoomCreated { .. } | Event::BookingPaid { .. } => Vec::new(),
            Event::RoomUpdated { id, .. } => vec![*id],
            Event::BookingCreated { stays, .. } => stays.iter().map(|s| s.room_id).collect(),
            Event::BookingDeleted { id, .. } => self
                .bookings
                .get(id)
                .map(|b| b.stay_ids.clone())
                .unwrap_or_default()
                .into_iter()
                .filter_map(|sid| self.room_for_stay(&sid))
                .collect(),
            Event::StayCheckedIn { room_id, .. }
            | Event::StayCheckedOut { room_id, .. }
            | Event::StayRescheduled { room_id, .. } => vec![*room_id],
        }
    }

    /// Apply an already-durable event. The caller holds write locks on every
    /// room in `rooms_touched(event)`.
    fn apply(&self, locks: &mut RoomLocks, event: &Event) {
        match event {
            Event::RoomCreated { room } => {
                let rs = RoomState::new(room.clone());
                self.rooms.insert(room.id, Arc::new(RwLock::new(rs)));
            }
            Event::RoomUpdated { id, name, rate } => {
                if let Some(rs) = locks.get_mut(id) {
                    rs.room.name = name.clone();
                    rs.room.rate = *rate;
                }
            }
            Event::BookingCreated { booking, stays } => {
                for stay in stays {
                    if let Some(rs) = locks.get_mut(&stay.room_id) {
                        rs.insert_stay(stay.clone());
                    }
                    self.stay_to_room.insert(stay.id, stay.room_id);
                }
                self.bookings.insert(booking.id, booking.clone());
            }
            Event::BookingDeleted { id, at } => {
                let stay_ids = match self.bookings.get_mut(id) {
                    Some(mut b) => {
                        b.deleted_at = Some(*at);
                        b.stay_ids.clone()
                    }
                    None => return,
                };
                for sid in stay_ids {
                    if let Some(room_id) = self.room_for_stay(&sid)
                        && let Some(stay) = locks.get_mut(&room_id).and_then(|rs| rs.stay_mut(sid))
                    {
                        stay.voided = true;
                    }
                }
            }
            Event::BookingPaid { id, method } => {
                if let Some(mut b) = self.bookings.get_mut(id) {
                    b.paid = true;
                    b.payment_method = method.clone();
                }
            }
            Event::StayCheckedIn { id, room_id } => {
                if let Some(rs) = locks.get_mut(room_id) {
                    if let Some(stay) = rs.stay_mut(*id) {
                        stay.checked_in = true;
                        stay.checked_out = false;
                    }
                    rs.room.status = RoomStatus::Unavailable;
                }
            }
            Event::StayCheckedOut { id, room_id } => {
                if let Some(rs) = locks.get_mut(room_id) {
                    if let Some(stay) = rs.stay_mut(*id) {
                        stay.checked_in = false;
                        stay.checked_out = true;
                    }
                    rs.room.status = RoomStatus::Available;
                }
            }
            Event::StayRescheduled {
                id,
                room_id,
                arrival,
                span,
                nights,
                rate,
                amount,
            } => {
                let Some(rs) = locks.get_mut(room_id) else { return };
                let Some(mut stay) = rs.remove_stay(*id) else { return };
                let delta = amount - stay.amount;
                stay.arrival = *arrival;
                stay.span = *span;
                stay.nights = *nights;
                stay.rate = *rate;
                stay.amount = *amount;
                let booking_id = stay.booking_id;
                rs.insert_stay(stay);
                if let Some(mut b) = self.bookings.get_mut(&booking_id) {
                    b.amount += delta;
                }
            }
        }
    }
}
