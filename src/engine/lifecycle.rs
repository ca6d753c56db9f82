use tracing::info;
use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError, RoomLocks};

#[derive(Debug, Clone, Copy)]
enum Transition {
    CheckIn,
    CheckOut,
}

impl Engine {
    /// `Reserved | CheckedOut → CheckedIn`; marks the room unavailable.
    pub async fn check_in(&self, stay_id: Ulid) -> Result<Stay, EngineError> {
        self.transition(stay_id, Transition::CheckIn).await
    }

    /// `Reserved | CheckedIn → CheckedOut`; marks the room available and
    /// frees the stay's remaining nights.
    pub async fn check_out(&self, stay_id: Ulid) -> Result<Stay, EngineError> {
        self.transition(stay_id, Transition::CheckOut).await
    }

    /// The stay flags and the room status change in one event under the
    /// room's write lock, so readers see both or neither.
    async fn transition(&self, stay_id: Ulid, to: Transition) -> Result<Stay, EngineError> {
        let room_id = self
            .room_for_stay(&stay_id)
            .ok_or(EngineError::NotFound(stay_id))?;
        let mut locks = RoomLocks::acquire(self, [room_id]).await?;
        let live = locks
            .get(&room_id)
            .and_then(|rs| rs.stay(stay_id))
            .is_some_and(|s| !s.voided);
        if !live {
            return Err(EngineError::NotFound(stay_id));
        }

        let event = match to {
            Transition::CheckIn => Event::StayCheckedIn { id: stay_id, room_id },
            Transition::CheckOut => Event::StayCheckedOut { id: stay_id, room_id },
        };
        self.persist_and_apply(&mut locks, event).await?;

        let stay = locks
            .get(&room_id)
            .and_then(|rs| rs.stay(stay_id))
            .cloned()
            .ok_or(EngineError::NotFound(stay_id))?;
        info!(stay = %stay_id, room = %room_id, state = ?stay.state(), "stay transitioned");
        Ok(stay)
    }
}
