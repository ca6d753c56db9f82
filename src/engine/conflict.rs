use std::collections::BTreeSet;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::calendar;
use super::occupancy::occupied_nights_except;
use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    chrono::Utc::now().timestamp_millis()
}

pub(crate) fn validate_nights(nights: u32) -> Result<(), EngineError> {
    if nights == 0 {
        return Err(EngineError::InvalidRequest("night count must be positive"));
    }
    if nights > MAX_NIGHTS_PER_STAY {
        return Err(EngineError::LimitExceeded("too many nights in one stay"));
    }
    Ok(())
}

pub(crate) fn validate_rate(rate: Money) -> Result<(), EngineError> {
    if rate < 0 {
        return Err(EngineError::InvalidRequest("amount must not be negative"));
    }
    if rate > MAX_RATE {
        return Err(EngineError::LimitExceeded("amount too large"));
    }
    Ok(())
}

/// First candidate night (chronologically) already present in `occupied`.
pub(crate) fn first_conflict(candidate: &[NaiveDate], occupied: &BTreeSet<NaiveDate>) -> Option<NaiveDate> {
    candidate.iter().find(|night| occupied.contains(night)).copied()
}

/// Reject `[arrival, arrival + nights)` on this room if any of its nights is
/// held by an active stay other than `skip`, or by `pending` (nights claimed
/// earlier in the same request). Returns the candidate nights on success.
pub(crate) fn check_available(
    rs: &RoomState,
    arrival: NaiveDate,
    nights: u32,
    skip: Option<Ulid>,
    pending: Option<&BTreeSet<NaiveDate>>,
) -> Result<Vec<NaiveDate>, EngineError> {
    let candidate = calendar::expand(arrival, nights)?;
    let mut occupied = occupied_nights_except(rs, skip);
    if let Some(extra) = pending {
        occupied.extend(extra.iter().copied());
    }
    match first_conflict(&candidate, &occupied) {
        Some(date) => Err(EngineError::Conflict {
            room_id: rs.room.id,
            room: rs.room.name.clone(),
            date,
        }),
        None => Ok(candidate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn first_conflict_is_earliest_taken_night() {
        let candidate = calendar::expand(date(2024, 3, 1), 5).unwrap();
        let occupied: BTreeSet<_> = [date(2024, 3, 4), date(2024, 3, 2)].into();
        assert_eq!(first_conflict(&candidate, &occupied), Some(date(2024, 3, 2)));
        // checkout day of the candidate is not one of its nights
        let after: BTreeSet<_> = [date(2024, 3, 6)].into();
        assert_eq!(first_conflict(&candidate, &after), None);
    }
}
