use chrono::{DateTime, NaiveDate, NaiveTime};

use crate::model::*;

use super::EngineError;

/// Offset from midnight at which a night begins. A night `d` covers `[d 12:00, d+1 12:00)`.
pub const CHECK_IN_OFFSET: Ms = 12 * HOUR_MS;

/// The `nights` consecutive calendar nights starting at `arrival`.
pub fn expand(arrival: NaiveDate, nights: u32) -> Result<Vec<NaiveDate>, EngineError> {
    if nights == 0 {
        return Err(EngineError::InvalidRequest("night count must be positive"));
    }
    let dates: Vec<NaiveDate> = arrival.iter_days().take(nights as usize).collect();
    if dates.len() != nights as usize {
        return Err(EngineError::InvalidRequest("stay runs past the end of the calendar"));
    }
    Ok(dates)
}

/// Midnight UTC of `date`, in unix ms.
fn midnight(date: NaiveDate) -> Ms {
    date.and_time(NaiveTime::default()).and_utc().timestamp_millis()
}

/// Noon offset normalization: the instant the night of `date` begins.
pub fn check_in_instant(date: NaiveDate) -> Ms {
    midnight(date) + CHECK_IN_OFFSET
}

/// The calendar date an instant falls on (UTC).
pub fn date_of(t: Ms) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(t).map(|dt| dt.date_naive())
}

/// Resolve the arrival night of a stay request. Omitted means today.
pub fn resolve_arrival(requested: Option<NaiveDate>, now: Ms) -> Result<NaiveDate, EngineError> {
    match requested {
        Some(date) => Ok(date),
        None => date_of(now).ok_or(EngineError::InvalidRequest("clock out of range")),
    }
}

/// Stored `[start, end)` for a stay: arrival at the check-in hour, end `nights` days later.
pub fn stay_span(arrival: NaiveDate, nights: u32) -> Span {
    let start = check_in_instant(arrival);
    Span::new(start, start + nights as Ms * DAY_MS)
}

/// `[start 00:00, end+1 00:00)` in ms for an inclusive date window.
pub fn window_bounds(window: &DateWindow) -> Result<(Ms, Ms), EngineError> {
    let lo = window.start.map_or(Ms::MIN, midnight);
    let hi = match window.end {
        Some(end) => midnight(end) + DAY_MS,
        None => Ms::MAX,
    };
    if lo >= hi {
        return Err(EngineError::InvalidRequest("window start is after window end"));
    }
    Ok((lo, hi))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn expand_yields_consecutive_nights() {
        let nights = expand(date(2024, 1, 10), 3).unwrap();
        assert_eq!(nights, vec![date(2024, 1, 10), date(2024, 1, 11), date(2024, 1, 12)]);
    }

    #[test]
    fn expand_length_and_offsets() {
        let start = date(2023, 12, 30);
        for n in 1..=40u32 {
            let nights = expand(start, n).unwrap();
            assert_eq!(nights.len(), n as usize);
            for (i, night) in nights.iter().enumerate() {
                assert_eq!(*night, start + chrono::Days::new(i as u64));
            }
        }
    }

    #[test]
    fn expand_zero_rejected() {
        assert!(matches!(expand(date(2024, 1, 10), 0), Err(EngineError::InvalidRequest(_))));
    }

    #[test]
    fn expand_crosses_leap_day() {
        let nights = expand(date(2024, 2, 28), 2).unwrap();
        assert_eq!(nights, vec![date(2024, 2, 28), date(2024, 2, 29)]);
    }

    #[test]
    fn check_in_is_noon() {
        let t = check_in_instant(date(1970, 1, 2));
        assert_eq!(t, DAY_MS + 12 * HOUR_MS);
    }

    #[test]
    fn night_boundary_at_noon() {
        let tenth = stay_span(date(2024, 1, 10), 1);
        let eleventh = stay_span(date(2024, 1, 11), 1);
        assert_eq!(tenth.end, eleventh.start);
        // 11:59 on the 11th still belongs to the night of the 10th
        let before_noon = check_in_instant(date(2024, 1, 11)) - 60_000;
        assert!(tenth.contains_instant(before_noon));
        assert!(!eleventh.contains_instant(before_noon));
        // late evening is the same night as that noon
        assert!(eleventh.contains_instant(eleventh.start + 11 * HOUR_MS));
    }

    #[test]
    fn stay_span_ends_on_checkout_noon() {
        let span = stay_span(date(2024, 1, 10), 3);
        assert_eq!(span.end - span.start, 3 * DAY_MS);
        assert_eq!(span.start - CHECK_IN_OFFSET, midnight(date(2024, 1, 10)));
        assert_eq!(span.end, check_in_instant(date(2024, 1, 13)));
    }

    #[test]
    fn omitted_arrival_is_today_even_before_noon() {
        let morning = check_in_instant(date(2024, 5, 1)) - 3 * HOUR_MS;
        assert_eq!(resolve_arrival(None, morning).unwrap(), date(2024, 5, 1));
        assert_eq!(resolve_arrival(Some(date(2024, 6, 1)), morning).unwrap(), date(2024, 6, 1));
    }

    #[test]
    fn window_is_inclusive_of_whole_end_day() {
        let w = DateWindow {
            start: Some(date(2024, 1, 1)),
            end: Some(date(2024, 1, 31)),
        };
        let (lo, hi) = window_bounds(&w).unwrap();
        assert_eq!(lo, check_in_instant(date(2024, 1, 1)) - CHECK_IN_OFFSET);
        assert_eq!(hi, check_in_instant(date(2024, 2, 1)) - CHECK_IN_OFFSET);
    }

    #[test]
    fn window_open_bounds() {
        assert_eq!(window_bounds(&DateWindow::default()).unwrap(), (Ms::MIN, Ms::MAX));
    }

    #[test]
    fn window_inverted_rejected() {
        let w = DateWindow {
            start: Some(date(2024, 2, 1)),
            end: Some(date(2024, 1, 1)),
        };
        assert!(window_bounds(&w).is_err());
    }
}
