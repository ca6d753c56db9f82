use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, used for every stored instant.
pub type Ms = i64;

/// Currency amount in minor units. Totals are exact integer sums.
pub type Money = i64;

pub const HOUR_MS: Ms = 3_600_000;
pub const DAY_MS: Ms = 24 * HOUR_MS;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Available,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: Ulid,
    pub name: String,
    /// Nightly rate.
    pub rate: Money,
    pub status: RoomStatus,
}

/// One room reserved for a contiguous run of nights within a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stay {
    pub id: Ulid,
    pub booking_id: Ulid,
    pub room_id: Ulid,
    /// Calendar date of the first night.
    pub arrival: NaiveDate,
    /// `[arrival 12:00, arrival + nights 12:00)`.
    pub span: Span,
    pub nights: u32,
    /// Per-night rate applied to this stay (override or room rate at booking time).
    pub rate: Money,
    /// `rate * nights`.
    pub amount: Money,
    pub checked_in: bool,
    pub checked_out: bool,
    /// Set when the owning booking is soft-deleted.
    pub voided: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StayState {
    Reserved,
    CheckedIn,
    CheckedOut,
}

impl Stay {
    pub fn state(&self) -> StayState {
        match (self.checked_in, self.checked_out) {
            (true, _) => StayState::CheckedIn,
            (false, true) => StayState::CheckedOut,
            (false, false) => StayState::Reserved,
        }
    }

    /// Whether this stay currently claims its nights on the room.
    pub fn holds_nights(&self) -> bool {
        !self.checked_out && !self.voided
    }

    /// The occupied calendar nights, in order.
    pub fn nights(&self) -> impl Iterator<Item = NaiveDate> {
        self.arrival.iter_days().take(self.nights as usize)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub customer_id: Ulid,
    pub receptionist: Ulid,
    pub payment_method: String,
    pub paid: bool,
    pub complementary: bool,
    /// Sum of the stays' amounts.
    pub amount: Money,
    pub created_at: Ms,
    pub deleted_at: Option<Ms>,
    pub stay_ids: Vec<Ulid>,
}

impl Booking {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Payment methods the summary reports separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Transfer,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 3] = [PaymentMethod::Cash, PaymentMethod::Card, PaymentMethod::Transfer];

    /// Classify a free-form method string. Unknown methods map to `None`.
    pub fn classify(method: &str) -> Option<Self> {
        let m = method.trim();
        if m.eq_ignore_ascii_case("cash") {
            Some(PaymentMethod::Cash)
        } else if m.eq_ignore_ascii_case("card")
            || m.eq_ignore_ascii_case("credit card")
            || m.eq_ignore_ascii_case("pos")
        {
            Some(PaymentMethod::Card)
        } else if m.eq_ignore_ascii_case("transfer") {
            Some(PaymentMethod::Transfer)
        } else {
            None
        }
    }
}

/// Per-room state: the room record plus all of its stays, sorted by `span.start`.
#[derive(Debug, Clone)]
pub struct RoomState {
    pub room: Room,
    pub stays: Vec<Stay>,
}

impl RoomState {
    pub fn new(room: Room) -> Self {
        Self {
            room,
            stays: Vec::new(),
        }
    }

    pub fn insert_stay(&mut self, stay: Stay) {
        let pos = self
            .stays
            .binary_search_by_key(&stay.span.start, |s| s.span.start)
            .unwrap_or_else(|e| e);
        self.stays.insert(pos, stay);
    }

    pub fn remove_stay(&mut self, id: Ulid) -> Option<Stay> {
        let pos = self.stays.iter().position(|s| s.id == id)?;
        Some(self.stays.remove(pos))
    }

    pub fn stay(&self, id: Ulid) -> Option<&Stay> {
        self.stays.iter().find(|s| s.id == id)
    }

    pub fn stay_mut(&mut self, id: Ulid) -> Option<&mut Stay> {
        self.stays.iter_mut().find(|s| s.id == id)
    }

    /// True if a checked-in, not checked-out stay covers `now`.
    pub fn is_occupied_at(&self, now: Ms) -> bool {
        let started = self.stays.partition_point(|s| s.span.start <= now);
        self.stays[..started]
            .iter()
            .any(|s| s.span.contains_instant(now) && s.checked_in && !s.checked_out && !s.voided)
    }
}

/// Flat event log record. Every mutation is exactly one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomCreated {
        room: Room,
    },
    RoomUpdated {
        id: Ulid,
        name: String,
        rate: Money,
    },
    /// A booking and all of its stays, committed as one unit.
    BookingCreated {
        booking: Booking,
        stays: Vec<Stay>,
    },
    BookingDeleted {
        id: Ulid,
        at: Ms,
    },
    BookingPaid {
        id: Ulid,
        method: String,
    },
    StayCheckedIn {
        id: Ulid,
        room_id: Ulid,
    },
    StayCheckedOut {
        id: Ulid,
        room_id: Ulid,
    },
    StayRescheduled {
        id: Ulid,
        room_id: Ulid,
        arrival: NaiveDate,
        span: Span,
        nights: u32,
        rate: Money,
        amount: Money,
    },
}

// ── Request shapes ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StayRequest {
    pub room_id: Ulid,
    /// Defaults to today.
    #[serde(default)]
    pub arrival: Option<NaiveDate>,
    pub nights: u32,
    /// Per-night override of the room rate.
    #[serde(default)]
    pub amount: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub customer_id: Ulid,
    pub receptionist: Ulid,
    pub payment_method: String,
    #[serde(default)]
    pub paid: bool,
    #[serde(default)]
    pub complementary: bool,
    pub stays: Vec<StayRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescheduleRequest {
    /// Keeps the current arrival when omitted.
    #[serde(default)]
    pub arrival: Option<NaiveDate>,
    pub nights: u32,
    /// Keeps the current per-night rate when omitted.
    #[serde(default)]
    pub amount: Option<Money>,
}

/// Inclusive calendar-date window; a missing bound is open on that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    #[serde(default)]
    pub start: Option<NaiveDate>,
    #[serde(default)]
    pub end: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingFilter {
    #[serde(flatten)]
    pub window: DateWindow,
    #[serde(default)]
    pub receptionist: Option<Ulid>,
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingView {
    #[serde(flatten)]
    pub booking: Booking,
    pub stays: Vec<Stay>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total_amount: Money,
    pub booking_count: usize,
    pub amount_by_method: BTreeMap<PaymentMethod, Money>,
    pub check_ins: usize,
    pub check_outs: usize,
    pub available_rooms: usize,
}
