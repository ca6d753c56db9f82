//! One JSON object per line in, one JSON object per line out.
//!
//! Requests are tagged by `"op"`:
//!
//! ```text
//! {"op":"create_room","name":"101","rate":100}
//! {"op":"create_booking","customer_id":"…","receptionist":"…","payment_method":"Cash",
//!  "stays":[{"room_id":"…","arrival":"2024-01-10","nights":3}]}
//! {"op":"summary","start":"2024-01-01","end":"2024-01-31"}
//! ```
//!
//! Replies are `{"ok": <result>}` or `{"error": {"code": "...", "message": "..."}}`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::{Engine, EngineError};
use crate::model::*;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    CreateRoom {
        /// Generated when omitted.
        #[serde(default)]
        id: Option<Ulid>,
        name: String,
        rate: Money,
    },
    UpdateRoom {
        id: Ulid,
        name: String,
        rate: Money,
    },
    GetRoom {
        id: Ulid,
    },
    ListRooms,
    CreateBooking(BookingRequest),
    GetBooking {
        id: Ulid,
    },
    ListBookings(BookingFilter),
    GetStay {
        booking_id: Ulid,
        stay_id: Ulid,
    },
    MarkPaid {
        booking_id: Ulid,
        method: String,
    },
    RescheduleStay {
        stay_id: Ulid,
        #[serde(default)]
        arrival: Option<NaiveDate>,
        nights: u32,
        #[serde(default)]
        amount: Option<Money>,
    },
    DeleteBooking {
        id: Ulid,
    },
    CheckIn {
        stay_id: Ulid,
    },
    CheckOut {
        stay_id: Ulid,
    },
    BookedDates {
        room_id: Ulid,
    },
    CheckAvailable {
        room_id: Ulid,
        arrival: NaiveDate,
        nights: u32,
    },
    Summary(DateWindow),
}

pub fn parse(line: &str) -> Result<Command, serde_json::Error> {
    serde_json::from_str(line)
}

/// Successful command result.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Outcome {
    Room(Room),
    Rooms(Vec<Room>),
    Booking(Box<BookingView>),
    Bookings(Vec<BookingView>),
    Paid(Booking),
    Stay(Stay),
    Dates(Vec<NaiveDate>),
    Summary(Summary),
    Done,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub enum Reply {
    #[serde(rename = "ok")]
    Ok(Outcome),
    #[serde(rename = "error")]
    Error(ErrorBody),
}

impl Reply {
    pub fn error(code: &'static str, message: impl Into<String>) -> Self {
        Reply::Error(ErrorBody {
            code,
            message: message.into(),
        })
    }

    /// Encode as a single JSON line (without the trailing newline).
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| internal_error_line(&e.to_string()))
    }
}

fn internal_error_line(message: &str) -> String {
    serde_json::json!({ "error": { "code": "internal", "message": message } }).to_string()
}

impl From<Result<Outcome, EngineError>> for Reply {
    fn from(result: Result<Outcome, EngineError>) -> Self {
        match result {
            Ok(outcome) => Reply::Ok(outcome),
            Err(e) => Reply::error(e.code(), e.to_string()),
        }
    }
}

pub async fn execute(engine: &Engine, cmd: Command) -> Result<Outcome, EngineError> {
    match cmd {
        Command::CreateRoom { id, name, rate } => {
            let id = id.unwrap_or_else(Ulid::new);
            engine.create_room(id, name, rate).await.map(Outcome::Room)
        }
        Command::UpdateRoom { id, name, rate } => {
            engine.update_room(id, name, rate).await.map(Outcome::Room)
        }
        Command::GetRoom { id } => engine.get_room(id).await.map(Outcome::Room),
        Command::ListRooms => Ok(Outcome::Rooms(engine.list_rooms().await)),
        Command::CreateBooking(req) => engine
            .create_booking(req)
            .await
            .map(|view| Outcome::Booking(Box::new(view))),
        Command::GetBooking { id } => engine
            .get_booking(id)
            .await
            .map(|view| Outcome::Booking(Box::new(view))),
        Command::ListBookings(filter) => engine.list_bookings(&filter).await.map(Outcome::Bookings),
        Command::GetStay { booking_id, stay_id } => {
            engine.get_stay(booking_id, stay_id).await.map(Outcome::Stay)
        }
        Command::MarkPaid { booking_id, method } => {
            engine.mark_paid(booking_id, method).await.map(Outcome::Paid)
        }
        Command::RescheduleStay {
            stay_id,
            arrival,
            nights,
            amount,
        } => {
            let req = RescheduleRequest {
                arrival,
                nights,
                amount,
            };
            engine.reschedule_stay(stay_id, req).await.map(Outcome::Stay)
        }
        Command::DeleteBooking { id } => engine.delete_booking(id).await.map(|_| Outcome::Done),
        Command::CheckIn { stay_id } => engine.check_in(stay_id).await.map(Outcome::Stay),
        Command::CheckOut { stay_id } => engine.check_out(stay_id).await.map(Outcome::Stay),
        Command::BookedDates { room_id } => engine.booked_dates(room_id).await.map(Outcome::Dates),
        Command::CheckAvailable {
            room_id,
            arrival,
            nights,
        } => engine
            .check_available(room_id, arrival, nights)
            .await
            .map(|_| Outcome::Done),
        Command::Summary(window) => engine.summarize(&window).await.map(Outcome::Summary),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";

    #[test]
    fn parse_create_room_without_id() {
        let cmd = parse(r#"{"op":"create_room","name":"101","rate":100}"#).unwrap();
        assert_eq!(
            cmd,
            Command::CreateRoom {
                id: None,
                name: "101".into(),
                rate: 100
            }
        );
    }

    #[test]
    fn parse_unit_command() {
        assert_eq!(parse(r#"{"op":"list_rooms"}"#).unwrap(), Command::ListRooms);
    }

    #[test]
    fn parse_create_booking_with_optional_fields() {
        let line = format!(
            r#"{{"op":"create_booking","customer_id":"{ID}","receptionist":"{ID}",
                "payment_method":"Cash","complementary":true,
                "stays":[{{"room_id":"{ID}","nights":2}},
                         {{"room_id":"{ID}","arrival":"2024-01-10","nights":1,"amount":50}}]}}"#
        );
        match parse(&line).unwrap() {
            Command::CreateBooking(req) => {
                assert!(req.complementary);
                assert!(!req.paid);
                assert_eq!(req.stays.len(), 2);
                assert_eq!(req.stays[0].arrival, None);
                assert_eq!(req.stays[0].amount, None);
                assert_eq!(req.stays[1].arrival, NaiveDate::from_ymd_opt(2024, 1, 10));
                assert_eq!(req.stays[1].amount, Some(50));
            }
            other => panic!("expected CreateBooking, got {other:?}"),
        }
    }

    #[test]
    fn parse_summary_window() {
        let cmd = parse(r#"{"op":"summary","start":"2024-01-01"}"#).unwrap();
        assert_eq!(
            cmd,
            Command::Summary(DateWindow {
                start: NaiveDate::from_ymd_opt(2024, 1, 1),
                end: None,
            })
        );
        assert_eq!(parse(r#"{"op":"summary"}"#).unwrap(), Command::Summary(DateWindow::default()));
    }

    #[test]
    fn parse_list_bookings_filter() {
        let line = format!(r#"{{"op":"list_bookings","end":"2024-02-29","receptionist":"{ID}"}}"#);
        match parse(&line).unwrap() {
            Command::ListBookings(filter) => {
                assert_eq!(filter.window.start, None);
                assert_eq!(filter.window.end, NaiveDate::from_ymd_opt(2024, 2, 29));
                assert_eq!(filter.receptionist.map(|r| r.to_string()), Some(ID.to_string()));
            }
            other => panic!("expected ListBookings, got {other:?}"),
        }
    }

    #[test]
    fn malformed_date_rejected() {
        assert!(parse(r#"{"op":"summary","start":"2024-13-01"}"#).is_err());
        assert!(parse(r#"{"op":"summary","start":"01/01/2024"}"#).is_err());
    }

    #[test]
    fn unknown_op_rejected() {
        assert!(parse(r#"{"op":"drop_table"}"#).is_err());
        assert!(parse("not json").is_err());
    }

    #[test]
    fn reply_shapes() {
        let ok: Reply = Ok(Outcome::Done).into();
        assert_eq!(ok.encode(), r#"{"ok":null}"#);

        let err: Reply = Err(EngineError::InvalidRequest("night count must be positive")).into();
        let v: serde_json::Value = serde_json::from_str(&err.encode()).unwrap();
        assert_eq!(v["error"]["code"], "invalid_request");
        assert_eq!(v["error"]["message"], "invalid request: night count must be positive");
    }

    #[test]
    fn internal_error_line_escapes_message() {
        let line = internal_error_line("bad \"key\" at C:\\wal\nnext");
        let v: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(v["error"]["code"], "internal");
        assert_eq!(v["error"]["message"], "bad \"key\" at C:\\wal\nnext");
        assert!(!line.contains('\n'));
    }

    #[test]
    fn summary_reply_keys_methods_by_name() {
        let summary = Summary {
            total_amount: 300,
            booking_count: 2,
            amount_by_method: PaymentMethod::ALL.iter().map(|m| (*m, 0)).collect(),
            check_ins: 0,
            check_outs: 0,
            available_rooms: 1,
        };
        let v: serde_json::Value =
            serde_json::from_str(&Reply::Ok(Outcome::Summary(summary)).encode()).unwrap();
        assert_eq!(v["ok"]["total_amount"], 300);
        assert_eq!(v["ok"]["amount_by_method"]["transfer"], 0);
    }
}
