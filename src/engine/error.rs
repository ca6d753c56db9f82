use chrono::{Datelike, NaiveDate};
use ulid::Ulid;

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// A requested night is already held by another stay on the room.
    Conflict {
        room_id: Ulid,
        room: String,
        date: NaiveDate,
    },
    InvalidRequest(&'static str),
    LimitExceeded(&'static str),
    StorageFailure(String),
}

impl EngineError {
    /// Stable machine-readable code for the protocol layer.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "not_found",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::Conflict { .. } => "conflict",
            EngineError::InvalidRequest(_) => "invalid_request",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::StorageFailure(_) => "storage_failure",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::Conflict { room, date, .. } => write!(
                f,
                "room number {room} is booked on {}/{}/{}",
                date.day(),
                date.month(),
                date.year()
            ),
            EngineError::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::StorageFailure(e) => write!(f, "storage failure: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
