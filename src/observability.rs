use std::net::SocketAddr;

use crate::command::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total commands executed. Labels: command, status.
pub const COMMANDS_TOTAL: &str = "frontdesk_commands_total";

/// Histogram: command latency in seconds. Labels: command.
pub const COMMAND_DURATION_SECONDS: &str = "frontdesk_command_duration_seconds";

/// Counter: bookings committed.
pub const BOOKINGS_TOTAL: &str = "frontdesk_bookings_total";

/// Counter: booking requests rejected because a night was taken.
pub const BOOKING_CONFLICTS_TOTAL: &str = "frontdesk_booking_conflicts_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "frontdesk_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "frontdesk_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "frontdesk_connections_rejected_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "frontdesk_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "frontdesk_wal_flush_batch_size";

/// Install the Prometheus exporter on `port`. No-op if `port` is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short metrics label for a command.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::CreateRoom { .. } => "create_room",
        Command::UpdateRoom { .. } => "update_room",
        Command::GetRoom { .. } => "get_room",
        Command::ListRooms => "list_rooms",
        Command::CreateBooking(_) => "create_booking",
        Command::GetBooking { .. } => "get_booking",
        Command::ListBookings(_) => "list_bookings",
        Command::GetStay { .. } => "get_stay",
        Command::MarkPaid { .. } => "mark_paid",
        Command::RescheduleStay { .. } => "reschedule_stay",
        Command::DeleteBooking { .. } => "delete_booking",
        Command::CheckIn { .. } => "check_in",
        Command::CheckOut { .. } => "check_out",
        Command::BookedDates { .. } => "booked_dates",
        Command::CheckAvailable { .. } => "check_available",
        Command::Summary(_) => "summary",
    }
}
