use std::sync::Arc;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::debug;

use crate::command::{self, Reply};
use crate::engine::Engine;
use crate::limits::MAX_LINE_LEN;
use crate::observability::{command_label, COMMANDS_TOTAL, COMMAND_DURATION_SECONDS};

/// Serve one client until it disconnects. Commands on a connection run in order.
pub async fn process_connection(socket: TcpStream, engine: Arc<Engine>) -> Result<(), LinesCodecError> {
    let mut lines = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_LEN));
    // After a decode error the framed stream yields one `None` before reading on.
    let mut recovering = false;

    loop {
        let reply = match lines.next().await {
            None if recovering => {
                recovering = false;
                continue;
            }
            None => break,
            Some(Ok(line)) if line.trim().is_empty() => continue,
            Some(Ok(line)) => handle_line(&engine, &line).await,
            // The codec discards the rest of the line, so the connection stays usable.
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                recovering = true;
                Reply::error("limit_exceeded", format!("line longer than {MAX_LINE_LEN} bytes"))
            }
            Some(Err(e)) => return Err(e),
        };
        lines.send(reply.encode()).await?;
    }
    Ok(())
}

pub async fn handle_line(engine: &Engine, line: &str) -> Reply {
    let cmd = match command::parse(line) {
        Ok(cmd) => cmd,
        Err(e) => {
            metrics::counter!(COMMANDS_TOTAL, "command" => "unparsed", "status" => "invalid_request")
                .increment(1);
            return Reply::error("invalid_request", e.to_string());
        }
    };

    let label = command_label(&cmd);
    let started = Instant::now();
    let result = command::execute(engine, cmd).await;
    let status = match &result {
        Ok(_) => "ok",
        Err(e) => e.code(),
    };
    metrics::histogram!(COMMAND_DURATION_SECONDS, "command" => label)
        .record(started.elapsed().as_secs_f64());
    metrics::counter!(COMMANDS_TOTAL, "command" => label, "status" => status).increment(1);
    if let Err(e) = &result {
        debug!(command = label, "command failed: {e}");
    }
    result.into()
}
