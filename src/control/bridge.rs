//! Line-delimited JSON bridge between a UI process and the orchestrator
//!
//! Commands are read one per line and handled in arrival order. Events are
//! written by a separate task so a slow command never holds back output.

use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::manager::Orchestrator;

use super::protocol::{ProtocolHandler, ServerEvent};

/// Serve the bridge on this process's stdin and stdout
///
/// Returns when stdin closes, after every running turn was stopped.
///
/// # Errors
/// Returns error if reading stdin fails
pub async fn run_stdio_bridge(
    orchestrator: &Orchestrator,
    events: mpsc::UnboundedReceiver<ServerEvent>,
    max_line_bytes: usize,
) -> Result<()> {
    run_bridge(
        orchestrator,
        events,
        tokio::io::stdin(),
        tokio::io::stdout(),
        max_line_bytes,
    )
    .await
}

/// Serve the bridge over any reader/writer pair
///
/// # Errors
/// Returns error if reading commands fails
pub async fn run_bridge<R, W>(
    orchestrator: &Orchestrator,
    events: mpsc::UnboundedReceiver<ServerEvent>,
    reader: R,
    writer: W,
    max_line_bytes: usize,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let handler = ProtocolHandler::new();
    let done = CancellationToken::new();
    let writer_task = tokio::spawn(write_events(events, writer, done.clone()));

    let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(max_line_bytes));
    let result = loop {
        let line = match lines.next().await {
            Some(Ok(line)) => line,
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                log::warn!("Dropping command longer than {max_line_bytes} bytes");
                orchestrator.notify(ServerEvent::error(
                    format!("Command exceeds {max_line_bytes} bytes"),
                    None,
                ));
                continue;
            }
            Some(Err(LinesCodecError::Io(e))) => break Err(e.into()),
            None => break Ok(()),
        };
        if line.trim().is_empty() {
            continue;
        }
        match handler.deserialize_command(&line) {
            Ok(command) => {
                log::debug!("Command: {command:?}");
                orchestrator.handle_command(command).await;
            }
            Err(e) => {
                log::warn!("Rejected command: {e}");
                orchestrator.notify(ServerEvent::error(e.to_string(), None));
            }
        }
    };

    log::info!("Bridge input closed");
    orchestrator.shutdown().await;
    done.cancel();
    if let Err(e) = writer_task.await {
        log::warn!("Event writer ended abnormally: {e}");
    }
    result
}

async fn write_events<W>(
    mut events: mpsc::UnboundedReceiver<ServerEvent>,
    mut writer: W,
    done: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    let handler = ProtocolHandler::new();
    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            () = done.cancelled() => events.try_recv().ok(),
        };
        let Some(event) = event else { break };
        let line = match handler.serialize_event(&event) {
            Ok(line) => line,
            Err(e) => {
                log::error!("Failed to encode event: {e}");
                continue;
            }
        };
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            log::error!("Bridge output closed: {e}");
            break;
        }
        if let Err(e) = writer.flush().await {
            log::error!("Bridge output closed: {e}");
            break;
        }
    }
}
