//! Per-session turn bookkeeping

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle on the turn currently running for a session
pub(super) struct ActiveTurn {
    /// Distinguishes this turn from a later one of the same session
    pub generation: u64,
    /// Cancelled by stop, delete and shutdown
    pub cancel: CancellationToken,
    /// Supervisor task; finishes after the turn has settled
    pub handle: JoinHandle<()>,
}

impl ActiveTurn {
    /// Cancel the turn and wait until it has settled
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            log::warn!("Turn supervisor ended abnormally: {e}");
        }
    }
}

/// How a turn ended
#[derive(Debug, Clone, PartialEq)]
pub(super) enum TurnOutcome {
    /// The runtime reported a result
    Completed(Option<String>),
    /// The runtime failed or broke protocol
    Failed(String),
    /// The user stopped the turn or the session is going away
    Stopped,
}
