//! Stream Assembler
//!
//! Turns the block-start / block-delta / block-stop sequence of one turn into
//! two outputs:
//!
//! - a coalesced "current partial text" published on a [`watch`] channel, at
//!   most once per flush interval, always carrying the latest accumulated text
//! - the final text of each block, handed back to the caller on block-stop so
//!   it can be committed to the Session Store
//!
//! The assembler never sleeps. Timers are deadlines: the turn loop asks for
//! [`StreamAssembler::next_deadline`], sleeps until it, and calls
//! [`StreamAssembler::on_timer`]. Driving it from a paused tokio clock replays
//! a script deterministically.

mod events;

pub use events::{BlockKind, StreamEvent};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Externally observable partial text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialText {
    /// Latest flushed text of the current block
    pub text: String,
    /// Whether a block is still streaming
    pub streaming: bool,
}

/// Ephemeral text of the block being streamed
#[derive(Debug, Clone)]
pub struct StreamBuffer {
    /// Text assembled so far for the current block
    pub accumulated: String,
    /// True between a block-start and its block-stop
    pub active: bool,
    /// Kind of the current block
    pub kind: BlockKind,
}

impl Default for StreamBuffer {
    fn default() -> Self {
        Self {
            accumulated: String::new(),
            active: false,
            kind: BlockKind::Text,
        }
    }
}

/// Text of a block at a flush or at its stop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockText {
    /// Kind of the block
    pub kind: BlockKind,
    /// Accumulated text
    pub text: String,
}

/// Per-turn assembler of streamed content blocks
pub struct StreamAssembler {
    buffer: StreamBuffer,
    partial: Arc<watch::Sender<PartialText>>,
    flush_interval: Duration,
    clear_grace: Duration,
    flush_at: Option<Instant>,
    clear_at: Option<Instant>,
    flushes: u64,
    cancelled: bool,
}

impl StreamAssembler {
    /// Create an assembler publishing to `partial`
    pub fn new(
        partial: Arc<watch::Sender<PartialText>>,
        flush_interval: Duration,
        clear_grace: Duration,
    ) -> Self {
        Self {
            buffer: StreamBuffer::default(),
            partial,
            flush_interval,
            clear_grace,
            flush_at: None,
            clear_at: None,
            flushes: 0,
            cancelled: false,
        }
    }

    /// Feed one decoded event
    ///
    /// Returns the text of a block that completed as a result.
    pub fn apply(&mut self, event: &StreamEvent, now: Instant) -> Option<BlockText> {
        match event {
            StreamEvent::BlockStart { kind, .. } => self.block_start(kind.clone(), now),
            StreamEvent::BlockDelta { text, .. } => {
                self.block_delta(text, now);
                None
            }
            StreamEvent::BlockStop { .. } => self.block_stop(now),
            StreamEvent::Other => None,
        }
    }

    /// Open a block
    ///
    /// A block that is still active is stopped first and its text returned.
    /// Pending flushes and a pending grace-delay clear are discarded.
    pub fn block_start(&mut self, kind: BlockKind, _now: Instant) -> Option<BlockText> {
        if self.cancelled {
            return None;
        }
        let previous = self.buffer.active.then(|| {
            self.flush_now(true);
            self.take_block()
        });
        self.flush_at = None;
        self.clear_at = None;
        self.buffer = StreamBuffer {
            accumulated: String::new(),
            active: true,
            kind,
        };
        previous
    }

    /// Append a fragment and schedule a flush if none is pending
    pub fn block_delta(&mut self, fragment: &str, now: Instant) {
        if self.cancelled {
            return;
        }
        if !self.buffer.active {
            self.block_start(BlockKind::Text, now);
        }
        self.buffer.accumulated.push_str(fragment);
        if self.flush_at.is_none() {
            self.flush_at = Some(now + self.flush_interval);
        }
    }

    /// Close the block: final flush, hand back its text, schedule the clear
    pub fn block_stop(&mut self, now: Instant) -> Option<BlockText> {
        if self.cancelled || !self.buffer.active {
            return None;
        }
        self.flush_now(false);
        self.buffer.active = false;
        self.clear_at = Some(now + self.clear_grace);
        Some(self.take_block())
    }

    /// Earliest pending deadline, if any
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.flush_at, self.clear_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Fire every deadline that has passed
    ///
    /// Returns the flushed text when a coalesced flush happened.
    pub fn on_timer(&mut self, now: Instant) -> Option<BlockText> {
        if self.cancelled {
            return None;
        }
        let mut flushed = None;
        if self.flush_at.is_some_and(|at| at <= now) {
            self.flush_at = None;
            flushed = self.flush_now(true);
        }
        if self.clear_at.is_some_and(|at| at <= now) {
            self.clear_at = None;
            // A newer turn may already be streaming into the same channel.
            self.partial.send_if_modified(|partial| {
                if partial.streaming {
                    return false;
                }
                *partial = PartialText::default();
                true
            });
        }
        flushed
    }

    /// Stop all further flushes and clear the partial text
    ///
    /// Text already committed by the caller is unaffected.
    pub fn cancel(&mut self) {
        self.cancelled = true;
        self.flush_at = None;
        self.clear_at = None;
        self.buffer = StreamBuffer::default();
        self.partial.send_replace(PartialText::default());
    }

    /// Current buffer state
    #[must_use]
    pub fn buffer(&self) -> &StreamBuffer {
        &self.buffer
    }

    /// Number of flushes published so far
    #[must_use]
    pub fn flush_count(&self) -> u64 {
        self.flushes
    }

    fn flush_now(&mut self, streaming: bool) -> Option<BlockText> {
        self.flush_at = None;
        if !self.buffer.active {
            return None;
        }
        self.flushes += 1;
        self.partial.send_replace(PartialText {
            text: self.buffer.accumulated.clone(),
            streaming,
        });
        log::trace!("flushed {} bytes", self.buffer.accumulated.len());
        Some(BlockText {
            kind: self.buffer.kind.clone(),
            text: self.buffer.accumulated.clone(),
        })
    }

    fn take_block(&mut self) -> BlockText {
        BlockText {
            kind: self.buffer.kind.clone(),
            text: std::mem::take(&mut self.buffer.accumulated),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FRAME: Duration = Duration::from_millis(16);
    const GRACE: Duration = Duration::from_millis(500);

    fn assembler() -> (StreamAssembler, watch::Receiver<PartialText>) {
        let (tx, rx) = watch::channel(PartialText::default());
        (StreamAssembler::new(Arc::new(tx), FRAME, GRACE), rx)
    }

    fn delta(text: &str) -> StreamEvent {
        StreamEvent::decode(&json!({
            "type": "content_block_delta",
            "delta": {"type": "text_delta", "text": text}
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn hel_lo_commits_hello() {
        let (mut asm, rx) = assembler();
        let now = Instant::now();
        assert!(asm.apply(&StreamEvent::BlockStart { index: 0, kind: BlockKind::Text }, now).is_none());
        asm.apply(&delta("Hel"), now);
        asm.apply(&delta("lo"), now);
        let done = asm.apply(&StreamEvent::BlockStop { index: 0 }, now).unwrap();

        assert_eq!(done.text, "Hello");
        assert_eq!(done.kind, BlockKind::Text);
        assert_eq!(rx.borrow().text, "Hello");
        assert!(!asm.buffer().active);
    }

    #[tokio::test(start_paused = true)]
    async fn many_deltas_in_one_frame_flush_once_with_latest_text() {
        let (mut asm, rx) = assembler();
        let start = Instant::now();
        asm.block_start(BlockKind::Text, start);
        for fragment in ["a", "b", "c", "d"] {
            asm.block_delta(fragment, start);
        }
        assert_eq!(asm.next_deadline(), Some(start + FRAME));
        assert_eq!(rx.borrow().text, "");

        tokio::time::advance(FRAME).await;
        let flushed = asm.on_timer(Instant::now()).unwrap();
        assert_eq!(flushed.text, "abcd");
        assert_eq!(asm.flush_count(), 1);
        assert_eq!(*rx.borrow(), PartialText { text: "abcd".into(), streaming: true });
        assert_eq!(asm.next_deadline(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn committed_text_is_the_concatenation_regardless_of_flush_timing() {
        let fragments = ["The ", "quick ", "", "brown ", "fox", " jumps"];
        for gap_ms in [0u64, 5, 16, 40] {
            let (mut asm, _rx) = assembler();
            asm.block_start(BlockKind::Text, Instant::now());
            for fragment in fragments {
                asm.block_delta(fragment, Instant::now());
                tokio::time::advance(Duration::from_millis(gap_ms)).await;
                asm.on_timer(Instant::now());
            }
            let done = asm.block_stop(Instant::now()).unwrap();
            assert_eq!(done.text, fragments.concat(), "gap {gap_ms}ms");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn partial_text_clears_after_grace_delay() {
        let (mut asm, rx) = assembler();
        asm.block_start(BlockKind::Text, Instant::now());
        asm.block_delta("done", Instant::now());
        asm.block_stop(Instant::now());
        assert_eq!(*rx.borrow(), PartialText { text: "done".into(), streaming: false });

        tokio::time::advance(GRACE - Duration::from_millis(1)).await;
        asm.on_timer(Instant::now());
        assert_eq!(rx.borrow().text, "done");

        tokio::time::advance(Duration::from_millis(1)).await;
        asm.on_timer(Instant::now());
        assert_eq!(*rx.borrow(), PartialText::default());
    }

    #[tokio::test(start_paused = true)]
    async fn block_start_discards_pending_clear_and_flush() {
        let (mut asm, rx) = assembler();
        asm.block_start(BlockKind::Text, Instant::now());
        asm.block_delta("first", Instant::now());
        asm.block_stop(Instant::now());
        asm.block_start(BlockKind::Text, Instant::now());
        assert_eq!(asm.next_deadline(), None);

        tokio::time::advance(GRACE).await;
        asm.on_timer(Instant::now());
        assert_eq!(rx.borrow().text, "first");
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_start_is_implicit_stop_then_start() {
        let (mut asm, _rx) = assembler();
        asm.block_start(BlockKind::Text, Instant::now());
        asm.block_delta("one", Instant::now());
        let previous = asm.block_start(BlockKind::Text, Instant::now()).unwrap();
        assert_eq!(previous.text, "one");
        assert!(asm.buffer().active);
        assert!(asm.buffer().accumulated.is_empty());

        asm.block_delta("two", Instant::now());
        assert_eq!(asm.block_stop(Instant::now()).unwrap().text, "two");
    }

    #[tokio::test(start_paused = true)]
    async fn delta_without_start_opens_a_block() {
        let (mut asm, _rx) = assembler();
        asm.block_delta("orphan", Instant::now());
        assert!(asm.buffer().active);
        assert_eq!(asm.block_stop(Instant::now()).unwrap().text, "orphan");
        assert!(asm.block_stop(Instant::now()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_further_flushes() {
        let (mut asm, rx) = assembler();
        asm.block_start(BlockKind::Text, Instant::now());
        asm.block_delta("partial", Instant::now());
        asm.cancel();

        tokio::time::advance(FRAME).await;
        assert!(asm.on_timer(Instant::now()).is_none());
        asm.block_delta("more", Instant::now());
        assert!(asm.block_stop(Instant::now()).is_none());
        assert_eq!(asm.flush_count(), 0);
        assert_eq!(*rx.borrow(), PartialText::default());
    }
}
