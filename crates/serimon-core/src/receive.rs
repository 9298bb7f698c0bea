//! Background receive loop
//!
//! One OS thread per open port: polls for pending bytes, renders them
//! per the configured mode, and forwards display chunks to the sink
//! while keeping accumulated display history under the retention limit.
//!
//! The loop never blocks longer than [`crate::POLL_INTERVAL`], so both
//! cancellation latency and disconnect latency stay bounded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Local};
use tracing::{debug, warn};

use crate::codec::{self, Mode};
use crate::serial::PortHandle;
use crate::sink::{ChunkStyle, Sink};
use crate::{POLL_INTERVAL, READ_CHUNK_SIZE, RETENTION_LIMIT};

/// Notice emitted when the device disappears mid-read
const CONNECTION_CLOSED_NOTICE: &str = "Serial connection closed.\n";

/// A decoded batch of inbound bytes on its way to the sink
///
/// Ephemeral: produced per successful non-empty read, consumed once by
/// the sink, never stored by the core.
#[derive(Debug, Clone)]
pub struct InboundChunk {
    /// Raw bytes as read from the device
    pub bytes: Vec<u8>,
    /// Arrival time
    pub timestamp: DateTime<Local>,
    /// Display-ready rendering, timestamp prefix included
    pub text: String,
}

/// Render one batch of inbound bytes for display
pub fn render_chunk(
    bytes: Vec<u8>,
    timestamp: DateTime<Local>,
    mode: Mode,
    timestamps: bool,
) -> InboundChunk {
    let body = match mode {
        Mode::Ascii => codec::decode_ascii(&bytes),
        Mode::Hex => codec::decode_hex(&bytes),
    };
    let text = if timestamps {
        format!("[{}] {}", codec::format_timestamp(timestamp), body)
    } else {
        body
    };
    InboundChunk {
        bytes,
        timestamp,
        text,
    }
}

/// Handle to a running receive loop
///
/// Exactly one loop exists per open port. Dropping the handle stops the
/// loop the same way [`ReceiveLoop::stop`] does.
pub struct ReceiveLoop {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ReceiveLoop {
    /// Spawn the loop against an open port
    pub fn spawn(port: PortHandle, sink: Arc<dyn Sink>, mode: Mode, timestamps: bool) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = thread::spawn(move || run(port, sink, mode, timestamps, flag));
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Signal the loop and wait for it to exit
    ///
    /// Returns only once the thread has observably stopped; the caller
    /// may close the port afterwards without racing a read. Cancellation
    /// is cooperative (checked once per iteration), so this completes
    /// within roughly one poll interval.
    pub fn stop(mut self) {
        self.shutdown();
    }

    /// Whether the loop thread exited on its own (device failure)
    pub fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| handle.is_finished())
            .unwrap_or(true)
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            // A panicked loop thread has already stopped reading, which
            // is all the caller needs before closing the port
            let _ = handle.join();
        }
    }
}

impl Drop for ReceiveLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(port: PortHandle, sink: Arc<dyn Sink>, mode: Mode, timestamps: bool, stop: Arc<AtomicBool>) {
    debug!(?mode, timestamps, "receive loop started");
    let mut emitted: u64 = 0;

    while !stop.load(Ordering::SeqCst) {
        let bytes = match port.read_available(READ_CHUNK_SIZE) {
            Ok(bytes) => bytes,
            Err(e) => {
                // The sole internally-fatal condition: report once, exit
                warn!(error = %e, "receive loop terminating");
                sink.append(CONNECTION_CLOSED_NOTICE, ChunkStyle::Notification);
                break;
            }
        };

        if bytes.is_empty() {
            thread::sleep(POLL_INTERVAL);
            continue;
        }

        let chunk = render_chunk(bytes, Local::now(), mode, timestamps);
        sink.append(&chunk.text, ChunkStyle::Normal);
        sink.maybe_autoscroll();

        emitted += chunk.text.len() as u64;
        if emitted > RETENTION_LIMIT {
            debug!(emitted, "retention limit exceeded, clearing display history");
            sink.clear();
            emitted = 0;
        }
    }

    debug!("receive loop stopped");
}
