//! Shared test doubles: a scriptable byte channel and a recording sink.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use crate::serial::ByteChannel;
use crate::sink::{ChunkStyle, Sink, SinkEvent};

/// What the channel does once its scripted reads are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AfterScript {
    /// Report nothing pending forever (a quiet but healthy device)
    Idle,
    /// Report a device-level failure (an unplugged device)
    Fail,
}

enum ReadStep {
    Data(Vec<u8>),
    Error,
}

/// In-memory ByteChannel with scripted reads and recorded writes.
pub(crate) struct MockChannel {
    reads: VecDeque<ReadStep>,
    after: AfterScript,
    writes: Arc<Mutex<Vec<u8>>>,
    fail_writes: bool,
}

impl MockChannel {
    /// A channel with no pending data that stays healthy forever.
    pub(crate) fn idle() -> Self {
        Self::new(AfterScript::Idle)
    }

    /// A channel that fails reads once its script runs out.
    pub(crate) fn failing_after_script() -> Self {
        Self::new(AfterScript::Fail)
    }

    fn new(after: AfterScript) -> Self {
        Self {
            reads: VecDeque::new(),
            after,
            writes: Arc::new(Mutex::new(Vec::new())),
            fail_writes: false,
        }
    }

    /// Queue one batch of inbound bytes.
    pub(crate) fn push_read(&mut self, bytes: Vec<u8>) {
        self.reads.push_back(ReadStep::Data(bytes));
    }

    /// Queue a read error at this point in the script.
    pub(crate) fn push_read_error(&mut self) {
        self.reads.push_back(ReadStep::Error);
    }

    /// Make every write fail with a broken-pipe error.
    pub(crate) fn fail_writes(&mut self) {
        self.fail_writes = true;
    }

    /// Handle for inspecting recorded writes after the channel moves
    /// into a PortHandle.
    pub(crate) fn writes_handle(&self) -> Arc<Mutex<Vec<u8>>> {
        self.writes.clone()
    }

    fn device_gone() -> io::Error {
        io::Error::new(io::ErrorKind::BrokenPipe, "device gone")
    }
}

impl ByteChannel for MockChannel {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        match self.reads.front() {
            Some(ReadStep::Data(bytes)) => Ok(bytes.len() as u32),
            Some(ReadStep::Error) => Err(Self::device_gone()),
            None => match self.after {
                AfterScript::Idle => Ok(0),
                AfterScript::Fail => Err(Self::device_gone()),
            },
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.reads.pop_front() {
            Some(ReadStep::Data(bytes)) => {
                let n = buf.len().min(bytes.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    // Remainder stays queued for the next poll
                    self.reads.push_front(ReadStep::Data(bytes[n..].to_vec()));
                }
                Ok(n)
            }
            Some(ReadStep::Error) => Err(Self::device_gone()),
            None => Ok(0),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        if self.fail_writes {
            return Err(Self::device_gone());
        }
        self.writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(buf);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Sink that records every call for later assertions.
pub(crate) struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub(crate) fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn events(&self) -> Vec<SinkEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Concatenation of all appended text regardless of style.
    pub(crate) fn appended_text(&self) -> String {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Append { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn clear_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, SinkEvent::Clear))
            .count()
    }

    pub(crate) fn notifications(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Append {
                    text,
                    style: ChunkStyle::Notification,
                } => Some(text),
                _ => None,
            })
            .collect()
    }
}

impl Sink for RecordingSink {
    fn append(&self, text: &str, style: ChunkStyle) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SinkEvent::Append {
                text: text.to_string(),
                style,
            });
    }

    fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SinkEvent::Clear);
    }

    fn maybe_autoscroll(&self) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SinkEvent::Autoscroll);
    }
}

/// Install a tracing subscriber for test diagnostics; repeated calls are
/// fine, only the first wins.
pub(crate) fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
