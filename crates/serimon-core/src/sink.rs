//! Display sink boundary
//!
//! The UI implements [`Sink`]; the receive loop and the controller call
//! it from whatever thread they run on. UIs with thread affinity wrap a
//! [`ChannelSink`] instead and drain its events on their own thread.

use std::sync::mpsc::Sender;

/// Presentation class of an appended chunk
///
/// Drives presentation only (e.g. sent data rendered distinctly), never
/// meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStyle {
    /// Inbound device data
    Normal,
    /// Echo of locally sent data
    Sent,
    /// Connection notices and errors
    Notification,
}

/// Consumer of display-ready terminal output
///
/// Implementations must tolerate calls from a background thread; the
/// core never holds locks across sink calls.
pub trait Sink: Send + Sync {
    /// Append a chunk of rendered text
    fn append(&self, text: &str, style: ChunkStyle);

    /// Drop all accumulated display history
    fn clear(&self);

    /// Scroll to the end, if the user keeps autoscroll enabled
    fn maybe_autoscroll(&self) {}
}

/// One marshaled sink call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    /// Text to append, with its presentation class
    Append {
        /// Rendered chunk text
        text: String,
        /// Presentation class
        style: ChunkStyle,
    },
    /// Display history must be dropped
    Clear,
    /// The view may scroll to the end
    Autoscroll,
}

/// Sink that forwards every call over an mpsc channel
///
/// Send failures are ignored on purpose: a dropped receiver just means
/// the consuming UI went away, which must never take down the receive
/// loop.
pub struct ChannelSink {
    tx: Sender<SinkEvent>,
}

impl ChannelSink {
    /// Wrap a channel sender
    pub fn new(tx: Sender<SinkEvent>) -> Self {
        Self { tx }
    }
}

impl Sink for ChannelSink {
    fn append(&self, text: &str, style: ChunkStyle) {
        let _ = self.tx.send(SinkEvent::Append {
            text: text.to_string(),
            style,
        });
    }

    fn clear(&self) {
        let _ = self.tx.send(SinkEvent::Clear);
    }

    fn maybe_autoscroll(&self) {
        let _ = self.tx.send(SinkEvent::Autoscroll);
    }
}
