//! # Serimon Core Library
//!
//! Core functionality for the Serimon serial terminal.
//!
//! This library provides:
//! - Serial port enumeration and lifecycle management
//! - ASCII and hex framing of the raw wire byte stream
//! - A cancellable background receive loop with bounded display retention
//! - A connection state machine serializing connect/disconnect/send
//!
//! The UI is an external collaborator: it implements [`sink::Sink`] (or
//! consumes [`sink::ChannelSink`] events on its own thread) and drives a
//! [`controller::ConnectionController`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use serimon_core::prelude::*;
//! use std::sync::Arc;
//!
//! let (tx, rx) = std::sync::mpsc::channel();
//! let sink = Arc::new(ChannelSink::new(tx));
//!
//! let mut config = ConnectionConfig::default();
//! config.port_name = "/dev/ttyUSB0".into();
//!
//! let mut controller = ConnectionController::new(config, sink);
//! controller.connect()?;
//! controller.send("hello")?;
//! // drain `rx` for display events, then:
//! controller.disconnect();
//! ```

#![warn(missing_docs)]

use std::time::Duration;

pub mod codec;
pub mod controller;
pub mod error;
pub mod receive;
pub mod serial;
pub mod sink;

#[cfg(test)]
pub(crate) mod testing;

/// Default baud rate for new connections
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Largest number of bytes pulled from the device per poll iteration
pub const READ_CHUNK_SIZE: usize = 256;

/// Idle sleep between polls when the device has nothing pending.
/// Cancellation latency of the receive loop is bounded by this interval.
pub const POLL_INTERVAL: Duration = Duration::from_micros(500);

/// Rendered bytes emitted to the sink before display history is cleared
pub const RETENTION_LIMIT: u64 = 1_000_000;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::codec::{
        decode_ascii, decode_hex, encode_ascii, encode_hex, LineEnding, Mode,
    };
    pub use crate::controller::{ConnectionConfig, ConnectionController, ConnectionState};
    pub use crate::error::TerminalError;
    pub use crate::receive::{InboundChunk, ReceiveLoop};
    pub use crate::serial::{list_ports, ByteChannel, Parity, PortHandle, PortInfo};
    pub use crate::sink::{ChannelSink, ChunkStyle, Sink, SinkEvent};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
