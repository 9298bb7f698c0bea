//! Connection lifecycle
//!
//! Owns the single active port, the receive loop bound to it, and the
//! state machine serializing user connect/disconnect/send actions.
//! There is never more than one port open, and a port only closes after
//! its receive loop has observably stopped.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::codec::{self, LineEnding, Mode};
use crate::error::TerminalError;
use crate::receive::ReceiveLoop;
use crate::serial::{ByteChannel, Parity, PortHandle};
use crate::sink::{ChunkStyle, Sink};
use crate::DEFAULT_BAUD_RATE;

/// Connection parameters, read once per connect
///
/// Immutable snapshot for the session's duration: changing any field
/// requires a disconnect and reconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Device name, e.g. "/dev/ttyUSB0" or "COM3"
    pub port_name: String,
    /// Baud rate; must be positive
    pub baud_rate: u32,
    /// Parity bit configuration
    pub parity: Parity,
    /// Receive decoding / send encoding mode
    pub mode: Mode,
    /// Suffix appended to outbound ASCII-mode text
    pub line_ending: LineEnding,
    /// Prefix inbound chunks with their arrival time
    pub timestamps: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            parity: Parity::None,
            mode: Mode::Ascii,
            line_ending: LineEnding::Lf,
            timestamps: true,
        }
    }
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No port is open
    Disconnected,
    /// A port is being opened
    Connecting,
    /// Port open, receive loop running, sending enabled
    Connected,
    /// The receive loop is being torn down
    Closing,
}

/// State machine governing one serial session
///
/// All commands are serialized through `&mut self`; the only other
/// actor is the receive loop thread this controller starts and joins.
pub struct ConnectionController {
    state: ConnectionState,
    config: ConnectionConfig,
    port: Option<PortHandle>,
    rx_loop: Option<ReceiveLoop>,
    sink: Arc<dyn Sink>,
}

impl ConnectionController {
    /// Create a controller delivering all output to `sink`
    pub fn new(config: ConnectionConfig, sink: Arc<dyn Sink>) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            config,
            port: None,
            rx_loop: None,
            sink,
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The active configuration snapshot
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Replace the configuration; only allowed while disconnected
    pub fn set_config(&mut self, config: ConnectionConfig) -> Result<(), TerminalError> {
        if self.state != ConnectionState::Disconnected {
            return Err(TerminalError::Busy);
        }
        self.config = config;
        Ok(())
    }

    /// Connect when disconnected, disconnect when connected
    ///
    /// Rejected while a transition is already in flight.
    pub fn toggle(&mut self) -> Result<(), TerminalError> {
        match self.state {
            ConnectionState::Disconnected => self.connect(),
            ConnectionState::Connected => {
                self.disconnect();
                Ok(())
            }
            ConnectionState::Connecting | ConnectionState::Closing => Err(TerminalError::Busy),
        }
    }

    /// Open the configured port and start receiving
    ///
    /// On failure the state settles back to Disconnected, the error is
    /// reported on the sink, and nothing else changes.
    pub fn connect(&mut self) -> Result<(), TerminalError> {
        if self.state != ConnectionState::Disconnected {
            return Err(TerminalError::Busy);
        }
        self.state = ConnectionState::Connecting;

        let port = match PortHandle::open(
            &self.config.port_name,
            self.config.baud_rate,
            self.config.parity,
        ) {
            Ok(port) => port,
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                warn!(port = %self.config.port_name, error = %e, "connect failed");
                self.sink.append(
                    &format!("Failed to connect to {}\n", self.config.port_name),
                    ChunkStyle::Notification,
                );
                return Err(e);
            }
        };

        self.attach(port);
        info!(
            port = %self.config.port_name,
            baud_rate = self.config.baud_rate,
            "connected"
        );
        Ok(())
    }

    /// Start a session over an already-open transport
    ///
    /// For byte bridges other than local serial hardware. Follows the
    /// same state transitions as [`connect`](Self::connect).
    pub fn connect_channel(&mut self, channel: Box<dyn ByteChannel>) -> Result<(), TerminalError> {
        if self.state != ConnectionState::Disconnected {
            return Err(TerminalError::Busy);
        }
        self.state = ConnectionState::Connecting;
        self.attach(PortHandle::from_channel(channel));
        Ok(())
    }

    fn attach(&mut self, port: PortHandle) {
        let rx_loop = ReceiveLoop::spawn(
            port.clone(),
            self.sink.clone(),
            self.config.mode,
            self.config.timestamps,
        );
        self.port = Some(port);
        self.rx_loop = Some(rx_loop);
        self.state = ConnectionState::Connected;
    }

    /// Stop receiving and release the device
    ///
    /// The receive loop is joined before the port closes, so a read can
    /// never race the close. Safe to call when the device has already
    /// been physically removed, and a no-op when already disconnected.
    pub fn disconnect(&mut self) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        self.state = ConnectionState::Closing;

        if let Some(rx_loop) = self.rx_loop.take() {
            rx_loop.stop();
        }
        if let Some(port) = self.port.take() {
            port.close();
        }

        self.state = ConnectionState::Disconnected;
        info!("disconnected");
    }

    /// Fold a receive loop that died on its own back to Disconnected
    ///
    /// The loop exits by itself when the device disappears mid-read; the
    /// port is released here and a fresh connect is required afterwards.
    /// Hosts call this periodically or before acting on user input.
    pub fn settle(&mut self) {
        let loop_dead = self
            .rx_loop
            .as_ref()
            .map(|rx_loop| rx_loop.is_finished())
            .unwrap_or(false);
        if self.state == ConnectionState::Connected && loop_dead {
            debug!("receive loop ended on its own, settling to disconnected");
            self.disconnect();
        }
    }

    /// Encode and transmit user input per the configured mode
    ///
    /// Rejected unless connected. Invalid hex never reaches the port. A
    /// write failure is reported once but leaves the session connected,
    /// since a later attempt surfaces the same fault.
    pub fn send(&mut self, text: &str) -> Result<(), TerminalError> {
        if self.state != ConnectionState::Connected {
            return Err(TerminalError::NotConnected);
        }
        if text.is_empty() {
            return Ok(());
        }

        let payload = match self.config.mode {
            Mode::Ascii => codec::encode_ascii(text, self.config.line_ending),
            Mode::Hex => match codec::encode_hex(text) {
                Ok(bytes) => bytes,
                Err(e) => {
                    self.sink
                        .append(&format!("{}\n", e), ChunkStyle::Notification);
                    return Err(e);
                }
            },
        };

        let port = self.port.as_ref().ok_or(TerminalError::NotConnected)?;
        match port.write(&payload) {
            Ok(()) => {
                self.sink.append(&format!("{}\n", text), ChunkStyle::Sent);
                self.sink.maybe_autoscroll();
                debug!(bytes = payload.len(), "sent");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "write failed");
                self.sink
                    .append(&format!("{}\n", e), ChunkStyle::Notification);
                Err(e)
            }
        }
    }
}

impl Drop for ConnectionController {
    fn drop(&mut self) {
        self.disconnect();
    }
}
