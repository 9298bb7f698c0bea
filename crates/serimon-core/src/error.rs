//! Terminal errors

use thiserror::Error;

/// Errors surfaced by the terminal core
///
/// Every variant is also reported to the user-visible sink as
/// notification-styled text; none of them crash the process.
#[derive(Error, Debug)]
pub enum TerminalError {
    /// Opening the device failed: missing, busy, permission denied, or
    /// an invalid baud/parity combination
    #[error("Cannot open {port}: {reason}")]
    PortUnavailable {
        /// Device name that failed to open
        port: String,
        /// Underlying failure as reported by the platform
        reason: String,
    },

    /// The device reported a read error; fatal to the receive loop
    #[error("Serial read failed: {0}")]
    PortReadFailed(String),

    /// The device reported a write error; the session stays connected
    #[error("Serial write failed: {0}")]
    PortWriteFailed(String),

    /// Outbound hex text contained a token that is not a single byte
    #[error("Invalid hex input: {0:?}")]
    HexParse(String),

    /// The operation requires an open connection
    #[error("Not connected")]
    NotConnected,

    /// A connect or disconnect is already in flight
    #[error("Connection state change already in progress")]
    Busy,
}
