//! Wire framing
//!
//! Stateless conversion between the raw serial byte stream and the
//! application-level representations: lossy UTF-8 text in ASCII mode,
//! space-separated uppercase byte pairs in hex mode. No framing beyond
//! the optional line-ending suffix is imposed on the wire.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::TerminalError;

/// Receive decoding / send encoding mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Mode {
    /// Raw text; inbound bytes are lossy UTF-8 decoded
    #[default]
    Ascii,
    /// Space-separated uppercase hex pairs in both directions
    Hex,
}

/// Suffix appended to outbound ASCII-mode text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LineEnding {
    /// No suffix
    None,
    /// Line feed ("\n")
    #[default]
    Lf,
    /// Carriage return ("\r")
    Cr,
    /// Carriage return + line feed ("\r\n")
    CrLf,
}

impl LineEnding {
    /// The raw suffix this ending appends
    pub fn suffix(self) -> &'static str {
        match self {
            LineEnding::None => "",
            LineEnding::Lf => "\n",
            LineEnding::Cr => "\r",
            LineEnding::CrLf => "\r\n",
        }
    }
}

/// Decode inbound bytes as text, replacing invalid UTF-8 sequences
///
/// Never fails: malformed input renders as U+FFFD.
pub fn decode_ascii(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Render inbound bytes as uppercase hex pairs
///
/// Each byte becomes two uppercase hex digits, pairs separated by a
/// single space, with one newline prefixed before the block.
pub fn decode_hex(bytes: &[u8]) -> String {
    let body = bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<String>>()
        .join(" ");
    format!("\n{}", body)
}

/// Encode outbound text as UTF-8 with the line ending appended
pub fn encode_ascii(text: &str, ending: LineEnding) -> Vec<u8> {
    let suffix = ending.suffix();
    let mut bytes = Vec::with_capacity(text.len() + suffix.len());
    bytes.extend_from_slice(text.as_bytes());
    bytes.extend_from_slice(suffix.as_bytes());
    bytes
}

/// Parse outbound hex text into raw bytes
///
/// `text` splits on whitespace into tokens of one or two hex digits
/// each; a single digit is left-padded to one byte. Any token that is
/// not valid hex or is longer than two digits fails the whole call, so
/// the caller must send nothing on error.
pub fn encode_hex(text: &str) -> Result<Vec<u8>, TerminalError> {
    let mut bytes = Vec::new();
    for token in text.split_whitespace() {
        // from_str_radix tolerates a leading '+'; only bare hex digits count
        if token.len() > 2 || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(TerminalError::HexParse(token.to_string()));
        }
        let value = u8::from_str_radix(token, 16)
            .map_err(|_| TerminalError::HexParse(token.to_string()))?;
        bytes.push(value);
    }
    Ok(bytes)
}

/// Format an arrival time as `HH:MM:SS.mmm`
pub fn format_timestamp(t: DateTime<Local>) -> String {
    t.format("%H:%M:%S%.3f").to_string()
}
