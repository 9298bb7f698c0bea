//! Serial port access
//!
//! Port enumeration, the byte-transport seam, and the shared handle that
//! the controller (writes) and the receive loop (reads) both hold onto.

use std::collections::HashMap;
use std::fmt;
#[cfg(target_os = "linux")]
use std::fs;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serialport::{DataBits, FlowControl, SerialPort, SerialPortInfo, SerialPortType, StopBits};
use tracing::debug;

use crate::error::TerminalError;

/// Parity bit configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Parity {
    /// No parity bit
    #[default]
    None,
    /// Parity bit chosen for an odd count of ones
    Odd,
    /// Parity bit chosen for an even count of ones
    Even,
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }
}

/// One entry in a port selection list
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// OS device path or name ("/dev/ttyACM0", "COM4")
    pub name: String,

    /// USB vendor id, when the port sits on a USB adapter
    pub vid: Option<u16>,

    /// USB product id, when the port sits on a USB adapter
    pub pid: Option<u16>,

    /// Adapter manufacturer string, when the device reports one
    pub manufacturer: Option<String>,

    /// Adapter product string, when the device reports one
    pub product: Option<String>,

    /// Adapter serial number, when the device reports one
    pub serial_number: Option<String>,
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (vid, pid, manufacturer, product, serial_number) = match info.port_type {
            SerialPortType::UsbPort(usb_info) => (
                Some(usb_info.vid),
                Some(usb_info.pid),
                usb_info.manufacturer,
                usb_info.product,
                usb_info.serial_number,
            ),
            _ => (None, None, None, None, None),
        };

        Self {
            name: info.port_name,
            vid,
            pid,
            manufacturer,
            product,
            serial_number,
        }
    }
}

/// Ordering key for a selection list: ttyACM devices first, then
/// ttyUSB, each group by numeric suffix, then everything else by name
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    if let Some(rest) = basename.strip_prefix("ttyACM") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (0, num, basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("ttyUSB") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (1, num, basename.to_string());
    }
    (2, 0, basename.to_string())
}

/// Enumerate serial devices in a stable order
///
/// Merges what the serialport API reports with, on Linux, ttyACM/ttyUSB
/// nodes present under /dev that the API missed. Hosts call this on
/// startup and whenever the user refreshes the port list; the core
/// itself never depends on the refresh cadence.
pub fn list_ports() -> Vec<PortInfo> {
    let mut map: HashMap<String, PortInfo> = HashMap::new();
    for info in serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
    {
        let p = PortInfo::from(info);
        map.entry(p.name.clone()).or_insert(p);
    }

    // Some Linux setups hide ports from the enumeration API while the
    // device node still exists; pick those up directly
    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            if let Some(fname) = entry.file_name().to_str() {
                if fname.starts_with("ttyACM") || fname.starts_with("ttyUSB") {
                    let full = format!("/dev/{}", fname);
                    map.entry(full.clone()).or_insert_with(|| PortInfo {
                        name: full,
                        vid: None,
                        pid: None,
                        manufacturer: None,
                        product: None,
                        serial_number: None,
                    });
                }
            }
        }
    }

    let mut v: Vec<PortInfo> = map.into_values().collect();
    v.sort_by_key(|p| port_sort_key(&p.name));
    v
}

/// Byte-stream transport underneath the terminal
///
/// The seam between the terminal core and the device: serial hardware in
/// production, an in-memory double in tests, or any other byte bridge.
pub trait ByteChannel: Send {
    /// Number of bytes readable right now without blocking
    fn bytes_to_read(&mut self) -> io::Result<u32>;

    /// Read into `buf`, returning the number of bytes read
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write the whole of `buf`
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Flush buffered output toward the device
    fn flush(&mut self) -> io::Result<()>;
}

/// Serial port wrapper implementing ByteChannel
struct SerialChannel {
    port: Box<dyn SerialPort>,
}

impl ByteChannel for SerialChannel {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.port
            .bytes_to_read()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.port.write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

/// Shared handle to one open device
///
/// Clones share the same underlying channel: the controller writes
/// through one clone while the receive loop polls another. The channel
/// is never locked across a sleep, so neither side starves the other.
#[derive(Clone)]
pub struct PortHandle {
    channel: Arc<Mutex<Option<Box<dyn ByteChannel>>>>,
}

impl fmt::Debug for PortHandle {
    // The channel itself is an opaque trait object; open/closed is the
    // only state worth printing
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortHandle")
            .field("open", &self.is_open())
            .finish()
    }
}

impl PortHandle {
    /// Open a serial device and wrap it in a shared handle
    ///
    /// Applies 8 data bits, 1 stop bit, no flow control and the given
    /// parity. Fails with [`TerminalError::PortUnavailable`] when the
    /// device is missing, busy, permission-denied, or rejects the
    /// baud/parity combination.
    pub fn open(name: &str, baud_rate: u32, parity: Parity) -> Result<Self, TerminalError> {
        let unavailable = |reason: String| TerminalError::PortUnavailable {
            port: name.to_string(),
            reason,
        };

        if baud_rate == 0 {
            return Err(unavailable("baud rate must be positive".to_string()));
        }

        // Short timeout keeps the rare direct read bounded; the receive
        // loop only reads after bytes_to_read() reports pending data
        let mut port = serialport::new(name, baud_rate)
            .timeout(Duration::from_millis(10))
            .open()
            .map_err(|e| unavailable(e.to_string()))?;

        port.set_data_bits(DataBits::Eight)
            .map_err(|e| unavailable(e.to_string()))?;
        port.set_parity(parity.into())
            .map_err(|e| unavailable(e.to_string()))?;
        port.set_stop_bits(StopBits::One)
            .map_err(|e| unavailable(e.to_string()))?;
        port.set_flow_control(FlowControl::None)
            .map_err(|e| unavailable(e.to_string()))?;

        debug!(port = name, baud_rate, "serial port opened");
        Ok(Self::from_channel(Box::new(SerialChannel { port })))
    }

    /// Wrap an already-open transport in a handle
    ///
    /// For byte bridges other than local serial hardware, and for tests.
    pub fn from_channel(channel: Box<dyn ByteChannel>) -> Self {
        Self {
            channel: Arc::new(Mutex::new(Some(channel))),
        }
    }

    /// Read up to `max` pending bytes without blocking
    ///
    /// Returns an empty buffer immediately when the device has nothing
    /// queued. A timed-out or would-block read also counts as empty; any
    /// other device error is [`TerminalError::PortReadFailed`].
    pub fn read_available(&self, max: usize) -> Result<Vec<u8>, TerminalError> {
        let mut guard = self.lock();
        let channel = guard
            .as_mut()
            .ok_or_else(|| TerminalError::PortReadFailed("port is closed".to_string()))?;

        let available = channel
            .bytes_to_read()
            .map_err(|e| TerminalError::PortReadFailed(e.to_string()))?
            as usize;
        if available == 0 {
            return Ok(Vec::new());
        }

        let mut buf = vec![0u8; available.min(max)];
        match channel.read(&mut buf) {
            // Availability said otherwise, so zero here means the device
            // reached end of stream underneath us
            Ok(0) => Err(TerminalError::PortReadFailed(
                "device reported end of stream".to_string(),
            )),
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(ref e)
                if e.kind() == io::ErrorKind::TimedOut
                    || e.kind() == io::ErrorKind::WouldBlock =>
            {
                Ok(Vec::new())
            }
            Err(e) => Err(TerminalError::PortReadFailed(e.to_string())),
        }
    }

    /// Write bytes to the device
    pub fn write(&self, bytes: &[u8]) -> Result<(), TerminalError> {
        let mut guard = self.lock();
        let channel = guard
            .as_mut()
            .ok_or_else(|| TerminalError::PortWriteFailed("port is closed".to_string()))?;
        channel
            .write_all(bytes)
            .and_then(|_| channel.flush())
            .map_err(|e| TerminalError::PortWriteFailed(e.to_string()))
    }

    /// Close the device; idempotent
    ///
    /// Dropping the channel releases the device so it can be reopened
    /// immediately. Calling this on an already-closed handle is a no-op.
    pub fn close(&self) {
        if self.lock().take().is_some() {
            debug!("serial port closed");
        }
    }

    /// Whether the handle still holds an open channel
    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Box<dyn ByteChannel>>> {
        // A poisoned lock only means another thread panicked mid-I/O;
        // the Option inside is still coherent
        self.channel.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockChannel;

    #[test]
    fn test_list_ports() {
        // Enumeration must succeed on any machine, ports present or not
        let ports = list_ports();
        for port in &ports {
            println!("Found port: {} - {:?}", port.name, port.product);
        }
    }

    #[test]
    fn test_port_sorting() {
        let names = vec![
            "/dev/ttyUSB1",
            "/dev/ttyACM1",
            "/dev/ttyUSB0",
            "/dev/ttyACM0",
            "/dev/someport",
            "/dev/ttyACM10",
        ];
        let mut ports: Vec<PortInfo> = names
            .into_iter()
            .map(|n| PortInfo {
                name: n.to_string(),
                vid: None,
                pid: None,
                manufacturer: None,
                product: None,
                serial_number: None,
            })
            .collect();

        ports.sort_by_key(|p| port_sort_key(&p.name));
        let ordered: Vec<String> = ports.into_iter().map(|p| p.name).collect();

        assert_eq!(
            ordered,
            vec![
                "/dev/ttyACM0",
                "/dev/ttyACM1",
                "/dev/ttyACM10",
                "/dev/ttyUSB0",
                "/dev/ttyUSB1",
                "/dev/someport",
            ]
        );
    }

    #[test]
    fn test_open_rejects_zero_baud() {
        let err = PortHandle::open("/dev/null", 0, Parity::None).unwrap_err();
        assert!(matches!(err, TerminalError::PortUnavailable { .. }));
    }

    #[test]
    fn test_open_missing_device() {
        let err =
            PortHandle::open("/dev/serimon-does-not-exist", 115_200, Parity::None).unwrap_err();
        match err {
            TerminalError::PortUnavailable { port, .. } => {
                assert_eq!(port, "/dev/serimon-does-not-exist");
            }
            other => panic!("expected PortUnavailable, got {:?}", other),
        }
    }

    #[test]
    fn test_handle_debug_reports_open_state() {
        // unwrap_err() and friends format the Ok side on failure, so the
        // handle has to carry a usable Debug rendering
        let handle = PortHandle::from_channel(Box::new(MockChannel::idle()));
        assert_eq!(format!("{:?}", handle), "PortHandle { open: true }");
        handle.close();
        assert_eq!(format!("{:?}", handle), "PortHandle { open: false }");
    }

    #[test]
    fn test_close_is_idempotent() {
        let handle = PortHandle::from_channel(Box::new(MockChannel::idle()));
        assert!(handle.is_open());
        handle.close();
        assert!(!handle.is_open());
        // Second close produces no error and no panic
        handle.close();
        assert!(!handle.is_open());
    }

    #[test]
    fn test_io_after_close_fails_cleanly() {
        let handle = PortHandle::from_channel(Box::new(MockChannel::idle()));
        handle.close();
        assert!(matches!(
            handle.read_available(16),
            Err(TerminalError::PortReadFailed(_))
        ));
        assert!(matches!(
            handle.write(b"x"),
            Err(TerminalError::PortWriteFailed(_))
        ));
    }

    #[test]
    fn test_read_available_empty_when_nothing_pending() {
        let handle = PortHandle::from_channel(Box::new(MockChannel::idle()));
        let bytes = handle.read_available(16).expect("idle read succeeds");
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_read_available_caps_at_max() {
        let mut channel = MockChannel::idle();
        channel.push_read(vec![0xAB; 600]);
        let handle = PortHandle::from_channel(Box::new(channel));

        let first = handle.read_available(256).expect("read succeeds");
        assert_eq!(first.len(), 256);
        let second = handle.read_available(256).expect("read succeeds");
        assert_eq!(second.len(), 256);
        let third = handle.read_available(256).expect("read succeeds");
        assert_eq!(third.len(), 88);
    }

    #[test]
    fn test_clones_share_one_channel() {
        let mut channel = MockChannel::idle();
        let writes = channel.writes_handle();
        channel.push_read(b"pong".to_vec());
        let reader = PortHandle::from_channel(Box::new(channel));
        let writer = reader.clone();

        writer.write(b"ping").expect("write succeeds");
        assert_eq!(writes.lock().expect("writes lock").as_slice(), b"ping");

        let bytes = reader.read_available(16).expect("read succeeds");
        assert_eq!(bytes, b"pong".to_vec());

        writer.close();
        assert!(!reader.is_open());
    }
}
