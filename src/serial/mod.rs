//! # Serial Communication Module
//!
//! Handles the UART to the main controller.
//!
//! This module handles:
//! - Opening the serial port at the configured baud rate
//! - Non-blocking byte access for the link's poll loop
//! - Strobing our ready line (RTS) towards the peer
//! - Watching the peer's ready line (CTS) for falling edges

pub mod port_trait;

use std::io::{self, Read, Write};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_serial::{ClearBuffer, SerialPort};
use tracing::{debug, info, trace, warn};

use crate::error::{BridgeError, Result};
use crate::link::ready::ReadyLine;
use port_trait::LinkPort;

/// Default device paths to try (in order of preference)
pub const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyUSB0", // USB-to-serial adapters
    "/dev/ttyAMA0", // On-board UART
];

/// Read timeout; the link only reads bytes already buffered
const READ_TIMEOUT: Duration = Duration::from_millis(10);

/// Serial link to the main controller
pub struct LinkSerial {
    port: Box<dyn SerialPort>,
    device_path: String,
}

impl std::fmt::Debug for LinkSerial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkSerial")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl LinkSerial {
    /// Open the first device in `paths` that accepts the settings
    ///
    /// # Errors
    ///
    /// Returns `SerialPortNotFound` listing every path tried if none opens.
    pub fn open_with_paths(paths: &[&str], baud_rate: u32) -> Result<Self> {
        for path in paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(port) => {
                    info!("Opened link serial port at {} ({} baud)", path, baud_rate);
                    return Ok(Self {
                        port,
                        device_path: path.to_string(),
                    });
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(BridgeError::SerialPortNotFound(paths.join(", ")))
    }

    /// Open a specific serial port, 8N1 without flow control
    ///
    /// The handshake lines are driven by hand, so hardware flow control
    /// stays off.
    fn open_port(path: &str, baud_rate: u32) -> Result<Box<dyn SerialPort>> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| BridgeError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(port)
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Spawn a task sampling CTS every `period`; each falling edge signals
    /// the readiness flag.
    ///
    /// # Errors
    ///
    /// Returns `Serial` if the port handle cannot be cloned.
    pub fn spawn_ready_watcher(&self, line: ReadyLine, period: Duration) -> Result<JoinHandle<()>> {
        let mut port = self
            .port
            .try_clone()
            .map_err(|e| BridgeError::Serial(format!("Failed to clone {}: {}", self.device_path, e)))?;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut edges = EdgeDetector::default();

            loop {
                ticker.tick().await;
                match port.read_clear_to_send() {
                    Ok(level) => {
                        if edges.falling(level) {
                            trace!("Ready edge from peer");
                            line.signal();
                        }
                    }
                    Err(e) => {
                        warn!("Failed to read ready line: {}", e);
                    }
                }
            }
        });

        Ok(handle)
    }
}

/// Falling-edge detector over sampled line levels
#[derive(Debug, Default, Clone, Copy)]
pub struct EdgeDetector {
    last: Option<bool>,
}

impl EdgeDetector {
    /// Feed one sample; true on a high-to-low transition
    pub fn falling(&mut self, level: bool) -> bool {
        let edge = self.last == Some(true) && !level;
        self.last = Some(level);
        edge
    }
}

impl LinkPort for LinkSerial {
    fn bytes_available(&mut self) -> usize {
        match self.port.bytes_to_read() {
            Ok(n) => n as usize,
            Err(e) => {
                trace!("bytes_to_read failed: {}", e);
                0
            }
        }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        Read::read_exact(&mut self.port, buf)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        Write::write_all(&mut self.port, data)?;
        Write::flush(&mut self.port)
    }

    fn flush_input(&mut self) -> io::Result<()> {
        self.port.clear(ClearBuffer::Input).map_err(io::Error::from)
    }

    fn strobe_ready(&mut self) -> io::Result<()> {
        self.port.write_request_to_send(true).map_err(io::Error::from)?;
        self.port.write_request_to_send(false).map_err(io::Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_path_order() {
        assert_eq!(DEFAULT_DEVICE_PATHS.len(), 2);
        assert_eq!(DEFAULT_DEVICE_PATHS[0], "/dev/ttyUSB0");
        assert_eq!(DEFAULT_DEVICE_PATHS[1], "/dev/ttyAMA0");
    }

    #[test]
    fn test_open_with_invalid_paths_returns_error() {
        let invalid_paths = &["/dev/nonexistent0", "/dev/nonexistent1"];
        let result = LinkSerial::open_with_paths(invalid_paths, 115_200);

        match result {
            Err(BridgeError::SerialPortNotFound(msg)) => {
                assert!(msg.contains("/dev/nonexistent0"));
                assert!(msg.contains("/dev/nonexistent1"));
            }
            other => panic!("Expected SerialPortNotFound error, got: {:?}", other),
        }
    }

    #[test]
    fn test_open_with_empty_paths_returns_error() {
        let empty_paths: &[&str] = &[];
        let result = LinkSerial::open_with_paths(empty_paths, 115_200);
        assert!(matches!(result, Err(BridgeError::SerialPortNotFound(_))));
    }

    #[test]
    fn test_open_port_with_invalid_path_returns_error() {
        let result = LinkSerial::open_port("/dev/nonexistent_serial_device_12345", 115_200);

        match result {
            Err(BridgeError::Serial(msg)) => {
                assert!(msg.contains("/dev/nonexistent_serial_device_12345"));
                assert!(msg.contains("Failed to open"));
            }
            Err(other) => panic!("Expected Serial error, got: {:?}", other),
            Ok(_) => panic!("Expected Serial error, port opened"),
        }
    }

    #[test]
    fn test_edge_detector_falling_only() {
        let mut edges = EdgeDetector::default();
        // First sample establishes the level
        assert!(!edges.falling(false));
        assert!(!edges.falling(true));
        assert!(!edges.falling(true));
        assert!(edges.falling(false));
        assert!(!edges.falling(false));
        assert!(!edges.falling(true));
        assert!(edges.falling(false));
    }

    #[test]
    fn test_edge_detector_ignores_initial_low() {
        let mut edges = EdgeDetector::default();
        assert!(!edges.falling(false));
    }

    // Only runs with hardware attached
    #[test]
    #[ignore] // Run with: cargo test -- --ignored
    fn test_open_with_real_hardware() {
        match LinkSerial::open_with_paths(DEFAULT_DEVICE_PATHS, 115_200) {
            Ok(serial) => println!("Opened link serial at: {}", serial.device_path()),
            Err(e) => println!("No link hardware detected: {}", e),
        }
    }
}
