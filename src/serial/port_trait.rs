//! Trait abstraction for serial port operations to enable testing

use std::io;

/// Non-blocking serial port operations used by the link poll loop
pub trait LinkPort {
    /// Number of bytes that can be read without blocking
    fn bytes_available(&mut self) -> usize;

    /// Read exactly `buf.len()` bytes; callers check `bytes_available` first
    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()>;

    /// Read a single byte if one is available
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        if self.bytes_available() == 0 {
            return Ok(None);
        }
        let mut byte = [0u8; 1];
        self.read_exact(&mut byte)?;
        Ok(Some(byte[0]))
    }

    /// Write all data to the port
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Discard everything waiting in the input buffer
    fn flush_input(&mut self) -> io::Result<()>;

    /// Pulse the readiness line towards the peer
    fn strobe_ready(&mut self) -> io::Result<()>;
}
