//! # CRC16 Implementation
//!
//! CRC-16/IBM-3740 checksum used for frame headers, payloads and tunneled
//! UDP datagrams.
//!
//! **Polynomial**: 0x1021 (x^16 + x^12 + x^5 + 1)
//! **Initial Value**: 0xFFFF

use crc::{Crc, Digest, CRC_16_IBM_3740};

/// Shared CRC16 engine
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Incremental CRC16 computation over several byte ranges
pub struct Crc16 {
    digest: Digest<'static, u16>,
}

impl Crc16 {
    /// Start a new checksum
    pub fn start() -> Self {
        Self { digest: CRC16.digest() }
    }

    /// Feed another byte range into the checksum
    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.digest.update(data);
        self
    }

    /// Finish and return the checksum
    pub fn finish(self) -> u16 {
        self.digest.finalize()
    }
}

/// Calculate CRC16 of a single contiguous block
///
/// # Examples
///
/// ```
/// use wifi_bridge::wire::crc::crc16_block;
///
/// assert_eq!(crc16_block(b"123456789"), 0x29B1);
/// ```
pub fn crc16_block(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}
