//! # Wire Protocol Constants and Types
//!
//! Core protocol definitions for the main controller <-> co-processor link.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Control byte: peer reset, (re)starts the readiness handshake
pub const COMM_RESET: u8 = 0xE0;

/// Control byte: a frame header follows
pub const COMM_DATA: u8 = 0xE1;

/// Control byte: ask the peer to re-signal readiness
pub const COMM_QUERY_READY: u8 = 0xE2;

/// Leading byte of an unframed diagnostic sequence
pub const DIAG_MARKER: u8 = 0x99;

/// Maximum payload size of a single frame (both directions)
pub const MAX_DATA_LEN: usize = 255;

/// Maximum size of a tunneled UDP datagram
pub const UDP_BUF_LEN: usize = 548;

/// Pixels carried per pixel-array chunk
/// index(2) + count(1) + 4 planes × 63 = 255 bytes
pub const RGB_DATA_N_PIXELS: usize = 63;

/// Entries per key-value batch
pub const KV_BATCH_LEN: usize = 8;

/// Frame header size: data_id(1) + msg_id(1) + length(2) + crc(2)
pub const HEADER_LEN: usize = 6;

/// Message-type tag carried in every frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum DataId {
    Status = 0x01,
    Info = 0x02,
    Connect = 0x03,
    WifiScan = 0x04,
    ApMode = 0x06,
    Ports = 0x07,
    Debug = 0x08,
    GfxParams = 0x09,
    RgbPix0 = 0x0A,
    RgbArray = 0x0B,
    ResetVm = 0x10,
    LoadVm = 0x11,
    VmInfo = 0x12,
    RunVm = 0x13,
    RunFader = 0x14,
    VmFrameSync = 0x15,
    FrameSyncStatus = 0x16,
    RequestFrameSync = 0x17,
    KvBatch = 0x20,
    UdpHeader = 0x30,
    UdpData = 0x31,
    DebugPrint = 0x40,
}

/// Frame header as it appears on the wire
///
/// ```text
/// ┌─────────┬────────┬────────────┬────────────┐
/// │ data_id │ msg_id │ length LE  │ crc16 LE   │
/// │ 1B      │ 1B     │ 2B         │ 2B         │
/// └─────────┴────────┴────────────┴────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameHeader {
    /// Message-type tag
    pub data_id: u8,

    /// Correlation tag, always zero on send
    pub msg_id: u8,

    /// Payload byte count
    pub len: u16,

    /// CRC16 over header (with this field zeroed) and payload
    pub crc: u16,
}

impl FrameHeader {
    /// Serialize the header into its 6-byte wire form
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let len = self.len.to_le_bytes();
        let crc = self.crc.to_le_bytes();
        [self.data_id, self.msg_id, len[0], len[1], crc[0], crc[1]]
    }

    /// Parse a header from its 6-byte wire form
    pub fn from_bytes(bytes: &[u8; HEADER_LEN]) -> Self {
        Self {
            data_id: bytes[0],
            msg_id: bytes[1],
            len: u16::from_le_bytes([bytes[2], bytes[3]]),
            crc: u16::from_le_bytes([bytes[4], bytes[5]]),
        }
    }

    /// Copy of this header with the crc field zeroed, as hashed by the CRC
    pub fn with_zero_crc(&self) -> Self {
        Self { crc: 0, ..*self }
    }
}

/// A complete frame: header plus payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Data id of this frame
    pub fn data_id(&self) -> u8 {
        self.header.data_id
    }
}
