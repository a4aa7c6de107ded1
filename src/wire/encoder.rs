//! # Frame Encoder
//!
//! Builds outbound frames: header, CRC16 and wire serialization.

use super::crc::Crc16;
use super::protocol::*;
use crate::error::{BridgeError, Result};

/// Compute the frame CRC over the header (crc field zeroed) and payload
pub fn frame_crc(header: &FrameHeader, payload: &[u8]) -> u16 {
    let mut crc = Crc16::start();
    crc.update(&header.with_zero_crc().to_bytes()).update(payload);
    crc.finish()
}

/// Encode a payload into a frame
///
/// # Arguments
///
/// * `data_id` - Message-type tag
/// * `payload` - Payload data (max 255 bytes)
///
/// # Errors
///
/// Returns `PayloadTooLarge` if payload exceeds `MAX_DATA_LEN`
///
/// # Examples
///
/// ```
/// use wifi_bridge::wire::encoder::encode_frame;
/// use wifi_bridge::wire::protocol::DataId;
///
/// let frame = encode_frame(DataId::Status.into(), &[0x01]).unwrap();
/// assert_eq!(frame.header.len, 1);
/// ```
pub fn encode_frame(data_id: u8, payload: &[u8]) -> Result<Frame> {
    if payload.len() > MAX_DATA_LEN {
        return Err(BridgeError::PayloadTooLarge {
            len: payload.len(),
            max: MAX_DATA_LEN,
        });
    }

    let mut header = FrameHeader {
        data_id,
        msg_id: 0,
        len: payload.len() as u16,
        crc: 0,
    };
    header.crc = frame_crc(&header, payload);

    Ok(Frame {
        header,
        payload: payload.to_vec(),
    })
}

impl Frame {
    /// Serialize for transmission: DATA control byte + header + payload
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + HEADER_LEN + self.payload.len());
        out.push(COMM_DATA);
        out.extend_from_slice(&self.header.to_bytes());
        out.extend_from_slice(&self.payload);
        out
    }
}
