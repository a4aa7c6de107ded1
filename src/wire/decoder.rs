//! # Frame Decoder
//!
//! Validates inbound frames against their CRC16.

use super::encoder::frame_crc;
use super::protocol::*;

/// Check a received header + payload pair
///
/// Recomputes the CRC with the transmitted crc field zeroed and compares.
/// A declared length that does not match the payload, or exceeds
/// `MAX_DATA_LEN`, is invalid regardless of CRC.
pub fn validate(header: &FrameHeader, payload: &[u8]) -> bool {
    let len = header.len as usize;
    if len > MAX_DATA_LEN || len != payload.len() {
        return false;
    }

    frame_crc(header, payload) == header.crc
}

/// Decode a frame from its header and payload bytes
///
/// Returns `None` if the frame fails validation.
pub fn decode_frame(header: FrameHeader, payload: &[u8]) -> Option<Frame> {
    if !validate(&header, payload) {
        return None;
    }

    Some(Frame {
        header,
        payload: payload.to_vec(),
    })
}
