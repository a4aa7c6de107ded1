//! # Wire Protocol Module
//!
//! Framing used on the serial link to the main controller.
//!
//! This module handles:
//! - Control bytes and data-id enumeration
//! - Frame header encoding and CRC16 validation
//! - Fixed-shape message payloads

pub mod protocol;
pub mod encoder;
pub mod decoder;
pub mod crc;
pub mod messages;
