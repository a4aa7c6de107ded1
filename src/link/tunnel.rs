//! # UDP Tunnel
//!
//! Carries UDP datagrams across the serial link as a header message
//! followed by data chunks.
//!
//! Inbound datagrams are reassembled and CRC-checked as a whole before they
//! reach the network relay. Outbound datagrams are cut into frame-sized
//! chunks, one per outbound slot.

use thiserror::Error;
use tracing::{debug, trace};

use crate::collab::NetworkRelay;
use crate::wire::crc::crc16_block;
use crate::wire::messages::UdpHeader;
use crate::wire::protocol::{DataId, DIAG_MARKER, MAX_DATA_LEN, UDP_BUF_LEN};

/// Reassembly failure, reported to the peer as a diagnostic sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TunnelFault {
    #[error("malformed UDP header")]
    BadHeader,

    #[error("UDP overflow: {accumulated} bytes buffered, chunk of {chunk}")]
    Overflow { accumulated: u16, chunk: u16 },

    #[error("UDP payload CRC mismatch")]
    CrcMismatch,
}

impl TunnelFault {
    pub fn code(&self) -> u8 {
        match self {
            TunnelFault::BadHeader => 0x01,
            TunnelFault::Overflow { .. } => 0x02,
            TunnelFault::CrcMismatch => 0x03,
        }
    }

    /// Unframed byte sequence sent to the peer: marker, code, detail
    pub fn diagnostic(&self) -> Vec<u8> {
        let mut out = vec![DIAG_MARKER, self.code()];
        if let TunnelFault::Overflow { accumulated, chunk } = self {
            out.extend_from_slice(&accumulated.to_be_bytes());
            out.extend_from_slice(&chunk.to_be_bytes());
        }
        out
    }
}

/// Inbound datagram reassembly
#[derive(Debug)]
pub struct Reassembler {
    header: Option<UdpHeader>,
    buf: Vec<u8>,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reassembler {
    pub fn new() -> Self {
        Self {
            header: None,
            buf: Vec::with_capacity(UDP_BUF_LEN),
        }
    }

    /// Bytes accumulated for the current datagram
    pub fn accumulated(&self) -> usize {
        self.buf.len()
    }

    pub fn is_active(&self) -> bool {
        self.header.is_some()
    }

    fn abort(&mut self) {
        self.header = None;
        self.buf.clear();
    }

    /// Start a new datagram, discarding any partial one
    pub fn on_header(&mut self, payload: &[u8]) -> Result<(), TunnelFault> {
        self.abort();

        let header = UdpHeader::from_bytes(payload).ok_or(TunnelFault::BadHeader)?;
        if header.len == 0 || header.len as usize > UDP_BUF_LEN {
            return Err(TunnelFault::BadHeader);
        }

        trace!("UDP header: {}:{} -> {} ({} bytes)", header.addr, header.rport, header.lport, header.len);
        self.header = Some(header);
        Ok(())
    }

    /// Append one data chunk
    ///
    /// Returns the finished datagram once the declared length is reached
    /// and the CRC checks out.
    pub fn on_data(&mut self, chunk: &[u8]) -> Result<Option<(UdpHeader, Vec<u8>)>, TunnelFault> {
        let Some(header) = self.header else {
            debug!("UDP data ({} bytes) without header, dropped", chunk.len());
            return Ok(None);
        };

        let total = self.buf.len() + chunk.len();
        if total > UDP_BUF_LEN || total > header.len as usize {
            let fault = TunnelFault::Overflow {
                accumulated: self.buf.len() as u16,
                chunk: chunk.len() as u16,
            };
            self.abort();
            return Err(fault);
        }

        self.buf.extend_from_slice(chunk);

        if self.buf.len() < header.len as usize {
            return Ok(None);
        }

        if crc16_block(&self.buf) != header.crc {
            self.abort();
            return Err(TunnelFault::CrcMismatch);
        }

        let payload = std::mem::replace(&mut self.buf, Vec::with_capacity(UDP_BUF_LEN));
        self.header = None;
        Ok(Some((header, payload)))
    }
}

/// Outbound datagram fragmentation
#[derive(Debug, Default)]
pub struct Fragmenter {
    header: Option<UdpHeader>,
    index: usize,
}

impl Fragmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Is a datagram partially sent?
    pub fn in_progress(&self) -> bool {
        self.header.is_some()
    }

    fn finish(&mut self, relay: &mut dyn NetworkRelay) {
        self.header = None;
        self.index = 0;
        relay.rx_clear();
    }

    /// Next message for the pending datagram: its header first, then data
    /// chunks of at most `MAX_DATA_LEN` bytes until the declared length is
    /// covered. Returns `None` if there is nothing to send.
    pub fn next_message(&mut self, relay: &mut dyn NetworkRelay) -> Option<(DataId, Vec<u8>)> {
        let Some(header) = self.header else {
            let Some(header) = relay.rx_header() else {
                if relay.rx_pending() {
                    relay.rx_clear();
                }
                return None;
            };

            self.index = 0;
            if header.len == 0 {
                self.finish(relay);
            } else {
                self.header = Some(header);
            }
            return Some((DataId::UdpHeader, header.to_bytes()));
        };

        let data = relay.rx_data();
        let total = (header.len as usize).min(data.len());
        let end = (self.index + MAX_DATA_LEN).min(total);
        let chunk = data[self.index.min(end)..end].to_vec();
        self.index = end;

        if self.index >= total {
            self.finish(relay);
        }

        Some((DataId::UdpData, chunk))
    }
}
