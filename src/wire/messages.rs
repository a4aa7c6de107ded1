//! # Message Payloads
//!
//! Fixed-shape payloads exchanged inside frames. All integers are
//! little-endian unless noted.

use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, BytesMut};

use super::protocol::*;

/// Status flag: station connected to an access point
pub const STATUS_CONNECTED: u8 = 0x01;

/// Status flag: running as an access point
pub const STATUS_AP_MODE: u8 = 0x02;

/// Status flag: link fault indicator is lit
pub const STATUS_FAULT: u8 = 0x04;

/// SSID / passphrase field width in credential messages
pub const CREDENTIAL_FIELD_LEN: usize = 32;

/// Credential message size (ssid + pass)
pub const CREDENTIALS_LEN: usize = 2 * CREDENTIAL_FIELD_LEN;

/// Number of UDP listen ports
pub const PORT_COUNT: usize = 4;

/// Ports message size
pub const PORTS_LEN: usize = PORT_COUNT * 2;

/// UDP header message size: lport(2) + rport(2) + addr(4) + len(2) + crc(2)
pub const UDP_HEADER_LEN: usize = 12;

/// Key-value batch message size: count(1) + pad(3) + entries
pub const KV_BATCH_SIZE: usize = 4 + KV_BATCH_LEN * 8;

/// Pack a semantic version into the 16-bit wire form (4:5:7 bits)
pub fn pack_version(major: u16, minor: u16, patch: u16) -> u16 {
    ((major & 0x0f) << 12) | ((minor & 0x1f) << 7) | (patch & 0x7f)
}

fn put_ip(buf: &mut BytesMut, addr: Ipv4Addr) {
    // Last octet first on the wire
    buf.put_u32_le(u32::from(addr));
}

/// Link status summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusMsg {
    pub flags: u8,
}

impl StatusMsg {
    pub fn to_bytes(&self) -> Vec<u8> {
        vec![self.flags]
    }
}

/// Full info response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoMsg {
    pub version: u16,
    pub mac: [u8; 6],
    pub ip: Ipv4Addr,
    pub subnet: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub dns: Ipv4Addr,
    pub rssi: i8,
    pub rx_udp_fifo_overruns: u32,
    pub rx_udp_port_overruns: u32,
    pub udp_received: u32,
    pub udp_sent: u32,
    pub comm_errors: u16,
    pub mem_heap_peak: u16,
    pub intf_max_time: u16,
    pub vm_max_time: u16,
    pub wifi_max_time: u16,
    pub mem_max_time: u16,
}

impl Default for InfoMsg {
    fn default() -> Self {
        Self {
            version: 0,
            mac: [0; 6],
            ip: Ipv4Addr::UNSPECIFIED,
            subnet: Ipv4Addr::UNSPECIFIED,
            gateway: Ipv4Addr::UNSPECIFIED,
            dns: Ipv4Addr::UNSPECIFIED,
            rssi: 0,
            rx_udp_fifo_overruns: 0,
            rx_udp_port_overruns: 0,
            udp_received: 0,
            udp_sent: 0,
            comm_errors: 0,
            mem_heap_peak: 0,
            intf_max_time: 0,
            vm_max_time: 0,
            wifi_max_time: 0,
            mem_max_time: 0,
        }
    }
}

impl InfoMsg {
    /// Encoded size of the info message
    pub const LEN: usize = 2 + 6 + 4 * 4 + 1 + 4 * 4 + 6 * 2;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(Self::LEN);
        buf.put_u16_le(self.version);
        buf.put_slice(&self.mac);
        put_ip(&mut buf, self.ip);
        put_ip(&mut buf, self.subnet);
        put_ip(&mut buf, self.gateway);
        put_ip(&mut buf, self.dns);
        buf.put_i8(self.rssi);
        buf.put_u32_le(self.rx_udp_fifo_overruns);
        buf.put_u32_le(self.rx_udp_port_overruns);
        buf.put_u32_le(self.udp_received);
        buf.put_u32_le(self.udp_sent);
        buf.put_u16_le(self.comm_errors);
        buf.put_u16_le(self.mem_heap_peak);
        buf.put_u16_le(self.intf_max_time);
        buf.put_u16_le(self.vm_max_time);
        buf.put_u16_le(self.wifi_max_time);
        buf.put_u16_le(self.mem_max_time);
        buf.to_vec()
    }
}

/// Station or access-point credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub ssid: String,
    pub pass: String,
}

fn nul_padded_str(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

fn put_nul_padded(buf: &mut BytesMut, s: &str) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(CREDENTIAL_FIELD_LEN - 1);
    buf.put_slice(&bytes[..n]);
    buf.put_bytes(0, CREDENTIAL_FIELD_LEN - n);
}

impl Credentials {
    /// Parse a credentials message; `None` unless exactly 64 bytes
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() != CREDENTIALS_LEN {
            return None;
        }

        Some(Self {
            ssid: nul_padded_str(&data[..CREDENTIAL_FIELD_LEN]),
            pass: nul_padded_str(&data[CREDENTIAL_FIELD_LEN..]),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(CREDENTIALS_LEN);
        put_nul_padded(&mut buf, &self.ssid);
        put_nul_padded(&mut buf, &self.pass);
        buf.to_vec()
    }
}

/// UDP listen ports
pub fn parse_ports(data: &[u8]) -> Option<[u16; PORT_COUNT]> {
    if data.len() != PORTS_LEN {
        return None;
    }

    let mut buf = data;
    let mut ports = [0u16; PORT_COUNT];
    for port in ports.iter_mut() {
        *port = buf.get_u16_le();
    }
    Some(ports)
}

/// Reply to an inbound frame-sync command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSyncStatusMsg {
    pub status: u8,
    pub frame_number: u16,
}

impl FrameSyncStatusMsg {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(3);
        buf.put_u8(self.status);
        buf.put_u16_le(self.frame_number);
        buf.to_vec()
    }
}

/// Color of the first pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RgbPix0Msg {
    pub r: u16,
    pub g: u16,
    pub b: u16,
}

impl RgbPix0Msg {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(6);
        buf.put_u16_le(self.r);
        buf.put_u16_le(self.g);
        buf.put_u16_le(self.b);
        buf.to_vec()
    }
}

/// Borrowed view of the four pixel planes
#[derive(Debug, Clone, Copy)]
pub struct PixelPlanes<'a> {
    pub red: &'a [u8],
    pub green: &'a [u8],
    pub blue: &'a [u8],
    pub dither: &'a [u8],
}

/// Encode one pixel-array chunk: `count` pixels starting at `index`
///
/// Planes are concatenated: red, green, blue, dither.
pub fn encode_rgb_chunk(index: u16, count: u8, planes: &PixelPlanes<'_>) -> Vec<u8> {
    let start = index as usize;
    let end = start + count as usize;

    let mut buf = BytesMut::with_capacity(3 + 4 * count as usize);
    buf.put_u16_le(index);
    buf.put_u8(count);
    for plane in [planes.red, planes.green, planes.blue, planes.dither] {
        buf.put_slice(&plane[start..end]);
    }
    buf.to_vec()
}

/// Free-memory snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugMsg {
    pub free_heap: u32,
}

impl DebugMsg {
    pub fn to_bytes(&self) -> Vec<u8> {
        self.free_heap.to_le_bytes().to_vec()
    }
}

/// One key-value entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KvEntry {
    pub hash: u32,
    pub value: i32,
}

/// A batch of up to `KV_BATCH_LEN` key-value entries
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KvBatch {
    pub entries: Vec<KvEntry>,
}

impl KvBatch {
    /// Parse a batch; `None` unless exactly `KV_BATCH_SIZE` bytes with a sane count
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() != KV_BATCH_SIZE {
            return None;
        }

        let mut buf = data;
        let count = buf.get_u8() as usize;
        if count > KV_BATCH_LEN {
            return None;
        }
        buf.advance(3);

        let entries = (0..count)
            .map(|_| KvEntry {
                hash: buf.get_u32_le(),
                value: buf.get_i32_le(),
            })
            .collect();

        Some(Self { entries })
    }

    /// Encode as the full fixed-size message; unused slots are zeroed
    pub fn to_bytes(&self) -> Vec<u8> {
        let count = self.entries.len().min(KV_BATCH_LEN);

        let mut buf = BytesMut::with_capacity(KV_BATCH_SIZE);
        buf.put_u8(count as u8);
        buf.put_bytes(0, 3);
        for entry in &self.entries[..count] {
            buf.put_u32_le(entry.hash);
            buf.put_i32_le(entry.value);
        }
        buf.put_bytes(0, (KV_BATCH_LEN - count) * 8);
        buf.to_vec()
    }
}

/// Header of a tunneled UDP datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHeader {
    /// Local port
    pub lport: u16,
    /// Remote port
    pub rport: u16,
    /// Remote address
    pub addr: Ipv4Addr,
    /// Datagram length
    pub len: u16,
    /// CRC16 of the whole datagram payload
    pub crc: u16,
}

impl UdpHeader {
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() != UDP_HEADER_LEN {
            return None;
        }

        let mut buf = data;
        let lport = buf.get_u16_le();
        let rport = buf.get_u16_le();
        let addr = Ipv4Addr::new(buf.get_u8(), buf.get_u8(), buf.get_u8(), buf.get_u8());
        let len = buf.get_u16_le();
        let crc = buf.get_u16_le();

        Some(Self { lport, rport, addr, len, crc })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(UDP_HEADER_LEN);
        buf.put_u16_le(self.lport);
        buf.put_u16_le(self.rport);
        buf.put_slice(&self.addr.octets());
        buf.put_u16_le(self.len);
        buf.put_u16_le(self.crc);
        buf.to_vec()
    }
}

/// Encode debug text: truncated to fit a frame, NUL terminated
pub fn encode_debug_print(text: &str) -> Vec<u8> {
    let bytes = text.as_bytes();
    let mut n = bytes.len().min(MAX_DATA_LEN - 1);
    while !text.is_char_boundary(n) {
        n -= 1;
    }

    let mut out = Vec::with_capacity(n + 1);
    out.extend_from_slice(&bytes[..n]);
    out.push(0);
    out
}
