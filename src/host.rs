//! # Host Collaborators
//!
//! Collaborators for running the bridge on a Linux host: a UDP relay on
//! real sockets, plus headless stand-ins for the graphics and VM
//! subsystems that log what the controller asks of them.

use std::cell::Cell;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::rc::Rc;

use tracing::{debug, info, warn};

use crate::collab::*;
use crate::wire::crc::crc16_block;
use crate::wire::messages::{Credentials, PixelPlanes, UdpHeader, PORT_COUNT};
use crate::wire::protocol::UDP_BUF_LEN;

/// Network counters shared by the relay and the connection manager
pub type SharedCounters = Rc<Cell<NetCounters>>;

fn bump(counters: &SharedCounters, f: impl FnOnce(&mut NetCounters)) {
    let mut c = counters.get();
    f(&mut c);
    counters.set(c);
}

/// UDP relay over non-blocking sockets, one per configured port
pub struct UdpRelay {
    bind_addr: Ipv4Addr,
    sockets: Vec<(u16, UdpSocket)>,
    /// Socket for datagrams whose local port is not bound
    fallback: Option<UdpSocket>,
    pending: Option<(UdpHeader, Vec<u8>)>,
    counters: SharedCounters,
}

impl UdpRelay {
    pub fn new(bind_addr: Ipv4Addr, counters: SharedCounters) -> Self {
        Self {
            bind_addr,
            sockets: Vec::new(),
            fallback: None,
            pending: None,
            counters,
        }
    }

    /// Ports currently bound
    pub fn bound_ports(&self) -> Vec<u16> {
        self.sockets.iter().map(|(port, _)| *port).collect()
    }

    fn bind(&self, port: u16) -> io::Result<UdpSocket> {
        let socket = UdpSocket::bind((self.bind_addr, port))?;
        socket.set_nonblocking(true)?;
        Ok(socket)
    }

    fn socket_for(&mut self, lport: u16) -> io::Result<&UdpSocket> {
        if let Some(index) = self.sockets.iter().position(|(port, _)| *port == lport) {
            return Ok(&self.sockets[index].1);
        }

        if self.fallback.is_none() {
            self.fallback = Some(self.bind(0)?);
        }
        match &self.fallback {
            Some(socket) => Ok(socket),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "No socket available")),
        }
    }

    /// Take the first datagram waiting on any bound socket
    fn receive(&mut self) -> Option<(UdpHeader, Vec<u8>)> {
        let mut buf = [0u8; UDP_BUF_LEN];

        for (port, socket) in &self.sockets {
            match socket.recv_from(&mut buf) {
                Ok((len, SocketAddr::V4(src))) => {
                    let data = buf[..len].to_vec();
                    let header = UdpHeader {
                        lport: *port,
                        rport: src.port(),
                        addr: *src.ip(),
                        len: len as u16,
                        crc: crc16_block(&data),
                    };
                    return Some((header, data));
                }
                Ok((_, src)) => debug!("Ignoring datagram from {}", src),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => warn!("UDP receive on port {} failed: {}", port, e),
            }
        }

        None
    }
}

impl NetworkRelay for UdpRelay {
    fn set_ports(&mut self, ports: [u16; PORT_COUNT]) {
        self.sockets.clear();

        for port in ports {
            if port == 0 || self.sockets.iter().any(|(p, _)| *p == port) {
                continue;
            }
            match self.bind(port) {
                Ok(socket) => {
                    info!("Listening for UDP on {}:{}", self.bind_addr, port);
                    self.sockets.push((port, socket));
                }
                Err(e) => warn!("Failed to bind UDP port {}: {}", port, e),
            }
        }
    }

    fn send(&mut self, header: &UdpHeader, payload: &[u8]) {
        let dest = (header.addr, header.rport);
        let result = self.socket_for(header.lport).and_then(|socket| socket.send_to(payload, dest));

        match result {
            Ok(_) => bump(&self.counters, |c| c.udp_sent = c.udp_sent.wrapping_add(1)),
            Err(e) => warn!("Failed to send datagram to {}:{}: {}", header.addr, header.rport, e),
        }
    }

    fn rx_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn rx_header(&self) -> Option<UdpHeader> {
        self.pending.as_ref().map(|(header, _)| *header)
    }

    fn rx_data(&self) -> &[u8] {
        self.pending.as_ref().map(|(_, data)| data.as_slice()).unwrap_or(&[])
    }

    fn rx_clear(&mut self) {
        self.pending = None;
    }

    fn process(&mut self) {
        if self.pending.is_some() {
            return;
        }

        if let Some(datagram) = self.receive() {
            bump(&self.counters, |c| c.udp_received = c.udp_received.wrapping_add(1));
            self.pending = Some(datagram);
        }
    }
}

/// Connection manager for a host that is already on a network
///
/// Join and AP requests are recorded and logged; the host's own network
/// stack stays in charge.
pub struct HostNetwork {
    ip: Ipv4Addr,
    ssid: Option<String>,
    ap_mode: bool,
    counters: SharedCounters,
}

impl HostNetwork {
    pub fn new(ip: Ipv4Addr, counters: SharedCounters) -> Self {
        Self {
            ip,
            ssid: None,
            ap_mode: false,
            counters,
        }
    }

    pub fn ssid(&self) -> Option<&str> {
        self.ssid.as_deref()
    }
}

impl ConnectionManager for HostNetwork {
    fn connect(&mut self, creds: Credentials) {
        info!("Controller requested network '{}'", creds.ssid);
        self.ssid = Some(creds.ssid);
        self.ap_mode = false;
    }

    fn set_ap_mode(&mut self, creds: Credentials) {
        info!("Controller requested access point '{}'", creds.ssid);
        self.ssid = Some(creds.ssid);
        self.ap_mode = true;
    }

    fn scan(&mut self) {
        info!("Controller requested a network scan");
    }

    fn status(&self) -> WifiStatus {
        WifiStatus {
            connected: !self.ap_mode,
            ap_mode: self.ap_mode,
        }
    }

    fn mac(&self) -> [u8; 6] {
        [0; 6]
    }

    fn ip_info(&self) -> IpInfo {
        IpInfo {
            ip: self.ip,
            ..Default::default()
        }
    }

    fn rssi(&self) -> i8 {
        0
    }

    fn counters(&self) -> NetCounters {
        self.counters.get()
    }
}

/// Size of the graphics parameter blob
pub const GFX_PARAMS_LEN: usize = 64;

/// Graphics stand-in: stores parameters, has no pixels
#[derive(Debug, Default)]
pub struct HeadlessGfx {
    params: Vec<u8>,
}

impl HeadlessGfx {
    pub fn params(&self) -> &[u8] {
        &self.params
    }
}

impl Graphics for HeadlessGfx {
    fn params_len(&self) -> usize {
        GFX_PARAMS_LEN
    }

    fn set_params(&mut self, params: &[u8]) {
        debug!("Graphics params updated");
        self.params = params.to_vec();
    }

    fn pix0(&self) -> (u16, u16, u16) {
        (0, 0, 0)
    }

    fn pixel_count(&self) -> u16 {
        0
    }

    fn planes(&self) -> PixelPlanes<'_> {
        PixelPlanes { red: &[], green: &[], blue: &[], dither: &[] }
    }
}

/// VM stand-in: accepts images, never executes them
#[derive(Debug, Default)]
pub struct HeadlessVm {
    image_len: usize,
    running: bool,
    frame_number: u16,
}

impl VmRuntime for HeadlessVm {
    fn reset(&mut self) {
        info!("VM reset");
        self.image_len = 0;
        self.running = false;
    }

    fn load(&mut self, image: &[u8]) {
        self.image_len += image.len();
        debug!("VM image chunk: {} bytes, {} total", image.len(), self.image_len);
    }

    fn run(&mut self) {
        self.running = true;
        self.frame_number = self.frame_number.wrapping_add(1);
    }

    fn run_faders(&mut self) {}

    fn info(&self) -> Vec<u8> {
        let mut info = Vec::with_capacity(5);
        info.push(self.running as u8);
        info.extend_from_slice(&(self.image_len as u32).to_le_bytes());
        info
    }

    fn frame_sync(&self, _index: u8) -> Option<Vec<u8>> {
        None
    }

    fn set_frame_sync(&mut self, record: &[u8]) -> u8 {
        debug!("Frame sync record: {} bytes", record.len());
        0
    }

    fn frame_number(&self) -> u16 {
        self.frame_number
    }
}

/// In-memory key-value store
#[derive(Debug, Default)]
pub struct MemoryKv {
    values: HashMap<u32, i32>,
}

impl MemoryKv {
    pub fn get(&self, hash: u32) -> Option<i32> {
        self.values.get(&hash).copied()
    }
}

impl KvStore for MemoryKv {
    fn apply(&mut self, hash: u32, value: i32) {
        self.values.insert(hash, value);
    }
}

/// Memory figures from procfs, in KiB
#[derive(Debug, Default)]
pub struct ProcMemory;

/// Value of `key` in a procfs "Key:   1234 kB" listing
fn proc_field(listing: &str, key: &str) -> Option<u32> {
    listing
        .lines()
        .find_map(|line| line.strip_prefix(key)?.strip_prefix(':'))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|value| value.parse().ok())
}

impl MemoryMonitor for ProcMemory {
    fn peak_usage(&self) -> u32 {
        fs::read_to_string("/proc/self/status")
            .ok()
            .and_then(|status| proc_field(&status, "VmHWM"))
            .unwrap_or(0)
    }

    fn free_memory(&self) -> u32 {
        fs::read_to_string("/proc/meminfo")
            .ok()
            .and_then(|meminfo| proc_field(&meminfo, "MemAvailable"))
            .unwrap_or(0)
    }
}

/// Status indicator that logs state changes
#[derive(Debug, Default)]
pub struct LogIndicator {
    connectivity: Option<(bool, bool)>,
    fault: bool,
}

impl StatusIndicator for LogIndicator {
    fn set_connectivity(&mut self, connected: bool, ap_mode: bool) {
        if self.connectivity != Some((connected, ap_mode)) {
            info!("Connectivity: connected={} ap_mode={}", connected, ap_mode);
            self.connectivity = Some((connected, ap_mode));
        }
    }

    fn set_fault(&mut self, fault: bool) {
        if fault && !self.fault {
            warn!("Link fault indicator on");
        }
        self.fault = fault;
    }
}

/// Build the host collaborator set
pub fn collaborators(bind_addr: Ipv4Addr) -> Collaborators {
    let counters = SharedCounters::default();

    Collaborators {
        wifi: Box::new(HostNetwork::new(bind_addr, counters.clone())),
        gfx: Box::new(HeadlessGfx::default()),
        vm: Box::new(HeadlessVm::default()),
        kv: Box::new(MemoryKv::default()),
        memory: Box::new(ProcMemory),
        udp: Box::new(UdpRelay::new(bind_addr, counters)),
        indicator: Box::new(LogIndicator::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn free_port() -> u16 {
        UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap().local_addr().unwrap().port()
    }

    #[test]
    fn test_relay_receives_and_sends() {
        let counters = SharedCounters::default();
        let mut relay = UdpRelay::new(Ipv4Addr::LOCALHOST, counters.clone());
        let port = free_port();
        relay.set_ports([port, 0, port, 0]);
        assert_eq!(relay.bound_ports(), vec![port]);

        let peer = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        peer.set_read_timeout(Some(Duration::from_secs(1))).unwrap();
        peer.send_to(b"ping", (Ipv4Addr::LOCALHOST, port)).unwrap();

        for _ in 0..100 {
            relay.process();
            if relay.rx_pending() {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }

        let header = relay.rx_header().unwrap();
        assert_eq!(header.lport, port);
        assert_eq!(header.rport, peer.local_addr().unwrap().port());
        assert_eq!(header.len, 4);
        assert_eq!(header.crc, crc16_block(b"ping"));
        assert_eq!(relay.rx_data(), b"ping");
        assert_eq!(counters.get().udp_received, 1);

        relay.rx_clear();
        assert!(!relay.rx_pending());
        assert!(relay.rx_data().is_empty());

        let reply = UdpHeader { lport: port, rport: header.rport, addr: Ipv4Addr::LOCALHOST, len: 4, crc: 0 };
        relay.send(&reply, b"pong");

        let mut buf = [0u8; 16];
        let (len, src) = peer.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"pong");
        assert_eq!(src.port(), port);
        assert_eq!(counters.get().udp_sent, 1);
    }

    #[test]
    fn test_relay_send_from_unbound_port() {
        let mut relay = UdpRelay::new(Ipv4Addr::LOCALHOST, SharedCounters::default());
        let peer = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        peer.set_read_timeout(Some(Duration::from_secs(1))).unwrap();

        let header = UdpHeader {
            lport: 1,
            rport: peer.local_addr().unwrap().port(),
            addr: Ipv4Addr::LOCALHOST,
            len: 2,
            crc: 0,
        };
        relay.send(&header, b"hi");

        let mut buf = [0u8; 4];
        let (len, _) = peer.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"hi");
    }

    #[test]
    fn test_host_network_modes() {
        let mut net = HostNetwork::new(Ipv4Addr::new(10, 0, 0, 2), SharedCounters::default());
        assert_eq!(net.status(), WifiStatus { connected: true, ap_mode: false });

        net.set_ap_mode(Credentials { ssid: "bridge".to_string(), pass: String::new() });
        assert_eq!(net.status(), WifiStatus { connected: false, ap_mode: true });
        assert_eq!(net.ssid(), Some("bridge"));
        assert_eq!(net.ip_info().ip, Ipv4Addr::new(10, 0, 0, 2));
    }

    #[test]
    fn test_memory_kv_overwrites() {
        let mut kv = MemoryKv::default();
        kv.apply(7, 1);
        kv.apply(7, -3);
        assert_eq!(kv.get(7), Some(-3));
        assert_eq!(kv.get(8), None);
    }

    #[test]
    fn test_headless_vm_info() {
        let mut vm = HeadlessVm::default();
        vm.load(&[0u8; 100]);
        vm.load(&[0u8; 20]);
        vm.run();

        assert_eq!(vm.info(), vec![1, 120, 0, 0, 0]);
        assert_eq!(vm.frame_number(), 1);

        vm.reset();
        assert_eq!(vm.info(), vec![0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_proc_field() {
        let listing = "MemTotal:       16318200 kB\nMemAvailable:    9012345 kB\n";
        assert_eq!(proc_field(listing, "MemAvailable"), Some(9_012_345));
        assert_eq!(proc_field(listing, "MemFree"), None);
    }
}
