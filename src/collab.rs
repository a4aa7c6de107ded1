//! # External Collaborators
//!
//! Interfaces to the subsystems the link talks to. The link only knows
//! their data-exchange contracts, never their internals.

use std::net::Ipv4Addr;

use crate::wire::messages::{Credentials, PixelPlanes, UdpHeader, PORT_COUNT};

/// Connectivity snapshot reported by the connection manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WifiStatus {
    pub connected: bool,
    pub ap_mode: bool,
}

/// Addresses of the current network attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpInfo {
    pub ip: Ipv4Addr,
    pub subnet: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub dns: Ipv4Addr,
}

impl Default for IpInfo {
    fn default() -> Self {
        Self {
            ip: Ipv4Addr::UNSPECIFIED,
            subnet: Ipv4Addr::UNSPECIFIED,
            gateway: Ipv4Addr::UNSPECIFIED,
            dns: Ipv4Addr::UNSPECIFIED,
        }
    }
}

/// Cumulative network counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetCounters {
    pub rx_udp_fifo_overruns: u32,
    pub rx_udp_port_overruns: u32,
    pub udp_received: u32,
    pub udp_sent: u32,
}

/// WiFi association and management
pub trait ConnectionManager {
    /// Join a network as a station
    fn connect(&mut self, creds: Credentials);

    /// Start an access point
    fn set_ap_mode(&mut self, creds: Credentials);

    /// Kick off a network scan
    fn scan(&mut self);

    fn status(&self) -> WifiStatus;
    fn mac(&self) -> [u8; 6];
    fn ip_info(&self) -> IpInfo;
    fn rssi(&self) -> i8;
    fn counters(&self) -> NetCounters;
}

/// Graphics / pixel subsystem
pub trait Graphics {
    /// Size of the parameters blob this subsystem accepts
    fn params_len(&self) -> usize;
    fn set_params(&mut self, params: &[u8]);

    /// Color of the first pixel (r, g, b)
    fn pix0(&self) -> (u16, u16, u16);
    fn pixel_count(&self) -> u16;
    fn planes(&self) -> PixelPlanes<'_>;
}

/// Bytecode VM runtime
pub trait VmRuntime {
    fn reset(&mut self);
    fn load(&mut self, image: &[u8]);
    fn run(&mut self);
    fn run_faders(&mut self);

    /// Opaque runtime info record
    fn info(&self) -> Vec<u8>;

    /// Frame-sync record at `index`, or `None` past the last one
    fn frame_sync(&self, index: u8) -> Option<Vec<u8>>;

    /// Apply a frame-sync record, returning a status code
    fn set_frame_sync(&mut self, record: &[u8]) -> u8;

    fn frame_number(&self) -> u16;
}

/// Key-value database
pub trait KvStore {
    fn apply(&mut self, hash: u32, value: i32);
}

/// Memory usage reporting
pub trait MemoryMonitor {
    fn peak_usage(&self) -> u32;
    fn free_memory(&self) -> u32;
}

/// UDP network relay on the far side of the tunnel
pub trait NetworkRelay {
    /// Set the local ports to listen on
    fn set_ports(&mut self, ports: [u16; PORT_COUNT]);

    /// Send one fully reassembled datagram to the network
    fn send(&mut self, header: &UdpHeader, payload: &[u8]);

    /// Is a received datagram waiting to be relayed to the peer?
    fn rx_pending(&self) -> bool;

    /// Header of the pending received datagram
    fn rx_header(&self) -> Option<UdpHeader>;

    /// Payload of the pending received datagram
    fn rx_data(&self) -> &[u8];

    /// Drop the pending datagram and advance to the next one
    fn rx_clear(&mut self);

    /// Service the network side between link polls
    fn process(&mut self) {}
}

/// Status indicator (LED)
#[cfg_attr(test, mockall::automock)]
pub trait StatusIndicator {
    fn set_connectivity(&mut self, connected: bool, ap_mode: bool);
    fn set_fault(&mut self, fault: bool);
}

/// Everything the link needs from the rest of the system
pub struct Collaborators {
    pub wifi: Box<dyn ConnectionManager>,
    pub gfx: Box<dyn Graphics>,
    pub vm: Box<dyn VmRuntime>,
    pub kv: Box<dyn KvStore>,
    pub memory: Box<dyn MemoryMonitor>,
    pub udp: Box<dyn NetworkRelay>,
    pub indicator: Box<dyn StatusIndicator>,
}

#[cfg(test)]
pub mod fakes {
    //! In-memory collaborators for link tests. Shared state sits behind
    //! `Rc<RefCell<..>>` so tests can inspect it after handing the boxes over.

    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Calls recorded by the fakes, in order
    #[derive(Debug, Default)]
    pub struct Journal {
        pub calls: Vec<String>,
        pub kv: Vec<(u32, i32)>,
        pub sent_udp: Vec<(UdpHeader, Vec<u8>)>,
        pub ports: Option<[u16; PORT_COUNT]>,
        pub faults: Vec<bool>,
    }

    pub type Shared = Rc<RefCell<Journal>>;

    pub struct FakeWifi {
        pub journal: Shared,
        pub status: WifiStatus,
    }

    impl ConnectionManager for FakeWifi {
        fn connect(&mut self, creds: Credentials) {
            self.journal.borrow_mut().calls.push(format!("connect:{}:{}", creds.ssid, creds.pass));
        }
        fn set_ap_mode(&mut self, creds: Credentials) {
            self.journal.borrow_mut().calls.push(format!("ap:{}", creds.ssid));
        }
        fn scan(&mut self) {
            self.journal.borrow_mut().calls.push("scan".to_string());
        }
        fn status(&self) -> WifiStatus {
            self.status
        }
        fn mac(&self) -> [u8; 6] {
            [0x02, 0, 0, 0, 0, 0x01]
        }
        fn ip_info(&self) -> IpInfo {
            IpInfo { ip: Ipv4Addr::new(192, 168, 4, 1), ..Default::default() }
        }
        fn rssi(&self) -> i8 {
            -55
        }
        fn counters(&self) -> NetCounters {
            NetCounters { udp_received: 3, udp_sent: 4, ..Default::default() }
        }
    }

    pub struct FakeGfx {
        pub journal: Shared,
        pub red: Vec<u8>,
        pub green: Vec<u8>,
        pub blue: Vec<u8>,
        pub dither: Vec<u8>,
    }

    impl FakeGfx {
        pub fn with_pixels(journal: Shared, count: usize) -> Self {
            Self {
                journal,
                red: (0..count).map(|i| i as u8).collect(),
                green: (0..count).map(|i| (i + 1) as u8).collect(),
                blue: (0..count).map(|i| (i + 2) as u8).collect(),
                dither: (0..count).map(|i| (i + 3) as u8).collect(),
            }
        }
    }

    impl Graphics for FakeGfx {
        fn params_len(&self) -> usize {
            16
        }
        fn set_params(&mut self, params: &[u8]) {
            self.journal.borrow_mut().calls.push(format!("gfx_params:{}", params.len()));
        }
        fn pix0(&self) -> (u16, u16, u16) {
            (100, 200, 300)
        }
        fn pixel_count(&self) -> u16 {
            self.red.len() as u16
        }
        fn planes(&self) -> PixelPlanes<'_> {
            PixelPlanes { red: &self.red, green: &self.green, blue: &self.blue, dither: &self.dither }
        }
    }

    pub struct FakeVm {
        pub journal: Shared,
        pub frame_syncs: Vec<Vec<u8>>,
    }

    impl VmRuntime for FakeVm {
        fn reset(&mut self) {
            self.journal.borrow_mut().calls.push("vm_reset".to_string());
        }
        fn load(&mut self, image: &[u8]) {
            self.journal.borrow_mut().calls.push(format!("vm_load:{}", image.len()));
        }
        fn run(&mut self) {
            self.journal.borrow_mut().calls.push("vm_run".to_string());
        }
        fn run_faders(&mut self) {
            self.journal.borrow_mut().calls.push("vm_faders".to_string());
        }
        fn info(&self) -> Vec<u8> {
            vec![0xAB, 0xCD]
        }
        fn frame_sync(&self, index: u8) -> Option<Vec<u8>> {
            self.frame_syncs.get(index as usize).cloned()
        }
        fn set_frame_sync(&mut self, record: &[u8]) -> u8 {
            self.journal.borrow_mut().calls.push(format!("frame_sync:{}", record.len()));
            7
        }
        fn frame_number(&self) -> u16 {
            42
        }
    }

    pub struct FakeKv {
        pub journal: Shared,
    }

    impl KvStore for FakeKv {
        fn apply(&mut self, hash: u32, value: i32) {
            self.journal.borrow_mut().kv.push((hash, value));
        }
    }

    pub struct FakeMemory;

    impl MemoryMonitor for FakeMemory {
        fn peak_usage(&self) -> u32 {
            1234
        }
        fn free_memory(&self) -> u32 {
            40_000
        }
    }

    pub struct FakeRelay {
        pub journal: Shared,
        pub pending: Vec<(UdpHeader, Vec<u8>)>,
    }

    impl NetworkRelay for FakeRelay {
        fn set_ports(&mut self, ports: [u16; PORT_COUNT]) {
            self.journal.borrow_mut().ports = Some(ports);
        }
        fn send(&mut self, header: &UdpHeader, payload: &[u8]) {
            self.journal.borrow_mut().sent_udp.push((*header, payload.to_vec()));
        }
        fn rx_pending(&self) -> bool {
            !self.pending.is_empty()
        }
        fn rx_header(&self) -> Option<UdpHeader> {
            self.pending.first().map(|(h, _)| *h)
        }
        fn rx_data(&self) -> &[u8] {
            self.pending.first().map(|(_, d)| d.as_slice()).unwrap_or(&[])
        }
        fn rx_clear(&mut self) {
            if !self.pending.is_empty() {
                self.pending.remove(0);
            }
        }
    }

    pub struct FakeIndicator {
        pub journal: Shared,
    }

    impl StatusIndicator for FakeIndicator {
        fn set_connectivity(&mut self, _connected: bool, _ap_mode: bool) {}
        fn set_fault(&mut self, fault: bool) {
            self.journal.borrow_mut().faults.push(fault);
        }
    }

    /// Build a full set of fakes sharing one journal
    pub fn collaborators(journal: &Shared) -> Collaborators {
        Collaborators {
            wifi: Box::new(FakeWifi { journal: journal.clone(), status: WifiStatus { connected: true, ap_mode: false } }),
            gfx: Box::new(FakeGfx::with_pixels(journal.clone(), 10)),
            vm: Box::new(FakeVm { journal: journal.clone(), frame_syncs: vec![] }),
            kv: Box::new(FakeKv { journal: journal.clone() }),
            memory: Box::new(FakeMemory),
            udp: Box::new(FakeRelay { journal: journal.clone(), pending: vec![] }),
            indicator: Box::new(FakeIndicator { journal: journal.clone() }),
        }
    }
}
