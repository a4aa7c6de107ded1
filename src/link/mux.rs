//! # Outbound Multiplexer
//!
//! Strict-priority selection of the one frame sent per poll cycle. The
//! order lives in [`PRIORITY`]; each [`Slot`] pairs a pending predicate
//! with a message builder, so a new message class is one more entry.

use tracing::trace;

use super::queue::Consumer;
use super::stats::{Stage, Statistics};
use super::tunnel::Fragmenter;
use crate::collab::Collaborators;
use crate::wire::messages::*;
use crate::wire::protocol::{DataId, RGB_DATA_N_PIXELS};

/// Outbound message class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Status,
    Info,
    VmInfo,
    FrameSync,
    FrameSyncStatus,
    RgbPix0,
    RgbArray,
    Debug,
    UdpRelay,
    KvBatch,
    DebugPrint,
}

/// Slots from highest to lowest priority
pub const PRIORITY: [Slot; 11] = [
    Slot::Status,
    Slot::Info,
    Slot::VmInfo,
    Slot::FrameSync,
    Slot::FrameSyncStatus,
    Slot::RgbPix0,
    Slot::RgbArray,
    Slot::Debug,
    Slot::UdpRelay,
    Slot::KvBatch,
    Slot::DebugPrint,
];

/// Pending on-demand responses and their cursors
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Requests {
    pub status: bool,
    pub info: bool,
    pub vm_info: bool,
    pub frame_sync: bool,
    pub frame_sync_index: u8,
    /// Status code of the last applied frame-sync command, awaiting reply
    pub frame_sync_status: Option<u8>,
    pub rgb_pix0: bool,
    pub rgb_array: bool,
    pub rgb_index: u16,
    pub debug: bool,
}

/// Read-only link state some messages report
#[derive(Debug, Clone, Copy)]
pub struct LinkSnapshot<'a> {
    pub stats: &'a Statistics,
    pub fault: bool,
}

/// Everything queued for the peer
#[derive(Debug)]
pub struct Outbound {
    pub requests: Requests,
    pub fragmenter: Fragmenter,
    pub batches: Consumer<KvBatch>,
    pub prints: Consumer<Vec<u8>>,
}

impl Outbound {
    pub fn new(batches: Consumer<KvBatch>, prints: Consumer<Vec<u8>>) -> Self {
        Self {
            requests: Requests::default(),
            fragmenter: Fragmenter::new(),
            batches,
            prints,
        }
    }

    /// Re-arm the periodic status, info and VM info responses
    pub fn arm_periodic(&mut self) {
        self.requests.status = true;
        self.requests.info = true;
        self.requests.vm_info = true;
    }

    /// Request the frame-sync sequence from its first record
    pub fn request_frame_sync(&mut self) {
        self.requests.frame_sync_index = 0;
        self.requests.frame_sync = true;
    }

    pub fn is_pending(&self, slot: Slot, collab: &Collaborators) -> bool {
        let r = &self.requests;
        match slot {
            Slot::Status => r.status,
            Slot::Info => r.info,
            Slot::VmInfo => r.vm_info,
            Slot::FrameSync => r.frame_sync,
            Slot::FrameSyncStatus => r.frame_sync_status.is_some(),
            Slot::RgbPix0 => r.rgb_pix0,
            Slot::RgbArray => r.rgb_array,
            Slot::Debug => r.debug,
            Slot::UdpRelay => self.fragmenter.in_progress() || collab.udp.rx_pending(),
            Slot::KvBatch => !self.batches.is_empty(),
            Slot::DebugPrint => !self.prints.is_empty(),
        }
    }

    /// Highest-priority slot with work pending
    pub fn select(&self, collab: &Collaborators) -> Option<Slot> {
        PRIORITY.iter().copied().find(|&slot| self.is_pending(slot, collab))
    }

    /// Build the message for the highest-priority pending slot
    ///
    /// Advances that slot's cursor or clears its request. Returns `None`
    /// when nothing is pending, or the selected slot turned out to have
    /// nothing left to send (it is cleared and the cycle is spent).
    pub fn next_message(&mut self, collab: &mut Collaborators, link: LinkSnapshot<'_>) -> Option<(DataId, Vec<u8>)> {
        let slot = self.select(collab)?;
        trace!("Outbound slot {:?}", slot);
        self.build(slot, collab, link)
    }

    fn build(&mut self, slot: Slot, collab: &mut Collaborators, link: LinkSnapshot<'_>) -> Option<(DataId, Vec<u8>)> {
        let r = &mut self.requests;
        match slot {
            Slot::Status => {
                r.status = false;
                Some((DataId::Status, status_msg(collab, link.fault).to_bytes()))
            }
            Slot::Info => {
                r.info = false;
                Some((DataId::Info, info_msg(collab, link.stats).to_bytes()))
            }
            Slot::VmInfo => {
                r.vm_info = false;
                Some((DataId::VmInfo, collab.vm.info()))
            }
            Slot::FrameSync => match collab.vm.frame_sync(r.frame_sync_index) {
                Some(record) => {
                    r.frame_sync_index = r.frame_sync_index.wrapping_add(1);
                    Some((DataId::VmFrameSync, record))
                }
                None => {
                    r.frame_sync = false;
                    r.frame_sync_index = 0;
                    None
                }
            },
            Slot::FrameSyncStatus => {
                let status = r.frame_sync_status.take()?;
                let msg = FrameSyncStatusMsg {
                    status,
                    frame_number: collab.vm.frame_number(),
                };
                Some((DataId::FrameSyncStatus, msg.to_bytes()))
            }
            Slot::RgbPix0 => {
                r.rgb_pix0 = false;
                let (red, green, blue) = collab.gfx.pix0();
                let msg = RgbPix0Msg { r: red, g: green, b: blue };
                Some((DataId::RgbPix0, msg.to_bytes()))
            }
            Slot::RgbArray => {
                let planes = collab.gfx.planes();
                let pix_count = [planes.red.len(), planes.green.len(), planes.blue.len(), planes.dither.len()]
                    .into_iter()
                    .fold(collab.gfx.pixel_count() as usize, usize::min);

                let index = r.rgb_index as usize;
                if index >= pix_count {
                    r.rgb_index = 0;
                    r.rgb_array = false;
                    return None;
                }

                let count = (pix_count - index).min(RGB_DATA_N_PIXELS);
                let chunk = encode_rgb_chunk(r.rgb_index, count as u8, &planes);

                r.rgb_index += count as u16;
                if r.rgb_index as usize >= pix_count {
                    r.rgb_index = 0;
                    r.rgb_array = false;
                }

                Some((DataId::RgbArray, chunk))
            }
            Slot::Debug => {
                r.debug = false;
                let msg = DebugMsg { free_heap: collab.memory.free_memory() };
                Some((DataId::Debug, msg.to_bytes()))
            }
            Slot::UdpRelay => self.fragmenter.next_message(collab.udp.as_mut()),
            Slot::KvBatch => self.batches.pop().map(|batch| (DataId::KvBatch, batch.to_bytes())),
            Slot::DebugPrint => self.prints.pop().map(|text| (DataId::DebugPrint, text)),
        }
    }
}

fn status_msg(collab: &Collaborators, fault: bool) -> StatusMsg {
    let status = collab.wifi.status();

    let mut flags = 0;
    if status.connected {
        flags |= STATUS_CONNECTED;
    }
    if status.ap_mode {
        flags |= STATUS_AP_MODE;
    }
    if fault {
        flags |= STATUS_FAULT;
    }

    StatusMsg { flags }
}

fn version() -> u16 {
    let part = |s: &str| s.parse::<u16>().unwrap_or(0);
    pack_version(
        part(env!("CARGO_PKG_VERSION_MAJOR")),
        part(env!("CARGO_PKG_VERSION_MINOR")),
        part(env!("CARGO_PKG_VERSION_PATCH")),
    )
}

fn info_msg(collab: &Collaborators, stats: &Statistics) -> InfoMsg {
    let ip = collab.wifi.ip_info();
    let counters = collab.wifi.counters();

    InfoMsg {
        version: version(),
        mac: collab.wifi.mac(),
        ip: ip.ip,
        subnet: ip.subnet,
        gateway: ip.gateway,
        dns: ip.dns,
        rssi: collab.wifi.rssi(),
        rx_udp_fifo_overruns: counters.rx_udp_fifo_overruns,
        rx_udp_port_overruns: counters.rx_udp_port_overruns,
        udp_received: counters.udp_received,
        udp_sent: counters.udp_sent,
        comm_errors: stats.comm_errors(),
        mem_heap_peak: collab.memory.peak_usage().min(u16::MAX as u32) as u16,
        intf_max_time: stats.max_time_us(Stage::Intf),
        vm_max_time: stats.max_time_us(Stage::Vm),
        wifi_max_time: stats.max_time_us(Stage::Wifi),
        mem_max_time: stats.max_time_us(Stage::Mem),
    }
}
