//! # Command Dispatcher
//!
//! Routes validated inbound frames to the collaborator that handles them.
//! Payloads whose length does not fit the shape of their tag are dropped
//! without touching any counter.

use tracing::{debug, trace};

use super::mux::Outbound;
use super::tunnel::{Reassembler, TunnelFault};
use crate::collab::Collaborators;
use crate::wire::messages::{parse_ports, Credentials, KvBatch, PORT_COUNT};
use crate::wire::protocol::DataId;

/// A decoded inbound command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    Connect(Credentials),
    ApMode(Credentials),
    Scan,
    Ports([u16; PORT_COUNT]),
    GfxParams(&'a [u8]),
    ResetVm,
    LoadVm(&'a [u8]),
    RunVm,
    RunFader,
    SetFrameSync(&'a [u8]),
    RequestFrameSync,
    KvBatch(KvBatch),
    UdpHeader(&'a [u8]),
    UdpData(&'a [u8]),
}

impl<'a> Command<'a> {
    /// Decode a frame payload
    ///
    /// Returns `None` for unknown or outbound-only tags and for payloads of
    /// the wrong shape.
    pub fn parse(data_id: u8, payload: &'a [u8], gfx_params_len: usize) -> Option<Self> {
        let id = DataId::try_from(data_id).ok()?;

        let command = match id {
            DataId::Connect => Command::Connect(Credentials::from_bytes(payload)?),
            DataId::ApMode => Command::ApMode(Credentials::from_bytes(payload)?),
            DataId::WifiScan => Command::Scan,
            DataId::Ports => Command::Ports(parse_ports(payload)?),
            DataId::GfxParams if payload.len() == gfx_params_len => Command::GfxParams(payload),
            DataId::ResetVm => Command::ResetVm,
            DataId::LoadVm => Command::LoadVm(payload),
            DataId::RunVm => Command::RunVm,
            DataId::RunFader => Command::RunFader,
            DataId::VmFrameSync => Command::SetFrameSync(payload),
            DataId::RequestFrameSync => Command::RequestFrameSync,
            DataId::KvBatch => Command::KvBatch(KvBatch::from_bytes(payload)?),
            DataId::UdpHeader => Command::UdpHeader(payload),
            DataId::UdpData => Command::UdpData(payload),
            _ => return None,
        };

        Some(command)
    }
}

/// Mutable link state a command may touch
pub struct DispatchTarget<'l> {
    pub collab: &'l mut Collaborators,
    pub outbound: &'l mut Outbound,
    pub tunnel: &'l mut Reassembler,
}

/// Apply one validated frame
///
/// # Errors
///
/// Returns the tunnel fault if UDP reassembly failed; the caller reports it
/// to the peer.
pub fn dispatch(data_id: u8, payload: &[u8], target: DispatchTarget<'_>) -> Result<(), TunnelFault> {
    let Some(command) = Command::parse(data_id, payload, target.collab.gfx.params_len()) else {
        debug!("Dropping frame 0x{:02X} ({} bytes): unexpected tag or shape", data_id, payload.len());
        return Ok(());
    };

    trace!("Dispatching {:?}", command);
    let DispatchTarget { collab, outbound, tunnel } = target;

    match command {
        Command::Connect(creds) => collab.wifi.connect(creds),
        Command::ApMode(creds) => collab.wifi.set_ap_mode(creds),
        Command::Scan => collab.wifi.scan(),
        Command::Ports(ports) => collab.udp.set_ports(ports),
        Command::GfxParams(params) => collab.gfx.set_params(params),
        Command::ResetVm => collab.vm.reset(),
        Command::LoadVm(image) => collab.vm.load(image),
        Command::RunVm => collab.vm.run(),
        Command::RunFader => collab.vm.run_faders(),
        Command::SetFrameSync(record) => {
            let status = collab.vm.set_frame_sync(record);
            outbound.requests.frame_sync_status = Some(status);
        }
        Command::RequestFrameSync => outbound.request_frame_sync(),
        Command::KvBatch(batch) => {
            for entry in &batch.entries {
                collab.kv.apply(entry.hash, entry.value);
            }
        }
        Command::UdpHeader(raw) => tunnel.on_header(raw)?,
        Command::UdpData(chunk) => {
            if let Some((header, datagram)) = tunnel.on_data(chunk)? {
                collab.udp.send(&header, &datagram);
            }
        }
    }

    Ok(())
}
