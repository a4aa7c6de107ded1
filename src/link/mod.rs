//! # Link Module
//!
//! The co-processor side of the serial link to the main controller.
//!
//! This module handles:
//! - Receiving and validating inbound frames
//! - The readiness handshake that gates every outbound frame
//! - Priority-ordered outbound multiplexing, one frame per poll
//! - UDP tunneling in both directions
//!
//! All link state lives in one [`Link`] value driven by [`Link::poll`].

pub mod dispatch;
pub mod mux;
pub mod queue;
pub mod ready;
pub mod rx;
pub mod stats;
pub mod tunnel;

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::collab::Collaborators;
use crate::error::{BridgeError, Result};
use crate::serial::port_trait::LinkPort;
use crate::wire::decoder::decode_frame;
use crate::wire::encoder::encode_frame;
use crate::wire::messages::KvBatch;
use crate::wire::protocol::COMM_QUERY_READY;

use dispatch::{dispatch, DispatchTarget};
use mux::{LinkSnapshot, Outbound};
use queue::{channel, BatchSender, DebugPrinter, InsertAt, Producer};
use ready::{Handshake, ReadyLine};
use rx::{Receiver, RxEvent, RxState};
use stats::{Stage, Statistics};
use tunnel::{Reassembler, TunnelFault};

/// Default partial-frame timeout
pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_millis(20);

/// Default time without a ready signal before querying the peer
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_millis(50);

/// Default period of the status / info / VM info responses
pub const DEFAULT_STATUS_INTERVAL: Duration = Duration::from_secs(1);

/// Link timing parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTimings {
    pub frame_timeout: Duration,
    pub ready_timeout: Duration,
    pub status_interval: Duration,
}

impl Default for LinkTimings {
    fn default() -> Self {
        Self {
            frame_timeout: DEFAULT_FRAME_TIMEOUT,
            ready_timeout: DEFAULT_READY_TIMEOUT,
            status_interval: DEFAULT_STATUS_INTERVAL,
        }
    }
}

/// Link context: owns the port, every buffer and every counter
pub struct Link<P: LinkPort> {
    port: P,
    collab: Collaborators,
    receiver: Receiver,
    handshake: Handshake,
    outbound: Outbound,
    tunnel: Reassembler,
    stats: Statistics,
    connected: bool,
    fault: bool,
    status_interval: Duration,
    last_status: Instant,
    batch_tx: BatchSender,
    print_tx: Producer<Vec<u8>>,
}

impl<P: LinkPort> Link<P> {
    /// Create a link; `now` starts the status and handshake clocks
    pub fn new(port: P, collab: Collaborators, timings: LinkTimings, now: Instant) -> Self {
        let (batch_tx, batch_rx) = channel::<KvBatch>(InsertAt::Tail);
        let (print_tx, print_rx) = channel::<Vec<u8>>(InsertAt::Head);

        let mut outbound = Outbound::new(batch_rx, print_rx);
        // One free-memory report once the peer is ready
        outbound.requests.debug = true;

        Self {
            port,
            collab,
            receiver: Receiver::new(timings.frame_timeout),
            handshake: Handshake::new(ReadyLine::new(), now, timings.ready_timeout),
            outbound,
            tunnel: Reassembler::new(),
            stats: Statistics::new(),
            connected: false,
            fault: false,
            status_interval: timings.status_interval,
            last_status: now,
            batch_tx,
            print_tx,
        }
    }

    /// Handle for the ready-line edge source
    pub fn ready_line(&self) -> ReadyLine {
        self.handshake.line().clone()
    }

    /// Producer handle for broadcast key-value batches
    pub fn batch_sender(&self) -> BatchSender {
        self.batch_tx.clone()
    }

    /// Producer handle for debug prints
    pub fn debug_printer(&self) -> DebugPrinter {
        DebugPrinter::new(self.print_tx.clone())
    }

    pub fn stats(&self) -> &Statistics {
        &self.stats
    }

    /// For other subsystems to record their processing times
    pub fn stats_mut(&mut self) -> &mut Statistics {
        &mut self.stats
    }

    /// Has the peer sent its first RESET?
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Has a tunnel fault been raised?
    pub fn has_fault(&self) -> bool {
        self.fault
    }

    pub fn rx_state(&self) -> RxState {
        self.receiver.state()
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    pub fn collaborators_mut(&mut self) -> &mut Collaborators {
        &mut self.collab
    }

    pub fn request_status(&mut self) {
        self.outbound.requests.status = true;
    }

    pub fn request_info(&mut self) {
        self.outbound.requests.info = true;
    }

    pub fn request_vm_info(&mut self) {
        self.outbound.requests.vm_info = true;
    }

    pub fn request_rgb_pix0(&mut self) {
        self.outbound.requests.rgb_pix0 = true;
    }

    pub fn request_rgb_array(&mut self) {
        self.outbound.requests.rgb_array = true;
    }

    pub fn request_debug(&mut self) {
        self.outbound.requests.debug = true;
    }

    pub fn request_vm_frame_sync(&mut self) {
        self.outbound.request_frame_sync();
    }

    /// Run one poll cycle
    ///
    /// Receive first, then at most one outbound frame, then the status
    /// timer. Never blocks and never fails; errors are counted or logged.
    pub fn poll(&mut self, now: Instant) {
        let started = Instant::now();

        self.handshake.refresh(now);

        if self.receiver.check_timeout(now) {
            warn!("Inbound frame timed out, resetting receiver");
            self.stats.record_comm_error();
            self.emit_ready();
        }

        self.service_rx(now);
        self.service_outbound(now);

        if now.saturating_duration_since(self.last_status) >= self.status_interval {
            self.last_status = now;
            self.outbound.arm_periodic();

            let status = self.collab.wifi.status();
            self.collab.indicator.set_connectivity(status.connected, status.ap_mode);
        }

        self.stats.record_time(Stage::Intf, started.elapsed());
    }

    /// Send one frame to the peer
    ///
    /// # Errors
    ///
    /// - `PayloadTooLarge` if the payload exceeds the frame limit
    /// - `NotReady` if the peer has not signalled readiness
    /// - `Io` if the port write fails
    pub fn send_msg(&mut self, data_id: u8, payload: &[u8]) -> Result<()> {
        let frame = encode_frame(data_id, payload)?;

        if !self.handshake.begin_send() {
            return Err(BridgeError::NotReady);
        }

        self.port.write_all(&frame.to_wire())?;
        debug!("Sent frame 0x{:02X} ({} bytes)", data_id, payload.len());
        Ok(())
    }

    /// Tell the peer its next frame may come: drop stale input, pulse the line
    fn emit_ready(&mut self) {
        if let Err(e) = self.port.flush_input() {
            warn!("Failed to flush serial input: {}", e);
        }

        if self.connected {
            if let Err(e) = self.port.strobe_ready() {
                warn!("Failed to strobe ready line: {}", e);
            }
        }
    }

    fn service_rx(&mut self, now: Instant) {
        let event = match self.receiver.poll(&mut self.port, now) {
            Ok(event) => event,
            Err(e) => {
                warn!("Serial read failed: {}", e);
                self.receiver.reset();
                return;
            }
        };

        match event {
            None => {}
            Some(RxEvent::Reset) => {
                if !self.connected {
                    info!("Peer connected");
                    self.connected = true;
                }
                self.emit_ready();
            }
            Some(RxEvent::Oversize(header)) => {
                warn!("Frame 0x{:02X} declares {} bytes, discarding", header.data_id, header.len);
                self.stats.record_comm_error();
                self.emit_ready();
            }
            Some(RxEvent::Received(header)) => {
                // Input is drained, so the peer may send while we validate
                self.emit_ready();

                match decode_frame(header, self.receiver.payload()) {
                    Some(frame) => {
                        let target = DispatchTarget {
                            collab: &mut self.collab,
                            outbound: &mut self.outbound,
                            tunnel: &mut self.tunnel,
                        };
                        if let Err(fault) = dispatch(frame.data_id(), &frame.payload, target) {
                            self.raise_fault(fault);
                        }
                    }
                    None => {
                        warn!("CRC mismatch on frame 0x{:02X}", header.data_id);
                        self.stats.record_comm_error();
                    }
                }
            }
        }
    }

    fn service_outbound(&mut self, now: Instant) {
        if !self.handshake.is_ready() {
            if self.handshake.query_due(now) {
                if let Err(e) = self.port.write_all(&[COMM_QUERY_READY]) {
                    debug!("Failed to send ready query: {}", e);
                }
            }
            return;
        }

        let link = LinkSnapshot {
            stats: &self.stats,
            fault: self.fault,
        };
        if let Some((data_id, payload)) = self.outbound.next_message(&mut self.collab, link) {
            if let Err(e) = self.send_msg(data_id.into(), &payload) {
                debug!("Failed to send {:?}: {}", data_id, e);
            }
        }
    }

    fn raise_fault(&mut self, fault: TunnelFault) {
        warn!("UDP tunnel fault: {}", fault);

        if let Err(e) = self.port.write_all(&fault.diagnostic()) {
            debug!("Failed to send diagnostic: {}", e);
        }

        self.fault = true;
        self.collab.indicator.set_fault(true);
    }
}
