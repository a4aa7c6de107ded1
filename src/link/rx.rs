//! # Receive State Machine
//!
//! Byte-oriented parser for inbound frames. Only one frame is ever in
//! flight; a frame that does not complete within the timeout is abandoned.

use std::io;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::serial::port_trait::LinkPort;
use crate::wire::protocol::*;

/// Parser state. Non-idle states carry the time the frame-start byte arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxState {
    Idle,
    AwaitingHeader { started_at: Instant },
    AwaitingPayload { started_at: Instant, header: FrameHeader },
}

/// Something the link must react to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxEvent {
    /// Peer sent a RESET control byte
    Reset,
    /// Header and payload fully read; payload is in `Receiver::payload`
    Received(FrameHeader),
    /// Header declared a payload larger than the receive buffer
    Oversize(FrameHeader),
}

/// Inbound frame reassembly
#[derive(Debug)]
pub struct Receiver {
    state: RxState,
    timeout: Duration,
    buf: Vec<u8>,
}

impl Receiver {
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: RxState::Idle,
            timeout,
            buf: Vec::with_capacity(MAX_DATA_LEN),
        }
    }

    pub fn state(&self) -> RxState {
        self.state
    }

    /// Payload of the last `RxEvent::Received` frame
    pub fn payload(&self) -> &[u8] {
        &self.buf
    }

    /// Drop any partial frame
    pub fn reset(&mut self) {
        self.state = RxState::Idle;
    }

    /// Abandon a partial frame older than the timeout
    ///
    /// Returns true if a frame was abandoned.
    pub fn check_timeout(&mut self, now: Instant) -> bool {
        let started_at = match self.state {
            RxState::Idle => return false,
            RxState::AwaitingHeader { started_at } => started_at,
            RxState::AwaitingPayload { started_at, .. } => started_at,
        };

        if now.saturating_duration_since(started_at) > self.timeout {
            self.state = RxState::Idle;
            return true;
        }

        false
    }

    /// Consume whatever input is available, stopping at the first event
    ///
    /// Never blocks: each state only reads once the bytes it needs are
    /// already buffered.
    pub fn poll<P: LinkPort + ?Sized>(&mut self, port: &mut P, now: Instant) -> io::Result<Option<RxEvent>> {
        loop {
            match self.state {
                RxState::Idle => {
                    let Some(byte) = port.read_byte()? else {
                        return Ok(None);
                    };

                    match byte {
                        COMM_RESET => return Ok(Some(RxEvent::Reset)),
                        COMM_DATA => self.state = RxState::AwaitingHeader { started_at: now },
                        other => trace!("Discarding stray byte 0x{:02X}", other),
                    }
                }
                RxState::AwaitingHeader { started_at } => {
                    if port.bytes_available() < HEADER_LEN {
                        return Ok(None);
                    }

                    let mut raw = [0u8; HEADER_LEN];
                    port.read_exact(&mut raw)?;
                    let header = FrameHeader::from_bytes(&raw);

                    if header.len as usize > MAX_DATA_LEN {
                        self.state = RxState::Idle;
                        return Ok(Some(RxEvent::Oversize(header)));
                    }

                    self.state = RxState::AwaitingPayload { started_at, header };
                }
                RxState::AwaitingPayload { header, .. } => {
                    let len = header.len as usize;
                    if port.bytes_available() < len {
                        return Ok(None);
                    }

                    self.buf.resize(len, 0);
                    port.read_exact(&mut self.buf)?;
                    self.state = RxState::Idle;

                    return Ok(Some(RxEvent::Received(header)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::port_trait::mocks::MockPort;
    use crate::wire::encoder::encode_frame;

    const TIMEOUT: Duration = Duration::from_millis(20);

    #[test]
    fn test_reset_byte() {
        let mut port = MockPort::new();
        let mut rx = Receiver::new(TIMEOUT);
        port.feed(&[0x00, COMM_RESET]);

        let event = rx.poll(&mut port, Instant::now()).unwrap();
        assert_eq!(event, Some(RxEvent::Reset));
        assert_eq!(rx.state(), RxState::Idle);
    }

    #[test]
    fn test_complete_frame_in_one_poll() {
        let mut port = MockPort::new();
        let mut rx = Receiver::new(TIMEOUT);
        let frame = encode_frame(0x20, &[1, 2, 3, 4]).unwrap();
        port.feed(&frame.to_wire());

        let event = rx.poll(&mut port, Instant::now()).unwrap();
        assert_eq!(event, Some(RxEvent::Received(frame.header)));
        assert_eq!(rx.payload(), &[1, 2, 3, 4]);
        assert_eq!(rx.state(), RxState::Idle);
    }

    #[test]
    fn test_frame_split_across_polls() {
        let mut port = MockPort::new();
        let mut rx = Receiver::new(TIMEOUT);
        let t0 = Instant::now();
        let wire = encode_frame(0x31, &[9u8; 40]).unwrap().to_wire();

        port.feed(&wire[..4]);
        assert_eq!(rx.poll(&mut port, t0).unwrap(), None);
        assert_eq!(rx.state(), RxState::AwaitingHeader { started_at: t0 });

        port.feed(&wire[4..20]);
        assert_eq!(rx.poll(&mut port, t0).unwrap(), None);
        assert!(matches!(rx.state(), RxState::AwaitingPayload { .. }));

        port.feed(&wire[20..]);
        let event = rx.poll(&mut port, t0).unwrap();
        assert!(matches!(event, Some(RxEvent::Received(h)) if h.len == 40));
        assert_eq!(rx.payload(), &[9u8; 40][..]);
    }

    #[test]
    fn test_oversize_header() {
        let mut port = MockPort::new();
        let mut rx = Receiver::new(TIMEOUT);
        let header = FrameHeader { data_id: 1, msg_id: 0, len: 300, crc: 0 };
        port.feed(&[COMM_DATA]);
        port.feed(&header.to_bytes());

        let event = rx.poll(&mut port, Instant::now()).unwrap();
        assert_eq!(event, Some(RxEvent::Oversize(header)));
        assert_eq!(rx.state(), RxState::Idle);
    }

    #[test]
    fn test_timeout_measured_from_frame_start() {
        let mut port = MockPort::new();
        let mut rx = Receiver::new(TIMEOUT);
        let t0 = Instant::now();
        port.feed(&[COMM_DATA, 0x01]);
        rx.poll(&mut port, t0).unwrap();

        assert!(!rx.check_timeout(t0 + Duration::from_millis(20)));
        assert!(rx.check_timeout(t0 + Duration::from_millis(21)));
        assert_eq!(rx.state(), RxState::Idle);
        assert!(!rx.check_timeout(t0 + Duration::from_millis(100)));
    }

    #[test]
    fn test_timeout_keeps_start_through_payload_state() {
        let mut port = MockPort::new();
        let mut rx = Receiver::new(TIMEOUT);
        let t0 = Instant::now();
        let wire = encode_frame(0x01, &[0u8; 10]).unwrap().to_wire();

        port.feed(&wire[..1]);
        rx.poll(&mut port, t0).unwrap();
        port.feed(&wire[1..8]);
        rx.poll(&mut port, t0 + Duration::from_millis(15)).unwrap();
        assert!(matches!(rx.state(), RxState::AwaitingPayload { started_at, .. } if started_at == t0));

        assert!(rx.check_timeout(t0 + Duration::from_millis(25)));
    }

    #[test]
    fn test_idle_never_times_out() {
        let mut rx = Receiver::new(TIMEOUT);
        assert!(!rx.check_timeout(Instant::now() + Duration::from_secs(5)));
    }
}
