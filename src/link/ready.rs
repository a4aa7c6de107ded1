//! # Readiness Handshake
//!
//! The peer pulls its ready line when its receive buffer is drained. That
//! edge arrives asynchronously (a CTS watcher task on the host), so the flag
//! it sets lives behind a mutex that both sides take for every access.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::trace;

#[derive(Debug, Default)]
struct ReadyShared {
    /// Peer can accept the next frame
    ready: bool,
    /// Set by the edge handler; poll side restarts the watchdog window
    reset_timeout: bool,
}

/// Readiness flag shared between the edge handler and the poll loop
#[derive(Debug, Clone, Default)]
pub struct ReadyLine {
    shared: Arc<Mutex<ReadyShared>>,
}

impl ReadyLine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ReadyShared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Edge handler: peer signalled it is ready
    pub fn signal(&self) {
        let mut shared = self.lock();
        shared.ready = true;
        shared.reset_timeout = true;
    }

    pub fn is_ready(&self) -> bool {
        self.lock().ready
    }

    /// Clear the flag; called the instant a transmission begins
    pub fn clear(&self) {
        self.lock().ready = false;
    }

    fn take_reset_latch(&self) -> bool {
        std::mem::take(&mut self.lock().reset_timeout)
    }
}

/// Poll-side view of the handshake: flag plus query watchdog
#[derive(Debug)]
pub struct Handshake {
    line: ReadyLine,
    last_ready: Instant,
    timeout: Duration,
}

impl Handshake {
    pub fn new(line: ReadyLine, now: Instant, timeout: Duration) -> Self {
        Self { line, last_ready: now, timeout }
    }

    /// Handle to give to the edge source
    pub fn line(&self) -> &ReadyLine {
        &self.line
    }

    /// Restart the watchdog window if a signal arrived since the last poll
    pub fn refresh(&mut self, now: Instant) {
        if self.line.take_reset_latch() {
            self.last_ready = now;
        }
    }

    pub fn is_ready(&self) -> bool {
        self.line.is_ready()
    }

    /// Claim the ready slot for one transmission
    ///
    /// Returns false (and leaves the flag alone) if the peer is not ready.
    pub fn begin_send(&self) -> bool {
        let mut shared = self.line.lock();
        if !shared.ready {
            return false;
        }
        shared.ready = false;
        true
    }

    /// While not ready: true once per `timeout`, meaning a readiness query
    /// should go out now. The window restarts whenever this fires.
    pub fn query_due(&mut self, now: Instant) -> bool {
        if self.is_ready() {
            return false;
        }

        if now.saturating_duration_since(self.last_ready) > self.timeout {
            trace!("No ready signal for {:?}, querying peer", self.timeout);
            self.last_ready = now;
            return true;
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(50);

    #[test]
    fn test_signal_sets_ready() {
        let line = ReadyLine::new();
        assert!(!line.is_ready());
        line.signal();
        assert!(line.is_ready());
        line.clear();
        assert!(!line.is_ready());
    }

    #[test]
    fn test_begin_send_clears_flag() {
        let t0 = Instant::now();
        let hs = Handshake::new(ReadyLine::new(), t0, TIMEOUT);

        assert!(!hs.begin_send());
        hs.line().signal();
        assert!(hs.begin_send());
        assert!(!hs.is_ready());
        assert!(!hs.begin_send());
    }

    #[test]
    fn test_query_after_timeout() {
        let t0 = Instant::now();
        let mut hs = Handshake::new(ReadyLine::new(), t0, TIMEOUT);

        assert!(!hs.query_due(t0 + Duration::from_millis(50)));
        assert!(hs.query_due(t0 + Duration::from_millis(51)));
        // Window restarted by the query
        assert!(!hs.query_due(t0 + Duration::from_millis(60)));
        assert!(hs.query_due(t0 + Duration::from_millis(102)));
    }

    #[test]
    fn test_no_query_while_ready() {
        let t0 = Instant::now();
        let mut hs = Handshake::new(ReadyLine::new(), t0, TIMEOUT);
        hs.line().signal();

        assert!(!hs.query_due(t0 + Duration::from_secs(1)));
    }

    #[test]
    fn test_signal_restarts_window() {
        let t0 = Instant::now();
        let mut hs = Handshake::new(ReadyLine::new(), t0, TIMEOUT);

        hs.line().signal();
        hs.refresh(t0 + Duration::from_millis(40));
        assert!(hs.begin_send());

        // 51ms after t0 but only 11ms after the last signal
        assert!(!hs.query_due(t0 + Duration::from_millis(51)));
        assert!(hs.query_due(t0 + Duration::from_millis(91)));
    }

    #[test]
    fn test_signal_from_other_thread() {
        let line = ReadyLine::new();
        let remote = line.clone();

        std::thread::spawn(move || remote.signal()).join().unwrap();

        assert!(line.is_ready());
    }
}
