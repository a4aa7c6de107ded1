//! # Link Statistics
//!
//! Counters reported through the periodic info response. Never reset while
//! the link is running.

use std::time::Duration;

/// Processing stage with a tracked worst-case time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// The link's own poll
    Intf,
    Vm,
    Wifi,
    Mem,
}

#[derive(Debug, Default, Clone)]
pub struct Statistics {
    comm_errors: u16,
    max_times: [Duration; 4],
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a framing, CRC or timeout failure
    pub fn record_comm_error(&mut self) {
        self.comm_errors = self.comm_errors.wrapping_add(1);
    }

    pub fn comm_errors(&self) -> u16 {
        self.comm_errors
    }

    /// Record one run of `stage`, keeping the maximum
    pub fn record_time(&mut self, stage: Stage, elapsed: Duration) {
        let slot = &mut self.max_times[stage as usize];
        if elapsed > *slot {
            *slot = elapsed;
        }
    }

    pub fn max_time(&self, stage: Stage) -> Duration {
        self.max_times[stage as usize]
    }

    /// Worst-case time in microseconds, saturated to the wire width
    pub fn max_time_us(&self, stage: Stage) -> u16 {
        self.max_time(stage).as_micros().min(u16::MAX as u128) as u16
    }
}
