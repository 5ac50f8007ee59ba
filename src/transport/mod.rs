//! # Printer Transport Layer
//!
//! This module provides the register-level access the protocol engine drives.
//!
//! ## Available Transports
//!
//! - [`parport`]: the PC parallel port registers (Linux, needs root)
//! - [`sim`]: a scripted in-memory port with simulated time, for tests and dry
//!   runs
//!
//! ## Register Model
//!
//! The engine talks over three byte-wide registers:
//!
//! | Register | Offset | Direction |
//! |----------|--------|-----------|
//! | data | base + 0 | write |
//! | status | base + 1 | read |
//! | control | base + 2 | write, read back |
//!
//! Everything above this layer only ever goes through [`HardwarePort`].

use std::time::{Duration, Instant};

use crate::error::LbpError;

pub mod parport;
pub mod sim;

pub use parport::{ParallelPort, PortBackend};
pub use sim::{PortEvent, SimClock, SimulatedPort};

/// Register access to the printer engine.
pub trait HardwarePort {
    /// Drive the data lines.
    fn write_data(&mut self, value: u8) -> Result<(), LbpError>;

    /// Drive the control lines.
    fn write_control(&mut self, value: u8) -> Result<(), LbpError>;

    /// Read the control lines back.
    fn read_control(&mut self) -> Result<u8, LbpError>;

    /// Sample the status lines.
    fn read_status(&mut self) -> Result<u8, LbpError>;

    /// Busy or sleep for `micros` microseconds.
    fn sleep_us(&mut self, micros: u64);
}

/// Time source for the protocol timers.
///
/// Only differences between readings matter.
pub trait Clock {
    fn now(&self) -> Duration;
}

/// Wall clock based on [`Instant`]
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_clock_moves_forward() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        std::thread::sleep(Duration::from_millis(2));
        assert!(clock.now() > a);
    }
}
