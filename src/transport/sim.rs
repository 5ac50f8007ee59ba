//! # Simulated Port
//!
//! An in-memory [`HardwarePort`] with simulated time, used to run the protocol
//! engine without hardware.
//!
//! - The control register latches what was written and reads back with the
//!   two top bits set, like a real port.
//! - Status bytes come from a queue of scripted values first, then from a
//!   responder closure that sees the current control latch and the simulated
//!   time.
//! - Sleeping advances a [`SimClock`] shared with the engine, so timeouts of
//!   minutes run instantly.
//! - Every access is recorded as a [`PortEvent`].

use std::cell::Cell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use crate::error::LbpError;
use crate::transport::{Clock, HardwarePort};

/// Bits a real control register reads back as set
const CONTROL_READ_BITS: u8 = 0xc0;

/// Status of an idle engine that is ready for the next command
pub const STATUS_READY: u8 = 0x48;

/// Status of an engine waiting for (or accepting) band data
pub const STATUS_ARMED: u8 = 0x78;

/// Simulated time shared between a port and an engine.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    now: Rc<Cell<Duration>>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for SimClock {
    fn now(&self) -> Duration {
        self.now.get()
    }
}

/// One recorded register access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortEvent {
    Data(u8),
    Control(u8),
    /// Control readback and the value returned
    ReadControl(u8),
    /// Status sample and the value returned
    Status(u8),
    /// Sleep in microseconds
    Sleep(u64),
}

type Responder = Box<dyn FnMut(u8, Duration) -> u8>;

/// Scripted stand-in for the parallel port
pub struct SimulatedPort {
    clock: SimClock,
    control: u8,
    data: u8,
    queued: VecDeque<u8>,
    responder: Responder,
    control_override: Option<u8>,
    events: Vec<PortEvent>,
}

impl SimulatedPort {
    /// Port whose status comes from `responder(control_latch, now)`.
    pub fn new<F>(clock: SimClock, responder: F) -> Self
    where
        F: FnMut(u8, Duration) -> u8 + 'static,
    {
        Self {
            clock,
            control: 0,
            data: 0,
            queued: VecDeque::new(),
            responder: Box::new(responder),
            control_override: None,
            events: Vec::new(),
        }
    }

    /// An engine that is always ready: poll command 2 answers
    /// [`STATUS_READY`], everything else [`STATUS_ARMED`].
    pub fn always_ready(clock: SimClock) -> Self {
        Self::new(clock, |control, _| {
            if control & 0x1f == 0x02 {
                STATUS_READY
            } else {
                STATUS_ARMED
            }
        })
    }

    /// Status values returned, in order, before the responder is consulted.
    pub fn queue_status<I: IntoIterator<Item = u8>>(&mut self, statuses: I) {
        self.queued.extend(statuses);
    }

    /// Make every control readback return `value`.
    pub fn break_control_readback(&mut self, value: u8) {
        self.control_override = Some(value);
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    pub fn control_latch(&self) -> u8 {
        self.control
    }

    pub fn data_latch(&self) -> u8 {
        self.data
    }

    pub fn events(&self) -> &[PortEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<PortEvent> {
        std::mem::take(&mut self.events)
    }

    /// Bytes written to the data register, in order
    pub fn data_written(&self) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|e| match e {
                PortEvent::Data(v) => Some(*v),
                _ => None,
            })
            .collect()
    }

    /// Values written to the control register, in order
    pub fn control_written(&self) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|e| match e {
                PortEvent::Control(v) => Some(*v),
                _ => None,
            })
            .collect()
    }
}

impl fmt::Debug for SimulatedPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedPort")
            .field("now", &self.clock.now())
            .field("control", &self.control)
            .field("data", &self.data)
            .field("queued", &self.queued.len())
            .field("events", &self.events.len())
            .finish()
    }
}

impl HardwarePort for SimulatedPort {
    fn write_data(&mut self, value: u8) -> Result<(), LbpError> {
        self.data = value;
        self.events.push(PortEvent::Data(value));
        Ok(())
    }

    fn write_control(&mut self, value: u8) -> Result<(), LbpError> {
        self.control = value;
        self.events.push(PortEvent::Control(value));
        Ok(())
    }

    fn read_control(&mut self) -> Result<u8, LbpError> {
        let value = self
            .control_override
            .unwrap_or(self.control | CONTROL_READ_BITS);
        self.events.push(PortEvent::ReadControl(value));
        Ok(value)
    }

    fn read_status(&mut self) -> Result<u8, LbpError> {
        let value = match self.queued.pop_front() {
            Some(v) => v,
            None => (self.responder)(self.control, self.clock.now()),
        };
        self.events.push(PortEvent::Status(value));
        Ok(value)
    }

    fn sleep_us(&mut self, micros: u64) {
        self.clock.advance(Duration::from_micros(micros));
        self.events.push(PortEvent::Sleep(micros));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sleep_advances_shared_clock() {
        let clock = SimClock::new();
        let mut port = SimulatedPort::always_ready(clock.clone());
        port.sleep_us(1_500_000);
        assert_eq!(clock.now(), Duration::from_millis(1500));
    }

    #[test]
    fn test_control_reads_back_latch() {
        let mut port = SimulatedPort::always_ready(SimClock::new());
        port.write_control(0x05).unwrap();
        assert_eq!(port.read_control().unwrap(), 0xc5);

        port.break_control_readback(0x00);
        assert_eq!(port.read_control().unwrap(), 0x00);
    }

    #[test]
    fn test_queue_before_responder() {
        let mut port = SimulatedPort::always_ready(SimClock::new());
        port.queue_status([0x3e]);
        port.write_control(0x02).unwrap();
        assert_eq!(port.read_status().unwrap(), 0x3e);
        assert_eq!(port.read_status().unwrap(), STATUS_READY);
        port.write_control(0x04).unwrap();
        assert_eq!(port.read_status().unwrap(), STATUS_ARMED);
    }

    #[test]
    fn test_events_are_recorded() {
        let mut port = SimulatedPort::always_ready(SimClock::new());
        port.write_data(0xAB).unwrap();
        port.write_control(0x06).unwrap();
        port.sleep_us(10);
        assert_eq!(
            port.events(),
            &[
                PortEvent::Data(0xAB),
                PortEvent::Control(0x06),
                PortEvent::Sleep(10)
            ]
        );
        assert_eq!(port.data_written(), vec![0xAB]);
        assert_eq!(port.control_written(), vec![0x06]);
    }
}
