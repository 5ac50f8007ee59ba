//! # Handshake Link
//!
//! Register-level handshake cycles on top of a [`HardwarePort`].
//!
//! ## Building Blocks
//!
//! | Cycle | Sequence |
//! |-------|----------|
//! | command | control ← cmd, settle 1 µs, sample status, verify control |
//! | command/data | control ← cmd, settle, sample status, data ← byte, verify control |
//!
//! Every control write is read back: the low five bits must match what was
//! written. Status samples are compared under a mask. Either mismatch is fatal
//! because the engine state is unknown afterwards.
//!
//! ## Data Frames
//!
//! Script bytes are sent in frames. A frame opens with a command/data cycle on
//! command 6 and closes with acknowledge cycles on commands 7 and 6:
//!
//! ```text
//! single:  [6:d0] 6 · (7) (6) 6
//! block:   [6:d0] 6 (7) [6:d1] 4 (5) [4:d2] 6 (7) [6:d3] ... 6 (7) (6) 6
//! ```
//!
//! `[c:d]` is a command/data cycle, `(c)` a checked command cycle and a bare
//! number a plain control write.

use crate::error::LbpError;
use crate::transport::HardwarePort;

/// Status bits expected high during data handshakes
pub const HANDSHAKE_STATUS: u8 = 0x70;

/// Settle time of a command cycle
const COMMAND_SETTLE_US: u64 = 1;

/// Default settle time of a command/data cycle inside a frame
pub const DATA_SETTLE_US: u64 = 15;

/// Pause before acknowledging a single-byte frame
const SINGLE_ACK_DELAY_US: u64 = 10;

/// Mask applied to control readback
const CONTROL_MASK: u8 = 0x1f;

/// Mask applied by [`Link::check_status`]
const STATUS_MASK: u8 = 0xf8;

/// Handshake primitives over an owned port
#[derive(Debug)]
pub struct Link<P> {
    port: P,
}

impl<P: HardwarePort> Link<P> {
    pub fn new(port: P) -> Self {
        Self { port }
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    pub fn into_port(self) -> P {
        self.port
    }

    #[inline]
    pub fn data_out(&mut self, value: u8) -> Result<(), LbpError> {
        self.port.write_data(value)
    }

    #[inline]
    pub fn ctrl_out(&mut self, value: u8) -> Result<(), LbpError> {
        self.port.write_control(value)
    }

    #[inline]
    pub fn ctrl_in(&mut self) -> Result<u8, LbpError> {
        self.port.read_control()
    }

    #[inline]
    pub fn status_in(&mut self) -> Result<u8, LbpError> {
        self.port.read_status()
    }

    #[inline]
    pub fn sleep_us(&mut self, micros: u64) {
        self.port.sleep_us(micros);
    }

    /// Verify the control readback against `expected` (low five bits).
    pub fn check_ctrl(&mut self, expected: u8) -> Result<(), LbpError> {
        let actual = self.ctrl_in()?;
        if actual & CONTROL_MASK != expected & CONTROL_MASK {
            return Err(LbpError::ControlMismatch { expected, actual });
        }
        Ok(())
    }

    /// Verify a status sample against `expected` (top five bits).
    pub fn check_status(&mut self, expected: u8) -> Result<u8, LbpError> {
        let actual = self.status_in()?;
        expect_status("status check", actual, expected, STATUS_MASK)?;
        Ok(actual)
    }

    /// Command cycle; returns the status sampled during it.
    pub fn cmd_out(&mut self, cmd: u8) -> Result<u8, LbpError> {
        self.ctrl_out(cmd)?;
        self.sleep_us(COMMAND_SETTLE_US);
        let status = self.status_in()?;
        self.check_ctrl(cmd)?;
        Ok(status)
    }

    /// Command cycle whose status must match `expected` under `mask`.
    pub fn check_cmd_out(&mut self, cmd: u8, expected: u8, mask: u8) -> Result<u8, LbpError> {
        let status = self.cmd_out(cmd)?;
        expect_status("command cycle", status, expected, mask)?;
        Ok(status)
    }

    /// Command/data cycle with a `settle_us` pause; returns the status
    /// sampled before the data byte went out.
    pub fn cmd_data_out(&mut self, cmd: u8, data: u8, settle_us: u64) -> Result<u8, LbpError> {
        self.ctrl_out(cmd)?;
        self.sleep_us(settle_us);
        let status = self.status_in()?;
        self.data_out(data)?;
        self.check_ctrl(cmd)?;
        Ok(status)
    }

    /// Command/data cycle whose status must match `expected` under `mask`.
    pub fn check_cmd_data_out(
        &mut self,
        cmd: u8,
        data: u8,
        expected: u8,
        mask: u8,
        settle_us: u64,
    ) -> Result<u8, LbpError> {
        let status = self.cmd_data_out(cmd, data, settle_us)?;
        expect_status("command/data cycle", status, expected, mask)?;
        Ok(status)
    }

    /// Frame carrying one data byte.
    pub fn write_cycle(&mut self, data: u8) -> Result<(), LbpError> {
        self.frame_data(0x06, data)?;
        self.ctrl_out(0x06)?;
        self.sleep_us(SINGLE_ACK_DELAY_US);
        self.close_frame()
    }

    /// Frame carrying a block of data bytes.
    ///
    /// The first byte goes out on command 6, the following ones alternate
    /// between command 6 and command 4, each announced by a select/strobe
    /// pair.
    pub fn block_write(&mut self, data: &[u8]) -> Result<(), LbpError> {
        let Some((&first, rest)) = data.split_first() else {
            return Ok(());
        };
        self.frame_data(0x06, first)?;

        for pair in rest.chunks(2) {
            self.ctrl_out(0x06)?;
            self.check_cmd_out(0x07, HANDSHAKE_STATUS, HANDSHAKE_STATUS)?;
            self.frame_data(0x06, pair[0])?;

            if let Some(&second) = pair.get(1) {
                self.ctrl_out(0x04)?;
                self.check_cmd_out(0x05, HANDSHAKE_STATUS, HANDSHAKE_STATUS)?;
                self.frame_data(0x04, second)?;
            }
        }

        self.ctrl_out(0x06)?;
        self.close_frame()
    }

    fn frame_data(&mut self, cmd: u8, data: u8) -> Result<u8, LbpError> {
        self.check_cmd_data_out(cmd, data, HANDSHAKE_STATUS, HANDSHAKE_STATUS, DATA_SETTLE_US)
    }

    fn close_frame(&mut self) -> Result<(), LbpError> {
        self.check_cmd_out(0x07, HANDSHAKE_STATUS, HANDSHAKE_STATUS)?;
        self.check_cmd_out(0x06, HANDSHAKE_STATUS, HANDSHAKE_STATUS)?;
        self.ctrl_out(0x06)
    }
}

fn expect_status(context: &'static str, actual: u8, expected: u8, mask: u8) -> Result<(), LbpError> {
    if actual & mask != expected & mask {
        return Err(LbpError::StatusMismatch {
            context,
            expected,
            actual,
            mask,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{PortEvent, SimClock, SimulatedPort};
    use pretty_assertions::assert_eq;

    fn link() -> Link<SimulatedPort> {
        Link::new(SimulatedPort::always_ready(SimClock::new()))
    }

    #[test]
    fn test_cmd_out_sequence() {
        let mut link = link();
        assert_eq!(link.cmd_out(0x02).unwrap(), 0x48);
        assert_eq!(
            link.port().events(),
            &[
                PortEvent::Control(0x02),
                PortEvent::Sleep(1),
                PortEvent::Status(0x48),
                PortEvent::ReadControl(0xc2),
            ]
        );
    }

    #[test]
    fn test_cmd_data_out_samples_status_before_data() {
        let mut link = link();
        link.check_cmd_data_out(0x06, 0x80, 0x70, 0x70, 1).unwrap();
        assert_eq!(
            link.port().events(),
            &[
                PortEvent::Control(0x06),
                PortEvent::Sleep(1),
                PortEvent::Status(0x78),
                PortEvent::Data(0x80),
                PortEvent::ReadControl(0xc6),
            ]
        );
    }

    #[test]
    fn test_control_mismatch_is_fatal() {
        let mut link = link();
        link.port_mut().break_control_readback(0xc0);
        let err = link.cmd_out(0x04).unwrap_err();
        assert!(matches!(
            err,
            LbpError::ControlMismatch {
                expected: 0x04,
                actual: 0xc0
            }
        ));
        assert!(!err.requires_reset());
    }

    #[test]
    fn test_status_mismatch_is_fatal() {
        let mut link = link();
        // command 2 answers 0x48, which lacks bits 0x30
        let err = link.check_cmd_out(0x02, 0x70, 0x70).unwrap_err();
        assert!(matches!(
            err,
            LbpError::StatusMismatch {
                actual: 0x48,
                mask: 0x70,
                ..
            }
        ));
    }

    #[test]
    fn test_check_status_masks_low_bits() {
        let mut link = link();
        link.port_mut().queue_status([0xdf, 0xd8]);
        assert_eq!(link.check_status(0xde).unwrap(), 0xdf);
        assert!(link.check_status(0xfe).is_err());
    }

    #[test]
    fn test_single_write_frame() {
        let mut link = link();
        link.write_cycle(0x89).unwrap();
        assert_eq!(link.port().data_written(), vec![0x89]);
        assert_eq!(
            link.port().control_written(),
            vec![0x06, 0x06, 0x07, 0x06, 0x06]
        );
    }

    #[test]
    fn test_block_write_frame() {
        let mut link = link();
        link.block_write(&[0x8b, 0x89, 0x8c]).unwrap();
        assert_eq!(link.port().data_written(), vec![0x8b, 0x89, 0x8c]);
        assert_eq!(
            link.port().control_written(),
            vec![
                0x06, // d0
                0x06, 0x07, 0x06, // d1
                0x04, 0x05, 0x04, // d2
                0x06, 0x07, 0x06, 0x06, // close
            ]
        );
    }

    #[test]
    fn test_block_write_odd_tail() {
        let mut link = link();
        link.block_write(&[1, 2, 3, 4]).unwrap();
        assert_eq!(link.port().data_written(), vec![1, 2, 3, 4]);
        link.block_write(&[]).unwrap();
        assert_eq!(link.port().data_written().len(), 4);
    }
}
