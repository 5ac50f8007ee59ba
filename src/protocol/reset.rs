//! # Engine Reset
//!
//! Brings the engine from an unknown or power-on state back to "idle, ready
//! for a page". Used at start-up, when a page never gets going, and after a
//! failed page.
//!
//! ## Phases
//!
//! 1. **Wake**: pulse the control lines, wait 1 s, then probe. The probe must
//!    read exactly `0x3e`; `0x5e` means the cable is not connected.
//! 2. **Handshake**: two negotiation rounds, each checking the status after
//!    every step.
//! 3. **Debounce**: alternate poll commands 2 and 0 until the "ready" pattern
//!    has been seen 21 times in a row after the "busy" pattern showed up at
//!    least once.
//! 4. **Flush**: 12287 zero bytes, then three closing command frames.
//!
//! Any unexpected status at any step is fatal.

use crate::error::LbpError;
use crate::protocol::engine::{EngineState, ProtocolEngine};
use crate::transport::{Clock, HardwarePort};

/// Probe answer of a healthy engine
pub const PROBE_OK: u8 = 0x3e;

/// Probe answer when the cable is not connected
pub const PROBE_NO_CABLE: u8 = 0x5e;

/// Consecutive ready samples required by the debounce loop
pub const DEBOUNCE_COUNT: u32 = 21;

/// Zero bytes clocked out to flush the engine's input
pub const FLUSH_BYTES: usize = 12287;

/// Mask used for the reset status checks
const RESET_MASK: u8 = 0x78;

impl<P: HardwarePort, C: Clock> ProtocolEngine<P, C> {
    /// Run the full reset sequence.
    ///
    /// ## Errors
    ///
    /// - [`LbpError::CableFault`] / [`LbpError::ResetFailed`] from the probe
    /// - [`LbpError::StatusMismatch`] / [`LbpError::ControlMismatch`] from any
    ///   later step
    pub fn reset(&mut self) -> Result<(), LbpError> {
        self.set_state(EngineState::Resetting);
        log::info!("Resetting {}...", self.printer.name);

        self.wake()?;
        self.negotiate()?;
        self.debounce()?;
        self.flush()?;

        log::info!("Printer reset");
        self.set_state(EngineState::Idle);
        Ok(())
    }

    fn wake(&mut self) -> Result<(), LbpError> {
        let link = &mut self.link;
        link.data_out(0x24)?;
        link.data_out(0x06)?;
        link.sleep_us(100);

        link.ctrl_out(0x0a)?;
        link.ctrl_out(0x0a)?;
        link.ctrl_out(0x0e)?;
        link.sleep_us(1_000_000);

        link.data_out(0x24)?;
        link.check_ctrl(0xce)?;
        link.ctrl_out(0x06)?;
        link.sleep_us(150);

        match link.status_in()? {
            PROBE_OK => Ok(()),
            PROBE_NO_CABLE => {
                log::error!("Reset failed, check cables");
                Err(LbpError::CableFault)
            }
            status => {
                log::error!("Reset failed, error code {:#04x}", status);
                Err(LbpError::ResetFailed { status })
            }
        }
    }

    fn negotiate(&mut self) -> Result<(), LbpError> {
        let link = &mut self.link;
        link.check_ctrl(0xc6)?;
        link.ctrl_out(0x07)?;
        link.ctrl_out(0x07)?;
        link.ctrl_out(0x04)?;
        link.sleep_us(40);

        link.check_status(0xde)?;
        link.check_ctrl(0xc4)?;
        link.ctrl_out(0x06)?;
        link.sleep_us(40);

        link.check_status(0xfe)?;
        link.sleep_us(10);

        link.check_ctrl(0xc6)?;
        link.ctrl_out(0x06)
    }

    fn debounce(&mut self) -> Result<(), LbpError> {
        let mut count = 0u32;
        let mut seen_busy = false;

        loop {
            match self.link.cmd_out(0x02)? & 0xf8 {
                0x08 => count += 1,
                0x18 => count = 0,
                actual => {
                    return Err(LbpError::StatusMismatch {
                        context: "reset debounce",
                        expected: 0x08,
                        actual,
                        mask: 0xf8,
                    });
                }
            }

            if seen_busy && count == DEBOUNCE_COUNT {
                break;
            }

            match self.link.cmd_out(0x00)? & 0xf8 {
                0x48 => count += 1,
                0x58 => {
                    count = 0;
                    seen_busy = true;
                }
                actual => {
                    return Err(LbpError::StatusMismatch {
                        context: "reset debounce",
                        expected: 0x48,
                        actual,
                        mask: 0xf8,
                    });
                }
            }
        }

        log::debug!("reset debounce settled");
        Ok(())
    }

    fn flush(&mut self) -> Result<(), LbpError> {
        let link = &mut self.link;

        link.check_cmd_out(0x06, 0x78, RESET_MASK)?;
        link.ctrl_out(0x04)?;
        link.check_cmd_out(0x0c, 0x28, RESET_MASK)?;
        link.ctrl_out(0x0c)?;
        link.sleep_us(15);

        link.data_out(0x20)?;
        link.check_ctrl(0xcc)?;
        link.check_cmd_out(0x06, 0x38, RESET_MASK)?;
        link.ctrl_out(0x07)?;
        link.ctrl_out(0x07)?;
        link.ctrl_out(0x04)?;
        link.sleep_us(40);

        link.check_status(0xde)?;
        link.check_ctrl(0xc4)?;
        link.ctrl_out(0x06)?;
        link.sleep_us(40);

        link.check_status(0xfe)?;
        link.sleep_us(2_000_000);

        for _ in 0..FLUSH_BYTES {
            link.data_out(0x00)?;
        }
        link.sleep_us(500);

        link.check_status(0xfe)?;
        link.data_out(0xa0)?;
        link.check_ctrl(0xc6)?;
        link.ctrl_out(0x06)?;
        link.check_cmd_out(0x07, 0x78, RESET_MASK)?;
        link.ctrl_out(0x06)?;
        link.sleep_us(10);

        link.check_status(0xfe)?;
        link.data_out(0x00)?;
        link.check_ctrl(0xc6)?;
        link.ctrl_out(0x04)?;
        link.check_cmd_out(0x05, 0x78, RESET_MASK)?;
        link.ctrl_out(0x04)?;
        link.sleep_us(20);

        link.check_status(0xfe)?;
        link.data_out(0xa0)?;
        link.check_ctrl(0xc4)?;
        link.ctrl_out(0x06)?;
        link.check_cmd_out(0x07, 0x78, RESET_MASK)?;
        link.check_cmd_out(0x06, 0x78, RESET_MASK)?;
        link.ctrl_out(0x06)
    }
}

/// Status values a healthy engine answers during [`ProtocolEngine::reset`],
/// in order.
pub fn healthy_reset_statuses() -> Vec<u8> {
    let mut statuses = vec![PROBE_OK, 0xde, 0xfe];

    // debounce: busy once, then ready 21 times
    statuses.extend([0x18, 0x58]);
    for i in 0..DEBOUNCE_COUNT {
        statuses.push(if i % 2 == 0 { 0x08 } else { 0x48 });
    }

    statuses.extend([0x78, 0x28, 0x38, 0xde, 0xfe]);
    statuses.extend([0xfe, 0x78, 0xfe, 0x78, 0xfe, 0x78, 0x78]);
    statuses
}
