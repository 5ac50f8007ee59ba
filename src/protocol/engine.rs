//! # Protocol Engine
//!
//! Drives one page through the printer: page script, band transfers, paper
//! waits and retries.
//!
//! ## Page Flow
//!
//! ```text
//!            ┌──────── 3 s without "ready" ───────┐
//!            ▼                                    │
//!   Idle ─► Resetting ─► Idle ── ready ──► Initializing
//!                                              │ BandTransfer op
//!                                              ▼
//!                                   ┌──── BandWait ◄────────┐
//!                                   │         │ ready        │ next band
//!                                   │         ▼              │
//!                                   │   BandTransfer ────────┘
//!                                   │         │ store drained
//!                                   ▼         ▼
//!                              (timeout)   PageDone
//! ```
//!
//! Every loop iteration polls with command 0, then asks command 2 whether the
//! engine is ready for the next script step. Only a ready answer advances the
//! [`ScriptCursor`].
//!
//! ## Band Wait Tiers
//!
//! While a band waits for the engine to arm:
//!
//! | Elapsed | Action |
//! |---------|--------|
//! | every 1 s | repeat the band init handshake |
//! | 15 s, bounded | fail with [`LbpError::BandTimeout`] |
//! | 15 s, unbounded | wait up to 30 min while the engine reports "no paper", then continue bounded |
//!
//! The first band of a page is always bounded. All timers read an injected
//! [`Clock`], so the whole state machine runs against a simulated port and
//! simulated time in tests.

use std::io::{Read, Seek, Write};
use std::time::Duration;

use crate::error::LbpError;
use crate::printer::PrinterConfig;
use crate::protocol::link::{HANDSHAKE_STATUS, Link};
use crate::protocol::packet::{WHITE_PACKET, WHITE_PACKET_REPEAT, WHITE_TAIL};
use crate::protocol::script::{BandInit, DataByte, ScriptCursor, ScriptOp};
use crate::protocol::store::BandStore;
use crate::transport::{Clock, HardwarePort};

/// High status nibble of an engine ready for the next script step
const STATUS_NEXT_STEP: u8 = 0x40;

/// High status nibble of an engine armed for band data
const STATUS_ARMED: u8 = 0x70;

/// High status nibble of an engine out of paper
const STATUS_NO_PAPER: u8 = 0xf0;

/// Settle time of the band init command/data cycles
const INIT_SETTLE_US: u64 = 1;

/// Settle time of the cycle that closes a band
const CLOSE_SETTLE_US: u64 = 3000;

/// Tunable wall-clock constants of the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineTimings {
    /// Pause between status polls while waiting
    pub poll_interval: Duration,
    /// Band init handshake repeat interval
    pub reinit_interval: Duration,
    /// Bounded wait for a band to arm
    pub ready_timeout: Duration,
    /// Longest wait for paper
    pub paper_timeout: Duration,
    /// Reset interval while the engine never reports ready for a page
    pub idle_reset_interval: Duration,
    /// Give up after this many idle resets (`None`: keep resetting)
    pub max_idle_resets: Option<u32>,
}

impl Default for EngineTimings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_micros(1),
            reinit_interval: Duration::from_secs(1),
            ready_timeout: Duration::from_secs(15),
            paper_timeout: Duration::from_secs(30 * 60),
            idle_reset_interval: Duration::from_secs(3),
            max_idle_resets: None,
        }
    }
}

/// Where the engine is in the page flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Resetting,
    Initializing,
    BandWait,
    BandTransfer,
    PageDone,
}

/// Data sent for one band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload<'a> {
    /// Encoded packets from a band record
    Data(&'a [u8]),
    /// The pre-baked blank band
    White,
}

/// Timers of one band wait
#[derive(Debug, Clone, Copy)]
struct BandTimers {
    /// Start of the current wait tier
    tier_start: Duration,
    /// Last band init handshake
    last_init: Duration,
    /// Whether the ready timeout fails the band instead of waiting for paper
    bounded: bool,
}

/// What [`ProtocolEngine::print_page`] sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageReport {
    pub bands: usize,
    pub script_steps: usize,
    pub idle_resets: u32,
}

enum BandSource<'a, S> {
    Records(&'a mut BandStore<S>),
    White { remaining: usize },
}

impl<S: Read + Write + Seek> BandSource<'_, S> {
    /// `None` when the page has no band left; `Some(None)` for a white band.
    fn next_band(&mut self) -> Result<Option<Option<Vec<u8>>>, LbpError> {
        match self {
            Self::Records(store) => Ok(store.next_record()?.map(|record| {
                log::debug!(
                    "record: {} packets{}",
                    record.packets,
                    if record.truncated { " (truncated)" } else { "" }
                );
                Some(record.payload)
            })),
            Self::White { remaining } => {
                if *remaining == 0 {
                    return Ok(None);
                }
                *remaining -= 1;
                Ok(Some(None))
            }
        }
    }
}

/// # Protocol Engine
///
/// Owns the port and the clock for the lifetime of a print job.
///
/// ## Example
///
/// ```
/// use lbp660::printer::PrinterConfig;
/// use lbp660::protocol::{BandStore, ProtocolEngine};
/// use lbp660::transport::{SimClock, SimulatedPort};
///
/// let clock = SimClock::new();
/// let port = SimulatedPort::always_ready(clock.clone());
/// let mut engine = ProtocolEngine::new(port, clock, PrinterConfig::LBP660);
///
/// let mut store = BandStore::in_memory();
/// store.finish()?;
/// let report = engine.print_page(&mut store)?;
/// assert_eq!(report.bands, 0);
/// # Ok::<(), lbp660::error::LbpError>(())
/// ```
pub struct ProtocolEngine<P, C> {
    pub(crate) link: Link<P>,
    pub(crate) clock: C,
    pub(crate) printer: PrinterConfig,
    timings: EngineTimings,
    state: EngineState,
}

impl<P: HardwarePort, C: Clock> ProtocolEngine<P, C> {
    pub fn new(port: P, clock: C, printer: PrinterConfig) -> Self {
        Self {
            link: Link::new(port),
            clock,
            printer,
            timings: EngineTimings::default(),
            state: EngineState::Idle,
        }
    }

    pub fn with_timings(mut self, timings: EngineTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn timings(&self) -> &EngineTimings {
        &self.timings
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn printer(&self) -> &PrinterConfig {
        &self.printer
    }

    pub fn port(&self) -> &P {
        self.link.port()
    }

    pub fn port_mut(&mut self) -> &mut P {
        self.link.port_mut()
    }

    pub fn into_port(self) -> P {
        self.link.into_port()
    }

    pub(crate) fn set_state(&mut self, state: EngineState) {
        if self.state != state {
            log::trace!("engine state {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    /// Print one page from a finished [`BandStore`].
    ///
    /// ## Errors
    ///
    /// Timeouts ([`LbpError::requires_reset`]) and handshake failures. The
    /// caller decides whether to reset.
    pub fn print_page<S>(&mut self, store: &mut BandStore<S>) -> Result<PageReport, LbpError>
    where
        S: Read + Write + Seek,
    {
        log::info!("Sending page...");
        self.run_page(BandSource::Records(store))
    }

    /// Print an empty page: every band of the profile is the white band.
    pub fn print_blank_page(&mut self) -> Result<PageReport, LbpError> {
        let bands = self.printer.bands_per_page();
        log::info!("Sending blank page ({} bands)...", bands);
        let source: BandSource<'_, std::io::Cursor<Vec<u8>>> =
            BandSource::White { remaining: bands };
        self.run_page(source)
    }

    fn run_page<S>(&mut self, mut source: BandSource<'_, S>) -> Result<PageReport, LbpError>
    where
        S: Read + Write + Seek,
    {
        self.set_state(EngineState::Idle);
        let mut cursor = ScriptCursor::new();
        let mut report = PageReport::default();
        let mut inited = false;
        let mut idle_since = self.clock.now();

        loop {
            self.link.cmd_out(0x00)?;

            if !inited && self.clock.now() - idle_since >= self.timings.idle_reset_interval {
                if self
                    .timings
                    .max_idle_resets
                    .is_some_and(|max| report.idle_resets >= max)
                {
                    return Err(LbpError::EngineNotReady {
                        resets: report.idle_resets,
                    });
                }
                log::warn!(
                    "Printer not ready after {:?}, resetting",
                    self.timings.idle_reset_interval
                );
                self.reset()?;
                report.idle_resets += 1;
                idle_since = self.clock.now();
                self.set_state(EngineState::Idle);
            }

            if self.link.cmd_out(0x02)? & 0xf0 != STATUS_NEXT_STEP {
                self.link.sleep_us(micros(self.timings.poll_interval));
                continue;
            }

            if !inited {
                inited = true;
                self.set_state(EngineState::Initializing);
            }

            report.script_steps += 1;
            match cursor.advance() {
                ScriptOp::SingleWrite(data) => self.link.write_cycle(data)?,
                ScriptOp::BlockWrite(bytes) => self.write_block(bytes, report.bands)?,
                ScriptOp::BandTransfer(init) => {
                    let Some(band) = source.next_band()? else {
                        break;
                    };
                    let payload = match &band {
                        Some(bytes) => Payload::Data(bytes),
                        None => Payload::White,
                    };
                    let index = report.bands;
                    log::debug!("Sending band {}...", index);
                    self.transmit_band(index, init, payload, index == 0)?;
                    report.bands += 1;
                }
                ScriptOp::End => {}
            }
        }

        self.set_state(EngineState::PageDone);
        log::info!("Page sent ({} bands)", report.bands);
        Ok(report)
    }

    /// Arm the engine for one band, send it and close it.
    ///
    /// `bounded` selects the failing 15 s tier; otherwise the wait falls back
    /// to waiting for paper. Returns the status that armed the band.
    pub fn transmit_band(
        &mut self,
        band: usize,
        init: BandInit,
        payload: Payload<'_>,
        bounded: bool,
    ) -> Result<u8, LbpError> {
        self.set_state(EngineState::BandWait);
        log::debug!("Initing band {} ({:?}, bounded: {})", band, init, bounded);

        self.band_init(init)?;
        self.arm()?;

        self.link.status_in()?;
        let mut status = self.link.status_in()?;
        if status & 0xf0 != STATUS_ARMED {
            status = self.wait_armed(band, init, bounded)?;
        }
        log::debug!("Band {} inited ({:#04x})", band, status);

        self.set_state(EngineState::BandTransfer);
        match payload {
            Payload::Data(bytes) => {
                for &byte in bytes {
                    self.link.data_out(byte)?;
                }
            }
            Payload::White => {
                for _ in 0..WHITE_PACKET_REPEAT {
                    for &byte in &WHITE_PACKET {
                        self.link.data_out(byte)?;
                    }
                }
                for &byte in &WHITE_TAIL {
                    self.link.data_out(byte)?;
                }
            }
        }

        self.link.check_ctrl(0xc5)?;
        self.link
            .check_cmd_data_out(0x04, 0x89, HANDSHAKE_STATUS, HANDSHAKE_STATUS, CLOSE_SETTLE_US)?;
        self.link.ctrl_out(0x06)?;
        self.link
            .check_cmd_out(0x07, HANDSHAKE_STATUS, HANDSHAKE_STATUS)?;
        self.link
            .check_cmd_out(0x06, HANDSHAKE_STATUS, HANDSHAKE_STATUS)?;
        self.link.ctrl_out(0x06)?;

        Ok(status)
    }

    /// Block write with band-dependent slots filled in for `band`.
    fn write_block(&mut self, bytes: &[DataByte], band: usize) -> Result<(), LbpError> {
        let resolved: Vec<u8> = bytes.iter().map(|b| b.resolve(band)).collect();
        self.link.block_write(&resolved)
    }

    fn band_init(&mut self, init: BandInit) -> Result<(), LbpError> {
        let (expected, mask) = (HANDSHAKE_STATUS, HANDSHAKE_STATUS);
        match init {
            BandInit::Quick => {
                self.link
                    .check_cmd_data_out(0x04, 0xff, expected, mask, INIT_SETTLE_US)?;
            }
            BandInit::Full => {
                self.link.ctrl_out(0x02)?;
                self.link.check_ctrl(0xc2)?;
                self.link
                    .check_cmd_data_out(0x06, 0x80, expected, mask, INIT_SETTLE_US)?;
                self.link.check_cmd_out(0x07, expected, mask)?;
                self.link
                    .check_cmd_data_out(0x06, 0xff, expected, mask, INIT_SETTLE_US)?;
            }
        }
        Ok(())
    }

    fn arm(&mut self) -> Result<(), LbpError> {
        self.link.ctrl_out(0x04)?;
        self.link.ctrl_out(0x05)
    }

    fn wait_armed(&mut self, band: usize, init: BandInit, bounded: bool) -> Result<u8, LbpError> {
        let start = self.clock.now();
        let mut timers = BandTimers {
            tier_start: start,
            last_init: start,
            bounded,
        };
        let mut reinits = 0u32;

        loop {
            self.link.sleep_us(micros(self.timings.poll_interval));
            let mut now = self.clock.now();

            if now - timers.tier_start >= self.timings.ready_timeout {
                let status = self.link.status_in()?;
                if timers.bounded {
                    log::error!("Band {} initialisation failed ({:#04x})", band, status);
                    return Err(LbpError::BandTimeout { band, status });
                }
                log::warn!("Waiting for paper... ({:#04x})", status);
                self.wait_paper(band, timers.tier_start)?;
                now = self.clock.now();
                timers.bounded = true;
                timers.tier_start = now;
            }

            if now - timers.last_init >= self.timings.reinit_interval {
                reinits += 1;
                log::debug!("Reiniting band {} (attempt {})", band, reinits);
                self.link.status_in()?;
                self.band_init(init)?;
                self.arm()?;
                timers.last_init = now;
            }

            let status = self.link.status_in()?;
            if status & 0xf0 == STATUS_ARMED {
                return Ok(status);
            }
        }
    }

    /// Poll until the engine stops reporting "no paper", measured from `since`.
    fn wait_paper(&mut self, band: usize, since: Duration) -> Result<(), LbpError> {
        loop {
            let status = self.link.status_in()?;
            if status & 0xf0 != STATUS_NO_PAPER {
                return Ok(());
            }
            if self.clock.now() - since >= self.timings.paper_timeout {
                log::error!("Timed out waiting for paper ({:#04x})", status);
                return Err(LbpError::PaperTimeout { band, status });
            }
            self.link.sleep_us(micros(self.timings.poll_interval));
        }
    }
}

fn micros(duration: Duration) -> u64 {
    duration.as_micros().min(u64::MAX as u128) as u64
}
