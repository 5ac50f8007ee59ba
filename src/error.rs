//! # Error Types
//!
//! This module defines error types used throughout the lbp660 library.
//!
//! ## Severity Tiers
//!
//! | Tier | Variants | Caller action |
//! |------|----------|---------------|
//! | Reset | `BandTimeout`, `PaperTimeout`, `EngineNotReady` | Full engine reset, then abort the document |
//! | Fatal | everything else | Abort immediately, engine state is unknown |
//!
//! A failed handshake checkpoint is always fatal: once the engine answers with
//! an unexpected control or status pattern there is no way to tell which
//! internal state it is in.

use thiserror::Error;

/// Main error type for lbp660 operations
#[derive(Debug, Error)]
pub enum LbpError {
    /// Malformed raster input (bad magic, unparsable dimensions)
    #[error("Format error: {0}")]
    Format(String),

    /// Port access errors (privilege, missing device node)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The control register did not read back what was written
    #[error("Wrong control: {actual:#04x} instead of {expected:#04x}")]
    ControlMismatch { expected: u8, actual: u8 },

    /// The status register did not match the expected pattern under its mask
    #[error("Wrong status ({context}): {actual:#04x} instead of {expected:#04x} (mask {mask:#04x})")]
    StatusMismatch {
        context: &'static str,
        expected: u8,
        actual: u8,
        mask: u8,
    },

    /// The engine answered the reset probe with an unknown code
    #[error("Reset failed, error code {status:#04x}")]
    ResetFailed { status: u8 },

    /// The engine answered the reset probe with the "no cable" code
    #[error("Reset failed, check cables")]
    CableFault,

    /// A band did not become ready within the bounded tier
    #[error("Band {band} initialisation failed (status {status:#04x})")]
    BandTimeout { band: usize, status: u8 },

    /// The paper-wait tier ran out
    #[error("Timed out waiting for paper on band {band} (status {status:#04x})")]
    PaperTimeout { band: usize, status: u8 },

    /// The engine never reported ready for the page
    #[error("Engine not ready after {resets} resets")]
    EngineNotReady { resets: u32 },

    /// Corrupt or inconsistent band store contents
    #[error("Band store error: {0}")]
    Store(String),

    /// Printer profile lookup failed
    #[error("Unknown printer '{0}'. Use 'lbp660' or 'lbp460'")]
    UnknownPrinter(String),

    /// Preview image errors
    #[error("Image error: {0}")]
    Image(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LbpError {
    /// Whether this failure leaves the engine recoverable by a full reset.
    ///
    /// Timeouts mean the engine never armed for the band; its band counter is
    /// out of step with ours but its handshake state is still known, so a
    /// reset brings it back. Handshake mismatches do not qualify.
    pub fn requires_reset(&self) -> bool {
        matches!(
            self,
            Self::BandTimeout { .. } | Self::PaperTimeout { .. } | Self::EngineNotReady { .. }
        )
    }
}
