//! # Printer Module
//!
//! This module provides printer-specific configurations.
//!
//! ## Modules
//!
//! - [`config`]: Page geometry and engine constants

pub mod config;

pub use config::{PrinterConfig, ROWS_PER_BAND};
