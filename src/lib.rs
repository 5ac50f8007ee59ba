//! # lbp660 - Canon LBP-660 / LBP-460 Driver Library
//!
//! lbp660 prints monochrome bitmaps on Canon LBP-660 and LBP-460 laser
//! printers. These engines have no page description language: the host
//! compresses the page and feeds it band by band over the parallel port,
//! driving every handshake itself. It provides:
//!
//! - **Raster input**: bitmap pages read forward-only, cropped and padded
//! - **Band encoding**: the engine's run-length packet format
//! - **Protocol engine**: page scripts, band transfer, paper waits, reset
//! - **Transport**: the PC parallel port, plus a simulated port for tests
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::io::{self, BufReader};
//!
//! use lbp660::{
//!     printer::PrinterConfig,
//!     protocol::{BandEncoder, BandStore, EncodeOptions, ProtocolEngine},
//!     transport::{MonotonicClock, ParallelPort, PortBackend},
//! };
//!
//! let config = PrinterConfig::LBP660;
//! let port = ParallelPort::open(0x378, PortBackend::DevPort)?;
//! let mut engine = ProtocolEngine::new(port, MonotonicClock::new(), config);
//!
//! let encoder = BandEncoder::new(EncodeOptions::for_printer(&config));
//! let mut input = BufReader::new(io::stdin());
//!
//! loop {
//!     let mut store = BandStore::scratch()?;
//!     if encoder.encode_page(&mut input, &mut store)?.is_none() {
//!         break;
//!     }
//!     engine.print_page(&mut store)?;
//! }
//! # Ok::<(), lbp660::error::LbpError>(())
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`raster`] | Bitmap header parsing and scanline cropping |
//! | [`protocol`] | Packet codec, band encoder, store, scripts, engine |
//! | [`transport`] | Port register access (real and simulated) |
//! | [`printer`] | Printer profiles |
//! | [`preview`] | Decoding encoded pages back to PNG |
//! | [`error`] | Error types |
//!
//! ## Supported Printers
//!
//! - Canon LBP-660 (600x600 DPI)
//! - Canon LBP-460 (600x300 DPI)

pub mod error;
pub mod preview;
pub mod printer;
pub mod protocol;
pub mod raster;
pub mod transport;

// Re-exports for convenience
pub use error::LbpError;
pub use printer::PrinterConfig;
pub use protocol::{BandEncoder, BandStore, ProtocolEngine};
