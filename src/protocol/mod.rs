//! # LBP Engine Protocol
//!
//! Everything between a bitmap page and the port registers.
//!
//! ## Module Structure
//!
//! - [`packet`]: the 4-byte band packet codec
//! - [`encoder`]: page banding and run-length packetizing
//! - [`store`]: page-scoped band record buffer
//! - [`script`]: the fixed page and band command scripts
//! - [`link`]: handshake cycles on the control, status and data registers
//! - [`engine`]: the page state machine, band transfer and wait tiers
//! - [`reset`]: the engine reset sequence
//!
//! ## Usage Example
//!
//! ```
//! use lbp660::printer::PrinterConfig;
//! use lbp660::protocol::{BandEncoder, BandStore, EncodeOptions, ProtocolEngine};
//! use lbp660::transport::{SimClock, SimulatedPort};
//!
//! // Encode one page
//! let options = EncodeOptions {
//!     lines_per_page: 208,
//!     line_bytes: Some(4),
//!     top_skip: 0,
//!     left_skip: 0,
//! };
//! let mut input = &b"P4\n32 1\n\xff\xff\xff\xff"[..];
//! let mut store = BandStore::in_memory();
//! let summary = BandEncoder::new(options)
//!     .encode_page(&mut input, &mut store)?
//!     .expect("one page");
//! assert_eq!(summary.bands, 2);
//!
//! // Send it to a simulated engine
//! let clock = SimClock::new();
//! let port = SimulatedPort::always_ready(clock.clone());
//! let mut engine = ProtocolEngine::new(port, clock, PrinterConfig::LBP660);
//! let report = engine.print_page(&mut store)?;
//! assert_eq!(report.bands, 2);
//! # Ok::<(), lbp660::error::LbpError>(())
//! ```

pub mod encoder;
pub mod engine;
pub mod link;
pub mod packet;
pub mod reset;
pub mod script;
pub mod store;

pub use encoder::{Band, BandEncoder, EncodeOptions, PageSummary, encode_band};
pub use engine::{EngineState, EngineTimings, PageReport, Payload, ProtocolEngine};
pub use link::Link;
pub use packet::Packet;
pub use script::{BAND_INIT_SCRIPT, BandInit, DataByte, PAGE_SCRIPT, ScriptCursor, ScriptOp};
pub use store::{BandRecord, BandStore};
