//! # Raster Input
//!
//! Reading monochrome pages from a forward-only byte stream.
//!
//! - [`pbm`]: page header parsing
//! - [`scanline`]: cropped, fixed-width scanlines with white fill

pub mod pbm;
pub mod scanline;

pub use pbm::{PbmHeader, read_header};
pub use scanline::ScanlineReader;
