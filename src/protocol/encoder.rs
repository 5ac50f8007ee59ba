//! # Band Encoder
//!
//! Compresses one page of scanlines into band packets.
//!
//! ## Banding
//!
//! A page of `lines_per_page` scanlines is cut into consecutive bands of
//! [`ROWS_PER_BAND`] rows. Only the last band of a page may be shorter:
//!
//! ```text
//! LBP-660: 6968 lines = 67 × 104
//! LBP-460: 3484 lines = 33 × 104 + 52   (last band truncated)
//! ```
//!
//! ## Compression
//!
//! Each band is a flat byte sequence of `rows × line_bytes` bytes, encoded
//! greedily with a one-byte lookahead:
//!
//! - equal neighbours extend a pending run
//! - a broken run becomes `Run(count, value, next_byte)`, split into
//!   maximal runs when it is longer than one packet can hold
//! - two unequal bytes with no run pending start a `Literal` of three bytes
//!
//! The last two to four bytes of a band get dedicated packings so the band
//! ends exactly on a packet boundary: no byte is left over and nothing is read
//! from the next band.
//!
//! ## Output
//!
//! Bands are appended to a page-scoped [`BandStore`]; encoding finishes the
//! whole page before any transfer starts.

use std::io::{BufRead, Read, Seek, Write};

use crate::error::LbpError;
use crate::printer::config::ROWS_PER_BAND;
use crate::protocol::packet::Packet;
use crate::protocol::store::BandStore;
use crate::raster::{PbmHeader, ScanlineReader, read_header};

/// One band of a page, ready to be stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Band {
    /// Position of the band within its page
    pub index: usize,
    /// Scanlines covered (at most [`ROWS_PER_BAND`])
    pub rows: usize,
    /// Short closing band of a multi-band page
    pub truncated: bool,
    pub packets: Vec<Packet>,
}

/// Crop and size settings for [`BandEncoder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Scanlines per page
    pub lines_per_page: usize,
    /// Scanline width in bytes; `None` uses the cropped source width
    pub line_bytes: Option<usize>,
    /// Source rows dropped at the top of every page
    pub top_skip: usize,
    /// Source bits dropped at the left of every row
    pub left_skip: usize,
}

impl EncodeOptions {
    /// Options matching a printer profile, without cropping
    pub fn for_printer(config: &crate::printer::PrinterConfig) -> Self {
        Self {
            lines_per_page: config.lines_per_page,
            line_bytes: Some(config.line_bytes),
            top_skip: 0,
            left_skip: 0,
        }
    }

    /// Scanline width for a page with this header
    pub fn line_bytes_for(&self, header: &PbmHeader) -> usize {
        self.line_bytes
            .unwrap_or_else(|| header.row_bytes().saturating_sub(self.left_skip / 8))
    }
}

/// What [`BandEncoder::encode_page`] produced for one page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSummary {
    pub header: PbmHeader,
    pub line_bytes: usize,
    pub bands: usize,
    pub records: usize,
    pub packets: usize,
}

/// Page-at-a-time packetizer
#[derive(Debug, Clone)]
pub struct BandEncoder {
    options: EncodeOptions,
}

impl BandEncoder {
    pub fn new(options: EncodeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &EncodeOptions {
        &self.options
    }

    /// Encode the next page of `input` into `store`.
    ///
    /// Reads the page header, crops and packetizes `lines_per_page` scanlines,
    /// then skips whatever is left of the source image so `input` is positioned
    /// on the next page. The store is finished (ready for reading) on return.
    ///
    /// ## Returns
    ///
    /// `Ok(None)` when `input` holds no further page.
    ///
    /// ## Errors
    ///
    /// [`LbpError::Format`] for a malformed header; I/O errors from the source
    /// or the store.
    pub fn encode_page<R, S>(
        &self,
        input: &mut R,
        store: &mut BandStore<S>,
    ) -> Result<Option<PageSummary>, LbpError>
    where
        R: BufRead,
        S: Read + Write + Seek,
    {
        let Some(header) = read_header(input)? else {
            return Ok(None);
        };
        let line_bytes = self.options.line_bytes_for(&header);
        log::debug!(
            "page {}x{} ({} bytes/row), {} lines of {} bytes, top skip {}, left skip {}",
            header.width,
            header.height,
            header.row_bytes(),
            self.options.lines_per_page,
            line_bytes,
            self.options.top_skip,
            self.options.left_skip
        );

        let mut lines = ScanlineReader::new(
            input,
            header,
            line_bytes,
            self.options.top_skip,
            self.options.left_skip,
        )?;

        let mut summary = PageSummary {
            header,
            line_bytes,
            bands: 0,
            records: 0,
            packets: 0,
        };

        let lines_per_page = self.options.lines_per_page;
        let mut line = 0;
        while line < lines_per_page {
            let rows = (lines_per_page - line).min(ROWS_PER_BAND);
            let index = summary.bands;

            let mut packets = Vec::new();
            encode_band(rows * line_bytes, || lines.next_byte(), &mut packets)?;

            let band = Band {
                index,
                rows,
                truncated: index > 0 && rows < ROWS_PER_BAND,
                packets,
            };
            log::debug!(
                "band {}: {} rows, {} packets{}",
                band.index,
                band.rows,
                band.packets.len(),
                if band.truncated { " (truncated)" } else { "" }
            );

            summary.packets += band.packets.len();
            summary.records += store.append_band(&band)?;
            summary.bands += 1;
            line += rows;
        }

        lines.finish_page()?;
        store.finish()?;
        Ok(Some(summary))
    }
}

/// Packetize exactly `len` bytes pulled from `next`.
///
/// Never calls `next` more than `len` times. The emitted packets decode to
/// exactly the bytes read.
///
/// ## Errors
///
/// A band of a single byte cannot be expressed in packets and is rejected;
/// errors from `next` are passed through.
pub fn encode_band<F>(len: usize, mut next: F, out: &mut Vec<Packet>) -> Result<(), LbpError>
where
    F: FnMut() -> Result<u8, LbpError>,
{
    match len {
        0 => return Ok(()),
        1 => {
            return Err(LbpError::Format(
                "a band of a single byte cannot be packetized".into(),
            ));
        }
        _ => {}
    }

    let mut c1 = next()?;
    let mut c2 = next()?;
    // bytes of the band not yet covered by a packet: the pending run of c1,
    // the held byte c2 (counted as one together with the run) and the unread
    // remainder
    let mut left = len;
    // copies of c1 in the pending run
    let mut pcnt: usize = 1;

    loop {
        if c1 == c2 && left > 2 {
            pcnt += 1;
            c2 = next()?;
            left -= 1;
            continue;
        }

        match left {
            2 => {
                let rest = pcnt_tail(out, c1, pcnt, 258, 256);
                out.push(Packet::run(rest, c1, c2));
                return Ok(());
            }
            3 | 4 => {
                if pcnt > 1 {
                    let rest = pcnt_tail(out, c1, pcnt, 259, 257);
                    out.push(Packet::run(rest as u16 - 1, c1, c1));
                    let c3 = next()?;
                    if left == 3 {
                        out.push(Packet::run(1, c2, c3));
                    } else {
                        let c4 = next()?;
                        out.push(Packet::literal(c2, c3, c4));
                    }
                } else {
                    let c3 = next()?;
                    if left == 3 {
                        out.push(Packet::literal(c1, c2, c3));
                    } else {
                        out.push(Packet::run(1, c1, c2));
                        let c4 = next()?;
                        out.push(Packet::run(1, c3, c4));
                    }
                }
                return Ok(());
            }
            _ => {
                if pcnt > 1 {
                    let rest = pcnt_tail(out, c1, pcnt, 258, 256);
                    out.push(Packet::run(rest, c1, c2));
                    pcnt = 1;
                    c1 = next()?;
                    c2 = next()?;
                    left -= 2;
                } else {
                    let c3 = next()?;
                    out.push(Packet::literal(c1, c2, c3));
                    c1 = next()?;
                    c2 = next()?;
                    left -= 3;
                }
            }
        }
    }
}

/// Emit maximal `Run(256, v, v)` packets (257 bytes each) while more than
/// `whole_above` copies remain, then one `Run(254, v, v)` if more than
/// `short_above` remain. Returns the copies left for the closing packet.
///
/// The two thresholds keep the residual in range for the packet that follows:
/// a closing `Run(n, v, trailer)` needs `1..=256` copies, a closing
/// `Run(n - 1, v, v)` needs `2..=257`.
fn pcnt_tail(
    out: &mut Vec<Packet>,
    value: u8,
    mut pcnt: usize,
    whole_above: usize,
    short_above: usize,
) -> u16 {
    while pcnt > whole_above {
        out.push(Packet::run(256, value, value));
        pcnt -= 257;
    }
    if pcnt > short_above {
        out.push(Packet::run(254, value, value));
        pcnt -= 255;
    }
    pcnt as u16
}
