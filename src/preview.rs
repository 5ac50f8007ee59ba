//! # Page Preview
//!
//! Decodes an encoded page back into a bitmap, so the packetizer can be
//! checked without a printer (`--simulate --png page.png`).

use std::io::{Read, Seek, Write};
use std::path::Path;

use image::{GrayImage, Luma};

use crate::error::LbpError;
use crate::protocol::BandStore;
use crate::protocol::packet::decode_payload;

/// A page rebuilt from its band records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPage {
    /// Scanline width in bytes
    pub line_bytes: usize,
    /// Number of complete scanlines
    pub lines: usize,
    /// `lines × line_bytes` bytes, MSB = leftmost dot
    pub data: Vec<u8>,
}

impl DecodedPage {
    pub fn width_dots(&self) -> usize {
        self.line_bytes * 8
    }

    /// Fraction of dots that are black
    pub fn coverage(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        let black: u64 = self.data.iter().map(|b| b.count_ones() as u64).sum();
        black as f64 / (self.data.len() as f64 * 8.0)
    }
}

/// Decode every record of `store` from the start.
pub fn decode_page<S>(store: &mut BandStore<S>, line_bytes: usize) -> Result<DecodedPage, LbpError>
where
    S: Read + Write + Seek,
{
    if line_bytes == 0 {
        return Err(LbpError::Image("Line width must not be zero".into()));
    }

    store.rewind()?;
    let mut data = Vec::new();
    while let Some(record) = store.next_record()? {
        data.extend(decode_payload(&record.payload)?);
    }
    store.rewind()?;

    let lines = data.len() / line_bytes;
    data.truncate(lines * line_bytes);
    Ok(DecodedPage {
        line_bytes,
        lines,
        data,
    })
}

/// Write the page as a black-on-white PNG.
pub fn save_png<P: AsRef<Path>>(path: P, page: &DecodedPage) -> Result<(), LbpError> {
    let width = page.width_dots();
    let mut img = GrayImage::new(width as u32, page.lines as u32);

    for y in 0..page.lines {
        let row = &page.data[y * page.line_bytes..(y + 1) * page.line_bytes];
        for x in 0..width {
            let is_black = (row[x / 8] >> (7 - (x % 8))) & 1 == 1;
            let color = if is_black { 0u8 } else { 255u8 };
            img.put_pixel(x as u32, y as u32, Luma([color]));
        }
    }

    img.save(path.as_ref())
        .map_err(|e| LbpError::Image(format!("Failed to save PNG: {}", e)))?;
    Ok(())
}
