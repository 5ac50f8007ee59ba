//! # Forward-Only Scanline Reader
//!
//! Turns the pixel rows of one page into engine scanlines of a fixed width.
//!
//! ## Cropping
//!
//! ```text
//!            left_skip bits
//!            ├──┤
//! source row │░░│████████████████████████│░░░░│
//!               ├──── line_bytes × 8 ────┤
//!                       engine line
//! ```
//!
//! - `top_skip` rows are read and thrown away before the first line
//! - `left_skip` bits are dropped from the front of every row (bit precise)
//! - rows narrower than the engine line are padded with white (zero) bytes
//! - lines past the end of the image, or past the end of the stream, are
//!   entirely white
//!
//! ## No Seeking
//!
//! The source may be a pipe, so nothing here ever seeks. Skipping is done by
//! reading into a sink, and [`ScanlineReader::finish_page`] drains the rows of
//! the image that the page did not use so the next header lines up.

use std::io::{self, Read};

use crate::error::LbpError;
use crate::raster::pbm::PbmHeader;

/// Widest scanline accepted, in bytes
pub const MAX_LINE_BYTES: usize = 1 << 16;

/// Reads cropped scanlines from one page of a bitmap stream.
pub struct ScanlineReader<'a, R: Read> {
    reader: &'a mut R,
    /// Source rows still available after the top crop
    rows_available: usize,
    /// Source rows actually pulled from the stream
    rows_read: usize,
    /// Lines handed out, white ones included
    lines_emitted: usize,
    row_bytes: usize,
    /// Whole bytes dropped from the front of every row
    lead: usize,
    /// Bits dropped from the first kept byte
    shift: usize,
    /// The part of a source row that can reach the line; the rest is
    /// read past
    window: Vec<u8>,
    line: Vec<u8>,
    /// Next byte of `line` for [`Self::next_byte`]
    cursor: usize,
}

impl<'a, R: Read> ScanlineReader<'a, R> {
    /// Start reading a page whose header has just been parsed.
    ///
    /// ## Parameters
    ///
    /// - `line_bytes`: width of the produced scanlines
    /// - `top_skip`: source rows to discard first
    /// - `left_skip`: bits to drop from the start of every row
    ///
    /// ## Errors
    ///
    /// [`LbpError::Format`] when `line_bytes` exceeds [`MAX_LINE_BYTES`] or
    /// the header describes more bytes than can be addressed.
    pub fn new(
        reader: &'a mut R,
        header: PbmHeader,
        line_bytes: usize,
        top_skip: usize,
        left_skip: usize,
    ) -> Result<Self, LbpError> {
        if line_bytes > MAX_LINE_BYTES {
            return Err(LbpError::Format(format!(
                "Line of {} bytes is wider than {} bytes",
                line_bytes, MAX_LINE_BYTES
            )));
        }

        let row_bytes = header.row_bytes();
        let skipped = top_skip.min(header.height);
        discard(reader, span(skipped, row_bytes)?)?;

        let lead = (left_skip / 8).min(row_bytes);
        // one byte past the line feeds the bit shift
        let window = (line_bytes + 1).min(row_bytes - lead);

        Ok(Self {
            reader,
            rows_available: header.height - skipped,
            rows_read: 0,
            lines_emitted: 0,
            row_bytes,
            lead,
            shift: left_skip % 8,
            window: vec![0; window],
            line: vec![0; line_bytes],
            cursor: line_bytes,
        })
    }

    /// Width of the produced scanlines in bytes
    #[inline]
    pub fn line_bytes(&self) -> usize {
        self.line.len()
    }

    /// Lines produced so far, including synthesized white lines
    #[inline]
    pub fn lines_emitted(&self) -> usize {
        self.lines_emitted
    }

    /// Source rows consumed from the stream so far (after the top crop)
    #[inline]
    pub fn rows_consumed(&self) -> usize {
        self.rows_read
    }

    /// Produce the next cropped scanline.
    pub fn next_row(&mut self) -> Result<&[u8], LbpError> {
        if self.rows_read < self.rows_available {
            let tail = self.row_bytes - self.lead - self.window.len();
            discard(self.reader, self.lead as u64)?;
            read_or_zero(self.reader, &mut self.window)?;
            discard(self.reader, tail as u64)?;
            self.rows_read += 1;
        } else {
            self.window.fill(0);
        }
        self.lines_emitted += 1;

        crop(&self.window, self.shift, &mut self.line);
        self.cursor = self.line.len();
        Ok(&self.line)
    }

    /// Produce the next byte of the scanline stream, starting a new line
    /// whenever the current one is used up.
    pub fn next_byte(&mut self) -> Result<u8, LbpError> {
        if self.cursor >= self.line.len() {
            self.next_row()?;
            self.cursor = 0;
            if self.line.is_empty() {
                return Ok(0);
            }
        }
        let byte = self.line[self.cursor];
        self.cursor += 1;
        Ok(byte)
    }

    /// Discard the rows of the image the page did not consume.
    pub fn finish_page(self) -> Result<(), LbpError> {
        let remaining = self.rows_available - self.rows_read;
        log::debug!(
            "finishing page: {} rows used, skipping {} rows of {} bytes",
            self.rows_read,
            remaining,
            self.row_bytes
        );
        discard(self.reader, span(remaining, self.row_bytes)?)
    }
}

/// Byte length of `rows` source rows
fn span(rows: usize, row_bytes: usize) -> Result<u64, LbpError> {
    rows.checked_mul(row_bytes)
        .and_then(|bytes| u64::try_from(bytes).ok())
        .ok_or_else(|| {
            LbpError::Format(format!(
                "{} rows of {} bytes do not fit in a stream",
                rows, row_bytes
            ))
        })
}

/// Copy `window` into `line` shifted left by `shift` bits, zero padding the
/// tail.
fn crop(window: &[u8], shift: usize, line: &mut [u8]) {
    let src = |i: usize| window.get(i).copied().unwrap_or(0);

    for (i, out) in line.iter_mut().enumerate() {
        *out = if shift == 0 {
            src(i)
        } else {
            (src(i) << shift) | (src(i + 1) >> (8 - shift))
        };
    }
}

/// Fill `buf` from the stream; whatever the stream cannot provide is white.
fn read_or_zero<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    buf[filled..].fill(0);
    Ok(())
}

/// Read and drop `count` bytes. Running out of input early is not an error.
fn discard<R: Read>(reader: &mut R, count: u64) -> Result<(), LbpError> {
    if count > 0 {
        io::copy(&mut reader.take(count), &mut io::sink())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn header(width: usize, height: usize) -> PbmHeader {
        PbmHeader { width, height }
    }

    #[test]
    fn test_rows_are_padded_to_line_width() {
        let mut input = &[0xAA, 0xBB][..];
        let mut reader = ScanlineReader::new(&mut input, header(16, 1), 4, 0, 0).unwrap();
        assert_eq!(reader.next_row().unwrap(), &[0xAA, 0xBB, 0x00, 0x00]);
    }

    #[test]
    fn test_rows_are_cropped_to_line_width() {
        let mut input = &[1, 2, 3, 4, 5, 6][..];
        let mut reader = ScanlineReader::new(&mut input, header(24, 2), 2, 0, 0).unwrap();
        assert_eq!(reader.next_row().unwrap(), &[1, 2]);
        // the rest of the first source row is not leaked into the second line
        assert_eq!(reader.next_row().unwrap(), &[4, 5]);
    }

    #[test]
    fn test_top_skip_discards_rows() {
        let mut input = &[1, 2, 3, 4][..];
        let mut reader = ScanlineReader::new(&mut input, header(8, 4), 1, 2, 0).unwrap();
        assert_eq!(reader.next_row().unwrap(), &[3]);
        assert_eq!(reader.next_row().unwrap(), &[4]);
        // past the image: white
        assert_eq!(reader.next_row().unwrap(), &[0]);
        assert_eq!(reader.lines_emitted(), 3);
        assert_eq!(reader.rows_consumed(), 2);
    }

    #[test]
    fn test_left_skip_whole_bytes() {
        let mut input = &[0x11, 0x22, 0x33][..];
        let mut reader = ScanlineReader::new(&mut input, header(24, 1), 3, 0, 16).unwrap();
        assert_eq!(reader.next_row().unwrap(), &[0x33, 0x00, 0x00]);
    }

    #[test]
    fn test_left_skip_bits() {
        let mut input = &[0b0000_1111, 0b1010_0000][..];
        let mut reader = ScanlineReader::new(&mut input, header(16, 1), 2, 0, 4).unwrap();
        assert_eq!(reader.next_row().unwrap(), &[0b1111_1010, 0b0000_0000]);
    }

    #[test]
    fn test_short_stream_is_white() {
        let mut input = &[0xFF][..];
        let mut reader = ScanlineReader::new(&mut input, header(16, 3), 2, 0, 0).unwrap();
        assert_eq!(reader.next_row().unwrap(), &[0xFF, 0x00]);
        assert_eq!(reader.next_row().unwrap(), &[0x00, 0x00]);
    }

    #[test]
    fn test_next_byte_walks_lines() {
        let mut input = &[1, 2, 3, 4][..];
        let mut reader = ScanlineReader::new(&mut input, header(16, 2), 2, 0, 0).unwrap();
        let bytes: Vec<u8> = (0..6).map(|_| reader.next_byte().unwrap()).collect();
        assert_eq!(bytes, vec![1, 2, 3, 4, 0, 0]);
    }

    #[test]
    fn test_left_skip_past_window_reaches_next_row() {
        // 4-byte rows, 1-byte lines, 2 bytes cropped on the left
        let mut input = &[1, 2, 3, 4, 5, 6, 7, 8][..];
        let mut reader = ScanlineReader::new(&mut input, header(32, 2), 1, 0, 16).unwrap();
        assert_eq!(reader.next_row().unwrap(), &[3]);
        assert_eq!(reader.next_row().unwrap(), &[7]);
        assert!(input.is_empty());
    }

    #[test]
    fn test_huge_width_is_streamed() {
        // the row is never buffered, only the part that reaches the line
        let mut input = &[0xC3, 0x3C, 0xFF][..];
        let mut reader =
            ScanlineReader::new(&mut input, header(usize::MAX, 2), 2, 0, 0).unwrap();
        assert_eq!(reader.next_row().unwrap(), &[0xC3, 0x3C]);
        assert_eq!(reader.next_row().unwrap(), &[0x00, 0x00]);
    }

    #[test]
    fn test_overflowing_skip_is_a_format_error() {
        let mut input = &[0u8; 4][..];
        let result = ScanlineReader::new(&mut input, header(usize::MAX, 16), 2, 9, 0);
        assert!(matches!(result, Err(LbpError::Format(_))));
    }

    #[test]
    fn test_unused_rows_overflowing_is_a_format_error() {
        let mut input = &[0u8; 4][..];
        let reader = ScanlineReader::new(&mut input, header(usize::MAX, 16), 2, 0, 0).unwrap();
        assert!(matches!(reader.finish_page(), Err(LbpError::Format(_))));
    }

    #[test]
    fn test_line_width_is_bounded() {
        let mut input = &[0u8; 0][..];
        let result = ScanlineReader::new(&mut input, header(8, 1), MAX_LINE_BYTES + 1, 0, 0);
        assert!(matches!(result, Err(LbpError::Format(_))));
    }

    #[test]
    fn test_finish_page_skips_unused_rows() {
        let mut input = &b"\x01\x02\x03\x04P4\n"[..];
        let mut reader = ScanlineReader::new(&mut input, header(8, 4), 1, 0, 0).unwrap();
        reader.next_row().unwrap();
        reader.finish_page().unwrap();
        assert_eq!(input, &b"P4\n"[..]);
    }
}
