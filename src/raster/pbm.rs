//! # Raw Bitmap Header
//!
//! Parses the text header of a binary bitmap page (`P4` format).
//!
//! ## Format
//!
//! ```text
//! P4\n                 magic token, alone on its line
//! # comment\n          any number of '#' lines
//! 4960 7016\n          width height, decimal
//! <raw rows>           ceil(width / 8) bytes per row, MSB = leftmost pixel
//! ```
//!
//! The header is consumed line by line from a [`BufRead`], so the reader is
//! left positioned on the first pixel byte. Pages may be concatenated: the
//! next header follows the last row of the previous page.

use std::io::BufRead;

use crate::error::LbpError;

/// Two-character magic token of a binary bitmap
pub const MAGIC: &[u8; 2] = b"P4";

/// Dimensions read from a page header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PbmHeader {
    /// Width in pixels
    pub width: usize,
    /// Height in rows
    pub height: usize,
}

impl PbmHeader {
    /// Bytes per source row (`ceil(width / 8)`)
    #[inline]
    pub fn row_bytes(&self) -> usize {
        self.width.div_ceil(8)
    }
}

/// Read one page header.
///
/// Returns `Ok(None)` when the stream is already exhausted, which is how the
/// end of a multi-page document shows up.
///
/// ## Errors
///
/// [`LbpError::Format`] when the magic token is missing or the dimension line
/// does not hold two integers.
pub fn read_header<R: BufRead>(reader: &mut R) -> Result<Option<PbmHeader>, LbpError> {
    let mut line = Vec::new();
    if reader.read_until(b'\n', &mut line)? == 0 {
        return Ok(None);
    }

    if !line.starts_with(MAGIC) {
        return Err(LbpError::Format(format!(
            "Wrong file format (expected {:?} magic, got {:?})",
            String::from_utf8_lossy(MAGIC),
            String::from_utf8_lossy(&line[..line.len().min(2)])
        )));
    }

    // skip comments
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Err(LbpError::Format("Missing size fields".into()));
        }
        if line.first() != Some(&b'#') {
            break;
        }
    }

    let text = String::from_utf8_lossy(&line);
    let mut fields = text.split_whitespace().map(str::parse::<usize>);
    match (fields.next(), fields.next()) {
        (Some(Ok(width)), Some(Ok(height))) => Ok(Some(PbmHeader { width, height })),
        _ => Err(LbpError::Format(format!(
            "Bitmap file with wrong size fields: {:?}",
            text.trim_end()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufReader, Read};

    #[test]
    fn test_minimal_header() {
        let mut input = &b"P4\n2 2\n\x80"[..];
        let header = read_header(&mut input).unwrap().unwrap();
        assert_eq!(header, PbmHeader { width: 2, height: 2 });
        assert_eq!(header.row_bytes(), 1);
        // reader is left on the pixel data
        assert_eq!(input, &[0x80u8][..]);
    }

    #[test]
    fn test_comments_are_skipped() {
        let mut input = BufReader::new(&b"P4\n# made by pnmtools\n# second\n4961 3\nrest"[..]);
        let header = read_header(&mut input).unwrap().unwrap();
        assert_eq!(header.width, 4961);
        assert_eq!(header.row_bytes(), 621);

        let mut rest = String::new();
        input.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "rest");
    }

    #[test]
    fn test_empty_stream_is_end_of_document() {
        let mut input = &b""[..];
        assert_eq!(read_header(&mut input).unwrap(), None);
    }

    #[test]
    fn test_wrong_magic() {
        let mut input = &b"P1\n2 2\n"[..];
        assert!(matches!(read_header(&mut input), Err(LbpError::Format(_))));
    }

    #[test]
    fn test_bad_dimensions() {
        let mut input = &b"P4\n2\n"[..];
        assert!(matches!(read_header(&mut input), Err(LbpError::Format(_))));

        let mut input = &b"P4\nwide tall\n"[..];
        assert!(matches!(read_header(&mut input), Err(LbpError::Format(_))));
    }

    #[test]
    fn test_truncated_after_magic() {
        let mut input = &b"P4\n"[..];
        assert!(matches!(read_header(&mut input), Err(LbpError::Format(_))));
    }
}
