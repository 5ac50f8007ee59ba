//! # Band Store
//!
//! Page-scoped buffer of encoded band records. A whole page is encoded into
//! the store before transmission starts, then the records are read back in
//! order while the engine asks for bands.
//!
//! ## Record Framing
//!
//! ```text
//! ┌──────────────────────── u32 LE ─────────────────────────┐
//! │ bits 0..11: packet count │ bit 16: truncated │ rest: 0  │ packets × 4 bytes
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! A band with more than [`MAX_RECORD_PACKETS`] packets is split over several
//! records; every record but the last carries the truncated flag.
//!
//! The backing is anything seekable: an in-memory cursor for tests and
//! previews, a temporary file for printing.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use crate::error::LbpError;
use crate::printer::config::MAX_RECORD_PACKETS;
use crate::protocol::encoder::Band;
use crate::protocol::packet::{PACKET_BYTES, Packet};

const COUNT_MASK: u32 = 0x0FFF;
const TRUNCATED_BIT: u32 = 1 << 16;

/// One record read back from a [`BandStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandRecord {
    pub packets: usize,
    pub truncated: bool,
    /// `packets × 4` wire bytes
    pub payload: Vec<u8>,
}

/// Append-then-read store of band records
pub struct BandStore<S = Cursor<Vec<u8>>> {
    backing: S,
    records: usize,
    reading: bool,
}

impl BandStore<Cursor<Vec<u8>>> {
    pub fn in_memory() -> Self {
        Self::with_backing(Cursor::new(Vec::new()))
    }
}

impl BandStore<File> {
    /// Store backed by an anonymous temporary file.
    pub fn scratch() -> Result<Self, LbpError> {
        let file = tempfile::tempfile()
            .map_err(|e| LbpError::Store(format!("Could not create scratch file: {}", e)))?;
        Ok(Self::with_backing(file))
    }
}

impl<S: Read + Write + Seek> BandStore<S> {
    /// Wrap an empty, writable backing.
    pub fn with_backing(backing: S) -> Self {
        Self {
            backing,
            records: 0,
            reading: false,
        }
    }

    /// Records written so far
    pub fn record_count(&self) -> usize {
        self.records
    }

    /// Write one record. `packets` must not exceed [`MAX_RECORD_PACKETS`].
    pub fn append_record(&mut self, packets: &[Packet], truncated: bool) -> Result<(), LbpError> {
        if self.reading {
            return Err(LbpError::Store("Store already finished".into()));
        }
        if packets.len() > MAX_RECORD_PACKETS {
            return Err(LbpError::Store(format!(
                "{} packets do not fit in one record",
                packets.len()
            )));
        }

        let mut header = packets.len() as u32 & COUNT_MASK;
        if truncated {
            header |= TRUNCATED_BIT;
        }

        let mut buf = Vec::with_capacity(4 + packets.len() * PACKET_BYTES);
        buf.extend_from_slice(&header.to_le_bytes());
        for packet in packets {
            buf.extend_from_slice(&packet.encode());
        }
        self.backing.write_all(&buf)?;
        self.records += 1;
        Ok(())
    }

    /// Write a band, splitting it at the record packet limit.
    ///
    /// Returns the number of records written.
    pub fn append_band(&mut self, band: &Band) -> Result<usize, LbpError> {
        if band.packets.is_empty() {
            self.append_record(&[], band.truncated)?;
            return Ok(1);
        }

        let chunks = band.packets.len().div_ceil(MAX_RECORD_PACKETS);
        for (i, chunk) in band.packets.chunks(MAX_RECORD_PACKETS).enumerate() {
            let last = i + 1 == chunks;
            if !last {
                log::debug!(
                    "band {}: record {} full at {} packets",
                    band.index,
                    i,
                    chunk.len()
                );
            }
            self.append_record(chunk, !last || band.truncated)?;
        }
        Ok(chunks)
    }

    /// Stop appending and position the store on its first record.
    pub fn finish(&mut self) -> Result<(), LbpError> {
        self.backing.flush()?;
        self.rewind()?;
        self.reading = true;
        Ok(())
    }

    /// Go back to the first record (after [`Self::finish`]).
    pub fn rewind(&mut self) -> Result<(), LbpError> {
        self.backing.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    /// Read the next record, or `None` after the last one.
    pub fn next_record(&mut self) -> Result<Option<BandRecord>, LbpError> {
        if !self.reading {
            self.finish()?;
        }

        let mut header = [0u8; 4];
        let got = read_full(&mut self.backing, &mut header)?;
        if got == 0 {
            return Ok(None);
        }
        if got < header.len() {
            return Err(LbpError::Store(format!(
                "Truncated record header ({} of 4 bytes)",
                got
            )));
        }

        let header = u32::from_le_bytes(header);
        let packets = (header & COUNT_MASK) as usize;
        let truncated = header & TRUNCATED_BIT != 0;

        let mut payload = vec![0u8; packets * PACKET_BYTES];
        let got = read_full(&mut self.backing, &mut payload)?;
        if got < payload.len() {
            return Err(LbpError::Store(format!(
                "Record of {} packets ends after {} bytes",
                packets, got
            )));
        }

        Ok(Some(BandRecord {
            packets,
            truncated,
            payload,
        }))
    }

    /// Give back the backing
    pub fn into_inner(self) -> S {
        self.backing
    }
}

/// Read until `buf` is full or the backing ends; returns the bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn band(packets: Vec<Packet>, truncated: bool) -> Band {
        Band {
            index: 0,
            rows: 104,
            truncated,
            packets,
        }
    }

    #[test]
    fn test_record_header_layout() {
        let mut store = BandStore::in_memory();
        store
            .append_record(&[Packet::literal(1, 2, 3), Packet::run(4, 0, 0)], true)
            .unwrap();
        let bytes = store.into_inner().into_inner();
        assert_eq!(&bytes[..4], &[0x02, 0x00, 0x01, 0x00]);
        assert_eq!(bytes.len(), 4 + 2 * PACKET_BYTES);
        assert_eq!(&bytes[4..8], &Packet::literal(1, 2, 3).encode());
    }

    #[test]
    fn test_records_read_back_in_order() {
        let mut store = BandStore::in_memory();
        store.append_band(&band(vec![Packet::literal(1, 1, 1)], false)).unwrap();
        store
            .append_band(&band(vec![Packet::run(2, 9, 9), Packet::run(1, 0, 0)], true))
            .unwrap();
        store.finish().unwrap();
        assert_eq!(store.record_count(), 2);

        let first = store.next_record().unwrap().unwrap();
        assert_eq!(first.packets, 1);
        assert!(!first.truncated);
        let second = store.next_record().unwrap().unwrap();
        assert_eq!(second.packets, 2);
        assert!(second.truncated);
        assert_eq!(store.next_record().unwrap(), None);

        store.rewind().unwrap();
        assert_eq!(store.next_record().unwrap(), Some(first));
    }

    #[test]
    fn test_large_band_is_split() {
        let packets = vec![Packet::literal(0xAA, 0x55, 0xAA); MAX_RECORD_PACKETS * 2 + 10];
        let mut store = BandStore::in_memory();
        assert_eq!(store.append_band(&band(packets, false)).unwrap(), 3);

        let flags: Vec<(usize, bool)> = std::iter::from_fn(|| store.next_record().unwrap())
            .map(|r| (r.packets, r.truncated))
            .collect();
        assert_eq!(
            flags,
            vec![
                (MAX_RECORD_PACKETS, true),
                (MAX_RECORD_PACKETS, true),
                (10, false)
            ]
        );
    }

    #[test]
    fn test_exactly_full_band_is_one_record() {
        let packets = vec![Packet::run(1, 0, 0); MAX_RECORD_PACKETS];
        let mut store = BandStore::in_memory();
        assert_eq!(store.append_band(&band(packets, false)).unwrap(), 1);
        let record = store.next_record().unwrap().unwrap();
        assert_eq!(record.packets, MAX_RECORD_PACKETS);
        assert!(!record.truncated);
    }

    #[test]
    fn test_append_after_finish_fails() {
        let mut store = BandStore::in_memory();
        store.finish().unwrap();
        assert!(store.append_record(&[], false).is_err());
    }

    #[test]
    fn test_oversized_record_rejected() {
        let mut store = BandStore::in_memory();
        let packets = vec![Packet::literal(0, 0, 0); MAX_RECORD_PACKETS + 1];
        assert!(matches!(
            store.append_record(&packets, false),
            Err(LbpError::Store(_))
        ));
    }

    #[test]
    fn test_torn_record_is_an_error() {
        let mut bytes = 3u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&Packet::literal(1, 2, 3).encode());
        let mut store = BandStore::with_backing(Cursor::new(bytes));
        store.finish().unwrap();
        assert!(matches!(store.next_record(), Err(LbpError::Store(_))));
    }

    #[test]
    fn test_scratch_file_store() {
        let mut store = BandStore::scratch().unwrap();
        store.append_band(&band(vec![Packet::run(256, 0, 0)], false)).unwrap();
        store.finish().unwrap();
        let record = store.next_record().unwrap().unwrap();
        assert_eq!(&record.payload[..], &crate::protocol::packet::WHITE_PACKET[..]);
    }
}
