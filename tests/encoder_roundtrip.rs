//! # Encoder Round Trips
//!
//! Whole documents through the band encoder and back through the preview
//! decoder, at real printer geometries.

use lbp660::PrinterConfig;
use lbp660::preview::decode_page;
use lbp660::printer::ROWS_PER_BAND;
use lbp660::printer::config::MAX_RECORD_PACKETS;
use lbp660::protocol::{BandEncoder, BandStore, EncodeOptions};
use pretty_assertions::assert_eq;

/// A P4 page whose rows are a simple position-dependent pattern
fn pbm_page(width: usize, height: usize, seed: u8) -> (Vec<u8>, Vec<Vec<u8>>) {
    let row_bytes = width.div_ceil(8);
    let rows: Vec<Vec<u8>> = (0..height)
        .map(|y| {
            (0..row_bytes)
                .map(|x| match (y / 7 + x / 5) % 3 {
                    0 => 0x00,
                    1 => 0xff,
                    _ => (x as u8).wrapping_mul(31).wrapping_add(seed ^ y as u8),
                })
                .collect()
        })
        .collect();

    let mut doc = format!("P4\n# page {}\n{} {}\n", seed, width, height).into_bytes();
    for row in &rows {
        doc.extend(row);
    }
    (doc, rows)
}

#[test]
fn test_lbp460_document() {
    let config = PrinterConfig::LBP460;
    let encoder = BandEncoder::new(EncodeOptions::for_printer(&config));

    let (first, first_rows) = pbm_page(4960, 300, 1);
    let (second, second_rows) = pbm_page(1000, 20, 2);
    let doc = [first, second].concat();
    let mut input = &doc[..];

    for rows in [first_rows, second_rows] {
        let mut store = BandStore::in_memory();
        let summary = encoder.encode_page(&mut input, &mut store).unwrap().unwrap();
        assert_eq!(summary.bands, config.bands_per_page());
        assert_eq!(summary.line_bytes, config.line_bytes);

        let page = decode_page(&mut store, summary.line_bytes).unwrap();
        assert_eq!(page.lines, config.lines_per_page);

        for (y, row) in rows.iter().enumerate() {
            let line = &page.data[y * config.line_bytes..(y + 1) * config.line_bytes];
            let kept = row.len().min(config.line_bytes);
            assert_eq!(&line[..kept], &row[..kept], "row {}", y);
            assert!(line[kept..].iter().all(|&b| b == 0), "row {} padding", y);
        }
        let blank_from = rows.len() * config.line_bytes;
        assert!(page.data[blank_from..].iter().all(|&b| b == 0));
    }

    let mut store = BandStore::in_memory();
    assert!(encoder.encode_page(&mut input, &mut store).unwrap().is_none());
}

#[test]
fn test_last_band_record_is_truncated() {
    let config = PrinterConfig::LBP460;
    let encoder = BandEncoder::new(EncodeOptions::for_printer(&config));
    let (doc, _) = pbm_page(64, 10, 3);
    let mut input = &doc[..];

    let mut store = BandStore::in_memory();
    encoder.encode_page(&mut input, &mut store).unwrap().unwrap();

    let mut flags = Vec::new();
    while let Some(record) = store.next_record().unwrap() {
        flags.push(record.truncated);
    }
    assert_eq!(flags.len(), config.bands_per_page());
    assert_eq!(config.last_band_rows(), ROWS_PER_BAND / 2);
    assert!(flags[..flags.len() - 1].iter().all(|&t| !t));
    assert_eq!(flags.last(), Some(&true));
}

#[test]
fn test_lbp660_busy_page_splits_at_packet_cap() {
    let config = PrinterConfig::LBP660;
    let encoder = BandEncoder::new(EncodeOptions::for_printer(&config));
    let (doc, _) = pbm_page(4960, 7016, 4);
    let mut input = &doc[..];

    let mut store = BandStore::in_memory();
    let summary = encoder.encode_page(&mut input, &mut store).unwrap().unwrap();
    assert_eq!(summary.bands, 67);

    // only a record cut at the packet cap is continued by the next one
    let mut records = 0;
    let mut band_ends = 0;
    while let Some(record) = store.next_record().unwrap() {
        if record.truncated {
            assert_eq!(record.packets, MAX_RECORD_PACKETS);
        } else {
            band_ends += 1;
        }
        records += 1;
    }
    assert_eq!(records, summary.records);
    assert!(records > summary.bands);
    assert_eq!(band_ends, summary.bands);

    // the source was taller than the page; nothing of it is left over
    assert!(input.is_empty());
}

#[test]
fn test_lbp660_sparse_page_has_one_record_per_band() {
    let config = PrinterConfig::LBP660;
    let encoder = BandEncoder::new(EncodeOptions::for_printer(&config));
    let mut doc = b"P4\n4960 100\n".to_vec();
    let mut row = vec![0u8; 620];
    row[10] = 0x81;
    row[300] = 0xf0;
    for _ in 0..100 {
        doc.extend(&row);
    }
    let mut input = &doc[..];

    let mut store = BandStore::in_memory();
    let summary = encoder.encode_page(&mut input, &mut store).unwrap().unwrap();
    assert_eq!(summary.bands, 67);
    assert_eq!(summary.records, 67);

    let mut records = 0;
    while let Some(record) = store.next_record().unwrap() {
        assert!(!record.truncated);
        assert!(record.packets < MAX_RECORD_PACKETS);
        records += 1;
    }
    assert_eq!(records, 67);
}

#[test]
fn test_cropping_matches_source_window() {
    let (doc, rows) = pbm_page(128, 40, 5);
    let options = EncodeOptions {
        lines_per_page: 20,
        line_bytes: Some(8),
        top_skip: 10,
        left_skip: 32,
    };
    let mut input = &doc[..];
    let mut store = BandStore::in_memory();
    BandEncoder::new(options)
        .encode_page(&mut input, &mut store)
        .unwrap()
        .unwrap();

    let page = decode_page(&mut store, 8).unwrap();
    assert_eq!(page.lines, 20);
    for y in 0..20 {
        assert_eq!(&page.data[y * 8..y * 8 + 8], &rows[y + 10][4..12], "row {}", y);
    }
}
