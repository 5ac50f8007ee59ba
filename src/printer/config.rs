//! # Printer Configuration
//!
//! This module defines the page geometry of the supported laser engines.
//!
//! ## Supported Printers
//!
//! | Model | Resolution | Lines per page | Line width | Bands per page |
//! |-------|------------|----------------|------------|----------------|
//! | LBP-660 | 600x600 DPI | 6968 | 600 bytes | 67 |
//! | LBP-460 | 600x300 DPI | 3484 | 600 bytes | 34 (last one half height) |
//!
//! Both models share the same engine firmware, so everything except the page
//! height is common: the band height, the line width and the parallel port
//! register layout.
//!
//! ## Usage
//!
//! ```
//! use lbp660::printer::PrinterConfig;
//!
//! let config = PrinterConfig::LBP660;
//! println!("{} lines per page in {} bands",
//!          config.lines_per_page,
//!          config.bands_per_page());
//! ```

use crate::error::LbpError;

/// Scanlines carried by one band transfer.
///
/// The engine firmware counts bands, not lines: every band except possibly the
/// last of a page holds exactly this many rows.
pub const ROWS_PER_BAND: usize = 104;

/// Bytes per engine scanline (4800 dots at 600 DPI).
pub const LINE_BYTES: usize = 600;

/// Largest packet count a band record can announce (12-bit size field).
pub const MAX_RECORD_PACKETS: usize = 0x0FFF;

/// Default parallel port base address (data register).
pub const DEFAULT_PORT_BASE: u16 = 0x378;

/// # Printer Configuration
///
/// Defines the page geometry of one engine profile.
///
/// ## Physical Properties
///
/// - **lines_per_page**: Scanlines sent for every page, regardless of the
///   height of the source image
/// - **line_bytes**: Bytes per scanline fed to the band encoder
/// - **dpi**: Horizontal and vertical resolution
///
/// ## Start-up
///
/// - **reset_on_start**: Whether the engine must be reset before the first
///   page even when no reset was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrinterConfig {
    /// Printer model name
    pub name: &'static str,

    /// Short identifier accepted on the command line
    pub id: &'static str,

    /// Page height in scanlines
    pub lines_per_page: usize,

    /// Scanline width in bytes
    pub line_bytes: usize,

    /// Resolution (horizontal, vertical) in dots per inch
    pub dpi: (u16, u16),

    /// Reset the engine before printing even without `--reset`
    pub reset_on_start: bool,
}

impl PrinterConfig {
    /// # Canon LBP-660
    ///
    /// A4 laser printer, 600x600 DPI. The page is exactly 67 full bands.
    pub const LBP660: Self = Self {
        name: "LBP-660",
        id: "lbp660",
        lines_per_page: 6968,
        line_bytes: LINE_BYTES,
        dpi: (600, 600),
        reset_on_start: false,
    };

    /// # Canon LBP-460
    ///
    /// Same engine at half vertical resolution (600x300 DPI). The page ends
    /// with a half band, and the engine needs a reset before it accepts the
    /// first page.
    pub const LBP460: Self = Self {
        name: "LBP-460",
        id: "lbp460",
        lines_per_page: 3484,
        line_bytes: LINE_BYTES,
        dpi: (600, 300),
        reset_on_start: true,
    };

    /// List all built-in profiles.
    pub fn built_in() -> &'static [Self] {
        &[Self::LBP660, Self::LBP460]
    }

    /// Look up a profile by its display name (e.g. `"LBP-660"`).
    pub fn by_name(name: &str) -> Option<Self> {
        Self::built_in().iter().copied().find(|p| p.name == name)
    }

    /// Parse a profile string (CLI args or display name).
    ///
    /// Accepts the display name (`"LBP-460"`) or the short id in any case
    /// (`"lbp460"`).
    pub fn parse(s: &str) -> Result<Self, LbpError> {
        if let Some(profile) = Self::by_name(s) {
            return Ok(profile);
        }

        let wanted = s.to_lowercase();
        Self::built_in()
            .iter()
            .copied()
            .find(|p| p.id == wanted)
            .ok_or_else(|| LbpError::UnknownPrinter(s.to_string()))
    }

    /// Number of band transfers needed for one page
    #[inline]
    pub fn bands_per_page(&self) -> usize {
        self.lines_per_page.div_ceil(ROWS_PER_BAND)
    }

    /// Rows in the last band of a page
    #[inline]
    pub fn last_band_rows(&self) -> usize {
        match self.lines_per_page % ROWS_PER_BAND {
            0 => ROWS_PER_BAND,
            rows => rows,
        }
    }
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self::LBP660
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lbp660_is_whole_bands() {
        let config = PrinterConfig::LBP660;
        assert_eq!(config.bands_per_page(), 67);
        assert_eq!(config.last_band_rows(), ROWS_PER_BAND);
    }

    #[test]
    fn test_lbp460_ends_with_half_band() {
        let config = PrinterConfig::LBP460;
        assert_eq!(config.bands_per_page(), 34);
        assert_eq!(config.last_band_rows(), 52);
    }

    #[test]
    fn test_by_name() {
        assert_eq!(PrinterConfig::by_name("LBP-460"), Some(PrinterConfig::LBP460));
        assert_eq!(PrinterConfig::by_name("lbp460"), None);
    }

    #[test]
    fn test_parse_accepts_id_and_name() {
        assert_eq!(PrinterConfig::parse("LBP660").unwrap(), PrinterConfig::LBP660);
        assert_eq!(PrinterConfig::parse("LBP-660").unwrap(), PrinterConfig::LBP660);
        assert!(matches!(
            PrinterConfig::parse("lbp800"),
            Err(LbpError::UnknownPrinter(_))
        ));
    }

    #[test]
    fn test_default_is_lbp660() {
        assert_eq!(PrinterConfig::default().name, "LBP-660");
    }
}
