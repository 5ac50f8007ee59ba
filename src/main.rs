//! # lbp660 CLI
//!
//! Prints raw bitmap pages on a Canon LBP-660 / LBP-460 attached to the PC
//! parallel port.
//!
//! ## Usage
//!
//! ```bash
//! # Print a document (concatenated P4 pages) from stdin
//! gs -q -sDEVICE=pbmraw -r600 -sOutputFile=- doc.ps | sudo lbp660
//!
//! # LBP-460 profile, crop 50 rows at the top and 32 dots at the left
//! sudo lbp660 -c -t 50 -l 32 -f page.pbm
//!
//! # Reset the printer and exit
//! sudo lbp660 -R
//!
//! # Encode only, and look at what would have been sent
//! lbp660 -s --png preview.png -f page.pbm
//! ```
//!
//! Set `RUST_LOG=debug` for per-band details.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;

use lbp660::{
    LbpError,
    preview::{decode_page, save_png},
    printer::PrinterConfig,
    protocol::{BandEncoder, BandStore, EncodeOptions, ProtocolEngine},
    transport::{MonotonicClock, ParallelPort, PortBackend},
};

type Engine = ProtocolEngine<ParallelPort, MonotonicClock>;

/// lbp660 - Canon LBP-660 / LBP-460 printer driver
#[derive(Parser, Debug)]
#[command(name = "lbp660")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Printer profile (lbp660 or lbp460)
    #[arg(long, default_value = "lbp660")]
    printer: String,

    /// Shorthand for --printer lbp460
    #[arg(short = 'c', long)]
    lbp460: bool,

    /// Reset the printer before printing
    #[arg(short = 'r', long)]
    reset: bool,

    /// Reset the printer and exit
    #[arg(short = 'R', long)]
    reset_only: bool,

    /// Encode pages without touching the printer
    #[arg(short = 's', long)]
    simulate: bool,

    /// Rows to skip at the top of every page
    #[arg(short = 't', long, default_value = "0")]
    top_skip: usize,

    /// Dots to skip at the left of every row
    #[arg(short = 'l', long, default_value = "0")]
    left_skip: usize,

    /// Read pages from FILE instead of stdin
    #[arg(short = 'f', long, value_name = "FILE")]
    file: Option<PathBuf>,

    /// Parallel port base address
    #[arg(long, default_value = "0x378", value_parser = parse_port)]
    port: u16,

    /// Port access method (devport or ioperm)
    #[arg(long, default_value = "devport")]
    backend: PortBackend,

    /// Save a PNG preview of every encoded page (FILE, FILE-2, ...)
    #[arg(long, value_name = "FILE")]
    png: Option<PathBuf>,

    /// Minimum time between the starts of two pages
    #[arg(long, default_value = "5000")]
    page_delay_ms: u64,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), LbpError> {
    let cli = Cli::parse();

    let config = if cli.lbp460 {
        PrinterConfig::LBP460
    } else {
        PrinterConfig::parse(&cli.printer)?
    };
    log::info!(
        "Running with {} page resolution ({}x{}).",
        config.name,
        config.dpi.0,
        config.dpi.1
    );

    let mut engine = if cli.simulate {
        None
    } else {
        let port = ParallelPort::open(cli.port, cli.backend)?;
        Some(ProtocolEngine::new(port, MonotonicClock::new(), config))
    };

    if let Some(engine) = engine.as_mut() {
        if cli.reset || cli.reset_only || config.reset_on_start {
            engine.reset()?;
        }
    }

    if cli.reset_only {
        return Ok(());
    }

    let mut input = open_input(cli.file.as_deref())?;

    let encoder = BandEncoder::new(EncodeOptions {
        top_skip: cli.top_skip,
        left_skip: cli.left_skip,
        ..EncodeOptions::for_printer(&config)
    });

    print_document(
        &encoder,
        &mut input,
        engine.as_mut(),
        cli.png.as_deref(),
        Duration::from_millis(cli.page_delay_ms),
    )
}

fn print_document(
    encoder: &BandEncoder,
    mut input: &mut dyn BufRead,
    mut engine: Option<&mut Engine>,
    png: Option<&Path>,
    page_delay: Duration,
) -> Result<(), LbpError> {
    let mut last_start: Option<Instant> = None;

    for page in 0usize.. {
        // one scratch store per page, dropped (and deleted) with it
        let mut store = BandStore::scratch()?;
        let Some(summary) = encoder.encode_page(&mut input, &mut store)? else {
            break;
        };
        log::info!(
            "Page {}: {}x{} source, {} bands, {} packets",
            page + 1,
            summary.header.width,
            summary.header.height,
            summary.bands,
            summary.packets
        );

        if let Some(path) = png {
            let path = page_png_path(path, page);
            let decoded = decode_page(&mut store, summary.line_bytes)?;
            save_png(&path, &decoded)?;
            log::info!("Saved preview to {}", path.display());
        }

        let Some(engine) = engine.as_deref_mut() else {
            continue;
        };

        if let Some(start) = last_start {
            let elapsed = start.elapsed();
            if elapsed < page_delay {
                thread::sleep(page_delay - elapsed);
            }
        }
        last_start = Some(Instant::now());

        if let Err(e) = engine.print_page(&mut store) {
            log::error!("Cannot print page {}: {}", page + 1, e);
            if e.requires_reset() {
                engine.reset()?;
            }
            return Err(e);
        }
    }

    Ok(())
}

/// Page source: the named file, or stdin
fn open_input(file: Option<&Path>) -> Result<Box<dyn BufRead>, LbpError> {
    match file {
        Some(path) => {
            let file = File::open(path)
                .map_err(|e| io::Error::new(e.kind(), format!("{}: {}", path.display(), e)))?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(io::stdin().lock())),
    }
}

/// Preview file for `page`: the given path for the first page, then
/// `name-2.png`, `name-3.png`, ...
fn page_png_path(path: &Path, page: usize) -> PathBuf {
    if page == 0 {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}-{}.{}", stem, page + 1, ext.to_string_lossy()),
        None => format!("{}-{}", stem, page + 1),
    };
    path.with_file_name(name)
}

/// Parse a port address in hex (`0x378`) or decimal (`888`)
fn parse_port(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse::<u16>(),
    };
    parsed.map_err(|e| format!("invalid port address '{}': {}", s, e))
}
