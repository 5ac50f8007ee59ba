//! # Engine Command Scripts
//!
//! The page is driven by two fixed command sequences. Each step runs once the
//! engine reports "ready for next instruction" during the page poll loop.
//!
//! ```text
//! PAGE_SCRIPT:       page setup writes ... BandTransfer, End
//!                                                          │
//!        ┌─────────────────────────────────────────────────┘
//!        ▼
//! BAND_INIT_SCRIPT:  band setup writes ... BandTransfer, End ─┐
//!        ▲                                                    │
//!        └────────────────────────────────────────────────────┘
//! ```
//!
//! `End` costs one ready cycle and restarts [`BAND_INIT_SCRIPT`]; the page is
//! over when a `BandTransfer` finds no record left.
//!
//! ## Write Kinds
//!
//! - [`ScriptOp::SingleWrite`]: one data byte in a complete handshake frame
//! - [`ScriptOp::BlockWrite`]: several data bytes in one frame, the first on
//!   command 6 and the rest in pairs on commands 6 and 4

/// One data byte of a block write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataByte {
    Fixed(u8),
    /// `(band % 2) + 1`, filled in at execution time
    BandParity,
}

impl DataByte {
    #[inline]
    pub fn resolve(self, band: usize) -> u8 {
        match self {
            Self::Fixed(value) => value,
            Self::BandParity => (band % 2) as u8 + 1,
        }
    }
}

/// Handshake used to arm the engine for a band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BandInit {
    /// Select, two command/data cycles and an acknowledgement
    #[default]
    Full,
    /// A single command/data cycle. The engine accepts it but no script
    /// selects it.
    Quick,
}

/// One step of a command script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptOp {
    SingleWrite(u8),
    BlockWrite(&'static [DataByte]),
    /// Send the next band record
    BandTransfer(BandInit),
    /// Continue at the start of [`BAND_INIT_SCRIPT`]
    End,
}

const fn s(data: u8) -> ScriptOp {
    ScriptOp::SingleWrite(data)
}

macro_rules! block {
    ($($b:expr),+ $(,)?) => { ScriptOp::BlockWrite(&[$(DataByte::Fixed($b)),+]) };
}

/// Page opening sequence, ending with the first band
#[rustfmt::skip]
pub static PAGE_SCRIPT: &[ScriptOp] = &[
    s(0x89), s(0x8a), s(0x8b),
    block!(0x8b, 0x89, 0x8c),
    block!(0x8c, 0x04, 0x94, 0x3f, 0x95, 0x58, 0x94),
    s(0x95), s(0x89), s(0x8a), s(0x8b), s(0x89), s(0x8a), s(0x8b),
    block!(0x8b, 0x89, 0x90),
    block!(0x91, 0x00, 0x90, 0x00, 0x89),
    s(0x8a), s(0x8b), s(0x89), s(0x8a),
    block!(0x8d, 0xa7, 0x8b),
    block!(0x8b, 0x8a, 0x90),
    block!(0x90, 0x08, 0x89),
    s(0x8a), s(0x8e), s(0x90),
    block!(0x90, 0x09, 0x89),
    s(0x8a),
    block!(0x8d, 0x40, 0x90),
    block!(0x90, 0xc9, 0xa0, 0x00, 0xa0),
    block!(0x81, 0xdc, 0x82, 0x00, 0x83, 0x61, 0x84, 0x00, 0x85,
           0x58, 0x86, 0x02, 0x87, 0x9c, 0x88, 0x1a, 0x81),
    s(0x82), s(0x83), s(0x84), s(0x85), s(0x86), s(0x87),
    s(0x88), s(0x89), s(0x8a), s(0x8e), s(0x89), s(0x8a),
    block!(0x8d, 0x02, 0x89),
    s(0x8a), s(0x8e), s(0x89), s(0x8a),
    block!(0x8d, 0x9d, 0x89),
    s(0x8a), s(0x8e), s(0x89), s(0x8a),
    block!(0x8d, 0x02, 0x89),
    s(0x8a), s(0x8e),
    block!(0x93, 0x00, 0x89),
    s(0x8a),
    block!(0x8d, 0x02, 0x89),
    s(0x8a), s(0x8e), s(0x89), s(0x8a), s(0x89), s(0x8a),
    ScriptOp::BandTransfer(BandInit::Full),
    ScriptOp::End,
];

/// Sequence repeated before every band after the first
#[rustfmt::skip]
pub static BAND_INIT_SCRIPT: &[ScriptOp] = &[
    s(0x8a), s(0x8e), s(0x89), s(0x8a), s(0x89), s(0x8a),
    block!(0x8d, 0x01, 0x89),
    s(0x8a), s(0x89), s(0x8a),
    ScriptOp::BandTransfer(BandInit::Full),
    ScriptOp::End,
];

/// Position in the page/band script chain
#[derive(Debug, Clone)]
pub struct ScriptCursor {
    script: &'static [ScriptOp],
    pos: usize,
}

impl ScriptCursor {
    /// Cursor at the start of [`PAGE_SCRIPT`]
    pub fn new() -> Self {
        Self::at(PAGE_SCRIPT)
    }

    pub fn at(script: &'static [ScriptOp]) -> Self {
        Self { script, pos: 0 }
    }

    /// The op that [`Self::advance`] would return
    pub fn peek(&self) -> ScriptOp {
        self.script.get(self.pos).copied().unwrap_or(ScriptOp::End)
    }

    /// Take the current op and move past it.
    ///
    /// Taking `End` (or running off the end of a script) moves the cursor to
    /// the start of [`BAND_INIT_SCRIPT`].
    pub fn advance(&mut self) -> ScriptOp {
        let op = self.peek();
        if op == ScriptOp::End {
            self.script = BAND_INIT_SCRIPT;
            self.pos = 0;
        } else {
            self.pos += 1;
        }
        op
    }
}

impl Default for ScriptCursor {
    fn default() -> Self {
        Self::new()
    }
}
