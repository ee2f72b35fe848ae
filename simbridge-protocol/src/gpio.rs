//! Delta encoding of a wide GPIO bus.
//!
//! Each byte on the wire reports one line: the low seven bits carry the line index,
//! bit 7 the new level. In the command direction (client to server) every batch is
//! terminated by [`FLUSH`]. The response direction carries no delimiter.

/// Batch delimiter of the command direction.
pub const FLUSH: u8 = 0xFF;

/// Number of line indices addressable by the 7-bit index field.
pub const MAX_LINES: usize = 128;

const LEVEL_BIT: u8 = 0x80;
const INDEX_MASK: u8 = 0x7F;

/// Bit mask covering the lowest `line_count` lines of a bus.
pub fn line_mask(line_count: usize) -> u128 {
    if line_count >= MAX_LINES {
        u128::MAX
    } else {
        (1_u128 << line_count) - 1
    }
}

/// GPIO bus of a simulated target, one bit per line.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct GpioPins {
    /// Lines driven by the bridge
    pub inputs: u128,
    /// Lines driven by the target
    pub outputs: u128,
}

/// A level change of a single GPIO line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct GpioEvent {
    pub index: u8,
    pub level: bool,
}

impl GpioEvent {
    pub fn to_byte(self) -> u8 {
        (self.index & INDEX_MASK) | if self.level { LEVEL_BIT } else { 0 }
    }

    /// Decodes an event byte. Whether `0xFF` is a delimiter depends on the direction,
    /// so callers must check for [`FLUSH`] themselves.
    pub fn from_byte(byte: u8) -> GpioEvent {
        GpioEvent {
            index: byte & INDEX_MASK,
            level: byte & LEVEL_BIT != 0,
        }
    }

    /// Sets or clears the addressed line of `bus`. Indices at or beyond `line_count`
    /// are ignored.
    pub fn apply(self, bus: &mut u128, line_count: usize) {
        let index = self.index as usize;
        if index >= line_count.min(MAX_LINES) {
            return;
        }
        if self.level {
            *bus |= 1_u128 << index;
        } else {
            *bus &= !(1_u128 << index);
        }
    }
}

/// Turns successive bus values into change events.
///
/// The encoder starts without a snapshot. The first call to [`GpioDeltaEncoder::encode`]
/// compares against the complement of the current value, so every line is reported once.
#[derive(Clone, Debug)]
pub struct GpioDeltaEncoder {
    line_count: usize,
    snapshot: Option<u128>,
}

impl GpioDeltaEncoder {
    pub fn new(line_count: usize) -> GpioDeltaEncoder {
        GpioDeltaEncoder {
            line_count: line_count.min(MAX_LINES),
            snapshot: None,
        }
    }

    pub fn line_count(&self) -> usize {
        self.line_count
    }

    /// The last value that was encoded, if any.
    pub fn snapshot(&self) -> Option<u128> {
        self.snapshot
    }

    /// Forget the snapshot. The next encode reports every line again.
    pub fn resync(&mut self) {
        self.snapshot = None;
    }

    /// Emits one event per changed line in ascending index order and updates the snapshot.
    /// Returns the number of emitted events.
    pub fn encode(&mut self, value: u128, mut emit: impl FnMut(GpioEvent)) -> usize {
        let mask = line_mask(self.line_count);
        let value = value & mask;
        let previous = self.snapshot.unwrap_or(!value & mask);
        let mut changed = value ^ previous;
        let mut count = 0;
        while changed != 0 {
            let index = changed.trailing_zeros();
            emit(GpioEvent {
                index: index as u8,
                level: (value >> index) & 1 != 0,
            });
            changed &= changed - 1;
            count += 1;
        }
        self.snapshot = Some(value);
        count
    }
}

/// Result of [`apply_events`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ApplyOutcome {
    /// Bytes consumed from the input, including the delimiter if one was found.
    pub consumed: usize,
    /// Whether decoding stopped at a [`FLUSH`] byte.
    pub delimited: bool,
}

/// Applies command-direction bytes to `bus` until the first [`FLUSH`] or the end of `bytes`.
///
/// The iterator is not advanced past the delimiter, so a lazy source such as a queue keeps
/// the next batch.
pub fn apply_events(
    bus: &mut u128,
    line_count: usize,
    bytes: impl IntoIterator<Item = u8>,
) -> ApplyOutcome {
    let mut consumed = 0;
    for byte in bytes {
        consumed += 1;
        if byte == FLUSH {
            return ApplyOutcome {
                consumed,
                delimited: true,
            };
        }
        GpioEvent::from_byte(byte).apply(bus, line_count);
    }
    ApplyOutcome {
        consumed,
        delimited: false,
    }
}
