//! Collision-free report number generation.

use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;
use thiserror::Error;

use super::{ReportNumber, TIMESTAMP_FORMAT};
use crate::clock::{SharedClock, SystemClock};

/// Number of distinct 4-character base36 suffixes.
const SUFFIX_SPACE: u32 = 36 * 36 * 36 * 36;

/// Base36 digits, uppercase per the report number pattern.
const BASE36: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Errors from the report identifier generator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    /// All 36⁴ suffixes for the current second have been issued.
    ///
    /// Issuing more than 1,679,616 reports in one wall-clock second is far
    /// outside the intake rate this platform targets; hitting this is an
    /// operational signal, not a fault worth retrying within the same
    /// second.
    #[error("report suffix space exhausted for second {second}")]
    SuffixSpaceExhausted {
        /// The 14-digit UTC second whose suffix space ran out.
        second: String,
    },
}

/// Per-second suffix issuance window.
#[derive(Debug)]
struct SuffixWindow {
    /// The 14-digit UTC second this window covers.
    second: String,
    /// Next suffix ordinal to issue (wraps modulo [`SUFFIX_SPACE`]).
    next: u32,
    /// How many suffixes this window has issued.
    issued: u32,
}

impl SuffixWindow {
    /// Opens a window for `second`, starting at a random suffix ordinal.
    fn open(second: String) -> Self {
        Self {
            second,
            next: rand::thread_rng().gen_range(0..SUFFIX_SPACE),
            issued: 0,
        }
    }
}

/// Produces collision-free, time-sortable report numbers.
///
/// Intra-process uniqueness: the suffix counter starts at a random ordinal
/// each second and increments under a mutex, so the same suffix is never
/// issued twice for one timestamp second within one process. If the clock
/// steps backwards, the generator keeps issuing from the newest second it
/// has seen rather than reopening an old window.
///
/// Cross-process collisions remain possible with probability 36⁻⁴ per
/// colliding second; persistence must enforce a unique index on the
/// report number to close that gap.
pub struct ReportIdGenerator {
    clock: SharedClock,
    window: Mutex<SuffixWindow>,
}

impl ReportIdGenerator {
    /// Creates a generator backed by the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates a generator backed by the given clock.
    #[must_use]
    pub fn with_clock(clock: SharedClock) -> Self {
        let second = clock.now().format(TIMESTAMP_FORMAT).to_string();
        Self {
            clock,
            window: Mutex::new(SuffixWindow::open(second)),
        }
    }

    /// Issues the next report number.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::SuffixSpaceExhausted`] when more than 36⁴
    /// identifiers have been requested within one timestamp second.
    pub fn next(&self) -> Result<ReportNumber, GenerationError> {
        let second = self.clock.now().format(TIMESTAMP_FORMAT).to_string();
        let mut window = self.window.lock();

        // A strictly newer second opens a fresh window. An equal or older
        // reading (clock step backwards) keeps the current window so old
        // suffixes are never re-drawn.
        if second > window.second {
            *window = SuffixWindow::open(second);
        }

        if window.issued >= SUFFIX_SPACE {
            return Err(GenerationError::SuffixSpaceExhausted {
                second: window.second.clone(),
            });
        }

        let suffix = encode_base36(window.next);
        window.next = (window.next + 1) % SUFFIX_SPACE;
        window.issued += 1;

        Ok(ReportNumber::from_parts(&window.second, &suffix))
    }
}

impl Default for ReportIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Encodes an ordinal below 36⁴ as four uppercase base36 characters.
fn encode_base36(mut ordinal: u32) -> String {
    debug_assert!(ordinal < SUFFIX_SPACE);
    let mut chars = [b'0'; 4];
    for slot in chars.iter_mut().rev() {
        *slot = BASE36[(ordinal % 36) as usize];
        ordinal /= 36;
    }
    // All bytes come from the base36 alphabet, so this is valid UTF-8.
    String::from_utf8_lossy(&chars).into_owned()
}
