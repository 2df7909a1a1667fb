//! # bdelta
//!
//! A binary-differencing engine: given a *source* and a *target*
//! sequence, it discovers a minimal list of matches — triples
//! `(p1, p2, num)` asserting that `num` tokens at offset `p1` in the
//! source equal the tokens at offset `p2` in the target. Downstream
//! code turns the match list into a patch (literal runs interleaved
//! with copy references); this crate is the match-discovery building
//! block of such a dedup/patch tool.
//!
//! ## Quick Start
//!
//! ```
//! use bdelta::diff;
//!
//! let source: &[u8] = b"hello world";
//! let target: &[u8] = b"hello brave new world";
//!
//! let matches = diff(source, target).unwrap();
//!
//! assert!(!matches.is_empty());
//! for m in &matches {
//!     assert_eq!(source[m.p1..m.p1 + m.num], target[m.p2..m.p2 + m.num]);
//! }
//! ```
//!
//! ## Algorithm Details
//!
//! The engine works in passes. Each pass:
//! 1. Derives the *unused ranges* of both sequences — the spans not
//!    covered by any match found so far.
//! 2. Checksums the source side in non-overlapping blocks and indexes
//!    the checksums in an open-addressed table.
//! 3. Slides a rolling-checksum window across the target side, probing
//!    the index at every position and verifying candidates by direct
//!    comparison before extending them forward and backward.
//! 4. Inserts accepted matches into a list kept sorted by target
//!    offset.
//!
//! Running passes with decreasing blocksizes mines progressively finer
//! matches out of the holes earlier passes left behind. Candidate
//! selection is a greedy locality heuristic, so the result is a good
//! diff, not a provably optimal one.
//!
//! ## Beyond byte sequences
//!
//! Comparison operates on *tokens* of 1, 2 or 4 bytes, chosen through
//! the [`Token`] type parameter, and the inputs are reached through
//! [`Source`]: either a borrowed slice or a read callback, so sequences
//! need not be memory-resident. [`diff`] covers the common case; the
//! [`BDelta`] instance API exposes the full pass-by-pass control.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod engine;
mod error;
mod hash;
mod index;
mod list;
mod scan;
mod source;

pub use engine::{BDelta, PassFlags};
pub use error::{BDeltaError, Result};
pub use list::Match;
pub use source::{ReadFn, Source, Token};

/// Smallest blocksize the default schedule descends to.
const MIN_PASS_BLOCKSIZE: usize = 4;

/// Largest blocksize the default schedule starts from.
const MAX_PASS_BLOCKSIZE: usize = 4096;

/// Computes the match list between two in-memory sequences with a
/// default pass schedule.
///
/// The schedule runs one global pass at a blocksize derived from the
/// input sizes, halves the blocksize in local refinement passes down to
/// a small floor, refines once more at the floor so small holes
/// re-block from their own start, and finally removes overlaps. The
/// result is sorted by target offset and overlap-free.
///
/// Use [`BDelta`] directly to control blocksizes, thresholds and flags
/// per pass, or to read sequences through a callback.
///
/// # Errors
///
/// Never fails for in-memory sequences; the `Result` mirrors the
/// fallible instance API it drives.
///
/// # Examples
///
/// ```
/// use bdelta::diff;
///
/// let source: &[u8] = b"The quick brown fox jumps over the lazy dog";
/// let target: &[u8] = b"The quick brown cat jumps over the lazy dog";
///
/// let matches = diff(source, target).unwrap();
/// let covered: usize = matches.iter().map(|m| m.num).sum();
/// assert!(covered > source.len() / 2);
/// ```
pub fn diff<T: Token>(source: &[T], target: &[T]) -> Result<Vec<Match>> {
    let smallest = source.len().min(target.len());
    if smallest == 0 {
        return Ok(Vec::new());
    }

    let mut engine = BDelta::new(Source::from(source), Source::from(target));
    let mut blocksize = (smallest / 4)
        .next_power_of_two()
        .clamp(MIN_PASS_BLOCKSIZE, MAX_PASS_BLOCKSIZE);

    engine.pass(
        blocksize,
        blocksize,
        0,
        PassFlags {
            global: true,
            ..Default::default()
        },
    )?;
    while blocksize > MIN_PASS_BLOCKSIZE {
        blocksize /= 2;
        engine.pass(blocksize, blocksize, 0, PassFlags::default())?;
    }
    engine.pass(
        MIN_PASS_BLOCKSIZE,
        MIN_PASS_BLOCKSIZE,
        0,
        PassFlags::default(),
    )?;
    engine.clean_matches(true);

    Ok(engine.matches().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_valid(matches: &[Match], source: &[u8], target: &[u8]) {
        for m in matches {
            assert!(m.num > 0);
            assert!(m.p1 + m.num <= source.len());
            assert!(m.p2 + m.num <= target.len());
            assert_eq!(source[m.p1..m.p1 + m.num], target[m.p2..m.p2 + m.num]);
        }
        for pair in matches.windows(2) {
            assert!(pair[0].p2 + pair[0].num <= pair[1].p2);
        }
    }

    #[test]
    fn test_diff_identical() {
        let data = b"identical data on both sides, long enough to block";
        let matches = diff(&data[..], &data[..]).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(
            matches[0],
            Match {
                p1: 0,
                p2: 0,
                num: data.len()
            }
        );
    }

    #[test]
    fn test_diff_insertion() {
        let source: &[u8] = b"hello world";
        let target: &[u8] = b"hello brave new world";
        let matches = diff(source, target).unwrap();

        assert_valid(&matches, source, target);
        let covered: usize = matches.iter().map(|m| m.num).sum();
        assert!(covered >= source.len());
    }

    #[test]
    fn test_diff_disjoint() {
        let matches = diff(&b"abcdefgh"[..], &b"12345678"[..]).unwrap();
        assert!(matches.is_empty());
    }

    #[test]
    fn test_diff_empty_inputs() {
        assert!(diff(&b""[..], &b"something"[..]).unwrap().is_empty());
        assert!(diff(&b"something"[..], &b""[..]).unwrap().is_empty());
    }

    #[test]
    fn test_diff_wide_tokens() {
        let source: Vec<u32> = (0..256).collect();
        let mut target = source.clone();
        target.truncate(200);
        target.extend(1000..1056u32);

        let matches = diff(&source, &target).unwrap();
        assert!(
            matches
                .iter()
                .any(|m| m.p1 == 0 && m.p2 == 0 && m.num >= 200)
        );
    }
}
