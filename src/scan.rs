//! Match extension and the rolling-window scanner.
//!
//! `find_matches` slides a blocksize-wide window across an unused range
//! of the target, probing the checksum index at every position. Each
//! candidate anchor is verified by forward extension (the block itself
//! must really match) and grown backward up to one blocksize. Among the
//! candidates seen for one window position the scanner keeps the one
//! with the best locality score, then commits it once the window has
//! moved a full blocksize past the first find, so a longer or closer
//! candidate discovered just after the first still wins.

use std::mem;

use crate::hash::RollingHash;
use crate::index::ChecksumIndex;
use crate::list::{Match, MatchList, NodeId};
use crate::source::{Source, Token};

/// Chunk size for extension reads, in tokens.
pub(crate) const TOKEN_BUFFER_SIZE: usize = 4096;

/// Reusable buffers for one scan: the double-buffered window plus one
/// pair of extension scratch areas per direction.
pub(crate) struct ScanBuffers<T> {
    pub window: Vec<T>,
    pub fwd: Vec<T>,
    pub bwd: Vec<T>,
}

impl<T: Token> ScanBuffers<T> {
    pub(crate) fn new() -> Self {
        Self {
            window: Vec::new(),
            fwd: Vec::new(),
            bwd: Vec::new(),
        }
    }
}

fn common_prefix<T: Token>(a: &[T], b: &[T]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

fn common_suffix<T: Token>(a: &[T], b: &[T]) -> usize {
    a.iter()
        .rev()
        .zip(b.iter().rev())
        .take_while(|(x, y)| x == y)
        .count()
}

/// Longest common extent forward from (p1, p2), bounded by both
/// sequence ends. Compares in scratch-buffered chunks.
pub(crate) fn match_forward<T: Token>(
    seq1: &Source<'_, T>,
    seq2: &Source<'_, T>,
    mut p1: usize,
    mut p2: usize,
    buf: &mut Vec<T>,
) -> usize {
    if buf.len() < 2 * TOKEN_BUFFER_SIZE {
        buf.resize(2 * TOKEN_BUFFER_SIZE, T::default());
    }
    let (buf1, buf2) = buf.split_at_mut(TOKEN_BUFFER_SIZE);
    let (len1, len2) = (seq1.len(), seq2.len());

    let mut num = 0;
    loop {
        let numtoread = (len1 - p1).min(len2 - p2).min(TOKEN_BUFFER_SIZE);
        if numtoread == 0 {
            break;
        }
        let read1 = seq1.read(buf1, p1, numtoread);
        let read2 = seq2.read(buf2, p2, numtoread);
        p1 += numtoread;
        p2 += numtoread;
        let matched = common_prefix(read1, read2);
        num += matched;
        if matched < numtoread {
            break;
        }
    }
    num
}

/// Longest common extent backward from (p1, p2), capped at `cap`
/// tokens. The cap keeps backward growth out of territory a later block
/// should verify through the index.
pub(crate) fn match_backward<T: Token>(
    seq1: &Source<'_, T>,
    seq2: &Source<'_, T>,
    mut p1: usize,
    mut p2: usize,
    cap: usize,
    buf: &mut Vec<T>,
) -> usize {
    if buf.len() < 2 * TOKEN_BUFFER_SIZE {
        buf.resize(2 * TOKEN_BUFFER_SIZE, T::default());
    }
    let (buf1, buf2) = buf.split_at_mut(TOKEN_BUFFER_SIZE);

    let mut num = 0;
    loop {
        let numtoread = p1.min(p2).min(cap - num).min(TOKEN_BUFFER_SIZE);
        if numtoread == 0 {
            break;
        }
        p1 -= numtoread;
        p2 -= numtoread;
        let read1 = seq1.read(buf1, p1, numtoread);
        let read2 = seq2.read(buf2, p2, numtoread);
        let matched = common_suffix(read1, read2);
        num += matched;
        if matched < numtoread {
            break;
        }
    }
    num
}

/// Scans target positions [start, end) against the index, inserting
/// accepted matches near `iter_place`. `place` is the source cursor the
/// locality score measures drift from.
#[allow(clippy::too_many_arguments)]
pub(crate) fn find_matches<T: Token>(
    seq1: &Source<'_, T>,
    seq2: &Source<'_, T>,
    matches: &mut MatchList,
    index: &ChecksumIndex<'_>,
    min_match_size: usize,
    start: usize,
    end: usize,
    mut place: usize,
    iter_place: NodeId,
    bufs: &mut ScanBuffers<T>,
) {
    let blocksize = index.blocksize();

    bufs.window.resize(blocksize * 2, T::default());
    // The window is split into two halves used as a ping-pong pair: one
    // holds the tokens leaving the window, the other the tokens
    // entering it.
    let mut in_base = 0;
    let mut out_base = blocksize;
    let mut buf_loc = blocksize;

    seq2.read_into(&mut bufs.window[..blocksize], start);
    let mut hash = RollingHash::new(&bufs.window[..blocksize]);

    let mut best = Match::new(0, 0, 0);
    let mut process_matches_pos = 0;

    // The window at position j covers target[j - blocksize, j).
    let mut j = start + blocksize;
    loop {
        let value = hash.value();
        for loc in index.candidates(value) {
            let (p1, p2) = (loc, j - blocksize);
            let fnum = match_forward(seq1, seq2, p1, p2, &mut bufs.fwd);
            if fnum < blocksize {
                continue;
            }
            let bnum = match_backward(seq1, seq2, p1, p2, blocksize, &mut bufs.bwd);
            let num = fnum + bnum;
            if num < min_match_size {
                continue;
            }
            let (p1, p2) = (p1 - bnum, p2 - bnum);
            let found_better = if best.num > 0 {
                let old_value =
                    best.num as f64 / (place.abs_diff(best.p1) + blocksize * 2) as f64;
                let new_value = num as f64 / (place.abs_diff(p1) + blocksize * 2) as f64;
                new_value > old_value
            } else {
                process_matches_pos = (j + blocksize - 1).min(end);
                true
            };
            if found_better {
                best = Match::new(p1, p2, num);
            }
        }

        if best.num > 0 && j >= process_matches_pos {
            matches.insert_near(iter_place, best);
            place = best.p1 + best.num;
            let match_end = best.p2 + best.num;
            if match_end > j {
                if match_end >= end {
                    j = end;
                } else {
                    // Fast forward over the matched area and reseed the
                    // hash on the window ending there.
                    j = match_end - blocksize;
                    seq2.read_into(&mut bufs.window[in_base..in_base + blocksize], j);
                    hash = RollingHash::new(&bufs.window[in_base..in_base + blocksize]);
                    buf_loc = blocksize;
                    j += blocksize;
                }
            }
            best.num = 0;
        }

        if buf_loc == blocksize {
            buf_loc = 0;
            mem::swap(&mut in_base, &mut out_base);
            let fill = (end - j).min(blocksize);
            seq2.read_into(&mut bufs.window[in_base..in_base + fill], j);
        }

        if j >= end {
            break;
        }

        hash.advance(
            bufs.window[out_base + buf_loc],
            bufs.window[in_base + buf_loc],
        );
        buf_loc += 1;
        j += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources<'a>(s: &'a [u8], t: &'a [u8]) -> (Source<'a, u8>, Source<'a, u8>) {
        (Source::from(s), Source::from(t))
    }

    #[test]
    fn test_match_forward_stops_at_mismatch() {
        let (s, t) = sources(b"hello world", b"hello brave new world");
        let mut buf = Vec::new();
        assert_eq!(match_forward(&s, &t, 0, 0, &mut buf), 6);
        assert_eq!(match_forward(&s, &t, 6, 16, &mut buf), 5);
        assert_eq!(match_forward(&s, &t, 0, 1, &mut buf), 0);
    }

    #[test]
    fn test_match_forward_bounded_by_ends() {
        let (s, t) = sources(b"abc", b"abcdef");
        let mut buf = Vec::new();
        assert_eq!(match_forward(&s, &t, 0, 0, &mut buf), 3);
        assert_eq!(match_forward(&s, &t, 3, 3, &mut buf), 0);
    }

    #[test]
    fn test_match_forward_crosses_chunks() {
        let data: Vec<u8> = (0..TOKEN_BUFFER_SIZE as u32 * 2 + 77)
            .map(|i| (i % 251) as u8)
            .collect();
        let (s, t) = sources(&data, &data);
        let mut buf = Vec::new();
        assert_eq!(match_forward(&s, &t, 0, 0, &mut buf), data.len());
    }

    #[test]
    fn test_match_backward_capped() {
        let (s, t) = sources(b"xxxxabcd", b"yxxxabcd");
        let mut buf = Vec::new();
        // Three x's match behind (4, 4); the cap cuts it to two.
        assert_eq!(match_backward(&s, &t, 4, 4, 4, &mut buf), 3);
        assert_eq!(match_backward(&s, &t, 4, 4, 2, &mut buf), 2);
    }

    #[test]
    fn test_match_backward_stops_at_start() {
        let (s, t) = sources(b"abcd", b"abcd");
        let mut buf = Vec::new();
        assert_eq!(match_backward(&s, &t, 2, 2, 4, &mut buf), 2);
        assert_eq!(match_backward(&s, &t, 0, 3, 4, &mut buf), 0);
    }
}
