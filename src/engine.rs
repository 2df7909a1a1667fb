//! The engine instance: lifecycle, pass driver and match-list surgery.
//!
//! A pass derives the *unused ranges* of both sequences (the spans not
//! covered by any existing match), builds a checksum index over the
//! source side and scans the target side for new matches. Holes shrink
//! pass over pass, so driving the engine with decreasing blocksizes
//! finds progressively finer matches inside the gaps the previous pass
//! left behind.

use std::fmt::Write as _;
use std::mem;
use std::slice;

use tracing::debug;

use crate::error::{BDeltaError, Result};
use crate::index::{ChecksumEntry, ChecksumIndex};
use crate::list::{Match, MatchList, NIL, NodeId};
use crate::scan::{ScanBuffers, find_matches};
use crate::source::{Source, Token};

/// Pass behavior switches.
///
/// With `global` set, one checksum index is built over all unused
/// source ranges and every target hole is scanned against it. Without
/// it, source and target holes are paired up and each pair gets its own
/// private index, which keeps matches from jumping between unrelated
/// holes. `sides_ordered` additionally restricts local passes to hole
/// pairs flanked by the same two matches on both axes, skipping holes
/// whose flanking matches cross.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassFlags {
    /// Build one shared index across all unused source space.
    pub global: bool,
    /// Only scan hole pairs whose flanks are adjacent in the list.
    pub sides_ordered: bool,
}

/// A maximal span of one axis not covered by an existing match, with
/// handles to the matches immediately left and right of it in the list.
#[derive(Debug, Clone, Copy)]
pub(crate) struct UnusedRange {
    pub p: usize,
    pub num: usize,
    pub ml: NodeId,
    pub mr: NodeId,
}

/// Reusable working memory for one instance. Buffers grow monotonically
/// and are released when the instance drops.
struct Scratch<T> {
    scan: ScanBuffers<T>,
    block: Vec<T>,
    entries: Vec<ChecksumEntry>,
    table: Vec<usize>,
    unused1: Vec<UnusedRange>,
    unused2: Vec<UnusedRange>,
}

impl<T: Token> Scratch<T> {
    fn new() -> Self {
        Self {
            scan: ScanBuffers::new(),
            block: Vec::new(),
            entries: Vec::new(),
            table: Vec::new(),
            unused1: Vec::new(),
            unused2: Vec::new(),
        }
    }
}

/// Default cap on identical checksums kept in the index.
const MAX_CHECKSUM_REPEATS: usize = 2;

/// A differencing instance over one source/target pair.
///
/// The instance owns the discovered match list. Matches are found by
/// [`pass`](BDelta::pass), trimmed by
/// [`clean_matches`](BDelta::clean_matches) and read back through
/// [`get_match`](BDelta::get_match) or [`matches`](BDelta::matches).
///
/// # Examples
///
/// ```
/// use bdelta::{BDelta, Match, PassFlags, Source};
///
/// let source = b"abcdefghijklmnop";
/// let target = b"abcdefghijklmnop";
///
/// let mut engine = BDelta::new(Source::from(&source[..]), Source::from(&target[..]));
/// engine
///     .pass(4, 4, 0, PassFlags { global: true, ..Default::default() })
///     .unwrap();
/// engine.clean_matches(true);
///
/// assert_eq!(engine.num_matches(), 1);
/// assert_eq!(engine.get_match(0), Some(Match { p1: 0, p2: 0, num: 16 }));
/// ```
pub struct BDelta<'a, T: Token = u8> {
    seq1: Source<'a, T>,
    seq2: Source<'a, T>,
    matches: MatchList,
    cursor: Option<(usize, NodeId)>,
    max_checksum_repeats: usize,
    scratch: Scratch<T>,
}

impl<'a, T: Token> BDelta<'a, T> {
    /// Creates an instance over a source and a target sequence.
    pub fn new(source: Source<'a, T>, target: Source<'a, T>) -> Self {
        Self {
            seq1: source,
            seq2: target,
            matches: MatchList::new(),
            cursor: None,
            max_checksum_repeats: MAX_CHECKSUM_REPEATS,
            scratch: Scratch::new(),
        }
    }

    /// Creates an instance, checking a runtime-negotiated token width
    /// (say, read from a patch header) against the compiled token type.
    ///
    /// # Errors
    ///
    /// Returns [`BDeltaError::TokenSizeMismatch`] when `token_size`
    /// differs from `size_of::<T>()`.
    pub fn with_token_size(
        source: Source<'a, T>,
        target: Source<'a, T>,
        token_size: usize,
    ) -> Result<Self> {
        if token_size != T::WIDTH {
            return Err(BDeltaError::TokenSizeMismatch {
                expected: T::WIDTH,
                actual: token_size,
            });
        }
        Ok(Self::new(source, target))
    }

    /// Sets the cap on identical checksums kept per value in the index
    /// (default 2). Checksums repeating more often are dropped
    /// entirely, trading matches in repetitive data for bounded
    /// verification cost.
    pub fn set_max_checksum_repeats(&mut self, cap: usize) {
        self.max_checksum_repeats = cap;
    }

    /// Runs one matching pass at the given blocksize.
    ///
    /// New matches of at least `min_match_size` tokens are discovered
    /// inside the holes left by the current match list and inserted in
    /// order. In local mode (no `global` flag), only hole pairs no
    /// larger than `max_hole_size` are scanned; zero means unbounded.
    ///
    /// # Errors
    ///
    /// Returns [`BDeltaError::InvalidBlockSize`] for a zero blocksize.
    /// The pass itself cannot fail.
    pub fn pass(
        &mut self,
        blocksize: usize,
        min_match_size: usize,
        max_hole_size: usize,
        flags: PassFlags,
    ) -> Result<()> {
        if blocksize == 0 {
            return Err(BDeltaError::InvalidBlockSize);
        }
        self.cursor = None;

        // Bounding dummies so every hole has a match on each side.
        self.matches.push_front(Match::new(0, 0, 0));
        self.matches
            .push_back(Match::new(self.seq1.len(), self.seq2.len(), 0));

        let mut unused1 = mem::take(&mut self.scratch.unused1);
        let mut unused2 = mem::take(&mut self.scratch.unused2);
        unused1.clear();
        unused2.clear();
        for id in self.matches.ids() {
            let m = self.matches.get(id);
            unused1.push(UnusedRange {
                p: m.p1,
                num: m.num,
                ml: id,
                mr: id,
            });
            unused2.push(UnusedRange {
                p: m.p2,
                num: m.num,
                ml: id,
                mr: id,
            });
        }

        // The list is ordered on p2 already; order the source view on
        // p1, keeping the front dummy in place.
        unused1[1..].sort_unstable_by(|a, b| a.p.cmp(&b.p).then(b.num.cmp(&a.num)));
        derive_gaps(&mut unused1);
        derive_gaps(&mut unused2);

        if flags.global {
            self.pass_2(blocksize, min_match_size, &unused1, &unused2);
        } else {
            // Pair source holes with target holes element-wise: sorting
            // by the right flank's target offset lines each source hole
            // up with the target hole before the same match.
            let matches = &self.matches;
            unused1[1..].sort_unstable_by(|a, b| {
                let (ma, mb) = (matches.get(a.mr), matches.get(b.mr));
                ma.p2.cmp(&mb.p2).then(mb.num.cmp(&ma.num))
            });
            for i in 1..unused1.len() {
                let (u1, u2) = (unused1[i], unused2[i]);
                if u1.num >= blocksize
                    && u2.num >= blocksize
                    && (max_hole_size == 0 || (u1.num <= max_hole_size && u2.num <= max_hole_size))
                    && (!flags.sides_ordered
                        || (self.matches.next(u1.ml) == u1.mr
                            && self.matches.next(u2.ml) == u2.mr))
                {
                    self.pass_2(
                        blocksize,
                        min_match_size,
                        slice::from_ref(&u1),
                        slice::from_ref(&u2),
                    );
                }
            }
        }

        debug!(
            blocksize,
            matches = self.matches.len() - 2,
            "pass complete"
        );

        // Drop the bounding dummies. Ties on p2 = 0 sort ahead of the
        // front dummy, so it is found by value rather than position.
        let mut id = self.matches.head();
        while id != NIL {
            if self.matches.get(id).num == 0 {
                self.matches.remove(id);
                break;
            }
            id = self.matches.next(id);
        }
        self.matches.pop_back();

        self.scratch.unused1 = unused1;
        self.scratch.unused2 = unused2;
        Ok(())
    }

    /// Index the unused source ranges and scan the target ranges
    /// against them, range `i` of one axis paired with range `i` of the
    /// other.
    fn pass_2(
        &mut self,
        blocksize: usize,
        min_match_size: usize,
        unused1: &[UnusedRange],
        unused2: &[UnusedRange],
    ) {
        self.cursor = None;
        let Self {
            seq1,
            seq2,
            matches,
            max_checksum_repeats,
            scratch,
            ..
        } = self;
        let Scratch {
            scan,
            block,
            entries,
            table,
            ..
        } = scratch;

        let index = ChecksumIndex::build(
            seq1,
            blocksize,
            unused1,
            *max_checksum_repeats,
            entries,
            table,
            block,
        );

        for (u1, u2) in unused1.iter().zip(unused2) {
            if u2.num >= blocksize {
                find_matches(
                    seq1,
                    seq2,
                    matches,
                    &index,
                    min_match_size,
                    u2.p,
                    u2.p + u2.num,
                    u1.p,
                    u2.mr,
                    scan,
                );
            }
        }
    }

    /// Walks the list once, dropping matches wholly contained in their
    /// predecessor on the target axis. With `remove_overlap`, partial
    /// overlaps are also resolved by shrinking the earlier match.
    pub fn clean_matches(&mut self, remove_overlap: bool) {
        self.cursor = None;
        let mut l = self.matches.head();
        if l == NIL {
            return;
        }
        loop {
            let r = self.matches.next(l);
            if r == NIL {
                break;
            }
            let (lm, rm) = (self.matches.get(l), self.matches.get(r));
            if lm.p2 + lm.num >= rm.p2 {
                let overlap = lm.p2 + lm.num - rm.p2;
                if overlap >= rm.num {
                    self.matches.remove(r);
                    continue;
                }
                if remove_overlap {
                    self.matches.get_mut(l).num -= overlap;
                }
            }
            l = r;
        }
    }

    /// Exchanges the roles of source and target: every match has its
    /// offsets swapped, the sequences trade places and the list is
    /// resorted on the new target axis.
    pub fn swap_inputs(&mut self) {
        self.cursor = None;
        let mut id = self.matches.head();
        while id != NIL {
            let m = self.matches.get_mut(id);
            mem::swap(&mut m.p1, &mut m.p2);
            id = self.matches.next(id);
        }
        mem::swap(&mut self.seq1, &mut self.seq2);
        self.matches.sort_by_p2();
    }

    /// Inserts a match into the list, preserving order. Useful for
    /// seeding an instance with matches known from an earlier run.
    pub fn add_match(&mut self, p1: usize, p2: usize, num: usize) {
        self.cursor = None;
        self.matches.insert_near(NIL, Match::new(p1, p2, num));
    }

    /// Number of matches currently in the list.
    pub fn num_matches(&self) -> usize {
        self.matches.len()
    }

    /// Returns the match at `index` in list order, or `None` past the
    /// end.
    ///
    /// A cursor steps from the previous access position, so sequential
    /// scans are amortized O(1). Any mutating operation resets the
    /// cursor.
    pub fn get_match(&mut self, index: usize) -> Option<Match> {
        if index >= self.matches.len() {
            return None;
        }
        let (mut at, mut node) = self.cursor.unwrap_or((0, self.matches.head()));
        while at < index {
            node = self.matches.next(node);
            at += 1;
        }
        while at > index {
            node = self.matches.prev(node);
            at -= 1;
        }
        self.cursor = Some((at, node));
        Some(self.matches.get(node))
    }

    /// Iterates the current match list in order.
    pub fn matches(&self) -> impl Iterator<Item = Match> + '_ {
        self.matches.iter()
    }

    /// Emits the current match list as a `debug!` event.
    pub fn show_matches(&self) {
        let mut rendered = String::new();
        for m in self.matches.iter() {
            let _ = write!(rendered, "{m} ");
        }
        debug!(matches = %rendered.trim_end(), "match list");
    }
}

/// Rewrites each entry in place from a (match extent, flanks) view to
/// the gap before that match, tracking the furthest extent seen so
/// overlapping extents yield empty gaps. Entry 0 is the bounding dummy
/// and stays untouched.
fn derive_gaps(unused: &mut [UnusedRange]) {
    let mut next_start = 0;
    for i in 1..unused.len() {
        let start = next_start;
        let r = unused[i];
        next_start = next_start.max(r.p + r.num);
        unused[i] = UnusedRange {
            p: start,
            num: if r.p < start { 0 } else { r.p - start },
            ml: unused[i - 1].mr,
            mr: r.mr,
        };
    }
}
