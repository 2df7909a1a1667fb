//! Checksum index over the unused blocks of the source sequence.
//!
//! The builder walks every unused source range in non-overlapping
//! blocksize steps, checksums each block and records (cksum, loc)
//! entries. Entries are sorted by (bucket, cksum, loc) so all entries
//! sharing an open-addressing bucket are contiguous, letting the
//! scanner walk a bucket as a plain slice run. Checksums that repeat
//! beyond a small cap are purged outright, which bounds verification
//! cost on repetitive inputs at the price of missing some matches
//! there.

use tracing::trace;

use crate::engine::UnusedRange;
use crate::hash::{RollingHash, bucket};
use crate::source::{Source, Token};

/// One indexed block: its checksum and source offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChecksumEntry {
    pub cksum: u32,
    pub loc: usize,
}

/// Marker for a bucket with no entries.
const EMPTY: usize = usize::MAX;

/// A built index, borrowing the scratch-owned entry and bucket arrays.
pub(crate) struct ChecksumIndex<'s> {
    blocksize: usize,
    /// Sorted entries followed by the two tail sentinels.
    entries: &'s [ChecksumEntry],
    table: &'s [usize],
}

impl<'s> ChecksumIndex<'s> {
    /// Builds the index for `blocksize`-wide blocks over the given
    /// unused ranges of `source`.
    ///
    /// `entries_buf` and `table_buf` are reused across passes; `block`
    /// is the read scratch for one block.
    pub(crate) fn build<T: Token>(
        source: &Source<'_, T>,
        blocksize: usize,
        ranges: &[UnusedRange],
        max_repeats: usize,
        entries_buf: &'s mut Vec<ChecksumEntry>,
        table_buf: &'s mut Vec<usize>,
        block: &mut Vec<T>,
    ) -> Self {
        let total: usize = ranges.iter().map(|r| r.num).sum();
        let numblocks = total / blocksize;
        let table_len = numblocks.next_power_of_two().max(2);

        entries_buf.clear();
        entries_buf.reserve(numblocks + 2);
        block.resize(blocksize, T::default());

        for range in ranges {
            let (first, last) = (range.p, range.p + range.num);
            let mut loc = first;
            while loc + blocksize <= last {
                let read = source.read(block, loc, blocksize);
                let cksum = RollingHash::new(read).value();
                entries_buf.push(ChecksumEntry { cksum, loc });
                loc += blocksize;
            }
        }

        entries_buf.sort_unstable_by(|a, b| {
            bucket(a.cksum, table_len)
                .cmp(&bucket(b.cksum, table_len))
                .then(a.cksum.cmp(&b.cksum))
                .then(a.loc.cmp(&b.loc))
        });

        // Purge checksums hot enough to flood candidate verification.
        let mut write = 0;
        let mut read = 0;
        while read < entries_buf.len() {
            let mut ahead = read;
            while ahead < entries_buf.len() && entries_buf[ahead].cksum == entries_buf[read].cksum {
                ahead += 1;
            }
            if ahead - read <= max_repeats {
                for i in read..ahead {
                    entries_buf[write] = entries_buf[i];
                    write += 1;
                }
            }
            read = ahead;
        }
        entries_buf.truncate(write);
        let count = entries_buf.len();

        // Tail sentinels: a MAX checksum stops a bucket walk running off
        // the real entries, and the zero entry after it keeps the walk's
        // one-past read in bounds even from the last bucket.
        entries_buf.push(ChecksumEntry {
            cksum: u32::MAX,
            loc: 0,
        });
        entries_buf.push(ChecksumEntry { cksum: 0, loc: 0 });

        table_buf.clear();
        table_buf.resize(table_len, EMPTY);
        for i in (0..count).rev() {
            table_buf[bucket(entries_buf[i].cksum, table_len)] = i;
        }

        trace!(blocksize, checksums = count, "built checksum index");

        Self {
            blocksize,
            entries: entries_buf.as_slice(),
            table: table_buf.as_slice(),
        }
    }

    #[inline]
    pub(crate) fn blocksize(&self) -> usize {
        self.blocksize
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len() - 2
    }

    /// Iterates the source offsets of every entry whose checksum equals
    /// `value`, walking the contiguous bucket run.
    pub(crate) fn candidates(&self, value: u32) -> Candidates<'_> {
        let slot = bucket(value, self.table.len());
        Candidates {
            index: self,
            slot,
            at: self.table[slot],
            value,
        }
    }
}

/// Iterator over candidate source offsets for one checksum value.
pub(crate) struct Candidates<'a> {
    index: &'a ChecksumIndex<'a>,
    slot: usize,
    at: usize,
    value: u32,
}

impl Iterator for Candidates<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.at != EMPTY && self.at < self.index.entries.len() {
            let entry = self.index.entries[self.at];
            if bucket(entry.cksum, self.index.table.len()) != self.slot {
                break;
            }
            self.at += 1;
            if entry.cksum == self.value {
                return Some(entry.loc);
            }
        }
        self.at = EMPTY;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::UnusedRange;
    use crate::list::NIL;

    fn whole(range_len: usize) -> Vec<UnusedRange> {
        vec![UnusedRange {
            p: 0,
            num: range_len,
            ml: NIL,
            mr: NIL,
        }]
    }

    fn build_over<'s>(
        data: &[u8],
        blocksize: usize,
        ranges: &[UnusedRange],
        max_repeats: usize,
        entries: &'s mut Vec<ChecksumEntry>,
        table: &'s mut Vec<usize>,
    ) -> ChecksumIndex<'s> {
        let source = Source::from(data);
        let mut block = Vec::new();
        ChecksumIndex::build(
            &source, blocksize, ranges, max_repeats, entries, table, &mut block,
        )
    }

    #[test]
    fn test_indexes_non_overlapping_blocks() {
        let data = b"abcdwxyzabcd"; // three blocks, last pair truncated
        let (mut entries, mut table) = (Vec::new(), Vec::new());
        let index = build_over(data, 4, &whole(data.len()), 2, &mut entries, &mut table);

        assert_eq!(index.len(), 3);
        let hash = RollingHash::new(&b"abcd"[..]).value();
        let locs: Vec<usize> = index.candidates(hash).collect();
        assert_eq!(locs, vec![0, 8]);
    }

    #[test]
    fn test_hot_checksums_purged() {
        let data = b"AAAABBBBAAAAAAAA"; // "AAAA" three times, "BBBB" once
        let (mut entries, mut table) = (Vec::new(), Vec::new());
        let index = build_over(data, 4, &whole(data.len()), 2, &mut entries, &mut table);

        assert_eq!(index.len(), 1);
        let hot = RollingHash::new(&b"AAAA"[..]).value();
        assert_eq!(index.candidates(hot).count(), 0);
        let kept = RollingHash::new(&b"BBBB"[..]).value();
        assert_eq!(index.candidates(kept).collect::<Vec<_>>(), vec![4]);
    }

    #[test]
    fn test_raising_cap_restores_entries() {
        let data = b"AAAABBBBAAAAAAAA";
        let (mut entries, mut table) = (Vec::new(), Vec::new());
        let index = build_over(data, 4, &whole(data.len()), 3, &mut entries, &mut table);

        let hot = RollingHash::new(&b"AAAA"[..]).value();
        assert_eq!(index.candidates(hot).collect::<Vec<_>>(), vec![0, 8, 12]);
    }

    #[test]
    fn test_respects_range_boundaries() {
        let data = b"abcdefghijklmnop";
        let ranges = vec![
            UnusedRange {
                p: 2,
                num: 6,
                ml: NIL,
                mr: NIL,
            },
            UnusedRange {
                p: 12,
                num: 4,
                ml: NIL,
                mr: NIL,
            },
        ];
        let (mut entries, mut table) = (Vec::new(), Vec::new());
        let index = build_over(data, 4, &ranges, 2, &mut entries, &mut table);

        // Blocks start at each range start: 2 ("cdef") and 12 ("mnop");
        // 6 has no room for a second full block in the first range.
        assert_eq!(index.len(), 2);
        let locs: Vec<usize> = index
            .candidates(RollingHash::new(&b"cdef"[..]).value())
            .collect();
        assert_eq!(locs, vec![2]);
        let locs: Vec<usize> = index
            .candidates(RollingHash::new(&b"mnop"[..]).value())
            .collect();
        assert_eq!(locs, vec![12]);
    }

    #[test]
    fn test_empty_ranges_build_empty_index() {
        let data = b"abcdefgh";
        let (mut entries, mut table) = (Vec::new(), Vec::new());
        let index = build_over(data, 16, &whole(data.len()), 2, &mut entries, &mut table);

        assert_eq!(index.len(), 0);
        let probe = RollingHash::new(&b"abcdefgh"[..]).value();
        assert_eq!(index.candidates(probe).count(), 0);
    }
}
