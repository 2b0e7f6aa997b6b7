//! Immutable in-memory fingerprint storage.
//!
//! Mirrors chemfp's `FingerprintArena` (see
//! `examples/original_source/chemfp/arena.py`): a contiguous byte buffer
//! holding one fixed-stride record per fingerprint, a parallel `ids`
//! vector, and an optional popcount bucket index. Slicing shares the
//! backing buffer via `Arc` rather than borrowing with a lifetime
//! parameter (§3.1 of `SPEC_FULL.md`).

pub mod builder;

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::kernel::Kernel;
use crate::metadata::Metadata;

pub use builder::{ArenaBuilder, BuildOptions};

struct ArenaStorage {
    metadata: Metadata,
    /// Record i occupies `bytes[i*storage_size .. i*storage_size+num_bytes]`;
    /// the tail of each record up to `storage_size` is zero padding.
    bytes: Box<[u8]>,
    storage_size: usize,
    start_padding: usize,
    end_padding: usize,
    alignment: usize,
    ids: Vec<String>,
    /// `popcount_index[p]..popcount_index[p+1]` is the record range with
    /// popcount `p`, only present when the arena was built with
    /// `reorder: true`.
    popcount_index: Option<Vec<u32>>,
    kernel: Kernel,
}

/// A read-only view over a range of records in an [`ArenaStorage`].
///
/// Cloning an `Arena` (or calling [`Arena::slice`]) clones the `Arc` and is
/// O(1); the byte buffer and ids vector are never copied.
#[derive(Clone)]
pub struct Arena {
    storage: Arc<ArenaStorage>,
    start: usize,
    end: usize,
}

impl Arena {
    pub(crate) fn from_storage(storage: ArenaStorage) -> Arena {
        let end = storage.ids.len();
        Arena {
            storage: Arc::new(storage),
            start: 0,
            end,
        }
    }

    pub fn metadata(&self) -> &Metadata {
        &self.storage.metadata
    }

    pub fn num_bits(&self) -> u32 {
        self.storage.metadata.num_bits
    }

    pub fn num_bytes(&self) -> usize {
        self.storage.metadata.num_bytes as usize
    }

    pub fn storage_size(&self) -> usize {
        self.storage.storage_size
    }

    pub fn alignment(&self) -> usize {
        self.storage.alignment
    }

    pub fn start_padding(&self) -> usize {
        self.storage.start_padding
    }

    pub fn end_padding(&self) -> usize {
        self.storage.end_padding
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub(crate) fn kernel(&self) -> Kernel {
        self.storage.kernel
    }

    /// The record range this view exposes, within the shared storage.
    pub(crate) fn record_range(&self) -> (usize, usize) {
        (self.start, self.end)
    }

    fn record_offset(&self, local_index: usize) -> usize {
        let arena_index = self.start + local_index;
        self.storage.start_padding + arena_index * self.storage.storage_size
    }

    pub fn get(&self, i: usize) -> (&str, &[u8]) {
        assert!(i < self.len(), "index {i} out of bounds for arena of len {}", self.len());
        let offset = self.record_offset(i);
        let num_bytes = self.num_bytes();
        (&self.storage.ids[self.start + i], &self.storage.bytes[offset..offset + num_bytes])
    }

    pub fn id(&self, i: usize) -> &str {
        &self.storage.ids[self.start + i]
    }

    pub fn fingerprint(&self, i: usize) -> &[u8] {
        let offset = self.record_offset(i);
        let num_bytes = self.num_bytes();
        &self.storage.bytes[offset..offset + num_bytes]
    }

    /// Popcount of record `i`. Cheap: recomputed via the cached kernel
    /// rather than stored per-record, since the popcount index already
    /// encodes bucket membership for sorted arenas.
    pub fn popcount(&self, i: usize) -> u32 {
        self.kernel().popcount(self.fingerprint(i))
    }

    /// Half-open `[start, end)` record slice sharing this arena's storage.
    /// `start <= end <= self.len()` is required; out-of-range bounds panic,
    /// matching `_range_check`'s bounds checks in chemfp's Python arena
    /// (translated here to a Rust assertion rather than a raised
    /// exception, since slicing is not a fallible *search* operation in
    /// the public API).
    pub fn slice(&self, start: usize, end: usize) -> Arena {
        assert!(start <= end && end <= self.len(), "slice [{start},{end}) out of bounds for arena of len {}", self.len());
        Arena {
            storage: Arc::clone(&self.storage),
            start: self.start + start,
            end: self.start + end,
        }
    }

    pub fn iter(&self) -> ArenaIter<'_> {
        ArenaIter { arena: self, index: 0 }
    }

    /// Yield consecutive sub-views of up to `block_size` records each; the
    /// final view may be smaller. `block_size == 0` yields nothing.
    pub fn iter_blocks(&self, block_size: usize) -> ArenaBlocks<'_> {
        ArenaBlocks {
            arena: self,
            cursor: 0,
            block_size,
        }
    }

    /// The arena-wide popcount bucket index, if this arena was built with
    /// `reorder: true`. The index is expressed in whole-arena record
    /// offsets; [`Arena::popcount_bucket_overlap`] intersects a looked-up
    /// bucket range with this view's own `[start, end)` bounds, so a
    /// sliced view can still use the index correctly even when the slice
    /// doesn't land on a bucket boundary.
    pub(crate) fn popcount_index(&self) -> Option<&[u32]> {
        self.storage.popcount_index.as_deref()
    }

    /// True if `[start, end)` (in storage-relative record indices, i.e.
    /// already offset by `self.start`) is a valid sub-range to treat as
    /// popcount-contiguous for this view: either the view is the whole
    /// arena, or the requested bucket range falls entirely within this
    /// view's own `[start, end)` bounds.
    pub(crate) fn popcount_bucket_overlap(&self, bucket_start: usize, bucket_end: usize) -> (usize, usize) {
        let lo = bucket_start.max(self.start);
        let hi = bucket_end.min(self.end);
        if lo >= hi {
            (0, 0)
        } else {
            (lo - self.start, hi - self.start)
        }
    }

    pub fn check_same_size(&self, other: &Arena) -> Result<()> {
        if self.num_bits() != other.num_bits() || self.num_bytes() != other.num_bytes() {
            return Err(Error::size_mismatch(
                self.num_bits(),
                self.num_bytes() as u32,
                other.num_bits(),
                other.num_bytes() as u32,
            ));
        }
        Ok(())
    }

    /// Verify invariant (ii) from §3: every padding byte in every record of
    /// this view is zero. Not run automatically (it is O(n)); intended for
    /// debug assertions or explicit integrity checks, mirroring the
    /// spec's `CorruptArena` failure mode for invariant violations.
    pub fn check_invariants(&self) -> Result<()> {
        let num_bytes = self.num_bytes();
        let storage_size = self.storage_size();
        if storage_size % self.alignment().max(1) != 0 {
            return Err(Error::CorruptArena {
                reason: format!("storage_size {storage_size} is not a multiple of alignment {}", self.alignment()),
            });
        }
        for i in 0..self.len() {
            let offset = self.record_offset(i);
            if self.storage.bytes[offset + num_bytes..offset + storage_size].iter().any(|&b| b != 0) {
                return Err(Error::CorruptArena {
                    reason: format!("record {i} has non-zero padding bytes"),
                });
            }
        }
        Ok(())
    }

    /// Re-encode this arena's records back into FPS text form (see §6 of
    /// `SPEC_FULL.md`: "An arena may be serialized back to FPS by iterating
    /// records").
    pub fn to_fps_string(&self) -> String {
        let mut out = String::from("FPS1\n");
        out.push_str(&format!("#num_bits={}\n", self.num_bits()));
        if !self.metadata().fp_type.is_empty() {
            out.push_str(&format!("#type={}\n", self.metadata().fp_type));
        }
        if !self.metadata().software.is_empty() {
            out.push_str(&format!("#software={}\n", self.metadata().software));
        }
        for (id, fp) in self.iter() {
            for byte in fp {
                out.push_str(&format!("{byte:02x}"));
            }
            out.push('\t');
            out.push_str(id);
            out.push('\n');
        }
        out
    }
}

pub struct ArenaIter<'a> {
    arena: &'a Arena,
    index: usize,
}

impl<'a> Iterator for ArenaIter<'a> {
    type Item = (&'a str, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.arena.len() {
            return None;
        }
        let item = self.arena.get(self.index);
        self.index += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.arena.len() - self.index;
        (remaining, Some(remaining))
    }
}

pub struct ArenaBlocks<'a> {
    arena: &'a Arena,
    cursor: usize,
    block_size: usize,
}

impl Iterator for ArenaBlocks<'_> {
    type Item = Arena;

    fn next(&mut self) -> Option<Self::Item> {
        if self.block_size == 0 || self.cursor >= self.arena.len() {
            return None;
        }
        let end = (self.cursor + self.block_size).min(self.arena.len());
        let block = self.arena.slice(self.cursor, end);
        self.cursor = end;
        Some(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Metadata;

    fn small_arena() -> Arena {
        let metadata = Metadata::new(8).unwrap();
        ArenaBuilder::new(metadata, BuildOptions::default())
            .add("a", &[0x00])
            .unwrap()
            .add("b", &[0x10])
            .unwrap()
            .add("c", &[0x00])
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn len_and_get() {
        let arena = small_arena();
        assert_eq!(arena.len(), 3);
        assert_eq!(arena.get(0), ("a", &[0x00][..]));
        assert_eq!(arena.get(1).0, "b");
    }

    #[test]
    fn slice_matches_filtered_full_arena() {
        let metadata = Metadata::new(16).unwrap();
        let mut builder = ArenaBuilder::new(metadata, BuildOptions::default());
        for i in 0..10u8 {
            builder = builder.add(format!("id{i}"), &[i, i.wrapping_mul(3)]).unwrap();
        }
        let arena = builder.build().unwrap();

        let sliced = arena.slice(3, 7);
        assert_eq!(sliced.len(), 4);
        for x in 0..4 {
            assert_eq!(sliced.get(x), arena.get(3 + x));
        }
    }

    #[test]
    fn iter_blocks_yields_full_coverage_with_smaller_final_block() {
        let metadata = Metadata::new(8).unwrap();
        let mut builder = ArenaBuilder::new(metadata, BuildOptions::default());
        for i in 0..7u8 {
            builder = builder.add(format!("id{i}"), &[i]).unwrap();
        }
        let arena = builder.build().unwrap();

        let blocks: Vec<Arena> = arena.iter_blocks(3).collect();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].len(), 3);
        assert_eq!(blocks[1].len(), 3);
        assert_eq!(blocks[2].len(), 1);

        let mut collected = Vec::new();
        for block in &blocks {
            collected.extend(block.iter().map(|(id, _)| id.to_string()));
        }
        let expected: Vec<String> = arena.iter().map(|(id, _)| id.to_string()).collect();
        assert_eq!(collected, expected);
    }

    #[test]
    fn check_invariants_passes_on_well_formed_arena() {
        let arena = small_arena();
        assert!(arena.check_invariants().is_ok());
    }

    #[test]
    fn to_fps_string_round_trips_ids_and_hex() {
        let arena = small_arena();
        let fps = arena.to_fps_string();
        assert!(fps.starts_with("FPS1\n"));
        assert!(fps.contains("00\ta\n"));
        assert!(fps.contains("10\tb\n"));
    }
}
