//! Incremental construction of an [`Arena`](super::Arena), mirroring
//! chemfp's `fps_to_arena` loader (`examples/original_source/chemfp/arena.py`):
//! validate each incoming fingerprint against a fixed `num_bytes`, pack
//! records into one contiguous buffer, and optionally sort by popcount so
//! the resulting arena can answer bucket-pruned queries.

use tracing::{debug, info};

use super::{Arena, ArenaStorage};
use crate::error::{Error, Result};
use crate::kernel::{preferred_alignment, Kernel};
use crate::metadata::Metadata;

const LOG_EVERY: usize = 100_000;

/// Options controlling how [`ArenaBuilder::build`] lays out and indexes the
/// finished arena.
#[derive(Debug, Clone, Copy)]
pub struct BuildOptions {
    /// Byte alignment of each record's start offset. `None` picks the
    /// fastest alignment for this fingerprint size via
    /// [`crate::kernel::preferred_alignment`].
    pub alignment: Option<usize>,
    /// Sort records by ascending popcount and build a popcount bucket
    /// index, enabling bucket-pruned searches (§4.C). When `false`,
    /// records keep insertion order and searches fall back to a linear
    /// scan.
    pub reorder: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            alignment: None,
            reorder: true,
        }
    }
}

pub struct ArenaBuilder {
    metadata: Metadata,
    options: BuildOptions,
    ids: Vec<String>,
    fingerprints: Vec<Box<[u8]>>,
}

impl ArenaBuilder {
    pub fn new(metadata: Metadata, options: BuildOptions) -> ArenaBuilder {
        ArenaBuilder {
            metadata,
            options,
            ids: Vec::new(),
            fingerprints: Vec::new(),
        }
    }

    /// Append one fingerprint. `fp` must be exactly `num_bytes` long;
    /// anything else is an [`Error::InvalidFingerprint`], not a panic,
    /// since builders are commonly fed untrusted file input.
    pub fn add(mut self, id: impl Into<String>, fp: &[u8]) -> Result<Self> {
        let expected = self.metadata.num_bytes as usize;
        if fp.len() != expected {
            return Err(Error::InvalidFingerprint {
                reason: format!("expected {expected} bytes, got {}", fp.len()),
            });
        }
        self.ids.push(id.into());
        self.fingerprints.push(fp.into());

        if self.ids.len() % LOG_EVERY == 0 {
            debug!(count = self.ids.len(), "arena builder ingested fingerprints");
        }
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Finalize the arena: pack records into one buffer at the chosen
    /// alignment, optionally reorder by popcount, and build the popcount
    /// bucket index.
    pub fn build(self) -> Result<Arena> {
        let num_bytes = self.metadata.num_bytes as usize;
        let alignment = self
            .options
            .alignment
            .unwrap_or_else(|| preferred_alignment(self.metadata.num_bits));
        let storage_size = round_up(num_bytes, alignment);
        let kernel = Kernel::detect(num_bytes);

        let n = self.ids.len();
        let mut order: Vec<usize> = (0..n).collect();
        if self.options.reorder {
            // Stable sort: ties keep their original relative order, the
            // same guarantee chemfp's `reorder_fingerprints` documents.
            let popcounts: Vec<u32> = self.fingerprints.iter().map(|fp| kernel.popcount(fp)).collect();
            order.sort_by_key(|&i| popcounts[i]);
        }

        let start_padding = 0usize;
        let end_padding = 0usize;
        let total = start_padding + n * storage_size + end_padding;
        let mut bytes = vec![0u8; total].into_boxed_slice();
        let mut ids = Vec::with_capacity(n);

        for (dst, &src) in order.iter().enumerate() {
            let offset = start_padding + dst * storage_size;
            bytes[offset..offset + num_bytes].copy_from_slice(&self.fingerprints[src]);
            ids.push(self.ids[src].clone());
        }

        let popcount_index = if self.options.reorder {
            Some(build_popcount_index(&bytes, start_padding, storage_size, num_bytes, n, &kernel))
        } else {
            None
        };

        info!(
            num_fingerprints = n,
            num_bits = self.metadata.num_bits,
            storage_size,
            alignment,
            reordered = self.options.reorder,
            "built fingerprint arena"
        );

        Ok(Arena::from_storage(ArenaStorage {
            metadata: self.metadata,
            bytes,
            storage_size,
            start_padding,
            end_padding,
            alignment,
            ids,
            popcount_index,
            kernel,
        }))
    }
}

fn round_up(value: usize, alignment: usize) -> usize {
    if alignment <= 1 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

/// `index[p]..index[p+1]` is the half-open record range with popcount `p`,
/// for `p` in `0..=max_popcount`. Requires `bytes` to already be sorted by
/// ascending popcount.
fn build_popcount_index(bytes: &[u8], start_padding: usize, storage_size: usize, num_bytes: usize, n: usize, kernel: &Kernel) -> Vec<u32> {
    let max_bits = num_bytes as u32 * 8;
    let mut index = vec![0u32; max_bits as usize + 2];
    for i in 0..n {
        let offset = start_padding + i * storage_size;
        let p = kernel.popcount(&bytes[offset..offset + num_bytes]) as usize;
        index[p + 1] += 1;
    }
    for p in 1..index.len() {
        index[p] += index[p - 1];
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_length_fingerprint() {
        let metadata = Metadata::new(16).unwrap();
        let err = ArenaBuilder::new(metadata, BuildOptions::default()).add("x", &[0u8]);
        assert!(err.is_err());
    }

    #[test]
    fn reorder_sorts_by_ascending_popcount_stably() {
        let metadata = Metadata::new(8).unwrap();
        let arena = ArenaBuilder::new(metadata, BuildOptions { alignment: None, reorder: true })
            .add("three", &[0b0000_0111])
            .unwrap()
            .add("zero", &[0b0000_0000])
            .unwrap()
            .add("two", &[0b0000_0011])
            .unwrap()
            .add("two-again", &[0b0000_0101])
            .unwrap()
            .build()
            .unwrap();

        let popcounts: Vec<u32> = (0..arena.len()).map(|i| arena.popcount(i)).collect();
        assert_eq!(popcounts, vec![0, 2, 2, 3]);
        assert_eq!(arena.id(1), "two");
        assert_eq!(arena.id(2), "two-again");
    }

    #[test]
    fn no_reorder_keeps_insertion_order() {
        let metadata = Metadata::new(8).unwrap();
        let arena = ArenaBuilder::new(metadata, BuildOptions { alignment: None, reorder: false })
            .add("b", &[0b0000_0111])
            .unwrap()
            .add("a", &[0b0000_0000])
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(arena.id(0), "b");
        assert_eq!(arena.id(1), "a");
    }

    #[test]
    fn storage_size_respects_alignment() {
        let metadata = Metadata::new(166).unwrap();
        assert_eq!(metadata.num_bytes, 21);
        let arena = ArenaBuilder::new(metadata, BuildOptions { alignment: Some(8), reorder: false })
            .add("a", &vec![0u8; 21])
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(arena.storage_size(), 24);
    }
}
