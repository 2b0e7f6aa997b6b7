//! Tanimoto search over [`Arena`]s: single-fingerprint and batched count,
//! threshold, and k-nearest queries, all routed through the popcount
//! bucket index when the target arena has one (§4.D).
//!
//! Grounded in `count_tanimoto_hits_fp`/`arena`,
//! `threshold_tanimoto_search_fp`/`arena`, and
//! `knearest_tanimoto_search_fp`/`arena` in
//! `examples/original_source/chemfp/arena.py`.

pub mod heap;
pub mod results;

use crate::arena::Arena;
use crate::error::{Error, Result};

pub use heap::KNearestHeap;
pub use results::{RowOrder, SearchResults};

pub const DEFAULT_THRESHOLD: f64 = 0.7;
pub const DEFAULT_K: usize = 3;

fn check_threshold(threshold: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(Error::threshold_range(threshold));
    }
    Ok(())
}

fn check_query(query: &[u8], target: &Arena) -> Result<()> {
    if query.len() != target.num_bytes() {
        return Err(Error::size_mismatch(
            query.len() as u32 * 8,
            query.len() as u32,
            target.num_bits(),
            target.num_bytes() as u32,
        ));
    }
    Ok(())
}

/// `[min_popcount, max_popcount]` a target must fall in to have any chance
/// of reaching `threshold` against a query of popcount `q` (§4.D): from
/// `intersect <= min(p, q)` and `tanimoto = intersect / (p + q - intersect)`,
/// `tanimoto <= min(p, q) / max(p, q)`, which bounds `p` to
/// `[ceil(t*q), floor(q/t)]`.
fn popcount_bounds(q: u32, threshold: f64, max_bits: u32) -> (u32, u32) {
    if threshold <= 0.0 {
        return (0, max_bits);
    }
    let lo = (threshold * q as f64).ceil() as u32;
    let hi = ((q as f64) / threshold).floor();
    let hi = if hi >= max_bits as f64 { max_bits } else { hi as u32 };
    (lo.min(max_bits), hi)
}

/// Maximum Tanimoto score any pair with popcounts `p` and `q` could
/// possibly achieve.
fn max_possible_tanimoto(p: u32, q: u32) -> f64 {
    if p == 0 && q == 0 {
        return 0.0;
    }
    p.min(q) as f64 / p.max(q) as f64
}

fn bucket_range(index: &[u32], lo: u32, hi: u32) -> (usize, usize) {
    let max_p = index.len() - 2;
    let lo = (lo as usize).min(max_p);
    let hi = (hi as usize).min(max_p);
    (index[lo] as usize, index[hi + 1] as usize)
}

fn scan_candidates(target: &Arena, query: &[u8], query_popcount: u32, threshold: f64, mut visit: impl FnMut(usize, f64)) {
    let kernel = target.kernel();
    match target.popcount_index() {
        Some(index) => {
            let max_bits = target.num_bytes() as u32 * 8;
            let (lo, hi) = popcount_bounds(query_popcount, threshold, max_bits);
            let (bucket_start, bucket_end) = bucket_range(index, lo, hi);
            let (start, end) = target.popcount_bucket_overlap(bucket_start, bucket_end);
            for i in start..end {
                let score = kernel.tanimoto(query, target.fingerprint(i));
                if score >= threshold {
                    visit(i, score);
                }
            }
        }
        None => {
            for i in 0..target.len() {
                let score = kernel.tanimoto(query, target.fingerprint(i));
                if score >= threshold {
                    visit(i, score);
                }
            }
        }
    }
}

/// Count targets within `threshold` of `query`.
pub fn count_tanimoto_hits_fp(query: &[u8], target: &Arena, threshold: f64) -> Result<usize> {
    check_threshold(threshold)?;
    check_query(query, target)?;
    let query_popcount = target.kernel().popcount(query);
    let mut count = 0usize;
    scan_candidates(target, query, query_popcount, threshold, |_, _| count += 1);
    Ok(count)
}

/// Count targets within `threshold` of each fingerprint in `queries`, one
/// entry per query in arena order.
pub fn count_tanimoto_hits_arena(queries: &Arena, target: &Arena, threshold: f64) -> Result<Vec<usize>> {
    check_threshold(threshold)?;
    queries.check_same_size(target)?;
    let mut out = Vec::with_capacity(queries.len());
    for (_, fp) in queries.iter() {
        out.push(count_tanimoto_hits_fp(fp, target, threshold)?);
    }
    Ok(out)
}

/// All targets within `threshold` of `query`, as `(target_index, score)`
/// pairs in arbitrary order.
pub fn threshold_tanimoto_search_fp(query: &[u8], target: &Arena, threshold: f64) -> Result<Vec<(u32, f64)>> {
    check_threshold(threshold)?;
    check_query(query, target)?;
    let query_popcount = target.kernel().popcount(query);
    let mut hits = Vec::new();
    scan_candidates(target, query, query_popcount, threshold, |i, score| hits.push((i as u32, score)));
    Ok(hits)
}

/// Rough preallocation size for a batched threshold search's CSR result
/// buffers, sized off the spirit of chemfp's `min_rows` heuristic in
/// `arena.py`: assume each query will hit a small, roughly constant
/// fraction of the target arena rather than growing the buffer one hit at
/// a time.
fn estimate_csr_capacity(num_queries: usize, num_targets: usize) -> usize {
    let per_query_guess = (num_targets / 100).clamp(4, 256);
    num_queries.saturating_mul(per_query_guess)
}

pub fn threshold_tanimoto_search_arena(queries: &Arena, target: &Arena, threshold: f64) -> Result<SearchResults> {
    check_threshold(threshold)?;
    queries.check_same_size(target)?;
    let mut rows = Vec::with_capacity(queries.len());
    let capacity_hint = estimate_csr_capacity(queries.len(), target.len());
    for (_, fp) in queries.iter() {
        let mut row = Vec::with_capacity(capacity_hint / queries.len().max(1));
        let query_popcount = target.kernel().popcount(fp);
        scan_candidates(target, fp, query_popcount, threshold, |i, score| row.push((i as u32, score)));
        rows.push(row);
    }
    let target_ids = (0..target.len()).map(|i| target.id(i).to_string()).collect();
    let query_ids = queries.iter().map(|(id, _)| id.to_string()).collect();
    Ok(SearchResults::from_rows(rows, target_ids, query_ids))
}

/// The `k` closest targets to `query` above `threshold`, processed in
/// fan-out order from the query's own popcount bucket (§9 design note):
/// scan increasing popcount distance `d = 0, 1, 2, ...` from the query's
/// popcount, taking both `q-d` and `q+d` at each step, stopping once the
/// heap is full and no farther bucket could possibly beat its worst
/// admitted hit.
pub fn knearest_tanimoto_search_fp(query: &[u8], target: &Arena, k: usize, threshold: f64) -> Result<Vec<(u32, f64)>> {
    check_threshold(threshold)?;
    check_query(query, target)?;

    let kernel = target.kernel();
    let query_popcount = kernel.popcount(query);
    let max_bits = target.num_bytes() as u32 * 8;
    let mut heap = KNearestHeap::new(k, threshold);

    match target.popcount_index() {
        Some(index) => {
            let mut d = 0u32;
            loop {
                let lower = query_popcount.checked_sub(d);
                let upper = query_popcount.checked_add(d).filter(|&p| p <= max_bits);
                if lower.is_none() && upper.is_none() {
                    break;
                }

                let bound = lower
                    .map(|p| max_possible_tanimoto(p, query_popcount))
                    .into_iter()
                    .chain(upper.map(|p| max_possible_tanimoto(p, query_popcount)))
                    .fold(0.0f64, f64::max);
                if heap.is_full() && bound < heap.admission_threshold() {
                    break;
                }

                for p in [lower, upper.filter(|&u| Some(u) != lower)].into_iter().flatten() {
                    let (bucket_start, bucket_end) = bucket_range(index, p, p);
                    let (start, end) = target.popcount_bucket_overlap(bucket_start, bucket_end);
                    for i in start..end {
                        let score = kernel.tanimoto_with_popcounts(query, target.fingerprint(i), query_popcount, p);
                        heap.push(score, i as u32);
                    }
                }

                d += 1;
            }
        }
        None => {
            for i in 0..target.len() {
                let score = kernel.tanimoto(query, target.fingerprint(i));
                heap.push(score, i as u32);
            }
        }
    }

    Ok(heap.drain_sorted().into_iter().map(|(score, index)| (index, score)).collect())
}

pub fn knearest_tanimoto_search_arena(queries: &Arena, target: &Arena, k: usize, threshold: f64) -> Result<SearchResults> {
    check_threshold(threshold)?;
    queries.check_same_size(target)?;
    let mut rows = Vec::with_capacity(queries.len());
    for (_, fp) in queries.iter() {
        rows.push(knearest_tanimoto_search_fp(fp, target, k, threshold)?);
    }
    let target_ids = (0..target.len()).map(|i| target.id(i).to_string()).collect();
    let query_ids = queries.iter().map(|(id, _)| id.to_string()).collect();
    Ok(SearchResults::from_rows(rows, target_ids, query_ids))
}
