//! NEON popcount kernel, mirroring the bulk-reduction idiom of the
//! teacher's `search128` NEON newline scan (same `vpaddq_u8` pairwise-add
//! trick, reused here to horizontally sum per-byte popcounts instead of a
//! movemask bitset).

use super::portable::popcount_words;

#[target_feature(enable = "neon")]
pub unsafe fn popcount_neon(bytes: &[u8]) -> u32 {
    use core::arch::aarch64::*;

    let len = bytes.len();
    let mut i = 0usize;
    let mut acc = vdupq_n_u8(0);
    let mut pending = 0u32;
    let mut total = 0u32;

    while i + 16 <= len {
        let v = vld1q_u8(bytes.as_ptr().add(i));
        let counted = vcntq_u8(v);
        acc = vaddq_u8(acc, counted);
        i += 16;
        pending += 1;
        // Each lane accumulates at most 8 per iteration; flush well before
        // any lane could overflow a u8 (255 / 8 = 31).
        if pending == 16 {
            total += horizontal_sum_u8(acc);
            acc = vdupq_n_u8(0);
            pending = 0;
        }
    }
    total += horizontal_sum_u8(acc);
    total += popcount_words(&bytes[i..]);
    total
}

#[target_feature(enable = "neon")]
pub unsafe fn intersect_popcount_neon(a: &[u8], b: &[u8]) -> u32 {
    use core::arch::aarch64::*;
    debug_assert_eq!(a.len(), b.len());

    let len = a.len();
    let mut i = 0usize;
    let mut acc = vdupq_n_u8(0);
    let mut pending = 0u32;
    let mut total = 0u32;

    while i + 16 <= len {
        let va = vld1q_u8(a.as_ptr().add(i));
        let vb = vld1q_u8(b.as_ptr().add(i));
        let counted = vcntq_u8(vandq_u8(va, vb));
        acc = vaddq_u8(acc, counted);
        i += 16;
        pending += 1;
        if pending == 16 {
            total += horizontal_sum_u8(acc);
            acc = vdupq_n_u8(0);
            pending = 0;
        }
    }
    total += horizontal_sum_u8(acc);
    total += a[i..]
        .iter()
        .zip(&b[i..])
        .map(|(&x, &y)| (x & y).count_ones())
        .sum::<u32>();
    total
}

#[target_feature(enable = "neon")]
unsafe fn horizontal_sum_u8(v: core::arch::aarch64::uint8x16_t) -> u32 {
    // `vaddvq_u8` returns a truncated `u8`: each lane can hold up to 128
    // (16 accumulated `vcntq_u8` results of at most 8 each) before a
    // flush, so the 16-lane horizontal sum can reach 2048 and wrap mod
    // 256. `vaddlvq_u8` widens to `u16` during the reduction, which is
    // wide enough for that sum.
    use core::arch::aarch64::*;
    vaddlvq_u8(v) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neon_popcount_matches_naive() {
        if !std::arch::is_aarch64_feature_detected!("neon") {
            return;
        }
        for len in [0usize, 1, 15, 16, 17, 63, 64, 65, 513] {
            let bytes: Vec<u8> = (0..len as u32).map(|i| (i * 97 + 3) as u8).collect();
            let naive: u32 = bytes.iter().map(|b| b.count_ones()).sum();
            assert_eq!(unsafe { popcount_neon(&bytes) }, naive, "len={len}");
        }
    }

    #[test]
    fn neon_intersect_matches_naive() {
        if !std::arch::is_aarch64_feature_detected!("neon") {
            return;
        }
        let a: Vec<u8> = (0..64u32).map(|i| (i * 7) as u8).collect();
        let b: Vec<u8> = (0..64u32).map(|i| (i * 13 + 1) as u8).collect();
        let naive: u32 = a.iter().zip(&b).map(|(x, y)| (x & y).count_ones()).sum();
        assert_eq!(unsafe { intersect_popcount_neon(&a, &b) }, naive);
    }
}
