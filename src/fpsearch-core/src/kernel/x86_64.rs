//! x86_64 popcount kernels, mirroring the alignment/windowing idiom of the
//! teacher's `search256` AVX2 newline scan: compute an aligned sub-range
//! with `align_offset`, handle the unaligned prefix with a scalar loop,
//! then stream the aligned bulk through a wide intrinsic loop.

use super::portable::{intersect_popcount_words, popcount64, popcount_words};

/// Hardware-POPCNT word-at-a-time popcount. Safe to call only when the
/// `popcnt` target feature has been confirmed at runtime.
#[target_feature(enable = "popcnt")]
pub unsafe fn popcount_hw(bytes: &[u8]) -> u32 {
    // `u64::count_ones` lowers to the `popcnt` instruction once the target
    // feature is enabled for this function, the same way `leading_zeros`
    // lowers to `lzcnt` once `lzcnt` is enabled.
    let mut total = 0u32;
    let mut chunks = bytes.chunks_exact(8);
    for chunk in &mut chunks {
        total += u64::from_le_bytes(chunk.try_into().unwrap()).count_ones();
    }
    for &b in chunks.remainder() {
        total += b.count_ones();
    }
    total
}

#[target_feature(enable = "popcnt")]
pub unsafe fn intersect_popcount_hw(a: &[u8], b: &[u8]) -> u32 {
    debug_assert_eq!(a.len(), b.len());
    let mut total = 0u32;
    let mut ac = a.chunks_exact(8);
    let mut bc = b.chunks_exact(8);
    for (ca, cb) in ac.by_ref().zip(bc.by_ref()) {
        let wa = u64::from_le_bytes(ca.try_into().unwrap());
        let wb = u64::from_le_bytes(cb.try_into().unwrap());
        total += (wa & wb).count_ones();
    }
    for (&ba, &bb) in ac.remainder().iter().zip(bc.remainder()) {
        total += (ba & bb).count_ones();
    }
    total
}

/// SSSE3 nibble-lookup popcount (Muła's `pshufb`-based algorithm), used for
/// 64-byte-aligned blocks of at least 512 bits. Unaligned head/tail bytes
/// fall back to the scalar word loop, the same bracket-the-aligned-bulk
/// shape as `search256`'s own unaligned-prefix handling.
#[target_feature(enable = "ssse3")]
pub unsafe fn popcount_ssse3(bytes: &[u8]) -> u32 {
    use core::arch::x86_64::*;

    let ptr = bytes.as_ptr();
    let len = bytes.len();

    // Find the first 16-byte aligned offset at or after the start.
    let align_offset = ptr.align_offset(16);
    let head = align_offset.min(len);

    let mut total = popcount_words(&bytes[..head]);
    if head >= len {
        return total;
    }

    let lookup = _mm_setr_epi8(0, 1, 1, 2, 1, 2, 2, 3, 1, 2, 2, 3, 2, 3, 3, 4);
    let low_mask = _mm_set1_epi8(0x0f);

    let mut acc = _mm_setzero_si128();
    let mut pending_flushes = 0u32;
    let mut i = head;

    while i + 16 <= len {
        let v = _mm_loadu_si128(ptr.add(i) as *const __m128i);
        let lo = _mm_and_si128(v, low_mask);
        let hi = _mm_and_si128(_mm_srli_epi16(v, 4), low_mask);
        let cnt_lo = _mm_shuffle_epi8(lookup, lo);
        let cnt_hi = _mm_shuffle_epi8(lookup, hi);
        acc = _mm_add_epi8(acc, _mm_add_epi8(cnt_lo, cnt_hi));

        i += 16;
        pending_flushes += 1;
        // Each 16-byte lane can hold at most 8 (4 from lo + 4 from hi); flush
        // before any lane could exceed 255 (8 * 16 = 128 < 255, generous margin).
        if pending_flushes == 16 {
            total += horizontal_sum_epu8(acc);
            acc = _mm_setzero_si128();
            pending_flushes = 0;
        }
    }
    total += horizontal_sum_epu8(acc);
    total += popcount_words(&bytes[i..]);
    total
}

#[target_feature(enable = "ssse3")]
unsafe fn horizontal_sum_epu8(v: core::arch::x86_64::__m128i) -> u32 {
    // _mm_sad_epu8/_mm_cvtsi128_si64/_mm_unpackhi_epi64 are all SSE2, kept
    // deliberately below SSE4.1 so this helper only ever needs the SSSE3
    // feature gate its caller already checked.
    use core::arch::x86_64::*;
    let sad = _mm_sad_epu8(v, _mm_setzero_si128());
    let low = _mm_cvtsi128_si64(sad) as u64;
    let high = _mm_cvtsi128_si64(_mm_unpackhi_epi64(sad, sad)) as u64;
    (low + high) as u32
}
