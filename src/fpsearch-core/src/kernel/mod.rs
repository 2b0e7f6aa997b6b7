//! Bit kernels: popcount and Tanimoto over aligned byte blocks, with
//! runtime CPU-capability dispatch.
//!
//! The dispatch shape follows `search_auto`'s probe-then-dispatch pattern:
//! probe CPU features once, then hand off to the widest implementation
//! that applies. Rather than re-probing on every call, the probe result is
//! cached in a process-wide [`OnceLock`] and a [`Kernel`] is a plain pair
//! of function pointers chosen once per `num_bytes` at arena-build time.

#[cfg(target_arch = "aarch64")]
mod aarch64;
mod portable;
#[cfg(target_arch = "x86_64")]
mod x86_64;

use std::sync::OnceLock;

/// Alignment (in bytes) the arena builder should use for a fingerprint of
/// `num_bits` bits, so that the fastest kernel available at build time can
/// read full SIMD windows without an unaligned-load penalty.
pub fn preferred_alignment(num_bits: u32) -> usize {
    if num_bits <= 8 {
        1
    } else if num_bits <= 32 {
        4
    } else if num_bits <= 224 {
        8
    } else if Capabilities::detect().popcnt {
        8
    } else if !Capabilities::detect().wide_simd {
        8
    } else {
        64
    }
}

#[derive(Debug, Clone, Copy)]
struct Capabilities {
    popcnt: bool,
    /// SSSE3 on x86_64, NEON on aarch64 — whichever wide byte-shuffle
    /// extension this platform's kernel module knows how to use.
    wide_simd: bool,
}

impl Capabilities {
    fn detect() -> Capabilities {
        static CAPS: OnceLock<Capabilities> = OnceLock::new();
        *CAPS.get_or_init(Capabilities::probe)
    }

    #[cfg(target_arch = "x86_64")]
    fn probe() -> Capabilities {
        Capabilities {
            popcnt: is_x86_feature_detected!("popcnt"),
            wide_simd: is_x86_feature_detected!("ssse3"),
        }
    }

    #[cfg(target_arch = "aarch64")]
    fn probe() -> Capabilities {
        Capabilities {
            popcnt: false,
            wide_simd: std::arch::is_aarch64_feature_detected!("neon"),
        }
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    fn probe() -> Capabilities {
        Capabilities {
            popcnt: false,
            wide_simd: false,
        }
    }
}

type PopcountFn = fn(&[u8]) -> u32;
type IntersectFn = fn(&[u8], &[u8]) -> u32;

/// A pair of function pointers selected once for a given fingerprint size.
/// Cheap to copy; arenas and searches hold one per distinct `num_bytes`.
#[derive(Clone, Copy)]
pub struct Kernel {
    popcount_fn: PopcountFn,
    intersect_fn: IntersectFn,
}

const WIDE_THRESHOLD_BYTES: usize = 64; // 512 bits

impl Kernel {
    /// Pick the fastest available implementation for fingerprints of
    /// `num_bytes` bytes on this CPU.
    pub fn detect(num_bytes: usize) -> Kernel {
        let caps = Capabilities::detect();

        if num_bytes * 8 <= 224 {
            return Kernel::portable();
        }

        #[cfg(target_arch = "x86_64")]
        {
            if caps.wide_simd && num_bytes >= WIDE_THRESHOLD_BYTES {
                return Kernel {
                    popcount_fn: |b| unsafe { x86_64::popcount_ssse3(b) },
                    intersect_fn: intersect_via_popcount_of_and_x86,
                };
            }
            if caps.popcnt {
                return Kernel {
                    popcount_fn: |b| unsafe { x86_64::popcount_hw(b) },
                    intersect_fn: |a, b| unsafe { x86_64::intersect_popcount_hw(a, b) },
                };
            }
        }

        #[cfg(target_arch = "aarch64")]
        {
            if caps.wide_simd {
                return Kernel {
                    popcount_fn: |b| unsafe { aarch64::popcount_neon(b) },
                    intersect_fn: |a, b| unsafe { aarch64::intersect_popcount_neon(a, b) },
                };
            }
        }

        let _ = caps;
        Kernel::lauradoux()
    }

    fn portable() -> Kernel {
        Kernel {
            popcount_fn: portable::popcount_words,
            intersect_fn: portable::intersect_popcount_words,
        }
    }

    fn lauradoux() -> Kernel {
        Kernel {
            popcount_fn: portable::popcount_lauradoux,
            intersect_fn: portable::intersect_popcount_words,
        }
    }

    #[inline]
    pub fn popcount(&self, fp: &[u8]) -> u32 {
        (self.popcount_fn)(fp)
    }

    #[inline]
    pub fn intersect_popcount(&self, a: &[u8], b: &[u8]) -> u32 {
        (self.intersect_fn)(a, b)
    }

    /// Tanimoto similarity between two equal-length fingerprints. Returns
    /// `0.0` when both are all-zero, matching the arena and streaming
    /// paths identically (see `SPEC_FULL.md` §9 open-question resolution).
    #[inline]
    pub fn tanimoto(&self, a: &[u8], b: &[u8]) -> f64 {
        let pa = self.popcount(a);
        let pb = self.popcount(b);
        if pa == 0 && pb == 0 {
            return 0.0;
        }
        let intersect = self.intersect_popcount(a, b);
        let union = pa + pb - intersect;
        intersect as f64 / union as f64
    }

    /// Tanimoto similarity given the target's popcount already known (the
    /// common case during a bucket scan, where every record's popcount is
    /// fixed by the bucket it lives in).
    #[inline]
    pub fn tanimoto_with_popcounts(&self, a: &[u8], b: &[u8], pa: u32, pb: u32) -> f64 {
        if pa == 0 && pb == 0 {
            return 0.0;
        }
        let intersect = self.intersect_popcount(a, b);
        let union = pa + pb - intersect;
        intersect as f64 / union as f64
    }
}

#[cfg(target_arch = "x86_64")]
fn intersect_via_popcount_of_and_x86(a: &[u8], b: &[u8]) -> u32 {
    // The nibble-lookup kernel only implements a single-operand popcount;
    // route the bulk of large-block intersections through hardware POPCNT
    // when available (it always is on any CPU recent enough to have SSSE3)
    // and fall back to the portable AND-popcount loop otherwise.
    if is_x86_feature_detected!("popcnt") {
        unsafe { x86_64::intersect_popcount_hw(a, b) }
    } else {
        portable::intersect_popcount_words(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive_popcount(bytes: &[u8]) -> u32 {
        bytes.iter().map(|b| b.count_ones()).sum()
    }

    fn naive_intersect(a: &[u8], b: &[u8]) -> u32 {
        a.iter().zip(b).map(|(x, y)| (x & y).count_ones()).sum()
    }

    #[test]
    fn detect_matches_naive_across_sizes() {
        for num_bytes in [1usize, 2, 8, 21, 28, 29, 32, 64, 100, 256] {
            let kernel = Kernel::detect(num_bytes);
            let a: Vec<u8> = (0..num_bytes as u32).map(|i| (i.wrapping_mul(2654435761u32)) as u8).collect();
            let b: Vec<u8> = (0..num_bytes as u32).map(|i| (i.wrapping_mul(40503u32) + 11) as u8).collect();
            assert_eq!(kernel.popcount(&a), naive_popcount(&a), "num_bytes={num_bytes}");
            assert_eq!(
                kernel.intersect_popcount(&a, &b),
                naive_intersect(&a, &b),
                "num_bytes={num_bytes}"
            );
        }
    }

    #[test]
    fn tanimoto_zero_vs_zero_is_zero() {
        let kernel = Kernel::detect(21);
        let zero = vec![0u8; 21];
        assert_eq!(kernel.tanimoto(&zero, &zero), 0.0);
    }

    #[test]
    fn tanimoto_self_similarity_is_one() {
        let kernel = Kernel::detect(21);
        let fp = vec![0b1010_1010u8; 21];
        assert_eq!(kernel.tanimoto(&fp, &fp), 1.0);
    }

    #[test]
    fn tanimoto_symmetric() {
        let kernel = Kernel::detect(21);
        let a: Vec<u8> = (0..21u32).map(|i| (i * 13) as u8).collect();
        let b: Vec<u8> = (0..21u32).map(|i| (i * 29 + 5) as u8).collect();
        assert_eq!(kernel.tanimoto(&a, &b), kernel.tanimoto(&b, &a));
    }

    #[test]
    fn preferred_alignment_follows_table() {
        assert_eq!(preferred_alignment(8), 1);
        assert_eq!(preferred_alignment(32), 4);
        assert_eq!(preferred_alignment(224), 8);
    }
}
