//! Concrete worked-example tests, not property-based: a handful of
//! hand-checkable fingerprint sets exercising threshold inclusivity,
//! exact similarity, and arena/stream parity.

use fpsearch_core::{
    count_tanimoto_hits_fp, count_tanimoto_hits_stream, knearest_tanimoto_search_fp, threshold_tanimoto_search_fp, Arena, ArenaBuilder,
    BuildOptions, Metadata,
};
use std::io::Cursor;
use std::path::Path;

fn arena_of(fps: &[(&str, u8)]) -> Arena {
    let metadata = Metadata::new(8).unwrap();
    let mut builder = ArenaBuilder::new(metadata, BuildOptions::default());
    for &(id, byte) in fps {
        builder = builder.add(id, &[byte]).unwrap();
    }
    builder.build().unwrap()
}

#[test]
fn identical_fingerprint_has_similarity_one() {
    let arena = arena_of(&[("target", 0b1010_1010)]);
    let query = [0b1010_1010u8];
    let hits = threshold_tanimoto_search_fp(&query, &arena, 1.0).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].1, 1.0);
}

#[test]
fn threshold_comparison_is_inclusive_of_exact_match() {
    // query vs target share 2 of 3 set bits each with one disjoint bit:
    // intersection 2, union 4, tanimoto = 0.5 exactly.
    let arena = arena_of(&[("half", 0b0000_1110)]);
    let query = [0b0000_1011u8];
    let at_threshold = threshold_tanimoto_search_fp(&query, &arena, 0.5).unwrap();
    assert_eq!(at_threshold.len(), 1);
    assert_eq!(at_threshold[0].1, 0.5);

    let above_threshold = threshold_tanimoto_search_fp(&query, &arena, 0.50001).unwrap();
    assert!(above_threshold.is_empty());
}

#[test]
fn all_zero_query_never_matches_at_a_positive_threshold() {
    let arena = arena_of(&[("zero", 0b0000_0000), ("nonzero", 0b1111_1111)]);
    let query = [0b0000_0000u8];
    let count = count_tanimoto_hits_fp(&query, &arena, 0.01).unwrap();
    assert_eq!(count, 0);
}

#[test]
fn knearest_never_returns_more_than_k_hits() {
    let arena = arena_of(&[("a", 0b1111_0000), ("b", 0b1110_0000), ("c", 0b1100_0000), ("d", 0b1000_0000)]);
    let query = [0b1111_0000u8];
    let hits = knearest_tanimoto_search_fp(&query, &arena, 2, 0.0).unwrap();
    assert!(hits.len() <= 2);
}

#[test]
fn streaming_search_matches_in_memory_arena_search() {
    let records = [("a", 0xffu8), ("b", 0xf0u8), ("c", 0x0fu8), ("d", 0x00u8)];
    let arena = arena_of(&records);
    let query = [0xffu8];

    let arena_count = count_tanimoto_hits_fp(&query, &arena, 0.4).unwrap();

    let mut fps_text = String::from("FPS1\n#num_bits=8\n#type=test\n");
    for (id, byte) in records {
        fps_text.push_str(&format!("{byte:02x}\t{id}\n"));
    }
    let stream_counts = count_tanimoto_hits_stream(Cursor::new(fps_text.as_bytes()), Path::new("<mem>"), &[vec![0xff]], 0.4).unwrap();

    assert_eq!(stream_counts[0], arena_count);
}
