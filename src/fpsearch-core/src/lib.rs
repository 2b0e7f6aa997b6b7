//! Fingerprint arena storage and Tanimoto similarity search over binary
//! molecular fingerprints: popcount-bucketed in-memory arenas with
//! SIMD-dispatched bit kernels, CSR batched results, k-nearest search, and
//! a streaming search path over FPS text files for datasets too large to
//! load into memory.

pub mod arena;
pub mod error;
pub mod fps;
pub mod kernel;
pub mod metadata;
pub mod search;

pub use arena::{Arena, ArenaBuilder, BuildOptions};
pub use error::{Error, Result};
pub use metadata::Metadata;
pub use search::{
    count_tanimoto_hits_arena, count_tanimoto_hits_fp, knearest_tanimoto_search_arena, knearest_tanimoto_search_fp,
    threshold_tanimoto_search_arena, threshold_tanimoto_search_fp, RowOrder, SearchResults, DEFAULT_K, DEFAULT_THRESHOLD,
};
pub use fps::stream::{count_tanimoto_hits_stream, knearest_tanimoto_search_stream, threshold_tanimoto_search_stream};
pub use fps::{parse_data_line, parse_header, Header};
