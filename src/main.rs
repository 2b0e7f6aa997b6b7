//! Command-line front end for `fpsearch-core`: count, threshold, and
//! k-nearest Tanimoto search over FPS fingerprint files. Subcommand shape
//! and the thin anyhow-at-the-boundary error handling follow the original
//! `tac` binary's CLI wrapper style.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use memmap2::Mmap;
use tracing_subscriber::EnvFilter;

use fpsearch_core::{
    count_tanimoto_hits_fp, count_tanimoto_hits_stream, knearest_tanimoto_search_fp, parse_data_line, parse_header,
    threshold_tanimoto_search_fp, Arena, ArenaBuilder, BuildOptions, DEFAULT_K, DEFAULT_THRESHOLD,
};

#[derive(Parser)]
#[command(name = "fpsearch", version, about = "Tanimoto similarity search over FPS fingerprint files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Count, per query, how many targets are within a Tanimoto threshold.
    Count {
        #[arg(long)]
        queries: PathBuf,
        #[arg(long)]
        targets: PathBuf,
        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: f64,
        /// Scan the target file once instead of loading it into an arena;
        /// use for target files too large to hold in memory.
        #[arg(long)]
        streaming: bool,
    },
    /// List every target within a Tanimoto threshold of each query.
    Threshold {
        #[arg(long)]
        queries: PathBuf,
        #[arg(long)]
        targets: PathBuf,
        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: f64,
    },
    /// List the k nearest targets to each query.
    Knearest {
        #[arg(long)]
        queries: PathBuf,
        #[arg(long)]
        targets: PathBuf,
        #[arg(long, default_value_t = DEFAULT_K)]
        k: usize,
        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: f64,
    },
}

struct QuerySet {
    ids: Vec<String>,
    fps: Vec<Vec<u8>>,
}

fn load_queries(path: &Path) -> Result<QuerySet> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let header = parse_header(&text)?;
    let num_bytes = header.metadata.num_bytes as usize;
    let mut ids = Vec::new();
    let mut fps = Vec::new();
    for line in text[header.header_bytes..].lines() {
        if line.is_empty() {
            continue;
        }
        let (fp, id) = parse_data_line(line, num_bytes)?;
        ids.push(id.to_string());
        fps.push(fp);
    }
    Ok(QuerySet { ids, fps })
}

fn load_target_arena(path: &Path) -> Result<Arena> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mmap = unsafe { Mmap::map(&file) }.with_context(|| format!("mmapping {}", path.display()))?;
    let text = std::str::from_utf8(&mmap).with_context(|| format!("{} is not valid UTF-8", path.display()))?;
    let header = parse_header(text)?;
    let num_bytes = header.metadata.num_bytes as usize;
    let mut builder = ArenaBuilder::new(header.metadata, BuildOptions::default());
    for line in text[header.header_bytes..].lines() {
        if line.is_empty() {
            continue;
        }
        let (fp, id) = parse_data_line(line, num_bytes)?;
        builder = builder.add(id, &fp)?;
    }
    Ok(builder.build()?)
}

fn run_count(queries_path: &Path, targets_path: &Path, threshold: f64, streaming: bool) -> Result<()> {
    let queries = load_queries(queries_path)?;

    let counts = if streaming {
        let file = File::open(targets_path).with_context(|| format!("opening {}", targets_path.display()))?;
        count_tanimoto_hits_stream(file, targets_path, &queries.fps, threshold)?
    } else {
        let target_arena = load_target_arena(targets_path)?;
        queries
            .fps
            .iter()
            .map(|fp| count_tanimoto_hits_fp(fp, &target_arena, threshold).map_err(anyhow::Error::from))
            .collect::<Result<Vec<_>>>()?
    };

    for (id, count) in queries.ids.iter().zip(&counts) {
        println!("{id}\t{count}");
    }
    Ok(())
}

fn run_threshold(queries_path: &Path, targets_path: &Path, threshold: f64) -> Result<()> {
    let queries = load_queries(queries_path)?;
    let target_arena = load_target_arena(targets_path)?;

    for (query_id, fp) in queries.ids.iter().zip(&queries.fps) {
        let mut hits = threshold_tanimoto_search_fp(fp, &target_arena, threshold)?;
        hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then(a.0.cmp(&b.0)));
        for (index, score) in hits {
            println!("{query_id}\t{}\t{score:.4}", target_arena.id(index as usize));
        }
    }
    Ok(())
}

fn run_knearest(queries_path: &Path, targets_path: &Path, k: usize, threshold: f64) -> Result<()> {
    let queries = load_queries(queries_path)?;
    let target_arena = load_target_arena(targets_path)?;

    for (query_id, fp) in queries.ids.iter().zip(&queries.fps) {
        let hits = knearest_tanimoto_search_fp(fp, &target_arena, k, threshold)?;
        for (index, score) in hits {
            println!("{query_id}\t{}\t{score:.4}", target_arena.id(index as usize));
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Count {
            queries,
            targets,
            threshold,
            streaming,
        } => run_count(&queries, &targets, threshold, streaming),
        Command::Threshold { queries, targets, threshold } => run_threshold(&queries, &targets, threshold),
        Command::Knearest { queries, targets, k, threshold } => run_knearest(&queries, &targets, k, threshold),
    }
}
