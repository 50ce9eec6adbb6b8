//! Command-line entry point: ingest one SEER population file.
//!
//! ```text
//! seer-ingest data/us.1990_2023.19ages.adjusted.txt.gz --year 2011 \
//!     --where 'Age=50..75' --spill-dir spill --csv seer_2011.csv --summary-by State,Age
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use seer_ingest::{
    Column, Downloader, FetchConfig, GroupedTotals, LocalDownloader, MetricsCollector, Pipeline,
    PipelineConfig, Predicate, Reporter, YearFilter,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Decode, filter, and export a SEER fixed-width population file.
#[derive(Parser, Debug)]
#[command(name = "seer-ingest", version)]
struct Args {
    /// Input file path or `file://` URL; `.gz`/`.zst` inputs are decompressed.
    input: String,

    /// Keep only these years (repeatable). All years when absent.
    #[arg(long = "year")]
    years: Vec<i16>,

    /// Records per chunk.
    #[arg(long, default_value_t = seer_ingest::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Spill filtered chunks to Parquet artifacts in this directory.
    #[arg(long)]
    spill_dir: Option<PathBuf>,

    /// Row filter such as `Age>=65`, `Race=White|Black`, `Age=50..75` (repeatable, ANDed).
    #[arg(long = "where")]
    clauses: Vec<String>,

    /// Write the dataset as CSV.
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Write the dataset as Parquet.
    #[arg(long)]
    parquet: Option<PathBuf>,

    /// Write run metrics as JSON.
    #[arg(long)]
    metrics: Option<PathBuf>,

    /// Print population totals grouped by these columns, e.g. `Year,State`.
    #[arg(long, value_delimiter = ',', value_parser = parse_column)]
    summary_by: Vec<Column>,

    /// Where compressed inputs are decompressed to.
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Keep a compressed input inside the data directory after decompressing it.
    #[arg(long)]
    keep_compressed: bool,
}

fn parse_column(name: &str) -> Result<Column, String> {
    Column::from_name(name).ok_or_else(|| format!("unknown column {name:?}"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("seer_ingest=info,warn")),
        )
        .init();
    let args = Args::parse();

    let fetch = FetchConfig {
        data_dir: args.data_dir.clone(),
        keep_compressed: args.keep_compressed,
    };
    let input = LocalDownloader
        .fetch(&args.input, &fetch)
        .with_context(|| format!("fetch {}", args.input))?;

    let predicate = Predicate::parse_clauses(&args.clauses).context("parse --where")?;
    let metrics = MetricsCollector::new();
    let mut config = PipelineConfig::default()
        .with_year_filter(YearFilter::from_years(args.years.iter().copied()))
        .with_chunk_size(args.chunk_size)
        .with_metrics(metrics.clone());
    if predicate != Predicate::True {
        config = config.with_predicate(predicate);
    }
    if let Some(dir) = &args.spill_dir {
        config = config.with_spill_dir(dir);
    }

    let result = Pipeline::new(config).run_file(&input);
    if let Some(path) = &args.metrics {
        metrics
            .save_to_file(path)
            .with_context(|| format!("save metrics to {}", path.display()))?;
    }
    let output = result?;
    info!(
        rows = output.dataset.len(),
        processed = output.stats.processed(),
        skipped = output.stats.skipped(),
        "dataset ready"
    );

    if let Some(path) = &args.csv {
        let rows = output.dataset.write_csv(path)?;
        info!(path = %path.display(), rows, "csv written");
    }
    if let Some(path) = &args.parquet {
        let rows = output.dataset.write_parquet(path)?;
        info!(path = %path.display(), rows, "parquet written");
    }
    if !args.summary_by.is_empty() {
        let totals = GroupedTotals::new(args.summary_by.iter().copied()).summarize(&output.dataset);
        println!("{}", serde_json::to_string_pretty(&totals)?);
    }
    Ok(())
}
