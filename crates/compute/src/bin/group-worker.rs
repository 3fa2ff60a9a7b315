//! group-worker — run the grouping engine over a JSON item dump.
//!
//! Reads a JSON array of media items, groups them with a byte-level Hamming
//! comparator over the feature payloads, and logs the report summary.
//! Optionally writes the full report as JSON and derates concurrency via the
//! adaptive memory monitor.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use tracing::info;

use photosieve_compute::{GroupingEngine, SimilarityComparator};
use photosieve_core::{EngineConfig, MediaItem};
use photosieve_sync::{LoadMonitor, MonitorConfig};

// ── CLI ─────────────────────────────────────────────────────────────

/// Media grouping worker — time-window bucketing plus star clustering.
#[derive(Parser, Debug)]
#[command(name = "group-worker", version, about)]
struct Cli {
    /// Path to a JSON array of media items.
    #[arg(long)]
    input: PathBuf,

    /// Write the full grouping report as JSON to this path.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Bucket time window in seconds.
    #[arg(long, env = "SIEVE_TIME_WINDOW_SECONDS", default_value_t = 86_400)]
    time_window_seconds: i64,

    /// Similarity threshold in (0, 1].
    #[arg(long, env = "SIEVE_SIMILARITY_THRESHOLD", default_value_t = 0.85)]
    similarity_threshold: f64,

    /// Max concurrent comparisons (0 = available parallelism).
    #[arg(long, env = "SIEVE_MAX_PARALLEL_COMPARISONS", default_value_t = 0)]
    max_parallel_comparisons: usize,

    /// Derate concurrency via the adaptive memory monitor.
    #[arg(long)]
    adaptive: bool,
}

// ── Demo comparator ─────────────────────────────────────────────────

/// Hamming similarity over equal-length feature payloads (perceptual-hash
/// style). Items without comparable payloads fall back to a size ratio.
struct HammingComparator;

#[async_trait]
impl SimilarityComparator for HammingComparator {
    async fn compare(&self, a: &MediaItem, b: &MediaItem) -> anyhow::Result<f64> {
        Ok(hamming_similarity(a, b))
    }
}

fn hamming_similarity(a: &MediaItem, b: &MediaItem) -> f64 {
    let (fa, fb) = (&a.features, &b.features);
    if fa.is_empty() || fa.len() != fb.len() {
        let small = a.size_bytes.min(b.size_bytes);
        let large = a.size_bytes.max(b.size_bytes);
        return if large == 0 {
            1.0
        } else {
            small as f64 / large as f64
        };
    }
    let differing: u32 = fa
        .iter()
        .zip(fb.iter())
        .map(|(x, y)| (x ^ y).count_ones())
        .sum();
    1.0 - differing as f64 / (fa.len() as f64 * 8.0)
}

// ── Main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let raw = std::fs::read_to_string(&cli.input)?;
    let items: Vec<MediaItem> = serde_json::from_str(&raw)?;
    info!(path = %cli.input.display(), items = items.len(), "loaded media items");

    let config = EngineConfig {
        time_window_seconds: cli.time_window_seconds,
        similarity_threshold: cli.similarity_threshold,
        max_parallel_comparisons: cli.max_parallel_comparisons,
    };

    let mut engine = GroupingEngine::new(config, Arc::new(HammingComparator))?;
    if cli.adaptive {
        let monitor = Arc::new(LoadMonitor::new(MonitorConfig::default())?);
        info!(level = ?monitor.current_level(), "adaptive monitor attached");
        engine = engine.with_monitor(monitor);
    }

    let report = engine.group_items(items).await?;
    info!("{}", report.summary());

    if let Some(path) = &cli.output {
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
        info!(path = %path.display(), "report written");
    }

    Ok(())
}
