//! Pagewise demo and load driver
//!
//! Serves a synthetic board listing from memory with a configurable fetch
//! latency and exercises the cache the way a client would:
//!
//! ```text
//! ┌──────────────┐    ┌──────────────┐    ┌──────────────┐
//! │  Streamed    │───▶│  Concurrent  │───▶│  Invalidate  │
//! │  traversal   │    │  random wave │    │  + traversal │
//! └──────────────┘    └──────────────┘    └──────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use futures::StreamExt;
use serde::Serialize;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pagewise::error::{Error, Result};
use pagewise::listing::{InMemorySource, ListingClient, ListingKey, ListingKind};
use pagewise::paged::{InMemoryListing, MetricsSnapshot, PageCache};
use pagewise::{CacheSettings, PolicySpec};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Pagewise - revalidating cache for paginated listings
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of items in the synthetic listing
    #[arg(long, env = "PAGEWISE_TOTAL", default_value = "1000")]
    total: usize,

    /// Items per upstream page
    #[arg(long, env = "PAGEWISE_PAGE_SIZE", default_value = "20")]
    page_size: usize,

    /// Simulated upstream latency per page fetch, in milliseconds
    #[arg(long, env = "PAGEWISE_FETCH_LATENCY_MS", default_value = "50")]
    fetch_latency_ms: u64,

    /// Soft limit override (e.g. "30m", "0", "never")
    #[arg(long, env = "PAGEWISE_SOFT")]
    soft: Option<String>,

    /// Hard limit override, used with --soft
    #[arg(long, env = "PAGEWISE_HARD", requires = "soft")]
    hard: Option<String>,

    /// Pages fetched ahead of a streaming consumer
    #[arg(long, env = "PAGEWISE_READ_AHEAD")]
    read_ahead: Option<usize>,

    /// Number of concurrent random reads
    #[arg(long, env = "PAGEWISE_RANDOM_READS", default_value = "200")]
    random_reads: usize,

    /// YAML cache settings file
    #[arg(long, env = "PAGEWISE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

// =============================================================================
// Report
// =============================================================================

#[derive(Debug, Serialize)]
struct PassReport {
    name: &'static str,
    items: usize,
    elapsed_ms: u64,
    upstream_fetches: u64,
}

#[derive(Debug, Serialize)]
struct Report {
    total: usize,
    page_size: usize,
    fetch_latency_ms: u64,
    policy: String,
    read_ahead: usize,
    passes: Vec<PassReport>,
    metrics: MetricsSnapshot,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    let settings = match &args.config {
        Some(path) => CacheSettings::from_file(path)?,
        None => CacheSettings::default(),
    };
    let mut policies = settings.policies()?;
    if let Some(soft) = &args.soft {
        let hard = args.hard.clone().unwrap_or_else(|| "never".to_string());
        policies.set(ListingKind::Board, PolicySpec::new(soft, hard).to_policy()?);
    }
    let read_ahead = args.read_ahead.unwrap_or(settings.read_ahead);

    info!("Starting Pagewise demo");
    info!("  Listing: {} items, {} per page", args.total, args.page_size);
    info!("  Fetch latency: {}ms", args.fetch_latency_ms);
    info!("  Board policy: {}", policies.board);
    info!("  Read-ahead: {} pages", read_ahead);

    let key = ListingKey::board(1);
    let upstream = Arc::new(
        InMemoryListing::new(
            (0..args.total).map(|i| format!("post-{}", i)).collect(),
            args.page_size,
        )
        .with_latency(Duration::from_millis(args.fetch_latency_ms)),
    );
    let source = InMemorySource::new();
    source.insert(key.clone(), Arc::clone(&upstream));

    let client = ListingClient::with_policies(Arc::new(source), policies);
    let cache = client.list(key).await?;

    let mut passes = Vec::new();
    passes.push(traverse("stream", &cache, read_ahead, &upstream).await?);
    passes.push(random_wave(&cache, args.random_reads, &upstream).await?);

    cache.invalidate();
    passes.push(traverse("stream after invalidate", &cache, read_ahead, &upstream).await?);

    let report = Report {
        total: cache.total_count(),
        page_size: cache.page_size(),
        fetch_latency_ms: args.fetch_latency_ms,
        policy: cache.policy().to_string(),
        read_ahead,
        passes,
        metrics: cache.metrics(),
    };

    if args.json {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| Error::Internal(format!("Failed to encode report: {}", e)))?;
        println!("{}", json);
    } else {
        print_report(&report);
    }

    info!("Pagewise demo complete");
    Ok(())
}

/// Stream the whole listing in order
async fn traverse(
    name: &'static str,
    cache: &Arc<PageCache<String>>,
    read_ahead: usize,
    upstream: &InMemoryListing<String>,
) -> Result<PassReport> {
    let fetches_before = upstream.fetch_count();
    let start = Instant::now();

    let mut items = 0;
    let mut stream = cache.stream_with_read_ahead(read_ahead);
    while let Some(item) = stream.next().await {
        item?;
        items += 1;
    }

    let pass = PassReport {
        name,
        items,
        elapsed_ms: start.elapsed().as_millis() as u64,
        upstream_fetches: upstream.fetch_count() - fetches_before,
    };
    info!(
        pass = name,
        items = pass.items,
        elapsed_ms = pass.elapsed_ms,
        fetches = pass.upstream_fetches,
        "traversal finished"
    );
    Ok(pass)
}

/// Read scattered indexes concurrently
async fn random_wave(
    cache: &PageCache<String>,
    reads: usize,
    upstream: &InMemoryListing<String>,
) -> Result<PassReport> {
    let total = cache.total_count().max(1);
    let fetches_before = upstream.fetch_count();
    let start = Instant::now();

    // Prime stride spreads reads over every page
    let indexes = (0..reads).map(|i| i.wrapping_mul(7919) % total);
    let results = futures::future::try_join_all(indexes.map(|index| cache.get(index))).await?;

    let pass = PassReport {
        name: "random wave",
        items: results.iter().filter(|item| item.is_some()).count(),
        elapsed_ms: start.elapsed().as_millis() as u64,
        upstream_fetches: upstream.fetch_count() - fetches_before,
    };
    info!(
        items = pass.items,
        elapsed_ms = pass.elapsed_ms,
        fetches = pass.upstream_fetches,
        "random wave finished"
    );
    Ok(pass)
}

fn print_report(report: &Report) {
    println!(
        "listing: {} items, page size {}, fetch latency {}ms",
        report.total, report.page_size, report.fetch_latency_ms
    );
    println!("policy: {}, read-ahead {}", report.policy, report.read_ahead);
    for pass in &report.passes {
        println!(
            "  {:<24} {:>6} items {:>8}ms {:>6} fetches",
            pass.name, pass.items, pass.elapsed_ms, pass.upstream_fetches
        );
    }
    let m = &report.metrics;
    println!(
        "hits {} misses {} (hit ratio {:.2}), fetch latency ema {}us, invalidations {}",
        m.hits, m.misses, m.hit_ratio, m.fetch_latency_us, m.invalidations
    );
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
