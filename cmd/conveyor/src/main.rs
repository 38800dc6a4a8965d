//! conveyor - Producer/consumer demo over a bounded buffer.

mod config;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use conveyor_buffer::Source;
use conveyor_worker::{Pipeline, PipelineReport};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use config::{DemoConfig, TransformKind};

/// Producer/consumer demo over a bounded buffer.
///
/// Producer `p` emits `p*items .. (p+1)*items` into a shared buffer, and the
/// consumers drain it into one destination. Values given on the command line
/// override the config file.
#[derive(Parser, Debug)]
#[command(name = "conveyor")]
#[command(about = "Producer/consumer demo over a bounded buffer")]
#[command(version)]
struct Cli {
    /// Config file (YAML or JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Buffer capacity
    #[arg(long)]
    capacity: Option<usize>,

    /// Number of producers
    #[arg(short = 'p', long)]
    producers: Option<usize>,

    /// Items emitted by each producer
    #[arg(short = 'n', long)]
    items: Option<u64>,

    /// Number of consumers
    #[arg(short = 'c', long)]
    consumers: Option<usize>,

    /// Consumer polling interval in milliseconds
    #[arg(long = "poll-ms")]
    poll_ms: Option<u64>,

    /// Transform applied by consumers
    #[arg(short = 't', long, value_enum)]
    transform: Option<TransformKind>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short = 'v', long)]
    verbose: bool,
}

impl Cli {
    fn apply(&self, cfg: &mut DemoConfig) {
        if let Some(capacity) = self.capacity {
            cfg.capacity = capacity;
        }
        if let Some(producers) = self.producers {
            cfg.producers = producers;
        }
        if let Some(items) = self.items {
            cfg.items = items;
        }
        if let Some(consumers) = self.consumers {
            cfg.consumers = consumers;
        }
        if let Some(poll_ms) = self.poll_ms {
            cfg.poll_interval_ms = poll_ms;
        }
        if let Some(transform) = self.transform {
            cfg.transform = transform;
        }
    }
}

/// JSON output format.
#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    items: &'a [u64],
    produced: usize,
    consumed: usize,
    errors: Vec<String>,
}

impl<'a> From<&'a PipelineReport<u64>> for JsonReport<'a> {
    fn from(report: &'a PipelineReport<u64>) -> Self {
        Self {
            items: &report.items,
            produced: report.produced(),
            consumed: report.consumed(),
            errors: report.errors().map(|e| e.to_string()).collect(),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut cfg = match &cli.config {
        Some(path) => DemoConfig::load(path)?,
        None => DemoConfig::default(),
    };
    cli.apply(&mut cfg);
    tracing::debug!(?cfg, "running demo");

    let report = run(&cfg)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&JsonReport::from(&report))?);
    } else {
        println!("Destination contents: {:?}", report.items);
    }

    let failures = report.errors().count();
    if failures > 0 {
        for err in report.errors() {
            tracing::error!("{}", err);
        }
        anyhow::bail!("{} worker(s) failed", failures);
    }
    Ok(())
}

fn run(cfg: &DemoConfig) -> Result<PipelineReport<u64>> {
    // Bounds every producer range below to u64.
    cfg.validate()?;

    let mut pipeline = Pipeline::new(cfg.capacity)?
        .consumers(cfg.consumers)
        .poll_interval(cfg.poll_interval());

    for p in 0..cfg.producers as u64 {
        let start = p * cfg.items;
        pipeline = pipeline.source(Source::new(start..start + cfg.items));
    }

    if cfg.transform != TransformKind::Identity {
        let transform = cfg.transform;
        pipeline = pipeline.try_transform(move |x: u64| transform.apply(x));
    }

    Ok(pipeline.run()?)
}
