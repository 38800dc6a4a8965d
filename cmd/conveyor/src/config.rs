//! Demo configuration loading.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Per-item transform applied by the demo consumers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransformKind {
    /// Pass items through unchanged.
    #[default]
    Identity,
    /// Multiply by two.
    Double,
    /// Square.
    Square,
}

impl TransformKind {
    /// Applies the transform, failing on overflow.
    pub fn apply(self, x: u64) -> Result<u64, String> {
        match self {
            TransformKind::Identity => Ok(x),
            TransformKind::Double => x.checked_mul(2).ok_or_else(|| format!("{x} * 2 overflows")),
            TransformKind::Square => x.checked_mul(x).ok_or_else(|| format!("{x}^2 overflows")),
        }
    }
}

/// Demo configuration file format.
///
/// Every field is optional in the file; missing fields take the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Buffer capacity.
    pub capacity: usize,
    /// Number of producers.
    pub producers: usize,
    /// Items emitted by each producer.
    pub items: u64,
    /// Number of consumers.
    pub consumers: usize,
    /// Consumer polling interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Consumer transform.
    pub transform: TransformKind,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            capacity: 3,
            producers: 1,
            items: 10,
            consumers: 1,
            poll_interval_ms: 100,
            transform: TransformKind::Identity,
        }
    }
}

impl DemoConfig {
    /// Loads a config file, choosing the format by extension.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");

        let cfg = match ext {
            "json" => serde_json::from_slice(&data)
                .with_context(|| format!("invalid JSON config {}", path.display()))?,
            "yaml" | "yml" => serde_yaml::from_slice(&data)
                .with_context(|| format!("invalid YAML config {}", path.display()))?,
            _ => anyhow::bail!("unsupported config format: {}", path.display()),
        };
        Ok(cfg)
    }

    /// Checks that the topology can run.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.capacity > 0, "capacity must be positive");
        anyhow::ensure!(self.producers > 0, "at least one producer is required");
        anyhow::ensure!(self.consumers > 0, "at least one consumer is required");
        anyhow::ensure!(self.poll_interval_ms > 0, "poll interval must be positive");
        anyhow::ensure!(
            (self.producers as u64).checked_mul(self.items).is_some(),
            "{} producers x {} items exceeds the u64 item range",
            self.producers,
            self.items
        );
        Ok(())
    }

    /// Returns the consumer polling interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
