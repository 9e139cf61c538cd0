//! Configuration loader
//!
//! Every section except `[system]` and `symbols` is optional and falls back
//! to the defaults of the module it configures.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use crate::core::fractal::FractalConfig;
use crate::core::metrics::MetricsConfig;
use crate::core::orchestrator::OrchestratorConfig;
use crate::core::performance::PerformanceConfig;
use crate::core::reflexive::AgentConfig;
use crate::core::regime::RegimeConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub system: SystemConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub fractal: FractalConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
    #[serde(default)]
    pub regime: RegimeConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    pub symbols: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SystemConfig {
    pub name: String,
    pub log_level: String,
    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_secs: u64,
    #[serde(default = "default_status_file")]
    pub status_file: PathBuf,
}

fn default_cycle_interval() -> u64 {
    60
}

fn default_status_file() -> PathBuf {
    PathBuf::from("reflexive_status.json")
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding one `<SYMBOL>.csv` per symbol
    pub csv_dir: PathBuf,
    /// Samples per fetched window
    pub lookback: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            csv_dir: PathBuf::from("data"),
            lookback: 256,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub capacity: usize,
    pub similarity_threshold: f64,
    /// Where per-symbol memory snapshots are kept across restarts
    pub snapshot_dir: PathBuf,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            capacity: 512,
            similarity_threshold: 0.9,
            snapshot_dir: PathBuf::from("memory"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub timeout_ms: u64,
    /// Optional JSON weights file for the linear oracle
    pub weights: Option<PathBuf>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 500,
            weights: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub path: PathBuf,
    pub timeout_ms: u64,
    /// Entries buffered before a transaction is written
    pub batch_size: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("audit.db"),
            timeout_ms: 1_000,
            batch_size: 16,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            bail!("config lists no symbols");
        }
        if let Err(e) = EnvFilter::try_new(&self.system.log_level) {
            bail!("system.log_level {:?} is not a valid filter: {}", self.system.log_level, e);
        }
        if self.memory.capacity == 0 {
            bail!("memory.capacity must be at least 1");
        }
        if self.data.lookback < self.metrics.min_window {
            bail!(
                "data.lookback ({}) is shorter than metrics.min_window ({})",
                self.data.lookback,
                self.metrics.min_window
            );
        }
        Ok(())
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.system.cycle_interval_secs.max(1))
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            similarity_threshold: self.memory.similarity_threshold,
            oracle_timeout: Duration::from_millis(self.oracle.timeout_ms),
            audit_timeout: Duration::from_millis(self.audit.timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
symbols = ["EURUSD", "XAUUSD"]

[system]
name = "reflexive"
log_level = "info"
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let cfg = Config::parse(MINIMAL).unwrap();
        assert_eq!(cfg.symbols.len(), 2);
        assert_eq!(cfg.system.cycle_interval_secs, 60);
        assert_eq!(cfg.memory.capacity, 512);
        assert_eq!(cfg.data.lookback, 256);
        assert_eq!(cfg.metrics.min_window, 100);
        assert_eq!(cfg.orchestrator().oracle_timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_sections_override_defaults() {
        let text = format!(
            "{}\n[memory]\ncapacity = 64\n\n[agent]\nsync_base_threshold = 0.8\n\n[oracle]\ntimeout_ms = 250\n",
            MINIMAL
        );
        let cfg = Config::parse(&text).unwrap();
        assert_eq!(cfg.memory.capacity, 64);
        assert_eq!(cfg.memory.similarity_threshold, 0.9);
        assert_eq!(cfg.agent.sync_base_threshold, 0.8);
        assert_eq!(cfg.orchestrator().oracle_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_rejects_bad_config() {
        let no_symbols = MINIMAL.replace(r#"["EURUSD", "XAUUSD"]"#, "[]");
        assert!(Config::parse(&no_symbols).is_err());

        let short = format!("{}\n[data]\nlookback = 50\n", MINIMAL);
        assert!(Config::parse(&short).is_err());

        let bad_level = MINIMAL.replace(r#"log_level = "info""#, r#"log_level = "reflexive=loud""#);
        assert!(Config::parse(&bad_level).is_err());
    }

    #[test]
    fn test_log_level_accepts_filter_directives() {
        let text = MINIMAL.replace(r#"log_level = "info""#, r#"log_level = "warn,reflexive=debug""#);
        let cfg = Config::parse(&text).unwrap();
        assert_eq!(cfg.system.log_level, "warn,reflexive=debug");
    }
}
