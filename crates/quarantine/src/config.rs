//! Controller configuration
//!
//! Values are layered: built-in defaults, then an optional config file, then
//! `QUARANTINE_*` environment variables, then command-line flags.

use anyhow::{bail, Context, Result};
use clap::Parser;
use quarantine_lib::controller::ControllerSettings;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const ENV_PREFIX: &str = "QUARANTINE";

/// Cordons the most underutilized long-standing Kubernetes node
#[derive(Debug, Default, Parser)]
#[command(name = "node-quarantine")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, env = "QUARANTINE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Node labels to select, e.g. group=quarantine
    #[arg(long = "node-labels")]
    pub node_labels: Option<String>,

    /// Utilization below which a node is underutilized, as a fraction, e.g. 0.5
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Seconds a node must be underutilized before it may be cordoned
    #[arg(long = "unneeded-time", value_name = "SECS")]
    pub unneeded_time: Option<u64>,

    /// Seconds between evaluations
    #[arg(long = "evaluation-period", value_name = "SECS")]
    pub evaluation_period: Option<u64>,

    /// Seconds to wait after a failed evaluation
    #[arg(long = "error-backoff", value_name = "SECS")]
    pub error_backoff: Option<u64>,

    /// Seconds to wait after cordoning a node
    #[arg(long = "cordon-backoff", value_name = "SECS")]
    pub cordon_backoff: Option<u64>,

    /// Skip evaluation when the node count is at or below this
    #[arg(long = "min-nodes")]
    pub min_nodes: Option<usize>,

    /// Log cordon decisions without patching nodes
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Use debug logs
    #[arg(long)]
    pub debug: bool,

    /// Path to kubeconfig file (in-cluster or default kubeconfig if not set)
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Port for the health and metrics server
    #[arg(long = "health-port")]
    pub health_port: Option<u16>,
}

/// Resolved controller configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    /// Label selector restricting which nodes are considered
    #[serde(default)]
    pub node_labels: String,

    #[serde(default = "default_threshold")]
    pub threshold: f64,

    #[serde(default = "default_unneeded_time")]
    pub unneeded_time_secs: u64,

    #[serde(default = "default_evaluation_period")]
    pub evaluation_period_secs: u64,

    #[serde(default = "default_error_backoff")]
    pub error_backoff_secs: u64,

    #[serde(default = "default_cordon_backoff")]
    pub cordon_backoff_secs: u64,

    #[serde(default = "default_min_nodes")]
    pub min_nodes: usize,

    #[serde(default)]
    pub dry_run: bool,

    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,

    #[serde(default = "default_health_port")]
    pub health_port: u16,

    /// Name reported in structured logs
    #[serde(default = "default_instance")]
    pub instance: String,
}

fn default_threshold() -> f64 {
    0.5
}

fn default_unneeded_time() -> u64 {
    600
}

fn default_evaluation_period() -> u64 {
    30
}

fn default_error_backoff() -> u64 {
    300
}

fn default_cordon_backoff() -> u64 {
    120
}

fn default_min_nodes() -> usize {
    5
}

fn default_health_port() -> u16 {
    8080
}

fn default_instance() -> String {
    std::env::var("POD_NAME").unwrap_or_else(|_| "node-quarantine".to_string())
}

impl ControllerConfig {
    /// Load configuration for the given command line
    pub fn load(cli: &Cli) -> Result<Self> {
        Self::load_with_prefix(cli, ENV_PREFIX)
    }

    fn load_with_prefix(cli: &Cli, env_prefix: &str) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = &cli.config {
            builder = builder.add_source(config::File::from(path.as_path()));
        }
        builder =
            builder.add_source(config::Environment::with_prefix(env_prefix).try_parsing(true));

        let mut loaded: ControllerConfig = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        loaded.apply_cli(cli);
        loaded.validate()?;
        Ok(loaded)
    }

    fn apply_cli(&mut self, cli: &Cli) {
        if let Some(labels) = &cli.node_labels {
            self.node_labels = labels.clone();
        }
        if let Some(threshold) = cli.threshold {
            self.threshold = threshold;
        }
        if let Some(secs) = cli.unneeded_time {
            self.unneeded_time_secs = secs;
        }
        if let Some(secs) = cli.evaluation_period {
            self.evaluation_period_secs = secs;
        }
        if let Some(secs) = cli.error_backoff {
            self.error_backoff_secs = secs;
        }
        if let Some(secs) = cli.cordon_backoff {
            self.cordon_backoff_secs = secs;
        }
        if let Some(min_nodes) = cli.min_nodes {
            self.min_nodes = min_nodes;
        }
        if let Some(port) = cli.health_port {
            self.health_port = port;
        }
        if cli.kubeconfig.is_some() {
            self.kubeconfig = cli.kubeconfig.clone();
        }
        self.dry_run |= cli.dry_run;
        self.debug |= cli.debug;
    }

    fn validate(&self) -> Result<()> {
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            bail!(
                "threshold must be a fraction in (0, 1], got {}",
                self.threshold
            );
        }
        if self.evaluation_period_secs == 0 {
            bail!("evaluation period must be at least one second");
        }
        Ok(())
    }

    pub fn settings(&self) -> ControllerSettings {
        ControllerSettings {
            utilization_threshold: self.threshold,
            unused_age: Duration::from_secs(self.unneeded_time_secs),
            min_nodes: self.min_nodes,
            evaluation_period: Duration::from_secs(self.evaluation_period_secs),
            error_backoff: Duration::from_secs(self.error_backoff_secs),
            cordon_backoff: Duration::from_secs(self.cordon_backoff_secs),
            dry_run: self.dry_run,
        }
    }

    /// Longest the loop may go without completing a cycle before it is
    /// considered stuck: twice the longest sleep it can take
    pub fn stale_after(&self) -> chrono::Duration {
        let longest = self
            .evaluation_period_secs
            .max(self.error_backoff_secs)
            .max(self.cordon_backoff_secs);
        chrono::Duration::seconds(longest.saturating_mul(2).min(u32::MAX as u64) as i64)
    }
}
