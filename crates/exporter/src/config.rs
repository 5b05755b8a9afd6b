//! Exporter configuration
//!
//! Sources, lowest precedence first: built-in defaults, an optional config
//! file, `EXPORTER_*` environment variables, command-line flags.

use anyhow::{Context, Result};
use clap::Parser;
use exporter_lib::kubernetes::{DEFAULT_CORE_COUNT, DEFAULT_KUBELET_SOCKET, DEFAULT_RESOURCE_PREFIX};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line flags
#[derive(Debug, Default, Parser)]
#[command(name = "furiosa-metrics-exporter")]
#[command(version, about = "Prometheus exporter for Furiosa NPUs", long_about = None)]
pub struct Cli {
    /// Configuration file (toml, yaml or json)
    #[arg(long, short, env = "EXPORTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port of the metrics server
    #[arg(long)]
    pub port: Option<u16>,

    /// Collection interval in seconds
    #[arg(long = "interval")]
    pub interval_secs: Option<u64>,

    /// Node name attached to every series; falls back to the OS hostname
    #[arg(long, env = "NODE_NAME")]
    pub node_name: Option<String>,

    /// Enable kubernetes resources label injection
    #[arg(long)]
    pub kube_resources_label: bool,

    /// Kubelet pod-resources socket
    #[arg(long)]
    pub kubelet_socket: Option<PathBuf>,

    /// Resource name prefix of the NPU device plugin
    #[arg(long)]
    pub resource_prefix: Option<String>,

    /// Core count assumed for devices missing from the startup listing
    #[arg(long)]
    pub default_core_count: Option<u32>,

    /// JSON device listing maintained by the SMI dumper
    #[arg(long)]
    pub device_file: Option<PathBuf>,
}

/// Exporter configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExporterConfig {
    /// Port of the metrics server
    #[serde(default = "default_port")]
    pub port: u16,

    /// Collection interval in seconds
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Node name from Kubernetes downward API
    #[serde(default)]
    pub node_name: String,

    /// Attribute device metrics to the pods holding them
    #[serde(default)]
    pub kube_resources_label: bool,

    #[serde(default = "default_kubelet_socket")]
    pub kubelet_socket: PathBuf,

    /// Timeout for one pod-resources request in seconds
    #[serde(default = "default_kubelet_timeout")]
    pub kubelet_timeout_secs: u64,

    /// Resource name prefix of the NPU device plugin
    #[serde(default = "default_resource_prefix")]
    pub resource_prefix: String,

    /// Core count assumed for devices missing from the startup listing
    #[serde(default = "default_core_count")]
    pub default_core_count: u32,

    #[serde(default = "default_device_file")]
    pub device_file: PathBuf,
}

fn default_port() -> u16 {
    6254
}

fn default_interval() -> u64 {
    10
}

fn default_kubelet_socket() -> PathBuf {
    PathBuf::from(DEFAULT_KUBELET_SOCKET)
}

fn default_kubelet_timeout() -> u64 {
    10
}

fn default_resource_prefix() -> String {
    DEFAULT_RESOURCE_PREFIX.to_string()
}

fn default_core_count() -> u32 {
    DEFAULT_CORE_COUNT
}

fn default_device_file() -> PathBuf {
    PathBuf::from("/run/furiosa/devices.json")
}

fn path_value(path: Option<&PathBuf>) -> Option<String> {
    path.map(|p| p.display().to_string())
}

impl ExporterConfig {
    /// Load configuration from file, environment and flags
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = &cli.config {
            builder = builder.add_source(config::File::from(path.as_path()).required(true));
        }

        let settings = builder
            .add_source(config::Environment::with_prefix("EXPORTER").try_parsing(true))
            .set_override_option("port", cli.port)?
            .set_override_option("interval_secs", cli.interval_secs)?
            .set_override_option("node_name", cli.node_name.clone())?
            .set_override_option("kube_resources_label", cli.kube_resources_label.then_some(true))?
            .set_override_option("kubelet_socket", path_value(cli.kubelet_socket.as_ref()))?
            .set_override_option("resource_prefix", cli.resource_prefix.clone())?
            .set_override_option("default_core_count", cli.default_core_count)?
            .set_override_option("device_file", path_value(cli.device_file.as_ref()))?
            .build()
            .context("Failed to load configuration")?;

        let mut config: ExporterConfig = settings
            .try_deserialize()
            .context("Invalid configuration")?;

        if config.node_name.is_empty() {
            config.node_name = hostname::get()
                .context("Failed to read hostname")?
                .to_string_lossy()
                .into_owned();
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            anyhow::bail!("interval must be at least one second");
        }
        if self.kubelet_timeout_secs == 0 {
            anyhow::bail!("kubelet_timeout_secs must be at least one second");
        }
        if self.default_core_count == 0 {
            anyhow::bail!("default_core_count must be positive");
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn kubelet_timeout(&self) -> Duration {
        Duration::from_secs(self.kubelet_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["furiosa-metrics-exporter", "--node-name", "node-a"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = ExporterConfig::load(&cli(&[])).unwrap();

        assert_eq!(config.port, 6254);
        assert_eq!(config.interval(), Duration::from_secs(10));
        assert_eq!(config.node_name, "node-a");
        assert!(!config.kube_resources_label);
        assert_eq!(config.kubelet_socket, PathBuf::from(DEFAULT_KUBELET_SOCKET));
        assert_eq!(config.resource_prefix, "furiosa.ai");
        assert_eq!(config.default_core_count, 8);
    }

    #[test]
    fn test_flags_override_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "port = 9000\ninterval_secs = 30\nresource_prefix = \"example.com\"").unwrap();

        let path = file.path().display().to_string();
        let config = ExporterConfig::load(&cli(&[
            "--config",
            &path,
            "--port",
            "7000",
            "--kube-resources-label",
        ]))
        .unwrap();

        assert_eq!(config.port, 7000);
        assert_eq!(config.interval_secs, 30);
        assert_eq!(config.resource_prefix, "example.com");
        assert!(config.kube_resources_label);
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        assert!(ExporterConfig::load(&cli(&["--interval", "0"])).is_err());
    }

    #[test]
    fn test_zero_kubelet_timeout_is_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "kubelet_timeout_secs = 0").unwrap();

        let path = file.path().display().to_string();
        let err = ExporterConfig::load(&cli(&["--config", &path])).unwrap_err();
        assert!(err.to_string().contains("kubelet_timeout_secs"));
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        assert!(ExporterConfig::load(&cli(&["--config", "/nonexistent/exporter.toml"])).is_err());
    }
}
