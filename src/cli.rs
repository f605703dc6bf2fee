//! CLI argument parsing for flowlens

use crate::config::AnalysisConfig;
use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Output format for the dataset overview
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    #[default]
    Text,
    /// JSON format for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "flowlens")]
#[command(version)]
#[command(
    about = "Describe, chart and flag z-score outliers in time-bucketed network flow data",
    long_about = None
)]
pub struct Cli {
    /// TOML configuration file (flags below override it)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Raw per-bucket metrics CSV
    #[arg(long = "raw", value_name = "FILE")]
    pub raw: Option<PathBuf>,

    /// Time lookup CSV mapping id_time to timestamps
    #[arg(long = "times", value_name = "FILE")]
    pub times: Option<PathBuf>,

    /// Directory for the PNG charts
    #[arg(long = "figures-dir", value_name = "DIR")]
    pub figures_dir: Option<PathBuf>,

    /// Directory for anomalies.csv and summary.csv
    #[arg(long = "results-dir", value_name = "DIR")]
    pub results_dir: Option<PathBuf>,

    /// Anomaly detection threshold in standard deviations (default: 3.0)
    #[arg(long = "threshold", value_name = "SIGMA")]
    pub threshold: Option<f64>,

    /// TrueType font used for chart text
    #[arg(long = "font", value_name = "FILE")]
    pub font: Option<PathBuf>,

    /// Output format for the dataset overview
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Emit tracing output on stderr
    #[arg(long = "debug")]
    pub debug: bool,
}

impl Cli {
    /// Defaults, then the config file, then explicit flags
    pub fn to_config(&self) -> Result<AnalysisConfig> {
        let mut config = match &self.config {
            Some(path) => AnalysisConfig::from_toml(path)?,
            None => AnalysisConfig::default(),
        };

        if let Some(raw) = &self.raw {
            config.raw_data_path = raw.clone();
        }
        if let Some(times) = &self.times {
            config.time_data_path = times.clone();
        }
        if let Some(dir) = &self.figures_dir {
            config.figures_dir = dir.clone();
        }
        if let Some(dir) = &self.results_dir {
            config.results_dir = dir.clone();
        }
        if let Some(threshold) = self.threshold {
            config.threshold = threshold;
        }
        if let Some(font) = &self.font {
            config.font_path = Some(font.clone());
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::Path;
    use tempfile::NamedTempFile;

    #[test]
    fn test_cli_no_arguments_uses_defaults() {
        let cli = Cli::parse_from(["flowlens"]);
        assert_eq!(cli.format, OutputFormat::Text);
        assert!(!cli.debug);
        assert_eq!(cli.to_config().unwrap(), AnalysisConfig::default());
    }

    #[test]
    fn test_cli_path_overrides() {
        let cli = Cli::parse_from([
            "flowlens",
            "--raw",
            "a.csv",
            "--times",
            "b.csv",
            "--figures-dir",
            "figs",
            "--results-dir",
            "res",
        ]);
        let config = cli.to_config().unwrap();
        assert_eq!(config.raw_data_path, Path::new("a.csv"));
        assert_eq!(config.time_data_path, Path::new("b.csv"));
        assert_eq!(config.figures_dir, Path::new("figs"));
        assert_eq!(config.results_dir, Path::new("res"));
    }

    #[test]
    fn test_cli_threshold_custom() {
        let cli = Cli::parse_from(["flowlens", "--threshold", "2.5"]);
        assert_eq!(cli.to_config().unwrap().threshold, 2.5);
    }

    #[test]
    fn test_cli_rejects_non_positive_threshold() {
        let cli = Cli::parse_from(["flowlens", "--threshold", "0"]);
        assert!(cli.to_config().is_err());
    }

    #[test]
    fn test_cli_format_json() {
        let cli = Cli::parse_from(["flowlens", "--format", "json"]);
        assert_eq!(cli.format, OutputFormat::Json);
    }

    #[test]
    fn test_cli_flags_override_config_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "threshold = 4.0").unwrap();
        writeln!(file, "results_dir = \"from-file\"").unwrap();

        let path = file.path().to_str().unwrap();
        let cli = Cli::parse_from(["flowlens", "-c", path, "--threshold", "2.0"]);
        let config = cli.to_config().unwrap();
        assert_eq!(config.threshold, 2.0);
        assert_eq!(config.results_dir, Path::new("from-file"));
    }
}
