//! Analysis configuration
//!
//! Defaults reproduce the fixed layout the analysis was built around. A
//! TOML file can override any subset of the fields, and command-line flags
//! override the file.

use crate::anomaly::DEFAULT_THRESHOLD;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_RAW_DATA_PATH: &str = "data/raw/ip_addresses_sample/agg_10_minutes/11.csv";
pub const DEFAULT_TIME_DATA_PATH: &str = "data/raw/times/times_10_minutes.csv";
pub const DEFAULT_FIGURES_DIR: &str = "figures";
pub const DEFAULT_RESULTS_DIR: &str = "results";

/// Input paths, output directories and detection threshold for one run
///
/// # Example TOML
/// ```toml
/// raw_data_path = "data/agg_10_minutes/11.csv"
/// time_data_path = "data/times_10_minutes.csv"
/// figures_dir = "out/figures"
/// results_dir = "out/results"
/// threshold = 3.0
/// font_path = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Raw per-bucket metrics CSV
    pub raw_data_path: PathBuf,
    /// `id_time` → `time` lookup CSV
    pub time_data_path: PathBuf,
    /// Where the PNG charts go
    pub figures_dir: PathBuf,
    /// Where `anomalies.csv` and `summary.csv` go
    pub results_dir: PathBuf,
    /// |z| must be strictly above this to flag a row
    pub threshold: f64,
    /// TrueType font for chart text
    pub font_path: Option<PathBuf>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            raw_data_path: PathBuf::from(DEFAULT_RAW_DATA_PATH),
            time_data_path: PathBuf::from(DEFAULT_TIME_DATA_PATH),
            figures_dir: PathBuf::from(DEFAULT_FIGURES_DIR),
            results_dir: PathBuf::from(DEFAULT_RESULTS_DIR),
            threshold: DEFAULT_THRESHOLD,
            font_path: None,
        }
    }
}

impl AnalysisConfig {
    /// Load a configuration file; absent keys keep their defaults
    ///
    /// # Errors
    /// Returns error if the file doesn't exist, has invalid TOML syntax or
    /// contains unknown keys.
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read config file: {}", path.as_ref().display())
        })?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.as_ref().display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML configuration")
    }

    /// Reject thresholds that would make every comparison meaningless
    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            anyhow::bail!(
                "Invalid anomaly threshold: {} (must be a positive number of standard deviations)",
                self.threshold
            );
        }
        Ok(())
    }
}
