//! End-to-end analysis run
//!
//! load → merge → describe → plot → detect → export, strictly in order.
//! The first failure aborts the run; files written before it stay on disk.

use crate::anomaly::{AnomalyDetector, AnomalyReport, Summary};
use crate::charts::{self, ChartRenderer};
use crate::cli::OutputFormat;
use crate::config::AnalysisConfig;
use crate::csv_output;
use crate::dataset::{self, MergedTable};
use crate::report::DatasetOverview;
use crate::stats;
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, info_span};

/// Files produced by a completed run
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub summary: Summary,
    pub figures: Vec<PathBuf>,
    pub anomalies_csv: PathBuf,
    pub summary_csv: PathBuf,
}

/// Load both inputs and join them
pub fn load(config: &AnalysisConfig) -> Result<MergedTable> {
    let _span = info_span!("load").entered();
    let flows = dataset::load_flows(&config.raw_data_path).with_context(|| {
        format!(
            "Failed to load flow metrics from {}",
            config.raw_data_path.display()
        )
    })?;
    let lookup = dataset::load_time_lookup(&config.time_data_path).with_context(|| {
        format!(
            "Failed to load time lookup from {}",
            config.time_data_path.display()
        )
    })?;

    let table = dataset::left_join(flows, &lookup);
    info!(
        rows = table.len(),
        missing_times = table.missing_times(),
        "merged dataset"
    );
    Ok(table)
}

/// Run the whole analysis, writing the console report to `out`
pub fn run<W: Write>(config: &AnalysisConfig, format: OutputFormat, out: &mut W) -> Result<RunOutcome> {
    config.validate()?;

    for dir in [&config.figures_dir, &config.results_dir] {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    }

    let table = load(config)?;

    {
        let _span = info_span!("describe").entered();
        let overview = DatasetOverview::from_table(&table);
        match format {
            OutputFormat::Text => overview.print_text(out)?,
            OutputFormat::Json => overview.print_json(out)?,
        }
    }

    let renderer = ChartRenderer::new(config.font_path.as_deref());
    let series_path = config.figures_dir.join(charts::FLOWS_PACKETS_FILE);
    let heatmap_path = config.figures_dir.join(charts::HEATMAP_FILE);
    let anomalies_png = config.figures_dir.join(charts::ANOMALIES_FILE);

    {
        let _span = info_span!("plot").entered();
        renderer.flows_and_packets(&table, &series_path)?;
        renderer.correlation_heatmap(&stats::correlation_matrix(&table), &heatmap_path)?;
    }

    let report: AnomalyReport = {
        let _span = info_span!("detect", threshold = config.threshold).entered();
        AnomalyDetector::new(config.threshold).run(&table)
    };
    if format == OutputFormat::Text {
        writeln!(out)?;
        report.print_summary(out)?;
    } else {
        writeln!(out, "Anomalies detected: {}", report.combined.len())?;
    }

    let summary = report.summary(table.len());
    let anomalies_csv = config.results_dir.join(csv_output::ANOMALIES_FILE);
    let summary_csv = config.results_dir.join(csv_output::SUMMARY_FILE);

    {
        let _span = info_span!("export").entered();
        csv_output::write_anomalies(&anomalies_csv, &table, &report.combined)
            .with_context(|| format!("Failed to write {}", anomalies_csv.display()))?;
        renderer.anomalies_in_flows(&table, &report.flows, &anomalies_png)?;
        csv_output::write_summary(&summary_csv, &summary)
            .with_context(|| format!("Failed to write {}", summary_csv.display()))?;
    }

    writeln!(out, "\nAnalysis complete. Figures and results saved.")?;
    info!(
        total_records = summary.total_records,
        total_anomalies = summary.total_anomalies,
        "analysis complete"
    );

    Ok(RunOutcome {
        summary,
        figures: vec![series_path, heatmap_path, anomalies_png],
        anomalies_csv,
        summary_csv,
    })
}
