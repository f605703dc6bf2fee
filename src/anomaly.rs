//! Z-score outlier detection on the flow and packet counts
//!
//! Each metric is scored against its own column-wide mean and sample
//! standard deviation. A row is flagged when |z| is strictly above the
//! threshold. Rows with a missing value, and every row of a column whose
//! standard deviation is zero or undefined, have no z-score and are never
//! flagged.

use crate::dataset::{ColumnSlot, MergedTable, N_FLOWS, N_PACKETS};
use crate::stats;
use serde::Serialize;
use std::collections::HashSet;
use std::io::{self, Write};
use tracing::debug;

/// Default threshold in standard deviations
pub const DEFAULT_THRESHOLD: f64 = 3.0;

/// The two metrics checked for outliers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Flows,
    Packets,
}

impl Metric {
    pub fn column(self) -> &'static str {
        match self {
            Metric::Flows => N_FLOWS,
            Metric::Packets => N_PACKETS,
        }
    }

    fn slot(self) -> ColumnSlot {
        match self {
            Metric::Flows => ColumnSlot::Flows,
            Metric::Packets => ColumnSlot::Packets,
        }
    }
}

/// Anomaly severity classification based on Z-score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AnomalySeverity {
    /// Up to 4.0σ from mean
    Low,
    /// 4.0σ - 5.0σ from mean
    Medium,
    /// >5.0σ from mean
    High,
}

/// Classify anomaly severity based on Z-score
fn classify_severity(z_score: f64) -> AnomalySeverity {
    let abs_z = z_score.abs();
    if abs_z > 5.0 {
        AnomalySeverity::High
    } else if abs_z > 4.0 {
        AnomalySeverity::Medium
    } else {
        AnomalySeverity::Low
    }
}

/// A row flagged on one metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlaggedRow {
    /// Position in the merged table
    pub row: usize,
    pub id_time: i64,
    pub value: f64,
    pub z_score: f64,
    pub severity: AnomalySeverity,
}

/// Outcome of one metric pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricAnomalies {
    pub metric: Metric,
    /// Column mean over present values
    pub mean: Option<f64>,
    /// Column sample standard deviation
    pub std: Option<f64>,
    /// Flagged rows in table order
    pub flagged: Vec<FlaggedRow>,
}

impl MetricAnomalies {
    pub fn len(&self) -> usize {
        self.flagged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flagged.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = usize> + '_ {
        self.flagged.iter().map(|f| f.row)
    }
}

/// Z-score of each value against `mean` / `std`
///
/// `None` for missing values, and for every value when `std` is undefined,
/// zero or non-finite.
pub fn z_scores(values: &[Option<f64>], mean: Option<f64>, std: Option<f64>) -> Vec<Option<f64>> {
    let scale = match (mean, std) {
        (Some(mean), Some(std)) if std > 0.0 && std.is_finite() => Some((mean, std)),
        _ => None,
    };

    values
        .iter()
        .map(|value| {
            let (mean, std) = scale?;
            let z = ((*value)? - mean) / std;
            z.is_finite().then_some(z)
        })
        .collect()
}

/// Flag the rows of one metric whose |z| exceeds `threshold`
pub fn detect(table: &MergedTable, metric: Metric, threshold: f64) -> MetricAnomalies {
    let values = table.column_values(metric.slot());
    let present = stats::present(&values);
    let mean = stats::mean(&present);
    let std = stats::sample_std(&present);

    let flagged: Vec<FlaggedRow> = z_scores(&values, mean, std)
        .into_iter()
        .enumerate()
        .filter_map(|(row, z)| {
            let z = z?;
            if z.abs() <= threshold {
                return None;
            }
            Some(FlaggedRow {
                row,
                id_time: table.records[row].flow.id_time,
                value: values[row]?,
                z_score: z,
                severity: classify_severity(z),
            })
        })
        .collect();

    debug!(
        column = metric.column(),
        ?mean,
        ?std,
        threshold,
        flagged = flagged.len(),
        "scored metric"
    );

    MetricAnomalies {
        metric,
        mean,
        std,
        flagged,
    }
}

/// Four-count run summary written to `summary.csv`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total_records: usize,
    pub total_anomalies: usize,
    pub anomalies_flows: usize,
    pub anomalies_packets: usize,
}

impl Summary {
    /// Key/value pairs in export order
    pub fn entries(&self) -> [(&'static str, usize); 4] {
        [
            ("total_records", self.total_records),
            ("total_anomalies", self.total_anomalies),
            ("anomalies_flows", self.anomalies_flows),
            ("anomalies_packets", self.anomalies_packets),
        ]
    }
}

/// Both metric passes and their deduplicated union
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyReport {
    pub flows: MetricAnomalies,
    pub packets: MetricAnomalies,
    /// Row indices: flows hits in table order, then packets-only hits
    pub combined: Vec<usize>,
}

impl AnomalyReport {
    pub fn summary(&self, total_records: usize) -> Summary {
        Summary {
            total_records,
            total_anomalies: self.combined.len(),
            anomalies_flows: self.flows.len(),
            anomalies_packets: self.packets.len(),
        }
    }

    /// Print anomaly summary report
    pub fn print_summary<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "Anomalies detected: {}", self.combined.len())?;
        if self.combined.is_empty() {
            return Ok(());
        }

        let hits: Vec<(Metric, &FlaggedRow)> = self
            .flows
            .flagged
            .iter()
            .map(|f| (Metric::Flows, f))
            .chain(self.packets.flagged.iter().map(|f| (Metric::Packets, f)))
            .collect();

        let count = |severity| hits.iter().filter(|(_, f)| f.severity == severity).count();
        let (high, medium, low) = (
            count(AnomalySeverity::High),
            count(AnomalySeverity::Medium),
            count(AnomalySeverity::Low),
        );

        writeln!(out, "Severity Distribution:")?;
        if high > 0 {
            writeln!(out, "  High (>5.0σ):   {} hits", high)?;
        }
        if medium > 0 {
            writeln!(out, "  Medium (4-5σ): {} hits", medium)?;
        }
        if low > 0 {
            writeln!(out, "  Low (≤4σ):      {} hits", low)?;
        }

        let mut sorted = hits;
        sorted.sort_by(|a, b| b.1.z_score.abs().total_cmp(&a.1.z_score.abs()));

        writeln!(out, "Top Anomalies (by Z-score):")?;
        for (i, (metric, hit)) in sorted.iter().take(10).enumerate() {
            writeln!(
                out,
                "  {}. id_time={} {}={} - {:.1}σ",
                i + 1,
                hit.id_time,
                metric.column(),
                hit.value,
                hit.z_score.abs()
            )?;
        }
        if sorted.len() > 10 {
            writeln!(out, "  ... and {} more", sorted.len() - 10)?;
        }
        Ok(())
    }
}

/// Runs both metric passes with one threshold
#[derive(Debug, Clone, Copy)]
pub struct AnomalyDetector {
    threshold: f64,
}

impl AnomalyDetector {
    /// Create new anomaly detector
    ///
    /// # Arguments
    /// * `threshold` - Z-score threshold for anomaly (default: 3.0σ)
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Score `n_flows` and `n_packets` and union the flagged rows
    pub fn run(&self, table: &MergedTable) -> AnomalyReport {
        let flows = detect(table, Metric::Flows, self.threshold);
        let packets = detect(table, Metric::Packets, self.threshold);

        let mut seen = HashSet::new();
        let combined = flows
            .rows()
            .chain(packets.rows())
            .filter(|row| seen.insert(*row))
            .collect();

        AnomalyReport {
            flows,
            packets,
            combined,
        }
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{left_join, read_flows, TimeLookup};
    use std::path::Path;

    fn table(rows: &[(i64, &str, &str)]) -> MergedTable {
        let mut csv = String::from("id_time,n_flows,n_packets\n");
        for (id, flows, packets) in rows {
            csv.push_str(&format!("{},{},{}\n", id, flows, packets));
        }
        let flows = read_flows(csv.as_bytes(), Path::new("raw.csv")).unwrap();
        left_join(flows, &TimeLookup::default())
    }

    /// `n` rows of baseline traffic followed by one row with the given counts
    fn spike_table(n: i64, flows: &str, packets: &str) -> MergedTable {
        let mut rows: Vec<(i64, &str, &str)> = (0..n).map(|i| (i, "10", "100")).collect();
        rows.push((n, flows, packets));
        table(&rows)
    }

    #[test]
    fn test_z_scores_basic() {
        let z = z_scores(&[Some(1.0), Some(3.0), None], Some(2.0), Some(1.0));
        assert_eq!(z, vec![Some(-1.0), Some(1.0), None]);
    }

    #[test]
    fn test_z_scores_zero_std_undefined() {
        let z = z_scores(&[Some(5.0), Some(5.0)], Some(5.0), Some(0.0));
        assert_eq!(z, vec![None, None]);
        let z = z_scores(&[Some(5.0)], Some(5.0), None);
        assert_eq!(z, vec![None]);
    }

    #[test]
    fn test_severity_classification() {
        assert_eq!(classify_severity(3.5), AnomalySeverity::Low);
        assert_eq!(classify_severity(4.5), AnomalySeverity::Medium);
        assert_eq!(classify_severity(6.0), AnomalySeverity::High);

        // Anomalously low values are classified symmetrically
        assert_eq!(classify_severity(-3.5), AnomalySeverity::Low);
        assert_eq!(classify_severity(-4.5), AnomalySeverity::Medium);
        assert_eq!(classify_severity(-6.0), AnomalySeverity::High);
    }

    #[test]
    fn test_spike_is_flagged() {
        let table = spike_table(20, "1000", "100");
        let result = detect(&table, Metric::Flows, DEFAULT_THRESHOLD);

        assert_eq!(result.len(), 1);
        let hit = &result.flagged[0];
        assert_eq!(hit.row, 20);
        assert_eq!(hit.id_time, 20);
        assert_eq!(hit.value, 1000.0);
        // Largest attainable z for n = 21 is 20 / sqrt(21)
        assert!((hit.z_score - 20.0 / 21f64.sqrt()).abs() < 1e-9);
        assert_eq!(hit.severity, AnomalySeverity::Medium);
    }

    #[test]
    fn test_small_column_cannot_exceed_threshold() {
        // Five rows cap |z| at 4 / sqrt(5) ≈ 1.79
        let table = table(&[
            (1, "10", "1"),
            (2, "10", "1"),
            (3, "10", "1"),
            (4, "10", "1"),
            (5, "1000", "1"),
        ]);
        let result = detect(&table, Metric::Flows, DEFAULT_THRESHOLD);
        assert!(result.is_empty());
    }

    #[test]
    fn test_constant_column_never_flagged() {
        let table = spike_table(30, "10", "100");
        let result = detect(&table, Metric::Packets, DEFAULT_THRESHOLD);
        assert!(result.is_empty());
        assert_eq!(result.std, Some(0.0));
    }

    #[test]
    fn test_single_row_never_flagged() {
        let table = table(&[(1, "10", "100")]);
        let result = detect(&table, Metric::Flows, 0.0);
        assert!(result.is_empty());
        assert_eq!(result.std, None);
    }

    #[test]
    fn test_threshold_is_strict() {
        // Values -1, +1 around mean 0 with std sqrt(2): |z| = 1/sqrt(2)
        let table = table(&[(1, "-1", "0"), (2, "1", "0")]);
        let exact = 1.0 / 2f64.sqrt();
        assert!(detect(&table, Metric::Flows, exact).is_empty());
        assert_eq!(detect(&table, Metric::Flows, exact - 1e-9).len(), 2);
    }

    #[test]
    fn test_missing_values_are_skipped() {
        let mut rows: Vec<(i64, &str, &str)> = (0..20).map(|i| (i, "10", "100")).collect();
        rows.push((20, "", "100"));
        rows.push((21, "1000", "100"));
        let table = table(&rows);

        let result = detect(&table, Metric::Flows, DEFAULT_THRESHOLD);
        assert_eq!(result.rows().collect::<Vec<_>>(), vec![21]);
    }

    #[test]
    fn test_combined_deduplicates_rows() {
        let table = spike_table(20, "1000", "9000");
        let report = AnomalyDetector::default().run(&table);

        assert_eq!(report.flows.len(), 1);
        assert_eq!(report.packets.len(), 1);
        assert_eq!(report.combined, vec![20]);

        let summary = report.summary(table.len());
        assert_eq!(summary.total_records, 21);
        assert_eq!(summary.total_anomalies, 1);
        assert!(summary.total_anomalies <= summary.anomalies_flows + summary.anomalies_packets);
    }

    #[test]
    fn test_combined_orders_flows_before_packets_only() {
        let mut rows: Vec<(i64, &str, &str)> = (0..30).map(|i| (i, "10", "100")).collect();
        rows[3] = (3, "10", "9000");
        rows[25] = (25, "1000", "100");
        let table = table(&rows);

        let report = AnomalyDetector::default().run(&table);
        assert_eq!(report.combined, vec![25, 3]);
    }

    #[test]
    fn test_print_summary_lists_hits() {
        let table = spike_table(20, "1000", "100");
        let report = AnomalyDetector::default().run(&table);

        let mut out = Vec::new();
        report.print_summary(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Anomalies detected: 1\n"));
        assert!(text.contains("id_time=20 n_flows=1000"));
    }

    #[test]
    fn test_print_summary_empty() {
        let table = spike_table(5, "10", "100");
        let report = AnomalyDetector::default().run(&table);

        let mut out = Vec::new();
        report.print_summary(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Anomalies detected: 0\n");
    }
}
