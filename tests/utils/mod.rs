// Integration Test Utilities
//
// Writes raw-metrics / time-lookup CSV pairs into a temporary directory

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// One raw metrics row
#[derive(Debug, Clone)]
pub struct Row {
    pub id_time: i64,
    pub n_flows: f64,
    pub n_packets: f64,
    pub n_bytes: f64,
}

impl Row {
    pub fn new(id_time: i64, n_flows: f64, n_packets: f64) -> Self {
        Self {
            id_time,
            n_flows,
            n_packets,
            n_bytes: n_packets * 64.0,
        }
    }
}

/// Temporary workspace holding both input files
pub struct Fixture {
    pub dir: TempDir,
    pub raw: PathBuf,
    pub times: PathBuf,
}

impl Fixture {
    pub fn figures(&self) -> PathBuf {
        self.dir.path().join("figures")
    }

    pub fn results(&self) -> PathBuf {
        self.dir.path().join("results")
    }

    pub fn read_result(&self, name: &str) -> String {
        fs::read_to_string(self.results().join(name)).unwrap()
    }
}

/// Ten-minute bucket timestamp for an id (valid for ids below 144 * 20)
pub fn bucket_time(id_time: i64) -> String {
    let minutes = id_time * 10;
    format!(
        "2023-10-{:02}T{:02}:{:02}:00Z",
        1 + minutes / (24 * 60),
        (minutes / 60) % 24,
        minutes % 60
    )
}

fn write(path: &Path, content: &str) {
    fs::write(path, content).unwrap();
}

/// Write both files; `time_for` decides each lookup entry (None = no entry)
pub fn fixture_with_times(rows: &[Row], time_for: impl Fn(i64) -> Option<String>) -> Fixture {
    let dir = TempDir::new().unwrap();
    let raw = dir.path().join("raw.csv");
    let times = dir.path().join("times.csv");

    let mut raw_csv = String::from("id_time,n_flows,n_packets,n_bytes\n");
    let mut times_csv = String::from("id_time,time\n");
    for row in rows {
        raw_csv.push_str(&format!(
            "{},{},{},{}\n",
            row.id_time, row.n_flows, row.n_packets, row.n_bytes
        ));
        if let Some(time) = time_for(row.id_time) {
            times_csv.push_str(&format!("{},{}\n", row.id_time, time));
        }
    }
    write(&raw, &raw_csv);
    write(&times, &times_csv);

    Fixture { dir, raw, times }
}

/// Write both files with a valid timestamp for every row
pub fn fixture(rows: &[Row]) -> Fixture {
    fixture_with_times(rows, |id| Some(bucket_time(id)))
}

/// `baseline` quiet buckets followed by one flow spike
pub fn spike_rows(baseline: i64, spike_flows: f64) -> Vec<Row> {
    let mut rows: Vec<Row> = (0..baseline).map(|i| Row::new(i, 10.0, 120.0)).collect();
    rows.push(Row::new(baseline, spike_flows, 120.0));
    rows
}
