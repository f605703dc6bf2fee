//! Flow dataset ingestion and the `id_time` left join
//!
//! The raw metrics file has no fixed schema beyond three required columns,
//! so rows are read into [`FlowRecord`]s with named fields for the join key
//! and the two checked metrics, while every other column is kept in file
//! order as an extra metric. [`FlowSchema`] remembers the original header so
//! exports can reproduce the input layout.

use crate::timestamp;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Join key column, present in both input files
pub const ID_TIME: &str = "id_time";
/// Flow count column
pub const N_FLOWS: &str = "n_flows";
/// Packet count column
pub const N_PACKETS: &str = "n_packets";
/// Timestamp column in the lookup file (and in the merged table)
pub const TIME: &str = "time";

/// Errors raised while reading the input files
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing required column '{column}' in {path}")]
    MissingColumn { path: PathBuf, column: &'static str },

    #[error("Duplicate column '{0}' in header")]
    DuplicateColumn(String),

    #[error("Column '{column}' in {path} clashes with the joined timestamp column")]
    ReservedColumn { path: PathBuf, column: &'static str },

    #[error("Row {row}: column '{column}' has non-numeric value '{value}'")]
    InvalidNumber {
        row: usize,
        column: String,
        value: String,
    },

    #[error("Row {row}: join key '{column}' is missing or not an integer ('{value}')")]
    InvalidKey {
        row: usize,
        column: &'static str,
        value: String,
    },
}

/// Storage type of a numeric column, as reported in the overview
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    /// Every value present and integral
    Int64,
    /// Fractional values or at least one missing value
    Float64,
}

impl ColumnKind {
    pub fn dtype(self) -> &'static str {
        match self {
            ColumnKind::Int64 => "int64",
            ColumnKind::Float64 => "float64",
        }
    }
}

/// Where a header column lives inside a [`FlowRecord`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnSlot {
    IdTime,
    Flows,
    Packets,
    Extra(usize),
}

/// One column of the raw metrics file
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub slot: ColumnSlot,
    pub kind: ColumnKind,
}

/// Column layout of the raw metrics file, in header order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowSchema {
    columns: Vec<ColumnSpec>,
}

impl FlowSchema {
    /// All columns in original header order
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Columns that feed the correlation matrix (everything but the join key)
    pub fn metric_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|c| c.slot != ColumnSlot::IdTime)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// One time bucket of the raw metrics file
#[derive(Debug, Clone, PartialEq)]
pub struct FlowRecord {
    pub id_time: i64,
    pub n_flows: Option<f64>,
    pub n_packets: Option<f64>,
    /// Remaining numeric columns, indexed by [`ColumnSlot::Extra`]
    pub extra: Vec<Option<f64>>,
}

impl FlowRecord {
    /// Value stored in `slot`; `None` for a missing cell
    pub fn value(&self, slot: ColumnSlot) -> Option<f64> {
        match slot {
            ColumnSlot::IdTime => Some(self.id_time as f64),
            ColumnSlot::Flows => self.n_flows,
            ColumnSlot::Packets => self.n_packets,
            ColumnSlot::Extra(i) => self.extra.get(i).copied().flatten(),
        }
    }
}

/// Parsed raw metrics file
#[derive(Debug, Clone, Default)]
pub struct FlowTable {
    pub schema: FlowSchema,
    pub records: Vec<FlowRecord>,
}

impl FlowTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// `id_time` → raw timestamp string
#[derive(Debug, Clone, Default)]
pub struct TimeLookup {
    entries: HashMap<i64, String>,
}

impl TimeLookup {
    /// Insert a mapping; the first entry for an id wins
    pub fn insert(&mut self, id_time: i64, time: String) -> bool {
        if self.entries.contains_key(&id_time) {
            return false;
        }
        self.entries.insert(id_time, time);
        true
    }

    pub fn get(&self, id_time: i64) -> Option<&str> {
        self.entries.get(&id_time).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A flow record enriched with its resolved timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRecord {
    pub flow: FlowRecord,
    /// `None` when the id was absent from the lookup or the string was unparseable
    pub time: Option<DateTime<Utc>>,
}

/// Result of the left join: one merged record per flow record, same order
#[derive(Debug, Clone, Default)]
pub struct MergedTable {
    pub schema: FlowSchema,
    pub records: Vec<MergedRecord>,
}

impl MergedTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Column values in row order (`None` for missing cells)
    pub fn column_values(&self, slot: ColumnSlot) -> Vec<Option<f64>> {
        self.records.iter().map(|r| r.flow.value(slot)).collect()
    }

    /// Number of rows whose timestamp is missing
    pub fn missing_times(&self) -> usize {
        self.records.iter().filter(|r| r.time.is_none()).count()
    }
}

fn open(path: &Path) -> Result<BufReader<File>, DatasetError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| DatasetError::Open {
            path: path.to_path_buf(),
            source,
        })
}

/// Load the raw metrics CSV
pub fn load_flows(path: &Path) -> Result<FlowTable, DatasetError> {
    let table = read_flows(open(path)?, path)?;
    debug!(
        path = %path.display(),
        rows = table.len(),
        columns = table.schema.columns().len(),
        "loaded flow metrics"
    );
    Ok(table)
}

/// Parse raw metrics CSV from any reader; `origin` is used in error messages
pub fn read_flows<R: Read>(reader: R, origin: &Path) -> Result<FlowTable, DatasetError> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers = reader.headers()?.clone();

    let mut columns = Vec::with_capacity(headers.len());
    let mut extra_count = 0;
    for name in headers.iter() {
        if columns.iter().any(|c: &ColumnSpec| c.name == name) {
            return Err(DatasetError::DuplicateColumn(name.to_string()));
        }
        if name == TIME {
            return Err(DatasetError::ReservedColumn {
                path: origin.to_path_buf(),
                column: TIME,
            });
        }
        let slot = match name {
            ID_TIME => ColumnSlot::IdTime,
            N_FLOWS => ColumnSlot::Flows,
            N_PACKETS => ColumnSlot::Packets,
            _ => {
                extra_count += 1;
                ColumnSlot::Extra(extra_count - 1)
            }
        };
        columns.push(ColumnSpec {
            name: name.to_string(),
            slot,
            kind: ColumnKind::Int64,
        });
    }

    for (required, slot) in [
        (ID_TIME, ColumnSlot::IdTime),
        (N_FLOWS, ColumnSlot::Flows),
        (N_PACKETS, ColumnSlot::Packets),
    ] {
        if !columns.iter().any(|c| c.slot == slot) {
            return Err(DatasetError::MissingColumn {
                path: origin.to_path_buf(),
                column: required,
            });
        }
    }

    let mut records = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let row = index + 1;
        let record = result?;
        let mut flow = FlowRecord {
            id_time: 0,
            n_flows: None,
            n_packets: None,
            extra: vec![None; extra_count],
        };

        for (column, field) in columns.iter_mut().zip(record.iter()) {
            let target = match column.slot {
                ColumnSlot::IdTime => {
                    flow.id_time = parse_key(field, row)?;
                    if field.contains(['.', 'e', 'E']) {
                        column.kind = ColumnKind::Float64;
                    }
                    continue;
                }
                ColumnSlot::Flows => &mut flow.n_flows,
                ColumnSlot::Packets => &mut flow.n_packets,
                ColumnSlot::Extra(i) => &mut flow.extra[i],
            };

            let value = parse_cell(field, row, &column.name)?;
            match value {
                None => column.kind = ColumnKind::Float64,
                Some(v) if v.fract() != 0.0 || !v.is_finite() => column.kind = ColumnKind::Float64,
                Some(_) if field.contains(['.', 'e', 'E']) => column.kind = ColumnKind::Float64,
                Some(_) => {}
            }
            *target = value;
        }

        records.push(flow);
    }

    Ok(FlowTable {
        schema: FlowSchema { columns },
        records,
    })
}

fn parse_key(field: &str, row: usize) -> Result<i64, DatasetError> {
    let trimmed = field.trim();
    trimmed
        .parse::<i64>()
        .or_else(|_| {
            // Keys written as "12.0" by float-typed exporters
            trimmed
                .parse::<f64>()
                .ok()
                .filter(|v| v.fract() == 0.0 && v.is_finite())
                .map(|v| v as i64)
                .ok_or(())
        })
        .map_err(|_| DatasetError::InvalidKey {
            row,
            column: ID_TIME,
            value: field.to_string(),
        })
}

fn parse_cell(field: &str, row: usize, column: &str) -> Result<Option<f64>, DatasetError> {
    let trimmed = field.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    trimmed
        .parse::<f64>()
        .map(Some)
        .map_err(|_| DatasetError::InvalidNumber {
            row,
            column: column.to_string(),
            value: field.to_string(),
        })
}

/// Load the `id_time` → `time` lookup CSV
pub fn load_time_lookup(path: &Path) -> Result<TimeLookup, DatasetError> {
    let lookup = read_time_lookup(open(path)?, path)?;
    debug!(path = %path.display(), entries = lookup.len(), "loaded time lookup");
    Ok(lookup)
}

/// Parse a time lookup CSV from any reader; columns other than `id_time`
/// and `time` are ignored
pub fn read_time_lookup<R: Read>(reader: R, origin: &Path) -> Result<TimeLookup, DatasetError> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers = reader.headers()?.clone();

    let position = |column: &'static str| {
        headers
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| DatasetError::MissingColumn {
                path: origin.to_path_buf(),
                column,
            })
    };
    let id_idx = position(ID_TIME)?;
    let time_idx = position(TIME)?;

    let mut lookup = TimeLookup::default();
    let mut duplicates = 0usize;
    for (index, result) in reader.records().enumerate() {
        let record = result?;
        let id_time = parse_key(record.get(id_idx).unwrap_or(""), index + 1)?;
        let time = record.get(time_idx).unwrap_or("").to_string();
        if !lookup.insert(id_time, time) {
            duplicates += 1;
        }
    }

    if duplicates > 0 {
        warn!(
            duplicates,
            "time lookup repeats id_time values; keeping the first occurrence"
        );
    }

    Ok(lookup)
}

/// Left-join flow records onto the time lookup
///
/// Every flow record survives in its original order. Ids missing from the
/// lookup, and lookup strings that do not parse, yield a `None` timestamp.
pub fn left_join(flows: FlowTable, lookup: &TimeLookup) -> MergedTable {
    let mut unmatched = 0usize;
    let mut unparseable = 0usize;

    let records: Vec<MergedRecord> = flows
        .records
        .into_iter()
        .map(|flow| {
            let time = match lookup.get(flow.id_time) {
                Some(raw) => {
                    let parsed = timestamp::parse_or_missing(raw);
                    if parsed.is_none() {
                        unparseable += 1;
                    }
                    parsed
                }
                None => {
                    unmatched += 1;
                    None
                }
            };
            MergedRecord { flow, time }
        })
        .collect();

    debug!(
        rows = records.len(),
        unmatched, unparseable, "joined flow metrics with time lookup"
    );

    MergedTable {
        schema: flows.schema,
        records,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flows(csv: &str) -> FlowTable {
        read_flows(csv.as_bytes(), Path::new("raw.csv")).unwrap()
    }

    fn lookup(csv: &str) -> TimeLookup {
        read_time_lookup(csv.as_bytes(), Path::new("times.csv")).unwrap()
    }

    #[test]
    fn test_read_flows_maps_named_and_extra_columns() {
        let table = flows("id_time,n_flows,n_bytes,n_packets\n1,10,500,20\n2,11,510,21\n");
        assert_eq!(table.len(), 2);
        assert_eq!(table.records[0].id_time, 1);
        assert_eq!(table.records[0].n_flows, Some(10.0));
        assert_eq!(table.records[0].n_packets, Some(20.0));
        assert_eq!(table.records[1].extra, vec![Some(510.0)]);

        let names: Vec<_> = table.schema.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["id_time", "n_flows", "n_bytes", "n_packets"]);
        assert_eq!(
            table.schema.column("n_bytes").unwrap().slot,
            ColumnSlot::Extra(0)
        );
    }

    #[test]
    fn test_column_kinds_follow_values() {
        let table = flows("id_time,n_flows,n_packets,ratio,sparse\n1,10,20,0.5,1\n2,11,21,0.25,\n");
        let kind = |name: &str| table.schema.column(name).unwrap().kind;
        assert_eq!(kind("id_time"), ColumnKind::Int64);
        assert_eq!(kind("n_flows"), ColumnKind::Int64);
        assert_eq!(kind("ratio"), ColumnKind::Float64);
        // A missing cell turns an integral column into float64
        assert_eq!(kind("sparse"), ColumnKind::Float64);
        assert_eq!(table.records[1].extra[1], None);
    }

    #[test]
    fn test_decimal_notation_is_float() {
        let table = flows("id_time,n_flows,n_packets\n1,10.0,20\n");
        assert_eq!(table.schema.column("n_flows").unwrap().kind, ColumnKind::Float64);
        assert_eq!(table.schema.column("n_packets").unwrap().kind, ColumnKind::Int64);
    }

    #[test]
    fn test_missing_required_column() {
        let err = read_flows("id_time,n_flows\n1,2\n".as_bytes(), Path::new("raw.csv")).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::MissingColumn { column: "n_packets", .. }
        ));
    }

    #[test]
    fn test_non_numeric_metric_is_an_error() {
        let err = read_flows(
            "id_time,n_flows,n_packets\n1,ten,20\n".as_bytes(),
            Path::new("raw.csv"),
        )
        .unwrap_err();
        match err {
            DatasetError::InvalidNumber { row, column, value } => {
                assert_eq!(row, 1);
                assert_eq!(column, "n_flows");
                assert_eq!(value, "ten");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_join_key_is_an_error() {
        let err = read_flows(
            "id_time,n_flows,n_packets\nabc,1,2\n".as_bytes(),
            Path::new("raw.csv"),
        )
        .unwrap_err();
        assert!(matches!(err, DatasetError::InvalidKey { row: 1, .. }));
    }

    #[test]
    fn test_ragged_row_is_malformed_csv() {
        let err = read_flows(
            "id_time,n_flows,n_packets\n1,2\n".as_bytes(),
            Path::new("raw.csv"),
        )
        .unwrap_err();
        assert!(matches!(err, DatasetError::Csv(_)));
    }

    #[test]
    fn test_duplicate_header_rejected() {
        let err = read_flows(
            "id_time,n_flows,n_packets,n_flows\n1,2,3,4\n".as_bytes(),
            Path::new("raw.csv"),
        )
        .unwrap_err();
        assert!(matches!(err, DatasetError::DuplicateColumn(name) if name == "n_flows"));
    }

    #[test]
    fn test_raw_time_column_rejected() {
        let err = read_flows(
            "id_time,n_flows,n_packets,time\n1,10,100,7\n".as_bytes(),
            Path::new("raw.csv"),
        )
        .unwrap_err();
        assert!(matches!(err, DatasetError::ReservedColumn { column: "time", .. }));
        assert!(err.to_string().contains("raw.csv"));
    }

    #[test]
    fn test_float_written_key_is_float64() {
        let table = flows("id_time,n_flows,n_packets\n1.0,10,20\n2.0,11,21\n");
        assert_eq!(table.records[1].id_time, 2);
        assert_eq!(table.schema.column("id_time").unwrap().kind, ColumnKind::Float64);

        let table = flows("id_time,n_flows,n_packets\n1,10,20\n");
        assert_eq!(table.schema.column("id_time").unwrap().kind, ColumnKind::Int64);
    }

    #[test]
    fn test_lookup_first_occurrence_wins() {
        let lookup = lookup("id_time,time\n1,2023-10-09T00:00:00Z\n1,2024-01-01T00:00:00Z\n");
        assert_eq!(lookup.len(), 1);
        assert_eq!(lookup.get(1), Some("2023-10-09T00:00:00Z"));
    }

    #[test]
    fn test_lookup_requires_time_column() {
        let err = read_time_lookup("id_time,when\n1,x\n".as_bytes(), Path::new("times.csv"))
            .unwrap_err();
        assert!(matches!(err, DatasetError::MissingColumn { column: "time", .. }));
    }

    #[test]
    fn test_left_join_keeps_every_row() {
        let table = flows("id_time,n_flows,n_packets\n1,10,20\n2,11,21\n3,12,22\n");
        let lookup = lookup("id_time,time\n1,2023-10-09T00:00:00Z\n3,garbage\n");
        let merged = left_join(table, &lookup);

        assert_eq!(merged.len(), 3);
        assert!(merged.records[0].time.is_some());
        // Unmatched id
        assert!(merged.records[1].time.is_none());
        // Matched but unparseable
        assert!(merged.records[2].time.is_none());
        assert_eq!(merged.missing_times(), 2);
        assert_eq!(merged.records[2].flow.n_flows, Some(12.0));
    }

    #[test]
    fn test_load_flows_missing_file() {
        let err = load_flows(Path::new("/nonexistent/flowlens/raw.csv")).unwrap_err();
        assert!(matches!(err, DatasetError::Open { .. }));
        assert!(err.to_string().contains("/nonexistent/flowlens/raw.csv"));
    }
}
