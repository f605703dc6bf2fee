//! CSV export of the flagged rows and the run summary
//!
//! `anomalies.csv` mirrors the raw metrics header plus the resolved `time`
//! column; `summary.csv` is a two-column key/value listing. Both files are
//! rewritten from scratch on every run.

use crate::anomaly::Summary;
use crate::dataset::{ColumnKind, MergedRecord, MergedTable, TIME};
use crate::timestamp::format_timestamp;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const ANOMALIES_FILE: &str = "anomalies.csv";
pub const SUMMARY_FILE: &str = "summary.csv";

/// Errors raised while writing result files
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to create {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Row {0} is out of range for the merged table")]
    RowOutOfRange(usize),
}

fn create(path: &Path) -> Result<File, ExportError> {
    File::create(path).map_err(|source| ExportError::Create {
        path: path.to_path_buf(),
        source,
    })
}

/// Format a cell according to its column dtype; missing cells are empty
fn format_value(value: Option<f64>, kind: ColumnKind) -> String {
    match (value, kind) {
        (None, _) => String::new(),
        (Some(v), ColumnKind::Int64) => format!("{}", v as i64),
        (Some(v), ColumnKind::Float64) => format_float(v),
    }
}

/// Shortest round-trip text for a float, `1.0` / `0.0001` / `1e+16` style
///
/// Positional for decimal exponents in -4..16, scientific with a signed
/// two-digit exponent outside that range.
fn format_float(v: f64) -> String {
    if v.is_infinite() {
        return if v > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if v.is_nan() {
        return String::new();
    }

    // `{:e}` yields the shortest digits that round-trip, e.g. "-1.25e3"
    let sci = format!("{:e}", v);
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return sci;
    };
    let Ok(exp) = exp.parse::<i32>() else {
        return sci;
    };

    if !(-4..16).contains(&exp) {
        let sign = if exp < 0 { '-' } else { '+' };
        return format!("{}e{}{:02}", mantissa, sign, exp.abs());
    }

    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", mantissa),
    };
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let point = exp + 1;

    let body = if point <= 0 {
        format!("0.{}{}", "0".repeat(point.unsigned_abs() as usize), digits)
    } else {
        let point = point as usize;
        if point >= digits.len() {
            format!("{}{}.0", digits, "0".repeat(point - digits.len()))
        } else {
            format!("{}.{}", &digits[..point], &digits[point..])
        }
    };
    format!("{}{}", sign, body)
}

fn record_fields(table: &MergedTable, record: &MergedRecord) -> Vec<String> {
    let mut fields: Vec<String> = table
        .schema
        .columns()
        .iter()
        .map(|c| format_value(record.flow.value(c.slot), c.kind))
        .collect();
    fields.push(record.time.as_ref().map(format_timestamp).unwrap_or_default());
    fields
}

/// Write the selected rows with every original column plus `time`
pub fn write_anomalies_to<W: Write>(
    writer: W,
    table: &MergedTable,
    rows: &[usize],
) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_writer(writer);

    let mut header: Vec<&str> = table
        .schema
        .columns()
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    header.push(TIME);
    writer.write_record(&header)?;

    for &row in rows {
        let record = table
            .records
            .get(row)
            .ok_or(ExportError::RowOutOfRange(row))?;
        writer.write_record(record_fields(table, record))?;
    }

    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Write `anomalies.csv`, truncating any previous file
pub fn write_anomalies(path: &Path, table: &MergedTable, rows: &[usize]) -> Result<(), ExportError> {
    write_anomalies_to(create(path)?, table, rows)?;
    debug!(path = %path.display(), rows = rows.len(), "wrote anomalies");
    Ok(())
}

/// Write the summary as a key/value listing under a `,0` header
pub fn write_summary_to<W: Write>(writer: W, summary: &Summary) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(["", "0"])?;
    for (key, value) in summary.entries() {
        writer.write_record([key, value.to_string().as_str()])?;
    }
    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Write `summary.csv`, truncating any previous file
pub fn write_summary(path: &Path, summary: &Summary) -> Result<(), ExportError> {
    write_summary_to(create(path)?, summary)?;
    debug!(path = %path.display(), "wrote summary");
    Ok(())
}
