//! Console overview of the merged dataset
//!
//! Missing-value counts, column dtypes and a describe table, printed as
//! aligned text or as JSON (`--format json`).

use crate::dataset::{MergedTable, TIME};
use crate::stats::{self, ColumnSummary};
use serde::Serialize;
use std::io::{self, Write};

/// dtype reported for the normalized timestamp column
pub const TIME_DTYPE: &str = "datetime64[ns, UTC]";

/// Describe table entry for one numeric column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DescribedColumn {
    pub column: String,
    #[serde(flatten)]
    pub summary: ColumnSummary,
}

/// Everything printed before the charts are rendered
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetOverview {
    pub rows: usize,
    pub missing_values: Vec<(String, usize)>,
    pub dtypes: Vec<(String, &'static str)>,
    pub summary_statistics: Vec<DescribedColumn>,
}

impl DatasetOverview {
    pub fn from_table(table: &MergedTable) -> Self {
        let mut dtypes: Vec<(String, &'static str)> = table
            .schema
            .columns()
            .iter()
            .map(|c| (c.name.clone(), c.kind.dtype()))
            .collect();
        dtypes.push((TIME.to_string(), TIME_DTYPE));

        let summary_statistics = table
            .schema
            .columns()
            .iter()
            .map(|c| DescribedColumn {
                column: c.name.clone(),
                summary: stats::describe(&table.column_values(c.slot)),
            })
            .collect();

        Self {
            rows: table.len(),
            missing_values: stats::missing_counts(table),
            dtypes,
            summary_statistics,
        }
    }

    /// Human-readable overview
    pub fn print_text<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let width = self
            .dtypes
            .iter()
            .map(|(name, _)| name.len())
            .max()
            .unwrap_or(0);

        writeln!(out, "Missing values:")?;
        for (name, missing) in &self.missing_values {
            writeln!(out, "{:<width$}  {}", name, missing, width = width)?;
        }

        writeln!(out, "\nData types:")?;
        for (name, dtype) in &self.dtypes {
            writeln!(out, "{:<width$}  {}", name, dtype, width = width)?;
        }

        writeln!(out, "\nSummary statistics:")?;
        self.print_describe_table(out)
    }

    /// Statistics as rows, columns across, like a describe() frame
    fn print_describe_table<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let cell = self
            .summary_statistics
            .iter()
            .map(|c| c.column.len())
            .max()
            .unwrap_or(0)
            .max(14);

        write!(out, "{:<6}", "")?;
        for column in &self.summary_statistics {
            write!(out, " {:>cell$}", column.column, cell = cell)?;
        }
        writeln!(out)?;

        type Getter = fn(&ColumnSummary) -> Option<f64>;
        let rows: [(&str, Getter); 7] = [
            ("mean", |s| s.mean),
            ("std", |s| s.std),
            ("min", |s| s.min),
            ("25%", |s| s.p25),
            ("50%", |s| s.p50),
            ("75%", |s| s.p75),
            ("max", |s| s.max),
        ];

        write!(out, "{:<6}", "count")?;
        for column in &self.summary_statistics {
            write!(out, " {:>cell$.6}", column.summary.count as f64, cell = cell)?;
        }
        writeln!(out)?;

        for (label, get) in rows {
            write!(out, "{:<6}", label)?;
            for column in &self.summary_statistics {
                match get(&column.summary) {
                    Some(v) => write!(out, " {:>cell$.6}", v, cell = cell)?,
                    None => write!(out, " {:>cell$}", "NaN", cell = cell)?,
                }
            }
            writeln!(out)?;
        }
        Ok(())
    }

    /// Machine-readable overview
    pub fn print_json<W: Write>(&self, out: &mut W) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut *out, self)?;
        writeln!(out)
    }
}
