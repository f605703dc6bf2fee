//! flowlens - z-score outlier analysis for time-bucketed network flow data
//!
//! This library loads per-bucket flow metrics, joins them with a time
//! lookup, summarizes every numeric column, renders PNG charts and flags
//! rows whose flow or packet count sits more than a threshold number of
//! standard deviations from the column mean.

pub mod anomaly;
pub mod charts;
pub mod cli;
pub mod config;
pub mod csv_output;
pub mod dataset;
pub mod pipeline;
pub mod report;
pub mod stats;
pub mod timestamp;
