#![no_main]

use flowlens::anomaly::AnomalyDetector;
use flowlens::dataset::{left_join, read_flows, TimeLookup};
use libfuzzer_sys::fuzz_target;
use std::path::Path;

fuzz_target!(|data: &[u8]| {
    // Malformed input must surface as an error, never a panic
    if let Ok(flows) = read_flows(data, Path::new("fuzz.csv")) {
        let table = left_join(flows, &TimeLookup::default());
        let report = AnomalyDetector::default().run(&table);
        assert!(report.combined.len() <= table.len());
    }
});
