#![no_main]

use flowlens::timestamp::{format_timestamp, parse_or_missing};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Must return a timestamp or None for any input, and never panic
        if let Some(ts) = parse_or_missing(input) {
            let _ = format_timestamp(&ts);
        }
    }
});
