// Timestamps for log messages
//
// Austin Shafer - 2020
use std::time::Instant;

lazy_static! {
    // Reference point for all timestamps handed out. Log lines
    // are relative to the first timing call in the process.
    static ref PROC_START: Instant = Instant::now();
}

/// Get the number of milliseconds the process has been alive
pub fn get_current_millis() -> u64 {
    PROC_START.elapsed().as_millis() as u64
}
