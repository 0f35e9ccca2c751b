//! Sequential batch orchestration for a per-file video analyzer.
//!
//! Discovery runs once, then each file passes the idempotency gate and (if
//! needed) the external analyzer, strictly one at a time. Results are kept in
//! discovery order and written to a single JSON report in the scanned
//! directory.
//!
//! SIGINT/SIGTERM kill the running analyzer (and anything it spawned) and end
//! the batch with exit status 130; no partial report is written in that case.
//! Completed files keep their companion outputs, so a re-run skips them.

pub mod analyzer;
pub mod cli;
pub mod config;
pub mod discover;
pub mod gate;
pub mod interrupt;
pub mod progress;
pub mod report;
pub mod runner;
pub mod util;
