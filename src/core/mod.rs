//! Pure, deterministic logic: types, patch application, reporting.
//! No I/O lives here.

pub mod patch;
pub mod report;
pub mod types;
