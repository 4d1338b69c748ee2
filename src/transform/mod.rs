//! # One-shot Transforms
//!
//! CSV and JSON utilities that run to completion in a single call: column
//! remapping, splitting large exports into chunks small enough for one
//! bounded-time chain, and flattening stored call-log JSON into a CSV.

pub mod csv_tools;
pub mod json_export;

pub use csv_tools::{duration_to_seconds, remap_columns, split_csv, CsvChunk};
pub use json_export::export_json_objects;
