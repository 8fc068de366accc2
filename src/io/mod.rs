// src/io/mod.rs
//! Reading and writing emgfiles
//!
//! - [`json`]: the native gzip-compressed JSON format
//! - [`csv`]: the custom CSV layout
//! - [`table`]: labelled tables shared by both

pub mod csv;
pub mod json;
pub mod table;

pub use self::csv::{emg_from_customcsv, refsig_from_customcsv, save_customcsv, CsvLabels};
pub use self::json::{emg_from_json, save_json_emgfile, EMGFILE_KEYS, REFSIG_KEYS};
pub use self::table::LabeledTable;
