// src/info.rs
//! Reference information: abbreviations and the layout of a loaded file

use crate::emgfile::{EmgData, EmgFile, RefSigFile};
use serde::Serialize;
use std::fmt;

/// Abbreviations used in field and column names
pub const ABBREVIATIONS: &[(&str, &str)] = &[
    ("COV", "Coefficient of variation"),
    ("DERT", "DERecruitment threshold"),
    ("DD", "Double differential"),
    ("DR", "Discharge rate"),
    ("FSAMP", "Sampling frequency"),
    ("IDR", "Instantaneous discharge rate"),
    ("IED", "Inter electrode distance"),
    ("IPTS", "Impulse train per second"),
    ("MU", "Motor units"),
    ("MUAP", "MUs action potential"),
    ("PNR", "Pulse to noise ratio"),
    ("RT", "Recruitment threshold"),
    ("SD", "Single differential"),
    ("SIL", "Silhouette score"),
    ("STA", "Spike-triggered average"),
    ("XCC", "Cross-correlation coefficient"),
];

/// Expansion of an abbreviation, case-insensitive
pub fn abbreviation(short: &str) -> Option<&'static str> {
    ABBREVIATIONS
        .iter()
        .find(|(abbr, _)| abbr.eq_ignore_ascii_case(short))
        .map(|(_, long)| *long)
}

/// One field of a file with its shape
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSummary {
    pub name: &'static str,
    pub kind: &'static str,
    pub value: String,
}

/// Field-by-field description of a loaded file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataSummary {
    pub source: String,
    pub fields: Vec<FieldSummary>,
}

fn field(name: &'static str, kind: &'static str, value: impl ToString) -> FieldSummary {
    FieldSummary { name, kind, value: value.to_string() }
}

fn shape(rows: usize, cols: usize) -> String {
    format!("{} x {}", rows, cols)
}

fn emg_fields(f: &EmgFile) -> Vec<FieldSummary> {
    let first_pulses = match f.mupulses.first() {
        Some(p) => format!("{} MUs, MU 0 has {} discharges", f.number_of_mus, p.len()),
        None => "no MUs".to_string(),
    };
    vec![
        field("SOURCE", "text", f.source),
        field("FILENAME", "text", &f.filename),
        field("RAW_SIGNAL", "table", shape(f.raw_signal.nrows(), f.raw_signal.ncols())),
        field("REF_SIGNAL", "series", format!("{} samples", f.ref_signal.len())),
        field("ACCURACY", "series", format!("{} values", f.accuracy.len())),
        field("IPTS", "table", shape(f.ipts.nrows(), f.ipts.ncols())),
        field("MUPULSES", "list of index arrays", first_pulses),
        field("FSAMP", "float", f.fsamp),
        field("IED", "float", f.ied),
        field("EMG_LENGTH", "int", f.emg_length),
        field("NUMBER_OF_MUS", "int", f.number_of_mus),
        field(
            "BINARY_MUS_FIRING",
            "table",
            shape(f.binary_mus_firing.nrows(), f.binary_mus_firing.ncols()),
        ),
        field("EXTRAS", "table", shape(f.extras.values.nrows(), f.extras.columns.len())),
    ]
}

fn refsig_fields(f: &RefSigFile) -> Vec<FieldSummary> {
    vec![
        field("SOURCE", "text", f.source),
        field("FILENAME", "text", &f.filename),
        field("FSAMP", "float", f.fsamp),
        field("REF_SIGNAL", "series", format!("{} samples", f.ref_signal.len())),
        field("EXTRAS", "table", shape(f.extras.values.nrows(), f.extras.columns.len())),
    ]
}

/// Describe the fields of a loaded file
pub fn data(file: &EmgData) -> DataSummary {
    let fields = match file {
        EmgData::Emg(f) => emg_fields(f),
        EmgData::RefSig(f) => refsig_fields(f),
    };
    DataSummary { source: file.source().to_string(), fields }
}

impl fmt::Display for DataSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Data structure of a {} file", self.source)?;
        let width = self.fields.iter().map(|x| x.name.len()).max().unwrap_or(0);
        for x in &self.fields {
            writeln!(f, "  {:<width$}  {:<22} {}", x.name, x.kind, x.value, width = width)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emgfile::Source;
    use ndarray::{Array1, Array2};

    #[test]
    fn test_abbreviation_lookup() {
        assert_eq!(abbreviation("idr"), Some("Instantaneous discharge rate"));
        assert_eq!(abbreviation("XCC"), Some("Cross-correlation coefficient"));
        assert_eq!(abbreviation("FOO"), None);
    }

    #[test]
    fn test_emgfile_summary() {
        let file = EmgFile::new(Source::Otb, "trial.json", Array2::zeros((300, 64)), 2048.0, 8.0)
            .with_mupulses(vec![vec![10, 20, 30]])
            .unwrap();
        let summary = data(&file.into());
        assert_eq!(summary.source, "OTB");
        assert_eq!(summary.fields.len(), 13);
        let raw = summary.fields.iter().find(|f| f.name == "RAW_SIGNAL").unwrap();
        assert_eq!(raw.value, "300 x 64");
        let text = summary.to_string();
        assert!(text.contains("MU 0 has 3 discharges"));
    }

    #[test]
    fn test_refsig_summary() {
        let file = RefSigFile::new(Source::OtbRefsig, "ref", 2048.0, Array1::zeros(20));
        let summary = data(&file.into());
        assert_eq!(summary.fields.len(), 5);
        assert!(summary.to_string().starts_with("Data structure of a OTB_REFSIG file"));
    }
}
