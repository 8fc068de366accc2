// src/io/csv.rs
//! Custom CSV import and export
//!
//! Each field lives in one or more columns whose header starts with the
//! field label, e.g. `RAW_SIGNAL_0`, `MUPULSES_3`. Missing cells are empty
//! and read as NaN. `MUPULSES` columns hold discharge indices padded with
//! empty cells, `ACCURACY` columns hold one value each.

use super::json::{binary_from, EmgParts};
use super::table::LabeledTable;
use crate::config::constants::csv_labels;
use crate::emgfile::{EmgFile, Extras, RefSigFile, Source};
use crate::error::{EmgError, EmgErrorBuilder, EmgResult};
use crate::tools::mupulses_from_binary;
use ndarray::{Array1, Array2};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use tracing::{debug, info, warn};

/// Header prefixes of each field
///
/// Each label is a regular expression matched at the start of the header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvLabels {
    pub ref_signal: String,
    pub raw_signal: String,
    pub ipts: String,
    pub mupulses: String,
    pub binary_mus_firing: String,
    pub accuracy: String,
    pub extras: String,
}

impl Default for CsvLabels {
    fn default() -> Self {
        Self {
            ref_signal: csv_labels::REF_SIGNAL.to_string(),
            raw_signal: csv_labels::RAW_SIGNAL.to_string(),
            ipts: csv_labels::IPTS.to_string(),
            mupulses: csv_labels::MUPULSES.to_string(),
            binary_mus_firing: csv_labels::BINARY_MUS_FIRING.to_string(),
            accuracy: csv_labels::ACCURACY.to_string(),
            extras: csv_labels::EXTRAS.to_string(),
        }
    }
}

/// A parsed CSV file, stored column-wise
struct CsvColumns {
    headers: Vec<String>,
    columns: Vec<Vec<f64>>,
    nrows: usize,
}

impl CsvColumns {
    fn read(path: &Path, operation: &str) -> EmgResult<Self> {
        let file = File::open(path).map_err(|e| EmgError::io(e, path, operation))?;
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(file);
        let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();

        let mut columns = vec![Vec::new(); headers.len()];
        let mut nrows = 0;
        for (row, record) in reader.records().enumerate() {
            let record = record?;
            for (c, column) in columns.iter_mut().enumerate() {
                let cell = record.get(c).map(str::trim).unwrap_or("");
                let value = if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
                    f64::NAN
                } else {
                    cell.parse::<f64>().map_err(|_| {
                        EmgErrorBuilder::new("io::csv", operation).invalid_data(
                            &headers[c],
                            &format!("cell '{}' on data row {} is not a number", cell, row),
                        )
                    })?
                };
                column.push(value);
            }
            nrows += 1;
        }
        debug!(path = %path.display(), columns = headers.len(), rows = nrows, "read csv");
        Ok(Self { headers, columns, nrows })
    }

    /// Indices of the columns whose header starts with `label`
    fn select(&self, label: &str, operation: &str) -> EmgResult<Vec<usize>> {
        let pattern = Regex::new(&format!("^(?:{})", label)).map_err(|e| {
            EmgErrorBuilder::new("io::csv", operation).configuration(&format!("invalid label '{}': {}", label, e))
        })?;
        Ok((0..self.headers.len()).filter(|&c| pattern.is_match(&self.headers[c])).collect())
    }

    /// The selected columns restricted to `rows`
    fn table(&self, cols: &[usize], rows: &[usize]) -> LabeledTable {
        LabeledTable {
            columns: cols.iter().map(|&c| self.headers[c].clone()).collect(),
            values: Array2::from_shape_fn((rows.len(), cols.len()), |(r, c)| self.columns[cols[c]][rows[r]]),
        }
    }

    /// Rows where every selected column holds a value
    fn complete_rows(&self, cols: &[usize]) -> Vec<usize> {
        (0..self.nrows)
            .filter(|&r| cols.iter().all(|&c| !self.columns[c][r].is_nan()))
            .collect()
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn first_of(table: &LabeledTable, field: &str) -> Array1<f64> {
    match table.ncols() {
        0 => {
            warn!(field, "no column found, an empty placeholder is stored");
            Array1::zeros(0)
        }
        n => {
            if n > 1 {
                warn!(field, columns = n, "more than one column, only the first is kept");
            }
            table.values.column(0).to_owned()
        }
    }
}

fn pulses_from_column(values: &[f64], header: &str) -> EmgResult<Vec<usize>> {
    let mut pulses = Vec::with_capacity(values.len());
    for &v in values.iter().filter(|v| !v.is_nan()) {
        if v < 0.0 || v.fract() != 0.0 {
            return Err(EmgErrorBuilder::new("io::csv", "emg_from_customcsv")
                .invalid_data(header, &format!("{} is not a sample index", v)));
        }
        pulses.push(v as usize);
    }
    pulses.sort_unstable();
    pulses.dedup();
    Ok(pulses)
}

/// Load an emgfile from a custom CSV file
pub fn emg_from_customcsv<P: AsRef<Path>>(path: P, labels: &CsvLabels, fsamp: f64, ied: f64) -> EmgResult<EmgFile> {
    const OP: &str = "emg_from_customcsv";
    let path = path.as_ref();
    let csv = CsvColumns::read(path, OP)?;

    let raw_cols = csv.select(&labels.raw_signal, OP)?;
    if raw_cols.is_empty() {
        return Err(EmgErrorBuilder::new("io::csv", OP)
            .invalid_data("RAW_SIGNAL", &format!("no column starts with '{}'", labels.raw_signal)));
    }
    let rows = csv.complete_rows(&raw_cols);
    if rows.len() < csv.nrows {
        warn!(dropped = csv.nrows - rows.len(), "rows with missing RAW_SIGNAL values are dropped");
    }
    let emg_length = rows.len();

    let ref_signal = first_of(&csv.table(&csv.select(&labels.ref_signal, OP)?, &rows), "REF_SIGNAL");

    let ipts = csv.table(&csv.select(&labels.ipts, OP)?, &rows);
    if ipts.ncols() == 0 {
        warn!(field = "IPTS", "no column found, an empty placeholder is stored");
    }

    let pulse_cols = csv.select(&labels.mupulses, OP)?;
    let binary_cols = csv.select(&labels.binary_mus_firing, OP)?;
    let (mupulses, binary) = if !pulse_cols.is_empty() {
        let mupulses = pulse_cols
            .iter()
            .map(|&c| pulses_from_column(&csv.columns[c], &csv.headers[c]))
            .collect::<EmgResult<Vec<_>>>()?;
        (mupulses, None)
    } else if !binary_cols.is_empty() {
        let binary = binary_from(&csv.table(&binary_cols, &rows));
        (mupulses_from_binary(&binary), Some(binary))
    } else {
        return Err(EmgErrorBuilder::new("io::csv", OP).invalid_data(
            "MUPULSES",
            &format!(
                "neither '{}' nor '{}' columns were found",
                labels.mupulses, labels.binary_mus_firing
            ),
        ));
    };

    let accuracy_cols = csv.select(&labels.accuracy, OP)?;
    if accuracy_cols.is_empty() {
        warn!(field = "ACCURACY", "no column found, an empty placeholder is stored");
    }
    let accuracy: Array1<f64> = accuracy_cols
        .iter()
        .flat_map(|&c| csv.columns[c].iter().copied().filter(|v| !v.is_nan()))
        .collect();

    let extras = csv.table(&csv.select(&labels.extras, OP)?, &rows);
    let extras = if extras.ncols() == 0 {
        Extras::default()
    } else {
        Extras::new(extras.columns, extras.values)?
    };

    let number_of_mus = mupulses.len();
    let file = EmgParts {
        source: Source::CustomCsv,
        filename: file_name(path),
        raw_signal: csv.table(&raw_cols, &rows),
        ref_signal,
        accuracy,
        ipts,
        mupulses,
        fsamp,
        ied,
        emg_length,
        number_of_mus,
        binary,
        extras,
    }
    .into_emgfile()?;

    info!(path = %path.display(), emg_length, number_of_mus, "loaded custom csv");
    Ok(file)
}

/// Load a reference signal file from a custom CSV file
pub fn refsig_from_customcsv<P: AsRef<Path>>(path: P, labels: &CsvLabels, fsamp: f64) -> EmgResult<RefSigFile> {
    const OP: &str = "refsig_from_customcsv";
    let path = path.as_ref();
    let csv = CsvColumns::read(path, OP)?;

    let ref_cols = csv.select(&labels.ref_signal, OP)?;
    if ref_cols.is_empty() {
        return Err(EmgErrorBuilder::new("io::csv", OP)
            .invalid_data("REF_SIGNAL", &format!("no column starts with '{}'", labels.ref_signal)));
    }
    let rows = csv.complete_rows(&ref_cols[..1]);
    if rows.len() < csv.nrows {
        warn!(dropped = csv.nrows - rows.len(), "rows with a missing REF_SIGNAL value are dropped");
    }

    let mut file = RefSigFile::new(
        Source::CustomCsvRefsig,
        file_name(path),
        fsamp,
        first_of(&csv.table(&ref_cols, &rows), "REF_SIGNAL"),
    );
    let extras = csv.table(&csv.select(&labels.extras, OP)?, &rows);
    if extras.ncols() > 0 {
        file.extras = Extras::new(extras.columns, extras.values)?;
    }
    file.validate()?;

    info!(path = %path.display(), samples = file.ref_signal.len(), "loaded custom csv reference signal");
    Ok(file)
}

fn float_cells(values: impl Iterator<Item = f64>) -> Vec<String> {
    values.map(|v| if v.is_nan() { String::new() } else { v.to_string() }).collect()
}

/// Write an emgfile in the layout read by [`emg_from_customcsv`]
pub fn save_customcsv<P: AsRef<Path>>(emgfile: &EmgFile, path: P) -> EmgResult<()> {
    let path = path.as_ref();
    emgfile.validate()?;
    let mut columns: Vec<(String, Vec<String>)> = Vec::new();

    for (n, col) in emgfile.raw_signal.columns().into_iter().enumerate() {
        columns.push((format!("{}_{}", csv_labels::RAW_SIGNAL, n), float_cells(col.iter().copied())));
    }
    if emgfile.has_ref_signal() {
        columns.push((csv_labels::REF_SIGNAL.to_string(), float_cells(emgfile.ref_signal.iter().copied())));
    }
    if emgfile.has_ipts() {
        for (n, col) in emgfile.ipts.columns().into_iter().enumerate() {
            columns.push((format!("{}_{}", csv_labels::IPTS, n), float_cells(col.iter().copied())));
        }
    }
    for (n, pulses) in emgfile.mupulses.iter().enumerate() {
        columns.push((
            format!("{}_{}", csv_labels::MUPULSES, n),
            pulses.iter().map(|p| p.to_string()).collect(),
        ));
    }
    for (n, col) in emgfile.binary_mus_firing.columns().into_iter().enumerate() {
        columns.push((
            format!("{}_{}", csv_labels::BINARY_MUS_FIRING, n),
            col.iter().map(|b| b.to_string()).collect(),
        ));
    }
    for (n, &acc) in emgfile.accuracy.iter().enumerate() {
        columns.push((format!("{}_{}", csv_labels::ACCURACY, n), float_cells(std::iter::once(acc))));
    }
    for (n, (name, col)) in emgfile.extras.columns.iter().zip(emgfile.extras.values.columns()).enumerate() {
        let header = if name.starts_with(csv_labels::EXTRAS) {
            name.clone()
        } else {
            format!("{}_{}", csv_labels::EXTRAS, n)
        };
        columns.push((header, float_cells(col.iter().copied())));
    }

    let file = File::create(path).map_err(|e| EmgError::io(e, path, "save_customcsv"))?;
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(columns.iter().map(|(h, _)| h.as_str()))?;
    let nrows = columns.iter().map(|(_, c)| c.len()).max().unwrap_or(0);
    for r in 0..nrows {
        writer.write_record(columns.iter().map(|(_, c)| c.get(r).map(String::as_str).unwrap_or("")))?;
    }
    writer.flush().map_err(|e| EmgError::io(e, path, "save_customcsv"))?;

    info!(path = %path.display(), columns = columns.len(), rows = nrows, "saved custom csv");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, text: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_load_with_mupulses() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "trial.csv",
            "REF_SIGNAL,RAW_SIGNAL_0,RAW_SIGNAL_1,MUPULSES_0,MUPULSES_1,ACCURACY_0,ACCURACY_1,EXTRAS_torque\n\
             0.0,1.0,2.0,1,0,0.9,0.8,5.0\n\
             0.5,1.1,2.1,3,2,,,5.5\n\
             1.0,1.2,2.2,,,,,6.0\n\
             1.5,1.3,2.3,,,,,6.5\n",
        );
        let file = emg_from_customcsv(&path, &CsvLabels::default(), 2048.0, 8.0).unwrap();
        assert_eq!(file.source, Source::CustomCsv);
        assert_eq!(file.filename, "trial.csv");
        assert_eq!(file.emg_length, 4);
        assert_eq!(file.raw_signal.dim(), (4, 2));
        assert_eq!(file.mupulses, vec![vec![1, 3], vec![0, 2]]);
        assert_eq!(file.binary_mus_firing[[3, 0]], 1);
        assert_eq!(file.accuracy, array![0.9, 0.8]);
        assert_eq!(file.ref_signal[3], 1.5);
        assert_eq!(file.extras.columns, vec!["EXTRAS_torque"]);
        assert!(!file.has_ipts());
    }

    #[test]
    fn test_load_with_binary_only() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "binary.csv",
            "RAW_SIGNAL_0,BINARY_MUS_FIRING_0\n0.1,0\n0.2,1\n0.3,0\n0.4,1\n",
        );
        let file = emg_from_customcsv(&path, &CsvLabels::default(), 1000.0, 8.0).unwrap();
        assert_eq!(file.mupulses, vec![vec![1, 3]]);
        assert!(file.accuracy.is_empty());
        assert!(!file.has_ref_signal());
    }

    #[test]
    fn test_rows_with_missing_raw_values_are_dropped() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "short.csv", "RAW_SIGNAL_0,MUPULSES_0\n1.0,0\n2.0,1\n,\n,\n");
        let file = emg_from_customcsv(&path, &CsvLabels::default(), 1000.0, 8.0).unwrap();
        assert_eq!(file.emg_length, 2);
        assert_eq!(file.mupulses, vec![vec![0, 1]]);
    }

    #[test]
    fn test_missing_required_columns() {
        let dir = TempDir::new().unwrap();
        let no_raw = write(&dir, "a.csv", "MUPULSES_0\n1\n");
        assert!(matches!(
            emg_from_customcsv(&no_raw, &CsvLabels::default(), 1000.0, 8.0),
            Err(EmgError::InvalidData { .. })
        ));
        let no_firings = write(&dir, "b.csv", "RAW_SIGNAL_0\n1\n");
        assert!(emg_from_customcsv(&no_firings, &CsvLabels::default(), 1000.0, 8.0).is_err());
        let bad_pulse = write(&dir, "c.csv", "RAW_SIGNAL_0,MUPULSES_0\n1,0.5\n");
        assert!(emg_from_customcsv(&bad_pulse, &CsvLabels::default(), 1000.0, 8.0).is_err());
    }

    #[test]
    fn test_custom_labels() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "custom.csv", "emg_a,emg_b,spikes\n1,2,0\n3,4,1\n");
        let labels = CsvLabels {
            raw_signal: "emg".into(),
            mupulses: "spikes".into(),
            ..CsvLabels::default()
        };
        let file = emg_from_customcsv(&path, &labels, 1000.0, 8.0).unwrap();
        assert_eq!(file.raw_signal, array![[1.0, 2.0], [3.0, 4.0]]);
        assert_eq!(file.mupulses, vec![vec![0, 1]]);
    }

    #[test]
    fn test_refsig_from_csv() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "ref.csv", "REF_SIGNAL,EXTRAS_0\n0.0,1\n2.5,2\n5.0,3\n");
        let file = refsig_from_customcsv(&path, &CsvLabels::default(), 100.0).unwrap();
        assert_eq!(file.source, Source::CustomCsvRefsig);
        assert_eq!(file.ref_signal, array![0.0, 2.5, 5.0]);
        assert_eq!(file.extras.values.column(0).to_vec(), vec![1.0, 2.0, 3.0]);

        let no_ref = write(&dir, "none.csv", "EXTRAS_0\n1\n");
        assert!(refsig_from_customcsv(&no_ref, &CsvLabels::default(), 100.0).is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let raw = Array2::from_shape_fn((30, 2), |(r, c)| r as f64 + 0.25 * c as f64);
        let original = EmgFile::new(Source::Otb, "trial.otb+", raw, 2048.0, 8.0)
            .with_mupulses(vec![vec![2, 9, 20], vec![5]])
            .unwrap()
            .with_ref_signal(Array1::linspace(0.0, 29.0, 30))
            .with_ipts(Array2::from_elem((30, 2), 0.5))
            .with_accuracy(array![0.93, 0.71])
            .with_extras(Extras::new(vec!["force".into()], Array2::from_elem((30, 1), 7.0)).unwrap());
        save_customcsv(&original, &path).unwrap();

        let header = fs::read_to_string(&path).unwrap().lines().next().unwrap().to_string();
        assert_eq!(
            header,
            "RAW_SIGNAL_0,RAW_SIGNAL_1,REF_SIGNAL,IPTS_0,IPTS_1,MUPULSES_0,MUPULSES_1,\
             BINARY_MUS_FIRING_0,BINARY_MUS_FIRING_1,ACCURACY_0,ACCURACY_1,EXTRAS_0"
        );

        let loaded = emg_from_customcsv(&path, &CsvLabels::default(), 2048.0, 8.0).unwrap();
        assert_eq!(loaded.raw_signal, original.raw_signal);
        assert_eq!(loaded.ref_signal, original.ref_signal);
        assert_eq!(loaded.ipts, original.ipts);
        assert_eq!(loaded.mupulses, original.mupulses);
        assert_eq!(loaded.binary_mus_firing, original.binary_mus_firing);
        assert_eq!(loaded.accuracy, original.accuracy);
        assert_eq!(loaded.extras.values, original.extras.values);
    }
}
