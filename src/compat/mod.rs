// src/compat/mod.rs
//! Conversion of files saved in the legacy `0.1.0-beta.2` layout
//!
//! The legacy file is a gzip-compressed JSON list. Each entry is a JSON
//! string holding `{"KEY": value}`, except `MUPULSES` which is the bare
//! list. Tables are strings in the pandas `columns` orientation.

use crate::config::constants::format::{
    CURRENT_VERSION, DEFAULT_APPEND_NAME, DEFAULT_COMPRESS_LEVEL, JSON_EXTENSION, LEGACY_VERSION,
};
use crate::config::IoConfig;
use crate::emgfile::{EmgData, RefSigFile, Source};
use crate::error::{EmgError, EmgErrorBuilder, EmgResult};
use crate::io::json::{binary_from, extras_from, first_column, read_gz_json, save_json_emgfile, EmgParts};
use crate::io::table::{from_columns_json, LabeledTable};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

fn legacy_error(reason: &str) -> EmgError {
    EmgErrorBuilder::new("compat", "read_legacy_json").format("json", Some(LEGACY_VERSION), reason)
}

/// Positional entries of a legacy file
struct LegacyEntries<'a> {
    entries: &'a [Value],
}

impl<'a> LegacyEntries<'a> {
    fn decoded(&self, pos: usize) -> EmgResult<Value> {
        match self.entries.get(pos) {
            Some(Value::String(s)) => Ok(serde_json::from_str(s)?),
            Some(_) => Err(legacy_error(&format!("entry {} is not an encoded string", pos))),
            None => Err(legacy_error(&format!("entry {} is missing", pos))),
        }
    }

    /// Value stored under `key` in entry `pos`
    fn keyed(&self, pos: usize, key: &str) -> EmgResult<Value> {
        match self.decoded(pos)? {
            Value::Object(mut map) => map
                .remove(key)
                .ok_or_else(|| legacy_error(&format!("entry {} does not hold {}", pos, key))),
            _ => Err(legacy_error(&format!("entry {} is not an object", pos))),
        }
    }

    fn scalar<T: DeserializeOwned>(&self, pos: usize, key: &str) -> EmgResult<T> {
        Ok(serde_json::from_value(self.keyed(pos, key)?)?)
    }

    fn table(&self, pos: usize, key: &str) -> EmgResult<LabeledTable> {
        match self.keyed(pos, key)? {
            Value::String(text) => from_columns_json(&text),
            _ => Err(legacy_error(&format!("{} is not an encoded table", key))),
        }
    }
}

fn legacy_emgfile(entries: &LegacyEntries, source: Source, filename: String) -> EmgResult<EmgData> {
    let binary = entries.table(11, "BINARY_MUS_FIRING")?;
    let parts = EmgParts {
        source,
        filename,
        raw_signal: entries.table(2, "RAW_SIGNAL")?,
        ref_signal: first_column(&entries.table(3, "REF_SIGNAL")?, "REF_SIGNAL"),
        accuracy: first_column(&entries.table(4, "ACCURACY")?, "ACCURACY"),
        ipts: entries.table(5, "IPTS")?,
        mupulses: serde_json::from_value(entries.decoded(6)?)?,
        fsamp: entries.scalar(7, "FSAMP")?,
        ied: entries.scalar(8, "IED")?,
        emg_length: entries.scalar(9, "EMG_LENGTH")?,
        number_of_mus: entries.scalar(10, "NUMBER_OF_MUS")?,
        binary: (binary.nrows() > 0).then(|| binary_from(&binary)),
        extras: extras_from(entries.table(12, "EXTRAS")?)?,
    };
    Ok(EmgData::Emg(parts.into_emgfile()?))
}

fn legacy_refsig(entries: &LegacyEntries, source: Source, filename: String) -> EmgResult<EmgData> {
    let file = RefSigFile {
        source,
        filename,
        fsamp: entries.scalar(2, "FSAMP")?,
        ref_signal: first_column(&entries.table(3, "REF_SIGNAL")?, "REF_SIGNAL"),
        extras: extras_from(entries.table(4, "EXTRAS")?)?,
    };
    file.validate()?;
    Ok(EmgData::RefSig(file))
}

/// Load a file saved in the `0.1.0-beta.2` layout
pub fn read_legacy_json<P: AsRef<Path>>(path: P) -> EmgResult<EmgData> {
    let path = path.as_ref();
    let root = read_gz_json(path, "read_legacy_json")?;
    let entries = match &root {
        Value::Array(entries) => LegacyEntries { entries },
        _ => return Err(legacy_error("top level is not a list")),
    };

    let source: String = entries.scalar(0, "SOURCE")?;
    let source: Source = source.parse()?;
    let filename: String = entries.scalar(1, "FILENAME")?;
    let data = if source.is_refsig() {
        legacy_refsig(&entries, source, filename)?
    } else {
        legacy_emgfile(&entries, source, filename)?
    };
    debug!(path = %path.display(), %source, "read legacy emgfile");
    Ok(data)
}

/// Settings of [`convert_json_output`]
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertOptions {
    pub old_version: String,
    pub new_version: String,
    /// Appended to the file stem as `<stem>_<append_name>.json`, nothing when empty
    pub append_name: String,
    pub compresslevel: u32,
    /// Replace files that already exist in the destination
    pub overwrite: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            old_version: LEGACY_VERSION.to_string(),
            new_version: CURRENT_VERSION.to_string(),
            append_name: DEFAULT_APPEND_NAME.to_string(),
            compresslevel: DEFAULT_COMPRESS_LEVEL,
            overwrite: false,
        }
    }
}

impl ConvertOptions {
    pub fn from_config(config: &IoConfig) -> Self {
        Self {
            append_name: config.append_name.clone(),
            compresslevel: config.compress_level,
            ..Self::default()
        }
    }
}

fn is_json(path: &Path) -> bool {
    path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(JSON_EXTENSION)
}

fn files_to_convert(old: &Path) -> EmgResult<Vec<PathBuf>> {
    if old.is_file() {
        return Ok(vec![old.to_path_buf()]);
    }
    if old.is_dir() {
        let listing = fs::read_dir(old).map_err(|e| EmgError::io(e, old, "convert_json_output"))?;
        let mut files = Vec::new();
        for entry in listing {
            let path = entry.map_err(|e| EmgError::io(e, old, "convert_json_output"))?.path();
            if is_json(&path) {
                files.push(path);
            }
        }
        files.sort();
        return Ok(files);
    }
    Err(EmgError::io(
        std::io::Error::new(std::io::ErrorKind::NotFound, "the path to convert does not exist"),
        old,
        "convert_json_output",
    ))
}

fn target_path(file: &Path, new: &Path, append_name: &str) -> PathBuf {
    let stem = file.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let name = if append_name.is_empty() {
        stem
    } else {
        format!("{}_{}", stem, append_name)
    };
    new.join(format!("{}.{}", name, JSON_EXTENSION))
}

/// Convert legacy files to the current layout
///
/// `old` is a file or a directory whose `.json` files are all converted.
/// The converted files are written in the directory `new`. Returns the
/// written paths.
pub fn convert_json_output<P: AsRef<Path>, Q: AsRef<Path>>(
    old: P,
    new: Q,
    options: &ConvertOptions,
) -> EmgResult<Vec<PathBuf>> {
    let (old, new) = (old.as_ref(), new.as_ref());
    let err = || EmgErrorBuilder::new("compat", "convert_json_output");

    if options.old_version != LEGACY_VERSION || options.new_version != CURRENT_VERSION {
        return Err(err().configuration(&format!(
            "conversion from {} to {} is not supported, only {} to {}",
            options.old_version, options.new_version, LEGACY_VERSION, CURRENT_VERSION
        )));
    }
    let files = files_to_convert(old)?;
    if !new.is_dir() {
        return Err(err().configuration(&format!("'{}' is not a directory", new.display())));
    }

    let targets: Vec<PathBuf> = files.iter().map(|f| target_path(f, new, &options.append_name)).collect();
    if !options.overwrite {
        if let Some(existing) = targets.iter().find(|t| t.exists()) {
            return Err(err().configuration(&format!(
                "'{}' already exists, set overwrite to replace it",
                existing.display()
            )));
        }
    }

    for (pos, (file, target)) in files.iter().zip(&targets).enumerate() {
        info!(file = %file.display(), n = pos + 1, total = files.len(), "converting");
        let data = read_legacy_json(file)?;
        save_json_emgfile(&data, target, options.compresslevel)?;
    }
    info!(converted = targets.len(), "conversion completed");
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::emg_from_json;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use serde_json::json;
    use std::io::Write;
    use tempfile::TempDir;

    fn entry(key: &str, value: Value) -> Value {
        let mut map = serde_json::Map::new();
        map.insert(key.to_string(), value);
        Value::String(Value::Object(map).to_string())
    }

    fn table(text: &str) -> Value {
        Value::String(text.to_string())
    }

    fn legacy_emg_entries() -> Value {
        Value::Array(vec![
            entry("SOURCE", json!("DEMUSE")),
            entry("FILENAME", json!("old_trial.mat")),
            entry("RAW_SIGNAL", table(r#"{"0":{"0":1.0,"1":2.0,"2":3.0,"3":4.0},"1":{"1":6.0,"0":5.0,"2":7.0,"3":8.0}}"#)),
            entry("REF_SIGNAL", table(r#"{"0":{"0":0.0,"1":1.0,"2":2.0,"3":3.0}}"#)),
            entry("ACCURACY", table(r#"{"0":{"0":0.95}}"#)),
            entry("IPTS", table(r#"{"0":{"0":0.1,"1":0.2,"2":0.3,"3":0.4}}"#)),
            Value::String("[[1, 3]]".to_string()),
            entry("FSAMP", json!(2048.0)),
            entry("IED", json!(8)),
            entry("EMG_LENGTH", json!(4)),
            entry("NUMBER_OF_MUS", json!(1)),
            entry("BINARY_MUS_FIRING", table(r#"{"0":{"0":0,"1":1,"2":0,"3":1}}"#)),
            entry("EXTRAS", table("{}")),
        ])
    }

    fn write_gz(path: &Path, value: &Value) {
        let mut enc = GzEncoder::new(fs::File::create(path).unwrap(), Compression::default());
        enc.write_all(value.to_string().as_bytes()).unwrap();
        enc.finish().unwrap();
    }

    #[test]
    fn test_read_legacy_emgfile() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("old.json");
        write_gz(&path, &legacy_emg_entries());

        let file = read_legacy_json(&path).unwrap().into_emg().unwrap();
        assert_eq!(file.source, Source::Demuse);
        assert_eq!(file.filename, "old_trial.mat");
        assert_eq!(file.raw_signal.column(1).to_vec(), vec![5.0, 6.0, 7.0, 8.0]);
        assert_eq!(file.mupulses, vec![vec![1, 3]]);
        assert_eq!(file.ied, 8.0);
        assert_eq!(file.accuracy.to_vec(), vec![0.95]);
        assert_eq!(file.binary_mus_firing.column(0).to_vec(), vec![0, 1, 0, 1]);
        assert!(file.extras.is_empty());
    }

    #[test]
    fn test_read_legacy_refsig() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ref.json");
        let entries = Value::Array(vec![
            entry("SOURCE", json!("OTB_REFSIG")),
            entry("FILENAME", json!("ref.otb+")),
            entry("FSAMP", json!(2048)),
            entry("REF_SIGNAL", table(r#"{"0":{"1":2.0,"0":1.0}}"#)),
            entry("EXTRAS", table("{}")),
        ]);
        write_gz(&path, &entries);

        match read_legacy_json(&path).unwrap() {
            EmgData::RefSig(f) => {
                assert_eq!(f.fsamp, 2048.0);
                assert_eq!(f.ref_signal.to_vec(), vec![1.0, 2.0]);
            }
            other => panic!("expected a refsig file, got {:?}", other.source()),
        }
    }

    #[test]
    fn test_convert_directory() {
        let old = TempDir::new().unwrap();
        let new = TempDir::new().unwrap();
        write_gz(&old.path().join("b.json"), &legacy_emg_entries());
        write_gz(&old.path().join("a.json"), &legacy_emg_entries());
        fs::write(old.path().join("notes.txt"), "skip me").unwrap();

        let written = convert_json_output(old.path(), new.path(), &ConvertOptions::default()).unwrap();
        let names: Vec<_> = written.iter().map(|p| p.file_name().unwrap().to_string_lossy().into_owned()).collect();
        assert_eq!(names, vec!["a_converted.json", "b_converted.json"]);

        let converted = emg_from_json(&written[0]).unwrap().into_emg().unwrap();
        assert_eq!(converted.mupulses, vec![vec![1, 3]]);
    }

    #[test]
    fn test_convert_keeps_tables_and_named_extras() {
        let old = TempDir::new().unwrap();
        let new = TempDir::new().unwrap();
        let path = old.path().join("trial.json");
        let entries = Value::Array(vec![
            entry("SOURCE", json!("OTB")),
            entry("FILENAME", json!("trial.otb+")),
            entry("RAW_SIGNAL", table(r#"{"0":{"0":1.0,"1":2.0,"2":3.0,"3":4.0}}"#)),
            entry("REF_SIGNAL", table(r#"{"0":{"0":0.5,"1":1.5,"2":2.5,"3":3.5}}"#)),
            entry("ACCURACY", table(r#"{"0":{"0":0.9,"1":0.8}}"#)),
            entry("IPTS", table(r#"{"0":{"0":0.1,"1":0.9,"2":0.2,"3":0.8},"1":{"0":0.7,"1":0.1,"2":0.6,"3":0.0}}"#)),
            Value::String("[[1, 3], [0, 2]]".to_string()),
            entry("FSAMP", json!(2048.0)),
            entry("IED", json!(8)),
            entry("EMG_LENGTH", json!(4)),
            entry("NUMBER_OF_MUS", json!(2)),
            entry("BINARY_MUS_FIRING", table(r#"{"0":{"0":0,"1":1,"2":0,"3":1},"1":{"0":1,"1":0,"2":1,"3":0}}"#)),
            entry("EXTRAS", table(r#"{"torque":{"0":10.0,"1":11.0,"2":12.0,"3":13.0},"angle":{"0":-1.0,"1":-2.0,"2":-3.0,"3":-4.0}}"#)),
        ]);
        write_gz(&path, &entries);

        let written = convert_json_output(&path, new.path(), &ConvertOptions::default()).unwrap();
        let file = emg_from_json(&written[0]).unwrap().into_emg().unwrap();
        assert_eq!(file.number_of_mus, 2);
        assert_eq!(file.ref_signal.to_vec(), vec![0.5, 1.5, 2.5, 3.5]);
        assert_eq!(file.ipts.column(0).to_vec(), vec![0.1, 0.9, 0.2, 0.8]);
        assert_eq!(file.ipts.column(1).to_vec(), vec![0.7, 0.1, 0.6, 0.0]);
        assert_eq!(file.binary_mus_firing.column(1).to_vec(), vec![1, 0, 1, 0]);
        assert_eq!(file.extras.columns, vec!["torque", "angle"]);
        assert_eq!(file.extras.values.column(0).to_vec(), vec![10.0, 11.0, 12.0, 13.0]);
        assert_eq!(file.extras.values.column(1).to_vec(), vec![-1.0, -2.0, -3.0, -4.0]);
    }

    #[test]
    fn test_convert_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trial.json");
        write_gz(&path, &legacy_emg_entries());
        let options = ConvertOptions {
            append_name: String::new(),
            ..ConvertOptions::default()
        };
        let result = convert_json_output(&path, dir.path(), &options);
        assert!(matches!(result, Err(EmgError::Configuration { .. })));

        let options = ConvertOptions { overwrite: true, ..options };
        let written = convert_json_output(&path, dir.path(), &options).unwrap();
        assert_eq!(written, vec![path.clone()]);
        assert!(emg_from_json(&path).is_ok());
    }

    #[test]
    fn test_convert_checks_versions_and_paths() {
        let dir = TempDir::new().unwrap();
        let options = ConvertOptions {
            old_version: "0.1.0-beta.1".into(),
            ..ConvertOptions::default()
        };
        assert!(matches!(
            convert_json_output(dir.path(), dir.path(), &options),
            Err(EmgError::Configuration { .. })
        ));
        assert!(matches!(
            convert_json_output(dir.path().join("missing"), dir.path(), &ConvertOptions::default()),
            Err(EmgError::Io { .. })
        ));
        let file = dir.path().join("x.json");
        write_gz(&file, &legacy_emg_entries());
        assert!(convert_json_output(dir.path(), &file, &ConvertOptions::default()).is_err());
    }
}
