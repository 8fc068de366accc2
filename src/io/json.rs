// src/io/json.rs
//! Persisted emgfiles: gzip-compressed JSON
//!
//! The file is one JSON object keyed by the upper-case field names. Every
//! value is itself a JSON document stored as a string: scalars as plain JSON,
//! `MUPULSES` as a list of lists and tables in the `split` layout of
//! [`super::table`].

use super::table::{from_split_json, int_labels, str_labels, to_split_json, LabeledTable};
use crate::config::constants::format::{CURRENT_VERSION, LEGACY_VERSION, MAX_COMPRESS_LEVEL};
use crate::emgfile::{EmgData, EmgFile, Extras, RefSigFile, Source};
use crate::error::{EmgError, EmgErrorBuilder, EmgResult};
use crate::tools::create_binary_firings;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::{Array1, Array2, Axis};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::{debug, info, warn};

/// Field names of an emgfile, in the order they are written
pub const EMGFILE_KEYS: [&str; 13] = [
    "SOURCE",
    "FILENAME",
    "RAW_SIGNAL",
    "REF_SIGNAL",
    "ACCURACY",
    "IPTS",
    "MUPULSES",
    "FSAMP",
    "IED",
    "EMG_LENGTH",
    "NUMBER_OF_MUS",
    "BINARY_MUS_FIRING",
    "EXTRAS",
];

/// Field names of a reference signal file
pub const REFSIG_KEYS: [&str; 5] = ["SOURCE", "FILENAME", "FSAMP", "REF_SIGNAL", "EXTRAS"];

fn encoded<T: Serialize + ?Sized>(value: &T) -> EmgResult<Value> {
    Ok(Value::String(serde_json::to_string(value)?))
}

fn column_table(values: &Array1<f64>) -> EmgResult<Value> {
    let column = values.view().insert_axis(Axis(1));
    Ok(Value::String(to_split_json(int_labels(1), column)?))
}

fn extras_table(extras: &Extras) -> EmgResult<Value> {
    Ok(Value::String(to_split_json(str_labels(&extras.columns), extras.values.view())?))
}

/// Build the top-level object of a file
pub(crate) fn encode(data: &EmgData) -> EmgResult<Map<String, Value>> {
    let mut map = Map::new();
    match data {
        EmgData::Emg(f) => {
            map.insert("SOURCE".into(), encoded(f.source.as_str())?);
            map.insert("FILENAME".into(), encoded(&f.filename)?);
            map.insert(
                "RAW_SIGNAL".into(),
                Value::String(to_split_json(int_labels(f.raw_signal.ncols()), f.raw_signal.view())?),
            );
            map.insert("REF_SIGNAL".into(), column_table(&f.ref_signal)?);
            map.insert("ACCURACY".into(), column_table(&f.accuracy)?);
            map.insert("IPTS".into(), Value::String(to_split_json(int_labels(f.ipts.ncols()), f.ipts.view())?));
            map.insert("MUPULSES".into(), encoded(&f.mupulses)?);
            map.insert("FSAMP".into(), encoded(&f.fsamp)?);
            map.insert("IED".into(), encoded(&f.ied)?);
            map.insert("EMG_LENGTH".into(), encoded(&f.emg_length)?);
            map.insert("NUMBER_OF_MUS".into(), encoded(&f.number_of_mus)?);
            map.insert(
                "BINARY_MUS_FIRING".into(),
                Value::String(to_split_json(int_labels(f.binary_mus_firing.ncols()), f.binary_mus_firing.view())?),
            );
            map.insert("EXTRAS".into(), extras_table(&f.extras)?);
        }
        EmgData::RefSig(f) => {
            map.insert("SOURCE".into(), encoded(f.source.as_str())?);
            map.insert("FILENAME".into(), encoded(&f.filename)?);
            map.insert("FSAMP".into(), encoded(&f.fsamp)?);
            map.insert("REF_SIGNAL".into(), column_table(&f.ref_signal)?);
            map.insert("EXTRAS".into(), extras_table(&f.extras)?);
        }
    }
    Ok(map)
}

/// Save an emgfile or a reference signal file
///
/// `compresslevel` is the gzip level, 0 to 9.
pub fn save_json_emgfile<P: AsRef<Path>>(data: &EmgData, path: P, compresslevel: u32) -> EmgResult<()> {
    let path = path.as_ref();
    if compresslevel > MAX_COMPRESS_LEVEL {
        return Err(EmgErrorBuilder::new("io::json", "save_json_emgfile").configuration(&format!(
            "compresslevel must be 0-{}, got {}",
            MAX_COMPRESS_LEVEL, compresslevel
        )));
    }
    data.validate()?;
    let map = encode(data)?;

    let file = File::create(path).map_err(|e| EmgError::io(e, path, "save_json_emgfile"))?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::new(compresslevel));
    serde_json::to_writer(&mut encoder, &map)?;
    encoder
        .finish()
        .and_then(|mut w| w.flush())
        .map_err(|e| EmgError::io(e, path, "save_json_emgfile"))?;

    info!(path = %path.display(), source = %data.source(), version = CURRENT_VERSION, "saved emgfile");
    Ok(())
}

/// Read and decompress the JSON document of a gzip file
pub(crate) fn read_gz_json(path: &Path, operation: &str) -> EmgResult<Value> {
    let file = File::open(path).map_err(|e| EmgError::io(e, path, operation))?;
    let mut text = String::new();
    GzDecoder::new(BufReader::new(file))
        .read_to_string(&mut text)
        .map_err(|e| EmgError::io(e, path, operation))?;
    Ok(serde_json::from_str(&text)?)
}

/// Fields of a decoded file
struct Fields<'a> {
    map: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    fn new(map: &'a Map<String, Value>) -> Self {
        Self { map }
    }

    fn raw(&self, key: &str) -> EmgResult<&'a str> {
        match self.map.get(key) {
            Some(Value::String(s)) => Ok(s),
            Some(_) => Err(EmgErrorBuilder::new("io::json", "emg_from_json")
                .format("json", Some(CURRENT_VERSION), &format!("{} is not an encoded string", key))),
            None => Err(EmgErrorBuilder::new("io::json", "emg_from_json")
                .format("json", Some(CURRENT_VERSION), &format!("missing field {}", key))),
        }
    }

    fn has(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    fn value<T: DeserializeOwned>(&self, key: &str) -> EmgResult<T> {
        Ok(serde_json::from_str(self.raw(key)?)?)
    }

    fn table(&self, key: &str) -> EmgResult<LabeledTable> {
        from_split_json(self.raw(key)?)
    }
}

/// First column of a table as a series, empty when the table has no rows
pub(crate) fn first_column(table: &LabeledTable, key: &str) -> Array1<f64> {
    if table.ncols() > 1 {
        warn!(field = key, columns = table.ncols(), "more than one column, only the first is kept");
    }
    if table.ncols() == 0 {
        return Array1::zeros(0);
    }
    table.values.column(0).to_owned()
}

pub(crate) fn extras_from(table: LabeledTable) -> EmgResult<Extras> {
    if table.nrows() == 0 {
        return Ok(Extras::default());
    }
    Extras::new(table.columns, table.values)
}

/// Convert a decoded table to binary firings
pub(crate) fn binary_from(table: &LabeledTable) -> Array2<u8> {
    table.values.mapv(|v| u8::from(!v.is_nan() && v != 0.0))
}

/// Decoded fields of an emgfile before its invariants are checked
pub(crate) struct EmgParts {
    pub source: Source,
    pub filename: String,
    pub raw_signal: LabeledTable,
    pub ref_signal: Array1<f64>,
    pub accuracy: Array1<f64>,
    pub ipts: LabeledTable,
    pub mupulses: Vec<Vec<usize>>,
    pub fsamp: f64,
    pub ied: f64,
    pub emg_length: usize,
    pub number_of_mus: usize,
    /// Rebuilt from `mupulses` when absent or of the wrong shape
    pub binary: Option<Array2<u8>>,
    pub extras: Extras,
}

impl EmgParts {
    pub(crate) fn into_emgfile(self) -> EmgResult<EmgFile> {
        let (emg_length, number_of_mus) = (self.emg_length, self.number_of_mus);
        let binary_mus_firing = match self.binary {
            Some(b) if b.dim() == (emg_length, number_of_mus) => b,
            _ => {
                debug!(number_of_mus, emg_length, "rebuilding BINARY_MUS_FIRING from MUPULSES");
                create_binary_firings(emg_length, number_of_mus, &self.mupulses)?
            }
        };
        let ipts = if self.ipts.ncols() == 0 {
            Array2::zeros((emg_length, 0))
        } else {
            self.ipts.values
        };

        let file = EmgFile {
            source: self.source,
            filename: self.filename,
            raw_signal: self.raw_signal.values,
            ref_signal: self.ref_signal,
            accuracy: self.accuracy,
            ipts,
            mupulses: self.mupulses,
            fsamp: self.fsamp,
            ied: self.ied,
            emg_length,
            number_of_mus,
            binary_mus_firing,
            extras: self.extras,
        };
        file.validate()?;
        Ok(file)
    }
}

fn decode_emgfile(fields: &Fields, source: Source) -> EmgResult<EmgFile> {
    let binary = if fields.has("BINARY_MUS_FIRING") {
        let table = fields.table("BINARY_MUS_FIRING")?;
        (table.nrows() > 0).then(|| binary_from(&table))
    } else {
        None
    };
    EmgParts {
        source,
        filename: fields.value("FILENAME")?,
        raw_signal: fields.table("RAW_SIGNAL")?,
        ref_signal: first_column(&fields.table("REF_SIGNAL")?, "REF_SIGNAL"),
        accuracy: first_column(&fields.table("ACCURACY")?, "ACCURACY"),
        ipts: fields.table("IPTS")?,
        mupulses: fields.value("MUPULSES")?,
        fsamp: fields.value("FSAMP")?,
        ied: fields.value("IED")?,
        emg_length: fields.value("EMG_LENGTH")?,
        number_of_mus: fields.value("NUMBER_OF_MUS")?,
        binary,
        extras: extras_from(fields.table("EXTRAS")?)?,
    }
    .into_emgfile()
}

fn decode_refsig(fields: &Fields, source: Source) -> EmgResult<RefSigFile> {
    let file = RefSigFile {
        source,
        filename: fields.value("FILENAME")?,
        fsamp: fields.value("FSAMP")?,
        ref_signal: first_column(&fields.table("REF_SIGNAL")?, "REF_SIGNAL"),
        extras: extras_from(fields.table("EXTRAS")?)?,
    };
    file.validate()?;
    Ok(file)
}

/// Decode the top-level object of a file
pub(crate) fn decode(map: &Map<String, Value>) -> EmgResult<EmgData> {
    let fields = Fields::new(map);
    let source: String = fields.value("SOURCE")?;
    let source: Source = source.parse()?;
    if source.is_refsig() {
        Ok(EmgData::RefSig(decode_refsig(&fields, source)?))
    } else {
        Ok(EmgData::Emg(decode_emgfile(&fields, source)?))
    }
}

/// Load a file saved by [`save_json_emgfile`]
///
/// Files written in the legacy list layout must first be converted with
/// [`crate::compat::convert_json_output`].
pub fn emg_from_json<P: AsRef<Path>>(path: P) -> EmgResult<EmgData> {
    let path = path.as_ref();
    let data = match read_gz_json(path, "emg_from_json")? {
        Value::Object(map) => decode(&map)?,
        Value::Array(_) => {
            return Err(EmgErrorBuilder::new("io::json", "emg_from_json").format(
                "json",
                Some(LEGACY_VERSION),
                "legacy file layout, convert it with convert_json_output",
            ))
        }
        _ => {
            return Err(EmgErrorBuilder::new("io::json", "emg_from_json")
                .format("json", None, "top level is neither an object nor a list"))
        }
    };
    info!(path = %path.display(), source = %data.source(), "loaded emgfile");
    Ok(data)
}
