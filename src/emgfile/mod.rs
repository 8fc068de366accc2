// src/emgfile/mod.rs
//! The emgfile data model
//!
//! An [`EmgFile`] holds a recording together with its decomposition outcome.
//! Its set of fields is fixed. Data that is not available is stored as an
//! empty, correctly typed placeholder: a zero-length reference signal, no
//! accuracy values, an IPTS table without columns or empty extras. Nothing is
//! ever optional at the type level, so downstream code never has to guess
//! whether a field exists.
//!
//! Reference-signal-only recordings use [`RefSigFile`]; [`EmgData`] wraps
//! either one when the kind of a file is only known after loading it.

use crate::error::{EmgErrorBuilder, EmgResult};
use crate::tools::firings::create_binary_firings;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Origin of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    #[serde(rename = "DEMUSE")]
    Demuse,
    #[serde(rename = "OTB")]
    Otb,
    #[serde(rename = "CUSTOMCSV")]
    CustomCsv,
    #[serde(rename = "DELSYS")]
    Delsys,
    #[serde(rename = "OTB_REFSIG")]
    OtbRefsig,
    #[serde(rename = "CUSTOMCSV_REFSIG")]
    CustomCsvRefsig,
    #[serde(rename = "DELSYS_REFSIG")]
    DelsysRefsig,
}

impl Source {
    /// Identifier used in the persisted formats
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Demuse => "DEMUSE",
            Source::Otb => "OTB",
            Source::CustomCsv => "CUSTOMCSV",
            Source::Delsys => "DELSYS",
            Source::OtbRefsig => "OTB_REFSIG",
            Source::CustomCsvRefsig => "CUSTOMCSV_REFSIG",
            Source::DelsysRefsig => "DELSYS_REFSIG",
        }
    }

    /// True for reference-signal-only files
    pub fn is_refsig(&self) -> bool {
        matches!(self, Source::OtbRefsig | Source::CustomCsvRefsig | Source::DelsysRefsig)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = crate::error::EmgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEMUSE" => Ok(Source::Demuse),
            "OTB" => Ok(Source::Otb),
            "CUSTOMCSV" => Ok(Source::CustomCsv),
            "DELSYS" => Ok(Source::Delsys),
            "OTB_REFSIG" => Ok(Source::OtbRefsig),
            "CUSTOMCSV_REFSIG" => Ok(Source::CustomCsvRefsig),
            "DELSYS_REFSIG" => Ok(Source::DelsysRefsig),
            other => Err(EmgErrorBuilder::new("emgfile", "parse_source")
                .invalid_data("SOURCE", &format!("file source '{}' not recognised", other))),
        }
    }
}

/// Open-ended table of additional named signals
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Extras {
    /// Column names
    pub columns: Vec<String>,
    /// `samples x columns`
    pub values: Array2<f64>,
}

impl Extras {
    /// Build from named columns of equal length
    pub fn new(columns: Vec<String>, values: Array2<f64>) -> EmgResult<Self> {
        if columns.len() != values.ncols() {
            return Err(EmgErrorBuilder::new("emgfile", "extras").mismatch(
                "EXTRAS",
                "column names do not match the table",
                values.ncols(),
                columns.len(),
            ));
        }
        Ok(Self { columns, values })
    }

    /// True when no extra column is stored
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Keep only rows in `[start, end)`
    pub fn slice_rows(&self, start: usize, end: usize) -> Self {
        if self.is_empty() || self.values.nrows() == 0 {
            return self.clone();
        }
        let end = end.min(self.values.nrows());
        let start = start.min(end);
        Self {
            columns: self.columns.clone(),
            values: self.values.slice(ndarray::s![start..end, ..]).to_owned(),
        }
    }
}

/// A recording with its decomposition outcome
#[derive(Debug, Clone, PartialEq)]
pub struct EmgFile {
    pub source: Source,
    pub filename: String,
    /// `samples x channels`
    pub raw_signal: Array2<f64>,
    /// Empty when no reference signal was recorded
    pub ref_signal: Array1<f64>,
    /// One value per MU, or empty
    pub accuracy: Array1<f64>,
    /// Decomposed source per MU, `samples x MUs`, or no columns
    pub ipts: Array2<f64>,
    /// Sorted discharge sample indices per MU
    pub mupulses: Vec<Vec<usize>>,
    pub fsamp: f64,
    /// Inter-electrode distance in mm
    pub ied: f64,
    pub emg_length: usize,
    pub number_of_mus: usize,
    /// `samples x MUs`, 1 at each discharge
    pub binary_mus_firing: Array2<u8>,
    pub extras: Extras,
}

impl EmgFile {
    /// Create a file without MUs
    pub fn new(source: Source, filename: impl Into<String>, raw_signal: Array2<f64>, fsamp: f64, ied: f64) -> Self {
        let emg_length = raw_signal.nrows();
        Self {
            source,
            filename: filename.into(),
            raw_signal,
            ref_signal: Array1::zeros(0),
            accuracy: Array1::zeros(0),
            ipts: Array2::zeros((emg_length, 0)),
            mupulses: Vec::new(),
            fsamp,
            ied,
            emg_length,
            number_of_mus: 0,
            binary_mus_firing: Array2::zeros((emg_length, 0)),
            extras: Extras::default(),
        }
    }

    /// Replace the discharge times, updating the MU count and binary firings
    pub fn with_mupulses(mut self, mupulses: Vec<Vec<usize>>) -> EmgResult<Self> {
        self.set_mupulses(mupulses)?;
        Ok(self)
    }

    /// Attach a reference signal
    pub fn with_ref_signal(mut self, ref_signal: Array1<f64>) -> Self {
        self.ref_signal = ref_signal;
        self
    }

    /// Attach the decomposed sources
    pub fn with_ipts(mut self, ipts: Array2<f64>) -> Self {
        self.ipts = ipts;
        self
    }

    /// Attach per-MU accuracy values
    pub fn with_accuracy(mut self, accuracy: Array1<f64>) -> Self {
        self.accuracy = accuracy;
        self
    }

    /// Attach extra signals
    pub fn with_extras(mut self, extras: Extras) -> Self {
        self.extras = extras;
        self
    }

    /// Replace MUPULSES and rebuild the fields derived from it
    pub fn set_mupulses(&mut self, mut mupulses: Vec<Vec<usize>>) -> EmgResult<()> {
        for pulses in mupulses.iter_mut() {
            pulses.sort_unstable();
            pulses.dedup();
        }
        self.binary_mus_firing = create_binary_firings(self.emg_length, mupulses.len(), &mupulses)?;
        self.number_of_mus = mupulses.len();
        self.mupulses = mupulses;
        Ok(())
    }

    /// True when a reference signal is stored
    pub fn has_ref_signal(&self) -> bool {
        !self.ref_signal.is_empty()
    }

    /// True when the decomposed sources are stored
    pub fn has_ipts(&self) -> bool {
        self.ipts.ncols() > 0
    }

    /// Number of EMG channels
    pub fn n_channels(&self) -> usize {
        self.raw_signal.ncols()
    }

    /// Check the structural invariants of the file
    pub fn validate(&self) -> EmgResult<()> {
        let err = || EmgErrorBuilder::new("emgfile", "validate");

        if self.source.is_refsig() {
            return Err(err().invalid_data("SOURCE", "a reference signal source cannot hold a decomposition"));
        }
        if self.fsamp <= 0.0 {
            return Err(err().invalid_data("FSAMP", "sampling frequency must be positive"));
        }
        if self.raw_signal.nrows() != self.emg_length {
            return Err(err().mismatch("RAW_SIGNAL", "rows differ from EMG_LENGTH", self.emg_length, self.raw_signal.nrows()));
        }
        if self.mupulses.len() != self.number_of_mus {
            return Err(err().mismatch("MUPULSES", "length differs from NUMBER_OF_MUS", self.number_of_mus, self.mupulses.len()));
        }
        if self.binary_mus_firing.dim() != (self.emg_length, self.number_of_mus) {
            return Err(err().mismatch(
                "BINARY_MUS_FIRING",
                "shape differs from EMG_LENGTH x NUMBER_OF_MUS",
                format!("{:?}", (self.emg_length, self.number_of_mus)),
                format!("{:?}", self.binary_mus_firing.dim()),
            ));
        }
        for (mu, pulses) in self.mupulses.iter().enumerate() {
            if pulses.windows(2).any(|w| w[0] >= w[1]) {
                return Err(err().invalid_data("MUPULSES", &format!("MU {} discharges are not strictly increasing", mu)));
            }
            if let Some(&last) = pulses.last() {
                if last >= self.emg_length {
                    return Err(err().mismatch("MUPULSES", &format!("MU {} discharge out of range", mu), format!("< {}", self.emg_length), last));
                }
            }
        }
        if !self.accuracy.is_empty() && self.accuracy.len() != self.number_of_mus {
            return Err(err().mismatch("ACCURACY", "one value per MU is required", self.number_of_mus, self.accuracy.len()));
        }
        if self.ipts.ncols() > 0 {
            if self.ipts.ncols() != self.number_of_mus {
                return Err(err().mismatch("IPTS", "one source per MU is required", self.number_of_mus, self.ipts.ncols()));
            }
            if self.ipts.nrows() != self.emg_length {
                return Err(err().mismatch("IPTS", "rows differ from EMG_LENGTH", self.emg_length, self.ipts.nrows()));
            }
        }
        if self.extras.columns.len() != self.extras.values.ncols() {
            return Err(err().mismatch("EXTRAS", "column names do not match the table", self.extras.values.ncols(), self.extras.columns.len()));
        }
        Ok(())
    }
}

/// A reference signal recording without EMG
#[derive(Debug, Clone, PartialEq)]
pub struct RefSigFile {
    pub source: Source,
    pub filename: String,
    pub fsamp: f64,
    pub ref_signal: Array1<f64>,
    pub extras: Extras,
}

impl RefSigFile {
    /// Create a reference signal file
    pub fn new(source: Source, filename: impl Into<String>, fsamp: f64, ref_signal: Array1<f64>) -> Self {
        Self {
            source,
            filename: filename.into(),
            fsamp,
            ref_signal,
            extras: Extras::default(),
        }
    }

    /// Check the structural invariants of the file
    pub fn validate(&self) -> EmgResult<()> {
        if !self.source.is_refsig() {
            return Err(EmgErrorBuilder::new("emgfile", "validate")
                .invalid_data("SOURCE", &format!("{} is not a reference signal source", self.source)));
        }
        if self.fsamp <= 0.0 {
            return Err(EmgErrorBuilder::new("emgfile", "validate")
                .invalid_data("FSAMP", "sampling frequency must be positive"));
        }
        Ok(())
    }
}

/// Either kind of loaded file
#[derive(Debug, Clone, PartialEq)]
pub enum EmgData {
    Emg(EmgFile),
    RefSig(RefSigFile),
}

impl EmgData {
    pub fn source(&self) -> Source {
        match self {
            EmgData::Emg(f) => f.source,
            EmgData::RefSig(f) => f.source,
        }
    }

    pub fn filename(&self) -> &str {
        match self {
            EmgData::Emg(f) => &f.filename,
            EmgData::RefSig(f) => &f.filename,
        }
    }

    pub fn fsamp(&self) -> f64 {
        match self {
            EmgData::Emg(f) => f.fsamp,
            EmgData::RefSig(f) => f.fsamp,
        }
    }

    pub fn ref_signal(&self) -> &Array1<f64> {
        match self {
            EmgData::Emg(f) => &f.ref_signal,
            EmgData::RefSig(f) => &f.ref_signal,
        }
    }

    pub fn validate(&self) -> EmgResult<()> {
        match self {
            EmgData::Emg(f) => f.validate(),
            EmgData::RefSig(f) => f.validate(),
        }
    }

    /// Unwrap an emgfile, failing on reference-signal-only data
    pub fn into_emg(self) -> EmgResult<EmgFile> {
        match self {
            EmgData::Emg(f) => Ok(f),
            EmgData::RefSig(f) => Err(EmgErrorBuilder::new("emgfile", "into_emg").invalid_data(
                "SOURCE",
                &format!("{} holds only a reference signal", f.source),
            )),
        }
    }
}

/// Files that carry a reference signal
pub trait HasRefSignal {
    fn ref_signal(&self) -> &Array1<f64>;
    fn ref_signal_mut(&mut self) -> &mut Array1<f64>;
    fn fsamp(&self) -> f64;
}

impl HasRefSignal for EmgFile {
    fn ref_signal(&self) -> &Array1<f64> {
        &self.ref_signal
    }

    fn ref_signal_mut(&mut self) -> &mut Array1<f64> {
        &mut self.ref_signal
    }

    fn fsamp(&self) -> f64 {
        self.fsamp
    }
}

impl HasRefSignal for RefSigFile {
    fn ref_signal(&self) -> &Array1<f64> {
        &self.ref_signal
    }

    fn ref_signal_mut(&mut self) -> &mut Array1<f64> {
        &mut self.ref_signal
    }

    fn fsamp(&self) -> f64 {
        self.fsamp
    }
}

impl HasRefSignal for EmgData {
    fn ref_signal(&self) -> &Array1<f64> {
        EmgData::ref_signal(self)
    }

    fn ref_signal_mut(&mut self) -> &mut Array1<f64> {
        match self {
            EmgData::Emg(f) => &mut f.ref_signal,
            EmgData::RefSig(f) => &mut f.ref_signal,
        }
    }

    fn fsamp(&self) -> f64 {
        EmgData::fsamp(self)
    }
}

impl From<EmgFile> for EmgData {
    fn from(f: EmgFile) -> Self {
        EmgData::Emg(f)
    }
}

impl From<RefSigFile> for EmgData {
    fn from(f: RefSigFile) -> Self {
        EmgData::RefSig(f)
    }
}
