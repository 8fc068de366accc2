// src/analysis/properties.rs
//! Summary table of the basic MU properties

use super::discharge::{compute_covisi, compute_dr, CovIsi, DischargeRate};
use super::thresholds::{compute_thresholds, ThresholdEvent, ThresholdType, Thresholds};
use super::{nanmean, DischargeEvent, DischargeParams, SteadyRange};
use crate::config::FiringsConfig;
use crate::emgfile::EmgFile;
use crate::error::{EmgErrorBuilder, EmgResult};
use crate::mathtools::{compute_pnr, compute_sil, PnrMode};
use crate::tools::compute_covsteady;
use serde::{Deserialize, Serialize};
use std::io::Write;
use tracing::{debug, warn};

/// Accuracy measure reported for each MU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccuracyMetric {
    /// The ACCURACY stored in the file
    #[default]
    Default,
    Sil,
    Pnr,
    SilPnr,
}

impl std::str::FromStr for AccuracyMetric {
    type Err = crate::error::EmgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "sil" => Ok(Self::Sil),
            "pnr" => Ok(Self::Pnr),
            "sil_pnr" => Ok(Self::SilPnr),
            other => Err(EmgErrorBuilder::new("analysis::properties", "parse_accuracy")
                .configuration(&format!("accuracy must be one of default, SIL, PNR, SIL_PNR, got '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertiesParams {
    pub n_firings_rec_derec: usize,
    pub n_firings_steady: usize,
    pub steady: SteadyRange,
    pub accuracy: AccuracyMetric,
    /// Maximum voluntary contraction in the unit of the absolute thresholds
    pub mvc: f64,
}

impl PropertiesParams {
    pub fn new(steady: SteadyRange, mvc: f64) -> Self {
        Self::from_config(&FiringsConfig::default(), steady, mvc)
    }

    pub fn from_config(config: &FiringsConfig, steady: SteadyRange, mvc: f64) -> Self {
        Self {
            n_firings_rec_derec: config.n_firings_rec_derec,
            n_firings_steady: config.n_firings_steady,
            steady,
            accuracy: AccuracyMetric::Default,
            mvc,
        }
    }

    pub fn with_accuracy(mut self, accuracy: AccuracyMetric) -> Self {
        self.accuracy = accuracy;
        self
    }
}

/// Properties of one MU
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MuProperties {
    #[serde(rename = "MU_number")]
    pub mu_number: usize,
    #[serde(rename = "Accuracy", skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(rename = "SIL", skip_serializing_if = "Option::is_none")]
    pub sil: Option<f64>,
    #[serde(rename = "PNR", skip_serializing_if = "Option::is_none")]
    pub pnr: Option<f64>,
    #[serde(flatten)]
    pub thresholds: Thresholds,
    #[serde(flatten)]
    pub dr: DischargeRate,
    #[serde(flatten)]
    pub covisi: CovIsi,
}

impl MuProperties {
    /// Named values in table order, skipping measures that were not requested
    pub fn row(&self) -> Vec<(&'static str, f64)> {
        let t = &self.thresholds;
        let dr = &self.dr;
        [
            ("MU_number", Some(self.mu_number as f64)),
            ("Accuracy", self.accuracy),
            ("SIL", self.sil),
            ("PNR", self.pnr),
            ("abs_RT", t.abs_rt),
            ("abs_DERT", t.abs_dert),
            ("rel_RT", t.rel_rt),
            ("rel_DERT", t.rel_dert),
            ("DR_rec", dr.rec),
            ("DR_derec", dr.derec),
            ("DR_start_steady", dr.start_steady),
            ("DR_end_steady", dr.end_steady),
            ("DR_all_steady", dr.all_steady),
            ("DR_all", Some(dr.all)),
            ("COVisi_rec", self.covisi.rec),
            ("COVisi_derec", self.covisi.derec),
            ("COVisi_steady", self.covisi.steady),
            ("COVisi_all", Some(self.covisi.all)),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
        .collect()
    }
}

/// Properties of every MU in a file plus the file-level summaries
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MusProperties {
    #[serde(rename = "MVC")]
    pub mvc: f64,
    #[serde(rename = "avg_Accuracy", skip_serializing_if = "Option::is_none")]
    pub avg_accuracy: Option<f64>,
    #[serde(rename = "avg_SIL", skip_serializing_if = "Option::is_none")]
    pub avg_sil: Option<f64>,
    #[serde(rename = "avg_PNR", skip_serializing_if = "Option::is_none")]
    pub avg_pnr: Option<f64>,
    /// Coefficient of variation (%) of the reference signal in the steady state
    #[serde(rename = "COV_steady")]
    pub cov_steady: f64,
    pub mus: Vec<MuProperties>,
}

impl MusProperties {
    /// File-level summaries in table order
    fn summary(&self) -> Vec<(&'static str, f64)> {
        [
            ("MVC", Some(self.mvc)),
            ("avg_Accuracy", self.avg_accuracy),
            ("avg_SIL", self.avg_sil),
            ("avg_PNR", self.avg_pnr),
            ("COV_steady", Some(self.cov_steady)),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
        .collect()
    }

    /// Write one row per MU; file-level summaries only fill the first row
    pub fn write_csv<W: Write>(&self, writer: W) -> EmgResult<()> {
        let summary = self.summary();
        let mu_columns: Vec<&'static str> = self
            .mus
            .first()
            .map(|mu| mu.row().into_iter().map(|(name, _)| name).collect())
            .unwrap_or_default();

        let mut wtr = csv::Writer::from_writer(writer);
        let header: Vec<&str> = summary.iter().map(|(name, _)| *name).chain(mu_columns.iter().copied()).collect();
        wtr.write_record(&header)?;

        let cell = |v: f64| if v.is_nan() { String::new() } else { v.to_string() };
        for (i, mu) in self.mus.iter().enumerate() {
            let mut record: Vec<String> = summary
                .iter()
                .map(|(_, v)| if i == 0 { cell(*v) } else { String::new() })
                .collect();
            record.extend(mu.row().into_iter().map(|(_, v)| cell(v)));
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// MVC, accuracy, thresholds, discharge rates, COVisi and force steadiness
///
/// Discharge rates cover every phase and COVisi the steady state and the
/// whole recording, both with the steady range from `params`.
pub fn basic_mus_properties(emgfile: &EmgFile, params: &PropertiesParams) -> EmgResult<MusProperties> {
    let err = || EmgErrorBuilder::new("analysis::properties", "basic_mus_properties");
    let n_mus = emgfile.number_of_mus;

    let stored_accuracy = || -> Vec<f64> {
        if emgfile.accuracy.len() == n_mus {
            emgfile.accuracy.to_vec()
        } else {
            warn!("ACCURACY is not available, reported as NaN");
            vec![f64::NAN; n_mus]
        }
    };
    let needs_ipts = matches!(params.accuracy, AccuracyMetric::Sil | AccuracyMetric::Pnr | AccuracyMetric::SilPnr);
    if needs_ipts && !emgfile.has_ipts() {
        return Err(err().invalid_data("IPTS", "SIL and PNR need the decomposed sources"));
    }
    let per_mu = |f: &dyn Fn(&[f64], &[usize]) -> f64| -> Vec<f64> {
        (0..n_mus)
            .map(|mu| f(&emgfile.ipts.column(mu).to_vec(), &emgfile.mupulses[mu]))
            .collect()
    };
    let sil_of = || per_mu(&|ipts, pulses| compute_sil(ipts, pulses, false));
    let pnr_of = || per_mu(&|ipts, pulses| compute_pnr(ipts, pulses, emgfile.fsamp, PnrMode::default()));

    let (accuracy, sil, pnr) = match params.accuracy {
        AccuracyMetric::Default => (Some(stored_accuracy()), None, None),
        AccuracyMetric::Sil => (None, Some(sil_of()), None),
        AccuracyMetric::Pnr => (None, None, Some(pnr_of())),
        AccuracyMetric::SilPnr => (None, Some(sil_of()), Some(pnr_of())),
    };

    let thresholds = compute_thresholds(emgfile, ThresholdEvent::RtDert, ThresholdType::AbsRel, params.mvc)?;
    let discharge = DischargeParams {
        n_firings_rec_derec: params.n_firings_rec_derec,
        n_firings_steady: params.n_firings_steady,
        steady: Some(params.steady),
        event: DischargeEvent::RecDerecSteady,
    };
    let dr = compute_dr(emgfile, &discharge)?;
    let covisi = compute_covisi(emgfile, &discharge.clone().with_event(DischargeEvent::Steady))?;
    let cov_steady = compute_covsteady(emgfile.ref_signal.view(), params.steady.start, params.steady.end)?;

    let pick = |values: &Option<Vec<f64>>, mu: usize| values.as_ref().map(|v| v[mu]);
    let mus = (0..n_mus)
        .map(|mu| MuProperties {
            mu_number: mu,
            accuracy: pick(&accuracy, mu),
            sil: pick(&sil, mu),
            pnr: pick(&pnr, mu),
            thresholds: thresholds[mu],
            dr: dr[mu],
            covisi: covisi[mu],
        })
        .collect();

    debug!(n_mus, accuracy = ?params.accuracy, "computed basic MU properties");
    Ok(MusProperties {
        mvc: params.mvc,
        avg_accuracy: accuracy.as_deref().map(nanmean),
        avg_sil: sil.as_deref().map(nanmean),
        avg_pnr: pnr.as_deref().map(nanmean),
        cov_steady,
        mus,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::test_support::trapezoid_file;
    use ndarray::Array2;

    fn params() -> PropertiesParams {
        PropertiesParams::new(SteadyRange::new(2000, 6000), 400.0)
    }

    #[test]
    fn test_basic_properties_default_accuracy() {
        let props = basic_mus_properties(&trapezoid_file(), &params()).unwrap();
        assert_eq!(props.mus.len(), 2);
        assert_eq!(props.mvc, 400.0);
        assert!((props.avg_accuracy.unwrap() - 0.90).abs() < 1e-12);
        assert!(props.avg_sil.is_none());
        // Flat plateau
        assert!(props.cov_steady.abs() < 1e-9);

        let mu1 = &props.mus[1];
        assert_eq!(mu1.accuracy, Some(0.88));
        assert!((mu1.thresholds.abs_rt.unwrap() - 90.0).abs() < 1e-9);
        assert!((mu1.dr.all - 20.0).abs() < 1e-9);
        assert!(mu1.covisi.rec.is_none());
        assert!(mu1.covisi.steady.unwrap().abs() < 1e-9);
    }

    #[test]
    fn test_sil_requires_ipts() {
        let p = params().with_accuracy(AccuracyMetric::Sil);
        assert!(basic_mus_properties(&trapezoid_file(), &p).is_err());
    }

    #[test]
    fn test_sil_pnr_with_ipts() {
        let file = trapezoid_file();
        let mut ipts = Array2::<f64>::from_elem((file.emg_length, 2), 0.01);
        for (mu, pulses) in file.mupulses.iter().enumerate() {
            for &p in pulses {
                ipts[[p, mu]] = 1.0;
            }
        }
        let file = file.with_ipts(ipts);
        let p = params().with_accuracy(AccuracyMetric::SilPnr);
        let props = basic_mus_properties(&file, &p).unwrap();
        assert!(props.avg_accuracy.is_none());
        assert!((props.avg_sil.unwrap() - 1.0).abs() < 1e-9);
        assert!(props.avg_pnr.unwrap() > 30.0);
        assert!(props.mus[0].accuracy.is_none());
    }

    #[test]
    fn test_properties_csv_layout() {
        let props = basic_mus_properties(&trapezoid_file(), &params()).unwrap();
        let mut out = Vec::new();
        props.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("MVC,avg_Accuracy,COV_steady,MU_number,Accuracy,abs_RT"));
        assert!(lines[0].ends_with("COVisi_steady,COVisi_all"));
        assert!(lines[1].starts_with("400,"));
        assert!(lines[2].starts_with(",,,1,"));
    }

    #[test]
    fn test_accuracy_parsing() {
        assert_eq!("SIL_PNR".parse::<AccuracyMetric>().unwrap(), AccuracyMetric::SilPnr);
        assert!("rmse".parse::<AccuracyMetric>().is_err());
    }
}
