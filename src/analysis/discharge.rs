// src/analysis/discharge.rs
//! Discharge rate and discharge variability

use super::{cov_percent, nanmean, tail, DischargeParams, SteadyRange};
use crate::emgfile::EmgFile;
use crate::error::{EmgErrorBuilder, EmgResult};
use crate::tools::{compute_idr, IdrTable};
use serde::Serialize;
use tracing::warn;

/// Discharge rate (pps) of one MU
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DischargeRate {
    #[serde(rename = "DR_rec", skip_serializing_if = "Option::is_none")]
    pub rec: Option<f64>,
    #[serde(rename = "DR_derec", skip_serializing_if = "Option::is_none")]
    pub derec: Option<f64>,
    #[serde(rename = "DR_start_steady", skip_serializing_if = "Option::is_none")]
    pub start_steady: Option<f64>,
    #[serde(rename = "DR_end_steady", skip_serializing_if = "Option::is_none")]
    pub end_steady: Option<f64>,
    #[serde(rename = "DR_all_steady", skip_serializing_if = "Option::is_none")]
    pub all_steady: Option<f64>,
    #[serde(rename = "DR_all")]
    pub all: f64,
}

/// Coefficient of variation (%) of the interspike interval of one MU
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CovIsi {
    #[serde(rename = "COVisi_rec", skip_serializing_if = "Option::is_none")]
    pub rec: Option<f64>,
    #[serde(rename = "COVisi_derec", skip_serializing_if = "Option::is_none")]
    pub derec: Option<f64>,
    #[serde(rename = "COVisi_steady", skip_serializing_if = "Option::is_none")]
    pub steady: Option<f64>,
    #[serde(rename = "COVisi_all")]
    pub all: f64,
}

/// Coefficient of variation (%) of the discharge rate of one MU
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DrVariability {
    #[serde(rename = "DRvar_rec", skip_serializing_if = "Option::is_none")]
    pub rec: Option<f64>,
    #[serde(rename = "DRvar_derec", skip_serializing_if = "Option::is_none")]
    pub derec: Option<f64>,
    #[serde(rename = "DRvar_steady", skip_serializing_if = "Option::is_none")]
    pub steady: Option<f64>,
    #[serde(rename = "DRvar_all")]
    pub all: f64,
}

/// Discharge rate at recruitment, derecruitment and during the steady state
///
/// Recruitment averages the first `n_firings_rec_derec` IDR values and
/// derecruitment the last `n_firings_rec_derec - 1`; the first IDR value of
/// every MU is undefined and skipped. The steady state starts at the first
/// discharge inside the range and ends at the first discharge at or after
/// its end. Its start and end rates use `n_firings_steady` values.
pub fn compute_dr(emgfile: &EmgFile, params: &DischargeParams) -> EmgResult<Vec<DischargeRate>> {
    let steady = params.steady_range("compute_dr")?;
    let n = params.n_firings_rec_derec;
    let event = params.event;

    let rates = compute_idr(emgfile)
        .iter()
        .enumerate()
        .map(|(mu, table)| {
            let idr = &table.idr;
            let (rec, derec) = if idr.len() >= n && n > 0 {
                (nanmean(&idr[..n]), nanmean(tail(idr, n - 1)))
            } else {
                warn!(mu, firings = idr.len(), "not enough firings for the DR at recruitment and derecruitment");
                (f64::NAN, f64::NAN)
            };

            let (start_steady, end_steady, all_steady) = match steady {
                Some(range) => steady_rates(table, range, params.n_firings_steady),
                None => (f64::NAN, f64::NAN, f64::NAN),
            };

            DischargeRate {
                rec: event.has_rec().then_some(rec),
                derec: event.has_derec().then_some(derec),
                start_steady: event.has_steady().then_some(start_steady),
                end_steady: event.has_steady().then_some(end_steady),
                all_steady: event.has_steady().then_some(all_steady),
                all: nanmean(idr),
            }
        })
        .collect();
    Ok(rates)
}

fn steady_rates(table: &IdrTable, range: SteadyRange, n_steady: usize) -> (f64, f64, f64) {
    let Some(first) = table.mupulses.iter().position(|&p| range.contains(p)) else {
        return (f64::NAN, f64::NAN, f64::NAN);
    };
    let last_index = table.len() - 1;
    let last = table
        .mupulses
        .iter()
        .position(|&p| p >= range.end)
        .unwrap_or(last_index);

    // Inclusive windows over IDR positions
    let window = |lo: usize, hi: usize| {
        let hi = hi.min(last_index);
        if lo > hi {
            f64::NAN
        } else {
            nanmean(&table.idr[lo..=hi])
        }
    };
    (
        window(first + 1, first + n_steady),
        window((last + 1).saturating_sub(n_steady), last),
        window(first + 1, last),
    )
}

/// Variability of one per-discharge series over the contraction phases
fn phase_variability(
    values: &[f64],
    pulses: &[usize],
    n: usize,
    steady: Option<SteadyRange>,
) -> (f64, f64, f64, f64) {
    let rec = cov_percent(&values[..n.min(values.len())]);
    let derec = cov_percent(tail(values, n.saturating_sub(1)));
    let steady = steady
        .map(|range| {
            let selected: Vec<f64> = pulses
                .iter()
                .zip(values)
                .filter(|(&p, _)| range.contains(p))
                .map(|(_, &v)| v)
                .collect();
            cov_percent(&selected)
        })
        .unwrap_or(f64::NAN);
    (rec, derec, steady, cov_percent(values))
}

/// Coefficient of variation of the interspike interval
pub fn compute_covisi(emgfile: &EmgFile, params: &DischargeParams) -> EmgResult<Vec<CovIsi>> {
    let steady = params.steady_range("compute_covisi")?;
    let event = params.event;
    Ok(compute_idr(emgfile)
        .iter()
        .map(|table| {
            let (rec, derec, steady, all) =
                phase_variability(&table.diff_mupulses, &table.mupulses, params.n_firings_rec_derec, steady);
            CovIsi {
                rec: event.has_rec().then_some(rec),
                derec: event.has_derec().then_some(derec),
                steady: event.has_steady().then_some(steady),
                all,
            }
        })
        .collect())
}

/// Coefficient of variation of the interspike interval of a single MU over the whole recording
pub fn compute_mu_covisi(emgfile: &EmgFile, mu: usize) -> EmgResult<f64> {
    let pulses = emgfile.mupulses.get(mu).ok_or_else(|| {
        EmgErrorBuilder::new("analysis::discharge", "compute_mu_covisi").mismatch(
            "MU",
            "index out of range",
            format!("< {}", emgfile.number_of_mus),
            mu,
        )
    })?;
    Ok(cov_percent(&IdrTable::from_pulses(pulses, emgfile.fsamp).diff_mupulses))
}

/// Coefficient of variation of the instantaneous discharge rate
pub fn compute_drvariability(emgfile: &EmgFile, params: &DischargeParams) -> EmgResult<Vec<DrVariability>> {
    let steady = params.steady_range("compute_drvariability")?;
    let event = params.event;
    Ok(compute_idr(emgfile)
        .iter()
        .map(|table| {
            let (rec, derec, steady, all) =
                phase_variability(&table.idr, &table.mupulses, params.n_firings_rec_derec, steady);
            DrVariability {
                rec: event.has_rec().then_some(rec),
                derec: event.has_derec().then_some(derec),
                steady: event.has_steady().then_some(steady),
                all,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::test_support::trapezoid_file;
    use crate::analysis::DischargeEvent;
    use crate::emgfile::Source;
    use ndarray::Array2;

    /// 100 ms intervals, then three 200 ms intervals, then 100 ms again
    fn irregular_file() -> EmgFile {
        EmgFile::new(Source::CustomCsv, "irregular", Array2::zeros((1200, 1)), 1000.0, 8.0)
            .with_mupulses(vec![vec![0, 100, 200, 300, 500, 700, 900, 1000, 1100]])
            .unwrap()
    }

    fn params() -> DischargeParams {
        DischargeParams {
            n_firings_rec_derec: 4,
            n_firings_steady: 2,
            steady: Some(SteadyRange::new(400, 900)),
            event: DischargeEvent::RecDerecSteady,
        }
    }

    #[test]
    fn test_compute_dr_phases() {
        let dr = compute_dr(&irregular_file(), &params()).unwrap();
        let dr = dr[0];
        assert!((dr.rec.unwrap() - 10.0).abs() < 1e-12);
        assert!((dr.derec.unwrap() - 25.0 / 3.0).abs() < 1e-12);
        assert!((dr.start_steady.unwrap() - 5.0).abs() < 1e-12);
        assert!((dr.end_steady.unwrap() - 5.0).abs() < 1e-12);
        assert!((dr.all_steady.unwrap() - 5.0).abs() < 1e-12);
        assert!((dr.all - 8.125).abs() < 1e-12);
    }

    #[test]
    fn test_compute_dr_on_regular_trains() {
        let params = DischargeParams::default().with_steady(2000, 6000);
        let dr = compute_dr(&trapezoid_file(), &params).unwrap();
        assert!((dr[0].all - 10.0).abs() < 1e-9);
        assert!((dr[0].start_steady.unwrap() - 10.0).abs() < 1e-9);
        assert!((dr[1].all_steady.unwrap() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_compute_dr_without_enough_firings() {
        let file = EmgFile::new(Source::CustomCsv, "short", Array2::zeros((500, 1)), 1000.0, 8.0)
            .with_mupulses(vec![vec![10, 110]])
            .unwrap();
        let params = DischargeParams::default().with_event(DischargeEvent::RecDerec);
        let dr = compute_dr(&file, &params).unwrap();
        assert!(dr[0].rec.unwrap().is_nan());
        assert!(dr[0].start_steady.is_none());
        assert!((dr[0].all - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_steady_events_need_range() {
        assert!(compute_dr(&irregular_file(), &DischargeParams::default()).is_err());
        assert!(compute_covisi(&irregular_file(), &DischargeParams::default()).is_err());
    }

    #[test]
    fn test_compute_covisi() {
        let covisi = compute_covisi(&irregular_file(), &params()).unwrap();
        let c = covisi[0];
        assert!(c.rec.unwrap().abs() < 1e-12);
        assert!((c.derec.unwrap() - 43.30127018922193).abs() < 1e-9);
        assert!(c.steady.unwrap().abs() < 1e-12);
        assert!((c.all - 37.63993960049205).abs() < 1e-9);

        let single = compute_mu_covisi(&irregular_file(), 0).unwrap();
        assert!((single - c.all).abs() < 1e-12);
        assert!(compute_mu_covisi(&irregular_file(), 3).is_err());
    }

    #[test]
    fn test_compute_drvariability() {
        let var = compute_drvariability(&irregular_file(), &params()).unwrap();
        assert!((var[0].derec.unwrap() - 34.64101615137754).abs() < 1e-9);
        assert!((var[0].all - 31.849179661954814).abs() < 1e-9);
    }

    #[test]
    fn test_serialized_columns_follow_event() {
        let params = params().with_event(DischargeEvent::Rec);
        let dr = compute_dr(&irregular_file(), &params).unwrap();
        let json = serde_json::to_value(dr[0]).unwrap();
        let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 2);
        assert!(json.get("DR_rec").is_some());
        assert!(json.get("DR_all").is_some());
    }
}
