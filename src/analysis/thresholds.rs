// src/analysis/thresholds.rs
//! Recruitment and derecruitment thresholds

use crate::emgfile::EmgFile;
use crate::error::{EmgErrorBuilder, EmgResult};
use serde::{Deserialize, Serialize};

/// Which threshold to report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdEvent {
    #[default]
    RtDert,
    Rt,
    Dert,
}

/// Absolute (in the unit of the MVC), relative (% MVC) or both
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdType {
    #[default]
    AbsRel,
    Rel,
    Abs,
}

/// Thresholds of one MU; fields outside the requested event and type are `None`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Thresholds {
    #[serde(rename = "abs_RT", skip_serializing_if = "Option::is_none")]
    pub abs_rt: Option<f64>,
    #[serde(rename = "abs_DERT", skip_serializing_if = "Option::is_none")]
    pub abs_dert: Option<f64>,
    #[serde(rename = "rel_RT", skip_serializing_if = "Option::is_none")]
    pub rel_rt: Option<f64>,
    #[serde(rename = "rel_DERT", skip_serializing_if = "Option::is_none")]
    pub rel_dert: Option<f64>,
}

/// Reference signal at the first and last discharge of every MU
///
/// The reference signal is expected in % MVC. `mvc` is only used for
/// absolute thresholds and must then be positive. MUs without discharges
/// get NaN.
pub fn compute_thresholds(
    emgfile: &EmgFile,
    event: ThresholdEvent,
    kind: ThresholdType,
    mvc: f64,
) -> EmgResult<Vec<Thresholds>> {
    let err = || EmgErrorBuilder::new("analysis::thresholds", "compute_thresholds");
    if !emgfile.has_ref_signal() {
        return Err(err().invalid_data("REF_SIGNAL", "thresholds need a reference signal"));
    }
    let wants_abs = kind != ThresholdType::Rel;
    if wants_abs && (mvc.is_nan() || mvc <= 0.0) {
        return Err(err().configuration("absolute thresholds need a positive MVC"));
    }
    let ref_signal = &emgfile.ref_signal;

    emgfile
        .mupulses
        .iter()
        .enumerate()
        .map(|(mu, pulses)| {
            let (rel_rt, rel_dert) = match (pulses.first(), pulses.last()) {
                (Some(&first), Some(&last)) => {
                    let at = |sample: usize| {
                        ref_signal.get(sample).copied().ok_or_else(|| {
                            err().mismatch(
                                "MUPULSES",
                                &format!("MU {} discharges beyond the reference signal", mu),
                                format!("< {}", ref_signal.len()),
                                sample,
                            )
                        })
                    };
                    (at(first)?, at(last)?)
                }
                _ => (f64::NAN, f64::NAN),
            };

            let rt = event != ThresholdEvent::Dert;
            let dert = event != ThresholdEvent::Rt;
            let rel = kind != ThresholdType::Abs;
            Ok(Thresholds {
                abs_rt: (wants_abs && rt).then(|| rel_rt * mvc / 100.0),
                abs_dert: (wants_abs && dert).then(|| rel_dert * mvc / 100.0),
                rel_rt: (rel && rt).then_some(rel_rt),
                rel_dert: (rel && dert).then_some(rel_dert),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::test_support::trapezoid_file;

    #[test]
    fn test_thresholds_on_ramp() {
        let file = trapezoid_file();
        let th = compute_thresholds(&file, ThresholdEvent::RtDert, ThresholdType::AbsRel, 200.0).unwrap();
        assert_eq!(th.len(), 2);
        // MU 0 recruited at 1 s (15 %), derecruited at 7 s (15 %)
        assert!((th[0].rel_rt.unwrap() - 15.0).abs() < 1e-9);
        assert!((th[0].rel_dert.unwrap() - 15.0).abs() < 1e-9);
        assert!((th[0].abs_rt.unwrap() - 30.0).abs() < 1e-9);
        // MU 1 recruited at 1.5 s (22.5 %)
        assert!((th[1].rel_rt.unwrap() - 22.5).abs() < 1e-9);
    }

    #[test]
    fn test_threshold_selection() {
        let file = trapezoid_file();
        let th = compute_thresholds(&file, ThresholdEvent::Rt, ThresholdType::Rel, 0.0).unwrap();
        assert!(th[0].rel_rt.is_some());
        assert!(th[0].rel_dert.is_none());
        assert!(th[0].abs_rt.is_none());

        let json = serde_json::to_string(&th[0]).unwrap();
        assert_eq!(json, r#"{"rel_RT":15.0}"#);
    }

    #[test]
    fn test_absolute_thresholds_need_mvc() {
        let file = trapezoid_file();
        assert!(compute_thresholds(&file, ThresholdEvent::RtDert, ThresholdType::Abs, 0.0).is_err());
    }

    #[test]
    fn test_empty_mu_is_nan() {
        let mut file = trapezoid_file();
        file.set_mupulses(vec![vec![], vec![2000]]).unwrap();
        let th = compute_thresholds(&file, ThresholdEvent::RtDert, ThresholdType::Rel, 0.0).unwrap();
        assert!(th[0].rel_rt.unwrap().is_nan());
        assert!((th[1].rel_dert.unwrap() - 30.0).abs() < 1e-9);
    }
}
