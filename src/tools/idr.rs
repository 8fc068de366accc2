// src/tools/idr.rs
//! Instantaneous discharge rate

use crate::emgfile::EmgFile;
use serde::Serialize;

/// Per-discharge table of one MU
///
/// The first row has no previous discharge, so its `diff_mupulses` and `idr`
/// are NaN.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct IdrTable {
    pub mupulses: Vec<usize>,
    pub diff_mupulses: Vec<f64>,
    pub timesec: Vec<f64>,
    pub idr: Vec<f64>,
}

impl IdrTable {
    pub fn from_pulses(pulses: &[usize], fsamp: f64) -> Self {
        let diff_mupulses: Vec<f64> = std::iter::once(f64::NAN)
            .chain(pulses.windows(2).map(|w| (w[1] - w[0]) as f64))
            .take(pulses.len())
            .collect();
        Self {
            mupulses: pulses.to_vec(),
            timesec: pulses.iter().map(|&p| p as f64 / fsamp).collect(),
            idr: diff_mupulses.iter().map(|d| fsamp / d).collect(),
            diff_mupulses,
        }
    }

    pub fn len(&self) -> usize {
        self.mupulses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mupulses.is_empty()
    }
}

/// Instantaneous discharge rate of every MU
pub fn compute_idr(emgfile: &EmgFile) -> Vec<IdrTable> {
    emgfile
        .mupulses
        .iter()
        .map(|pulses| IdrTable::from_pulses(pulses, emgfile.fsamp))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emgfile::Source;
    use ndarray::Array2;

    #[test]
    fn test_compute_idr() {
        let file = EmgFile::new(Source::Otb, "idr", Array2::zeros((2000, 1)), 1000.0, 8.0)
            .with_mupulses(vec![vec![100, 200, 400], vec![]])
            .unwrap();
        let idr = compute_idr(&file);
        assert_eq!(idr.len(), 2);
        assert!(idr[0].idr[0].is_nan());
        assert!(idr[0].diff_mupulses[0].is_nan());
        assert_eq!(idr[0].idr[1], 10.0);
        assert_eq!(idr[0].idr[2], 5.0);
        assert_eq!(idr[0].timesec, vec![0.1, 0.2, 0.4]);
        assert!(idr[1].is_empty());
    }
}
