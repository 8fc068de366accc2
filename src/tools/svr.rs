// src/tools/svr.rs
//! Support vector regression of the discharge rate
//!
//! The smoother is an epsilon-SVR with an RBF kernel trained by sequential
//! minimal optimisation on the dual problem. Sample weights scale the box
//! constraint of each sample, so heavily weighted discharges are fitted more
//! tightly.

use crate::config::constants::svr::{EPSILON_IQR_DIVISOR, SOLVER_MAX_PASSES, SOLVER_TOLERANCE};
use crate::config::SvrConfig;
use crate::emgfile::EmgFile;
use crate::error::{EmgErrorBuilder, EmgResult, ProcessingStage};
use ndarray::Array1;
use rayon::prelude::*;
use tracing::{debug, trace};

const TAU: f64 = 1e-12;

/// Trained epsilon-SVR with an RBF kernel
#[derive(Debug, Clone)]
pub struct EpsilonSvr {
    support: Vec<f64>,
    coef: Vec<f64>,
    rho: f64,
    gamma: f64,
}

impl EpsilonSvr {
    /// Fit `y = f(x)` on one-dimensional inputs
    pub fn fit(x: &[f64], y: &[f64], weights: &[f64], c: f64, epsilon: f64, gamma: f64) -> EmgResult<Self> {
        let n = x.len();
        if n == 0 || y.len() != n || weights.len() != n {
            return Err(EmgErrorBuilder::new("tools::svr", "fit")
                .processing(ProcessingStage::Regression, "inputs must be non-empty and of equal length"));
        }
        let kernel: Vec<Vec<f64>> = x
            .iter()
            .map(|&a| x.iter().map(|&b| rbf(a, b, gamma)).collect())
            .collect();

        // Dual variables: [alpha+ ; alpha-] with signs +1 / -1
        let l = 2 * n;
        let sign = |t: usize| if t < n { 1.0 } else { -1.0 };
        let bound: Vec<f64> = (0..l).map(|t| c.abs() * weights[t % n]).collect();
        let q = |i: usize, j: usize| sign(i) * sign(j) * kernel[i % n][j % n];

        let mut alpha = vec![0.0; l];
        let mut grad: Vec<f64> = (0..l)
            .map(|t| if t < n { epsilon - y[t] } else { epsilon + y[t - n] })
            .collect();

        let is_upper = |a: f64, t: usize| a >= bound[t];
        let is_lower = |a: f64| a <= 0.0;
        let max_iter = SOLVER_MAX_PASSES.max(100 * l);
        let mut iter = 0;

        while iter < max_iter {
            // Maximal violating pair
            let (mut gmax, mut gmin) = (f64::NEG_INFINITY, f64::INFINITY);
            let (mut i, mut j) = (None, None);
            for t in 0..l {
                let v = -sign(t) * grad[t];
                let up = if sign(t) > 0.0 { !is_upper(alpha[t], t) } else { !is_lower(alpha[t]) };
                let low = if sign(t) > 0.0 { !is_lower(alpha[t]) } else { !is_upper(alpha[t], t) };
                if up && v > gmax {
                    gmax = v;
                    i = Some(t);
                }
                if low && v < gmin {
                    gmin = v;
                    j = Some(t);
                }
            }
            let (i, j) = match (i, j) {
                (Some(i), Some(j)) if gmax - gmin >= SOLVER_TOLERANCE => (i, j),
                _ => break,
            };
            iter += 1;

            let (ci, cj) = (bound[i], bound[j]);
            let (old_i, old_j) = (alpha[i], alpha[j]);
            if sign(i) != sign(j) {
                let quad = (q(i, i) + q(j, j) + 2.0 * q(i, j)).max(TAU);
                let delta = (-grad[i] - grad[j]) / quad;
                let diff = alpha[i] - alpha[j];
                alpha[i] += delta;
                alpha[j] += delta;
                if diff > 0.0 {
                    if alpha[j] < 0.0 {
                        alpha[j] = 0.0;
                        alpha[i] = diff;
                    }
                } else if alpha[i] < 0.0 {
                    alpha[i] = 0.0;
                    alpha[j] = -diff;
                }
                if diff > ci - cj {
                    if alpha[i] > ci {
                        alpha[i] = ci;
                        alpha[j] = ci - diff;
                    }
                } else if alpha[j] > cj {
                    alpha[j] = cj;
                    alpha[i] = cj + diff;
                }
            } else {
                let quad = (q(i, i) + q(j, j) - 2.0 * q(i, j)).max(TAU);
                let delta = (grad[i] - grad[j]) / quad;
                let sum = alpha[i] + alpha[j];
                alpha[i] -= delta;
                alpha[j] += delta;
                if sum > ci {
                    if alpha[i] > ci {
                        alpha[i] = ci;
                        alpha[j] = sum - ci;
                    }
                } else if alpha[j] < 0.0 {
                    alpha[j] = 0.0;
                    alpha[i] = sum;
                }
                if sum > cj {
                    if alpha[j] > cj {
                        alpha[j] = cj;
                        alpha[i] = sum - cj;
                    }
                } else if alpha[i] < 0.0 {
                    alpha[i] = 0.0;
                    alpha[j] = sum;
                }
            }

            let (di, dj) = (alpha[i] - old_i, alpha[j] - old_j);
            for (t, g) in grad.iter_mut().enumerate() {
                *g += q(t, i) * di + q(t, j) * dj;
            }
        }
        trace!(iterations = iter, samples = n, "SVR solver finished");

        let rho = {
            let (mut ub, mut lb) = (f64::INFINITY, f64::NEG_INFINITY);
            let (mut sum_free, mut n_free) = (0.0, 0usize);
            for t in 0..l {
                let yg = sign(t) * grad[t];
                if is_upper(alpha[t], t) {
                    if sign(t) < 0.0 {
                        ub = ub.min(yg);
                    } else {
                        lb = lb.max(yg);
                    }
                } else if is_lower(alpha[t]) {
                    if sign(t) > 0.0 {
                        ub = ub.min(yg);
                    } else {
                        lb = lb.max(yg);
                    }
                } else {
                    sum_free += yg;
                    n_free += 1;
                }
            }
            if n_free > 0 {
                sum_free / n_free as f64
            } else {
                (ub + lb) / 2.0
            }
        };

        Ok(Self {
            support: x.to_vec(),
            coef: (0..n).map(|t| alpha[t] - alpha[t + n]).collect(),
            rho,
            gamma,
        })
    }

    /// Evaluate the fitted function
    pub fn predict(&self, x: f64) -> f64 {
        self.support
            .iter()
            .zip(&self.coef)
            .filter(|(_, c)| **c != 0.0)
            .map(|(&s, c)| c * rbf(s, x, self.gamma))
            .sum::<f64>()
            - self.rho
    }
}

fn rbf(a: f64, b: f64, gamma: f64) -> f64 {
    (-gamma * (a - b).powi(2)).exp()
}

/// Interquartile range with linear interpolation between order statistics
fn iqr(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let quantile = |q: f64| {
        let pos = q * (sorted.len() - 1) as f64;
        let (lo, hi) = (pos.floor() as usize, pos.ceil() as usize);
        sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
    };
    quantile(0.75) - quantile(0.25)
}

/// Smoothed discharge rates of every MU
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SvrFits {
    /// Fit at each discharge that closes an inter-discharge interval
    pub svrfit: Vec<Array1<f64>>,
    /// Sample index of each value of `svrfit`
    pub svrtime: Vec<Array1<f64>>,
    /// Fit over the whole recording, NaN outside the discharge periods
    pub gensvr: Vec<Array1<f64>>,
}

/// Fit the instantaneous discharge rate of every MU with support vector regression
///
/// Discharge trains are split where two discharges are further apart than
/// the discontinuity duration, and each piece is fitted on its own. The
/// first and last discharges of each piece are weighted more heavily so
/// the fit does not drift at the ends.
pub fn compute_svr(emgfile: &EmgFile, params: &SvrConfig) -> EmgResult<SvrFits> {
    let fits: Vec<(Array1<f64>, Array1<f64>, Array1<f64>)> = emgfile
        .mupulses
        .par_iter()
        .map(|pulses| fit_mu(pulses, emgfile.fsamp, emgfile.emg_length, params))
        .collect::<EmgResult<_>>()?;

    let mut out = SvrFits::default();
    for (svrfit, svrtime, gensvr) in fits {
        out.svrfit.push(svrfit);
        out.svrtime.push(svrtime);
        out.gensvr.push(gensvr);
    }
    debug!(mus = out.svrfit.len(), "computed SVR fits");
    Ok(out)
}

fn fit_mu(
    pulses: &[usize],
    fsamp: f64,
    emg_length: usize,
    params: &SvrConfig,
) -> EmgResult<(Array1<f64>, Array1<f64>, Array1<f64>)> {
    let mut gensvr = Array1::from_elem(emg_length, f64::NAN);
    if pulses.len() < 2 {
        return Ok((Array1::zeros(0), Array1::zeros(0), gensvr));
    }

    // Each rate is assigned to the discharge closing its interval
    let times: Vec<usize> = pulses[1..].to_vec();
    let rates: Vec<f64> = pulses.windows(2).map(|w| fsamp / (w[1] - w[0]) as f64).collect();

    let gap = params.discontinuity_duration * fsamp;
    let mut pieces = Vec::new();
    let mut piece_start = 0;
    for k in 1..times.len() {
        if (times[k] - times[k - 1]) as f64 > gap {
            pieces.push(piece_start..k);
            piece_start = k;
        }
    }
    pieces.push(piece_start..times.len());

    let mut svrfit = Vec::with_capacity(times.len());
    for piece in pieces {
        let t: Vec<usize> = times[piece.clone()].to_vec();
        let r: Vec<f64> = rates[piece].to_vec();
        let x: Vec<f64> = t.iter().map(|&p| p as f64 / fsamp).collect();

        if r.len() < 2 {
            svrfit.extend(r.iter().copied());
            for (&p, &v) in t.iter().zip(&r) {
                gensvr[p] = v;
            }
            continue;
        }

        let mut weights = vec![1.0; r.len()];
        let n_end = params.endpoint_weight_pulses.min(r.len());
        for w in weights.iter_mut().take(n_end) {
            *w = params.endpoint_weight_magnitude;
        }
        for w in weights.iter_mut().rev().take(n_end) {
            *w = params.endpoint_weight_magnitude;
        }

        let epsilon = iqr(&r) / EPSILON_IQR_DIVISOR;
        let model = EpsilonSvr::fit(&x, &r, &weights, params.regularization, epsilon, params.gamma)?;

        svrfit.extend(x.iter().map(|&xi| model.predict(xi)));
        for sample in t[0]..=t[t.len() - 1] {
            gensvr[sample] = model.predict(sample as f64 / fsamp);
        }
    }

    let svrtime = times.iter().map(|&p| p as f64).collect();
    Ok((Array1::from(svrfit), svrtime, gensvr))
}
