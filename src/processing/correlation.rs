// src/processing/correlation.rs
//! FFT based full cross-correlation in one and two dimensions

use ndarray::{Array2, ArrayView2};
use rustfft::num_complex::Complex64;
use rustfft::FftPlanner;

/// Full cross-correlation, `c[k] = sum_n a[n + k - (b.len() - 1)] * b[n]`
///
/// Output length is `a.len() + b.len() - 1`, lag zero sits at index `b.len() - 1`.
pub fn correlate_full(a: &[f64], b: &[f64]) -> Vec<f64> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }
    let out_len = a.len() + b.len() - 1;
    let size = out_len.next_power_of_two();

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(size);
    let ifft = planner.plan_fft_inverse(size);

    let mut fa: Vec<Complex64> = a.iter().map(|&v| Complex64::new(v, 0.0)).collect();
    fa.resize(size, Complex64::new(0.0, 0.0));
    // Correlation is convolution with the reversed kernel
    let mut fb: Vec<Complex64> = b.iter().rev().map(|&v| Complex64::new(v, 0.0)).collect();
    fb.resize(size, Complex64::new(0.0, 0.0));

    fft.process(&mut fa);
    fft.process(&mut fb);
    for (x, y) in fa.iter_mut().zip(fb.iter()) {
        *x *= y;
    }
    ifft.process(&mut fa);

    let scale = 1.0 / size as f64;
    fa.iter().take(out_len).map(|c| c.re * scale).collect()
}

/// Full 2D cross-correlation of two tables
///
/// Output shape is `(a.rows + b.rows - 1, a.cols + b.cols - 1)`.
pub fn correlate2d_full(a: ArrayView2<f64>, b: ArrayView2<f64>) -> Array2<f64> {
    let (ra, ca) = a.dim();
    let (rb, cb) = b.dim();
    if ra == 0 || ca == 0 || rb == 0 || cb == 0 {
        return Array2::zeros((0, 0));
    }
    let rows = ra + rb - 1;
    let cols = ca + cb - 1;

    let mut fa = Array2::<Complex64>::zeros((rows, cols));
    let mut fb = Array2::<Complex64>::zeros((rows, cols));
    for ((i, j), &v) in a.indexed_iter() {
        fa[[i, j]] = Complex64::new(v, 0.0);
    }
    // Rotate the kernel by 180 degrees
    for ((i, j), &v) in b.indexed_iter() {
        fb[[rb - 1 - i, cb - 1 - j]] = Complex64::new(v, 0.0);
    }

    let mut planner = FftPlanner::<f64>::new();
    fft2(&mut planner, &mut fa, false);
    fft2(&mut planner, &mut fb, false);
    fa.zip_mut_with(&fb, |x, y| *x *= y);
    fft2(&mut planner, &mut fa, true);

    let scale = 1.0 / (rows * cols) as f64;
    fa.mapv(|c| c.re * scale)
}

fn fft2(planner: &mut FftPlanner<f64>, data: &mut Array2<Complex64>, inverse: bool) {
    let (rows, cols) = data.dim();
    let row_fft = if inverse { planner.plan_fft_inverse(cols) } else { planner.plan_fft_forward(cols) };
    let col_fft = if inverse { planner.plan_fft_inverse(rows) } else { planner.plan_fft_forward(rows) };

    let mut buffer = vec![Complex64::new(0.0, 0.0); cols.max(rows)];
    for mut row in data.rows_mut() {
        let buf = &mut buffer[..cols];
        for (dst, src) in buf.iter_mut().zip(row.iter()) {
            *dst = *src;
        }
        row_fft.process(buf);
        for (dst, src) in row.iter_mut().zip(buf.iter()) {
            *dst = *src;
        }
    }
    for mut col in data.columns_mut() {
        let buf = &mut buffer[..rows];
        for (dst, src) in buf.iter_mut().zip(col.iter()) {
            *dst = *src;
        }
        col_fft.process(buf);
        for (dst, src) in col.iter_mut().zip(buf.iter()) {
            *dst = *src;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn direct_correlate(a: &[f64], b: &[f64]) -> Vec<f64> {
        let nb = b.len() as i64;
        (0..(a.len() + b.len() - 1) as i64)
            .map(|k| {
                let lag = k - (nb - 1);
                (0..b.len() as i64)
                    .filter_map(|n| {
                        let i = n + lag;
                        (i >= 0 && (i as usize) < a.len()).then(|| a[i as usize] * b[n as usize])
                    })
                    .sum()
            })
            .collect()
    }

    #[test]
    fn test_correlate_matches_direct_sum() {
        let a = [1.0, 2.0, 3.0, -1.0, 0.5];
        let b = [0.0, 1.0, 0.5];
        let fast = correlate_full(&a, &b);
        let slow = direct_correlate(&a, &b);
        assert_eq!(fast.len(), 7);
        for (x, y) in fast.iter().zip(slow.iter()) {
            assert!((x - y).abs() < 1e-10);
        }
    }

    #[test]
    fn test_autocorrelation_peaks_at_zero_lag() {
        let a = [0.0, 1.0, 4.0, 1.0, 0.0];
        let c = correlate_full(&a, &a);
        let peak = c.iter().enumerate().max_by(|x, y| x.1.total_cmp(y.1)).unwrap().0;
        assert_eq!(peak, a.len() - 1);
        assert!((c[peak] - 18.0).abs() < 1e-10);
    }

    #[test]
    fn test_correlate2d_shape_and_center() {
        let a = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let c = correlate2d_full(a.view(), a.view());
        assert_eq!(c.dim(), (5, 3));
        // Zero shift equals the sum of squares
        assert!((c[[2, 1]] - 91.0).abs() < 1e-9);
        // One row shift: rows (3,4)(5,6) against (1,2)(3,4)
        assert!((c[[3, 1]] - (3.0 + 8.0 + 15.0 + 24.0)).abs() < 1e-9);
    }
}
