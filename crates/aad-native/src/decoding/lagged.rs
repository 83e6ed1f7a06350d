//! Time-lagged design matrices
//!
//! Lagged copies of a multi-band signal are laid out band-fastest: column
//! `l·B + b` holds band `b` shifted by the `l`-th lag. Samples shifted in
//! from outside the trial are zero.

use nalgebra::DMatrix;

use aad_core::config::ms_to_samples;
use aad_core::types::SampleMatrix;

/// Inclusive range of integer sample lags.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LagWindow {
    /// First lag (may be negative)
    pub min: isize,
    /// Last lag
    pub max: isize,
}

impl LagWindow {
    /// Create a lag window; bounds are swapped if inverted
    #[must_use]
    pub fn new(min: isize, max: isize) -> Self {
        Self { min: min.min(max), max: min.max(max) }
    }

    /// Lag window from millisecond bounds at `rate_hz`
    #[must_use]
    pub fn from_ms(min_ms: f64, max_ms: f64, rate_hz: f64) -> Self {
        Self::new(ms_to_samples(min_ms, rate_hz), ms_to_samples(max_ms, rate_hz))
    }

    /// Number of lags
    #[must_use]
    pub fn len(&self) -> usize {
        (self.max - self.min) as usize + 1
    }

    /// Always false; a window holds at least one lag
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Lags in ascending order
    pub fn iter(&self) -> impl Iterator<Item = isize> {
        self.min..=self.max
    }
}

/// `[T × (L·B)]` design matrix with `X[t, l·B + b] = s_b(t − lag_l)`.
#[must_use]
pub fn lagged_design(signal: &SampleMatrix, lags: LagWindow) -> DMatrix<f64> {
    let n = signal.n_samples();
    let bands = signal.n_channels();
    let mut design = DMatrix::zeros(n, lags.len() * bands);

    for (l, lag) in lags.iter().enumerate() {
        for b in 0..bands {
            let source = signal.channel(b);
            let mut column = design.column_mut(l * bands + b);
            for t in 0..n {
                let s = t as isize - lag;
                if s >= 0 && (s as usize) < n {
                    column[t] = source[s as usize];
                }
            }
        }
    }
    design
}

/// `[T × C]` dense copy of a sample matrix.
#[must_use]
pub fn to_dmatrix(signal: &SampleMatrix) -> DMatrix<f64> {
    let mut out = DMatrix::zeros(signal.n_samples(), signal.n_channels());
    for c in 0..signal.n_channels() {
        out.column_mut(c).copy_from_slice(signal.channel(c));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lag_window_from_ms() {
        let lags = LagWindow::from_ms(-100.0, 400.0, 64.0);
        assert_eq!(lags, LagWindow { min: -6, max: 26 });
        assert_eq!(lags.len(), 33);
        assert_eq!(LagWindow::new(3, -1), LagWindow { min: -1, max: 3 });
    }

    #[test]
    fn test_lagged_design_shifts_with_zero_padding() {
        let signal = SampleMatrix::from_channels(vec![vec![1.0, 2.0, 3.0], vec![10.0, 20.0, 30.0]]).unwrap();
        let x = lagged_design(&signal, LagWindow::new(-1, 1));
        assert_eq!(x.shape(), (3, 6));
        let column = |j: usize| x.column(j).iter().copied().collect::<Vec<_>>();
        // lag -1, band 0: s(t + 1)
        assert_eq!(column(0), vec![2.0, 3.0, 0.0]);
        // lag 0, band 1
        assert_eq!(column(3), vec![10.0, 20.0, 30.0]);
        // lag +1, band 0: s(t - 1)
        assert_eq!(column(4), vec![0.0, 1.0, 2.0]);
    }
}
