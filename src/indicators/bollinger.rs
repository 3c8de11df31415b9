// =============================================================================
// Bollinger Bands
// =============================================================================
//
// Middle band = SMA(period), upper/lower = middle ± k * σ where σ is the
// population standard deviation over the same window. For every finite
// position the invariant `lower <= mid <= upper` holds (k >= 0).
// =============================================================================

use crate::indicators::sma;

/// Full-length Bollinger band series.
#[derive(Debug, Clone)]
pub struct BollingerBands {
    pub upper: Vec<f64>,
    pub mid: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Calculate Bollinger Bands over `closes`.
///
/// All three series share the input length; the warm-up prefix (first
/// `period - 1` positions) is NaN in each.
pub fn bollinger(closes: &[f64], period: usize, num_std: f64) -> BollingerBands {
    let mid = sma(closes, period);
    let mut upper = vec![f64::NAN; closes.len()];
    let mut lower = vec![f64::NAN; closes.len()];

    if period > 0 && closes.len() >= period {
        for i in (period - 1)..closes.len() {
            let m = mid[i];
            if m.is_nan() {
                continue;
            }
            let window = &closes[i + 1 - period..=i];
            let variance =
                window.iter().map(|x| (x - m).powi(2)).sum::<f64>() / period as f64;
            let sd = variance.sqrt();
            upper[i] = m + num_std * sd;
            lower[i] = m - num_std * sd;
        }
    }

    BollingerBands { upper, mid, lower }
}
