// =============================================================================
// Hull Moving Average (HMA)
// =============================================================================
//
// The HMA reduces lag while keeping smoothness:
//
//   HMA(n) = WMA( 2 * WMA(n/2) - WMA(n), sqrt(n) )
//
// where WMA is the linearly weighted moving average (most recent bar carries
// the largest weight). Integer window sizes use n/2 rounded down and sqrt(n)
// rounded to nearest.
// =============================================================================

/// Linearly weighted moving average. Full-length output, NaN prefix.
///
/// Weight of the bar `j` positions back in the window is `period - j`, so the
/// newest bar weighs `period` and the oldest weighs 1. A NaN anywhere inside
/// the window yields NaN for that position.
pub fn wma(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }

    let denom = (period * (period + 1)) as f64 / 2.0;
    for i in (period - 1)..values.len() {
        let window = &values[i + 1 - period..=i];
        let mut acc = 0.0;
        for (j, &v) in window.iter().enumerate() {
            acc += v * (j + 1) as f64;
        }
        out[i] = acc / denom;
    }
    out
}

/// Compute the Hull moving average series.
///
/// NaN positions from the inner WMAs propagate through, so the warm-up
/// prefix is `period - 1 + sqrt(period) - 1` positions long.
pub fn hma(values: &[f64], period: usize) -> Vec<f64> {
    if period < 2 || values.len() < period {
        return vec![f64::NAN; values.len()];
    }

    let half = period / 2;
    let sqrt_n = (period as f64).sqrt().round().max(1.0) as usize;

    let wma_half = wma(values, half.max(1));
    let wma_full = wma(values, period);

    let raw: Vec<f64> = wma_half
        .iter()
        .zip(wma_full.iter())
        .map(|(h, f)| 2.0 * h - f)
        .collect();

    wma(&raw, sqrt_n)
}
