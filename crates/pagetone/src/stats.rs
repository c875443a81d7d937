//! Order statistics

use num_traits::float::{Float, TotalOrder};

/// Median of `values`
///
/// Even-length inputs average the two middle values. Returns
/// `None` for an empty input.
pub(crate) fn median<T>(values: &[T]) -> Option<T>
where
    T: Float + TotalOrder,
{
    let sorted = sorted(values);
    let n = sorted.len();
    match n {
        0 => None,
        _ if n % 2 == 1 => Some(sorted[n / 2]),
        _ => Some((sorted[n / 2 - 1] + sorted[n / 2]) / (T::one() + T::one())),
    }
}

/// Nearest-rank percentile of `values`
///
/// `pct` is clamped to `[0, 100]`. Returns `None` for an
/// empty input.
pub(crate) fn percentile<T>(values: &[T], pct: f32) -> Option<T>
where
    T: Float + TotalOrder,
{
    let sorted = sorted(values);
    if sorted.is_empty() {
        return None;
    }

    let pct = f32::clamp(pct, 0.0, 100.0) as f64;
    let rank = (pct * sorted.len() as f64 / 100.0).ceil() as usize;
    Some(sorted[usize::clamp(rank, 1, sorted.len()) - 1])
}

// copy and sort in IEEE 754 total order
fn sorted<T>(values: &[T]) -> Vec<T>
where
    T: Float + TotalOrder,
{
    let mut out = values.to_vec();
    out.sort_by(T::total_cmp);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median() {
        assert_eq!(median::<f32>(&[]), None);
        assert_eq!(median(&[3.0f32]), Some(3.0));
        assert_eq!(median(&[5.0f32, 1.0, 3.0]), Some(3.0));
        assert_eq!(median(&[4.0f64, 1.0, 3.0, 2.0]), Some(2.5));
    }

    #[test]
    fn test_percentile() {
        const DATA: &[f32] = &[1000.0, 1001.0, 999.0, 1030.0, 1000.0, 1000.5, 999.5, 1000.0, 1001.0, 999.0];
        assert_eq!(percentile::<f32>(&[], 50.0), None);
        assert_eq!(percentile(DATA, 0.0), Some(999.0));
        assert_eq!(percentile(DATA, 100.0), Some(1030.0));

        // a single outlier does not reach the 90th percentile
        assert_eq!(percentile(DATA, 90.0), Some(1001.0));
        assert_eq!(percentile(DATA, 10.0), Some(999.0));
    }
}
