//! Percentile convention (spec 9's Open Question): this implementation
//! commits to **nearest-rank** on a sorted copy of the samples, per the
//! S6 seed scenario's `p50=5` branch. The choice is frozen here so every
//! caller (OTEL span durations, system metric values) gets identical
//! behavior; see DESIGN.md for the rationale.

/// Nearest-rank percentile: sorts a copy of `values`, then picks the
/// value at rank `ceil(p/100 * n)` (1-indexed, clamped to `[1, n]`).
/// Returns `0.0` for an empty input.
pub fn nearest_rank(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = sorted.len();
    let rank = ((p / 100.0) * n as f64).ceil() as usize;
    let idx = rank.clamp(1, n) - 1;
    sorted[idx]
}

pub fn p50(values: &[f64]) -> f64 {
    nearest_rank(values, 50.0)
}

pub fn p95(values: &[f64]) -> f64 {
    nearest_rank(values, 95.0)
}

pub fn p99(values: &[f64]) -> f64 {
    nearest_rank(values, 99.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_scenario_s6_ten_samples() {
        let values: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        assert_eq!(p50(&values), 5.0);
        assert_eq!(p95(&values), 10.0);
        assert_eq!(p99(&values), 10.0);
    }

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(nearest_rank(&[], 50.0), 0.0);
    }

    #[test]
    fn single_value_is_itself_at_any_percentile() {
        assert_eq!(nearest_rank(&[7.0], 1.0), 7.0);
        assert_eq!(nearest_rank(&[7.0], 99.0), 7.0);
    }
}
