//! Nearest-rank percentiles over enqueue size samples.
//!
//! The rank index is `len * p / 100` rounded half-to-even and clamped to the
//! sample range, so `p = 0` is the minimum and `p = 100` the maximum.

/// Sample sets smaller than this are marked in reports
pub const SMALL_SAMPLE_COUNT: usize = 100;

/// Value at percentile `p` of an ascending sample set; `None` when there are no samples
pub fn percentile_value(sorted: &[u64], p: f64) -> Option<u64> {
    if sorted.is_empty() {
        return None;
    }
    let last = sorted.len() - 1;
    let rank = (sorted.len() as f64 * p / 100.0).round_ties_even();
    let index = if rank <= 0.0 {
        0
    } else {
        (rank as usize).min(last)
    };
    Some(sorted[index])
}

/// One value per requested percentile, in the order given
pub fn percentile_values(sorted: &[u64], percentiles: &[f64]) -> Vec<u64> {
    percentiles
        .iter()
        .filter_map(|p| percentile_value(sorted, *p))
        .collect()
}

/// Clamp into [0, 100], drop NaN and duplicates, sort ascending
pub fn normalize_percentiles(requested: &[f64]) -> Vec<f64> {
    let mut percentiles: Vec<f64> = requested
        .iter()
        .filter(|p| !p.is_nan())
        .map(|p| p.clamp(0.0, 100.0))
        .collect();
    percentiles.sort_by(|a, b| a.total_cmp(b));
    percentiles.dedup();
    percentiles
}

/// Column label: `min`, `max`, or `p<N>`
pub fn percentile_label(p: f64) -> String {
    if p <= 0.0 {
        "min".to_string()
    } else if p >= 100.0 {
        "max".to_string()
    } else {
        format!("p{}", p)
    }
}

pub fn is_small_sample(count: usize) -> bool {
    count < SMALL_SAMPLE_COUNT
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;

    #[test]
    fn min_median_max_of_five() {
        let samples = [1, 2, 3, 4, 5];
        assert_eq!(percentile_values(&samples, &[0.0, 50.0, 100.0]), vec![1, 3, 5]);
    }

    #[test]
    fn half_ranks_round_to_even() {
        // 5 * 50 / 100 = 2.5 -> index 2
        assert_eq!(percentile_value(&[10, 20, 30, 40, 50], 50.0), Some(30));
        // 5 * 70 / 100 = 3.5 -> index 4
        assert_eq!(percentile_value(&[10, 20, 30, 40, 50], 70.0), Some(50));
        // 10 * 25 / 100 = 2.5 -> index 2
        let ten: Vec<u64> = (1..=10).collect();
        assert_eq!(percentile_value(&ten, 25.0), Some(3));
        // 10 * 35 / 100 = 3.5 -> index 4
        assert_eq!(percentile_value(&ten, 35.0), Some(5));
    }

    #[test]
    fn bounds_are_min_and_max() {
        let samples: Vec<u64> = vec![3, 8, 8, 13, 21, 400];
        assert_eq!(percentile_value(&samples, 0.0), Some(3));
        assert_eq!(percentile_value(&samples, 100.0), Some(400));
        assert_eq!(percentile_value(&samples, 99.9), Some(400));
    }

    #[test]
    fn single_sample_answers_every_percentile() {
        assert_eq!(percentile_values(&[42], &[0.0, 50.0, 99.0, 100.0]), vec![42, 42, 42, 42]);
    }

    #[test]
    fn empty_samples_have_no_value() {
        assert_eq!(percentile_value(&[], 50.0), None);
    }

    #[test]
    fn shuffling_before_sorting_changes_nothing() {
        let mut samples: Vec<u64> = (0..257).map(|i| (i * 37) % 101).collect();
        let mut sorted = samples.clone();
        sorted.sort_unstable();
        let percentiles = [0.0, 10.0, 50.0, 90.0, 99.0, 99.9, 100.0];
        let expected = percentile_values(&sorted, &percentiles);

        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            samples.shuffle(&mut rng);
            let mut resorted = samples.clone();
            resorted.sort_unstable();
            assert_eq!(percentile_values(&resorted, &percentiles), expected);
        }
    }

    #[test]
    fn normalization_clamps_dedups_and_sorts() {
        assert_eq!(
            normalize_percentiles(&[99.0, 50.0, 150.0, -5.0, 50.0, f64::NAN, 100.0]),
            vec![0.0, 50.0, 99.0, 100.0]
        );
    }

    #[test]
    fn labels() {
        assert_eq!(percentile_label(0.0), "min");
        assert_eq!(percentile_label(100.0), "max");
        assert_eq!(percentile_label(50.0), "p50");
        assert_eq!(percentile_label(99.9), "p99.9");
    }

    #[test]
    fn small_sample_threshold() {
        assert!(is_small_sample(99));
        assert!(!is_small_sample(100));
    }
}
