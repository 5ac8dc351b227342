//! Rank-based quantile scoring and percentile ranks

/// Which end of a metric is the good end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreDirection {
    /// Larger raw values receive higher scores (frequency, monetary)
    HigherIsBetter,
    /// Smaller raw values receive higher scores (recency)
    LowerIsBetter,
}

/// Ordinal ranks 1..=n, ties resolved by position (earlier rows rank first)
pub fn ordinal_ranks(values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    // sort_by is stable, so equal values keep their input order
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0; values.len()];
    for (position, &index) in order.iter().enumerate() {
        ranks[index] = position + 1;
    }
    ranks
}

/// Equal-population bin (1..=tiers) for rank `rank` out of `n`
///
/// Bin edges sit at the evenly spaced quantiles of the ranks 1..=n and each
/// bin is closed on the right, the lowest bin also including its left edge.
/// The comparison `rank - 1 <= (n - 1) * i / tiers` is done in integers so
/// edge ranks never depend on float rounding.
pub fn rank_bin(rank: usize, n: usize, tiers: u8) -> u8 {
    let tiers_usize = usize::from(tiers.max(1));
    if n <= 1 {
        return 1;
    }
    let scaled_rank = tiers_usize * (rank.saturating_sub(1));
    (1..=tiers_usize)
        .find(|&bin| scaled_rank <= (n - 1) * bin)
        .unwrap_or(tiers_usize) as u8
}

/// Score each value into `tiers` ordinal tiers by rank
///
/// Binning is by rank, not by value range, so a column of identical values
/// still spreads over all tiers and never fails.
pub fn quantile_scores(values: &[f64], tiers: u8, direction: ScoreDirection) -> Vec<u8> {
    let n = values.len();
    if n > 0 && n < usize::from(tiers) {
        log::warn!("scoring {n} values into {tiers} tiers: some tiers will stay empty");
    }

    ordinal_ranks(values)
        .into_iter()
        .map(|rank| {
            let bin = rank_bin(rank, n, tiers);
            match direction {
                ScoreDirection::HigherIsBetter => bin,
                ScoreDirection::LowerIsBetter => tiers + 1 - bin,
            }
        })
        .collect()
}

/// Percentile position of every value in [0, 1]
///
/// Ties share their average rank; the smallest value maps to 0.0 and the
/// largest to 1.0. A single value sits at 0.5.
pub fn percentile_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![0.5];
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut percentiles = vec![0.0; n];
    let mut start = 0;
    while start < n {
        let mut end = start + 1;
        while end < n && values[order[end]].total_cmp(&values[order[start]]).is_eq() {
            end += 1;
        }
        // zero-based positions start..end share their mean position
        let average_position = (start + end - 1) as f64 / 2.0;
        for &index in &order[start..end] {
            percentiles[index] = average_position / (n - 1) as f64;
        }
        start = end;
    }
    percentiles
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket_sizes(scores: &[u8]) -> Vec<usize> {
        (1..=5)
            .map(|tier| scores.iter().filter(|&&s| s == tier).count())
            .collect()
    }

    #[test]
    fn test_five_distinct_values_map_one_per_tier() {
        let scores = quantile_scores(&[10.0, 30.0, 20.0, 50.0, 40.0], 5, ScoreDirection::HigherIsBetter);
        assert_eq!(scores, vec![1, 3, 2, 5, 4]);
    }

    #[test]
    fn test_near_equal_bucket_sizes() {
        for n in 5..60 {
            let values: Vec<f64> = (0..n).map(|i| ((i * 37) % 101) as f64).collect();
            let scores = quantile_scores(&values, 5, ScoreDirection::HigherIsBetter);
            let sizes = bucket_sizes(&scores);
            let max = *sizes.iter().max().unwrap();
            let min = *sizes.iter().min().unwrap();
            assert!(max - min <= 1, "n={n} sizes={sizes:?}");
        }
    }

    #[test]
    fn test_identical_values_still_fill_every_tier() {
        let values = vec![7.0; 10];
        let scores = quantile_scores(&values, 5, ScoreDirection::HigherIsBetter);
        assert_eq!(bucket_sizes(&scores), vec![2, 2, 2, 2, 2]);
        // first seen wins the lower rank
        assert_eq!(scores[0], 1);
        assert_eq!(scores[9], 5);
    }

    #[test]
    fn test_lower_is_better_is_monotonic() {
        let recency = vec![3.0, 120.0, 45.0, 45.0, 9.0, 300.0, 1.0, 60.0, 15.0, 200.0, 30.0];
        let scores = quantile_scores(&recency, 5, ScoreDirection::LowerIsBetter);
        for a in 0..recency.len() {
            for b in 0..recency.len() {
                if recency[a] < recency[b] {
                    assert!(scores[a] >= scores[b], "{a} vs {b}: {scores:?}");
                }
            }
        }
        assert_eq!(scores[6], 5);
        assert_eq!(scores[5], 1);
    }

    #[test]
    fn test_small_population_does_not_fail() {
        assert_eq!(quantile_scores(&[4.0], 5, ScoreDirection::HigherIsBetter), vec![1]);
        assert_eq!(quantile_scores(&[4.0], 5, ScoreDirection::LowerIsBetter), vec![5]);
        assert_eq!(
            quantile_scores(&[1.0, 2.0], 5, ScoreDirection::HigherIsBetter),
            vec![1, 5]
        );
        assert!(quantile_scores(&[], 5, ScoreDirection::HigherIsBetter).is_empty());
    }

    #[test]
    fn test_rank_bin_matches_quantile_edges() {
        // 7 ranks: edges at 1, 2.2, 3.4, 4.6, 5.8, 7
        let bins: Vec<u8> = (1..=7).map(|rank| rank_bin(rank, 7, 5)).collect();
        assert_eq!(bins, vec![1, 1, 2, 3, 4, 5, 5]);
    }

    #[test]
    fn test_percentile_ranks_with_ties() {
        let percentiles = percentile_ranks(&[0.0, 10.0, 10.0, 40.0, 5.0]);
        assert_eq!(percentiles[0], 0.0);
        assert_eq!(percentiles[4], 0.25);
        assert_eq!(percentiles[1], 0.625);
        assert_eq!(percentiles[2], 0.625);
        assert_eq!(percentiles[3], 1.0);
        assert_eq!(percentile_ranks(&[3.0]), vec![0.5]);
    }
}
