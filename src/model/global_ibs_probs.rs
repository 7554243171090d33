//! # Global One-Sided IBS Length Distribution
//!
//! Samples one-sided IBS lengths at random loci across the chromosome: the
//! Morgan distance from a random focal position to the first discordance of
//! a random haplotype pair (or to the nearest chromosome end when the pair
//! is IBS throughout). Loci with unusually long order statistics are
//! discarded before the surviving samples are pooled into an empirical CDF.

use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::config::Config;
use crate::data::storage::PhasedBlock;

/// Pooled empirical distribution of sampled one-sided IBS lengths
#[derive(Debug)]
pub struct GlobalIbsProbs {
    lengths: Vec<f64>,
    reciprocal_size: f64,
}

impl GlobalIbsProbs {
    /// Sample the global one-sided IBS length distribution.
    ///
    /// # Panics
    /// Panics if `block.n_haps() < 2` or if `morgan_pos` does not cover
    /// every marker.
    pub fn new(config: &Config, block: &PhasedBlock, morgan_pos: &[f64]) -> Self {
        assert_eq!(block.n_markers(), morgan_pos.len(), "inconsistent data");
        assert!(block.n_haps() >= 2, "at least 2 haplotypes required");
        let samples_per_locus = config.global_segments;
        let per_locus: Vec<Vec<f64>> = (0..config.global_loci)
            .into_par_iter()
            .map(|i| {
                sample_ibs_lengths(
                    block,
                    morgan_pos,
                    samples_per_locus,
                    config.seed.wrapping_add(i as i64),
                )
            })
            .collect();

        let index = (config.global_quantile as f64 * samples_per_locus as f64).floor() as usize;
        let index = index.min(samples_per_locus - 1);
        let max_value = max_value(&per_locus, index, config.global_multiple as f64);
        let mut lengths: Vec<f64> = per_locus
            .into_iter()
            .filter(|da| da[index] <= max_value)
            .flatten()
            .collect();
        lengths.sort_unstable_by(f64::total_cmp);
        let reciprocal_size = 1.0 / lengths.len() as f64;
        Self {
            lengths,
            reciprocal_size,
        }
    }

    /// Number of retained sampled lengths
    pub fn n_lengths(&self) -> usize {
        self.lengths.len()
    }

    /// The proportion of retained sampled lengths that are at most
    /// `morgans`, clamped away from 0 and 1.
    pub fn cdf(&self, morgans: f64) -> f64 {
        assert!(!morgans.is_nan());
        let index = self
            .lengths
            .partition_point(|&v| v <= morgans)
            .clamp(1, self.lengths.len() - 1);
        index as f64 * self.reciprocal_size
    }
}

/// Sampled one-sided IBS lengths for one locus, sorted ascending
fn sample_ibs_lengths(
    block: &PhasedBlock,
    morgan_pos: &[f64],
    samples_per_locus: usize,
    seed: i64,
) -> Vec<f64> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed as u64);
    let pos = random_gen_pos(&mut rng, morgan_pos);
    let mid_pos = 0.5 * (morgan_pos[0] + morgan_pos[morgan_pos.len() - 1]);
    let n_haps = block.n_haps();
    let mut lengths: Vec<f64> = (0..samples_per_locus)
        .map(|_| {
            let h1 = rng.gen_range(0..n_haps);
            let mut h2 = rng.gen_range(0..n_haps);
            while h1 == h2 {
                h2 = rng.gen_range(0..n_haps);
            }
            if pos <= mid_pos {
                fwd_length(block, morgan_pos, pos, h1, h2)
            } else {
                bwd_length(block, morgan_pos, pos, h1, h2)
            }
        })
        .collect();
    lengths.sort_unstable_by(f64::total_cmp);
    lengths
}

fn random_gen_pos(rng: &mut impl Rng, morgan_pos: &[f64]) -> f64 {
    let start = morgan_pos[0];
    let end = morgan_pos[morgan_pos.len() - 1];
    let mut pos = start + rng.gen::<f64>() * (end - start);
    if pos >= end {
        pos = end.next_down();
    }
    pos
}

/// Distance from `pos` to the first discordance at or after it, or to the
/// last marker when the pair is IBS to the chromosome end.
fn fwd_length(block: &PhasedBlock, morgan_pos: &[f64], pos: f64, h1: usize, h2: usize) -> f64 {
    let n_markers_m1 = block.n_markers() - 1;
    let mut m = morgan_pos.partition_point(|&v| v < pos);
    while m < n_markers_m1 && block.allele(m, h1) == block.allele(m, h2) {
        m += 1;
    }
    morgan_pos[m] - pos
}

/// Distance from `pos` back to the first discordance at or before it, or to
/// the first marker when the pair is IBS to the chromosome start.
fn bwd_length(block: &PhasedBlock, morgan_pos: &[f64], pos: f64, h1: usize, h2: usize) -> f64 {
    let mut m = morgan_pos.partition_point(|&v| v <= pos).saturating_sub(1);
    debug_assert!(morgan_pos[m] <= pos);
    while m > 0 && block.allele(m, h1) == block.allele(m, h2) {
        m -= 1;
    }
    pos - morgan_pos[m]
}

/// Retention threshold: `max_multiple` times the median per-locus order
/// statistic at `index`.
fn max_value(per_locus: &[Vec<f64>], index: usize, max_multiple: f64) -> f64 {
    let mut quantiles: Vec<f64> = per_locus.iter().map(|da| da[index]).collect();
    quantiles.sort_unstable_by(f64::total_cmp);
    let n = quantiles.len();
    let median = 0.5 * (quantiles[(n - 1) >> 1] + quantiles[n >> 1]);
    max_multiple * median
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::data::storage::block::testing::block_from_rows;

    fn checkerboard_block(n_markers: usize, n_haps: usize) -> (PhasedBlock, Vec<f64>) {
        // Haplotypes alternate between two sequences so discordances are
        // frequent and one-sided lengths are short.
        let rows: Vec<Vec<u16>> = (0..n_markers)
            .map(|m| (0..n_haps).map(|h| ((h + m) % 2) as u16).collect())
            .collect();
        let positions: Vec<i32> = (0..n_markers as i32).map(|j| 1000 * (j + 1)).collect();
        let morgans: Vec<f64> = (0..n_markers).map(|j| 1e-4 * j as f64).collect();
        (block_from_rows(&rows, &positions), morgans)
    }

    fn small_config() -> Config {
        let mut config = Config::test_default();
        config.global_loci = 10;
        config.global_segments = 50;
        config
    }

    #[test]
    fn test_cdf_is_monotone_and_bounded() {
        let (block, morgans) = checkerboard_block(50, 8);
        let gip = GlobalIbsProbs::new(&small_config(), &block, &morgans);
        assert!(gip.n_lengths() > 0);
        let mut last = 0.0;
        for x in [0.0, 1e-5, 1e-4, 1e-3, 1e-2, 1.0] {
            let p = gip.cdf(x);
            assert!(p > 0.0 && p < 1.0, "cdf({x}) = {p} out of bounds");
            assert!(p >= last, "cdf not monotone at {x}");
            last = p;
        }
    }

    #[test]
    fn test_deterministic_for_fixed_seed() {
        let (block, morgans) = checkerboard_block(50, 8);
        let a = GlobalIbsProbs::new(&small_config(), &block, &morgans);
        let b = GlobalIbsProbs::new(&small_config(), &block, &morgans);
        assert_eq!(a.n_lengths(), b.n_lengths());
        for x in [1e-5, 1e-3, 0.5] {
            assert_eq!(a.cdf(x), b.cdf(x));
        }
    }

    #[test]
    fn test_identical_haplotypes_reach_chromosome_ends() {
        // All haplotypes identical: every sampled length runs to an end
        let rows: Vec<Vec<u16>> = (0..20).map(|_| vec![0u16; 6]).collect();
        let positions: Vec<i32> = (0..20).map(|j| 1000 * (j + 1)).collect();
        let morgans: Vec<f64> = (0..20).map(|j| 1e-3 * j as f64).collect();
        let block = block_from_rows(&rows, &positions);
        let gip = GlobalIbsProbs::new(&small_config(), &block, &morgans);
        // CDF stays below 1 even past the chromosome length
        assert!(gip.cdf(1.0) < 1.0);
        assert!(gip.cdf(0.0) > 0.0);
    }
}
