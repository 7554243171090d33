//! # Interval IBS Probabilities
//!
//! Estimates, for a start marker and an end marker, the probability that a
//! random haplotype pair is IBS at every marker in `[start, end - 1]` and
//! discordant at `end`. Short intervals are answered from the local
//! [`IbsCounts`] table; wider intervals fall back to the global empirical
//! CDF of one-sided IBS lengths. The forward and reverse instances of one
//! chromosome share a single global distribution.

use std::sync::Arc;

use rayon::prelude::*;

use crate::model::global_ibs_probs::GlobalIbsProbs;
use crate::model::ibs_counts::IbsCounts;

/// One-sided IBS interval probabilities for one marker orientation
#[derive(Debug)]
pub struct IbsLengthProbs {
    gip: Arc<GlobalIbsProbs>,
    probs: Vec<Vec<f32>>,
    morgans: Vec<f64>,
}

impl IbsLengthProbs {
    /// Build per-interval probabilities from the local counts table.
    ///
    /// # Panics
    /// Panics if `morgans.len() != ibs_counts.n_markers()`.
    pub fn new(morgans: Vec<f64>, ibs_counts: &IbsCounts, gip: Arc<GlobalIbsProbs>) -> Self {
        assert_eq!(
            morgans.len(),
            ibs_counts.n_markers(),
            "inconsistent number of markers"
        );
        let n = ibs_counts.n_haps() as f64;
        let inv_pairs_p1 = 1.0 / (n * (n - 1.0) + 1.0);
        let probs = (0..ibs_counts.n_markers())
            .into_par_iter()
            .map(|start| row_probs(ibs_counts, start, inv_pairs_p1))
            .collect();
        Self { gip, probs, morgans }
    }

    /// Number of markers
    pub fn n_markers(&self) -> usize {
        self.morgans.len()
    }

    /// The estimated proportion of haplotype pairs that have discordant
    /// alleles at marker `end` and are IBS on `[start, end - 1]`.
    ///
    /// `end == n_markers` addresses the hypothetical discordant marker past
    /// the chromosome end; `(n_markers, n_markers)` is defined as 1 because
    /// every pair is discordant there.
    pub fn ibs_prob(&self, start: usize, end: usize) -> f64 {
        if start == self.probs.len() && end == self.probs.len() {
            return 1.0;
        }
        let index = end - start;
        if index < self.probs[start].len() {
            debug_assert!(self.probs[start][index] > 0.0);
            self.probs[start][index] as f64
        } else if end == self.morgans.len() {
            let length = self.morgans[end - 1] - self.morgans[start];
            1.0 - self.gip.cdf(length)
        } else {
            let x0 = self.morgans[start];
            let x1 = self.morgans[end - 1];
            let x2 = self.morgans[end];
            let p1 = self.gip.cdf(x1 - x0);
            let p2 = self.gip.cdf(x2 - x0);
            if p1 == p2 {
                0.5 / self.gip.n_lengths() as f64
            } else {
                p2 - p1
            }
        }
    }
}

fn row_probs(ibs_counts: &IbsCounts, start: usize, inv_pairs_p1: f64) -> Vec<f32> {
    let n = ibs_counts.n_haps() as u64;
    let mut probs = Vec::new();
    let mut last_ibs_pairs = n * (n - 1);
    let end = ibs_counts.end(start);
    for m in start..end {
        let ibs_pairs = ibs_counts.counts(start, m) as u64;
        probs.push(((last_ibs_pairs - ibs_pairs + 1) as f64 * inv_pairs_p1) as f32);
        last_ibs_pairs = ibs_pairs;
    }
    if end == ibs_counts.n_markers() {
        // probability of IBS continuing to the end of the chromosome
        probs.push(((last_ibs_pairs + 1) as f64 * inv_pairs_p1) as f32);
    }
    probs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::data::storage::block::testing::block_from_rows;
    use crate::model::global_ibs_probs::GlobalIbsProbs;

    fn build(rows: &[Vec<u16>]) -> IbsLengthProbs {
        let positions: Vec<i32> = (0..rows.len() as i32).map(|j| 1000 * (j + 1)).collect();
        let morgans: Vec<f64> = (0..rows.len()).map(|j| 1e-3 * j as f64).collect();
        let block = block_from_rows(rows, &positions);
        let mut config = Config::test_default();
        config.global_loci = 10;
        config.global_segments = 50;
        let gip = Arc::new(GlobalIbsProbs::new(&config, &block, &morgans));
        let counts = IbsCounts::new(&config, &block);
        IbsLengthProbs::new(morgans, &counts, gip)
    }

    #[test]
    fn test_hypothetical_terminal_discordance() {
        let rows = vec![vec![0, 0, 1, 1], vec![0, 1, 1, 0]];
        let probs = build(&rows);
        assert_eq!(probs.ibs_prob(2, 2), 1.0);
    }

    #[test]
    fn test_local_probabilities_structure() {
        // Marker 1 splits {0,1} from {2,3}: of the 12 ordered pairs IBS on
        // the empty prefix, 8 become discordant at marker 1.
        let rows = vec![vec![0, 0, 0, 0], vec![0, 0, 1, 1], vec![0, 0, 0, 0]];
        let probs = build(&rows);
        let inv = 1.0 / 13.0;
        // discordant at marker 0 given the empty interval: (12 - 12 + 1)/13
        assert!((probs.ibs_prob(0, 0) - inv).abs() < 1e-6);
        // IBS at marker 0, discordant at marker 1: (12 - 4 + 1)/13
        assert!((probs.ibs_prob(0, 1) - 9.0 * inv).abs() < 1e-6);
        // IBS at markers 0-1, discordant at marker 2: (4 - 4 + 1)/13
        assert!((probs.ibs_prob(0, 2) - inv).abs() < 1e-6);
        // IBS to the chromosome end: (4 + 1)/13
        assert!((probs.ibs_prob(0, 3) - 5.0 * inv).abs() < 1e-6);
    }

    #[test]
    fn test_probabilities_are_positive() {
        let rows: Vec<Vec<u16>> = (0..8)
            .map(|m| (0..6).map(|h| ((h + m) % 2) as u16).collect())
            .collect();
        let probs = build(&rows);
        for start in 0..8 {
            for end in start..=8 {
                let p = probs.ibs_prob(start, end);
                assert!(p > 0.0, "ibs_prob({start},{end}) = {p}");
            }
        }
    }
}
