//! # Local IBS Pair Counts
//!
//! For a random subset of haplotypes, counts the ordered pairs that are
//! identical by state on every marker interval starting at each marker.
//! Each row of the table walks forward from its start marker, maintaining
//! the partition of sampled haplotypes into distinct allele sequences, and
//! is truncated once the surviving pair count drops below the informative
//! threshold derived from `local_max_cdf`.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::config::Config;
use crate::data::storage::PhasedBlock;

/// Ordered-pair IBS counts over a sampled haplotype subset
#[derive(Debug)]
pub struct IbsCounts {
    n_haps: usize,
    counts: Vec<Vec<u32>>,
}

impl IbsCounts {
    /// Build the counts table from phased genotype data.
    ///
    /// # Panics
    /// Panics if `block.n_haps() < 2`.
    pub fn new(config: &Config, block: &PhasedBlock) -> Self {
        assert!(block.n_haps() >= 2, "at least 2 haplotypes required");
        let hap_list = hap_list(config, block.n_haps());
        let n = hap_list.len();
        debug_assert!((n as u64) * (n as u64 - 1) < i32::MAX as u64);

        let n_markers = block.n_markers();
        let sample_alleles: Vec<Vec<u16>> = (0..n_markers)
            .into_par_iter()
            .map(|m| hap_list.iter().map(|&h| block.allele(m, h)).collect())
            .collect();
        let is_monomorphic: Vec<bool> = sample_alleles
            .par_iter()
            .map(|alleles| alleles.windows(2).all(|w| w[0] == w[1]))
            .collect();
        let max_n_alleles = block.markers().max_n_alleles() as usize;

        let max_cdf = config.local_max_cdf as f64;
        let min_ibs_pairs = (((1.0 - max_cdf) * n as f64) * (n as f64 - 1.0)).ceil() as u32;
        let counts = (0..n_markers)
            .into_par_iter()
            .map(|start| {
                row_counts(
                    block,
                    max_n_alleles,
                    start,
                    &sample_alleles,
                    &is_monomorphic,
                    min_ibs_pairs,
                )
            })
            .collect();
        Self { n_haps: n, counts }
    }

    /// Number of markers
    pub fn n_markers(&self) -> usize {
        self.counts.len()
    }

    /// Number of sampled haplotypes
    pub fn n_haps(&self) -> usize {
        self.n_haps
    }

    /// Number of ordered sampled-haplotype pairs that are IBS on the marker
    /// interval `[start, incl_end]`.
    pub fn counts(&self, start: usize, incl_end: usize) -> u32 {
        self.counts[start][incl_end - start]
    }

    /// Exclusive end index for the `incl_end` parameter of [`Self::counts`]
    pub fn end(&self, start: usize) -> usize {
        start + self.counts[start].len()
    }

    /// The counts table obtained by reversing the marker order.
    ///
    /// Row `rev_start` of the result reads the forward table along a fixed
    /// inclusive end marker, which is faster than re-running on reversed
    /// data and produces identical values.
    pub fn reverse(&self) -> Self {
        let n_markers = self.n_markers();
        let counts = (0..n_markers)
            .into_par_iter()
            .map(|rev_start| {
                let incl_end = n_markers - 1 - rev_start;
                let mut rev_row = Vec::new();
                let mut start = incl_end as isize;
                while start >= 0 && incl_end < self.end(start as usize) {
                    rev_row.push(self.counts(start as usize, incl_end));
                    start -= 1;
                }
                rev_row
            })
            .collect();
        Self {
            n_haps: self.n_haps,
            counts,
        }
    }
}

/// Sampled haplotype indices: a seeded partial shuffle of all haplotypes,
/// truncated to `local_segments` and sorted.
fn hap_list(config: &Config, n_haps: usize) -> Vec<usize> {
    let max_local_haps = config.local_segments;
    let mut all_haps: Vec<usize> = (0..n_haps).collect();
    if n_haps <= max_local_haps {
        all_haps
    } else {
        let mut rng = rand::rngs::StdRng::seed_from_u64(config.seed as u64);
        all_haps.partial_shuffle(&mut rng, max_local_haps);
        all_haps.truncate(max_local_haps);
        all_haps.sort_unstable();
        all_haps
    }
}

fn row_counts(
    block: &PhasedBlock,
    max_n_alleles: usize,
    start: usize,
    sample_alleles: &[Vec<u16>],
    is_monomorphic: &[bool],
    min_ibs_pairs: u32,
) -> Vec<u32> {
    let n_markers = sample_alleles.len();
    let n_haps = sample_alleles[start].len();
    let mut cnts = Vec::new();
    let mut hap2_seq = vec![0usize; n_haps];
    let mut seq_cnt = vec![0u32; n_haps];
    let mut seq_al_map = vec![-1i32; max_n_alleles * n_haps];
    seq_cnt[0] = n_haps as u32;
    let mut n_seq = 1usize;
    let mut ibs_pairs = (n_haps * (n_haps - 1)) as u32;
    let mut m = start;
    while m < n_markers && ibs_pairs >= min_ibs_pairs {
        if is_monomorphic[m] {
            cnts.push(ibs_pairs);
        } else {
            let n_alleles = block.n_alleles(m) as usize;
            seq_al_map[..n_alleles * n_seq].fill(-1);
            seq_cnt[..n_seq].fill(0);
            n_seq = 0;
            for j in 0..n_haps {
                let seq_al_index = hap2_seq[j] * n_alleles + sample_alleles[m][j] as usize;
                let mut seq_index = seq_al_map[seq_al_index];
                if seq_index < 0 {
                    seq_index = n_seq as i32;
                    n_seq += 1;
                    seq_al_map[seq_al_index] = seq_index;
                }
                hap2_seq[j] = seq_index as usize;
                seq_cnt[seq_index as usize] += 1;
            }
            ibs_pairs = seq_cnt[..n_seq].iter().map(|&c| c * (c - 1)).sum();
            if ibs_pairs >= min_ibs_pairs {
                cnts.push(ibs_pairs);
            }
        }
        m += 1;
    }
    cnts
}
