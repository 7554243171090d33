//! # PBWT IBS Segment Discovery
//!
//! Enumerates long identical-by-state segments between haplotype pairs with
//! interleaved PBWT scans. Analysis `a` of `pbwt` scans markers
//! `a, a + pbwt, a + 2*pbwt, ...`; interleaving recovers segments a single
//! scan misses when a discordance interrupts an otherwise long match. The
//! per-scan output is pooled, sorted by haplotype pair, and overlapping or
//! adjacent segments of the same pair are coalesced.

use rayon::prelude::*;

use crate::config::Config;
use crate::data::storage::PhasedBlock;
use crate::data::HapIdx;
use crate::model::pbwt::PbwtDivUpdater;
use crate::model::segment::HapPairSegment;

/// Interleaved PBWT scans over one chromosome
pub struct IbsSegments<'a> {
    block: &'a PhasedBlock,
    cm_pos: &'a [f64],
    min_ibs_cm: f64,
    n_analyses: usize,
}

impl<'a> IbsSegments<'a> {
    /// Create a scanner for phased genotypes and their cM positions.
    ///
    /// # Panics
    /// Panics if `block.n_markers() != cm_pos.len()`.
    pub fn new(config: &Config, block: &'a PhasedBlock, cm_pos: &'a [f64]) -> Self {
        assert_eq!(block.n_markers(), cm_pos.len());
        Self {
            block,
            cm_pos,
            min_ibs_cm: config.min_ibs_cm as f64,
            n_analyses: config.pbwt,
        }
    }

    /// Run the interleaved analyses and return the merged segment list,
    /// sorted by `(hap1, hap2, start_pos, incl_end_pos)`.
    pub fn hap_pair_segments(&self) -> Vec<HapPairSegment> {
        let n_markers = self.block.n_markers();
        let mut segs: Vec<HapPairSegment> = (0..self.n_analyses)
            .into_par_iter()
            .map(|j| self.ibs_segments(j, n_markers, self.n_analyses))
            .flatten()
            .collect();
        segs.par_sort_unstable_by(HapPairSegment::hap_pair_cmp);
        merge_sorted_segments(&segs)
    }

    /// Pairwise IBS segments found by a single scan over markers
    /// `start, start + step, ...` below `end`.
    fn ibs_segments(&self, start: usize, end: usize, step: usize) -> Vec<HapPairSegment> {
        let mut seg_list = Vec::new();
        let n_haps = self.block.n_haps();
        let mut pbwt = PbwtDivUpdater::new(n_haps);
        let mut a: Vec<u32> = (0..n_haps as u32).collect();
        let mut d: Vec<i32> = vec![start as i32; n_haps];
        let mut max_ibs_start = start as i32 - 1;
        if start >= end {
            return seg_list;
        }
        let end_minus_step = end.saturating_sub(step);
        let mut m = start;
        while m < end {
            let col = self.block.column(m);
            pbwt.fwd_update(
                |h| col.get(HapIdx::new(h as u32)),
                self.block.n_alleles(m) as usize,
                m,
                &mut a,
                &mut d,
            );
            max_ibs_start = self.update_max_ibs_start(m, max_ibs_start);
            if start as i32 <= max_ibs_start {
                if m < end_minus_step {
                    self.add_adjacent_ibs_segs(m, step, &a, &d, max_ibs_start, &mut seg_list);
                } else {
                    self.last_add_adjacent_ibs_segs(m, &a, &d, max_ibs_start, &mut seg_list);
                }
            }
            m += step;
        }
        seg_list
    }

    /// The largest marker index whose cM position is at least `min_ibs_cm`
    /// before the cM position of `marker`.
    fn update_max_ibs_start(&self, marker: usize, previous_max_ibs_start: i32) -> i32 {
        debug_assert!(previous_max_ibs_start < marker as i32);
        debug_assert!(self.min_ibs_cm > 0.0);
        let max_cm_pos = self.cm_pos[marker] - self.min_ibs_cm;
        let mut candidate = previous_max_ibs_start + 1;
        while self.cm_pos[candidate as usize] <= max_cm_pos {
            candidate += 1;
        }
        candidate - 1
    }

    /// Emit segments for adjacent prefix-array pairs whose alleles differ at
    /// the scan's next marker.
    fn add_adjacent_ibs_segs(
        &self,
        m: usize,
        step: usize,
        a: &[u32],
        d: &[i32],
        max_ibs_start: i32,
        seg_list: &mut Vec<HapPairSegment>,
    ) {
        let incl_end_pos = self.block.pos(m);
        let next_col = self.block.column(m + step);
        let mut a1 = next_col.get(HapIdx::new(a[0]));
        for j in 1..a.len() {
            let a2 = next_col.get(HapIdx::new(a[j]));
            if d[j] <= max_ibs_start && a1 != a2 {
                let start_pos = self.block.pos(d[j] as usize);
                seg_list.push(HapPairSegment::new(a[j - 1], a[j], start_pos, incl_end_pos));
            }
            a1 = a2;
        }
    }

    /// Emit segments for every adjacent prefix-array pair at the scan's
    /// final marker.
    fn last_add_adjacent_ibs_segs(
        &self,
        m: usize,
        a: &[u32],
        d: &[i32],
        max_ibs_start: i32,
        seg_list: &mut Vec<HapPairSegment>,
    ) {
        let incl_end_pos = self.block.pos(m);
        for j in 1..a.len() {
            if d[j] <= max_ibs_start {
                let start_pos = self.block.pos(d[j] as usize);
                seg_list.push(HapPairSegment::new(a[j - 1], a[j], start_pos, incl_end_pos));
            }
        }
    }
}

/// Coalesce overlapping or adjacent segments of the same haplotype pair in
/// a list sorted by `(hap1, hap2, start_pos, incl_end_pos)`.
fn merge_sorted_segments(segs: &[HapPairSegment]) -> Vec<HapPairSegment> {
    if segs.is_empty() {
        return Vec::new();
    }
    let mut ends = Vec::new();
    for j in 1..=segs.len() {
        if j == segs.len() {
            ends.push(j);
        } else {
            let prev = &segs[j - 1];
            let cur = &segs[j];
            if prev.hap1 != cur.hap1
                || prev.hap2 != cur.hap2
                || prev.incl_end_pos < cur.start_pos
            {
                ends.push(j);
            }
        }
    }
    ends.par_iter()
        .enumerate()
        .map(|(ends_index, &to)| {
            let from = if ends_index == 0 { 0 } else { ends[ends_index - 1] };
            let base = segs[from];
            let max_incl_end_pos = segs[from..to]
                .iter()
                .map(|s| s.incl_end_pos)
                .max()
                .unwrap_or(base.incl_end_pos);
            if base.incl_end_pos == max_incl_end_pos {
                base
            } else {
                HapPairSegment::new(base.hap1, base.hap2, base.start_pos, max_incl_end_pos)
            }
        })
        .collect()
}
