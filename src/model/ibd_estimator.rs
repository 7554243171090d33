//! # IBD Segment Endpoint Estimation
//!
//! Refines a seed IBS segment into an IBD segment by alternately
//! re-estimating the right and left endpoints at the `prefocus_quantile`
//! level, recentring the focus after each accepted move, then reading the
//! final `quantile`-level endpoints and trimming a fixed cM margin from
//! each side. Segments whose untrimmed span falls below `min_ibd_cm` are
//! reported as the zero-length sentinel.
//!
//! Instances are not thread-safe; they are pooled and reused because the
//! underlying CDF scratch buffer is large.

use crate::config::Config;
use crate::model::chrom_data::ChromData;
use crate::model::quantile_estimator::QuantileEstimator;
use crate::model::segment::{HapPairSegment, ZERO_LENGTH_SEGMENT};

/// Estimates IBD segment endpoints from seed IBS segments
pub struct IbdEstimator<'a> {
    data: &'a ChromData,
    chrom_start_pos: i32,
    chrom_incl_end_pos: i32,
    prefocus_quantile: f64,
    quantile: f64,
    quant_est: QuantileEstimator<'a>,
    min_ibd_morgans: f64,
    trim_morgans: f64,
    max_its_m2: usize,
    max_rel_change: f64,
    fix_focus: bool,

    hap1: usize,
    hap2: usize,
    start_pos: i32,
    incl_end_pos: i32,
    focus_pos: i32,
    start_morgans: f64,
    incl_end_morgans: f64,
    focus_morgans: f64,
}

impl<'a> IbdEstimator<'a> {
    /// Create an estimator over one chromosome's data
    pub fn new(config: &Config, data: &'a ChromData) -> Self {
        let n_markers = data.n_markers();
        Self {
            data,
            chrom_start_pos: data.base_pos()[0],
            chrom_incl_end_pos: data.base_pos()[n_markers - 1],
            prefocus_quantile: config.prefocus_quantile as f64,
            quantile: config.quantile as f64,
            quant_est: QuantileEstimator::new(config, data),
            min_ibd_morgans: 0.01 * config.min_ibd_cm as f64,
            trim_morgans: 0.01 * config.trim as f64,
            // doubled since there are two ends
            max_its_m2: (config.max_its << 1).saturating_sub(2),
            max_rel_change: config.max_rel_change as f64,
            fix_focus: config.fix_focus,
            hap1: 0,
            hap2: 0,
            start_pos: 0,
            incl_end_pos: 0,
            focus_pos: 0,
            start_morgans: 0.0,
            incl_end_morgans: 0.0,
            focus_morgans: 0.0,
        }
    }

    /// Estimate the trimmed IBD segment seeded by an IBS segment.
    ///
    /// Returns [`ZERO_LENGTH_SEGMENT`] when the estimated segment fails
    /// the minimum length filter.
    ///
    /// # Panics
    /// Panics if the seed segment extends beyond the chromosome's markers.
    pub fn ibd_segment(&mut self, ibs_segment: &HapPairSegment) -> HapPairSegment {
        self.check_segment(ibs_segment);
        self.initialize_fields(ibs_segment);
        let mut no_update_cnt = 0;
        let mut j = 0;
        while no_update_cnt < 2 && j < self.max_its_m2 {
            if (j & 1) == 1 {
                let new_start_pos = self.quant_est.bwd_quantile(
                    self.hap1,
                    self.hap2,
                    self.focus_pos,
                    self.incl_end_morgans,
                    self.prefocus_quantile,
                );
                let updated = self.update_start_pos(ibs_segment, new_start_pos);
                no_update_cnt = if updated { 0 } else { no_update_cnt + 1 };
            } else {
                let new_incl_end_pos = self.quant_est.fwd_quantile(
                    self.hap1,
                    self.hap2,
                    self.start_morgans,
                    self.focus_pos,
                    self.prefocus_quantile,
                );
                let updated = self.update_incl_end_pos(ibs_segment, new_incl_end_pos);
                no_update_cnt = if updated { 0 } else { no_update_cnt + 1 };
            }
            j += 1;
        }
        self.trimmed_ibd_segment(ibs_segment)
    }

    fn trimmed_ibd_segment(&mut self, ibs_segment: &HapPairSegment) -> HapPairSegment {
        let ibd_start_morgans = self.quant_est.bwd_morgan_quantile(
            self.hap1,
            self.hap2,
            self.focus_pos,
            self.incl_end_morgans,
            self.quantile,
        );
        let ibd_end_morgans = self.quant_est.fwd_morgan_quantile(
            self.hap1,
            self.hap2,
            self.start_morgans,
            self.focus_pos,
            self.quantile,
        );
        let ibd_length = ibd_end_morgans - ibd_start_morgans;
        let trimmed_start_morgans = ibd_start_morgans + self.trim_morgans;
        let trimmed_end_morgans = ibd_end_morgans - self.trim_morgans;
        if ibd_length >= self.min_ibd_morgans && trimmed_start_morgans <= trimmed_end_morgans {
            let ibd_start_pos = self.data.morgan_to_base(trimmed_start_morgans);
            let ibd_incl_end_pos = self.data.morgan_to_base(trimmed_end_morgans);
            HapPairSegment::new(
                ibs_segment.hap1,
                ibs_segment.hap2,
                ibd_start_pos,
                ibd_incl_end_pos,
            )
        } else {
            ZERO_LENGTH_SEGMENT
        }
    }

    fn check_segment(&self, seg: &HapPairSegment) {
        assert!(
            seg.start_pos >= self.chrom_start_pos && seg.incl_end_pos <= self.chrom_incl_end_pos,
            "haplotype segment {}:{}-{} extends beyond input markers {}:{}-{}",
            self.data.chrom(),
            seg.start_pos,
            seg.incl_end_pos,
            self.data.chrom(),
            self.chrom_start_pos,
            self.chrom_incl_end_pos,
        );
    }

    fn initialize_fields(&mut self, seg: &HapPairSegment) {
        self.hap1 = seg.hap1 as usize;
        self.hap2 = seg.hap2 as usize;
        self.start_pos = seg.start_pos;
        self.incl_end_pos = seg.incl_end_pos;
        self.focus_pos = midpoint(seg.start_pos, seg.incl_end_pos);
        self.start_morgans = self.data.base_to_morgan(seg.start_pos);
        self.incl_end_morgans = self.data.base_to_morgan(seg.incl_end_pos);
        self.focus_morgans = self.data.base_to_morgan(self.focus_pos);
    }

    fn update_incl_end_pos(&mut self, ibs: &HapPairSegment, new_incl_end_pos: i32) -> bool {
        let new_incl_end_morgans = self.data.base_to_morgan(new_incl_end_pos);
        if !self.allow_end_update(self.incl_end_morgans, new_incl_end_morgans) {
            return false;
        }
        let mut new_focus_pos = self.focus_pos;
        let mut new_focus_morgans = self.focus_morgans;
        if !self.fix_focus {
            new_focus_pos = midpoint(self.start_pos, new_incl_end_pos);
            if new_focus_pos <= ibs.start_pos {
                new_focus_pos = ibs.start_pos + 1;
            }
            if new_focus_pos >= ibs.incl_end_pos {
                new_focus_pos = ibs.incl_end_pos - 1;
            }
            new_focus_morgans = self.data.base_to_morgan(new_focus_pos);
        }
        if (new_incl_end_morgans - new_focus_morgans) > 0.0
            && (new_focus_morgans - self.start_morgans) > 0.0
        {
            self.focus_pos = new_focus_pos;
            self.focus_morgans = new_focus_morgans;
            self.incl_end_pos = new_incl_end_pos;
            self.incl_end_morgans = new_incl_end_morgans;
            true
        } else {
            false
        }
    }

    fn update_start_pos(&mut self, ibs: &HapPairSegment, new_start_pos: i32) -> bool {
        let new_start_morgans = self.data.base_to_morgan(new_start_pos);
        if !self.allow_end_update(self.start_morgans, new_start_morgans) {
            return false;
        }
        let mut new_focus_pos = self.focus_pos;
        let mut new_focus_morgans = self.focus_morgans;
        if !self.fix_focus {
            new_focus_pos = midpoint(new_start_pos, self.incl_end_pos);
            if new_focus_pos <= ibs.start_pos {
                new_focus_pos = ibs.start_pos + 1;
            }
            if new_focus_pos >= ibs.incl_end_pos {
                new_focus_pos = ibs.incl_end_pos - 1;
            }
            new_focus_morgans = self.data.base_to_morgan(new_focus_pos);
        }
        if (new_focus_morgans - new_start_morgans) > 0.0
            && (self.incl_end_morgans - new_focus_morgans) > 0.0
        {
            self.start_pos = new_start_pos;
            self.start_morgans = new_start_morgans;
            self.focus_pos = new_focus_pos;
            self.focus_morgans = new_focus_morgans;
            true
        } else {
            false
        }
    }

    /// A move is considered only when it changes the focus-to-endpoint
    /// distance by more than `max_rel_change`.
    fn allow_end_update(&self, old_endpoint_morgans: f64, new_endpoint_morgans: f64) -> bool {
        let old_dist = (old_endpoint_morgans - self.focus_morgans).abs();
        let new_dist = (new_endpoint_morgans - self.focus_morgans).abs();
        if old_dist == 0.0 {
            false
        } else {
            ((new_dist - old_dist) / old_dist).abs() > self.max_rel_change
        }
    }
}

fn midpoint(a: i32, b: i32) -> i32 {
    (((a as i64) + (b as i64)) >> 1) as i32
}
