//! # Endpoint Quantile Estimator
//!
//! Builds the posterior CDF of an IBD segment endpoint for a haplotype
//! pair, walking outward from a focus position, and answers quantile
//! queries against it. The per-interval mass combines the coalescent
//! survival transform, the interval IBS probabilities, and a running
//! correction factor that divides out the IBS prior at each observed
//! discordance and multiplies in the discord probability (the
//! gene-conversion rate when a previous discordance lies within `gc_bases`
//! base pairs, the background rate otherwise).
//!
//! Backward quantiles run the same machinery against the reflected marker
//! order with negated coordinates.
//!
//! Instances are not thread-safe: the CDF scratch buffer sizes to
//! `n_markers + 1` doubles and is reused across calls, so estimators are
//! pooled rather than rebuilt per segment.

use crate::config::Config;
use crate::model::chrom_data::ChromData;
use crate::model::coalescent;
use crate::model::ibs_length_probs::IbsLengthProbs;

/// One orientation (forward or reflected) of the chromosome data
struct OrientedData<'a> {
    fwd: bool,
    n_markers: usize,
    base_pos: &'a [i32],
    morgan_pos: &'a [f64],
    ibs_probs: &'a IbsLengthProbs,
    data: &'a ChromData,
    /// Base position of the hypothetical discordant marker at index
    /// `n_markers` (the last real marker position)
    ext_base_pos: i32,
    /// Morgan position of the hypothetical discordant marker
    ext_morgan_pos: f64,
}

impl<'a> OrientedData<'a> {
    fn new(data: &'a ChromData, fwd: bool, end_morgans: f64) -> Self {
        let n_markers = data.n_markers();
        let (base_pos, morgan_pos, ibs_probs) = if fwd {
            (data.base_pos(), data.morgan_pos(), data.fwd_ibs_probs())
        } else {
            (
                data.reflected_base_pos(),
                data.reflected_morgan_pos(),
                data.rev_ibs_probs(),
            )
        };
        let last = n_markers - 1;
        Self {
            fwd,
            n_markers,
            base_pos,
            morgan_pos,
            ibs_probs,
            data,
            ext_base_pos: base_pos[last],
            ext_morgan_pos: morgan_pos[last] + end_morgans,
        }
    }

    #[inline]
    fn morgans(&self, marker: usize) -> f64 {
        if marker == self.n_markers {
            self.ext_morgan_pos
        } else {
            self.morgan_pos[marker]
        }
    }

    #[inline]
    fn pos(&self, marker: usize) -> i32 {
        if marker == self.n_markers {
            self.ext_base_pos
        } else {
            self.base_pos[marker]
        }
    }

    /// Index of the first marker strictly after `position`
    fn next_marker(&self, position: i32) -> usize {
        self.base_pos.partition_point(|&p| p <= position)
    }

    #[inline]
    fn allele(&self, marker: usize, hap: usize) -> u16 {
        let m = if self.fwd {
            marker
        } else {
            self.n_markers - 1 - marker
        };
        self.data.block().allele(m, hap)
    }

    /// Index of the first marker at or after `start` where the pair is
    /// discordant, or `n_markers` if there is none
    fn next_discord(&self, hap1: usize, hap2: usize, start: usize) -> usize {
        let mut m = start;
        while m < self.n_markers && self.allele(m, hap1) == self.allele(m, hap2) {
            m += 1;
        }
        m
    }

    #[inline]
    fn ibs_prob(&self, start: usize, end: usize) -> f64 {
        self.ibs_probs.ibs_prob(start, end)
    }
}

/// Reusable CDF scratch state
struct CdfScratch {
    cdf: Vec<f64>,
    /// First marker strictly after the focus
    start: usize,
    /// Exclusive end of the populated CDF range
    end: usize,
}

/// Model constants shared by both orientations
struct ModelParams {
    ne: f64,
    err: f64,
    gc_err: f64,
    gc_bp: i64,
    min_cdf_ratio: f64,
}

/// Estimates quantiles of an IBD segment endpoint distribution
pub struct QuantileEstimator<'a> {
    n_markers: usize,
    fwd_data: OrientedData<'a>,
    rev_data: OrientedData<'a>,
    params: ModelParams,
    scratch: CdfScratch,
}

impl<'a> QuantileEstimator<'a> {
    /// Create an estimator over one chromosome's data
    pub fn new(config: &Config, data: &'a ChromData) -> Self {
        let n_markers = data.n_markers();
        Self {
            n_markers,
            fwd_data: OrientedData::new(data, true, config.end_morgans),
            rev_data: OrientedData::new(data, false, config.end_morgans),
            params: ModelParams {
                ne: config.ne,
                err: config.discord as f64,
                gc_err: config.gc_discord as f64,
                gc_bp: config.gc_bases as i64,
                min_cdf_ratio: config.min_cdf_ratio as f64,
            },
            // includes the hypothetical terminal marker
            scratch: CdfScratch {
                cdf: vec![0.0; n_markers + 1],
                start: 0,
                end: 0,
            },
        }
    }

    /// Base-pair position at which the posterior CDF of the segment's
    /// right endpoint reaches probability `prob`, walking forward from
    /// `focus_pos` for a segment believed to start at `start_morgans`.
    pub fn fwd_quantile(
        &mut self,
        hap1: usize,
        hap2: usize,
        start_morgans: f64,
        focus_pos: i32,
        prob: f64,
    ) -> i32 {
        let focus_morgans = self.fwd_data.data.base_to_morgan(focus_pos);
        Self::set_cdf(
            &mut self.scratch,
            &self.params,
            &self.fwd_data,
            hap1,
            hap2,
            start_morgans,
            focus_pos,
            focus_morgans,
        );
        Self::quantile(
            &self.scratch,
            &self.params,
            &self.fwd_data,
            self.n_markers,
            start_morgans,
            focus_pos,
            focus_morgans,
            prob,
        )
    }

    /// Morgan position of the `prob` quantile of the right endpoint
    pub fn fwd_morgan_quantile(
        &mut self,
        hap1: usize,
        hap2: usize,
        start_morgans: f64,
        focus_pos: i32,
        prob: f64,
    ) -> f64 {
        let focus_morgans = self.fwd_data.data.base_to_morgan(focus_pos);
        Self::set_cdf(
            &mut self.scratch,
            &self.params,
            &self.fwd_data,
            hap1,
            hap2,
            start_morgans,
            focus_pos,
            focus_morgans,
        );
        Self::morgan_quantile(
            &self.scratch,
            &self.params,
            &self.fwd_data,
            self.n_markers,
            start_morgans,
            focus_morgans,
            prob,
        )
    }

    /// Base-pair position at which the posterior CDF of the segment's
    /// left endpoint reaches probability `prob`, walking backward from
    /// `focus_pos` for a segment believed to end at `incl_end_morgans`.
    pub fn bwd_quantile(
        &mut self,
        hap1: usize,
        hap2: usize,
        focus_pos: i32,
        incl_end_morgans: f64,
        prob: f64,
    ) -> i32 {
        let focus_morgans = self.rev_data.data.base_to_morgan(focus_pos);
        Self::set_cdf(
            &mut self.scratch,
            &self.params,
            &self.rev_data,
            hap1,
            hap2,
            -incl_end_morgans,
            -focus_pos,
            -focus_morgans,
        );
        -Self::quantile(
            &self.scratch,
            &self.params,
            &self.rev_data,
            self.n_markers,
            -incl_end_morgans,
            -focus_pos,
            -focus_morgans,
            prob,
        )
    }

    /// Morgan position of the `prob` quantile of the left endpoint
    pub fn bwd_morgan_quantile(
        &mut self,
        hap1: usize,
        hap2: usize,
        focus_pos: i32,
        incl_end_morgans: f64,
        prob: f64,
    ) -> f64 {
        let focus_morgans = self.rev_data.data.base_to_morgan(focus_pos);
        Self::set_cdf(
            &mut self.scratch,
            &self.params,
            &self.rev_data,
            hap1,
            hap2,
            -incl_end_morgans,
            -focus_pos,
            -focus_morgans,
        );
        -Self::morgan_quantile(
            &self.scratch,
            &self.params,
            &self.rev_data,
            self.n_markers,
            -incl_end_morgans,
            -focus_morgans,
            prob,
        )
    }

    /// Populate the endpoint CDF over markers strictly after the focus.
    ///
    /// For markers `m` in `[scratch.start, scratch.end)`, `cdf[m]` holds
    /// the cumulative (eventually normalized) probability that the endpoint
    /// lies before marker `m`; `cdf[scratch.start - 1]` anchors the walk
    /// at zero. The running total is rescaled whenever it exceeds 1e50,
    /// with the scale folded into the correction factor, and the walk
    /// stops once the remaining mass falls below `min_cdf_ratio` of the
    /// total.
    #[allow(clippy::too_many_arguments)]
    fn set_cdf(
        scratch: &mut CdfScratch,
        params: &ModelParams,
        data: &OrientedData<'_>,
        hap1: usize,
        hap2: usize,
        start_morgans: f64,
        focus_pos: i32,
        focus_morgans: f64,
    ) {
        scratch.start = data.next_marker(focus_pos);
        debug_assert!(scratch.start >= 1, "focus precedes the first marker");
        scratch.cdf[scratch.start - 1] = 0.0;
        let mut factor = 1.0;
        let mut f1 = coalescent::f(focus_morgans - start_morgans, params.ne);
        let mut start = scratch.start;
        let mut next_discord = data.next_discord(hap1, hap2, start);
        let mut min_next_discord_pos = data.pos(next_discord) as i64 + params.gc_bp;
        loop {
            scratch.end = next_discord + 1;
            for m in start..scratch.end {
                let f2 = coalescent::f(data.morgans(m) - start_morgans, params.ne);
                scratch.cdf[m] =
                    scratch.cdf[m - 1] + (f2 - f1) * data.ibs_prob(m, next_discord) * factor;
                f1 = f2;
            }
            if Self::finished(scratch, params.min_cdf_ratio, start) {
                let scale = 1.0 / scratch.cdf[scratch.end - 1];
                Self::scale(&mut scratch.cdf, scratch.start, scratch.end, scale);
                return;
            }
            if scratch.cdf[scratch.end - 1] > 1e50 {
                let scale = 1.0 / scratch.cdf[scratch.end - 1];
                Self::scale(&mut scratch.cdf, scratch.start, scratch.end, scale);
                factor *= scale;
            }
            start = scratch.end;
            next_discord = data.next_discord(hap1, hap2, start);
            let discord_pos = data.pos(next_discord) as i64;
            let mut num = params.gc_err;
            if discord_pos >= min_next_discord_pos {
                num = params.err;
                min_next_discord_pos = discord_pos + params.gc_bp;
            }
            factor *= num / data.ibs_prob(start, next_discord);
        }
    }

    fn finished(scratch: &CdfScratch, min_cdf_ratio: f64, last_start: usize) -> bool {
        if scratch.end == scratch.cdf.len() {
            return true;
        }
        let last_value = scratch.cdf[scratch.end - 1];
        (last_value - scratch.cdf[last_start - 1]) < (min_cdf_ratio * last_value)
    }

    fn scale(cdf: &mut [f64], start: usize, end: usize, factor: f64) {
        for value in &mut cdf[start..end] {
            *value *= factor;
        }
    }

    /// Base-pair quantile lookup against the populated CDF.
    ///
    /// The Morgan position is recovered by inverting the survival
    /// contribution inside the bracketing interval; the base-pair result
    /// interpolates linearly between the bracketing marker positions, with
    /// a minimum of `focus_pos + 1`.
    #[allow(clippy::too_many_arguments)]
    fn quantile(
        scratch: &CdfScratch,
        params: &ModelParams,
        data: &OrientedData<'_>,
        n_markers: usize,
        start_morgans: f64,
        focus_pos: i32,
        focus_morgans: f64,
        p: f64,
    ) -> i32 {
        assert!(p > 0.0 && p < 1.0 && !p.is_nan(), "invalid probability {p}");
        let index = scratch.start
            + scratch.cdf[scratch.start..scratch.end].partition_point(|&v| v < p);
        if index == n_markers {
            return data.pos(n_markers);
        }
        let p1 = scratch.cdf[index - 1];
        let p2 = scratch.cdf[index];
        debug_assert!(p1 <= p && p <= p2);

        let x1 = if index == scratch.start {
            focus_morgans
        } else {
            data.morgans(index - 1)
        };
        let x2 = data.morgans(index);

        let f1 = coalescent::f(x1 - start_morgans, params.ne);
        let f2 = coalescent::f(x2 - start_morgans, params.ne);
        let pp = f1 + ((p - p1) / (p2 - p1)) * (f2 - f1);
        let x = start_morgans + coalescent::inv_f(pp, params.ne);
        debug_assert!(x1 <= x2);
        let delta = ((x - x1) / (x2 - x1)).clamp((0.0f64).next_up(), (1.0f64).next_down());

        // minimum quantile is focus_pos + 1 to keep the interval non-empty
        let y1 = if index == scratch.start {
            focus_pos + 1
        } else {
            data.pos(index - 1)
        };
        let y2 = data.pos(index);
        let y = (y1 as f64 + delta * (y2 - y1) as f64).round_ties_even() as i32;
        debug_assert!(y1 <= y && y <= y2);
        y
    }

    /// Morgan quantile lookup against the populated CDF
    #[allow(clippy::too_many_arguments)]
    fn morgan_quantile(
        scratch: &CdfScratch,
        params: &ModelParams,
        data: &OrientedData<'_>,
        n_markers: usize,
        start_morgans: f64,
        focus_morgans: f64,
        p: f64,
    ) -> f64 {
        assert!(p > 0.0 && p < 1.0 && !p.is_nan(), "invalid probability {p}");
        let index = scratch.start
            + scratch.cdf[scratch.start..scratch.end].partition_point(|&v| v < p);
        if index == n_markers {
            // terminal bucket: clamp to the last marker of this orientation
            return data.morgan_pos[n_markers - 1];
        }
        let p1 = scratch.cdf[index - 1];
        let p2 = scratch.cdf[index];
        debug_assert!(p1 <= p && p <= p2);

        let x1 = if index == scratch.start {
            focus_morgans
        } else {
            data.morgans(index - 1)
        };
        let x2 = data.morgans(index);

        let f1 = coalescent::f(x1 - start_morgans, params.ne);
        let f2 = coalescent::f(x2 - start_morgans, params.ne);
        let pp = f1 + ((p - p1) / (p2 - p1)) * (f2 - f1);
        start_morgans + coalescent::inv_f(pp, params.ne)
    }

    /// The populated CDF range, for validation in tests
    #[cfg(test)]
    fn cdf_range(&self) -> &[f64] {
        &self.scratch.cdf[self.scratch.start..self.scratch.end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::chrom_data::testing::test_chrom_data;

    /// 41 markers at 10 kb / 0.1 cM spacing; haplotypes 0 and 1 are IBS
    /// everywhere, haplotype 2 differs from both at every fourth marker.
    fn data(config: &Config) -> ChromData {
        let rows: Vec<Vec<u16>> = (0..41)
            .map(|m| {
                let b = (m % 4 == 0) as u16;
                vec![0, 0, b, 1]
            })
            .collect();
        let positions: Vec<i32> = (0..41).map(|j| 10_000 * (j + 1)).collect();
        test_chrom_data(&rows, &positions, config)
    }

    fn config() -> Config {
        let mut config = Config::test_default();
        config.global_loci = 10;
        config.global_segments = 50;
        config
    }

    #[test]
    fn test_cdf_is_monotone_and_normalized() {
        let config = config();
        let data = data(&config);
        let mut est = QuantileEstimator::new(&config, &data);
        let start_morgans = data.base_to_morgan(10_000);
        let _ = est.fwd_quantile(0, 1, start_morgans, 200_000, 0.5);
        let cdf = est.cdf_range();
        assert!(!cdf.is_empty());
        for w in cdf.windows(2) {
            assert!(w[0] <= w[1], "CDF not monotone");
        }
        assert!((cdf[cdf.len() - 1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_quantiles_are_ordered_in_probability() {
        let config = config();
        let data = data(&config);
        let mut est = QuantileEstimator::new(&config, &data);
        let start_morgans = data.base_to_morgan(10_000);
        let q10 = est.fwd_quantile(0, 2, start_morgans, 200_000, 0.1);
        let q50 = est.fwd_quantile(0, 2, start_morgans, 200_000, 0.5);
        let q90 = est.fwd_quantile(0, 2, start_morgans, 200_000, 0.9);
        assert!(q10 <= q50 && q50 <= q90);
        assert!(q10 > 200_000);
    }

    #[test]
    fn test_fully_ibs_pair_reaches_far_right() {
        let config = config();
        let data = data(&config);
        let mut est = QuantileEstimator::new(&config, &data);
        let start_morgans = data.base_to_morgan(10_000);
        // Pair (0,1) is IBS to the chromosome end; pair (0,2) hits
        // discordances every 4 markers.
        let ibs_q = est.fwd_quantile(0, 1, start_morgans, 200_000, 0.5);
        let discord_q = est.fwd_quantile(0, 2, start_morgans, 200_000, 0.5);
        assert!(ibs_q >= discord_q);
    }

    #[test]
    fn test_bwd_quantile_mirrors_fwd() {
        let config = config();
        let data = data(&config);
        let mut est = QuantileEstimator::new(&config, &data);
        let end_morgans = data.base_to_morgan(410_000);
        let q = est.bwd_quantile(0, 2, 200_000, end_morgans, 0.5);
        assert!(q < 200_000);
        assert!(q >= 10_000);
    }

    #[test]
    fn test_morgan_quantile_consistent_with_base_quantile() {
        let config = config();
        let data = data(&config);
        let mut est = QuantileEstimator::new(&config, &data);
        let start_morgans = data.base_to_morgan(10_000);
        let base_q = est.fwd_quantile(0, 2, start_morgans, 200_000, 0.5);
        let morgan_q = est.fwd_morgan_quantile(0, 2, start_morgans, 200_000, 0.5);
        let approx = data.morgan_to_base(morgan_q);
        assert!((approx - base_q).abs() <= 10_000, "base {base_q} vs morgan-derived {approx}");
    }
}
