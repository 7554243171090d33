//! # Per-Chromosome Analysis Context
//!
//! Immutable input data assembled once per chromosome: the phased block,
//! marker coordinate arrays in both orientations, and the forward and
//! reverse interval IBS probability tables (which share one global IBS
//! length distribution). The reverse orientation reflects coordinates
//! through zero so that reflected arrays are again sorted increasing.

use std::sync::Arc;

use crate::config::Config;
use crate::data::genetic_map::PlinkGenMap;
use crate::data::storage::PhasedBlock;
use crate::error::Result;
use crate::model::global_ibs_probs::GlobalIbsProbs;
use crate::model::ibs_counts::IbsCounts;
use crate::model::ibs_length_probs::IbsLengthProbs;
use crate::model::interp;

/// Immutable input data for one chromosome's clustering analysis
pub struct ChromData {
    block: PhasedBlock,
    cm_pos: Vec<f64>,
    base_pos: Vec<i32>,
    reflected_base_pos: Vec<i32>,
    morgan_pos: Vec<f64>,
    reflected_morgan_pos: Vec<f64>,
    fwd_ibs_probs: IbsLengthProbs,
    rev_ibs_probs: IbsLengthProbs,
}

impl ChromData {
    /// Assemble the analysis context for one chromosome.
    ///
    /// The local IBS counts tables are built, converted to probability
    /// tables, and dropped here so their memory is released before the
    /// segment lists grow.
    pub fn new(config: &Config, block: PhasedBlock, gen_map: &PlinkGenMap) -> Result<Self> {
        let cm_pos = gen_map.gen_pos(block.chrom(), block.markers())?;
        let base_pos: Vec<i32> = block.markers().iter().map(|m| m.pos).collect();
        let morgan_pos: Vec<f64> = cm_pos.iter().map(|&cm| 0.01 * cm).collect();
        let reflected_base_pos = reflect_i32(&base_pos);
        let reflected_morgan_pos = reflect_f64(&morgan_pos);

        let gip = Arc::new(GlobalIbsProbs::new(config, &block, &morgan_pos));
        let fwd_counts = IbsCounts::new(config, &block);
        let rev_counts = fwd_counts.reverse();
        let fwd_ibs_probs = IbsLengthProbs::new(morgan_pos.clone(), &fwd_counts, Arc::clone(&gip));
        let rev_ibs_probs = IbsLengthProbs::new(reflected_morgan_pos.clone(), &rev_counts, gip);

        Ok(Self {
            block,
            cm_pos,
            base_pos,
            reflected_base_pos,
            morgan_pos,
            reflected_morgan_pos,
            fwd_ibs_probs,
            rev_ibs_probs,
        })
    }

    /// The phased genotype data
    pub fn block(&self) -> &PhasedBlock {
        &self.block
    }

    /// Chromosome identifier
    pub fn chrom(&self) -> &str {
        self.block.chrom()
    }

    /// Number of markers
    pub fn n_markers(&self) -> usize {
        self.base_pos.len()
    }

    /// Marker cM positions (strictly increasing)
    pub fn cm_pos(&self) -> &[f64] {
        &self.cm_pos
    }

    /// Marker base positions
    pub fn base_pos(&self) -> &[i32] {
        &self.base_pos
    }

    /// Reflected marker base positions (reverse order, negated)
    pub fn reflected_base_pos(&self) -> &[i32] {
        &self.reflected_base_pos
    }

    /// Marker Morgan positions
    pub fn morgan_pos(&self) -> &[f64] {
        &self.morgan_pos
    }

    /// Reflected marker Morgan positions (reverse order, negated)
    pub fn reflected_morgan_pos(&self) -> &[f64] {
        &self.reflected_morgan_pos
    }

    /// Forward one-sided IBS interval probabilities
    pub fn fwd_ibs_probs(&self) -> &IbsLengthProbs {
        &self.fwd_ibs_probs
    }

    /// Reverse one-sided IBS interval probabilities
    pub fn rev_ibs_probs(&self) -> &IbsLengthProbs {
        &self.rev_ibs_probs
    }

    /// Estimated base position of a Morgan position
    pub fn morgan_to_base(&self, morgan: f64) -> i32 {
        interp::base_pos(&self.base_pos, &self.morgan_pos, morgan)
    }

    /// Estimated Morgan position of a base position
    pub fn base_to_morgan(&self, base: i32) -> f64 {
        interp::morgan_pos(&self.base_pos, &self.morgan_pos, base)
    }

    /// Morgan length of the base coordinate interval `[start, incl_end]`
    pub fn morgan_length(&self, start_pos: i32, incl_end_pos: i32) -> f64 {
        self.base_to_morgan(incl_end_pos) - self.base_to_morgan(start_pos)
    }
}

fn reflect_i32(values: &[i32]) -> Vec<i32> {
    values.iter().rev().map(|&v| -v).collect()
}

fn reflect_f64(values: &[f64]) -> Vec<f64> {
    values.iter().rev().map(|&v| -v).collect()
}
