//! # Model Module
//!
//! The probabilistic IBD-segment discovery and clustering core.
//!
//! ## Core Algorithms
//! - `pbwt`: Positional Burrows-Wheeler Transform with divergence tracking
//! - `ibs_segments`: interleaved PBWT scans producing seed IBS segments
//! - `ibs_counts` / `global_ibs_probs` / `ibs_length_probs`: empirical
//!   one-sided IBS length model (local per-position tails plus a
//!   chromosome-wide distribution)
//! - `quantile_estimator`: posterior endpoint CDF under the coalescent
//!   survival transform and the discord model
//! - `ibd_estimator`: iterative endpoint refinement and trimming

pub mod chrom_data;
pub mod coalescent;
pub mod global_ibs_probs;
pub mod ibd_estimator;
pub mod ibs_counts;
pub mod ibs_length_probs;
pub mod ibs_segments;
pub mod interp;
pub mod pbwt;
pub mod quantile_estimator;
pub mod segment;

pub use chrom_data::ChromData;
pub use global_ibs_probs::GlobalIbsProbs;
pub use ibd_estimator::IbdEstimator;
pub use ibs_counts::IbsCounts;
pub use ibs_length_probs::IbsLengthProbs;
pub use ibs_segments::IbsSegments;
pub use pbwt::PbwtDivUpdater;
pub use quantile_estimator::QuantileEstimator;
pub use segment::{HapPairSegment, ZERO_LENGTH_SEGMENT};
