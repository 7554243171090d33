//! # Data Module
//!
//! In-memory representations of genomic data.
//!
//! ## Design Philosophy: Data-Oriented Design
//! - **Structure of Arrays (SoA):** Marker metadata and genotype columns are
//!   stored separately for cache-friendly iteration.
//! - **Zero-cost newtypes:** `MarkerIdx`, `HapIdx`, `SampleIdx` prevent index
//!   bugs at compile time with no runtime overhead.
//! - **Enum-based polymorphism:** `GenotypeColumn` variants (Dense/Sparse)
//!   replace a class hierarchy with a single stack-allocated enum.
//!
//! ## Sub-modules
//! - `marker`: Genomic position and allele definitions
//! - `haplotype`: Index types for samples and haplotypes
//! - `genetic_map`: Physical-to-genetic distance interpolation
//! - `storage`: Genotype storage backends

pub mod genetic_map;
pub mod haplotype;
pub mod marker;
pub mod storage;

pub use genetic_map::PlinkGenMap;
pub use haplotype::{HapIdx, SampleIdx, Samples};
pub use marker::{Marker, MarkerIdx, Markers};
pub use storage::{GenotypeColumn, PhasedBlock};
