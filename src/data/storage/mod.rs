//! # Genotype Storage Backends
//!
//! Polymorphic storage for phased genotype data. A single enum with two
//! concrete layouts replaces a class hierarchy of record shapes:
//!
//! - [`DenseColumn`]: bit-packed alleles at width `ceil(log2(n_alleles))`,
//!   used for markers where minor alleles are common.
//! - [`SparseColumn`]: sorted minor-allele carrier list, used for markers
//!   where almost every haplotype carries the major allele.
//!
//! Columns are immutable once built and are shared by reference for the
//! lifetime of a chromosome analysis.

pub mod block;
pub mod dense;
pub mod sparse;

pub use block::PhasedBlock;
pub use dense::DenseColumn;
pub use sparse::SparseColumn;

use crate::data::haplotype::HapIdx;

/// One marker's phased alleles across all haplotypes
#[derive(Clone, Debug)]
pub enum GenotypeColumn {
    /// Bit-packed storage for markers with common minor alleles
    Dense(DenseColumn),
    /// Carrier-list storage for markers with rare minor alleles
    Sparse(SparseColumn),
}

impl GenotypeColumn {
    /// Get the allele carried by a haplotype
    #[inline]
    pub fn get(&self, hap: HapIdx) -> u16 {
        match self {
            Self::Dense(col) => col.get(hap),
            Self::Sparse(col) => col.get(hap),
        }
    }

    /// Number of haplotypes in this column
    pub fn n_haplotypes(&self) -> usize {
        match self {
            Self::Dense(col) => col.n_haplotypes(),
            Self::Sparse(col) => col.n_haplotypes(),
        }
    }

    /// Create from an allele slice, choosing the storage layout by the
    /// number of non-major-allele carriers.
    pub fn from_alleles(alleles: &[u16], n_alleles: u16) -> Self {
        let n_haps = alleles.len();
        let mut counts = vec![0u32; n_alleles.max(1) as usize];
        for &a in alleles {
            counts[a as usize] += 1;
        }
        let major = counts
            .iter()
            .enumerate()
            .max_by_key(|&(_, &c)| c)
            .map(|(a, _)| a as u16)
            .unwrap_or(0);
        let non_major = n_haps - counts[major as usize] as usize;
        if non_major <= (n_haps >> 8) {
            Self::Sparse(SparseColumn::from_alleles(alleles, major))
        } else {
            Self::Dense(DenseColumn::from_alleles(
                alleles.iter().copied(),
                n_alleles,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_selection() {
        // Common minor allele: dense
        let common: Vec<u16> = (0..1000).map(|i| (i % 2) as u16).collect();
        let col = GenotypeColumn::from_alleles(&common, 2);
        assert!(matches!(col, GenotypeColumn::Dense(_)));

        // Rare minor allele: sparse
        let mut rare = vec![0u16; 1000];
        rare[3] = 1;
        rare[900] = 1;
        let col = GenotypeColumn::from_alleles(&rare, 2);
        assert!(matches!(col, GenotypeColumn::Sparse(_)));
        assert_eq!(col.get(HapIdx::new(3)), 1);
        assert_eq!(col.get(HapIdx::new(4)), 0);
    }

    #[test]
    fn test_sparse_with_nonzero_major() {
        // Almost all haplotypes carry allele 1: sparse with major = 1
        let mut alleles = vec![1u16; 1000];
        alleles[17] = 0;
        let col = GenotypeColumn::from_alleles(&alleles, 2);
        assert!(matches!(col, GenotypeColumn::Sparse(_)));
        assert_eq!(col.get(HapIdx::new(17)), 0);
        assert_eq!(col.get(HapIdx::new(18)), 1);
    }
}
