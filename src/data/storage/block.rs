//! # Phased Chromosome Block
//!
//! The immutable phased genotype data for one chromosome: marker metadata
//! plus one storage column per marker. Built once by the input layer and
//! shared read-only by every analysis stage.

use std::sync::Arc;

use crate::data::haplotype::{HapIdx, Samples};
use crate::data::marker::{MarkerIdx, Markers};
use crate::data::storage::GenotypeColumn;

/// Phased, non-missing genotypes for one chromosome
#[derive(Clone, Debug)]
pub struct PhasedBlock {
    chrom: Arc<str>,
    markers: Markers,
    columns: Vec<GenotypeColumn>,
    samples: Arc<Samples>,
}

impl PhasedBlock {
    /// Create a block. The number of columns must equal the number of
    /// markers, and every column must cover `samples.n_haps()` haplotypes.
    pub fn new(
        chrom: Arc<str>,
        markers: Markers,
        columns: Vec<GenotypeColumn>,
        samples: Arc<Samples>,
    ) -> Self {
        assert_eq!(markers.len(), columns.len());
        debug_assert!(columns
            .iter()
            .all(|c| c.n_haplotypes() == samples.n_haps()));
        Self {
            chrom,
            markers,
            columns,
            samples,
        }
    }

    /// Chromosome identifier
    pub fn chrom(&self) -> &Arc<str> {
        &self.chrom
    }

    /// Number of markers
    pub fn n_markers(&self) -> usize {
        self.markers.len()
    }

    /// Number of haplotypes
    pub fn n_haps(&self) -> usize {
        self.samples.n_haps()
    }

    /// Marker metadata
    pub fn markers(&self) -> &Markers {
        &self.markers
    }

    /// Sample registry
    pub fn samples(&self) -> &Arc<Samples> {
        &self.samples
    }

    /// Storage column for one marker
    pub fn column(&self, marker: usize) -> &GenotypeColumn {
        &self.columns[marker]
    }

    /// Allele carried by `hap` at marker `marker`
    #[inline]
    pub fn allele(&self, marker: usize, hap: usize) -> u16 {
        self.columns[marker].get(HapIdx::new(hap as u32))
    }

    /// Allele count of the marker at `marker`
    pub fn n_alleles(&self, marker: usize) -> u16 {
        self.markers.marker(MarkerIdx::from(marker)).n_alleles
    }

    /// Base position of the marker at `marker`
    pub fn pos(&self, marker: usize) -> i32 {
        self.markers.pos(marker)
    }
}

/// Test-only builders shared by unit tests across the crate
#[cfg(test)]
pub mod testing {
    use super::*;
    use crate::data::marker::Marker;

    /// Build a block from rows of per-haplotype alleles, one row per marker
    pub fn block_from_rows(rows: &[Vec<u16>], positions: &[i32]) -> PhasedBlock {
        let n_haps = rows[0].len();
        let samples = Arc::new(Samples::from_ids(
            (0..n_haps / 2).map(|j| format!("S{j}")).collect(),
        ));
        let markers = Markers::from_vec(
            positions
                .iter()
                .zip(rows.iter())
                .map(|(&pos, row)| {
                    let n_alleles = row.iter().copied().max().unwrap_or(0).max(1) + 1;
                    Marker::new(pos, None, n_alleles)
                })
                .collect(),
        );
        let columns = rows
            .iter()
            .enumerate()
            .map(|(j, row)| {
                GenotypeColumn::from_alleles(row, markers.marker(MarkerIdx::from(j)).n_alleles)
            })
            .collect();
        PhasedBlock::new(Arc::from("1"), markers, columns, samples)
    }
}
