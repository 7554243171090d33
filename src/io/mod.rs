//! # I/O Module
//!
//! File reading/writing boundaries. Every genotype input format feeds one
//! record-source contract; the output side frames tab-delimited cluster
//! lines into BGZF members.

pub mod bgzf;
pub mod bref3;
pub mod chrom_reader;
pub mod cluster_writer;
pub mod vcf;

pub use bref3::Bref3Reader;
pub use chrom_reader::ChromReader;
pub use cluster_writer::ClusterWriter;
pub use vcf::VcfReader;

use std::sync::Arc;

use crate::data::haplotype::Samples;
use crate::data::marker::Marker;
use crate::error::Result;

/// One phased, non-missing genotype record
#[derive(Clone, Debug)]
pub struct PhasedRecord {
    /// Chromosome identifier
    pub chrom: Arc<str>,
    /// Marker metadata
    pub marker: Marker,
    /// One allele per haplotype, in sample order
    pub alleles: Vec<u16>,
}

/// A streaming source of phased genotype records.
///
/// Both the VCF reader and the bref3 reader implement this contract; the
/// per-chromosome reader consumes it without knowing the input format.
pub trait PhasedRecordSource {
    /// The samples covered by every record
    fn samples(&self) -> Arc<Samples>;

    /// The next record, or `None` at end of input
    fn next_record(&mut self) -> Result<Option<PhasedRecord>>;
}
