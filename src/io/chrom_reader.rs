//! # Per-Chromosome Block Assembly
//!
//! Pulls records from a [`PhasedRecordSource`], applies the chromosome
//! restriction, clips records to the genetic map's anchor span, applies
//! the minor-allele-count filter, and yields one [`PhasedBlock`] per
//! chromosome. Chromosomes must be contiguous in the input; a chromosome
//! whose records all fall outside the map span or below the MAF threshold
//! is fatal.

use std::collections::HashSet;
use std::sync::Arc;

use rayon::prelude::*;

use crate::config::{ChromInterval, Config};
use crate::data::genetic_map::PlinkGenMap;
use crate::data::haplotype::Samples;
use crate::data::marker::Markers;
use crate::data::storage::{GenotypeColumn, PhasedBlock};
use crate::error::{IbdclustError, Result};
use crate::io::{PhasedRecord, PhasedRecordSource};

/// Iterator over MAF-filtered per-chromosome phased blocks
pub struct ChromReader<'a> {
    source: Box<dyn PhasedRecordSource + 'a>,
    gen_map: &'a PlinkGenMap,
    chrom_interval: Option<ChromInterval>,
    samples: Arc<Samples>,
    /// Minimum count of the second-largest allele
    min_mac: i64,
    seen_chroms: HashSet<String>,
    pending: Option<PhasedRecord>,
    n_markers: u64,
    n_filtered_markers: u64,
}

impl<'a> ChromReader<'a> {
    /// Create a reader over a record source.
    ///
    /// Fails if the source holds fewer than one sample or no records
    /// survive the chromosome restriction.
    pub fn new(
        config: &Config,
        mut source: Box<dyn PhasedRecordSource + 'a>,
        gen_map: &'a PlinkGenMap,
    ) -> Result<Self> {
        let samples = source.samples();
        let n_haps = samples.n_haps();
        if n_haps < 2 {
            return Err(IbdclustError::invalid_data(
                "at least one sample is required",
            ));
        }
        let min_mac = ((config.min_maf.next_down() as f64) * n_haps as f64).ceil() as i64;
        let chrom_interval = config.chrom_interval();
        let pending = pull_next(&mut *source, &chrom_interval)?;
        if pending.is_none() {
            return Err(IbdclustError::invalid_data(
                "no VCF records found after filtering",
            ));
        }
        Ok(Self {
            source,
            gen_map,
            chrom_interval,
            samples,
            min_mac,
            seen_chroms: HashSet::new(),
            pending,
            n_markers: 0,
            n_filtered_markers: 0,
        })
    }

    /// The samples covered by every block
    pub fn samples(&self) -> &Arc<Samples> {
        &self.samples
    }

    /// Cumulative input records inside the map span, before the MAF filter
    pub fn n_markers(&self) -> u64 {
        self.n_markers
    }

    /// Cumulative records surviving the MAF filter
    pub fn n_filtered_markers(&self) -> u64 {
        self.n_filtered_markers
    }

    /// The next chromosome's phased block, or `None` at end of input
    pub fn next_chrom(&mut self) -> Result<Option<PhasedBlock>> {
        let first = match self.pending.take() {
            Some(record) => record,
            None => return Ok(None),
        };
        let chrom = Arc::clone(&first.chrom);
        if !self.seen_chroms.insert(chrom.to_string()) {
            return Err(IbdclustError::invalid_data(format!(
                "the VCF records for chromosome {chrom} are not contiguous"
            )));
        }
        let span = self.gen_map.span(&chrom);

        let mut records: Vec<PhasedRecord> = Vec::with_capacity(8192);
        let mut record = Some(first);
        while let Some(rec) = record {
            if rec.chrom != chrom {
                self.pending = Some(rec);
                break;
            }
            if let Some((first_pos, last_pos)) = span {
                if first_pos <= rec.marker.pos && rec.marker.pos <= last_pos {
                    records.push(rec);
                }
            }
            record = pull_next(&mut *self.source, &self.chrom_interval)?;
        }
        self.n_markers += records.len() as u64;

        let records = self.apply_mac_filter(records);
        self.n_filtered_markers += records.len() as u64;
        if records.is_empty() {
            return Err(IbdclustError::invalid_data(format!(
                "there are no VCF records inside the boundaries of the genetic map \
                 for chromosome {chrom} after minor allele frequency filtering"
            )));
        }
        self.build_block(chrom, records).map(Some)
    }

    fn apply_mac_filter(&self, records: Vec<PhasedRecord>) -> Vec<PhasedRecord> {
        if self.min_mac > 0 {
            let min_mac = self.min_mac;
            records
                .into_par_iter()
                .filter(|rec| mac(rec) >= min_mac)
                .collect()
        } else {
            records
        }
    }

    fn build_block(&self, chrom: Arc<str>, records: Vec<PhasedRecord>) -> Result<PhasedBlock> {
        for w in records.windows(2) {
            if w[1].marker.pos <= w[0].marker.pos {
                return Err(IbdclustError::invalid_data(format!(
                    "marker positions are not in increasing order on chromosome {chrom}: \
                     {} then {}",
                    w[0].marker.pos, w[1].marker.pos
                )));
            }
        }
        let columns: Vec<GenotypeColumn> = records
            .par_iter()
            .map(|rec| GenotypeColumn::from_alleles(&rec.alleles, rec.marker.n_alleles))
            .collect();
        let markers = Markers::from_vec(records.into_iter().map(|rec| rec.marker).collect());
        Ok(PhasedBlock::new(
            chrom,
            markers,
            columns,
            Arc::clone(&self.samples),
        ))
    }
}

fn pull_next(
    source: &mut (dyn PhasedRecordSource + '_),
    interval: &Option<ChromInterval>,
) -> Result<Option<PhasedRecord>> {
    loop {
        match source.next_record()? {
            None => return Ok(None),
            Some(rec) => match interval {
                Some(ci) if !ci.contains(&rec.chrom, rec.marker.pos) => continue,
                _ => return Ok(Some(rec)),
            },
        }
    }
}

/// The count of the second-largest allele
fn mac(record: &PhasedRecord) -> i64 {
    let mut counts = vec![0i64; record.marker.n_alleles.max(1) as usize];
    for &a in &record.alleles {
        counts[a as usize] += 1;
    }
    counts.sort_unstable();
    if counts.len() < 2 {
        0
    } else {
        counts[counts.len() - 2]
    }
}
