//! # VCF Reading
//!
//! Streams phased genotype records from a VCF 4.x file. GT must be the
//! first FORMAT field and every genotype must be phased and non-missing;
//! a violating record is fatal with the offending line echoed. Gzip and
//! bgzip inputs are detected by the `.gz`/`.bgz` suffix.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use flate2::read::MultiGzDecoder;

use crate::data::haplotype::Samples;
use crate::data::marker::Marker;
use crate::error::{IbdclustError, Result};
use crate::io::{PhasedRecord, PhasedRecordSource};

/// Streaming VCF record reader
pub struct VcfReader {
    reader: Box<dyn BufRead + Send>,
    samples: Arc<Samples>,
    /// Sample indices retained after exclusion (None = all)
    include_sample_indices: Option<Vec<usize>>,
    /// Sample columns present in the file, before exclusion
    n_input_samples: usize,
    /// Marker IDs (or CHROM:POS strings) to exclude
    exclude_marker_ids: HashSet<String>,
    /// Interned chromosome names so records share one allocation
    chrom_names: Vec<Arc<str>>,
    line_num: usize,
    line: String,
}

impl VcfReader {
    /// Open a VCF file and read its header
    pub fn open(
        path: &Path,
        exclude_samples: &HashSet<String>,
        exclude_marker_ids: HashSet<String>,
    ) -> Result<Self> {
        let file = File::open(path).map_err(|_| IbdclustError::FileNotFound {
            path: path.to_path_buf(),
        })?;
        let is_gzipped = path
            .extension()
            .map(|e| e == "gz" || e == "bgz")
            .unwrap_or(false);
        let reader: Box<dyn BufRead + Send> = if is_gzipped {
            Box::new(BufReader::new(MultiGzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };
        Self::from_reader(reader, exclude_samples, exclude_marker_ids)
    }

    /// Create from a buffered reader, consuming the header lines
    pub fn from_reader(
        mut reader: Box<dyn BufRead + Send>,
        exclude_samples: &HashSet<String>,
        exclude_marker_ids: HashSet<String>,
    ) -> Result<Self> {
        let mut line_num = 0usize;
        let mut header_cols: Option<Vec<String>> = None;
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            line_num += 1;
            if line.starts_with("##") {
                continue;
            }
            if line.starts_with("#CHROM") {
                header_cols = Some(
                    line.trim_end()
                        .split('\t')
                        .map(|s| s.to_string())
                        .collect(),
                );
                break;
            }
            return Err(IbdclustError::parse(
                line_num,
                format!("expected VCF header line, found: {}", line.trim_end()),
            ));
        }
        let header_cols = header_cols
            .ok_or_else(|| IbdclustError::vcf("missing #CHROM header line"))?;
        if header_cols.len() < 10 || header_cols[8] != "FORMAT" {
            return Err(IbdclustError::vcf(
                "VCF header must contain FORMAT and at least one sample column",
            ));
        }
        let all_sample_ids = &header_cols[9..];

        let (samples, include_sample_indices) = if exclude_samples.is_empty() {
            (Samples::from_ids(all_sample_ids.to_vec()), None)
        } else {
            let include: Vec<usize> = all_sample_ids
                .iter()
                .enumerate()
                .filter(|(_, id)| !exclude_samples.contains(id.as_str()))
                .map(|(j, _)| j)
                .collect();
            let ids: Vec<String> = include
                .iter()
                .map(|&j| all_sample_ids[j].clone())
                .collect();
            (Samples::from_ids(ids), Some(include))
        };
        if samples.is_empty() {
            return Err(IbdclustError::vcf("no samples remain after exclusion"));
        }

        Ok(Self {
            reader,
            samples: Arc::new(samples),
            include_sample_indices,
            n_input_samples: all_sample_ids.len(),
            exclude_marker_ids,
            chrom_names: Vec::new(),
            line_num,
            line,
        })
    }

    fn parse_record(&mut self) -> Result<Option<PhasedRecord>> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            self.line_num += 1;
            let trimmed = self.line.trim_end_matches(['\n', '\r']);
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let line_num = self.line_num;
            let mut fields = trimmed.split('\t');
            let chrom = next_field(&mut fields, "CHROM", line_num)?;
            let pos_str = next_field(&mut fields, "POS", line_num)?;
            let id = next_field(&mut fields, "ID", line_num)?;
            let _ref_allele = next_field(&mut fields, "REF", line_num)?;
            let alt = next_field(&mut fields, "ALT", line_num)?;
            let _qual = next_field(&mut fields, "QUAL", line_num)?;
            let _filter = next_field(&mut fields, "FILTER", line_num)?;
            let _info = next_field(&mut fields, "INFO", line_num)?;
            let format = next_field(&mut fields, "FORMAT", line_num)?;

            let pos: i32 = pos_str.parse().map_err(|_| {
                IbdclustError::parse(line_num, format!("invalid POS field: {pos_str}"))
            })?;
            if format != "GT" && !format.starts_with("GT:") {
                return Err(IbdclustError::parse(
                    line_num,
                    format!("GT must be the first FORMAT field: {format}"),
                ));
            }
            let n_alt = if alt == "." { 0 } else { alt.split(',').count() };
            let n_alleles = (1 + n_alt) as u16;

            if self.is_excluded(chrom, pos, id) {
                continue;
            }

            let alleles =
                self.parse_genotypes(fields, n_alleles, trimmed, line_num)?;
            let marker_id = if id == "." || id.is_empty() {
                None
            } else {
                Some(Arc::from(id))
            };
            let chrom = intern_chrom(&mut self.chrom_names, chrom);
            return Ok(Some(PhasedRecord {
                chrom,
                marker: Marker::new(pos, marker_id, n_alleles),
                alleles,
            }));
        }
    }

    fn is_excluded(&self, chrom: &str, pos: i32, id: &str) -> bool {
        if self.exclude_marker_ids.is_empty() {
            return false;
        }
        (!id.is_empty() && id != "." && self.exclude_marker_ids.contains(id))
            || self.exclude_marker_ids.contains(&format!("{chrom}:{pos}"))
    }

    fn parse_genotypes<'b>(
        &self,
        fields: impl Iterator<Item = &'b str>,
        n_alleles: u16,
        record: &str,
        line_num: usize,
    ) -> Result<Vec<u16>> {
        let invalid = |message: String| IbdclustError::Parse {
            line: line_num,
            message: format!("{message}\nVCF record: {record}"),
        };
        let mut all_alleles: Vec<u16> = Vec::new();
        for sample_field in fields {
            let gt = sample_field.split(':').next().unwrap_or(sample_field);
            let (a1, a2) = gt.split_once('|').ok_or_else(|| {
                invalid(format!("genotype is unphased or haploid: {gt}"))
            })?;
            for allele_str in [a1, a2] {
                if allele_str == "." {
                    return Err(invalid(format!("missing allele in genotype: {gt}")));
                }
                let allele: u16 = allele_str.parse().map_err(|_| {
                    invalid(format!("invalid allele in genotype: {gt}"))
                })?;
                if allele >= n_alleles {
                    return Err(invalid(format!(
                        "allele {allele} out of range for {n_alleles} alleles"
                    )));
                }
                all_alleles.push(allele);
            }
        }
        if all_alleles.len() != 2 * self.n_input_samples {
            return Err(invalid(format!(
                "expected {} genotype fields, found {}",
                self.n_input_samples,
                all_alleles.len() / 2
            )));
        }
        match &self.include_sample_indices {
            None => Ok(all_alleles),
            Some(include) => {
                let mut filtered = Vec::with_capacity(include.len() * 2);
                for &j in include {
                    filtered.push(all_alleles[2 * j]);
                    filtered.push(all_alleles[2 * j + 1]);
                }
                Ok(filtered)
            }
        }
    }
}

/// Reuse one allocation per chromosome name; the list stays tiny
fn intern_chrom(chrom_names: &mut Vec<Arc<str>>, name: &str) -> Arc<str> {
    match chrom_names.iter().find(|c| c.as_ref() == name) {
        Some(existing) => Arc::clone(existing),
        None => {
            let interned: Arc<str> = Arc::from(name);
            chrom_names.push(Arc::clone(&interned));
            interned
        }
    }
}

fn next_field<'b>(
    fields: &mut impl Iterator<Item = &'b str>,
    name: &str,
    line_num: usize,
) -> Result<&'b str> {
    fields
        .next()
        .ok_or_else(|| IbdclustError::parse(line_num, format!("missing {name} field")))
}

impl PhasedRecordSource for VcfReader {
    fn samples(&self) -> Arc<Samples> {
        Arc::clone(&self.samples)
    }

    fn next_record(&mut self) -> Result<Option<PhasedRecord>> {
        self.parse_record()
    }
}
