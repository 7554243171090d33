//! # bref3 Reading
//!
//! Streams phased genotype records from a bref3 (binary reference format,
//! version 3) file through the same record-source contract as the VCF
//! reader.
//!
//! File structure:
//! - magic number (4 bytes, big-endian 2055763188)
//! - program string (length-prefixed UTF-8)
//! - sample ID array
//! - data blocks until an end-of-data sentinel (0)
//!
//! Each block carries a chromosome name, the haplotype-to-sequence map for
//! its sequence-coded records, and `n_recs` records that are either
//! sequence-coded (one allele per distinct sequence) or allele-coded
//! (carrier lists per allele, `-1` marking the unlisted major allele).

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use crate::data::haplotype::Samples;
use crate::data::marker::Marker;
use crate::error::{IbdclustError, Result};
use crate::io::{PhasedRecord, PhasedRecordSource};

const BREF3_MAGIC: i32 = 2055763188;
const END_OF_DATA: i32 = 0;
const SEQ_CODED: u8 = 0;
const ALLELE_CODED: u8 = 1;

/// State of the block currently being streamed
struct BlockState {
    chrom: Arc<str>,
    n_seq: usize,
    hap_to_seq: Vec<u16>,
    recs_left: usize,
}

/// Streaming bref3 record reader
pub struct Bref3Reader {
    reader: BufReader<File>,
    samples: Arc<Samples>,
    include_sample_indices: Option<Vec<usize>>,
    n_input_haps: usize,
    exclude_marker_ids: HashSet<String>,
    block: Option<BlockState>,
    finished: bool,
}

impl Bref3Reader {
    /// Open a bref3 file and read its header
    pub fn open(
        path: &Path,
        exclude_samples: &HashSet<String>,
        exclude_marker_ids: HashSet<String>,
    ) -> Result<Self> {
        let file = File::open(path).map_err(|_| IbdclustError::FileNotFound {
            path: path.to_path_buf(),
        })?;
        let mut reader = BufReader::new(file);

        let magic = read_be_i32(&mut reader)?;
        if magic != BREF3_MAGIC {
            return Err(IbdclustError::bref3(format!(
                "invalid magic number: expected {BREF3_MAGIC}, got {magic}"
            )));
        }
        let _program = read_utf8_string(&mut reader)?;
        let all_sample_ids = read_string_array(&mut reader)?;
        let n_input_haps = all_sample_ids.len() * 2;

        let (samples, include_sample_indices) = if exclude_samples.is_empty() {
            (Samples::from_ids(all_sample_ids), None)
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
            return Err(IbdclustError::bref3("no samples remain after exclusion"));
        }

        Ok(Self {
            reader,
            samples: Arc::new(samples),
            include_sample_indices,
            n_input_haps,
            exclude_marker_ids,
            block: None,
            finished: false,
        })
    }

    fn start_next_block(&mut self) -> Result<bool> {
        let n_recs = read_be_i32(&mut self.reader)?;
        if n_recs == END_OF_DATA {
            self.finished = true;
            return Ok(false);
        }
        if n_recs < 0 {
            return Err(IbdclustError::bref3(format!(
                "invalid record count: {n_recs}"
            )));
        }
        let chrom: Arc<str> = Arc::from(read_utf8_string(&mut self.reader)?);
        let n_seq = read_be_u16(&mut self.reader)? as usize;
        let mut hap_to_seq = vec![0u16; self.n_input_haps];
        for value in hap_to_seq.iter_mut() {
            *value = read_be_u16(&mut self.reader)?;
        }
        self.block = Some(BlockState {
            chrom,
            n_seq,
            hap_to_seq,
            recs_left: n_recs as usize,
        });
        Ok(true)
    }

    fn read_record(&mut self) -> Result<PhasedRecord> {
        let (pos, id, n_alleles) = self.read_marker()?;
        let flag = read_byte(&mut self.reader)?;
        let (chrom, n_seq) = match &self.block {
            Some(block) => (Arc::clone(&block.chrom), block.n_seq),
            None => return Err(IbdclustError::bref3("record outside a block")),
        };
        let alleles = match flag {
            SEQ_CODED => {
                let mut seq_to_allele = vec![0u8; n_seq];
                self.reader.read_exact(&mut seq_to_allele)?;
                match &self.block {
                    None => return Err(IbdclustError::bref3("record outside a block")),
                    Some(block) => {
                        let mut alleles = Vec::with_capacity(self.n_input_haps);
                        for &seq in &block.hap_to_seq {
                            let allele = seq_to_allele.get(seq as usize).ok_or_else(|| {
                                IbdclustError::bref3(format!(
                                    "sequence index {seq} out of range"
                                ))
                            })?;
                            alleles.push(*allele as u16);
                        }
                        alleles
                    }
                }
            }
            ALLELE_CODED => self.read_allele_coded(n_alleles)?,
            _ => {
                return Err(IbdclustError::bref3(format!(
                    "unknown record type flag: {flag}"
                )))
            }
        };
        let alleles = match &self.include_sample_indices {
            None => alleles,
            Some(include) => {
                let mut filtered = Vec::with_capacity(include.len() * 2);
                for &j in include {
                    filtered.push(alleles[2 * j]);
                    filtered.push(alleles[2 * j + 1]);
                }
                filtered
            }
        };
        Ok(PhasedRecord {
            chrom,
            marker: Marker::new(pos, id, n_alleles),
            alleles,
        })
    }

    /// Marker info: position, joined IDs, and allele count. SNV allele
    /// codes pack the allele count into the low two bits; other markers
    /// carry an explicit allele string array and END field.
    fn read_marker(&mut self) -> Result<(i32, Option<Arc<str>>, u16)> {
        let pos = read_be_i32(&mut self.reader)?;
        let n_ids = read_byte(&mut self.reader)? as usize;
        let id = if n_ids == 0 {
            None
        } else {
            let mut ids = Vec::with_capacity(n_ids);
            for _ in 0..n_ids {
                ids.push(read_utf8_string(&mut self.reader)?);
            }
            Some(Arc::from(ids.join(";")))
        };
        let allele_code = read_byte(&mut self.reader)? as i8;
        let n_alleles = if allele_code == -1 {
            let allele_strs = read_string_array(&mut self.reader)?;
            let _end = read_be_i32(&mut self.reader)?;
            allele_strs.len() as u16
        } else {
            1 + (allele_code & 0b11) as u16
        };
        Ok((pos, id, n_alleles))
    }

    /// Carrier lists per allele; the allele recorded with count `-1` is
    /// the major allele carried by every unlisted haplotype.
    fn read_allele_coded(&mut self, n_alleles: u16) -> Result<Vec<u16>> {
        let mut carriers: Vec<Option<Vec<u32>>> = Vec::with_capacity(n_alleles as usize);
        let mut major_allele: Option<u16> = None;
        for allele in 0..n_alleles {
            let count = read_be_i32(&mut self.reader)?;
            if count == -1 {
                if major_allele.is_some() {
                    return Err(IbdclustError::bref3(
                        "multiple major alleles in allele-coded record",
                    ));
                }
                major_allele = Some(allele);
                carriers.push(None);
            } else {
                let mut list = Vec::with_capacity(count.max(0) as usize);
                for _ in 0..count {
                    list.push(read_be_i32(&mut self.reader)? as u32);
                }
                carriers.push(Some(list));
            }
        }
        let major = major_allele.ok_or_else(|| {
            IbdclustError::bref3("allele-coded record has no major allele")
        })?;
        let mut alleles = vec![major; self.n_input_haps];
        for (allele, list) in carriers.iter().enumerate() {
            if let Some(list) = list {
                for &hap in list {
                    let slot = alleles.get_mut(hap as usize).ok_or_else(|| {
                        IbdclustError::bref3(format!("haplotype index {hap} out of range"))
                    })?;
                    *slot = allele as u16;
                }
            }
        }
        Ok(alleles)
    }

    fn is_excluded(&self, record: &PhasedRecord) -> bool {
        if self.exclude_marker_ids.is_empty() {
            return false;
        }
        record
            .marker
            .id
            .as_deref()
            .is_some_and(|id| self.exclude_marker_ids.contains(id))
            || self
                .exclude_marker_ids
                .contains(&format!("{}:{}", record.chrom, record.marker.pos))
    }
}

impl PhasedRecordSource for Bref3Reader {
    fn samples(&self) -> Arc<Samples> {
        Arc::clone(&self.samples)
    }

    fn next_record(&mut self) -> Result<Option<PhasedRecord>> {
        loop {
            if self.finished {
                return Ok(None);
            }
            let has_record = match &mut self.block {
                Some(block) if block.recs_left > 0 => {
                    block.recs_left -= 1;
                    true
                }
                _ => false,
            };
            if has_record {
                let record = self.read_record()?;
                if self.is_excluded(&record) {
                    continue;
                }
                return Ok(Some(record));
            } else if !self.start_next_block()? {
                return Ok(None);
            }
        }
    }
}

fn read_be_i32<R: Read>(reader: &mut R) -> Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_be_bytes(buf))
}

fn read_be_u16<R: Read>(reader: &mut R) -> Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

fn read_byte<R: Read>(reader: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Length-prefixed modified UTF-8 string (2-byte big-endian length)
fn read_utf8_string<R: Read>(reader: &mut R) -> Result<String> {
    let len = read_be_u16(reader)? as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| IbdclustError::bref3("invalid UTF-8 string"))
}

fn read_string_array<R: Read>(reader: &mut R) -> Result<Vec<String>> {
    let len = read_be_i32(reader)?;
    if len < 0 {
        return Ok(Vec::new());
    }
    let mut result = Vec::with_capacity(len as usize);
    for _ in 0..len {
        result.push(read_utf8_string(reader)?);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn push_utf8(data: &mut Vec<u8>, s: &str) {
        data.extend_from_slice(&(s.len() as u16).to_be_bytes());
        data.extend_from_slice(s.as_bytes());
    }

    fn bref3_bytes() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&BREF3_MAGIC.to_be_bytes());
        push_utf8(&mut data, "test-writer");
        // sample IDs
        data.extend_from_slice(&2i32.to_be_bytes());
        push_utf8(&mut data, "S1");
        push_utf8(&mut data, "S2");

        // one block with 2 records on chromosome "1"
        data.extend_from_slice(&2i32.to_be_bytes());
        push_utf8(&mut data, "1");
        // hap0,hap2 -> seq0; hap1,hap3 -> seq1
        data.extend_from_slice(&2u16.to_be_bytes());
        for seq in [0u16, 1, 0, 1] {
            data.extend_from_slice(&seq.to_be_bytes());
        }

        // record 1: seq-coded biallelic SNV (allele code 1 => A,C)
        data.extend_from_slice(&100i32.to_be_bytes());
        data.push(1); // one ID
        push_utf8(&mut data, "rs1");
        data.push(0b00000001);
        data.push(SEQ_CODED);
        data.extend_from_slice(&[0u8, 1]); // seq0 -> allele 0, seq1 -> allele 1

        // record 2: allele-coded biallelic SNV, major allele 0, hap 3 carries 1
        data.extend_from_slice(&200i32.to_be_bytes());
        data.push(0); // no IDs
        data.push(0b00000001);
        data.push(ALLELE_CODED);
        data.extend_from_slice(&(-1i32).to_be_bytes()); // allele 0 is major
        data.extend_from_slice(&1i32.to_be_bytes()); // one carrier of allele 1
        data.extend_from_slice(&3i32.to_be_bytes());

        data.extend_from_slice(&END_OF_DATA.to_be_bytes());
        data
    }

    fn open_reader(exclude: HashSet<String>) -> Bref3Reader {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&bref3_bytes()).unwrap();
        Bref3Reader::open(file.path(), &HashSet::new(), exclude).unwrap()
        // the temp file may be unlinked once opened
    }

    #[test]
    fn test_stream_records() {
        let mut r = open_reader(HashSet::new());
        assert_eq!(r.samples().len(), 2);

        let rec = r.next_record().unwrap().unwrap();
        assert_eq!(rec.chrom.as_ref(), "1");
        assert_eq!(rec.marker.pos, 100);
        assert_eq!(rec.marker.id.as_deref(), Some("rs1"));
        assert_eq!(rec.marker.n_alleles, 2);
        assert_eq!(rec.alleles, vec![0, 1, 0, 1]);

        let rec = r.next_record().unwrap().unwrap();
        assert_eq!(rec.marker.pos, 200);
        assert_eq!(rec.alleles, vec![0, 0, 0, 1]);

        assert!(r.next_record().unwrap().is_none());
        assert!(r.next_record().unwrap().is_none());
    }

    #[test]
    fn test_marker_exclusion() {
        let mut exclude = HashSet::new();
        exclude.insert("rs1".to_string());
        let mut r = open_reader(exclude);
        let rec = r.next_record().unwrap().unwrap();
        assert_eq!(rec.marker.pos, 200);
        assert!(r.next_record().unwrap().is_none());
    }

    #[test]
    fn test_bad_magic_is_fatal() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[0, 1, 2, 3, 4, 5]).unwrap();
        let err = Bref3Reader::open(file.path(), &HashSet::new(), HashSet::new());
        assert!(err.is_err());
    }
}
