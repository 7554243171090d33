//! # Clustering Pipeline
//!
//! Orchestrates the per-chromosome workflow:
//! 1. Assemble the analysis context (coordinate arrays, IBS probability
//!    tables)
//! 2. Discover seed IBS segments with interleaved PBWT scans
//! 3. Refine each seed into a trimmed IBD segment, drawing estimators
//!    from a shared pool
//! 4. At each output position, union the haplotypes covered by a
//!    surviving segment and emit the partition
//!
//! Each parallel stage re-collects its output in a deterministic order
//! before the next stage consumes it, so a fixed seed yields
//! byte-identical output.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crossbeam_queue::SegQueue;
use rayon::prelude::*;
use tracing::info;

use crate::config::Config;
use crate::data::genetic_map::PlinkGenMap;
use crate::data::haplotype::Samples;
use crate::error::Result;
use crate::io::{bgzf, Bref3Reader, ChromReader, ClusterWriter, PhasedRecordSource, VcfReader};
use crate::model::chrom_data::ChromData;
use crate::model::ibd_estimator::IbdEstimator;
use crate::model::ibs_segments::IbsSegments;
use crate::model::segment::HapPairSegment;
use crate::pipelines::partition::{Partition, Position};
use crate::utils::stats::RunStats;

/// Run the full clustering analysis and return its statistics
pub fn run(config: &Config) -> Result<RunStats> {
    let stats = RunStats::new();
    let exclude_samples = load_id_file(config.excludesamples.as_deref())?;
    let exclude_markers = load_id_file(config.excludemarkers.as_deref())?;
    let restrict_chrom = config.chrom_interval().map(|ci| ci.chrom);
    let gen_map = PlinkGenMap::from_file(&config.map, restrict_chrom.as_deref())?;

    let source = open_source(config, &exclude_samples, exclude_markers)?;
    let mut reader = ChromReader::new(config, source, &gen_map)?;
    let mut writer = ClusterWriter::create(&config.out_clusters())?;
    writer.write_text(&header_line(reader.samples()))?;
    stats.set_n_samples(reader.samples().len() as u64);

    while let Some(block) = reader.next_chrom()? {
        info!(
            chrom = %block.chrom(),
            markers = block.n_markers(),
            "analyzing chromosome"
        );
        let data = ChromData::new(config, block, &gen_map)?;
        let ibd_segs = ibd_segments(config, &data);
        cluster_haps(config, &data, &stats, ibd_segs, &mut writer)?;
    }
    writer.finish()?;
    stats.add_markers(reader.n_markers());
    stats.add_filtered_markers(reader.n_filtered_markers());
    Ok(stats)
}

/// Open the record source for the `gt` input, choosing the format by
/// file suffix
fn open_source(
    config: &Config,
    exclude_samples: &HashSet<String>,
    exclude_markers: HashSet<String>,
) -> Result<Box<dyn PhasedRecordSource>> {
    let path = &config.gt;
    if path.extension().map(|e| e == "bref3").unwrap_or(false) {
        Ok(Box::new(Bref3Reader::open(
            path,
            exclude_samples,
            exclude_markers,
        )?))
    } else {
        Ok(Box::new(VcfReader::open(
            path,
            exclude_samples,
            exclude_markers,
        )?))
    }
}

/// One identifier per line; blank lines and `#` comments are ignored
fn load_id_file(path: Option<&Path>) -> Result<HashSet<String>> {
    let mut ids = HashSet::new();
    if let Some(path) = path {
        let reader = BufReader::new(File::open(path)?);
        for line in reader.lines() {
            let line = line?;
            let id = line.trim();
            if !id.is_empty() && !id.starts_with('#') {
                ids.insert(id.to_string());
            }
        }
    }
    Ok(ids)
}

fn header_line(samples: &Samples) -> Vec<u8> {
    let mut line = b"CHROM\tPOS\tCM".to_vec();
    for id in samples.ids() {
        line.push(b'\t');
        line.extend_from_slice(id.as_bytes());
    }
    line.push(b'\n');
    line
}

/// Discover seed IBS segments and refine each into a trimmed IBD segment
fn ibd_segments(config: &Config, data: &ChromData) -> Vec<HapPairSegment> {
    let ibs_segs = IbsSegments::new(config, data.block(), data.cm_pos()).hap_pair_segments();
    info!(segments = ibs_segs.len(), "seed IBS segments found");

    // estimator pool: workers poll, use, and push back
    let pool: SegQueue<IbdEstimator<'_>> = SegQueue::new();
    for _ in 0..=config.nthreads() {
        pool.push(IbdEstimator::new(config, data));
    }
    let ibd_segs: Vec<HapPairSegment> = ibs_segs
        .par_iter()
        .map(|seg| {
            let mut est = pool
                .pop()
                .unwrap_or_else(|| IbdEstimator::new(config, data));
            let ibd = est.ibd_segment(seg);
            pool.push(est);
            ibd
        })
        .filter(|seg| !seg.is_zero_length())
        .collect();
    info!(segments = ibd_segs.len(), "IBD segments retained");
    ibd_segs
}

/// Emit the haplotype partition at each output position, in windows of
/// `out_window_size` loci
fn cluster_haps(
    config: &Config,
    data: &ChromData,
    stats: &RunStats,
    mut ibd_segs: Vec<HapPairSegment>,
    writer: &mut ClusterWriter,
) -> Result<()> {
    ibd_segs.par_sort_unstable_by(HapPairSegment::interval_cmp);
    record_discord_rate(data, stats, &ibd_segs);

    let sites_per_window = config.out_window_size as i64;
    let out_morgans = 0.01 * config.out_cm as f64;
    let start_morgans = data.morgan_pos()[0];
    let end_morgans = data.morgan_pos()[data.n_markers() - 1];
    let from_step = (start_morgans / out_morgans).ceil() as i64;
    let to_step = (end_morgans / out_morgans).ceil() as i64; // exclusive end
    stats.add_output_positions((to_step - from_step).max(0) as u64);

    let mut start = from_step;
    while start < to_step {
        let end = (start + sites_per_window).min(to_step);
        let mut partitions: Vec<Partition> = (start..end)
            .into_par_iter()
            .map(|j| cluster(data, j as f64 * out_morgans, &ibd_segs))
            .collect();
        stats.add_ibd_sets(partitions.iter().map(|p| p.n_sets() as u64).sum());
        write_partitions(&mut partitions, data.chrom(), config.nthreads(), writer)?;
        let min_incl_end = data.morgan_to_base(end as f64 * out_morgans);
        ibd_segs = ibd_segs
            .into_par_iter()
            .filter(|seg| seg.incl_end_pos >= min_incl_end)
            .collect();
        start = end;
    }
    Ok(())
}

/// The partition at one output locus: union every haplotype pair whose
/// segment covers the locus. Segments are interval-sorted, so iteration
/// stops at the first segment starting past the locus.
fn cluster(data: &ChromData, morgan_pos: f64, ibd_segs: &[HapPairSegment]) -> Partition {
    let base_pos = data.morgan_to_base(morgan_pos);
    let position = Position {
        pos: base_pos,
        cm: 100.0 * morgan_pos,
    };
    let mut partition = Partition::new(position, data.block().n_haps());
    for seg in ibd_segs {
        if seg.start_pos > base_pos {
            break;
        }
        if base_pos <= seg.incl_end_pos {
            partition.union(seg.hap1 as usize, seg.hap2 as usize);
        }
    }
    partition
}

/// Count allele discordances inside every surviving trimmed IBD segment
fn record_discord_rate(data: &ChromData, stats: &RunStats, ibd_segs: &[HapPairSegment]) {
    ibd_segs.par_iter().for_each(|seg| {
        let base_pos = data.base_pos();
        let start_marker = base_pos.partition_point(|&p| p < seg.start_pos);
        let end_marker = base_pos.partition_point(|&p| p <= seg.incl_end_pos);
        if start_marker < end_marker {
            let block = data.block();
            let mut discord_cnt = 0u64;
            for m in start_marker..end_marker {
                if block.allele(m, seg.hap1 as usize) != block.allele(m, seg.hap2 as usize) {
                    discord_cnt += 1;
                }
            }
            stats.update_discord_rate(discord_cnt, (end_marker - start_marker) as u64);
        }
    });
}

/// Split a window's partitions into per-thread batches, compress each
/// batch to BGZF members in parallel, and write the batches in order
fn write_partitions(
    partitions: &mut [Partition],
    chrom: &str,
    n_threads: usize,
    writer: &mut ClusterWriter,
) -> Result<()> {
    let batch_size = partitions.len().div_ceil(n_threads.max(1));
    if batch_size == 0 {
        return Ok(());
    }
    let compressed: Vec<Result<Vec<u8>>> = partitions
        .par_chunks_mut(batch_size)
        .map(|batch| {
            let mut text = Vec::with_capacity(batch.len() << 8);
            for partition in batch {
                partition.write(chrom, &mut text)?;
            }
            let mut framed = Vec::new();
            bgzf::write_bgzf_members(&text, &mut framed)?;
            Ok(framed)
        })
        .collect();
    for framed in compressed {
        writer.write_framed(&framed?)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::chrom_data::testing::test_chrom_data;

    #[test]
    fn test_cluster_unions_covering_segments() {
        let rows: Vec<Vec<u16>> = (0..5).map(|_| vec![0, 1, 0, 1]).collect();
        let positions = [10_000, 20_000, 30_000, 40_000, 50_000];
        let config = Config::test_default();
        let data = test_chrom_data(&rows, &positions, &config);

        let segs = vec![
            HapPairSegment::new(0, 2, 10_000, 30_000),
            HapPairSegment::new(1, 3, 25_000, 50_000),
        ];
        // locus at 20 kb: only the first segment covers it
        let m = data.base_to_morgan(20_000);
        let mut partition = cluster(&data, m, &segs);
        assert_eq!(partition.n_sets(), 3);
        assert_eq!(partition.find(0), partition.find(2));
        assert_ne!(partition.find(1), partition.find(3));

        // locus at 28 kb: both segments cover it
        let m = data.base_to_morgan(28_000);
        let mut partition = cluster(&data, m, &segs);
        assert_eq!(partition.n_sets(), 2);
        assert_eq!(partition.find(1), partition.find(3));
    }

    #[test]
    fn test_discord_rate_counts_markers_in_span() {
        // haplotypes 0 and 1 disagree at marker 2 only
        let rows = vec![
            vec![0, 0, 0, 0],
            vec![0, 0, 1, 1],
            vec![0, 1, 0, 1],
            vec![0, 0, 1, 1],
            vec![1, 1, 0, 0],
        ];
        let positions = [10_000, 20_000, 30_000, 40_000, 50_000];
        let config = Config::test_default();
        let data = test_chrom_data(&rows, &positions, &config);
        let stats = RunStats::new();
        let segs = vec![HapPairSegment::new(0, 1, 15_000, 45_000)];
        record_discord_rate(&data, &stats, &segs);
        // markers 1..=3 are inside the segment; one is discordant
        assert!((stats.discord_rate() - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_header_line() {
        let samples = Samples::from_ids(vec!["A".to_string(), "B".to_string()]);
        assert_eq!(header_line(&samples), b"CHROM\tPOS\tCM\tA\tB\n");
    }
}
