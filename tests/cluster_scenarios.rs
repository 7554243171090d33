//! End-to-end clustering scenarios over small synthetic data sets.
//!
//! Each test writes a VCF and PLINK map into a temporary directory, runs
//! the full pipeline through the library API, and checks the decompressed
//! cluster output.

use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;

use ibdclust::config::Config;
use ibdclust::pipelines;
use ibdclust::utils::RunStats;

/// A parsed output line: locus cM position and per-sample haplotype
/// cluster indices
struct OutLine {
    cm: f64,
    hap_clusters: Vec<(u32, u32)>,
}

struct TestRun {
    _dir: tempfile::TempDir,
    out_prefix: PathBuf,
    stats: RunStats,
}

impl TestRun {
    fn lines(&self) -> (String, Vec<OutLine>) {
        let bytes = std::fs::read(self.out_prefix.with_extension("ibdclust.gz")).unwrap();
        let mut text = String::new();
        MultiGzDecoder::new(&bytes[..])
            .read_to_string(&mut text)
            .unwrap();
        let mut lines = text.lines();
        let header = lines.next().expect("header line").to_string();
        let parsed = lines
            .map(|line| {
                let mut fields = line.split('\t');
                let _chrom = fields.next().unwrap();
                let _pos: i64 = fields.next().unwrap().parse().unwrap();
                let cm: f64 = fields.next().unwrap().parse().unwrap();
                let hap_clusters = fields
                    .map(|col| {
                        let (a, b) = col.split_once('|').expect("phased cluster column");
                        (a.parse().unwrap(), b.parse().unwrap())
                    })
                    .collect();
                OutLine { cm, hap_clusters }
            })
            .collect();
        (header, parsed)
    }
}

/// Write a VCF with one marker per row of `alleles` and run the pipeline.
/// Marker `j` sits at base position `positions[j]`; the map runs at
/// 1 cM per 10 kb from base 100 to base 10,000,100.
fn run_pipeline(
    sample_ids: &[&str],
    positions: &[i32],
    alleles: &[Vec<u16>],
    extra_args: &[&str],
) -> TestRun {
    let dir = tempfile::tempdir().unwrap();
    let vcf_path = dir.path().join("input.vcf");
    let map_path = dir.path().join("plink.map");
    let out_prefix = dir.path().join("run");

    write_vcf(&vcf_path, sample_ids, positions, alleles);
    std::fs::write(&map_path, "1 . 0.0 100\n1 . 1000.0 10000100\n").unwrap();

    let mut args: Vec<String> = vec![
        format!("gt={}", vcf_path.display()),
        format!("map={}", map_path.display()),
        format!("out={}", out_prefix.display()),
        "nthreads=2".to_string(),
        "seed=42".to_string(),
    ];
    args.extend(extra_args.iter().map(|s| s.to_string()));
    let config = Config::from_key_value_args(args).expect("valid configuration");
    let stats = pipelines::run(&config).expect("pipeline run");
    TestRun {
        _dir: dir,
        out_prefix,
        stats,
    }
}

fn write_vcf(path: &Path, sample_ids: &[&str], positions: &[i32], alleles: &[Vec<u16>]) {
    let mut text = String::from("##fileformat=VCFv4.2\n");
    text.push_str("#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT");
    for id in sample_ids {
        text.push('\t');
        text.push_str(id);
    }
    text.push('\n');
    for (j, row) in alleles.iter().enumerate() {
        assert_eq!(row.len(), 2 * sample_ids.len());
        let max_allele = row.iter().copied().max().unwrap_or(0).max(1);
        let alt: Vec<&str> = ["C", "G", "T"][..max_allele as usize].to_vec();
        text.push_str(&format!(
            "1\t{}\trs{}\tA\t{}\t.\tPASS\t.\tGT",
            positions[j],
            j,
            alt.join(",")
        ));
        for s in 0..sample_ids.len() {
            text.push_str(&format!("\t{}|{}", row[2 * s], row[2 * s + 1]));
        }
        text.push('\n');
    }
    std::fs::write(path, text).unwrap();
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn single_marker_yields_no_output_positions() {
    // One marker, two samples with genotypes 0|1 and 1|0: no IBS segment
    // can reach min-ibs-cm, and a single marker spans zero output steps.
    let run = run_pipeline(
        &["S1", "S2"],
        &[5_000],
        &[vec![0, 1, 1, 0]],
        &[],
    );
    let (header, lines) = run.lines();
    assert_eq!(header, "CHROM\tPOS\tCM\tS1\tS2");
    assert!(lines.is_empty());
    assert_eq!(run.stats.n_output_positions(), 0);
    assert_eq!(run.stats.n_markers(), 1);
}

#[test]
fn identical_haplotypes_form_one_cluster() {
    // Four samples, eight identical haplotypes over 10 cM: every interior
    // output locus reports a single cluster.
    let positions: Vec<i32> = (0..101).map(|k| 1_000 * (k + 1)).collect();
    let alleles: Vec<Vec<u16>> = (0..101).map(|_| vec![0u16; 8]).collect();
    let run = run_pipeline(
        &["S1", "S2", "S3", "S4"],
        &positions,
        &alleles,
        &["min-maf=0.0"],
    );
    let (_, lines) = run.lines();
    assert!(!lines.is_empty());
    let interior: Vec<&OutLine> = lines
        .iter()
        .filter(|l| l.cm > 1.2 && l.cm < 9.0)
        .collect();
    assert!(!interior.is_empty());
    for line in interior {
        assert_eq!(line.hap_clusters.len(), 4);
        for &(a, b) in &line.hap_clusters {
            assert_eq!(a, 0, "locus at {} cM not fully clustered", line.cm);
            assert_eq!(b, 0);
        }
    }
}

#[test]
fn clean_break_splits_clusters() {
    // Haplotypes 0-3 share alleles for the first 5 cM, then each carries
    // its own constant sequence; ten further samples are mutually diverse
    // throughout, giving the length model a realistic background.
    // Interior loci before the break put the four focal haplotypes into
    // one cluster; loci past the break (plus trim) are all singletons.
    let n_samples = 12usize;
    let n_markers = 201usize; // 500 bp spacing, 0.05 cM per marker
    let positions: Vec<i32> = (0..n_markers as i32).map(|k| 500 * (k + 1)).collect();
    let break_marker = 100usize; // ~5 cM
    let alleles: Vec<Vec<u16>> = (0..n_markers)
        .map(|m| {
            (0..2 * n_samples)
                .map(|h| match h {
                    0..=3 if m < break_marker => 0u16,
                    0..=3 => h as u16,
                    _ => 2 + background_bit(h, m),
                })
                .collect()
        })
        .collect();
    let ids: Vec<String> = (0..n_samples).map(|j| format!("S{j}")).collect();
    let id_refs: Vec<&str> = ids.iter().map(|s| s.as_str()).collect();
    let run = run_pipeline(&id_refs, &positions, &alleles, &["min-maf=0.0", "trim=0.2"]);
    let (_, lines) = run.lines();

    // Loci where the focal quartet clusters together must exist, must all
    // lie before the break, and must show one focal cluster plus twenty
    // background singletons.
    let mut expected_joined = vec![(0u32, 0u32), (0, 0)];
    expected_joined.extend((0..10).map(|j| (2 * j + 1, 2 * j + 2)));
    let joined: Vec<&OutLine> = lines
        .iter()
        .filter(|l| l.hap_clusters[0] == (0, 0) && l.hap_clusters[1] == (0, 0))
        .collect();
    assert!(!joined.is_empty(), "no loci joined the focal quartet");
    for line in &joined {
        assert!(
            line.cm < 5.2,
            "focal quartet still clustered at {} cM, past the break",
            line.cm
        );
        assert_eq!(
            line.hap_clusters, expected_joined,
            "unexpected clusters at {} cM",
            line.cm
        );
    }

    // past the break (plus trim margin) every haplotype is a singleton
    let expected_after: Vec<(u32, u32)> = (0..n_samples as u32).map(|s| (2 * s, 2 * s + 1)).collect();
    let after: Vec<&OutLine> = lines.iter().filter(|l| l.cm > 6.6 && l.cm < 9.4).collect();
    assert!(!after.is_empty());
    for line in after {
        assert_eq!(
            line.hap_clusters, expected_after,
            "expected all singletons at {} cM",
            line.cm
        );
    }
}

/// Deterministic pseudo-random bit for background haplotypes
fn background_bit(h: usize, m: usize) -> u16 {
    let x = (h as u64).wrapping_mul(0x9E3779B97F4A7C15)
        ^ (m as u64).wrapping_mul(0xC2B2AE3D27D4EB4F);
    (x.count_ones() & 1) as u16
}

#[test]
fn gene_conversion_discordances_do_not_split_segment() {
    // Haplotypes 0 and 1 are IBS across 4 cM except at three adjacent
    // markers spanning 200 bp. The rest of the cohort is mutually diverse,
    // so sustained IBS is empirically rare and the gene-conversion discord
    // model must keep the pair in one cluster across the whole interior,
    // including at the discordant markers themselves.
    let n_samples = 250usize;
    let n_markers = 401usize; // 100 bp spacing, 4 cM
    let positions: Vec<i32> = (0..n_markers as i32).map(|k| 100 * (k + 1) + 1_000).collect();
    let alleles: Vec<Vec<u16>> = (0..n_markers)
        .map(|m| {
            (0..2 * n_samples)
                .map(|h| match h {
                    0 => 0u16,
                    1 => {
                        if (200..=202).contains(&m) {
                            1
                        } else {
                            0
                        }
                    }
                    _ => 2 * background_bit(h, m),
                })
                .collect()
        })
        .collect();
    let ids: Vec<String> = (0..n_samples).map(|j| format!("S{j}")).collect();
    let id_refs: Vec<&str> = ids.iter().map(|s| s.as_str()).collect();
    let run = run_pipeline(
        &id_refs,
        &positions,
        &alleles,
        &["min-maf=0.0", "gc-bases=1000", "gc-discord=0.1", "discord=0.0005"],
    );
    let (_, lines) = run.lines();
    let interior: Vec<&OutLine> = lines.iter().filter(|l| l.cm > 1.0 && l.cm < 3.0).collect();
    assert!(!interior.is_empty());
    for line in interior {
        let (a, b) = line.hap_clusters[0];
        assert_eq!(a, b, "sample 0 haplotypes split at {} cM", line.cm);
    }
}

#[test]
fn runs_are_deterministic_for_a_fixed_seed() {
    let n_markers = 80usize;
    let positions: Vec<i32> = (0..n_markers as i32).map(|k| 1_000 * (k + 1)).collect();
    // a mix of shared and distinct stretches over 12 haplotypes
    let alleles: Vec<Vec<u16>> = (0..n_markers)
        .map(|m| {
            (0..12)
                .map(|h| (((h / 4) + m * (h % 3)) % 2) as u16)
                .collect()
        })
        .collect();
    let run_a = run_pipeline(
        &["S1", "S2", "S3", "S4", "S5", "S6"],
        &positions,
        &alleles,
        &["min-maf=0.0"],
    );
    let run_b = run_pipeline(
        &["S1", "S2", "S3", "S4", "S5", "S6"],
        &positions,
        &alleles,
        &["min-maf=0.0"],
    );
    let bytes_a = std::fs::read(run_a.out_prefix.with_extension("ibdclust.gz")).unwrap();
    let bytes_b = std::fs::read(run_b.out_prefix.with_extension("ibdclust.gz")).unwrap();
    assert_eq!(bytes_a, bytes_b);
}

#[test]
fn every_output_position_is_emitted_once() {
    let n_samples = 20usize;
    let n_markers = 150usize;
    let positions: Vec<i32> = (0..n_markers as i32).map(|k| 1_000 * (k + 1)).collect();
    let alleles: Vec<Vec<u16>> = (0..n_markers)
        .map(|m| {
            (0..2 * n_samples)
                .map(|h| (((h * 7 + m * 3) >> 2) % 2) as u16)
                .collect()
        })
        .collect();
    let ids: Vec<String> = (0..n_samples).map(|j| format!("S{j}")).collect();
    let id_refs: Vec<&str> = ids.iter().map(|s| s.as_str()).collect();
    let run = run_pipeline(&id_refs, &positions, &alleles, &["min-maf=0.0"]);
    let (header, lines) = run.lines();

    assert_eq!(header.split('\t').count(), 3 + n_samples);
    assert_eq!(lines.len() as u64, run.stats.n_output_positions());
    let mut last_cm = f64::MIN;
    for line in &lines {
        assert!(line.cm > last_cm, "output loci not in ascending order");
        last_cm = line.cm;
        assert_eq!(line.hap_clusters.len(), n_samples);
        for &(a, b) in &line.hap_clusters {
            assert!((a as usize) < 2 * n_samples);
            assert!((b as usize) < 2 * n_samples);
        }
    }
}

#[test]
fn excluded_samples_are_absent_from_output() {
    let dir = tempfile::tempdir().unwrap();
    let vcf_path = dir.path().join("input.vcf");
    let map_path = dir.path().join("plink.map");
    let exclude_path = dir.path().join("exclude.txt");
    let out_prefix = dir.path().join("run");

    let positions: Vec<i32> = (0..30).map(|k| 1_000 * (k + 1)).collect();
    let alleles: Vec<Vec<u16>> = (0..30).map(|m| vec![0, 1, (m % 2) as u16, 0, 1, 1]).collect();
    write_vcf(&vcf_path, &["S1", "S2", "S3"], &positions, &alleles);
    std::fs::write(&map_path, "1 . 0.0 100\n1 . 1000.0 10000100\n").unwrap();
    std::fs::write(&exclude_path, "S2\n").unwrap();

    let config = Config::from_key_value_args([
        format!("gt={}", vcf_path.display()),
        format!("map={}", map_path.display()),
        format!("out={}", out_prefix.display()),
        format!("excludesamples={}", exclude_path.display()),
        "min-maf=0.0".to_string(),
        "nthreads=1".to_string(),
    ])
    .unwrap();
    let stats = pipelines::run(&config).unwrap();
    assert_eq!(stats.n_samples(), 2);

    let bytes = std::fs::read(out_prefix.with_extension("ibdclust.gz")).unwrap();
    let mut text = String::new();
    MultiGzDecoder::new(&bytes[..])
        .read_to_string(&mut text)
        .unwrap();
    let header = text.lines().next().unwrap();
    assert_eq!(header, "CHROM\tPOS\tCM\tS1\tS3");
}
