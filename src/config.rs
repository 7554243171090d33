//! # Configuration Logic
//!
//! Analysis parameters, parsed from `name=value` command line arguments.
//! A thin adapter rewrites each `name=value` token to `--name value` and
//! hands the result to clap, so unknown names, missing required arguments,
//! and malformed values all surface as fatal parse errors.

use clap::Parser;
use std::path::PathBuf;

use crate::error::{IbdclustError, Result};

/// ibdclust: multi-individual IBD clustering from phased genotype data
#[derive(Parser, Debug, Clone)]
#[command(name = "ibdclust")]
#[command(version)]
#[command(disable_help_flag = true)]
pub struct Config {
    // ============ Data Parameters ============
    /// VCF file (.vcf, .vcf.gz, .vcf.bgz) or bref3 file with phased genotypes
    #[arg(long, value_name = "FILE")]
    pub gt: PathBuf,

    /// PLINK map file with cM units
    #[arg(long, value_name = "FILE")]
    pub map: PathBuf,

    /// Output file prefix
    #[arg(long, value_name = "PREFIX")]
    pub out: String,

    /// Chromosome or region [chrom] or [chrom]:[start]-[end]
    #[arg(long, value_name = "REGION")]
    pub chrom: Option<String>,

    /// File with sample IDs to exclude (one per line)
    #[arg(long, value_name = "FILE")]
    pub excludesamples: Option<PathBuf>,

    /// File with marker IDs to exclude (one per line)
    #[arg(long, value_name = "FILE")]
    pub excludemarkers: Option<PathBuf>,

    /// Minimum frequency of each non-major allele
    #[arg(long = "min-maf", default_value_t = 0.1)]
    pub min_maf: f32,

    // ============ Analysis Parameters ============
    /// Minimum cM length of a seed IBS segment
    #[arg(long = "min-ibs-cm", default_value_t = 1.0)]
    pub min_ibs_cm: f32,

    /// Minimum cM length of an estimated IBD segment
    #[arg(long = "min-ibd-cm", default_value_t = 1.0)]
    pub min_ibd_cm: f32,

    /// Number of interleaved PBWT analyses
    #[arg(long, default_value_t = 4)]
    pub pbwt: usize,

    /// cM trimmed from each end of an estimated IBD segment
    #[arg(long, default_value_t = 0.5)]
    pub trim: f32,

    /// Probability of an allele discordance within a true IBD segment
    #[arg(long, default_value_t = 0.0005)]
    pub discord: f32,

    /// cM between consecutive output positions
    #[arg(long = "out-cm", default_value_t = 0.02)]
    pub out_cm: f32,

    /// Number of threads (default: all CPU cores)
    #[arg(long)]
    pub nthreads: Option<usize>,

    /// Random seed for reproducibility
    #[arg(long, default_value_t = -99999, allow_hyphen_values = true)]
    pub seed: i64,

    // ============ Advanced Parameters ============
    /// Effective population size
    #[arg(long, default_value_t = 10000.0)]
    pub ne: f64,

    /// Quantile of the endpoint distribution reported for each segment end
    #[arg(long, default_value_t = 0.5)]
    pub quantile: f32,

    /// Quantile of the endpoint distribution used during iterative
    /// endpoint refinement
    #[arg(long = "prefocus-quantile", default_value_t = 0.5)]
    pub prefocus_quantile: f32,

    /// Base-pair window within which consecutive discordances are treated
    /// as gene conversion
    #[arg(long = "gc-bases", default_value_t = 1000)]
    pub gc_bases: i32,

    /// Probability of a gene-conversion discordance within a true IBD
    /// segment
    #[arg(long = "gc-discord", default_value_t = 0.1)]
    pub gc_discord: f32,

    /// Maximum number of haplotypes sampled for the local IBS counts
    #[arg(long = "local-segments", default_value_t = 10_000)]
    pub local_segments: usize,

    /// Maximum empirical CDF value resolved by the local IBS counts
    #[arg(long = "local-max-cdf", default_value_t = 0.999)]
    pub local_max_cdf: f32,

    /// Number of random loci sampled for the global IBS distribution
    #[arg(long = "global-loci", default_value_t = 100)]
    pub global_loci: usize,

    /// Number of haplotype pairs sampled per global locus
    #[arg(long = "global-segments", default_value_t = 1000)]
    pub global_segments: usize,

    /// Per-locus order statistic used for global outlier filtering
    #[arg(long = "global-quantile", default_value_t = 0.9)]
    pub global_quantile: f32,

    /// Multiple of the median order statistic above which a global locus
    /// is discarded
    #[arg(long = "global-multiple", default_value_t = 10.0)]
    pub global_multiple: f32,

    /// Stop extending an endpoint CDF when the remaining mass falls below
    /// this ratio of the total
    #[arg(long = "min-cdf-ratio", default_value_t = 1e-4)]
    pub min_cdf_ratio: f32,

    /// Maximum endpoint refinement iterations per segment end
    #[arg(long = "max-its", default_value_t = 10)]
    pub max_its: usize,

    /// Morgan extension past the last marker for the hypothetical
    /// terminating discordance
    #[arg(long = "end-morgans", default_value_t = 1.0)]
    pub end_morgans: f64,

    /// Keep the focus position fixed during endpoint refinement
    #[arg(long = "fix-focus", action = clap::ArgAction::Set, default_value_t = false)]
    pub fix_focus: bool,

    /// Minimum relative change of the focus-to-endpoint distance for an
    /// endpoint update to be accepted
    #[arg(long = "max-rel-change", default_value_t = 0.01)]
    pub max_rel_change: f32,

    /// Number of output positions per compressed output window
    #[arg(long = "out-window-size", default_value_t = 500)]
    pub out_window_size: usize,
}

/// A chromosome restriction parsed from the `chrom` parameter
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChromInterval {
    pub chrom: String,
    /// 1-based inclusive start, or `i32::MIN` when unbounded
    pub start: i32,
    /// 1-based inclusive end, or `i32::MAX` when unbounded
    pub incl_end: i32,
}

impl ChromInterval {
    /// Parse `[chrom]` or `[chrom]:[start]-[end]`
    pub fn parse(spec: &str) -> Result<Self> {
        let invalid = || IbdclustError::config(format!("invalid chrom parameter: {spec}"));
        match spec.split_once(':') {
            None => {
                if spec.is_empty() {
                    Err(invalid())
                } else {
                    Ok(Self {
                        chrom: spec.to_string(),
                        start: i32::MIN,
                        incl_end: i32::MAX,
                    })
                }
            }
            Some((chrom, range)) => {
                if chrom.is_empty() {
                    return Err(invalid());
                }
                let (start, end) = range.split_once('-').ok_or_else(invalid)?;
                let start: i32 = start.parse().map_err(|_| invalid())?;
                let incl_end: i32 = end.parse().map_err(|_| invalid())?;
                if start < 1 || incl_end < start {
                    return Err(invalid());
                }
                Ok(Self {
                    chrom: chrom.to_string(),
                    start,
                    incl_end,
                })
            }
        }
    }

    /// Check whether a record at `chrom:pos` falls in the interval
    pub fn contains(&self, chrom: &str, pos: i32) -> bool {
        self.chrom == chrom && self.start <= pos && pos <= self.incl_end
    }
}

impl Config {
    /// Parse `name=value` command line tokens (excluding the program name)
    pub fn from_key_value_args<I>(args: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut rewritten = vec!["ibdclust".to_string()];
        for arg in args {
            let arg: String = arg.into();
            let (name, value) = arg.split_once('=').ok_or_else(|| {
                IbdclustError::config(format!(
                    "arguments must have the format parameter=value: {arg}"
                ))
            })?;
            if name.is_empty() {
                return Err(IbdclustError::config(format!("missing parameter name: {arg}")));
            }
            rewritten.push(format!("--{name}"));
            rewritten.push(value.to_string());
        }
        let config =
            Self::try_parse_from(rewritten).map_err(|e| IbdclustError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// The usage text printed for `help` and argument errors
    pub fn usage() -> String {
        let nl = '\n';
        format!(
            "Syntax: ibdclust [arguments in format: parameter=value]{nl}{nl}\
  gt=<VCF or bref3 file with phased genotypes>       (required){nl}\
  map=<PLINK map file with cM units>                 (required){nl}\
  out=<output file prefix>                           (required){nl}{nl}\
  chrom=< [chrom] or [chrom]:[start]-[end] >         (optional){nl}\
  excludesamples=<file with 1 sample ID per line>    (optional){nl}\
  excludemarkers=<file with 1 marker ID per line>    (optional){nl}\
  min-maf=<min frequency of each non-major allele>   (default=0.1){nl}{nl}\
  min-ibs-cm=<minimum seed IBS segment cM length>    (default=1.0){nl}\
  min-ibd-cm=<minimum IBD segment cM length>         (default=1.0){nl}\
  pbwt=<number of interleaved PBWT analyses>         (default=4){nl}\
  trim=<cM trimmed from each IBD segment end>        (default=0.5){nl}\
  discord=<IBD allele discordance probability>       (default=0.0005){nl}\
  out-cm=<cM between output positions>               (default=0.02){nl}\
  nthreads=<number of threads>                       (default: all CPU cores){nl}\
  seed=<random seed>                                 (default=-99999){nl}"
        )
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if !self.gt.exists() {
            return Err(IbdclustError::FileNotFound {
                path: self.gt.clone(),
            });
        }
        if !self.map.exists() {
            return Err(IbdclustError::FileNotFound {
                path: self.map.clone(),
            });
        }
        for path in [&self.excludesamples, &self.excludemarkers].into_iter().flatten() {
            if !path.exists() {
                return Err(IbdclustError::FileNotFound { path: path.clone() });
            }
        }
        if let Some(ref spec) = self.chrom {
            ChromInterval::parse(spec)?;
        }
        if std::path::Path::new(&self.out).is_dir() {
            return Err(IbdclustError::config(format!(
                "the out parameter cannot be a directory: {}",
                self.out
            )));
        }
        self.validate_parameters()
    }

    /// Validate the numeric parameter bounds (no file system access)
    pub fn validate_parameters(&self) -> Result<()> {
        if !(self.min_maf < 0.5) {
            return Err(IbdclustError::config("min-maf must be less than 0.5"));
        }
        for (name, value) in [
            ("min-ibs-cm", self.min_ibs_cm),
            ("min-ibd-cm", self.min_ibd_cm),
            ("out-cm", self.out_cm),
            ("global-multiple", self.global_multiple),
        ] {
            if !(value > 0.0) {
                return Err(IbdclustError::config(format!("{name} must be positive")));
            }
        }
        if !(self.trim >= 0.0) {
            return Err(IbdclustError::config("trim must be non-negative"));
        }
        if !(self.max_rel_change >= 0.0) {
            return Err(IbdclustError::config("max-rel-change must be non-negative"));
        }
        for (name, value) in [
            ("discord", self.discord),
            ("gc-discord", self.gc_discord),
            ("quantile", self.quantile),
            ("prefocus-quantile", self.prefocus_quantile),
            ("global-quantile", self.global_quantile),
            ("local-max-cdf", self.local_max_cdf),
            ("min-cdf-ratio", self.min_cdf_ratio),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(IbdclustError::config(format!(
                    "{name} must be strictly between 0 and 1"
                )));
            }
        }
        if !(self.ne > 0.0 && self.ne.is_finite()) {
            return Err(IbdclustError::config("ne must be positive and finite"));
        }
        if !(self.end_morgans > 0.0 && self.end_morgans.is_finite()) {
            return Err(IbdclustError::config("end-morgans must be positive and finite"));
        }
        if self.pbwt < 1 {
            return Err(IbdclustError::config("pbwt must be at least 1"));
        }
        if self.max_its < 1 {
            return Err(IbdclustError::config("max-its must be at least 1"));
        }
        if self.gc_bases < 0 {
            return Err(IbdclustError::config("gc-bases must be non-negative"));
        }
        // the cap keeps ordered-pair counts within 32 bits
        if !(2..=45_000).contains(&self.local_segments) {
            return Err(IbdclustError::config(
                "local-segments must be between 2 and 45000",
            ));
        }
        if self.global_loci < 1 || self.global_segments < 2 {
            return Err(IbdclustError::config(
                "global-loci must be at least 1 and global-segments at least 2",
            ));
        }
        if self.out_window_size < 1 {
            return Err(IbdclustError::config("out-window-size must be at least 1"));
        }
        if let Some(n) = self.nthreads {
            if n < 1 {
                return Err(IbdclustError::config("nthreads must be at least 1"));
            }
        }
        Ok(())
    }

    /// The chromosome restriction, if one was specified
    pub fn chrom_interval(&self) -> Option<ChromInterval> {
        self.chrom
            .as_deref()
            .and_then(|spec| ChromInterval::parse(spec).ok())
    }

    /// Number of worker threads
    pub fn nthreads(&self) -> usize {
        self.nthreads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// Path of the primary output file
    pub fn out_clusters(&self) -> PathBuf {
        PathBuf::from(format!("{}.ibdclust.gz", self.out))
    }

    /// Path of the log file
    pub fn out_log(&self) -> PathBuf {
        PathBuf::from(format!("{}.log", self.out))
    }

    /// A configuration with default analysis parameters and placeholder
    /// paths, for unit tests that never touch the file system.
    #[cfg(test)]
    pub fn test_default() -> Self {
        Self {
            gt: PathBuf::from("test.vcf"),
            map: PathBuf::from("test.map"),
            out: "test".to_string(),
            chrom: None,
            excludesamples: None,
            excludemarkers: None,
            min_maf: 0.1,
            min_ibs_cm: 1.0,
            min_ibd_cm: 1.0,
            pbwt: 4,
            trim: 0.5,
            discord: 0.0005,
            out_cm: 0.02,
            nthreads: Some(2),
            seed: -99999,
            ne: 10000.0,
            quantile: 0.5,
            prefocus_quantile: 0.5,
            gc_bases: 1000,
            gc_discord: 0.1,
            local_segments: 10_000,
            local_max_cdf: 0.999,
            global_loci: 100,
            global_segments: 1000,
            global_quantile: 0.9,
            global_multiple: 10.0,
            min_cdf_ratio: 1e-4,
            max_its: 10,
            end_morgans: 1.0,
            fix_focus: false,
            max_rel_change: 0.01,
            out_window_size: 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chrom_interval_parse() {
        let ci = ChromInterval::parse("22").unwrap();
        assert_eq!(ci.chrom, "22");
        assert!(ci.contains("22", 1));
        assert!(!ci.contains("21", 1));

        let ci = ChromInterval::parse("chr1:1000-2000").unwrap();
        assert_eq!(ci.chrom, "chr1");
        assert!(ci.contains("chr1", 1000));
        assert!(ci.contains("chr1", 2000));
        assert!(!ci.contains("chr1", 999));
        assert!(!ci.contains("chr1", 2001));

        assert!(ChromInterval::parse("").is_err());
        assert!(ChromInterval::parse("chr1:10").is_err());
        assert!(ChromInterval::parse("chr1:20-10").is_err());
    }

    #[test]
    fn test_key_value_rejects_bare_tokens() {
        let err = Config::from_key_value_args(["gt"]).unwrap_err();
        assert!(err.to_string().contains("parameter=value"));
    }

    #[test]
    fn test_key_value_rejects_unknown_names() {
        let err =
            Config::from_key_value_args(["gt=a", "map=b", "out=c", "bogus=1"]).unwrap_err();
        assert!(err.to_string().contains("bogus") || err.to_string().contains("unexpected"));
    }

    #[test]
    fn test_validation_bounds() {
        let mut config = Config::test_default();
        config.min_maf = 0.5;
        assert!(config.validate_parameters().is_err());

        let mut config = Config::test_default();
        config.local_segments = 50_000;
        assert!(config.validate_parameters().is_err());

        let mut config = Config::test_default();
        config.quantile = 1.0;
        assert!(config.validate_parameters().is_err());

        // min-ibd-cm below 2*trim is legal
        let mut config = Config::test_default();
        config.min_ibd_cm = 0.5;
        config.trim = 0.5;
        assert!(config.validate_parameters().is_ok());
    }
}
