//! # Application Entry Point
//!
//! Parses `name=value` command line arguments, configures the thread pool
//! and logging, runs the clustering pipeline, and writes the run report
//! to `<out>.log` (mirrored to stdout).

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Local;
use tracing_subscriber::EnvFilter;

use ibdclust::config::Config;
use ibdclust::error::Result;
use ibdclust::pipelines;
use ibdclust::utils::RunStats;

const PROGRAM: &str = concat!("ibdclust  [ version ", env!("CARGO_PKG_VERSION"), " ]");
const HELP_MESSAGE: &str = "Enter \"ibdclust\" with no arguments to print a list of command line arguments";

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() || args[0].to_lowercase().starts_with("help") {
        println!("{PROGRAM}\n");
        println!("{}", Config::usage());
        return;
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let config = match Config::from_key_value_args(args) {
        Ok(config) => config,
        Err(err) => {
            println!("{}", Config::usage());
            eprintln!("ERROR: {err}");
            std::process::exit(1);
        }
    };
    if let Err(err) = check_output_filenames(&config) {
        eprintln!("ERROR: {err}");
        std::process::exit(1);
    }
    if let Err(err) = rayon::ThreadPoolBuilder::new()
        .num_threads(config.nthreads())
        .build_global()
    {
        eprintln!("ERROR: failed to create thread pool: {err}");
        std::process::exit(1);
    }

    if let Err(err) = run(&config) {
        eprintln!("ERROR: {err}");
        std::process::exit(1);
    }
}

fn run(config: &Config) -> Result<()> {
    let mut log = File::create(config.out_log())?;
    let start = Instant::now();
    duo_println(&mut log, &start_info(config))?;

    let stats = pipelines::run(config)?;

    duo_println(&mut log, &statistics(&stats))?;
    duo_println(&mut log, &end_info(start))?;
    Ok(())
}

/// An output file must not collide with an input file
fn check_output_filenames(config: &Config) -> Result<()> {
    let outputs = [config.out_clusters(), config.out_log()];
    let inputs: Vec<&PathBuf> = [
        Some(&config.gt),
        Some(&config.map),
        config.excludesamples.as_ref(),
        config.excludemarkers.as_ref(),
    ]
    .into_iter()
    .flatten()
    .collect();
    for output in &outputs {
        for input in &inputs {
            if same_file(output, input) {
                return Err(ibdclust::IbdclustError::config(format!(
                    "an output file has the same name as an input file: {}",
                    output.display()
                )));
            }
        }
    }
    Ok(())
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Write a string to both stdout and the log file
fn duo_println(log: &mut File, s: &str) -> Result<()> {
    println!("{s}");
    writeln!(log, "{s}")?;
    Ok(())
}

fn start_info(config: &Config) -> String {
    let mut s = String::with_capacity(512);
    s.push_str(HELP_MESSAGE);
    s.push_str("\n\n");
    s.push_str("Program             :  ");
    s.push_str(PROGRAM);
    s.push('\n');
    s.push_str("Start Time          :  ");
    s.push_str(&timestamp());
    s.push('\n');
    s.push('\n');
    s.push_str(&parameters(config));
    s
}

fn parameters(config: &Config) -> String {
    let mut s = String::with_capacity(512);
    s.push_str("Parameters\n");
    s.push_str(&format!("  gt                :  {}\n", config.gt.display()));
    s.push_str(&format!("  map               :  {}\n", config.map.display()));
    s.push_str(&format!("  out               :  {}\n", config.out));
    if let Some(ref path) = config.excludesamples {
        s.push_str(&format!("  excludesamples    :  {}\n", path.display()));
    }
    if let Some(ref path) = config.excludemarkers {
        s.push_str(&format!("  excludemarkers    :  {}\n", path.display()));
    }
    if let Some(ref chrom) = config.chrom {
        s.push_str(&format!("  chrom             :  {chrom}\n"));
    }
    s.push_str(&format!("  min-maf           :  {}\n", config.min_maf));
    s.push_str(&format!("  min-ibs-cm        :  {}\n", config.min_ibs_cm));
    s.push_str(&format!("  min-ibd-cm        :  {}\n", config.min_ibd_cm));
    s.push_str(&format!("  pbwt              :  {}\n", config.pbwt));
    s.push_str(&format!("  trim              :  {}\n", config.trim));
    s.push_str(&format!("  discord           :  {}\n", config.discord));
    s.push_str(&format!("  out-cm            :  {}\n", config.out_cm));
    s.push_str(&format!("  seed              :  {}\n", config.seed));
    s.push_str(&format!("  nthreads          :  {}\n", config.nthreads()));
    s
}

fn statistics(stats: &RunStats) -> String {
    let n_markers = stats.n_markers();
    let n_filtered = stats.n_filtered_markers();
    let percent = if n_markers == 0 {
        0.0
    } else {
        (100.0 * n_filtered as f64) / n_markers as f64
    };
    let mut s = String::with_capacity(512);
    s.push_str("Statistics\n");
    s.push_str(&format!("  samples           :  {}\n", stats.n_samples()));
    s.push_str(&format!("  haplotypes        :  {}\n", stats.n_samples() << 1));
    s.push_str(&format!("  input VCF records :  {n_markers}\n"));
    s.push_str(&format!(
        "  filtered records  :  {n_filtered}  ({percent:.1}% of records)\n"
    ));
    s.push_str(&format!(
        "  output positions  :  {}\n",
        stats.n_output_positions()
    ));
    s.push_str(&format!(
        "  clusters/position :  {}\n",
        stats.ibd_sets_per_position()
    ));
    s.push_str(&format!(
        "  discordance rate  :  {:.6}\n",
        stats.discord_rate()
    ));
    s
}

fn end_info(start: Instant) -> String {
    let elapsed = start.elapsed();
    let total_secs = elapsed.as_secs();
    let (hours, minutes, seconds) = (total_secs / 3600, (total_secs % 3600) / 60, total_secs % 60);
    let mut s = String::with_capacity(128);
    s.push('\n');
    s.push_str(&format!(
        "Wallclock Time      :  {hours} hours {minutes} minutes {seconds} seconds\n"
    ));
    s.push_str("End Time            :  ");
    s.push_str(&timestamp());
    s
}

fn timestamp() -> String {
    Local::now().format("%I:%M %p %Z on %d %b %Y").to_string()
}
