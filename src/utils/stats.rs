//! # Run Statistics
//!
//! Thread-safe counters accumulated across the analysis. Counters are
//! plain atomics; the allele discordance tally is a pair of counters
//! updated wait-free from worker threads.

use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics from one clustering run
#[derive(Debug, Default)]
pub struct RunStats {
    n_samples: AtomicU64,
    n_markers: AtomicU64,
    n_filtered_markers: AtomicU64,
    n_ibd_sets: AtomicU64,
    n_output_positions: AtomicU64,
    discord_cnt: AtomicU64,
    checked_cnt: AtomicU64,
}

impl RunStats {
    /// Create zeroed statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of samples
    pub fn set_n_samples(&self, n_samples: u64) {
        self.n_samples.store(n_samples, Ordering::Relaxed);
    }

    /// Number of samples
    pub fn n_samples(&self) -> u64 {
        self.n_samples.load(Ordering::Relaxed)
    }

    /// Add input records (inside the map span, before the MAF filter)
    pub fn add_markers(&self, cnt: u64) {
        self.n_markers.fetch_add(cnt, Ordering::Relaxed);
    }

    /// Cumulative input records
    pub fn n_markers(&self) -> u64 {
        self.n_markers.load(Ordering::Relaxed)
    }

    /// Add records that survived the MAF filter
    pub fn add_filtered_markers(&self, cnt: u64) {
        self.n_filtered_markers.fetch_add(cnt, Ordering::Relaxed);
    }

    /// Cumulative records after the MAF filter
    pub fn n_filtered_markers(&self) -> u64 {
        self.n_filtered_markers.load(Ordering::Relaxed)
    }

    /// Add IBD cluster sets
    pub fn add_ibd_sets(&self, cnt: u64) {
        self.n_ibd_sets.fetch_add(cnt, Ordering::Relaxed);
    }

    /// Cumulative IBD cluster sets over all output positions
    pub fn n_ibd_sets(&self) -> u64 {
        self.n_ibd_sets.load(Ordering::Relaxed)
    }

    /// Add output positions
    pub fn add_output_positions(&self, cnt: u64) {
        self.n_output_positions.fetch_add(cnt, Ordering::Relaxed);
    }

    /// Cumulative output positions
    pub fn n_output_positions(&self) -> u64 {
        self.n_output_positions.load(Ordering::Relaxed)
    }

    /// Record allele discordances observed inside one trimmed IBD segment.
    ///
    /// # Panics
    /// Panics if `discordant > checked`.
    pub fn update_discord_rate(&self, discordant: u64, checked: u64) {
        assert!(discordant <= checked, "{discordant} > {checked}");
        self.discord_cnt.fetch_add(discordant, Ordering::Relaxed);
        self.checked_cnt.fetch_add(checked, Ordering::Relaxed);
    }

    /// The IBD segment allele discordance rate, or 0 when nothing was
    /// checked
    pub fn discord_rate(&self) -> f64 {
        let num = self.discord_cnt.load(Ordering::Relaxed);
        let den = self.checked_cnt.load(Ordering::Relaxed);
        if den == 0 {
            0.0
        } else {
            num as f64 / den as f64
        }
    }

    /// Mean clusters per output position, rounded to the nearest integer
    pub fn ibd_sets_per_position(&self) -> u64 {
        let positions = self.n_output_positions();
        if positions == 0 {
            0
        } else {
            ((self.n_ibd_sets() as f64) / positions as f64).round() as u64
        }
    }
}
