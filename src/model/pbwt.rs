//! # Positional Burrows-Wheeler Transform (PBWT)
//!
//! Forward PBWT update with divergence tracking, used by the IBS segment
//! scanner. After processing marker `m`, the prefix array holds haplotypes
//! sorted by reversed prefix, and the divergence array holds for each
//! adjacent pair the earliest marker from which they agree.
//!
//! ## Reference
//! Durbin, Richard (2014) Efficient haplotype matching and storage using the
//! positional Burrows-Wheeler transform (PBWT). Bioinformatics 30(9):1266-1272.

/// PBWT updater with divergence array tracking
#[derive(Debug)]
pub struct PbwtDivUpdater {
    n_haps: usize,
    /// Per-allele buckets of prefix values
    prefix_buckets: Vec<Vec<u32>>,
    /// Per-allele buckets of divergence values
    div_buckets: Vec<Vec<i32>>,
    /// Per-allele running maximum divergence since the allele's last carrier
    max_div: Vec<i32>,
}

impl PbwtDivUpdater {
    /// Create a new PBWT divergence updater for `n_haps` haplotypes
    pub fn new(n_haps: usize) -> Self {
        let init_n_alleles = 4;
        Self {
            n_haps,
            prefix_buckets: vec![Vec::new(); init_n_alleles],
            div_buckets: vec![Vec::new(); init_n_alleles],
            max_div: vec![0; init_n_alleles],
        }
    }

    /// Number of haplotypes
    pub fn n_haps(&self) -> usize {
        self.n_haps
    }

    /// Advance the prefix and divergence arrays across one marker.
    ///
    /// Haplotypes are distributed into per-allele buckets in prefix order
    /// (a stable radix pass), while each bucket records the running maximum
    /// divergence seen since its previous entry. `get_allele` is indexed by
    /// haplotype, not by prefix rank.
    ///
    /// # Arguments
    /// * `get_allele` - Allele accessor for the current marker
    /// * `n_alleles` - Number of distinct alleles at the current marker
    /// * `marker` - Current marker index
    /// * `prefix` - Prefix array, updated in place
    /// * `divergence` - Divergence array, updated in place
    pub fn fwd_update<F>(
        &mut self,
        get_allele: F,
        n_alleles: usize,
        marker: usize,
        prefix: &mut [u32],
        divergence: &mut [i32],
    ) where
        F: Fn(usize) -> u16,
    {
        assert_eq!(prefix.len(), self.n_haps);
        assert!(divergence.len() >= self.n_haps);
        assert!(n_alleles >= 1);

        self.reserve_alleles(n_alleles);

        // a bucket's first carrier diverges just past the current marker
        let no_match = (marker + 1) as i32;
        self.max_div[..n_alleles].fill(no_match);

        for rank in 0..self.n_haps {
            let hap = prefix[rank];
            let div = divergence[rank];
            let allele = get_allele(hap as usize) as usize;
            assert!(allele < n_alleles, "allele {allele} out of bounds");

            for running in self.max_div[..n_alleles].iter_mut() {
                if div > *running {
                    *running = div;
                }
            }

            self.prefix_buckets[allele].push(hap);
            self.div_buckets[allele].push(self.max_div[allele]);
            // reset so the propagation pass rebuilds the maximum for the
            // bucket's next carrier
            self.max_div[allele] = i32::MIN;
        }

        self.drain_buckets(n_alleles, prefix, divergence);
    }

    fn drain_buckets(&mut self, n_alleles: usize, prefix: &mut [u32], divergence: &mut [i32]) {
        let mut filled = 0;
        for allele in 0..n_alleles {
            let bucket = &mut self.prefix_buckets[allele];
            prefix[filled..filled + bucket.len()].copy_from_slice(bucket);
            let divs = &mut self.div_buckets[allele];
            divergence[filled..filled + divs.len()].copy_from_slice(divs);
            filled += bucket.len();
            bucket.clear();
            divs.clear();
        }
        debug_assert_eq!(filled, self.n_haps);
    }

    fn reserve_alleles(&mut self, n_alleles: usize) {
        if n_alleles > self.prefix_buckets.len() {
            self.prefix_buckets.resize_with(n_alleles, Vec::new);
            self.div_buckets.resize_with(n_alleles, Vec::new);
            self.max_div.resize(n_alleles, 0);
        }
    }
}
