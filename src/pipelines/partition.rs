//! # Haplotype Partition
//!
//! A disjoint-set union over the haplotypes at one output locus, plus the
//! locus itself. Cluster indices are assigned at write time in first-seen
//! haplotype order, so every emitted line numbers its clusters 0, 1, 2, ...
//! with no gaps.

use std::io::Write;

use crate::error::Result;

/// An output locus
#[derive(Clone, Copy, Debug)]
pub struct Position {
    /// Base-pair coordinate
    pub pos: i32,
    /// Genetic position in cM
    pub cm: f64,
}

/// Union-find partition of the haplotypes at one output locus
pub struct Partition {
    position: Position,
    parent: Vec<u32>,
    rank: Vec<i32>,
    n_sets: usize,
}

impl Partition {
    /// Create a partition of `n_haps` singleton sets
    pub fn new(position: Position, n_haps: usize) -> Self {
        Self {
            position,
            parent: (0..n_haps as u32).collect(),
            rank: vec![0; n_haps],
            n_sets: n_haps,
        }
    }

    /// Number of haplotypes
    pub fn n_haps(&self) -> usize {
        self.parent.len()
    }

    /// The output locus
    pub fn position(&self) -> Position {
        self.position
    }

    /// Representative member of the set containing `hap`, with path
    /// compression
    pub fn find(&mut self, hap: usize) -> usize {
        let mut root = hap;
        while self.parent[root] as usize != root {
            root = self.parent[root] as usize;
        }
        let mut current = hap;
        while current != root {
            let next = self.parent[current] as usize;
            self.parent[current] = root as u32;
            current = next;
        }
        root
    }

    /// Merge the sets containing `x` and `y` if they differ
    pub fn union(&mut self, x: usize, y: usize) {
        let x_root = self.find(x);
        let y_root = self.find(y);
        if x_root != y_root {
            self.n_sets -= 1;
            if self.rank[x_root] <= self.rank[y_root] {
                if self.rank[x_root] == self.rank[y_root] {
                    self.rank[y_root] += 1;
                }
                self.parent[x_root] = y_root as u32;
            } else {
                self.parent[y_root] = x_root as u32;
            }
        }
    }

    /// Number of sets in the partition
    pub fn n_sets(&self) -> usize {
        self.n_sets
    }

    /// Append this partition's output line to `out`.
    ///
    /// The rank array is reused as cluster-index scratch; since writing
    /// happens after all unions, rank information is no longer needed.
    pub fn write(&mut self, chrom: &str, out: &mut Vec<u8>) -> Result<()> {
        let n_haps = self.parent.len();
        let mut clust_index = 0i32;
        self.rank.fill(-1);
        for j in 0..n_haps {
            let root = self.find(j);
            if self.rank[root] == -1 {
                self.rank[root] = clust_index;
                clust_index += 1;
            }
            self.rank[j] = self.rank[root];
        }
        write!(out, "{}\t{}\t{:.4}", chrom, self.position.pos, self.position.cm)?;
        for h in (0..n_haps).step_by(2) {
            write!(out, "\t{}|{}", self.rank[h], self.rank[h + 1])?;
        }
        out.push(b'\n');
        self.rank.fill(1);
        Ok(())
    }
}
