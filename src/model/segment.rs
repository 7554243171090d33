//! # Haplotype Pair Segments
//!
//! A shared chromosome segment for a pair of haplotypes, identified by the
//! base coordinates of its first and last markers. Two sort orders are used
//! by the pipeline: haplotype-pair order for merging PBWT scan output, and
//! interval order for cluster emission.

use std::cmp::Ordering;

/// A shared chromosome segment for an ordered pair of haplotypes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HapPairSegment {
    pub hap1: u32,
    pub hap2: u32,
    pub start_pos: i32,
    pub incl_end_pos: i32,
}

/// Sentinel for a segment without positive length, used to mark estimator
/// output that failed the length filter.
pub const ZERO_LENGTH_SEGMENT: HapPairSegment = HapPairSegment {
    hap1: u32::MAX,
    hap2: u32::MAX,
    start_pos: i32::MAX,
    incl_end_pos: i32::MAX,
};

impl HapPairSegment {
    /// Create a new segment. The haplotype pair is stored in ascending
    /// order regardless of argument order.
    pub fn new(hap1: u32, hap2: u32, start_pos: i32, incl_end_pos: i32) -> Self {
        assert!(
            start_pos <= incl_end_pos,
            "start_pos={start_pos} > incl_end_pos={incl_end_pos}"
        );
        let (hap1, hap2) = if hap1 <= hap2 { (hap1, hap2) } else { (hap2, hap1) };
        Self {
            hap1,
            hap2,
            start_pos,
            incl_end_pos,
        }
    }

    /// Check whether this is the zero-length sentinel
    pub fn is_zero_length(&self) -> bool {
        *self == ZERO_LENGTH_SEGMENT
    }

    /// Order by `(hap1, hap2, start_pos, incl_end_pos)`
    pub fn hap_pair_cmp(&self, other: &Self) -> Ordering {
        self.hap1
            .cmp(&other.hap1)
            .then(self.hap2.cmp(&other.hap2))
            .then(self.start_pos.cmp(&other.start_pos))
            .then(self.incl_end_pos.cmp(&other.incl_end_pos))
    }

    /// Order by `(start_pos, incl_end_pos, hap1, hap2)`
    pub fn interval_cmp(&self, other: &Self) -> Ordering {
        self.start_pos
            .cmp(&other.start_pos)
            .then(self.incl_end_pos.cmp(&other.incl_end_pos))
            .then(self.hap1.cmp(&other.hap1))
            .then(self.hap2.cmp(&other.hap2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hap_order_normalized() {
        let seg = HapPairSegment::new(5, 2, 100, 200);
        assert_eq!(seg.hap1, 2);
        assert_eq!(seg.hap2, 5);
    }

    #[test]
    fn test_orderings() {
        let a = HapPairSegment::new(0, 1, 100, 200);
        let b = HapPairSegment::new(0, 1, 150, 180);
        let c = HapPairSegment::new(0, 2, 50, 60);
        assert_eq!(a.hap_pair_cmp(&b), Ordering::Less);
        assert_eq!(b.hap_pair_cmp(&c), Ordering::Less);
        assert_eq!(c.interval_cmp(&a), Ordering::Less);
        assert_eq!(a.interval_cmp(&b), Ordering::Less);
    }

    #[test]
    fn test_zero_length_sentinel() {
        assert!(ZERO_LENGTH_SEGMENT.is_zero_length());
        assert!(!HapPairSegment::new(0, 1, 5, 5).is_zero_length());
    }
}
