//! # Marker-Array Coordinate Interpolation
//!
//! Linear interpolation between the analysis markers' base-pair and Morgan
//! coordinate arrays, in both directions. Queries beyond either end of the
//! marker span are extrapolated after widening the bracketing interval by a
//! back-off of 5 Mb / 0.05 Morgan, which keeps the slope stable when the
//! outermost markers are close together.
//!
//! Both arrays must be sorted in increasing order and have equal length.

const BASE_POS_BACKOFF: i32 = 5_000_000;
const MORGAN_POS_BACKOFF: f64 = 0.05;

/// Estimated Morgan position of a base position, by linear interpolation
/// over the marker coordinate arrays.
pub fn morgan_pos(base_pos: &[i32], morgan_pos: &[f64], input_base_pos: i32) -> f64 {
    assert!(base_pos.len() >= 2, "insufficient data");
    assert_eq!(base_pos.len(), morgan_pos.len(), "inconsistent data");
    let last = base_pos.len() - 1;
    let (a, b) = match base_pos.binary_search(&input_base_pos) {
        Ok(idx) => return morgan_pos[idx],
        Err(ins) if ins > last => {
            // beyond the last marker: widen the slope window leftward
            let target = base_pos[last] - BASE_POS_BACKOFF;
            let a = match base_pos.binary_search(&target) {
                Ok(idx) => idx,
                Err(ins2) => ins2.saturating_sub(1),
            };
            (a.min(last - 1), last)
        }
        Err(0) => {
            // before the first marker: widen the slope window rightward
            let target = base_pos[0] + BASE_POS_BACKOFF;
            let b = match base_pos.binary_search(&target) {
                Ok(idx) => idx,
                Err(ins2) => ins2,
            };
            (0, b.clamp(1, last))
        }
        Err(ins) => (ins - 1, ins),
    };
    let x = input_base_pos as f64;
    let xa = base_pos[a] as f64;
    let xb = base_pos[b] as f64;
    morgan_pos[a] + ((x - xa) / (xb - xa)) * (morgan_pos[b] - morgan_pos[a])
}

/// Estimated base position of a Morgan position, by linear interpolation
/// over the marker coordinate arrays.
pub fn base_pos(base_pos: &[i32], morgan_pos: &[f64], input_morgan_pos: f64) -> i32 {
    assert!(base_pos.len() >= 2, "insufficient data");
    assert_eq!(base_pos.len(), morgan_pos.len(), "inconsistent data");
    let last = morgan_pos.len() - 1;
    let ins = lower_bound(morgan_pos, input_morgan_pos);
    if ins <= last && morgan_pos[ins] == input_morgan_pos {
        return base_pos[ins];
    }
    let (a, b) = if ins > last {
        let target = morgan_pos[last] - MORGAN_POS_BACKOFF;
        let ins2 = lower_bound(morgan_pos, target);
        let a = if ins2 <= last && morgan_pos[ins2] == target {
            ins2
        } else {
            ins2.saturating_sub(1)
        };
        (a.min(last - 1), last)
    } else if ins == 0 {
        let target = morgan_pos[0] + MORGAN_POS_BACKOFF;
        let b = lower_bound(morgan_pos, target);
        (0, b.clamp(1, last))
    } else {
        (ins - 1, ins)
    };
    let x = input_morgan_pos;
    let xa = morgan_pos[a];
    let xb = morgan_pos[b];
    let fa = base_pos[a] as f64;
    let fb = base_pos[b] as f64;
    (fa + ((x - xa) / (xb - xa)) * (fb - fa)).round() as i32
}

/// First index whose value is not less than `key`
#[inline]
fn lower_bound(sorted: &[f64], key: f64) -> usize {
    sorted.partition_point(|&v| v < key)
}
