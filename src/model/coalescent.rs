//! # Coalescent Endpoint Survival Transform
//!
//! The probability that an IBD segment with a known left endpoint ends
//! within `y` Morgans, under a constant effective population size `ne`:
//!
//! `F(y, ne) = 1 - 1 / (2 * ne * (e^{2y} - 1) + 1)`
//!
//! and its inverse. Both functions require `y > 0`, `0 < p < 1`, and a
//! positive finite `ne`.

/// Probability that an IBD segment's right endpoint lies within `y` Morgans
/// of its left endpoint.
#[inline]
pub fn f(y: f64, ne: f64) -> f64 {
    debug_assert!(y > 0.0 && !y.is_nan());
    debug_assert!(ne > 0.0 && ne.is_finite());
    let den = 2.0 * ne * (2.0 * y).exp_m1() + 1.0;
    1.0 - 1.0 / den
}

/// The value `y` for which `f(y, ne)` equals `p`.
#[inline]
pub fn inv_f(p: f64, ne: f64) -> f64 {
    debug_assert!(p > 0.0 && p < 1.0 && !p.is_nan());
    debug_assert!(ne > 0.0 && ne.is_finite());
    let d = 2.0 * ne * (1.0 - p);
    0.5 * ((p + d) / d).ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f_strictly_increasing() {
        let ne = 1e4;
        let mut last = 0.0;
        let mut y = 1e-4;
        while y < 10.0 {
            let v = f(y, ne);
            assert!(v > last, "F not increasing at y={y}");
            assert!(v > 0.0 && v < 1.0);
            last = v;
            y *= 1.5;
        }
    }

    #[test]
    fn test_inv_f_round_trip() {
        let ne = 1e4;
        let mut y = 1e-4;
        while y <= 10.0 {
            let p = f(y, ne);
            let back = inv_f(p, ne);
            assert!(
                (back - y).abs() < 1e-9,
                "round trip failed at y={y}: got {back}"
            );
            y *= 2.0;
        }
    }

    #[test]
    fn test_inv_f_monotone() {
        let ne = 5e3;
        assert!(inv_f(0.9, ne) > inv_f(0.5, ne));
        assert!(inv_f(0.5, ne) > inv_f(0.1, ne));
    }
}
