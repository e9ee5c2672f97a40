//! Match-count bounds computed from child bounds, without enumeration.

use serde::{Deserialize, Serialize};

/// Lower bound, estimate and upper bound on the number of matching
/// documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Estimates {
    /// Fewest documents that can match.
    pub min: u64,
    /// Estimated number of matching documents.
    pub est: u64,
    /// Most documents that can match.
    pub max: u64,
}

impl Estimates {
    /// Bounds for a matcher whose exact count is known.
    pub fn exact(count: u64) -> Estimates {
        Estimates {
            min: count,
            est: count,
            max: count,
        }
    }

    /// Bounds for a matcher that matches nothing.
    pub fn none() -> Estimates {
        Estimates::exact(0)
    }

    /// Sum bounds across independent shards.
    pub fn combine_shards(self, other: Estimates) -> Estimates {
        Estimates {
            min: self.min.saturating_add(other.min),
            est: self.est.saturating_add(other.est),
            max: self.max.saturating_add(other.max),
        }
    }

    fn with_est(min: u64, max: u64, est: f64) -> Estimates {
        let est = if est.is_finite() { est.round() } else { 0.0 };
        let est = (est as u64).clamp(min, max);
        Estimates { min, est, max }
    }
}

fn fraction(est: u64, n: u64) -> f64 {
    // Estimation never divides by zero: an empty database estimates zero.
    if n == 0 { 0.0 } else { est as f64 / n as f64 }
}

/// Bounds for an intersection.
pub(crate) fn for_and(children: &[Estimates], n: u64) -> Estimates {
    if children.is_empty() {
        return Estimates::none();
    }
    let k = children.len() as u64;
    let sum_min: u64 = children.iter().map(|c| c.min).sum();
    let min = sum_min.saturating_sub(n.saturating_mul(k - 1));
    let max = children.iter().map(|c| c.max).min().unwrap_or(0);
    // Independence assumption: the match probabilities multiply.
    let est = n as f64
        * children
            .iter()
            .map(|c| fraction(c.est, n))
            .product::<f64>();
    Estimates::with_est(min, max.max(min), est)
}

/// Bounds for a union.
pub(crate) fn for_or(children: &[Estimates], n: u64) -> Estimates {
    let min = children.iter().map(|c| c.min).max().unwrap_or(0);
    let sum_max: u64 = children.iter().map(|c| c.max).sum();
    let max = sum_max.min(n);
    let est = n as f64
        * (1.0
            - children
                .iter()
                .map(|c| 1.0 - fraction(c.est, n))
                .product::<f64>());
    Estimates::with_est(min, max.max(min), est)
}

/// Bounds for a symmetric difference (odd-count match).
pub(crate) fn for_xor(children: &[Estimates], n: u64) -> Estimates {
    if children.is_empty() {
        return Estimates::none();
    }
    // When every child matches the whole database the result is exact:
    // full children cancel in pairs.
    if children.iter().all(|c| c.min == n && c.max == n) {
        let count = if children.len() % 2 == 1 { n } else { 0 };
        return Estimates::exact(count);
    }
    let sum_max: u64 = children.iter().map(|c| c.max).sum();
    let max = sum_max.min(n);
    // A child's guaranteed matches can only be cancelled by documents the
    // other children can reach.
    let min = children
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let others: u64 = children
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, o)| o.max)
                .sum();
            c.min.saturating_sub(others)
        })
        .max()
        .unwrap_or(0);
    // P(odd) for independent children: (1 - prod(1 - 2p_i)) / 2.
    let prod: f64 = children
        .iter()
        .map(|c| 1.0 - 2.0 * fraction(c.est, n))
        .product();
    let est = n as f64 * (1.0 - prod) / 2.0;
    Estimates::with_est(min, max.max(min), est)
}

/// Bounds for left minus right.
pub(crate) fn for_and_not(left: Estimates, right: Estimates, n: u64) -> Estimates {
    let min = left.min.saturating_sub(right.max);
    let max = left.max;
    let est = left.est as f64 * (1.0 - fraction(right.est, n));
    Estimates::with_est(min, max.max(min), est)
}

/// Bounds for a positional operator over children already intersected.
pub(crate) fn for_positional(intersection: Estimates, window: u32, avg_doc_length: f64) -> Estimates {
    // A window constraint can only lose matches from the intersection.
    // Scale the estimate by how much of an average document the window
    // covers, guarding the degenerate empty-database case.
    let factor = if avg_doc_length > 0.0 {
        (window as f64 / avg_doc_length).min(1.0)
    } else {
        1.0
    };
    let est = intersection.est as f64 * factor;
    Estimates::with_est(0, intersection.max, est)
}
