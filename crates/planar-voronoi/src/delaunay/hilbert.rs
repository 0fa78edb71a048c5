//! Hilbert-curve insertion order.
//!
//! Inserting spatially coherent sites keeps the visibility walk short: each
//! new site is usually located within a few triangles of the previous one.

use crate::GridPoint;

const ORDER: u32 = 16;
const SIDE: u64 = 1 << ORDER;

/// Distance along a Hilbert curve of side `2^ORDER` for cell `(x, y)`.
fn hilbert_index(mut x: u64, mut y: u64) -> u64 {
    let mut d = 0u64;
    let mut s = SIDE / 2;
    while s > 0 {
        let rx = u64::from(x & s > 0);
        let ry = u64::from(y & s > 0);
        d += s * s * ((3 * rx) ^ ry);
        // Rotate the quadrant so the curve stays continuous.
        if ry == 0 {
            if rx == 1 {
                x = SIDE - 1 - x;
                y = SIDE - 1 - y;
            }
            std::mem::swap(&mut x, &mut y);
        }
        s /= 2;
    }
    d
}

/// Returns site indices sorted along a Hilbert curve over the bounding box.
/// Ties (sites in the same curve cell) keep input order.
pub fn hilbert_order(points: &[GridPoint]) -> Vec<usize> {
    if points.is_empty() {
        return Vec::new();
    }
    let (mut min_x, mut min_y) = (i64::MAX, i64::MAX);
    let (mut max_x, mut max_y) = (i64::MIN, i64::MIN);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    let span = (max_x - min_x).max(max_y - min_y).max(1) as f64;
    let scale = (SIDE - 1) as f64 / span;

    let mut keyed: Vec<(u64, usize)> = points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let hx = ((p.x - min_x) as f64 * scale) as u64;
            let hy = ((p.y - min_y) as f64 * scale) as u64;
            (hilbert_index(hx.min(SIDE - 1), hy.min(SIDE - 1)), i)
        })
        .collect();
    keyed.sort_unstable();
    keyed.into_iter().map(|(_, i)| i).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hilbert_order_is_permutation() {
        let points: Vec<GridPoint> = (0..100)
            .map(|i| GridPoint::new((i * 37) % 101, (i * 53) % 97))
            .collect();
        let mut order = hilbert_order(&points);
        order.sort_unstable();
        assert_eq!(order, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_hilbert_order_is_deterministic_for_ties() {
        let points = vec![GridPoint::new(5, 5); 4];
        assert_eq!(hilbert_order(&points), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_hilbert_neighbours_are_close() {
        // Consecutive cells on the curve are always grid neighbours.
        let mut prev = None;
        for d in 0..16u64 {
            let found = (0..4u64)
                .flat_map(|x| (0..4u64).map(move |y| (x, y)))
                .find(|&(x, y)| hilbert_index(x << (ORDER - 2), y << (ORDER - 2)) / (1 << (2 * (ORDER - 2))) == d)
                .expect("every curve position maps to a cell");
            if let Some((px, py)) = prev {
                let dist = (found.0 as i64 - px as i64).abs() + (found.1 as i64 - py as i64).abs();
                assert_eq!(dist, 1, "curve jumped at position {}", d);
            }
            prev = Some(found);
        }
    }
}
