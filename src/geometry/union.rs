//! Balanced pairwise union of many polygons.

use geo::{BooleanOps, MultiPolygon};

use super::guarded;

/// Union all `parts`. Pairs are merged level by level so each boolean
/// operation sees inputs of similar size.
pub fn union_all(mut parts: Vec<MultiPolygon<f64>>) -> Result<MultiPolygon<f64>, String> {
    parts.retain(|p| !p.0.is_empty());
    if parts.is_empty() {
        return Ok(MultiPolygon::new(Vec::new()));
    }
    while parts.len() > 1 {
        let mut next = Vec::with_capacity(parts.len().div_ceil(2));
        let mut iter = parts.into_iter();
        while let Some(a) = iter.next() {
            match iter.next() {
                Some(b) => next.push(guarded(|| a.union(&b))?),
                None => next.push(a),
            }
        }
        parts = next;
    }
    Ok(parts.pop().unwrap_or_else(|| MultiPolygon::new(Vec::new())))
}
