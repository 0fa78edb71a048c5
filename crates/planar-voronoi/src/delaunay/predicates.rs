//! Exact geometric predicates on integer points.
//!
//! Coordinates are bounded by the super-triangle construction so that every
//! intermediate product fits in `i128`; no floating-point filter is needed.

use crate::GridPoint;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sign {
    Neg,
    Zero,
    Pos,
}

impl Sign {
    #[inline]
    fn of(v: i128) -> Self {
        match v.cmp(&0) {
            std::cmp::Ordering::Less => Sign::Neg,
            std::cmp::Ordering::Equal => Sign::Zero,
            std::cmp::Ordering::Greater => Sign::Pos,
        }
    }
}

/// Orientation of `c` relative to the directed line `a -> b`.
/// `Pos` when `a, b, c` turn counter-clockwise.
#[inline]
pub fn orient2d(a: GridPoint, b: GridPoint, c: GridPoint) -> Sign {
    let abx = (b.x - a.x) as i128;
    let aby = (b.y - a.y) as i128;
    let acx = (c.x - a.x) as i128;
    let acy = (c.y - a.y) as i128;
    Sign::of(abx * acy - aby * acx)
}

/// In-circle test for a counter-clockwise triangle `a, b, c`.
/// `Pos` when `d` lies strictly inside the circumcircle.
#[inline]
pub fn incircle(a: GridPoint, b: GridPoint, c: GridPoint, d: GridPoint) -> Sign {
    let adx = (a.x - d.x) as i128;
    let ady = (a.y - d.y) as i128;
    let bdx = (b.x - d.x) as i128;
    let bdy = (b.y - d.y) as i128;
    let cdx = (c.x - d.x) as i128;
    let cdy = (c.y - d.y) as i128;

    let alift = adx * adx + ady * ady;
    let blift = bdx * bdx + bdy * bdy;
    let clift = cdx * cdx + cdy * cdy;

    let det = alift * (bdx * cdy - cdx * bdy)
        + blift * (cdx * ady - adx * cdy)
        + clift * (adx * bdy - bdx * ady);
    Sign::of(det)
}
