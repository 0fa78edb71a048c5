use glam::DVec2;

/// Largest absolute coordinate accepted for a site.
///
/// Keeps every in-circle determinant (including the super-triangle vertices)
/// inside `i128` range.
pub const MAX_COORD: i64 = 1 << 24;

/// An integer site in a projected plane (e.g. eastings/northings in metres).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridPoint {
    pub x: i64,
    pub y: i64,
}

impl GridPoint {
    #[inline]
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn as_dvec2(self) -> DVec2 {
        DVec2::new(self.x as f64, self.y as f64)
    }

    #[inline]
    pub(crate) fn in_range(self) -> bool {
        self.x.abs() <= MAX_COORD && self.y.abs() <= MAX_COORD
    }
}

impl From<(i64, i64)> for GridPoint {
    fn from((x, y): (i64, i64)) -> Self {
        Self { x, y }
    }
}
