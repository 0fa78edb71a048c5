use thiserror::Error;

/// Errors reserved for invalid input; degenerate cells are reported through
/// [`crate::VoronoiDiagnostics`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoronoiError {
    #[error("at least 3 sites are required, got {0}")]
    InsufficientPoints(usize),

    #[error("site {index} at ({x}, {y}) is outside the supported coordinate range")]
    CoordinateOutOfRange { index: usize, x: i64, y: i64 },

    #[error("point location failed for site {0}")]
    LocationFailed(usize),
}
