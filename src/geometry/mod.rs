mod clip;
mod projection;
mod tessellation;
mod union;
pub mod validation;

use std::panic::{catch_unwind, AssertUnwindSafe};

pub use clip::{drop_degenerate_parts, ensure_valid, repair, ClipFlags, ClipOutcome, ReferenceBoundary, RegionClipper};
pub use projection::Projection;
pub use tessellation::{tessellate, Cell, DegenerateReason, InfinityRing, Tessellation, TessellationInput};
pub use union::union_all;

/// Run a boolean geometry operation, turning a panic into an error.
pub(crate) fn guarded<T>(op: impl FnOnce() -> T) -> Result<T, String> {
    catch_unwind(AssertUnwindSafe(op)).map_err(|payload| panic_message(payload.as_ref()))
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
