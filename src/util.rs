//! Utility functions for timing and progress logging.

use std::time::Instant;

/// RAII timer that logs elapsed time on drop.
///
/// # Example
/// ```ignore
/// let _t = Timed::info("Tessellation");
/// // ... do work ...
/// // logs "Tessellation: 1.234s" when _t is dropped
/// ```
pub struct Timed {
    name: String,
    start: Instant,
    level: log::Level,
}

impl Timed {
    /// Create a new timer that logs at INFO level.
    pub fn info(name: impl Into<String>) -> Self {
        Self::at(name.into(), log::Level::Info)
    }

    /// Create a new timer that logs at DEBUG level.
    pub fn debug(name: impl Into<String>) -> Self {
        Self::at(name.into(), log::Level::Debug)
    }

    fn at(name: String, level: log::Level) -> Self {
        if level == log::Level::Info {
            log::debug!("{}...", name);
        } else {
            log::trace!("{}...", name);
        }
        Self {
            name,
            start: Instant::now(),
            level,
        }
    }
}

impl Drop for Timed {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        log::log!(self.level, "{}: {:.3?}", self.name, elapsed);
    }
}

/// Counts processed items and logs every `interval`.
pub struct Progress {
    label: String,
    interval: usize,
    count: usize,
}

impl Progress {
    pub fn new(label: impl Into<String>, interval: usize) -> Self {
        Self {
            label: label.into(),
            interval: interval.max(1),
            count: 0,
        }
    }

    #[inline]
    pub fn tick(&mut self) {
        self.count += 1;
        if self.count % self.interval == 0 {
            log::info!("{}: {} records processed", self.label, self.count);
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }
}
