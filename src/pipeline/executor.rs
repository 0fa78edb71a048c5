//! Parallel, resumable execution of independent work units.

use std::panic::{catch_unwind, AssertUnwindSafe};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;

use super::report::UnitStats;
use crate::geometry::panic_message;
use crate::storage::ArtifactKey;
use crate::util::Timed;
use crate::{Error, Result};

/// One independently executable piece of work with a stable output key.
///
/// A unit owns all of its input. The only thing units share is the storage
/// sink, and they never write the same key.
pub trait WorkUnit: Send {
    fn name(&self) -> String;

    /// True when every artifact this unit would produce already exists.
    fn is_complete(&self) -> Result<bool>;

    fn execute(self: Box<Self>) -> Result<UnitStats>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnitOutcome {
    Completed(UnitStats),
    Skipped,
    Failed(String),
    /// Ran to the end, but some artifacts could not be written.
    Partial { stats: UnitStats, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitFailure {
    pub unit: String,
    pub reason: String,
}

/// Outcome counts of one phase.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub phase: String,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failures: Vec<UnitFailure>,
    /// Aggregates not attempted because an input failed this run.
    pub deferred: Vec<ArtifactKey>,
    pub stats: UnitStats,
}

impl BatchSummary {
    fn new(phase: &str) -> Self {
        Self {
            phase: phase.to_string(),
            ..Self::default()
        }
    }

    fn record(&mut self, name: String, outcome: UnitOutcome) {
        match outcome {
            UnitOutcome::Completed(stats) => {
                self.completed += 1;
                self.stats.merge(&stats);
            }
            UnitOutcome::Skipped => self.skipped += 1,
            UnitOutcome::Failed(reason) => {
                self.failed += 1;
                self.failures.push(UnitFailure { unit: name, reason });
            }
            UnitOutcome::Partial { stats, reason } => {
                self.failed += 1;
                self.stats.merge(&stats);
                self.failures.push(UnitFailure { unit: name, reason });
            }
        }
    }

    pub fn total(&self) -> usize {
        self.completed + self.skipped + self.failed + self.deferred.len()
    }
}

/// Runs batches of work units on a fixed-size thread pool.
pub struct BatchExecutor {
    pool: ThreadPool,
}

impl BatchExecutor {
    pub fn new(workers: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("postcode-worker-{}", i))
            .build()
            .map_err(|e| Error::Config(format!("cannot start worker pool: {}", e)))?;
        Ok(Self { pool })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run every unit, skipping complete ones. Failures (including panics)
    /// are isolated to their unit.
    pub fn run(&self, phase: &str, units: Vec<Box<dyn WorkUnit>>) -> BatchSummary {
        let _t = Timed::info(format!("{} ({} units)", phase, units.len()));
        let outcomes: Vec<(String, UnitOutcome)> =
            self.pool.install(|| units.into_par_iter().map(run_unit).collect());

        let mut summary = BatchSummary::new(phase);
        for (name, outcome) in outcomes {
            summary.record(name, outcome);
        }
        summary.failures.sort_by(|a, b| a.unit.cmp(&b.unit));
        summary
    }
}

fn run_unit(unit: Box<dyn WorkUnit>) -> (String, UnitOutcome) {
    let name = unit.name();
    let result = catch_unwind(AssertUnwindSafe(move || -> Result<Option<UnitStats>> {
        if unit.is_complete()? {
            return Ok(None);
        }
        unit.execute().map(Some)
    }));

    let outcome = match result {
        Ok(Ok(Some(stats))) if !stats.failed_writes.is_empty() => {
            let reason = format!(
                "{} artifacts could not be written (first: {})",
                stats.failed_writes.len(),
                stats.failed_writes[0]
            );
            UnitOutcome::Partial {
                reason: log_failure(&name, reason),
                stats,
            }
        }
        Ok(Ok(Some(stats))) => {
            log::debug!("{}: completed", name);
            UnitOutcome::Completed(stats)
        }
        Ok(Ok(None)) => {
            log::info!("{}: already complete, skipping", name);
            UnitOutcome::Skipped
        }
        Ok(Err(e)) => UnitOutcome::Failed(log_failure(&name, e.to_string())),
        Err(payload) => UnitOutcome::Failed(log_failure(
            &name,
            format!("panicked: {}", panic_message(payload.as_ref())),
        )),
    };
    (name, outcome)
}

fn log_failure(name: &str, reason: String) -> String {
    log::error!(
        "{}",
        Error::UnitExecutionFailure {
            unit: name.to_string(),
            reason: reason.clone(),
        }
    );
    reason
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    enum Behaviour {
        Work,
        Done,
        Fail,
        Panic,
        Partial,
    }

    struct TestUnit {
        name: &'static str,
        behaviour: Behaviour,
        executed: Arc<AtomicUsize>,
    }

    impl WorkUnit for TestUnit {
        fn name(&self) -> String {
            self.name.to_string()
        }

        fn is_complete(&self) -> Result<bool> {
            Ok(matches!(self.behaviour, Behaviour::Done))
        }

        fn execute(self: Box<Self>) -> Result<UnitStats> {
            self.executed.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Work | Behaviour::Done => Ok(UnitStats {
                    units_written: 1,
                    ..UnitStats::default()
                }),
                Behaviour::Fail => Err(Error::Storage("disk full".into())),
                Behaviour::Partial => Ok(UnitStats {
                    units_written: 2,
                    failed_writes: vec!["unit/AB1 2CD".into()],
                    ..UnitStats::default()
                }),
                Behaviour::Panic => panic!("boom"),
            }
        }
    }

    #[test]
    fn test_outcomes_are_isolated() {
        let executed = Arc::new(AtomicUsize::new(0));
        let unit = |name, behaviour| -> Box<dyn WorkUnit> {
            Box::new(TestUnit {
                name,
                behaviour,
                executed: executed.clone(),
            })
        };
        let units = vec![
            unit("a", Behaviour::Work),
            unit("b", Behaviour::Done),
            unit("c", Behaviour::Fail),
            unit("d", Behaviour::Panic),
            unit("e", Behaviour::Work),
        ];

        let executor = BatchExecutor::new(2).unwrap();
        assert_eq!(executor.workers(), 2);
        let summary = executor.run("test", units);

        assert_eq!(summary.completed, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.total(), 5);
        assert_eq!(summary.stats.units_written, 2);
        assert_eq!(executed.load(Ordering::SeqCst), 4, "complete units are never executed");

        let failed: Vec<&str> = summary.failures.iter().map(|f| f.unit.as_str()).collect();
        assert_eq!(failed, ["c", "d"]);
        assert!(summary.failures[0].reason.contains("disk full"));
        assert!(summary.failures[1].reason.contains("boom"));
    }

    #[test]
    fn test_failed_writes_fail_the_unit_but_keep_stats() {
        let executed = Arc::new(AtomicUsize::new(0));
        let units: Vec<Box<dyn WorkUnit>> = vec![Box::new(TestUnit {
            name: "region/SC",
            behaviour: Behaviour::Partial,
            executed: executed.clone(),
        })];
        let summary = BatchExecutor::new(1).unwrap().run("test", units);

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.completed, 0);
        assert_eq!(summary.stats.units_written, 2, "what was written is still counted");
        assert_eq!(summary.stats.failed_writes, ["unit/AB1 2CD"]);
        assert!(summary.failures[0].reason.contains("unit/AB1 2CD"));
    }

    #[test]
    fn test_empty_batch() {
        let executor = BatchExecutor::new(1).unwrap();
        let summary = executor.run("empty", Vec::new());
        assert_eq!(summary.total(), 0);
    }
}
