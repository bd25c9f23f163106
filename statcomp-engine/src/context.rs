//! Execution context threaded through long-running analyses
//!
//! The context owns the two callbacks the worker runtime injects: a progress
//! sink and a checkpoint guard. The guard is the only place a running
//! analysis can be stopped; returning an [`Interrupt`] from it aborts the
//! computation at the next checkpoint without tearing down partial numeric
//! state mid-loop.

/// Why a computation was stopped at a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// Cancellation was requested for the owning job.
    Cancelled,
    /// The job's wall-clock deadline elapsed.
    TimedOut,
}

/// Progress callback: `(percent, step, message)`
pub type ProgressFn = dyn Fn(f64, &str, Option<&str>) + Send + Sync;

/// Checkpoint guard; `Err` aborts the computation cooperatively
pub type GuardFn = dyn Fn() -> Result<(), Interrupt> + Send + Sync;

pub struct ExecutionContext {
    progress: Box<ProgressFn>,
    guard: Box<GuardFn>,
    checkpoint_every: u32,
}

impl ExecutionContext {
    pub fn new(progress: Box<ProgressFn>, guard: Box<GuardFn>, checkpoint_every: u32) -> Self {
        Self {
            progress,
            guard,
            checkpoint_every: checkpoint_every.max(1),
        }
    }

    /// Context that reports nowhere and never interrupts.
    pub fn noop() -> Self {
        Self::new(Box::new(|_, _, _| {}), Box::new(|| Ok(())), 1)
    }

    /// Report a phase boundary.
    pub fn report(&self, percent: f64, step: &str, message: Option<&str>) {
        (self.progress)(percent, step, message);
    }

    /// Poll cancellation and timeout; called between phases.
    pub fn guard(&self) -> Result<(), Interrupt> {
        (self.guard)()
    }

    /// Loop checkpoint: every `checkpoint_every` iterations (and on the last
    /// one) polls the guard and maps the iteration onto a percent span.
    pub fn loop_checkpoint(
        &self,
        step: &str,
        index: u32,
        total: u32,
        start: f64,
        span: f64,
    ) -> Result<(), Interrupt> {
        if index % self.checkpoint_every == 0 || index + 1 == total {
            self.guard()?;
            let fraction = f64::from(index + 1) / f64::from(total.max(1));
            self.report(
                start + fraction * span,
                step,
                Some(&format!("{}/{}", index + 1, total)),
            );
        }
        Ok(())
    }
}
