//! Change accounting shared by the operations of a pipeline run.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::compute::ExecScope;

/// Run-wide counters shared by a root context and every nested child.
#[derive(Debug, Default)]
struct RunLedger {
    pipeline_changed: AtomicBool,
    previous_changed: AtomicBool,
    all_steps: AtomicU32,
    all_updates: AtomicU32,
}

/// Per-pipeline view of a run, handed to each operation.
///
/// Counters are atomic so a context can be shared with concurrently running
/// tasks; recording a result through a shared reference is sound.
#[derive(Debug)]
pub struct Context {
    scope: ExecScope,
    ledger: Arc<RunLedger>,
    steps: AtomicU32,
    updates: AtomicU32,
    reports: AtomicU32,
}

impl Context {
    /// Creates the root context of a run, governed by `scope`.
    #[must_use]
    pub fn root(scope: ExecScope) -> Self {
        Self {
            scope,
            ledger: Arc::new(RunLedger::default()),
            steps: AtomicU32::new(0),
            updates: AtomicU32::new(0),
            reports: AtomicU32::new(0),
        }
    }

    /// Creates a context for a nested pipeline. Local counters start at zero;
    /// run-wide state is shared with `self`.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            scope: self.scope.clone(),
            ledger: Arc::clone(&self.ledger),
            steps: AtomicU32::new(0),
            updates: AtomicU32::new(0),
            reports: AtomicU32::new(0),
        }
    }

    /// Scope governing every command issued by the run's operations.
    #[must_use]
    pub const fn scope(&self) -> &ExecScope {
        &self.scope
    }

    /// Records the outcome of one operation.
    pub fn set_result(&self, changed: bool) {
        self.reports.fetch_add(1, Ordering::SeqCst);
        self.steps.fetch_add(1, Ordering::SeqCst);
        self.ledger.all_steps.fetch_add(1, Ordering::SeqCst);
        if changed {
            self.updates.fetch_add(1, Ordering::SeqCst);
            self.ledger.all_updates.fetch_add(1, Ordering::SeqCst);
            self.ledger.pipeline_changed.store(true, Ordering::SeqCst);
        }
        self.ledger.previous_changed.store(changed, Ordering::SeqCst);
    }

    /// Records a change signal from control flow, counting neither a step
    /// nor an update.
    pub(crate) fn set_result_virtual(&self, changed: bool) {
        if changed {
            self.ledger.pipeline_changed.store(true, Ordering::SeqCst);
        }
        self.ledger.previous_changed.store(changed, Ordering::SeqCst);
    }

    /// Notes that a control-flow operation ran, whether or not it fired.
    pub(crate) fn mark_virtual(&self) {
        self.reports.fetch_add(1, Ordering::SeqCst);
    }

    /// Results and control-flow signals recorded in this pipeline.
    #[must_use]
    pub(crate) fn reports(&self) -> u32 {
        self.reports.load(Ordering::SeqCst)
    }

    /// `true` once any operation in the run has changed something.
    #[must_use]
    pub fn pipeline_has_changes(&self) -> bool {
        self.ledger.pipeline_changed.load(Ordering::SeqCst)
    }

    /// Change flag of the most recent result recorded anywhere in the run.
    #[must_use]
    pub fn previous_has_changes(&self) -> bool {
        self.ledger.previous_changed.load(Ordering::SeqCst)
    }

    /// Steps recorded in this pipeline, or in the whole run when `all` is set.
    #[must_use]
    pub fn step_ctr(&self, all: bool) -> u32 {
        if all {
            self.ledger.all_steps.load(Ordering::SeqCst)
        } else {
            self.steps.load(Ordering::SeqCst)
        }
    }

    /// Changed results recorded in this pipeline, or in the whole run when
    /// `all` is set.
    #[must_use]
    pub fn update_ctr(&self, all: bool) -> u32 {
        if all {
            self.ledger.all_updates.load(Ordering::SeqCst)
        } else {
            self.updates.load(Ordering::SeqCst)
        }
    }
}
