//! Sequential provisioning pipelines with change tracking.
//!
//! A pipeline runs its operations in order and stops at the first error.
//! Every operation reports through [`Context::set_result`] whether it changed
//! the target, which lets later operations react to earlier work (for
//! example restarting a service only when its unit file was rewritten).
//!
//! An operation that succeeds without reporting is a programming error:
//! it is logged, and debug builds panic.
//!
//! Pipelines nest: [`nested`] runs an inner list of operations against a child
//! context and counts as a single step of the outer pipeline.

mod context;
mod ops;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::compute::ExecScope;

pub use context::Context;
pub use ops::{dummy_operation, force_change, force_change_if, force_update_if_any};

/// Future returned by an [`Operation`].
pub type OperationFuture<'a, E> = Pin<Box<dyn Future<Output = Result<(), E>> + Send + 'a>>;

/// One unit of idempotent work.
pub type Operation<E> = Box<dyn for<'a> Fn(&'a Context) -> OperationFuture<'a, E> + Send + Sync>;

/// Boxes a closure as an [`Operation`].
///
/// The closure typically returns `Box::pin(async move { .. })`.
#[must_use]
pub fn operation<E, F>(f: F) -> Operation<E>
where
    F: for<'a> Fn(&'a Context) -> OperationFuture<'a, E> + Send + Sync + 'static,
{
    Box::new(f)
}

/// Ordered operations bound to a context.
pub struct Pipeline<E> {
    context: Context,
    operations: Vec<Operation<E>>,
}

impl<E> std::fmt::Debug for Pipeline<E> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Pipeline")
            .field("context", &self.context)
            .field("operations", &self.operations.len())
            .finish()
    }
}

impl<E> Pipeline<E> {
    /// Creates a root pipeline governed by `scope`.
    #[must_use]
    pub fn new(scope: ExecScope, operations: Vec<Operation<E>>) -> Self {
        Self {
            context: Context::root(scope),
            operations,
        }
    }

    /// Creates a pipeline that shares run-wide state with `parent`.
    #[must_use]
    pub fn nested_in(parent: &Context, operations: Vec<Operation<E>>) -> Self {
        Self {
            context: parent.child(),
            operations,
        }
    }

    /// The pipeline's own context.
    #[must_use]
    pub const fn context(&self) -> &Context {
        &self.context
    }

    /// Runs every operation in order.
    ///
    /// # Errors
    ///
    /// Returns the first operation error; later operations do not run.
    pub async fn run(&self) -> Result<(), E> {
        run_operations(&self.context, &self.operations).await
    }
}

async fn run_operations<E>(context: &Context, operations: &[Operation<E>]) -> Result<(), E> {
    for (index, operation) in operations.iter().enumerate() {
        let before = context.reports();
        if let Err(error) = operation(context).await {
            debug!(step = index, "pipeline stopped at failing operation");
            return Err(error);
        }
        let reported = context.reports() != before;
        if !reported {
            warn!(step = index, "operation succeeded without reporting a result");
        }
        debug_assert!(
            reported,
            "operation {index} succeeded without calling Context::set_result"
        );
    }
    Ok(())
}

/// Wraps `operations` as a single operation that runs them in a child
/// context.
///
/// The outer step is reported as changed when any inner operation recorded a
/// change, even if a later inner operation failed; the inner error is then
/// returned.
#[must_use]
pub fn nested<E: Send + 'static>(operations: Vec<Operation<E>>) -> Operation<E> {
    let shared = Arc::new(operations);
    operation(move |ctx| {
        let inner = Arc::clone(&shared);
        Box::pin(async move {
            let child = ctx.child();
            let outcome = run_operations(&child, &inner).await;
            ctx.set_result(child.update_ctr(false) > 0);
            outcome
        })
    })
}

#[cfg(test)]
mod tests;
