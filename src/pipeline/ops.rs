//! Built-in operations for steering a pipeline's change signal.

use crate::pipeline::{Operation, operation};

/// Marks the pipeline as changed without counting a step.
#[must_use]
pub fn force_change<E: Send + 'static>() -> Operation<E> {
    force_change_if(true)
}

/// Marks the pipeline as changed when `condition` holds.
#[must_use]
pub fn force_change_if<E: Send + 'static>(condition: bool) -> Operation<E> {
    operation(move |ctx| {
        Box::pin(async move {
            ctx.mark_virtual();
            if condition {
                ctx.set_result_virtual(true);
            }
            Ok(())
        })
    })
}

/// Forwards an earlier change anywhere in the run to the previous-result
/// flag, so a following operation sees it.
#[must_use]
pub fn force_update_if_any<E: Send + 'static>() -> Operation<E> {
    operation(|ctx| {
        Box::pin(async move {
            ctx.mark_virtual();
            if ctx.pipeline_has_changes() {
                ctx.set_result_virtual(true);
            }
            Ok(())
        })
    })
}

/// Operation that records `changed` and then returns `error`, if any.
#[must_use]
pub fn dummy_operation<E>(changed: bool, error: Option<E>) -> Operation<E>
where
    E: Clone + Send + Sync + 'static,
{
    operation(move |ctx| {
        let outcome = error.clone();
        Box::pin(async move {
            ctx.set_result(changed);
            outcome.map_or(Ok(()), Err)
        })
    })
}
