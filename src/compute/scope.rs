//! Cancellation and deadline scopes for remote commands.
//!
//! An [`ExecScope`] is cheap to clone and may be narrowed with
//! [`ExecScope::with_timeout`] or [`ExecScope::with_cancel`]. A derived scope
//! is done as soon as any of its ancestors is done.

use std::future;
use std::time::Duration;

use futures::future::select_all;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};

/// Reason a scope finished before the guarded work completed.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum ScopeError {
    /// The scope was cancelled through a [`CancelHandle`].
    #[error("operation cancelled")]
    Cancelled,
    /// The scope's deadline elapsed.
    #[error("operation deadline exceeded")]
    DeadlineExceeded,
}

/// Deadline and cancellation signals governing a unit of work.
#[derive(Clone, Debug, Default)]
pub struct ExecScope {
    deadline: Option<Instant>,
    cancellers: Vec<watch::Receiver<bool>>,
}

/// Cancels the scope it was created with, and every scope derived from it.
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    /// Signals cancellation. Calling this more than once has no further effect.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

impl ExecScope {
    /// Returns a scope that is never cancelled and has no deadline.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// Derives a scope that expires after `timeout`, or earlier if this scope
    /// already carries a sooner deadline.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derives a scope that expires at `deadline`, keeping any earlier
    /// deadline inherited from this scope.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let effective = self
            .deadline
            .map_or(deadline, |current| current.min(deadline));
        Self {
            deadline: Some(effective),
            cancellers: self.cancellers.clone(),
        }
    }

    /// Derives a cancellable scope together with the handle that cancels it.
    #[must_use]
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let (sender, receiver) = watch::channel(false);
        let mut cancellers = self.cancellers.clone();
        cancellers.push(receiver);
        (
            Self {
                deadline: self.deadline,
                cancellers,
            },
            CancelHandle { sender },
        )
    }

    /// Returns the effective deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Reports whether the scope is already done without waiting.
    #[must_use]
    pub fn err(&self) -> Option<ScopeError> {
        if self.cancellers.iter().any(|receiver| *receiver.borrow()) {
            return Some(ScopeError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ScopeError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the scope is cancelled or its deadline passes.
    ///
    /// Never resolves for a background scope. Cancellation wins over an
    /// elapsed deadline when both are observable at the same time.
    pub async fn done(&self) -> ScopeError {
        let cancelled = self.cancelled();
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                reason = cancelled => reason,
                () = sleep_until(deadline) => ScopeError::DeadlineExceeded,
            },
            None => cancelled.await,
        }
    }

    async fn cancelled(&self) -> ScopeError {
        if self.cancellers.is_empty() {
            return future::pending().await;
        }
        let waiters = self.cancellers.iter().cloned().map(|mut receiver| {
            Box::pin(async move {
                let outcome = receiver.wait_for(|cancelled| *cancelled).await.map(|_| ());
                if outcome.is_ok() {
                    ScopeError::Cancelled
                } else {
                    // The handle was dropped without cancelling.
                    future::pending().await
                }
            })
        });
        select_all(waiters).await.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[tokio::test]
    async fn timeout_scope_reports_deadline_exceeded() {
        let scope = ExecScope::background().with_timeout(Duration::from_millis(20));
        assert_eq!(scope.err(), None);
        assert_eq!(scope.done().await, ScopeError::DeadlineExceeded);
        assert_eq!(scope.err(), Some(ScopeError::DeadlineExceeded));
    }

    #[rstest]
    #[tokio::test]
    async fn cancel_handle_cancels_derived_scopes() {
        let (parent, handle) = ExecScope::background().with_cancel();
        let child = parent.with_timeout(Duration::from_secs(60));
        handle.cancel();
        assert_eq!(child.done().await, ScopeError::Cancelled);
        assert_eq!(child.err(), Some(ScopeError::Cancelled));
    }

    #[rstest]
    fn nested_timeout_keeps_earliest_deadline() {
        let outer = ExecScope::background().with_timeout(Duration::from_secs(1));
        let inner = outer.with_timeout(Duration::from_secs(60));
        assert_eq!(inner.deadline(), outer.deadline());
    }

    #[rstest]
    #[tokio::test]
    async fn dropped_handle_does_not_cancel() {
        let (scope, handle) = ExecScope::background().with_cancel();
        drop(handle);
        let bounded = scope.with_timeout(Duration::from_millis(10));
        assert_eq!(bounded.done().await, ScopeError::DeadlineExceeded);
    }
}
