// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Compensation of accepted deferred submissions.
//!
//! Every successful deferral pushes its queue id onto the session's
//! [`CompensationStack`]. A recovery routine pops the most recent id and
//! cancels the entry; a composite operation can take a [`CompensationScope`]
//! up front and unwind everything submitted since then on its failure path.
//! Ids are compensated in reverse order of submission.

use tracing::{debug, info, warn};

use crate::error::{DispatchError, Result};
use crate::queue::{QueueId, QueueStore, SubmissionQueueClient};

/// Session-local LIFO of queue ids awaiting possible compensation.
///
/// Never shared between sessions, so it needs no locking. Every push gets a
/// sequence number so a [`CompensationScope`] can tell which entries were
/// pushed after it was taken, whatever was popped in between.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompensationStack {
    entries: Vec<(u64, QueueId)>,
    next_seq: u64,
}

impl CompensationStack {
    /// Create an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted submission.
    pub fn push(&mut self, id: QueueId) {
        self.entries.push((self.next_seq, id));
        self.next_seq += 1;
    }

    /// Take the most recent submission.
    pub fn pop(&mut self) -> Result<QueueId> {
        self.entries
            .pop()
            .map(|(_, id)| id)
            .ok_or(DispatchError::EmptyStack)
    }

    /// Most recent submission, without removing it.
    pub fn peek(&self) -> Option<QueueId> {
        self.entries.last().map(|(_, id)| *id)
    }

    /// Number of tracked submissions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Mark the start of a composite operation.
    pub fn scope(&self) -> CompensationScope {
        CompensationScope {
            mark: self.next_seq,
        }
    }

    /// Number of tracked submissions pushed since `scope` was taken.
    pub fn pending_in(&self, scope: &CompensationScope) -> usize {
        self.entries
            .iter()
            .rev()
            .take_while(|(seq, _)| *seq >= scope.mark)
            .count()
    }

    /// Pop the most recent submission if it was pushed inside `scope`.
    fn pop_within(&mut self, scope: &CompensationScope) -> Option<QueueId> {
        match self.entries.last() {
            Some((seq, _)) if *seq >= scope.mark => self.entries.pop().map(|(_, id)| id),
            _ => None,
        }
    }
}

/// Start of a composite operation on a [`CompensationStack`].
///
/// Dropping the scope keeps every submission made inside it (the success
/// path). Passing it to [`CompensationManager::unwind`] cancels those still
/// on the stack.
#[derive(Debug)]
#[must_use = "a scope does nothing unless unwound on failure"]
pub struct CompensationScope {
    mark: u64,
}

impl CompensationScope {
    /// Sequence number of the first push inside the scope.
    pub fn mark(&self) -> u64 {
        self.mark
    }
}

/// Result of one compensation attempt.
///
/// Recovery never fails the rule; failures are reported here instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// The entry was cancelled.
    Cancelled(QueueId),
    /// The stack was empty.
    NothingToCompensate,
    /// Cancelling the popped entry failed (for example, it already fired).
    CancelFailed {
        /// The popped id.
        queue_id: QueueId,
        /// Why the cancel failed.
        error: DispatchError,
    },
}

impl RecoveryOutcome {
    /// Whether an entry was actually cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

/// Pops and cancels tracked submissions.
pub struct CompensationManager<S: QueueStore + ?Sized> {
    queue: SubmissionQueueClient<S>,
}

impl<S: QueueStore + ?Sized> CompensationManager<S> {
    /// Create a manager cancelling through `queue`.
    pub fn new(queue: SubmissionQueueClient<S>) -> Self {
        Self { queue }
    }

    /// Pop the most recent submission and cancel it.
    pub async fn compensate_last(&self, stack: &mut CompensationStack) -> RecoveryOutcome {
        match stack.pop() {
            Ok(id) => self.cancel(id).await,
            Err(_) => {
                warn!("Recovery found no queued rule execution to compensate");
                RecoveryOutcome::NothingToCompensate
            }
        }
    }

    /// Cancel, newest first, every submission made since `scope` was taken.
    pub async fn unwind(
        &self,
        stack: &mut CompensationStack,
        scope: CompensationScope,
    ) -> Vec<RecoveryOutcome> {
        let pending = stack.pending_in(&scope);
        info!(
            count = pending,
            mark = scope.mark,
            "Unwinding composite rule submissions"
        );

        let mut outcomes = Vec::with_capacity(pending);
        while let Some(id) = stack.pop_within(&scope) {
            outcomes.push(self.cancel(id).await);
        }

        debug!(
            cancelled = outcomes.iter().filter(|o| o.is_cancelled()).count(),
            attempted = outcomes.len(),
            "Unwind finished"
        );
        outcomes
    }

    async fn cancel(&self, id: QueueId) -> RecoveryOutcome {
        match self.queue.cancel(id).await {
            Ok(()) => RecoveryOutcome::Cancelled(id),
            Err(error) => {
                warn!(queue_id = %id, error = %error, "Compensating cancel failed");
                RecoveryOutcome::CancelFailed {
                    queue_id: id,
                    error,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pop_order_is_lifo() {
        let mut stack = CompensationStack::new();
        for id in 1..=3 {
            stack.push(QueueId::new(id));
        }
        assert_eq!(stack.pop(), Ok(QueueId::new(3)));
        assert_eq!(stack.pop(), Ok(QueueId::new(2)));
        assert_eq!(stack.pop(), Ok(QueueId::new(1)));
        assert_eq!(stack.pop(), Err(DispatchError::EmptyStack));
    }

    #[test]
    fn test_scope_counts_pushes_after_mark() {
        let mut stack = CompensationStack::new();
        stack.push(QueueId::new(1));
        let scope = stack.scope();
        stack.push(QueueId::new(2));
        assert_eq!(scope.mark(), 1);
        assert_eq!(stack.peek(), Some(QueueId::new(2)));
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.pending_in(&scope), 1);
    }

    #[test]
    fn test_scope_survives_pops_below_mark() {
        let mut stack = CompensationStack::new();
        stack.push(QueueId::new(1));
        stack.push(QueueId::new(2));
        let scope = stack.scope();
        stack.pop().unwrap();
        stack.pop().unwrap();
        stack.push(QueueId::new(3));

        assert_eq!(stack.pending_in(&scope), 1);
        assert_eq!(stack.pop_within(&scope), Some(QueueId::new(3)));
        assert_eq!(stack.pop_within(&scope), None);
    }

    #[test]
    fn test_pop_within_stops_at_older_entries() {
        let mut stack = CompensationStack::new();
        stack.push(QueueId::new(1));
        let scope = stack.scope();
        stack.push(QueueId::new(2));

        assert_eq!(stack.pop_within(&scope), Some(QueueId::new(2)));
        assert_eq!(stack.pop_within(&scope), None);
        assert_eq!(stack.peek(), Some(QueueId::new(1)));
    }
}
