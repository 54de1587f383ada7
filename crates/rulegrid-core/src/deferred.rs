// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deferred rule execution.
//!
//! Deferral persists a rule body, its recovery body and the caller's bindings
//! in the rule-execution queue, to be fired later (and possibly repeatedly)
//! by an external consumer. The EF directive inside the condition is kept as
//! text: it governs future firings, not this submission.

use chrono::Utc;
use tracing::{debug, info};

use crate::compensation::{CompensationManager, CompensationScope, RecoveryOutcome};
use crate::conditions::SubmitConditions;
use crate::config::Config;
use crate::error::{DispatchError, Result};
use crate::marshal::Marshaler;
use crate::queue::{QueueId, QueueStore, SubmissionDescriptor, SubmissionQueueClient};
use crate::session::RuleSession;

/// Separator between the primary and recovery bodies of a queued action.
pub const ACTION_SEPARATOR: char = '|';

/// Join a primary and recovery body into one queued action.
///
/// The recovery body must not contain [`ACTION_SEPARATOR`]; it could not be
/// told apart from the primary body when the action is split again.
pub fn combine_action(primary: &str, recovery: &str) -> Result<String> {
    if recovery.contains(ACTION_SEPARATOR) {
        return Err(DispatchError::Action {
            reason: format!("recovery body '{recovery}' contains '{ACTION_SEPARATOR}'"),
        });
    }
    Ok(format!("{primary}{ACTION_SEPARATOR}{recovery}"))
}

/// Split a queued action back into its primary and recovery bodies.
///
/// Splits on the last separator, so a primary body may itself contain `|`.
/// An action without a separator has an empty recovery body.
pub fn split_action(action: &str) -> (&str, &str) {
    action
        .rsplit_once(ACTION_SEPARATOR)
        .unwrap_or((action, ""))
}

/// Persists rule bodies for later execution and compensates them.
pub struct DeferredDispatcher<S: QueueStore + ?Sized> {
    queue: SubmissionQueueClient<S>,
    compensation: CompensationManager<S>,
    marshaler: Marshaler,
}

impl<S: QueueStore + ?Sized> DeferredDispatcher<S> {
    /// Create a dispatcher submitting through `queue`.
    pub fn new(queue: SubmissionQueueClient<S>, marshaler: Marshaler) -> Self {
        Self {
            compensation: CompensationManager::new(queue.clone()),
            queue,
            marshaler,
        }
    }

    /// Create a dispatcher honoring the configured context limit.
    pub fn from_config(queue: SubmissionQueueClient<S>, config: &Config) -> Self {
        Self::new(queue, Marshaler::new(config.max_context_bytes))
    }

    /// The queue client used for submissions.
    pub fn queue(&self) -> &SubmissionQueueClient<S> {
        &self.queue
    }

    /// Queue `primary` (with `recovery`) under `condition`, capturing the
    /// session's bindings.
    ///
    /// On success the new id is pushed onto the session's compensation stack.
    /// On failure nothing is pushed and no entry exists. A `recovery` body
    /// containing [`ACTION_SEPARATOR`] is rejected before anything is queued.
    pub async fn defer(
        &self,
        session: &mut RuleSession,
        primary: &str,
        recovery: &str,
        condition: &str,
    ) -> Result<QueueId> {
        let action = combine_action(primary, recovery)?;
        let packed = self.marshaler.pack(&session.context, &[])?;
        let conditions = SubmitConditions::parse(condition, Utc::now())?;

        debug!(
            session_id = %session.id(),
            context_bytes = packed.len(),
            exec_address = conditions.exec_address.as_deref().unwrap_or(""),
            "Submitting deferred rule execution"
        );

        let descriptor = SubmissionDescriptor::new(
            action,
            condition.to_string(),
            packed,
            session.context.session.user_name.clone(),
            conditions,
        );
        let id = self.queue.submit(&descriptor).await?;

        session.compensation.push(id);
        info!(
            session_id = %session.id(),
            queue_id = %id,
            depth = session.compensation.len(),
            "Deferred rule execution accepted"
        );
        Ok(id)
    }

    /// Recovery for [`defer`](Self::defer): pop the latest submission and
    /// cancel it. Never fails the rule.
    pub async fn recover(&self, session: &mut RuleSession) -> RecoveryOutcome {
        let outcome = self
            .compensation
            .compensate_last(&mut session.compensation)
            .await;
        debug!(session_id = %session.id(), ?outcome, "Deferred execution recovery finished");
        outcome
    }

    /// Cancel every submission made in the session since `scope` was taken.
    pub async fn unwind(
        &self,
        session: &mut RuleSession,
        scope: CompensationScope,
    ) -> Vec<RecoveryOutcome> {
        self.compensation
            .unwind(&mut session.compensation, scope)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_and_split() {
        let action = combine_action("msiArchive(*path)", "msiRollback(*path)").unwrap();
        assert_eq!(action, "msiArchive(*path)|msiRollback(*path)");
        assert_eq!(
            split_action(&action),
            ("msiArchive(*path)", "msiRollback(*path)")
        );
    }

    #[test]
    fn test_split_keeps_separator_in_primary() {
        assert_eq!(split_action("a|b|nop"), ("a|b", "nop"));
        assert_eq!(split_action("a|"), ("a", ""));
        assert_eq!(split_action("bare"), ("bare", ""));

        let action = combine_action("a|b", "nop").unwrap();
        assert_eq!(split_action(&action), ("a|b", "nop"));
    }

    #[test]
    fn test_combine_rejects_separator_in_recovery() {
        let err = combine_action("msiA", "msiUndo|msiAlso").unwrap_err();
        assert!(matches!(err, DispatchError::Action { .. }));
        assert_eq!(err.status(), crate::error::status::ACTION_ERR);
    }
}
