// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-invocation session state.

use std::sync::Arc;

use uuid::Uuid;

use crate::compensation::CompensationStack;
use crate::config::Config;
use crate::context::{ExecContext, Record, SessionInfo};
use crate::registry::OperationRegistry;

/// State owned by one rule-execution session.
///
/// A session is driven by a single task at a time and is never shared, so the
/// context and compensation stack are plain owned values. Only the operation
/// registry is shared (read-only) across sessions.
#[derive(Debug)]
pub struct RuleSession {
    id: Uuid,
    /// Bindings and ambient state visible to the rule.
    pub context: ExecContext,
    /// Submissions awaiting possible compensation.
    pub compensation: CompensationStack,
    registry: Arc<OperationRegistry>,
}

impl RuleSession {
    /// Start a session over `context`.
    pub fn new(context: ExecContext, registry: Arc<OperationRegistry>) -> Self {
        Self {
            id: Uuid::new_v4(),
            context,
            compensation: CompensationStack::new(),
            registry,
        }
    }

    /// Start a session for `user` with an empty context in the configured
    /// local zone.
    pub fn from_config(
        user: SessionInfo,
        registry: Arc<OperationRegistry>,
        config: &Config,
    ) -> Self {
        Self::new(ExecContext::new(user, config.local_zone.clone()), registry)
    }

    /// Session identifier, used in logs.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Shared operation registry.
    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    /// Enabled operations as a name → origin record.
    pub fn list_enabled_operations(&self) -> Record {
        self.registry.list_enabled()
    }
}
