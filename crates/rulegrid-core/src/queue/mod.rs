// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistent rule-execution queue.
//!
//! This module defines the queue store abstraction, the submission client the
//! dispatchers use, and two store backends.

pub mod memory;
pub mod sqlite;

pub use self::memory::InMemoryQueueStore;
pub use self::sqlite::SqliteQueueStore;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::conditions::SubmitConditions;
use crate::error::{DispatchError, Result};

/// Opaque identifier of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueId(i64);

impl QueueId {
    /// Wrap a store-assigned id.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// The raw store id.
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// Durable unit of deferred work handed to the queue store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionDescriptor {
    /// Primary and recovery bodies joined by the action separator.
    pub action: String,
    /// Original condition string, EF directive included.
    pub condition: String,
    /// Packed execution context.
    pub context: Bytes,
    /// User the entry runs as.
    pub user_name: String,
    /// Host where the entry should run.
    pub exec_address: Option<String>,
    /// When the entry first becomes due.
    pub exec_time: DateTime<Utc>,
    /// Raw EF directive.
    pub frequency: Option<String>,
    /// Entry priority.
    pub priority: i32,
    /// Address notified about executions.
    pub notification_addr: Option<String>,
}

impl SubmissionDescriptor {
    /// Build a descriptor from its parts and the extracted condition tags.
    pub fn new(
        action: String,
        condition: String,
        context: Bytes,
        user_name: String,
        conditions: SubmitConditions,
    ) -> Self {
        Self {
            action,
            condition,
            context,
            user_name,
            exec_address: conditions.exec_address,
            exec_time: conditions.exec_time,
            frequency: conditions.frequency,
            priority: conditions.priority,
            notification_addr: conditions.notification_addr,
        }
    }
}

/// Queue entry as stored.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct QueueEntry {
    /// Store primary key.
    pub id: i64,
    /// Combined action string.
    pub action: String,
    /// Original condition string.
    pub condition: String,
    /// Packed execution context.
    pub context: Vec<u8>,
    /// User the entry runs as.
    pub user_name: String,
    /// Host where the entry should run.
    pub exec_address: Option<String>,
    /// When the entry is next due.
    pub exec_time: DateTime<Utc>,
    /// Current EF directive (rewritten as the entry re-fires).
    pub frequency: Option<String>,
    /// Entry priority.
    pub priority: i32,
    /// Address notified about executions.
    pub notification_addr: Option<String>,
    /// When the entry was submitted.
    pub created_at: DateTime<Utc>,
}

impl QueueEntry {
    /// The entry's identifier.
    pub fn queue_id(&self) -> QueueId {
        QueueId(self.id)
    }
}

/// Storage backing the rule-execution queue.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Create one entry and return its id. A failed call creates nothing.
    async fn submit_entry(&self, descriptor: &SubmissionDescriptor) -> Result<QueueId>;

    /// Delete an entry. Returns `false` when no entry had that id.
    async fn delete_entry(&self, id: QueueId) -> Result<bool>;

    /// Look up an entry.
    async fn get_entry(&self, id: QueueId) -> Result<Option<QueueEntry>>;

    /// Entries due at or before `now`, highest priority first, then oldest
    /// execution time.
    async fn due_entries(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<QueueEntry>>;

    /// Move an entry to its next firing. Returns `false` when no entry had
    /// that id.
    async fn update_schedule(
        &self,
        id: QueueId,
        exec_time: DateTime<Utc>,
        frequency: Option<&str>,
    ) -> Result<bool>;
}

/// Submit/cancel client over a queue store.
///
/// One call is one store round trip; nothing is cached or batched.
pub struct SubmissionQueueClient<S: QueueStore + ?Sized> {
    store: Arc<S>,
}

impl<S: QueueStore + ?Sized> Clone for SubmissionQueueClient<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: QueueStore + ?Sized> SubmissionQueueClient<S> {
    /// Create a client over a shared store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Persist a descriptor and return the new entry's id.
    pub async fn submit(&self, descriptor: &SubmissionDescriptor) -> Result<QueueId> {
        let id = self.store.submit_entry(descriptor).await?;
        info!(
            queue_id = %id,
            user = %descriptor.user_name,
            exec_time = %descriptor.exec_time,
            frequency = descriptor.frequency.as_deref().unwrap_or(""),
            "Rule execution queued"
        );
        Ok(id)
    }

    /// Remove an entry. Unknown ids are reported as `NotFound`.
    pub async fn cancel(&self, id: QueueId) -> Result<()> {
        if !self.store.delete_entry(id).await? {
            debug!(queue_id = %id, "Cancel requested for unknown queue entry");
            return Err(DispatchError::NotFound { queue_id: id });
        }
        info!(queue_id = %id, "Rule execution cancelled");
        Ok(())
    }
}
