// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process queue store for embedded deployments and tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{QueueEntry, QueueId, QueueStore, SubmissionDescriptor};
use crate::error::Result;

#[derive(Default)]
struct State {
    next_id: i64,
    entries: BTreeMap<i64, QueueEntry>,
}

/// Queue store held in memory. Entries are lost when the store is dropped.
#[derive(Default)]
pub struct InMemoryQueueStore {
    state: Mutex<State>,
}

impl InMemoryQueueStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued entries.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    /// Whether the store holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn submit_entry(&self, descriptor: &SubmissionDescriptor) -> Result<QueueId> {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let id = state.next_id;
        state.entries.insert(
            id,
            QueueEntry {
                id,
                action: descriptor.action.clone(),
                condition: descriptor.condition.clone(),
                context: descriptor.context.to_vec(),
                user_name: descriptor.user_name.clone(),
                exec_address: descriptor.exec_address.clone(),
                exec_time: descriptor.exec_time,
                frequency: descriptor.frequency.clone(),
                priority: descriptor.priority,
                notification_addr: descriptor.notification_addr.clone(),
                created_at: Utc::now(),
            },
        );
        Ok(QueueId::new(id))
    }

    async fn delete_entry(&self, id: QueueId) -> Result<bool> {
        Ok(self.state.lock().await.entries.remove(&id.get()).is_some())
    }

    async fn get_entry(&self, id: QueueId) -> Result<Option<QueueEntry>> {
        Ok(self.state.lock().await.entries.get(&id.get()).cloned())
    }

    async fn due_entries(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<QueueEntry>> {
        let state = self.state.lock().await;
        let mut due: Vec<QueueEntry> = state
            .entries
            .values()
            .filter(|e| e.exec_time <= now)
            .cloned()
            .collect();
        due.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.exec_time.cmp(&b.exec_time))
                .then(a.id.cmp(&b.id))
        });
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn update_schedule(
        &self,
        id: QueueId,
        exec_time: DateTime<Utc>,
        frequency: Option<&str>,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state.entries.get_mut(&id.get()) {
            Some(entry) => {
                entry.exec_time = exec_time;
                entry.frequency = frequency.map(str::to_string);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
