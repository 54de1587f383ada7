// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for rulegrid-core integration tests.
//!
//! Provides queue stores, sessions and a scripted remote transport.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use rulegrid_core::error::status;
use rulegrid_core::{
    DispatchError, ExecContext, Marshaler, OperationRegistry, QueueEntry, QueueId, QueueStore,
    RemoteRequest, RemoteResponse, RemoteTarget, RemoteTransport, RuleSession, SessionInfo,
    SubmissionDescriptor, TransportError,
};

/// Route crate logs to the test writer. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rulegrid_core=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Context for user `rods` in `tempZone` with a couple of bindings.
pub fn sample_context() -> ExecContext {
    let mut context = ExecContext::new(
        SessionInfo {
            user_name: "rods".to_string(),
            client_host: "10.0.0.4".to_string(),
        },
        "tempZone",
    );
    context.set("*obj", "/tempZone/home/rods/data.csv");
    context.set("*resc", "demoResc");
    context
}

/// Fresh session over [`sample_context`].
pub fn sample_session() -> RuleSession {
    RuleSession::new(
        sample_context(),
        Arc::new(OperationRegistry::with_core_operations()),
    )
}

/// Queue store whose writes always fail with a store status.
pub struct FailingStore {
    pub status: i32,
}

#[async_trait]
impl QueueStore for FailingStore {
    async fn submit_entry(
        &self,
        _descriptor: &SubmissionDescriptor,
    ) -> rulegrid_core::Result<QueueId> {
        Err(self.failure("submit"))
    }

    async fn delete_entry(&self, _id: QueueId) -> rulegrid_core::Result<bool> {
        Err(self.failure("delete"))
    }

    async fn get_entry(&self, _id: QueueId) -> rulegrid_core::Result<Option<QueueEntry>> {
        Ok(None)
    }

    async fn due_entries(
        &self,
        _now: DateTime<Utc>,
        _limit: u32,
    ) -> rulegrid_core::Result<Vec<QueueEntry>> {
        Ok(Vec::new())
    }

    async fn update_schedule(
        &self,
        _id: QueueId,
        _exec_time: DateTime<Utc>,
        _frequency: Option<&str>,
    ) -> rulegrid_core::Result<bool> {
        Err(self.failure("update"))
    }
}

impl FailingStore {
    fn failure(&self, operation: &str) -> DispatchError {
        DispatchError::Queue {
            operation: operation.to_string(),
            status: self.status,
            details: "catalog unavailable".to_string(),
        }
    }
}

/// What the scripted peer does with a request.
#[derive(Clone)]
pub enum PeerBehavior {
    /// Run `update` on the received bindings and answer with `status`.
    Answer {
        status: i32,
        update: fn(&mut ExecContext),
    },
    /// Answer with `status` and no bindings.
    AnswerEmpty { status: i32 },
    /// Answer with `status` and `context` as the packed bindings.
    AnswerRaw {
        status: i32,
        context: &'static [u8],
    },
    /// Fail at the transport level.
    Unreachable,
}

/// Remote transport that records requests and answers from a script.
pub struct ScriptedTransport {
    behavior: PeerBehavior,
    marshaler: Marshaler,
    pub requests: Mutex<Vec<(RemoteTarget, RemoteRequest)>>,
}

impl ScriptedTransport {
    pub fn new(behavior: PeerBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            marshaler: Marshaler::default(),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn recorded(&self) -> Vec<(RemoteTarget, RemoteRequest)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteTransport for ScriptedTransport {
    async fn execute(
        &self,
        target: &RemoteTarget,
        request: RemoteRequest,
    ) -> Result<RemoteResponse, TransportError> {
        self.requests
            .lock()
            .unwrap()
            .push((target.clone(), request.clone()));

        match &self.behavior {
            PeerBehavior::Answer { status, update } => {
                let (mut context, _) = self
                    .marshaler
                    .unpack(&request.context)
                    .map_err(|e| TransportError {
                        status: e.status(),
                        message: e.to_string(),
                    })?;
                update(&mut context);
                let packed = self
                    .marshaler
                    .pack(&context, &[])
                    .map_err(|e| TransportError {
                        status: e.status(),
                        message: e.to_string(),
                    })?;
                Ok(RemoteResponse {
                    status: *status,
                    context: packed,
                })
            }
            PeerBehavior::AnswerEmpty { status } => Ok(RemoteResponse {
                status: *status,
                context: Default::default(),
            }),
            PeerBehavior::AnswerRaw { status, context } => Ok(RemoteResponse {
                status: *status,
                context: Bytes::from_static(*context),
            }),
            PeerBehavior::Unreachable => Err(TransportError {
                status: status::TRANSPORT_ERR,
                message: "connection refused".to_string(),
            }),
        }
    }
}
