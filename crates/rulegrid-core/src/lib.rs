// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Rulegrid Core - Rule Execution Dispatch
//!
//! This crate decides where a unit of rule work runs: persisted in the
//! rule-execution queue for later (possibly periodic) execution, or shipped
//! synchronously to a peer server with its results merged back. Accepted
//! deferrals are tracked on a per-session compensation stack so a later
//! failure can cancel them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Rule interpreter (caller)                         │
//! │          delayExec / recover_delayExec / remoteExec operations          │
//! └─────────────────────────────────────────────────────────────────────────┘
//!           │                                              │
//!           │ defer / recover                              │ dispatch_remote
//!           ▼                                              ▼
//! ┌───────────────────────┐                    ┌─────────────────────────────┐
//! │  DeferredDispatcher   │                    │      RemoteDispatcher       │
//! │  SubmitConditions     │                    │  ExpressionEvaluator        │
//! │  CompensationManager  │                    │  RemoteTarget               │
//! └───────────────────────┘                    └─────────────────────────────┘
//!           │           │                        │               │
//!           │           └──────► Marshaler ◄─────┘               │
//!           ▼                                                    ▼
//! ┌───────────────────────┐                    ┌─────────────────────────────┐
//! │   QueueStore          │                    │     RemoteTransport         │
//! │ (SQLite / in-memory)  │                    │      (peer server)          │
//! └───────────────────────┘                    └─────────────────────────────┘
//!           ▲
//!           │ due_entries / update_schedule (reschedule)
//! ┌───────────────────────┐
//! │  External consumer    │
//! └───────────────────────┘
//! ```
//!
//! # Deferred Execution
//!
//! A deferral joins the primary and recovery bodies as `primary|recovery`,
//! packs the caller's bindings, extracts the tagged submission conditions and
//! stores one queue entry. The new id is pushed on the session's
//! [`CompensationStack`]; `recover_delayExec` pops it and cancels the entry.
//!
//! ## Condition Tags
//!
//! | Tag | Meaning |
//! |-----|---------|
//! | `EA` | Host where the rule should run |
//! | `ET` | Absolute first execution time (`YYYY-MM-DD-hh.mm.ss`) |
//! | `PLUSET` | First execution time relative to submission |
//! | `EF` | Execution-frequency directive ([`Policy`]) |
//! | `PRIORITY` | Entry priority |
//! | `NA` | Notification address |
//!
//! # Remote Execution
//!
//! The call body is `remExec||primary|recovery`, or `remExec{primary}` when
//! there is no recovery body. The peer receives a transfer-scoped copy of the
//! bindings; every binding it returns is merged additively into the caller's
//! context.
//!
//! # Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `RULEGRID_QUEUE_DATABASE_URL` | Yes | - | Queue store connection string |
//! | `RULEGRID_DEFAULT_PORT` | No | `1247` | Port used when a host address has none |
//! | `RULEGRID_LOCAL_ZONE` | No | `tempZone` | Zone stamped on new contexts |
//! | `RULEGRID_MAX_CONTEXT_BYTES` | No | `67108864` | Packed context size limit |
//!
//! # Modules
//!
//! - [`policy`]: Execution-frequency directive parser
//! - [`marshal`]: Context packing for persistence and remote transfer
//! - [`queue`]: Queue store trait, SQLite and in-memory stores, submit/cancel client
//! - [`deferred`]: Deferred dispatch and its recovery
//! - [`remote`]: Synchronous remote dispatch
//! - [`compensation`]: Compensation stack and scopes
//! - [`schedule`]: Next-firing computation for queue consumers

#![deny(missing_docs)]

/// Compensation stack, scopes and recovery outcomes.
pub mod compensation;

/// Tagged submission conditions.
pub mod conditions;

/// Configuration loaded from environment variables.
pub mod config;

/// Execution context bindings and ambient state.
pub mod context;

/// Human-readable date and offset parsing.
pub mod date;

/// Deferred dispatch through the rule-execution queue.
pub mod deferred;

/// Error types with rule status and error code mapping.
pub mod error;

/// Binary context packing.
pub mod marshal;

/// Execution-frequency directives.
pub mod policy;

/// Rule-execution queue stores and client.
pub mod queue;

/// Operation registry.
pub mod registry;

/// Synchronous remote dispatch.
pub mod remote;

/// Schedule advancement for fired entries.
pub mod schedule;

/// Per-invocation session state.
pub mod session;

pub use compensation::{CompensationManager, CompensationScope, CompensationStack, RecoveryOutcome};
pub use config::{Config, ConfigError};
pub use context::{ExecContext, Record, SessionInfo, Value};
pub use deferred::DeferredDispatcher;
pub use error::{DispatchError, ExecError, ExecErrorKind, Result};
pub use marshal::Marshaler;
pub use policy::{Mode, Policy, Termination, TerminationKind};
pub use queue::{
    InMemoryQueueStore, QueueEntry, QueueId, QueueStore, SqliteQueueStore, SubmissionDescriptor,
    SubmissionQueueClient,
};
pub use registry::OperationRegistry;
pub use remote::{
    BindingEvaluator, ExpressionEvaluator, RemoteDispatcher, RemoteReport, RemoteRequest,
    RemoteResponse, RemoteTarget, RemoteTransport, TransportError,
};
pub use schedule::{Reschedule, reschedule};
pub use session::RuleSession;
