// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Synchronous remote rule execution.
//!
//! A rule body is shipped to a peer server together with a transfer-scoped
//! copy of the caller's bindings. When the peer answers, every binding it
//! produced is merged back into the caller's context. The caller's context is
//! not touched while the call is in flight.
//!
//! The wire transport and the rule-language expression evaluator are external
//! collaborators, reached through [`RemoteTransport`] and
//! [`ExpressionEvaluator`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::context::{ExecContext, Record, Value};
use crate::error::{ExecError, status};
use crate::marshal::Marshaler;

/// Condition side-channel key attached to every remote call.
pub const EXEC_CONDITION_KW: &str = "execCondition";

/// Port used when a host address names none.
pub const DEFAULT_PORT: u16 = 1247;

/// Resolved peer address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    /// Host name or address.
    pub host: String,
    /// Zone the peer belongs to, when the address names one.
    pub zone: Option<String>,
    /// Peer port.
    pub port: u16,
}

impl RemoteTarget {
    /// Parse `host`, `host:port` or `host:zone:port`.
    ///
    /// An empty port segment falls back to `default_port`.
    pub fn parse(addr: &str, default_port: u16) -> Result<Self, ExecError> {
        let addr = addr.trim();
        if addr.is_empty() {
            return Err(unresolved("host address is empty"));
        }

        let parts: Vec<&str> = addr.split(':').map(str::trim).collect();
        let (host, zone, port) = match parts.as_slice() {
            [host] => (*host, None, None),
            [host, port] => (*host, None, Some(*port)),
            [host, zone, port] => (*host, Some(*zone), Some(*port)),
            _ => return Err(unresolved(format!("malformed host address '{addr}'"))),
        };

        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(unresolved(format!("malformed host name in '{addr}'")));
        }

        let port = match port {
            None | Some("") => default_port,
            Some(p) => p
                .parse()
                .map_err(|_| unresolved(format!("invalid port '{p}' in '{addr}'")))?,
        };

        Ok(Self {
            host: host.to_string(),
            zone: zone.filter(|z| !z.is_empty()).map(str::to_string),
            port,
        })
    }
}

impl fmt::Display for RemoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.zone {
            Some(zone) => write!(f, "{}:{}:{}", self.host, zone, self.port),
            None => write!(f, "{}:{}", self.host, self.port),
        }
    }
}

fn unresolved(message: impl Into<String>) -> ExecError {
    ExecError::address_resolution(status::ADDRESS_RESOLUTION_ERR, message)
}

/// Call body shipped to the peer.
///
/// The two forms are dispatched differently by the peer and are not
/// interchangeable.
pub fn remote_call_body(primary: &str, recovery: &str) -> String {
    if recovery.is_empty() {
        format!("remExec{{{primary}}}")
    } else {
        format!("remExec||{primary}|{recovery}")
    }
}

/// One remote execution request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRequest {
    /// Combined call body.
    pub call_body: String,
    /// Side-channel key/value inputs, [`EXEC_CONDITION_KW`] included.
    pub cond_input: Record,
    /// Packed transfer-scoped context.
    pub context: Bytes,
    /// Ask the peer to return every binding it holds after execution.
    pub echo_all_params: bool,
}

/// Peer answer to a [`RemoteRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteResponse {
    /// Rule status on the peer; negative means failure.
    pub status: i32,
    /// Packed bindings after execution. Empty when the peer returned none.
    pub context: Bytes,
}

/// Transport failed before the peer answered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transport failed with status {status}: {message}")]
pub struct TransportError {
    /// Negative transport status.
    pub status: i32,
    /// Failure details.
    pub message: String,
}

/// Remote execution RPC.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Run `request` on `target` and wait for the answer.
    ///
    /// Timeout policy belongs to the implementation.
    async fn execute(
        &self,
        target: &RemoteTarget,
        request: RemoteRequest,
    ) -> Result<RemoteResponse, TransportError>;
}

/// Rule-language expression evaluation.
pub trait ExpressionEvaluator: Send + Sync {
    /// Evaluate `expr` against `context` to a literal, or fail with a
    /// negative status.
    fn evaluate(&self, expr: &str, context: &ExecContext) -> Result<String, i32>;
}

/// Minimal evaluator for host expressions.
///
/// `*name` resolves to the string bound to `*name`. A double-quoted literal
/// has its quotes stripped. Anything else is returned trimmed.
#[derive(Debug, Clone, Copy, Default)]
pub struct BindingEvaluator;

impl ExpressionEvaluator for BindingEvaluator {
    fn evaluate(&self, expr: &str, context: &ExecContext) -> Result<String, i32> {
        let expr = expr.trim();
        if expr.starts_with('*') {
            return match context.get(expr) {
                Some(Value::Str(s)) => Ok(s.clone()),
                _ => Err(status::ADDRESS_RESOLUTION_ERR),
            };
        }
        let literal = expr
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(expr);
        Ok(literal.to_string())
    }
}

/// Result of an answered remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteReport {
    /// Peer that ran the call.
    pub target: RemoteTarget,
    /// Status returned by the peer (non-negative here).
    pub status: i32,
    /// Bindings added or overwritten in the caller's context.
    pub merged: usize,
}

/// Ships rule bodies to peers and merges their bindings back.
pub struct RemoteDispatcher {
    transport: Arc<dyn RemoteTransport>,
    evaluator: Arc<dyn ExpressionEvaluator>,
    marshaler: Marshaler,
    default_port: u16,
}

impl RemoteDispatcher {
    /// Create a dispatcher using [`BindingEvaluator`] and the default port.
    pub fn new(transport: Arc<dyn RemoteTransport>) -> Self {
        Self {
            transport,
            evaluator: Arc::new(BindingEvaluator),
            marshaler: Marshaler::default(),
            default_port: DEFAULT_PORT,
        }
    }

    /// Create a dispatcher honoring the configured port and context limit.
    pub fn from_config(transport: Arc<dyn RemoteTransport>, config: &Config) -> Self {
        Self::new(transport)
            .with_default_port(config.default_port)
            .with_marshaler(Marshaler::new(config.max_context_bytes))
    }

    /// Replace the host expression evaluator.
    pub fn with_evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Replace the context marshaler.
    pub fn with_marshaler(mut self, marshaler: Marshaler) -> Self {
        self.marshaler = marshaler;
        self
    }

    /// Port used when a host address names none.
    pub fn with_default_port(mut self, port: u16) -> Self {
        self.default_port = port;
        self
    }

    /// Run `primary` on the host `host_expr` evaluates to.
    ///
    /// Bindings returned by the peer are merged into `context` whenever the
    /// peer answers, including when it answers with a negative status. A
    /// failure before the answer leaves `context` untouched. A negative peer
    /// status is reported as such even when the returned bindings cannot be
    /// unpacked.
    pub async fn dispatch_remote(
        &self,
        host_expr: &str,
        primary: &str,
        recovery: &str,
        condition: &str,
        context: &mut ExecContext,
    ) -> Result<RemoteReport, ExecError> {
        let host_addr = self
            .evaluator
            .evaluate(host_expr, context)
            .map_err(|code| {
                ExecError::address_resolution(code, format!("cannot evaluate '{host_expr}'"))
            })?;
        let target = RemoteTarget::parse(&host_addr, self.default_port)?;

        let mut cond_input = Record::new();
        cond_input.push(EXEC_CONDITION_KW, condition);

        let transfer = context.scoped_clone();
        let packed = self
            .marshaler
            .pack(&transfer, &[])
            .map_err(|e| ExecError::marshal(&e))?;

        let request = RemoteRequest {
            call_body: remote_call_body(primary, recovery),
            cond_input,
            context: packed,
            echo_all_params: true,
        };

        info!(host = %target, bindings = transfer.len(), "Dispatching remote rule execution");
        let response = self
            .transport
            .execute(&target, request)
            .await
            .map_err(|e| {
                warn!(
                    host = %target,
                    status = e.status,
                    error = %e.message,
                    "Remote transport failed"
                );
                ExecError::transport(e.status, e.message)
            })?;
        drop(transfer);

        let returned = if response.context.is_empty() {
            None
        } else {
            Some(self.marshaler.unpack(&response.context))
        };

        if response.status < 0 {
            // the peer's status wins over an unreadable answer
            match returned {
                Some(Ok((returned, _))) => {
                    let merged = context.merge_from(&returned);
                    debug!(host = %target, merged, "Merged bindings from failed remote execution");
                }
                Some(Err(e)) => {
                    warn!(
                        host = %target,
                        error = %e,
                        "Failed remote execution returned unreadable bindings"
                    );
                }
                None => {}
            }
            warn!(host = %target, status = response.status, "Remote rule execution failed");
            return Err(ExecError::remote_status(response.status));
        }

        let merged = match returned {
            Some(unpacked) => {
                let (returned, _) = unpacked.map_err(|e| ExecError::marshal(&e))?;
                context.merge_from(&returned)
            }
            None => 0,
        };
        debug!(host = %target, status = response.status, merged, "Remote rule execution answered");

        Ok(RemoteReport {
            target,
            status: response.status,
            merged,
        })
    }
}
