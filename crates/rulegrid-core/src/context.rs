// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Execution context visible to one rule invocation.
//!
//! A context is a flat, ordered list of named bindings plus ambient fields
//! (session identity, zone, prior status). Binding values are one of three
//! kinds: string, opaque byte buffer, or structured record.

use serde::{Deserialize, Serialize};

/// Wire tag of a string binding.
pub const STRING_TAG: u8 = 1;
/// Wire tag of a buffer binding.
pub const BUFFER_TAG: u8 = 2;
/// Wire tag of a record binding.
pub const RECORD_TAG: u8 = 3;

/// Ordered key/value record.
///
/// Keys may repeat; lookups return the first match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pairs: Vec<(String, String)>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a key/value pair.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Iterate over pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether the record has no pairs.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            pairs: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Value of a context binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    /// Text value.
    Str(String),
    /// Opaque byte buffer.
    Buf(Vec<u8>),
    /// Structured key/value record.
    Record(Record),
}

impl Value {
    /// Wire tag of this value kind.
    pub fn tag(&self) -> u8 {
        match self {
            Self::Str(_) => STRING_TAG,
            Self::Buf(_) => BUFFER_TAG,
            Self::Record(_) => RECORD_TAG,
        }
    }

    /// Text content, for string values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Self::Buf(b)
    }
}

impl From<Record> for Value {
    fn from(r: Record) -> Self {
        Self::Record(r)
    }
}

/// Identity of the connection a rule runs on behalf of.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Authenticated user name.
    pub user_name: String,
    /// Host the client connected from.
    pub client_host: String,
}

/// Variable bindings and ambient state of one rule invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecContext {
    bindings: Vec<(String, Value)>,
    /// Invoking session.
    pub session: SessionInfo,
    /// Zone the invocation originated in.
    pub zone: String,
    /// Status code of the prior step.
    pub status: i32,
}

impl ExecContext {
    /// Create an empty context for a session in a zone.
    pub fn new(session: SessionInfo, zone: impl Into<String>) -> Self {
        Self {
            bindings: Vec::new(),
            session,
            zone: zone.into(),
            status: 0,
        }
    }

    /// Value bound to `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Bind `name`, overwriting in place or appending.
    ///
    /// Returns the previous value if there was one.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let name = name.into();
        let value = value.into();
        match self.bindings.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.bindings.push((name, value));
                None
            }
        }
    }

    /// Whether `name` is bound.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterate over bindings in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.bindings.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether there are no bindings.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Copy of this context scoped to a single transfer.
    pub fn scoped_clone(&self) -> Self {
        self.clone()
    }

    /// Copy into `self` every binding of `other` that is missing here or
    /// holds a different value. Never removes bindings.
    ///
    /// Returns the number of bindings added or overwritten.
    pub fn merge_from(&mut self, other: &ExecContext) -> usize {
        let mut changed = 0;
        for (name, value) in other.iter() {
            if self.get(name) != Some(value) {
                self.set(name, value.clone());
                changed += 1;
            }
        }
        changed
    }

    /// Binding-set equality, ignoring order.
    pub fn same_bindings(&self, other: &ExecContext) -> bool {
        self.len() == other.len() && self.iter().all(|(n, v)| other.get(n) == Some(v))
    }
}
