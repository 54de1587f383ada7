// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Read-only table of operations available to rules.
//!
//! Built once at process start, then shared behind an `Arc` by every session.

use std::collections::BTreeMap;

use crate::context::Record;

/// Dispatch operations provided by this crate.
pub const CORE_OPERATIONS: &[&str] = &["delayExec", "recover_delayExec", "remoteExec"];

/// Where an operation comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationOrigin {
    /// Built into the dispatch core.
    Core,
    /// Provided by a loaded plugin.
    Plugin,
}

impl OperationOrigin {
    /// Label used when listing operations.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Plugin => "plugin",
        }
    }
}

/// Operation name → origin.
#[derive(Debug, Clone, Default)]
pub struct OperationRegistry {
    operations: BTreeMap<String, OperationOrigin>,
}

impl OperationRegistry {
    /// Registry holding the core dispatch operations.
    pub fn with_core_operations() -> Self {
        let operations = CORE_OPERATIONS
            .iter()
            .map(|name| (name.to_string(), OperationOrigin::Core))
            .collect();
        Self { operations }
    }

    /// Add plugin operations. Names already registered keep their origin.
    pub fn with_plugins<I, N>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        for name in names {
            self.operations
                .entry(name.into())
                .or_insert(OperationOrigin::Plugin);
        }
        self
    }

    /// Origin of `name`, if registered.
    pub fn origin(&self, name: &str) -> Option<OperationOrigin> {
        self.operations.get(name).copied()
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    /// Number of registered operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Every operation as a name → origin record; core operations first,
    /// each group in name order.
    pub fn list_enabled(&self) -> Record {
        let core = self
            .operations
            .iter()
            .filter(|(_, origin)| **origin == OperationOrigin::Core);
        let plugins = self
            .operations
            .iter()
            .filter(|(_, origin)| **origin == OperationOrigin::Plugin);
        core.chain(plugins)
            .map(|(name, origin)| (name.as_str(), origin.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_enabled_puts_core_first() {
        let registry =
            OperationRegistry::with_core_operations().with_plugins(["msiArchive", "msiAudit"]);
        let record = registry.list_enabled();
        let listed: Vec<(&str, &str)> = record.iter().collect();
        assert_eq!(
            listed,
            vec![
                ("delayExec", "core"),
                ("recover_delayExec", "core"),
                ("remoteExec", "core"),
                ("msiArchive", "plugin"),
                ("msiAudit", "plugin"),
            ]
        );
    }

    #[test]
    fn test_plugin_cannot_shadow_core() {
        let registry = OperationRegistry::with_core_operations().with_plugins(["delayExec"]);
        assert_eq!(registry.origin("delayExec"), Some(OperationOrigin::Core));
        assert_eq!(registry.len(), CORE_OPERATIONS.len());
        assert!(!registry.contains("msiMissing"));
    }
}
