// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tagged submission conditions.
//!
//! A deferred rule's condition string carries `<TAG>value</TAG>` pairs:
//!
//! | Tag | Meaning |
//! |-----|---------|
//! | `EA` | host where the rule should run |
//! | `ET` | absolute first execution time |
//! | `PLUSET` | first execution time relative to submission (wins over `ET`) |
//! | `EF` | execution-frequency directive, kept as raw text |
//! | `PRIORITY` | integer priority |
//! | `NA` | notification address |
//!
//! Closing tags written `<//TAG>` are accepted. Other tags are ignored.

use chrono::{DateTime, TimeDelta, Utc};

use crate::date;
use crate::error::{DispatchError, Result};

/// Fields extracted from a condition string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitConditions {
    /// Host where the rule should run.
    pub exec_address: Option<String>,
    /// When the entry first becomes due.
    pub exec_time: DateTime<Utc>,
    /// Raw EF directive text.
    pub frequency: Option<String>,
    /// Entry priority (default 0).
    pub priority: i32,
    /// Address notified about executions.
    pub notification_addr: Option<String>,
}

impl SubmitConditions {
    /// Extract the tagged fields of `condition`, resolving times against `now`.
    pub fn parse(condition: &str, now: DateTime<Utc>) -> Result<Self> {
        let mut exec_time = now;

        if let Some(value) = tag_value(condition, "ET") {
            let epoch = date::parse_human_date(value).map_err(|e| invalid("ET", e))?;
            exec_time = DateTime::<Utc>::from_timestamp(epoch, 0)
                .ok_or_else(|| invalid("ET", "time is out of range"))?;
        }

        if let Some(value) = tag_value(condition, "PLUSET") {
            let offset = date::parse_offset(value).map_err(|e| invalid("PLUSET", e))?;
            exec_time = TimeDelta::try_seconds(offset)
                .and_then(|delta| now.checked_add_signed(delta))
                .ok_or_else(|| invalid("PLUSET", "offset is out of range"))?;
        }

        let priority = match tag_value(condition, "PRIORITY") {
            Some(value) => value
                .parse()
                .map_err(|_| invalid("PRIORITY", format!("'{value}' is not an integer")))?,
            None => 0,
        };

        Ok(Self {
            exec_address: tag_value(condition, "EA").map(str::to_string),
            exec_time,
            frequency: tag_value(condition, "EF").map(str::to_string),
            priority,
            notification_addr: tag_value(condition, "NA").map(str::to_string),
        })
    }
}

fn invalid(tag: &str, reason: impl ToString) -> DispatchError {
    DispatchError::Condition {
        tag: tag.to_string(),
        reason: reason.to_string(),
    }
}

/// Trimmed, non-empty value of `<tag>` in `condition`.
///
/// The value ends at `</tag>` or `<//tag>`, or at the next `<` when the tag
/// is never closed.
pub fn tag_value<'a>(condition: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let start = condition.find(&open)? + open.len();
    let rest = &condition[start..];

    let end = [format!("</{tag}>"), format!("<//{tag}>")]
        .iter()
        .filter_map(|close| rest.find(close.as_str()))
        .min()
        .or_else(|| rest.find('<'))
        .unwrap_or(rest.len());

    let value = rest[..end].trim();
    (!value.is_empty()).then_some(value)
}
