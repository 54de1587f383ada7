// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Human-date grammar shared by execution-frequency directives and
//! submission condition tags.
//!
//! Absolute times are written `YYYY-MM-DD-hh.mm.ss` and interpreted as UTC.
//! A bare integer is accepted as already-converted epoch seconds.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

const HUMAN_FORMAT: &str = "%Y-%m-%d-%H.%M.%S";

/// Date conversion errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DateError {
    /// Value is neither a human date nor epoch seconds.
    #[error("'{0}' is not a YYYY-MM-DD-hh.mm.ss date or epoch seconds")]
    Format(String),

    /// Relative offset is not `<digits>[unit]`.
    #[error("'{0}' is not a relative time offset")]
    Offset(String),

    /// Unit character outside `s,m,h,d,y`.
    #[error("unknown time unit '{0}'")]
    Unit(char),

    /// Value overflows the epoch-seconds range.
    #[error("time value '{0}' is out of range")]
    Overflow(String),
}

/// Time unit of a delay magnitude.
///
/// Years are 365 days; no leap-year correction is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    /// `s`
    Seconds,
    /// `m`
    Minutes,
    /// `h`
    Hours,
    /// `d`
    Days,
    /// `y`
    Years,
}

impl TimeUnit {
    /// Map a unit character to its unit.
    pub fn from_char(c: char) -> Result<Self, DateError> {
        match c {
            's' => Ok(Self::Seconds),
            'm' => Ok(Self::Minutes),
            'h' => Ok(Self::Hours),
            'd' => Ok(Self::Days),
            'y' => Ok(Self::Years),
            other => Err(DateError::Unit(other)),
        }
    }

    /// The unit character used in directive text.
    pub fn as_char(&self) -> char {
        match self {
            Self::Seconds => 's',
            Self::Minutes => 'm',
            Self::Hours => 'h',
            Self::Days => 'd',
            Self::Years => 'y',
        }
    }

    /// Length of one unit in seconds.
    pub fn seconds(&self) -> i64 {
        match self {
            Self::Seconds => 1,
            Self::Minutes => 60,
            Self::Hours => 60 * 60,
            Self::Days => 24 * 60 * 60,
            Self::Years => 365 * 24 * 60 * 60,
        }
    }
}

/// Convert a human date (or epoch-seconds string) to epoch seconds.
pub fn parse_human_date(value: &str) -> Result<i64, DateError> {
    let value = value.trim();
    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        return value
            .parse::<i64>()
            .map_err(|_| DateError::Overflow(value.to_string()));
    }
    NaiveDateTime::parse_from_str(value, HUMAN_FORMAT)
        .map(|dt| dt.and_utc().timestamp())
        .map_err(|_| DateError::Format(value.to_string()))
}

/// Render epoch seconds in the human date grammar.
pub fn format_human_date(epoch_seconds: i64) -> String {
    match DateTime::<Utc>::from_timestamp(epoch_seconds, 0) {
        Some(dt) => dt.format(HUMAN_FORMAT).to_string(),
        None => epoch_seconds.to_string(),
    }
}

/// Convert a relative offset `<digits>[unit]` to seconds.
///
/// The unit defaults to seconds when omitted.
pub fn parse_offset(value: &str) -> Result<i64, DateError> {
    let value = value.trim();
    let digits_end = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    if digits_end == 0 {
        return Err(DateError::Offset(value.to_string()));
    }
    let magnitude: i64 = value[..digits_end]
        .parse()
        .map_err(|_| DateError::Overflow(value.to_string()))?;

    let mut rest = value[digits_end..].chars();
    let unit = match (rest.next(), rest.next()) {
        (None, _) => TimeUnit::Seconds,
        (Some(c), None) => TimeUnit::from_char(c)?,
        _ => return Err(DateError::Offset(value.to_string())),
    };

    magnitude
        .checked_mul(unit.seconds())
        .ok_or_else(|| DateError::Overflow(value.to_string()))
}
