// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Execution-frequency (EF) directive parsing.
//!
//! An EF directive controls how a deferred rule re-fires:
//!
//! ```text
//! <digits><unit> [<directive>]
//!
//! unit      := s | m | h | d | y
//! directive := REPEAT FOR EVER | REPEAT UNTIL SUCCESS | REPEAT <N> TIMES
//!            | REPEAT UNTIL <time> | REPEAT UNTIL SUCCESS OR UNTIL <time>
//!            | REPEAT UNTIL SUCCESS OR <N> TIMES
//!            | DOUBLE FOR EVER | DOUBLE UNTIL SUCCESS | DOUBLE <N> TIMES
//!            | DOUBLE UNTIL <time> | DOUBLE UNTIL SUCCESS OR UNTIL <time>
//!            | DOUBLE UNTIL SUCCESS OR <N> TIMES
//!            | DOUBLE UNTIL SUCCESS UPTO <time>
//! ```
//!
//! An absent directive means `REPEAT FOR EVER`. Keywords are case-sensitive.
//! `<time>` uses the grammar in [`crate::date`]. Directive text embedded in a
//! tagged condition ends at the first `<`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::date::{self, TimeUnit};
use crate::error::{DispatchError, Result};

/// How the delay evolves between firings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Mode {
    /// Same delay every firing.
    Repeat,
    /// Delay doubles after every firing.
    Double,
}

impl Mode {
    /// Keyword used in directive text.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Repeat => "REPEAT",
            Self::Double => "DOUBLE",
        }
    }
}

/// Termination kind without its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminationKind {
    /// Never stops.
    ForEver,
    /// Stops after the first successful firing.
    UntilSuccess,
    /// Stops after N firings.
    NTimes,
    /// Stops once a time is reached.
    UntilTime,
    /// Stops on success or once a time is reached.
    UntilSuccessOrTime,
    /// Stops on success or after N firings.
    UntilSuccessOrNTimes,
    /// Stops on success; doubling stops at a time.
    UntilSuccessUptoTime,
}

/// When a deferred rule stops re-firing.
///
/// Times are absolute epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Termination {
    /// `FOR EVER`
    ForEver,
    /// `UNTIL SUCCESS`
    UntilSuccess,
    /// `<N> TIMES`
    Times(u32),
    /// `UNTIL <time>`
    UntilTime(i64),
    /// `UNTIL SUCCESS OR UNTIL <time>`
    UntilSuccessOrTime(i64),
    /// `UNTIL SUCCESS OR <N> TIMES`
    UntilSuccessOrTimes(u32),
    /// `UNTIL SUCCESS UPTO <time>` (DOUBLE only)
    UntilSuccessUptoTime(i64),
}

impl Termination {
    /// The kind of this termination.
    pub fn kind(&self) -> TerminationKind {
        match self {
            Self::ForEver => TerminationKind::ForEver,
            Self::UntilSuccess => TerminationKind::UntilSuccess,
            Self::Times(_) => TerminationKind::NTimes,
            Self::UntilTime(_) => TerminationKind::UntilTime,
            Self::UntilSuccessOrTime(_) => TerminationKind::UntilSuccessOrTime,
            Self::UntilSuccessOrTimes(_) => TerminationKind::UntilSuccessOrNTimes,
            Self::UntilSuccessUptoTime(_) => TerminationKind::UntilSuccessUptoTime,
        }
    }

    /// Count or epoch-seconds value, when the kind carries one.
    pub fn value(&self) -> Option<i64> {
        match self {
            Self::ForEver | Self::UntilSuccess => None,
            Self::Times(n) | Self::UntilSuccessOrTimes(n) => Some(i64::from(*n)),
            Self::UntilTime(t) | Self::UntilSuccessOrTime(t) | Self::UntilSuccessUptoTime(t) => {
                Some(*t)
            }
        }
    }

    /// Whether a successful firing ends the schedule.
    pub fn stops_on_success(&self) -> bool {
        matches!(
            self,
            Self::UntilSuccess
                | Self::UntilSuccessOrTime(_)
                | Self::UntilSuccessOrTimes(_)
                | Self::UntilSuccessUptoTime(_)
        )
    }
}

/// Parsed execution-frequency directive.
///
/// Immutable: advancing a schedule produces a new policy
/// (see [`crate::schedule`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Policy {
    pub(crate) mode: Mode,
    pub(crate) magnitude: u64,
    pub(crate) unit: TimeUnit,
    pub(crate) termination: Termination,
}

impl Policy {
    /// Parse an EF directive.
    pub fn parse(directive: &str) -> Result<Self> {
        let fail = |reason: &str| DispatchError::PolicyParse {
            directive: directive.to_string(),
            reason: reason.to_string(),
        };

        let text = directive.split('<').next().unwrap_or_default().trim();

        let digits_end = text
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(text.len());
        if digits_end == 0 {
            return Err(fail("delay must start with a numeric magnitude"));
        }
        let magnitude: u64 = text[..digits_end]
            .parse()
            .map_err(|_| fail("delay magnitude is out of range"))?;

        let unit_char = text[digits_end..]
            .chars()
            .next()
            .ok_or_else(|| fail("delay has no time unit"))?;
        let unit = TimeUnit::from_char(unit_char).map_err(|e| fail(&e.to_string()))?;

        let rest = &text[digits_end + unit_char.len_utf8()..];
        if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
            return Err(fail("time unit must be a single character"));
        }

        let words: Vec<&str> = rest.split_whitespace().collect();
        let (mode, termination) = parse_directive(&words).map_err(|reason| fail(&reason))?;

        Ok(Self {
            mode,
            magnitude,
            unit,
            termination,
        })
    }

    /// Delay evolution mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Delay magnitude in `unit`s.
    pub fn magnitude(&self) -> u64 {
        self.magnitude
    }

    /// Delay unit.
    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    /// Termination condition.
    pub fn termination(&self) -> Termination {
        self.termination
    }

    /// Termination kind.
    pub fn termination_kind(&self) -> TerminationKind {
        self.termination.kind()
    }

    /// Termination count or epoch-seconds value.
    pub fn termination_value(&self) -> Option<i64> {
        self.termination.value()
    }

    /// Delay in seconds, saturating at `i64::MAX`.
    pub fn delay_seconds(&self) -> i64 {
        i64::try_from(self.magnitude)
            .unwrap_or(i64::MAX)
            .saturating_mul(self.unit.seconds())
    }
}

impl FromStr for Policy {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{} {} ",
            self.magnitude,
            self.unit.as_char(),
            self.mode.as_str()
        )?;
        match self.termination {
            Termination::ForEver => f.write_str("FOR EVER"),
            Termination::UntilSuccess => f.write_str("UNTIL SUCCESS"),
            Termination::Times(n) => write!(f, "{n} TIMES"),
            Termination::UntilTime(t) => write!(f, "UNTIL {}", date::format_human_date(t)),
            Termination::UntilSuccessOrTime(t) => {
                write!(f, "UNTIL SUCCESS OR UNTIL {}", date::format_human_date(t))
            }
            Termination::UntilSuccessOrTimes(n) => write!(f, "UNTIL SUCCESS OR {n} TIMES"),
            Termination::UntilSuccessUptoTime(t) => {
                write!(f, "UNTIL SUCCESS UPTO {}", date::format_human_date(t))
            }
        }
    }
}

fn parse_directive(words: &[&str]) -> std::result::Result<(Mode, Termination), String> {
    let Some((first, rest)) = words.split_first() else {
        return Ok((Mode::Repeat, Termination::ForEver));
    };
    let mode = match *first {
        "REPEAT" => Mode::Repeat,
        "DOUBLE" => Mode::Double,
        other => return Err(format!("unknown directive keyword '{other}'")),
    };

    let termination = match rest {
        ["FOR", "EVER"] => Termination::ForEver,
        ["UNTIL", "SUCCESS"] => Termination::UntilSuccess,
        [n, "TIMES"] => Termination::Times(parse_count(n)?),
        ["UNTIL", "SUCCESS", "OR", "UNTIL", t] => Termination::UntilSuccessOrTime(parse_time(t)?),
        ["UNTIL", "SUCCESS", "OR", n, "TIMES"] => {
            Termination::UntilSuccessOrTimes(parse_count(n)?)
        }
        ["UNTIL", "SUCCESS", "UPTO", t] if mode == Mode::Double => {
            Termination::UntilSuccessUptoTime(parse_time(t)?)
        }
        ["UNTIL", t] => Termination::UntilTime(parse_time(t)?),
        _ => {
            return Err(format!("unknown directive '{}'", words.join(" ")));
        }
    };
    Ok((mode, termination))
}

fn parse_count(word: &str) -> std::result::Result<u32, String> {
    if word.is_empty() || !word.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("'{word}' is not a non-negative count"));
    }
    word.parse()
        .map_err(|_| format!("count '{word}' is out of range"))
}

fn parse_time(word: &str) -> std::result::Result<i64, String> {
    date::parse_human_date(word).map_err(|e| e.to_string())
}
