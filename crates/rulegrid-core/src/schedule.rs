// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Advancing a deferred entry's schedule after it fires.
//!
//! Used by the queue consumer, not by the dispatch path: this crate never
//! re-fires entries itself. The consumer calls [`reschedule`] with the
//! entry's raw EF text and stores the result via
//! [`QueueStore::update_schedule`](crate::queue::QueueStore::update_schedule),
//! or deletes the entry on [`Reschedule::Done`].

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::{DispatchError, Result};
use crate::policy::{Mode, Policy, Termination};

/// What to do with an entry after a firing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reschedule {
    /// The schedule is finished; remove the entry.
    Done,
    /// Fire again.
    Again {
        /// When the entry is next due.
        next_time: DateTime<Utc>,
        /// Rewritten EF directive to store with the entry.
        frequency: String,
    },
}

/// Work out the next firing of an entry that fired at `fired_at`.
///
/// `frequency` is the entry's raw EF text; `None` or blank means a one-shot
/// entry.
pub fn reschedule(
    frequency: Option<&str>,
    succeeded: bool,
    fired_at: DateTime<Utc>,
) -> Result<Reschedule> {
    let Some(text) = frequency.map(str::trim).filter(|f| !f.is_empty()) else {
        return Ok(Reschedule::Done);
    };
    let policy = Policy::parse(text)?;

    if succeeded && policy.termination.stops_on_success() {
        return Ok(Reschedule::Done);
    }

    let termination = match policy.termination {
        Termination::Times(n) | Termination::UntilSuccessOrTimes(n) if n <= 1 => {
            return Ok(Reschedule::Done);
        }
        Termination::Times(n) => Termination::Times(n - 1),
        Termination::UntilSuccessOrTimes(n) => Termination::UntilSuccessOrTimes(n - 1),
        other => other,
    };

    let next_time = after(fired_at, policy.delay_seconds(), text)?;
    if let Termination::UntilTime(until) | Termination::UntilSuccessOrTime(until) = termination
        && next_time.timestamp() > until
    {
        return Ok(Reschedule::Done);
    }

    let magnitude = match (policy.mode, termination) {
        (Mode::Repeat, _) => policy.magnitude,
        (Mode::Double, Termination::UntilSuccessUptoTime(until)) => {
            let doubled = after(fired_at, policy.delay_seconds().saturating_mul(2), text)?;
            if doubled.timestamp() <= until {
                policy.magnitude.saturating_mul(2)
            } else {
                policy.magnitude
            }
        }
        (Mode::Double, _) => policy.magnitude.saturating_mul(2),
    };

    let next = Policy {
        magnitude,
        termination,
        ..policy
    };
    Ok(Reschedule::Again {
        next_time,
        frequency: next.to_string(),
    })
}

fn after(from: DateTime<Utc>, seconds: i64, directive: &str) -> Result<DateTime<Utc>> {
    TimeDelta::try_seconds(seconds)
        .and_then(|delta| from.checked_add_signed(delta))
        .ok_or_else(|| DispatchError::PolicyParse {
            directive: directive.to_string(),
            reason: "next firing time is out of range".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(epoch: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(epoch, 0).unwrap()
    }

    fn again(result: Reschedule) -> (i64, String) {
        match result {
            Reschedule::Again {
                next_time,
                frequency,
            } => (next_time.timestamp(), frequency),
            Reschedule::Done => panic!("expected another firing"),
        }
    }

    #[test]
    fn test_one_shot_is_done() {
        assert_eq!(reschedule(None, false, at(0)).unwrap(), Reschedule::Done);
        assert_eq!(reschedule(Some("  "), true, at(0)).unwrap(), Reschedule::Done);
    }

    #[test]
    fn test_repeat_for_ever_keeps_delay() {
        let (next, freq) = again(reschedule(Some("10m"), true, at(1_000)).unwrap());
        assert_eq!(next, 1_600);
        assert_eq!(freq, "10m REPEAT FOR EVER");
    }

    #[test]
    fn test_until_success_stops_on_success() {
        let r = reschedule(Some("1h REPEAT UNTIL SUCCESS"), true, at(0)).unwrap();
        assert_eq!(r, Reschedule::Done);

        let failed = reschedule(Some("1h REPEAT UNTIL SUCCESS"), false, at(0)).unwrap();
        let (next, freq) = again(failed);
        assert_eq!(next, 3_600);
        assert_eq!(freq, "1h REPEAT UNTIL SUCCESS");
    }

    #[test]
    fn test_times_counts_down() {
        let (_, freq) = again(reschedule(Some("5s REPEAT 3 TIMES"), true, at(0)).unwrap());
        assert_eq!(freq, "5s REPEAT 2 TIMES");
        let (_, freq) = again(reschedule(Some(&freq), true, at(5)).unwrap());
        assert_eq!(freq, "5s REPEAT 1 TIMES");
        assert_eq!(reschedule(Some(&freq), true, at(10)).unwrap(), Reschedule::Done);

        let (_, freq) =
            again(reschedule(Some("5s DOUBLE UNTIL SUCCESS OR 2 TIMES"), false, at(0)).unwrap());
        assert_eq!(freq, "10s DOUBLE UNTIL SUCCESS OR 1 TIMES");
    }

    #[test]
    fn test_until_time_stops_past_deadline() {
        // 2030-06-15-12.30.45 is 1907757045
        let freq = "1d REPEAT UNTIL 2030-06-15-12.30.45";
        let (next, _) = again(reschedule(Some(freq), false, at(1_907_757_045 - 86_400)).unwrap());
        assert_eq!(next, 1_907_757_045);
        assert_eq!(
            reschedule(Some(freq), false, at(1_907_757_045 - 86_399)).unwrap(),
            Reschedule::Done
        );
    }

    #[test]
    fn test_double_doubles_each_firing() {
        let (next, freq) = again(reschedule(Some("1m DOUBLE FOR EVER"), false, at(0)).unwrap());
        assert_eq!(next, 60);
        assert_eq!(freq, "2m DOUBLE FOR EVER");
        let (next, freq) = again(reschedule(Some(&freq), false, at(60)).unwrap());
        assert_eq!(next, 180);
        assert_eq!(freq, "4m DOUBLE FOR EVER");
    }

    #[test]
    fn test_double_upto_caps_growth_at_time() {
        // deadline 1907757045; doubling 1h to 2h stays before it, 2h to 4h does not
        let fired = 1_907_757_045 - 3 * 3_600;
        let (_, freq) = again(
            reschedule(
                Some("1h DOUBLE UNTIL SUCCESS UPTO 2030-06-15-12.30.45"),
                false,
                at(fired),
            )
            .unwrap(),
        );
        assert_eq!(freq, "2h DOUBLE UNTIL SUCCESS UPTO 2030-06-15-12.30.45");

        let (next, freq) = again(reschedule(Some(&freq), false, at(fired)).unwrap());
        assert_eq!(next, fired + 7_200);
        assert_eq!(freq, "2h DOUBLE UNTIL SUCCESS UPTO 2030-06-15-12.30.45");

        let r = reschedule(Some(&freq), true, at(fired)).unwrap();
        assert_eq!(r, Reschedule::Done);
    }

    #[test]
    fn test_malformed_frequency_is_error() {
        let err = reschedule(Some("soon"), false, at(0)).unwrap_err();
        assert!(matches!(err, DispatchError::PolicyParse { .. }));
    }
}
