//! Per-identity, per-day attendance lifecycle.
//!
//! `Unmarked -> CheckedIn -> CheckedOut`, never backwards within a day.
//! Transitions are pure: the store applies them inside its own transaction
//! and persists the resulting state. Repeated actions are idempotent
//! informational outcomes, not errors; only an out-of-order check-out is a
//! rejection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The two externally-driven attendance actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceAction {
    CheckIn,
    CheckOut,
}

impl AttendanceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceAction::CheckIn => "check_in",
            AttendanceAction::CheckOut => "check_out",
        }
    }
}

impl std::str::FromStr for AttendanceAction {
    type Err = InvalidAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "check_in" => Ok(AttendanceAction::CheckIn),
            "check_out" => Ok(AttendanceAction::CheckOut),
            other => Err(InvalidAction(other.to_string())),
        }
    }
}

#[derive(Error, Debug)]
#[error("invalid action {0:?}; use \"check_in\" or \"check_out\"")]
pub struct InvalidAction(pub String);

/// One recorded check event: when, with what captured-frame reference, and at
/// what match confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckEvent {
    pub at: DateTime<Utc>,
    /// Reference to the captured frame (opaque to the core).
    pub evidence: String,
    pub confidence: f64,
}

/// State of one (identity, calendar day) pair.
#[derive(Debug, Clone, PartialEq)]
pub enum DayState {
    Unmarked,
    CheckedIn {
        check_in: CheckEvent,
    },
    CheckedOut {
        check_in: CheckEvent,
        check_out: CheckEvent,
    },
}

impl DayState {
    pub fn check_in_time(&self) -> Option<DateTime<Utc>> {
        match self {
            DayState::Unmarked => None,
            DayState::CheckedIn { check_in } | DayState::CheckedOut { check_in, .. } => {
                Some(check_in.at)
            }
        }
    }

    pub fn check_out_time(&self) -> Option<DateTime<Utc>> {
        match self {
            DayState::CheckedOut { check_out, .. } => Some(check_out.at),
            _ => None,
        }
    }

    /// Elapsed whole seconds for this day at `now`.
    ///
    /// While still checked in, elapsed runs live against `now`; once checked
    /// out it is fixed. Never stored — always derived.
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> Option<i64> {
        match self {
            DayState::Unmarked => None,
            DayState::CheckedIn { check_in } => Some((now - check_in.at).num_seconds()),
            DayState::CheckedOut {
                check_in,
                check_out,
            } => Some((check_out.at - check_in.at).num_seconds()),
        }
    }
}

/// Outcome of applying an action to a day's state.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Resulting state. Unchanged for idempotent repeats.
    pub state: DayState,
    /// True when the action had already happened and nothing was mutated.
    pub already_marked: bool,
    /// Whole seconds between check-in and check-out (or the action time for
    /// a still-open day). Zero for a fresh check-in.
    pub elapsed_seconds: i64,
}

#[derive(Error, Debug, PartialEq)]
pub enum TransitionError {
    #[error("must check in before checking out")]
    MustCheckInFirst,
    #[error("check-out time precedes check-in time")]
    CheckOutBeforeCheckIn,
}

/// Apply `action` at `event` to `state`.
///
/// Idempotent repeats return the existing timestamps without mutating state;
/// the only rejection is a check-out with no prior check-in (and a clock
/// anomaly that would order check-out before check-in).
pub fn apply(
    state: &DayState,
    action: AttendanceAction,
    event: CheckEvent,
) -> Result<Transition, TransitionError> {
    match (action, state) {
        (AttendanceAction::CheckIn, DayState::Unmarked) => Ok(Transition {
            state: DayState::CheckedIn { check_in: event },
            already_marked: false,
            elapsed_seconds: 0,
        }),

        (AttendanceAction::CheckIn, current @ DayState::CheckedIn { .. })
        | (AttendanceAction::CheckIn, current @ DayState::CheckedOut { .. }) => Ok(Transition {
            already_marked: true,
            elapsed_seconds: current
                .elapsed_seconds(event.at)
                .unwrap_or(0),
            state: current.clone(),
        }),

        (AttendanceAction::CheckOut, DayState::Unmarked) => {
            Err(TransitionError::MustCheckInFirst)
        }

        (AttendanceAction::CheckOut, DayState::CheckedIn { check_in }) => {
            if event.at < check_in.at {
                return Err(TransitionError::CheckOutBeforeCheckIn);
            }
            let elapsed = (event.at - check_in.at).num_seconds();
            Ok(Transition {
                state: DayState::CheckedOut {
                    check_in: check_in.clone(),
                    check_out: event,
                },
                already_marked: false,
                elapsed_seconds: elapsed,
            })
        }

        (AttendanceAction::CheckOut, current @ DayState::CheckedOut { .. }) => Ok(Transition {
            already_marked: true,
            elapsed_seconds: current
                .elapsed_seconds(event.at)
                .unwrap_or(0),
            state: current.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 11, h, m, s).unwrap()
    }

    fn event(t: DateTime<Utc>) -> CheckEvent {
        CheckEvent {
            at: t,
            evidence: "frame.jpg".into(),
            confidence: 0.9,
        }
    }

    #[test]
    fn test_check_in_from_unmarked() {
        let t = apply(&DayState::Unmarked, AttendanceAction::CheckIn, event(at(9, 0, 0))).unwrap();
        assert!(!t.already_marked);
        assert_eq!(t.elapsed_seconds, 0);
        assert_eq!(t.state.check_in_time(), Some(at(9, 0, 0)));
    }

    #[test]
    fn test_check_in_is_idempotent() {
        let first =
            apply(&DayState::Unmarked, AttendanceAction::CheckIn, event(at(9, 0, 0))).unwrap();
        let second = apply(&first.state, AttendanceAction::CheckIn, event(at(10, 0, 0))).unwrap();
        assert!(second.already_marked);
        // State unchanged: original check-in time preserved
        assert_eq!(second.state.check_in_time(), Some(at(9, 0, 0)));
        // Live elapsed against the repeat's time
        assert_eq!(second.elapsed_seconds, 3600);
    }

    #[test]
    fn test_check_out_before_check_in_rejected() {
        let err = apply(&DayState::Unmarked, AttendanceAction::CheckOut, event(at(9, 0, 0)))
            .unwrap_err();
        assert_eq!(err, TransitionError::MustCheckInFirst);
    }

    #[test]
    fn test_check_out_computes_elapsed() {
        let checked_in =
            apply(&DayState::Unmarked, AttendanceAction::CheckIn, event(at(9, 0, 0))).unwrap();
        // 3661 seconds = 1h 1m 1s later
        let out = apply(
            &checked_in.state,
            AttendanceAction::CheckOut,
            event(at(10, 1, 1)),
        )
        .unwrap();
        assert!(!out.already_marked);
        assert_eq!(out.elapsed_seconds, 3661);
        assert_eq!(out.state.check_out_time(), Some(at(10, 1, 1)));
    }

    #[test]
    fn test_full_workday_scenario() {
        // Check in 09:00, out 17:30: 8.5 hours = 30600 seconds
        let morning =
            apply(&DayState::Unmarked, AttendanceAction::CheckIn, event(at(9, 0, 0))).unwrap();
        let evening = apply(
            &morning.state,
            AttendanceAction::CheckOut,
            event(at(17, 30, 0)),
        )
        .unwrap();
        assert_eq!(evening.elapsed_seconds, 30600);
        assert!(matches!(evening.state, DayState::CheckedOut { .. }));
    }

    #[test]
    fn test_check_out_is_idempotent() {
        let state = DayState::CheckedOut {
            check_in: event(at(9, 0, 0)),
            check_out: event(at(17, 0, 0)),
        };
        let repeat = apply(&state, AttendanceAction::CheckOut, event(at(18, 0, 0))).unwrap();
        assert!(repeat.already_marked);
        // Elapsed stays fixed at out - in, not the repeat's time
        assert_eq!(repeat.elapsed_seconds, 8 * 3600);
        assert_eq!(repeat.state, state);
    }

    #[test]
    fn test_check_in_after_check_out_is_idempotent() {
        let state = DayState::CheckedOut {
            check_in: event(at(9, 0, 0)),
            check_out: event(at(17, 0, 0)),
        };
        let repeat = apply(&state, AttendanceAction::CheckIn, event(at(18, 0, 0))).unwrap();
        assert!(repeat.already_marked);
        assert_eq!(repeat.state, state);
        assert_eq!(repeat.elapsed_seconds, 8 * 3600);
    }

    #[test]
    fn test_clock_skew_check_out_rejected() {
        let state = DayState::CheckedIn {
            check_in: event(at(9, 0, 0)),
        };
        let err = apply(&state, AttendanceAction::CheckOut, event(at(8, 0, 0))).unwrap_err();
        assert_eq!(err, TransitionError::CheckOutBeforeCheckIn);
    }

    #[test]
    fn test_live_elapsed_while_checked_in() {
        let state = DayState::CheckedIn {
            check_in: event(at(9, 0, 0)),
        };
        assert_eq!(state.elapsed_seconds(at(9, 30, 0)), Some(1800));
        assert_eq!(DayState::Unmarked.elapsed_seconds(at(9, 30, 0)), None);
    }

    #[test]
    fn test_action_wire_strings() {
        use std::str::FromStr;
        assert_eq!(
            AttendanceAction::from_str("check_in").unwrap(),
            AttendanceAction::CheckIn
        );
        assert_eq!(
            AttendanceAction::from_str("check_out").unwrap(),
            AttendanceAction::CheckOut
        );
        assert!(AttendanceAction::from_str("lunch").is_err());
        assert_eq!(AttendanceAction::CheckIn.as_str(), "check_in");
    }
}
