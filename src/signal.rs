//! Shift signal transition rules.
//!
//! | last       | allowed next     |
//! |------------|------------------|
//! | none       | start            |
//! | start      | pause, stop      |
//! | pause      | continue, stop   |
//! | continue   | pause, stop      |
//! | stop       | nothing          |
//!
//! Independently of the table, no signal is accepted while the driver has
//! an active ride.

use crate::model::SignalKind;

/// Whether `next` may follow `last` according to the transition table.
pub fn is_valid_transition(last: Option<SignalKind>, next: SignalKind) -> bool {
    use SignalKind::*;

    matches!(
        (last, next),
        (None, Start)
            | (Some(Start), Pause | Stop)
            | (Some(Pause), Continue | Stop)
            | (Some(Continue), Pause | Stop)
    )
}

/// Full signal check: the active-ride guard first, then the table.
pub fn is_signal_allowed(last: Option<SignalKind>, next: SignalKind, ride_active: bool) -> bool {
    !ride_active && is_valid_transition(last, next)
}

/// Signals that may follow `last`, in table order.
pub fn allowed_next(last: Option<SignalKind>) -> Vec<SignalKind> {
    SignalKind::ALL
        .into_iter()
        .filter(|next| is_valid_transition(last, *next))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use SignalKind::*;

    /// Every (last, next) pair in the 5x4 space with its expected verdict.
    const TABLE: [(Option<SignalKind>, SignalKind, bool); 20] = [
        (None, Start, true),
        (None, Pause, false),
        (None, Continue, false),
        (None, Stop, false),
        (Some(Start), Start, false),
        (Some(Start), Pause, true),
        (Some(Start), Continue, false),
        (Some(Start), Stop, true),
        (Some(Pause), Start, false),
        (Some(Pause), Pause, false),
        (Some(Pause), Continue, true),
        (Some(Pause), Stop, true),
        (Some(Continue), Start, false),
        (Some(Continue), Pause, true),
        (Some(Continue), Continue, false),
        (Some(Continue), Stop, true),
        (Some(Stop), Start, false),
        (Some(Stop), Pause, false),
        (Some(Stop), Continue, false),
        (Some(Stop), Stop, false),
    ];

    #[test]
    fn test_transition_table_is_exact() {
        for (last, next, expected) in TABLE {
            assert_eq!(
                is_valid_transition(last, next),
                expected,
                "last={last:?} next={next:?}"
            );
        }
    }

    #[test]
    fn test_active_ride_blocks_every_signal() {
        for (last, next, _) in TABLE {
            assert!(
                !is_signal_allowed(last, next, true),
                "last={last:?} next={next:?} must be blocked by an active ride"
            );
        }
    }

    #[test]
    fn test_without_ride_guard_matches_table() {
        for (last, next, expected) in TABLE {
            assert_eq!(is_signal_allowed(last, next, false), expected);
        }
    }

    #[test]
    fn test_allowed_next() {
        assert_eq!(allowed_next(None), vec![Start]);
        assert_eq!(allowed_next(Some(Start)), vec![Pause, Stop]);
        assert_eq!(allowed_next(Some(Pause)), vec![Continue, Stop]);
        assert_eq!(allowed_next(Some(Continue)), vec![Pause, Stop]);
        assert!(allowed_next(Some(Stop)).is_empty());
    }
}
