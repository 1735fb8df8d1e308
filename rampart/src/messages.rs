//! User-facing messages.
//!
//! Every message is generic and time based. None of them says whether the
//! identifier belongs to an existing account.

use chrono::Duration;
use rampart_core::LockKind;

use crate::adapters::AuthOutcome;

pub const INVALID_CREDENTIALS: &str = "Invalid login or password.";

pub const PERMANENTLY_LOCKED: &str =
    "This account is locked. Please contact your administrator to unlock it.";

/// Render a remaining duration, rounding up to the unit shown.
///
/// Anything under a minute is shown in seconds and anything under an hour in
/// minutes. Never renders zero.
pub fn format_remaining(remaining: Duration) -> String {
    let seconds = remaining.num_seconds().max(1);
    if seconds < 60 {
        return plural(seconds, "second");
    }

    let minutes = (seconds + 59) / 60;
    if minutes < 60 {
        return plural(minutes, "minute");
    }

    plural((minutes + 59) / 60, "hour")
}

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("1 {unit}")
    } else {
        format!("{count} {unit}s")
    }
}

pub fn delayed(remaining: Duration) -> String {
    format!(
        "Too many failed attempts. Please wait {} before trying again.",
        format_remaining(remaining)
    )
}

pub fn locked(kind: LockKind, remaining: Option<Duration>) -> String {
    match (kind, remaining) {
        (LockKind::Temporary, Some(remaining)) => format!(
            "This account is temporarily locked. Please try again in {}.",
            format_remaining(remaining)
        ),
        (LockKind::Temporary, None) => {
            "This account is temporarily locked. Please try again later.".to_string()
        }
        (LockKind::Permanent, _) => PERMANENTLY_LOCKED.to_string(),
    }
}

/// The message for a failed outcome, or `None` for a success.
pub fn for_outcome<P>(outcome: &AuthOutcome<P>) -> Option<String> {
    match outcome {
        AuthOutcome::Success(_) => None,
        AuthOutcome::InvalidCredentials => Some(INVALID_CREDENTIALS.to_string()),
        AuthOutcome::Locked { kind, remaining } => Some(locked(*kind, *remaining)),
        AuthOutcome::Delayed { remaining } => Some(delayed(*remaining)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(Duration::zero()), "1 second");
        assert_eq!(format_remaining(Duration::seconds(30)), "30 seconds");
        assert_eq!(format_remaining(Duration::seconds(60)), "1 minute");
        assert_eq!(format_remaining(Duration::seconds(61)), "2 minutes");
        assert_eq!(format_remaining(Duration::minutes(30)), "30 minutes");
        assert_eq!(format_remaining(Duration::minutes(60)), "1 hour");
        assert_eq!(format_remaining(Duration::minutes(150)), "3 hours");
    }

    #[test]
    fn test_for_outcome() {
        assert_eq!(for_outcome(&AuthOutcome::Success(())), None);
        assert_eq!(
            for_outcome::<()>(&AuthOutcome::Delayed {
                remaining: Duration::seconds(30)
            })
            .unwrap(),
            "Too many failed attempts. Please wait 30 seconds before trying again."
        );
        assert_eq!(
            for_outcome::<()>(&AuthOutcome::Locked {
                kind: LockKind::Temporary,
                remaining: Some(Duration::minutes(30)),
            })
            .unwrap(),
            "This account is temporarily locked. Please try again in 30 minutes."
        );
        assert_eq!(
            for_outcome::<()>(&AuthOutcome::Locked {
                kind: LockKind::Permanent,
                remaining: None,
            })
            .unwrap(),
            PERMANENTLY_LOCKED
        );
    }
}
