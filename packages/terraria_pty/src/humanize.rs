use std::time::Duration;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Render a play-time duration, always ending in seconds.
///
/// Every component is truncated. Days are never shown: from 24 hours on the
/// hour count wraps, so 25 hours renders as `"1 hours 0 minutes 0 seconds"`.
pub fn humanize_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let seconds = total % MINUTE;

    if total < MINUTE {
        return format!("{} seconds", total);
    }
    if total < HOUR {
        return format!("{} minutes {} seconds", total / MINUTE, seconds);
    }

    let minutes = (total / MINUTE) % 60;
    let hours = if total < DAY {
        total / HOUR
    } else {
        (total / HOUR) % 24
    };
    format!("{} hours {} minutes {} seconds", hours, minutes, seconds)
}
