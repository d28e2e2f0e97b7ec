//! Millisecond counters to display strings and progress fractions.

/// Formats milliseconds as `m:ss` (minutes unpadded, seconds always two digits).
pub fn format_time(milliseconds: u64) -> String {
    let seconds = milliseconds / 1000;
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Fraction of the track played, in `[0, 1]`. Zero when the duration is unknown.
pub fn progress(position_ms: u64, duration_ms: u64) -> f64 {
    if duration_ms == 0 {
        return 0.0;
    }
    (position_ms as f64 / duration_ms as f64).clamp(0.0, 1.0)
}
