//! Human-readable time formatting for the operator transcript
//!
//! Signal lengths and gaps are mostly sub-minute, so the short format carries
//! two decimals; anything longer switches to clock notation.

/// Below this many seconds: `X.XXs`
const SHORT_FORMAT_MAX: f64 = 100.0;

/// Below this many seconds: `M:SS.Xs`; above: `H:MM:SS`
const MEDIUM_FORMAT_MAX: f64 = 6000.0;

/// Format a duration in seconds.
///
/// # Examples
///
/// ```
/// use nsp_common::human_time::format_seconds;
///
/// assert_eq!(format_seconds(0.5), "0.50s");
/// assert_eq!(format_seconds(125.0), "2:05.0s");
/// assert_eq!(format_seconds(7322.0), "2:02:02");
/// ```
pub fn format_seconds(seconds: f64) -> String {
    if !seconds.is_finite() {
        return "--".to_string();
    }

    let sign = if seconds < 0.0 { "-" } else { "" };
    let abs = seconds.abs();

    let body = if abs < SHORT_FORMAT_MAX {
        format!("{:.2}s", abs)
    } else if abs < MEDIUM_FORMAT_MAX {
        let minutes = (abs / 60.0).floor();
        let secs = abs - minutes * 60.0;
        format!("{}:{:04.1}s", minutes as u64, secs)
    } else {
        let total = abs.round() as u64;
        format!("{}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
    };

    format!("{}{}", sign, body)
}

/// Format an optional duration, rendering `None` with a caller-supplied label.
pub fn format_seconds_or(seconds: Option<f64>, none_label: &str) -> String {
    match seconds {
        Some(s) => format_seconds(s),
        None => none_label.to_string(),
    }
}

/// Format a `std::time::Duration`.
pub fn format_duration(duration: std::time::Duration) -> String {
    format_seconds(duration.as_secs_f64())
}
