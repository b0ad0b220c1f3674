//! Parsing of ffmpeg's statistics lines.
//!
//! With `-v info` ffmpeg rewrites a line like
//! `size=     512kB time=00:01:05.43 bitrate=  64.1kbits/s speed=41.2x`
//! (prefixed with `frame=` when the input has video) on stderr.

use std::time::Duration;

/// Whether `line` is an ffmpeg statistics line.
pub fn is_progress_line(line: &str) -> bool {
    line.contains("frame=") || (line.trim_start().starts_with("size=") && line.contains("time="))
}

/// Extract the `time=` position from a statistics line.
///
/// Returns `None` when the field is missing or unparseable (`N/A`). A
/// negative timestamp, which ffmpeg prints at the very start, is zero.
pub fn parse_time(line: &str) -> Option<Duration> {
    let start = line.find("time=")? + "time=".len();
    let value = line[start..].split_whitespace().next()?;

    if value.starts_with('-') {
        return Some(Duration::ZERO);
    }

    let mut parts = value.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || !seconds.is_finite() || seconds < 0.0 {
        return None;
    }

    let whole = hours.checked_mul(3600)?.checked_add(minutes.checked_mul(60)?)?;
    Duration::from_secs(whole).checked_add(Duration::try_from_secs_f64(seconds).ok()?)
}

/// Progress fraction in `[0, 1]` carried by `line`, if it is a statistics
/// line.
///
/// With an unknown (or zero) total duration the fraction is `0.0`. A
/// statistics line whose time cannot be read yields `None`, so callers keep
/// their last reported value.
pub fn progress_fraction(line: &str, total: Option<Duration>) -> Option<f64> {
    if !is_progress_line(line) {
        return None;
    }

    let total = match total {
        Some(total) if !total.is_zero() => total,
        _ => return Some(0.0),
    };

    let position = parse_time(line)?;
    Some((position.as_secs_f64() / total.as_secs_f64()).clamp(0.0, 1.0))
}
