//! Mapping of per-phase progress onto the 0-100 scale shown for a file.

use kbforge_core::models::ProgressPhase;

/// Overall percentage for a file given the fraction completed within `phase`.
///
/// Regular files spend their whole life in `Reading`, which spans 0-100.
/// Mail archives split the bar into reading, parsing and server-side work.
pub fn overall_percent(is_mbox: bool, phase: ProgressPhase, fraction: f64) -> u8 {
    let fraction = if fraction.is_finite() {
        fraction.clamp(0.0, 1.0)
    } else {
        0.0
    };

    let (start, end) = if is_mbox {
        phase.mbox_range()
    } else {
        (0, 100)
    };

    // Server-side work is reported as a spinner held at the start of its range.
    if is_mbox && phase.is_indeterminate() {
        return start;
    }

    let span = f64::from(end - start);
    start + (fraction * span).floor() as u8
}

/// Monotonic update: progress never moves backwards and never exceeds 100.
pub fn advance(current: u8, proposed: u8) -> u8 {
    current.max(proposed.min(100))
}
