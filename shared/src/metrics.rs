//! Derived session metrics
//!
//! Pure helpers shared by the hub and by collaborators that only consume
//! scalar telemetry.

use std::time::Duration;

/// Fraction of the target duration completed, clamped to `0.0..=1.0`
///
/// A zero target yields `0.0`.
pub fn session_progress(accrued: Duration, target: Duration) -> f64 {
    if target.is_zero() {
        return 0.0;
    }
    (accrued.as_secs_f64() / target.as_secs_f64()).min(1.0)
}

/// Arithmetic mean, `0.0` for an empty input
pub fn mean<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));

    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Rendering intensity for a coherence score (0-100)
pub fn feedback_intensity(coherence: f64) -> f64 {
    0.3 + 0.7 * (coherence.clamp(0.0, 100.0) / 100.0)
}
