//! Simulated biosignal source
//!
//! Produces a breathing-paced heart rhythm: heart rate oscillates with a
//! six-breaths-per-minute cycle, HRV follows the swing amplitude, and
//! coherence ramps up as the simulated user settles into the rhythm.

use coherence_shared::CompanionMessage;
use std::f64::consts::TAU;
use std::time::Duration;
use tokio::time::Instant;

/// One simulated reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub hrv: f64,
    pub heart_rate: f64,
    pub coherence: f64,
}

impl Reading {
    pub fn to_message(self) -> CompanionMessage {
        CompanionMessage::health(self.hrv, self.heart_rate, self.coherence)
    }
}

#[derive(Debug, Clone)]
pub struct TelemetrySource {
    started: Instant,
    /// Breathing period
    breath: Duration,
    resting_heart_rate: f64,
    /// Time for coherence to reach its plateau
    settle: Duration,
}

impl Default for TelemetrySource {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetrySource {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            breath: Duration::from_secs(10),
            resting_heart_rate: 66.0,
            settle: Duration::from_secs(120),
        }
    }

    /// Reading for the current instant
    pub fn sample(&self) -> Reading {
        self.sample_at(self.started.elapsed())
    }

    /// Reading `elapsed` after the source started
    pub fn sample_at(&self, elapsed: Duration) -> Reading {
        let t = elapsed.as_secs_f64();
        let settled = (t / self.settle.as_secs_f64()).min(1.0);

        let phase = TAU * t / self.breath.as_secs_f64();
        let swing = 3.0 + 7.0 * settled;
        let heart_rate = self.resting_heart_rate + swing * phase.sin();
        let hrv = 35.0 + 4.0 * swing + 2.0 * (phase / 3.0).cos();
        let coherence = 20.0 + 65.0 * settled + 5.0 * (phase / 2.0).sin() * settled;

        Reading {
            hrv: round1(hrv),
            heart_rate: round1(heart_rate),
            coherence: round1(coherence.clamp(0.0, 100.0)),
        }
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
