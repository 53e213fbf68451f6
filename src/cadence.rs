use crate::config::Config;
use crate::indicator::{LedState, PatternKind};
use crate::stats::TrafficSample;
use std::time::{Duration, Instant};

/// Base of the delay mapping in milliseconds; each decade of traffic takes
/// `LOG_SCALE` ms off it before clamping.
const BASE_DELAY_MS: f64 = 100.0;
const LOG_SCALE: f64 = 10.0;

const KB: u64 = 1024;

/// Per-tick throughput derived from two chronologically ordered samples.
/// Counter wrap or reset shows up as `curr < prev`; the deltas saturate to
/// zero rather than going negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateEstimate {
    pub rx_kb: u64,
    pub tx_kb: u64,
}

impl RateEstimate {
    pub fn between(prev: &TrafficSample, curr: &TrafficSample) -> Self {
        RateEstimate {
            rx_kb: curr.rx_bytes.saturating_sub(prev.rx_bytes) / KB,
            tx_kb: curr.tx_bytes.saturating_sub(prev.tx_bytes) / KB,
        }
    }

    pub fn combined_kb(&self) -> u64 {
        self.rx_kb.saturating_add(self.tx_kb)
    }
}

/// What the indicator should do for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Settle on a single state, no blinking.
    Steady(LedState),
    /// Run one blink sequence with `delay` as both hold durations.
    Blink { pattern: PatternKind, delay: Duration },
}

/// Maps rate estimates to blink cadence.
///
/// The delay mapping is continuous and recomputed every tick:
/// `clamp(BASE - LOG_SCALE * log10(combined + 1), min, max)`, so cadence
/// change tracks order-of-magnitude traffic change and flicker stays bounded
/// by the minimum delay. An interface that is link-up but quiet for longer
/// than the idle timeout settles to steady on instead of blinking forever.
pub struct CadenceMapper {
    min_delay: Duration,
    max_delay: Duration,
    step: Duration,
    busy_threshold_kb: u64,
    idle_timeout: Duration,
    last_activity: Instant,
}

impl CadenceMapper {
    pub fn new(cfg: &Config, now: Instant) -> Self {
        CadenceMapper {
            min_delay: Duration::from_millis(cfg.min_delay_ms.min(cfg.max_delay_ms)),
            max_delay: Duration::from_millis(cfg.max_delay_ms.max(cfg.min_delay_ms)),
            step: cfg.step(),
            busy_threshold_kb: cfg.busy_threshold_kb,
            idle_timeout: cfg.idle_timeout(),
            last_activity: now,
        }
    }

    pub fn decide(&mut self, rate: &RateEstimate, link_up: bool, now: Instant) -> Cadence {
        if !link_up {
            return Cadence::Blink {
                pattern: PatternKind::DisOff,
                delay: self.step,
            };
        }

        let combined = rate.combined_kb();
        if combined > self.busy_threshold_kb {
            self.last_activity = now;
            return Cadence::Blink {
                pattern: PatternKind::DisOn,
                delay: self.traffic_delay(combined),
            };
        }

        if now.duration_since(self.last_activity) > self.idle_timeout {
            Cadence::Steady(LedState::On)
        } else {
            Cadence::Blink {
                pattern: PatternKind::OffOn,
                delay: self.step,
            }
        }
    }

    fn traffic_delay(&self, combined_kb: u64) -> Duration {
        // +1 keeps log10 defined at zero traffic.
        let ms = BASE_DELAY_MS - LOG_SCALE * ((combined_kb as f64) + 1.0).log10();
        let ms = ms.clamp(
            self.min_delay.as_millis() as f64,
            self.max_delay.as_millis() as f64,
        );
        Duration::from_millis(ms as u64)
    }
}
