use crate::cadence::{Cadence, CadenceMapper, RateEstimate};
use crate::config::Config;
use crate::indicator::{blink, Led, LedState};
use crate::stats::TrafficSource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Atomically readable cancellation handle. The termination signal handler
/// only sets the flag; the monitor loop observes it between ticks and after
/// any blocking blink, so shutdown latency is bounded by one tick plus one
/// pattern duration.
#[derive(Clone, Copy)]
pub struct CancelToken {
    flag: &'static AtomicBool,
}

impl CancelToken {
    pub const fn new(flag: &'static AtomicBool) -> Self {
        CancelToken { flag }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// The per-tick orchestrator: sample counters, derive a cadence, drive the
/// indicator, sleep, repeat until cancelled.
pub struct Monitor<S, L> {
    source: S,
    led: L,
    mapper: CadenceMapper,
    tick: Duration,
    cancel: CancelToken,
}

impl<S: TrafficSource, L: Led> Monitor<S, L> {
    pub fn new(cfg: &Config, source: S, led: L, cancel: CancelToken) -> Self {
        Monitor {
            source,
            led,
            mapper: CadenceMapper::new(cfg, Instant::now()),
            tick: cfg.tick(),
            cancel,
        }
    }

    pub fn run(&mut self) {
        self.led.apply(LedState::On);
        let mut prev = self.source.sample();

        while !self.cancel.is_cancelled() {
            let curr = self.source.sample();
            if self.cancel.is_cancelled() {
                break;
            }
            let rate = RateEstimate::between(&prev, &curr);
            let link_up = self.source.link_up();

            let decision = self.mapper.decide(&rate, link_up, curr.taken_at);
            debug!(
                "traffic rx {} KB, tx {} KB, total {} KB -> {:?}",
                rate.rx_kb,
                rate.tx_kb,
                rate.combined_kb(),
                decision
            );

            match decision {
                Cadence::Steady(state) => self.led.apply(state),
                Cadence::Blink { pattern, delay } => {
                    blink(&mut self.led, pattern, delay, delay, 1)
                }
            }

            prev = curr;
            if self.cancel.is_cancelled() {
                break;
            }
            thread::sleep(self.tick);
        }
    }
}
