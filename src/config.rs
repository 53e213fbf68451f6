use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const CONFIG_PATH: &str = "/etc/ledmon.toml";

/// Daemon configuration. Every field has a default, so a missing or partial
/// config file is fine; timing knobs exist mainly so tests can run the
/// monitor loop with near-zero durations.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Milliseconds between counter samples.
    pub tick_ms: u64,
    /// Fastest half-period of the traffic blink.
    pub min_delay_ms: u64,
    /// Slowest half-period of the traffic blink.
    pub max_delay_ms: u64,
    /// Hold duration for the fixed heartbeat and link-down patterns.
    pub step_ms: u64,
    /// Combined KB per tick above which the interface counts as busy.
    pub busy_threshold_kb: u64,
    /// Quiet time after which the led settles to steady on.
    pub idle_timeout_ms: u64,
    /// Directory holding per-instance lock records.
    pub run_dir: PathBuf,
    /// Root of the per-interface statistics tree.
    pub net_dir: PathBuf,
    /// Root of the GPIO control tree.
    pub gpio_dir: PathBuf,
    /// Where the daemonized process sends its log output.
    pub log_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            tick_ms: 100,
            min_delay_ms: 50,
            max_delay_ms: 150,
            step_ms: 100,
            busy_threshold_kb: 10,
            idle_timeout_ms: 1000,
            run_dir: PathBuf::from("/var/run"),
            net_dir: PathBuf::from("/sys/class/net"),
            gpio_dir: PathBuf::from("/sys/class/gpio"),
            log_file: PathBuf::from("/var/log/ledmon.log"),
        }
    }
}

impl Config {
    pub fn load_or_default() -> Self {
        Self::load(CONFIG_PATH).unwrap_or_default()
    }

    fn load(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn step(&self) -> Duration {
        Duration::from_millis(self.step_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}
