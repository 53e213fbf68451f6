use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Cumulative byte counters for one interface at one point in time.
#[derive(Debug, Clone, Copy)]
pub struct TrafficSample {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub taken_at: Instant,
}

/// Source of traffic samples and carrier state for one interface.
pub trait TrafficSource {
    fn sample(&mut self) -> TrafficSample;
    fn link_up(&self) -> bool;
}

/// Reports whether `iface` currently has carrier. A missing interface reads
/// as link-down, so callers need no separate existence check.
pub fn link_up(net_dir: &Path, iface: &str) -> bool {
    match fs::read_to_string(net_dir.join(iface).join("carrier")) {
        Ok(contents) => contents.trim() == "1",
        Err(_) => false,
    }
}

/// Reads rx/tx byte counters from the per-interface statistics tree.
///
/// Reads fail soft: while the interface is momentarily unreadable (removed,
/// renamed, not yet present) the last-known counters are repeated, which the
/// rate mapper sees as a zero delta.
pub struct SysfsTrafficSource {
    net_dir: PathBuf,
    iface: String,
    last_rx: u64,
    last_tx: u64,
}

impl SysfsTrafficSource {
    pub fn new(net_dir: &Path, iface: &str) -> Self {
        SysfsTrafficSource {
            net_dir: net_dir.to_path_buf(),
            iface: iface.to_string(),
            last_rx: 0,
            last_tx: 0,
        }
    }

    fn read_counter(&self, name: &str) -> Option<u64> {
        let path = self
            .net_dir
            .join(&self.iface)
            .join("statistics")
            .join(name);
        fs::read_to_string(path).ok()?.trim().parse().ok()
    }
}

impl TrafficSource for SysfsTrafficSource {
    fn sample(&mut self) -> TrafficSample {
        if let Some(rx) = self.read_counter("rx_bytes") {
            self.last_rx = rx;
        }
        if let Some(tx) = self.read_counter("tx_bytes") {
            self.last_tx = tx;
        }
        TrafficSample {
            rx_bytes: self.last_rx,
            tx_bytes: self.last_tx,
            taken_at: Instant::now(),
        }
    }

    fn link_up(&self) -> bool {
        link_up(&self.net_dir, &self.iface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fake_iface(dir: &Path, iface: &str, rx: u64, tx: u64, carrier: &str) {
        let stats = dir.join(iface).join("statistics");
        fs::create_dir_all(&stats).unwrap();
        fs::write(stats.join("rx_bytes"), format!("{rx}\n")).unwrap();
        fs::write(stats.join("tx_bytes"), format!("{tx}\n")).unwrap();
        fs::write(dir.join(iface).join("carrier"), carrier).unwrap();
    }

    #[test]
    fn reads_counters_from_statistics_tree() {
        let dir = tempfile::tempdir().unwrap();
        fake_iface(dir.path(), "eth0", 4096, 1024, "1\n");

        let mut source = SysfsTrafficSource::new(dir.path(), "eth0");
        let sample = source.sample();
        assert_eq!(sample.rx_bytes, 4096);
        assert_eq!(sample.tx_bytes, 1024);
        assert!(source.link_up());
    }

    #[test]
    fn missing_interface_repeats_last_known_counters() {
        let dir = tempfile::tempdir().unwrap();
        fake_iface(dir.path(), "eth0", 500, 700, "1\n");

        let mut source = SysfsTrafficSource::new(dir.path(), "eth0");
        source.sample();

        fs::remove_dir_all(dir.path().join("eth0")).unwrap();
        let sample = source.sample();
        assert_eq!(sample.rx_bytes, 500);
        assert_eq!(sample.tx_bytes, 700);
    }

    #[test]
    fn absent_interface_is_link_down() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!link_up(dir.path(), "eth9"));
    }

    #[test]
    fn carrier_zero_is_link_down() {
        let dir = tempfile::tempdir().unwrap();
        fake_iface(dir.path(), "eth0", 0, 0, "0\n");
        assert!(!link_up(dir.path(), "eth0"));
    }

    #[test]
    fn garbage_counter_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fake_iface(dir.path(), "eth0", 900, 901, "1\n");

        let mut source = SysfsTrafficSource::new(dir.path(), "eth0");
        source.sample();

        let stats = dir.path().join("eth0").join("statistics");
        fs::write(stats.join("rx_bytes"), "not-a-number\n").unwrap();
        let sample = source.sample();
        assert_eq!(sample.rx_bytes, 900);
        assert_eq!(sample.tx_bytes, 901);
    }
}
