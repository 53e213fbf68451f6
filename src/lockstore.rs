use crate::gpio::LedSlot;
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const LOCK_PREFIX: &str = "ledmon_";
const LOCK_SUFFIX: &str = ".lock";

/// Persisted ownership claim of one daemon instance: which process monitors
/// which interface on which led slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub pid: i32,
    pub interface: String,
    pub led: LedSlot,
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("already running with pid {0}")]
    AlreadyHeld(i32),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("malformed lock record: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Coordination primitive between daemon instances. Keys are interface
/// names; there is one writer per key by construction, so atomic file
/// creation is the only locking needed.
pub trait LockStore {
    /// Claims the key named by `record.interface`. Fails if a live process
    /// already holds it; a record whose process is dead is reclaimed
    /// transparently.
    fn acquire(&self, record: &LockRecord) -> Result<(), LockError>;

    /// Removes the record for `interface`. Removing an absent record is ok.
    fn release(&self, interface: &str) -> io::Result<()>;

    /// The raw record for `interface`, live or stale.
    fn read(&self, interface: &str) -> Option<LockRecord>;

    /// The record for `interface`, only if its process is alive.
    fn owner(&self, interface: &str) -> Option<LockRecord> {
        self.read(interface).filter(|r| pid_alive(r.pid))
    }

    /// All interfaces with a record on disk.
    fn list(&self) -> Vec<String>;
}

/// True while the process exists. Signal 0 probes without delivering;
/// a permission error still proves existence.
pub fn pid_alive(pid: i32) -> bool {
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Lock records as JSON files under the run directory, one per interface.
pub struct FsLockStore {
    run_dir: PathBuf,
}

impl FsLockStore {
    pub fn new(run_dir: &Path) -> Self {
        FsLockStore {
            run_dir: run_dir.to_path_buf(),
        }
    }

    fn lock_path(&self, interface: &str) -> PathBuf {
        self.run_dir
            .join(format!("{LOCK_PREFIX}{interface}{LOCK_SUFFIX}"))
    }
}

fn parse_interface(file_name: &str) -> Option<&str> {
    file_name
        .strip_prefix(LOCK_PREFIX)?
        .strip_suffix(LOCK_SUFFIX)
        .filter(|iface| !iface.is_empty())
}

impl LockStore for FsLockStore {
    fn acquire(&self, record: &LockRecord) -> Result<(), LockError> {
        let path = self.lock_path(&record.interface);
        if let Some(existing) = self.read(&record.interface) {
            if pid_alive(existing.pid) {
                return Err(LockError::AlreadyHeld(existing.pid));
            }
        }
        // live claims were rejected above; anything left, stale or
        // malformed, is reclaimed
        if let Err(err) = fs::remove_file(&path) {
            if err.kind() != io::ErrorKind::NotFound {
                return Err(err.into());
            }
        }
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        serde_json::to_writer(file, record)?;
        Ok(())
    }

    fn release(&self, interface: &str) -> io::Result<()> {
        match fs::remove_file(self.lock_path(interface)) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }

    fn read(&self, interface: &str) -> Option<LockRecord> {
        let contents = fs::read_to_string(self.lock_path(interface)).ok()?;
        serde_json::from_str(&contents).ok()
    }

    fn list(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.run_dir) else {
            return Vec::new();
        };
        let mut interfaces: Vec<String> = entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name();
                parse_interface(name.to_str()?).map(str::to_string)
            })
            .collect();
        interfaces.sort();
        interfaces
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // a pid far above any real pid_max, so it cannot be alive
    const DEAD_PID: i32 = i32::MAX - 7;

    fn live_record(interface: &str, led: LedSlot) -> LockRecord {
        LockRecord {
            pid: std::process::id() as i32,
            interface: interface.to_string(),
            led,
        }
    }

    #[test]
    fn acquire_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsLockStore::new(dir.path());
        let record = live_record("eth0", LedSlot::Lan);

        store.acquire(&record).unwrap();
        assert_eq!(store.read("eth0"), Some(record.clone()));
        assert_eq!(store.owner("eth0"), Some(record));
        assert_eq!(store.list(), vec!["eth0".to_string()]);
    }

    #[test]
    fn second_acquire_for_a_live_key_fails_and_keeps_the_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsLockStore::new(dir.path());
        let first = live_record("eth0", LedSlot::Lan);
        store.acquire(&first).unwrap();

        let second = live_record("eth0", LedSlot::Power);
        match store.acquire(&second) {
            Err(LockError::AlreadyHeld(pid)) => assert_eq!(pid, first.pid),
            other => panic!("expected AlreadyHeld, got {other:?}"),
        }
        assert_eq!(store.read("eth0"), Some(first));
    }

    #[test]
    fn stale_record_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsLockStore::new(dir.path());
        store
            .acquire(&LockRecord {
                pid: DEAD_PID,
                interface: "eth0".to_string(),
                led: LedSlot::Lan,
            })
            .unwrap();

        assert_eq!(store.owner("eth0"), None);

        let fresh = live_record("eth0", LedSlot::Lan);
        store.acquire(&fresh).unwrap();
        assert_eq!(store.owner("eth0"), Some(fresh));
    }

    #[test]
    fn malformed_record_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ledmon_eth0.lock"), "not json").unwrap();

        let store = FsLockStore::new(dir.path());
        assert_eq!(store.read("eth0"), None);

        let fresh = live_record("eth0", LedSlot::Lan);
        store.acquire(&fresh).unwrap();
        assert_eq!(store.owner("eth0"), Some(fresh));
    }

    #[test]
    fn release_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsLockStore::new(dir.path());
        store.acquire(&live_record("eth0", LedSlot::Lan)).unwrap();

        store.release("eth0").unwrap();
        store.release("eth0").unwrap();
        assert_eq!(store.read("eth0"), None);
    }

    #[test]
    fn list_ignores_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("dhcp.leases"), "").unwrap();
        fs::write(dir.path().join("ledmon_.lock"), "").unwrap();
        fs::write(dir.path().join("ledmon_eth1.lock.bak"), "").unwrap();

        let store = FsLockStore::new(dir.path());
        store.acquire(&live_record("br-lan", LedSlot::Lan)).unwrap();
        assert_eq!(store.list(), vec!["br-lan".to_string()]);
    }

    #[test]
    fn own_pid_is_alive_and_bogus_pid_is_not() {
        assert!(pid_alive(std::process::id() as i32));
        assert!(!pid_alive(DEAD_PID));
    }
}
