use crate::config::Config;
use crate::gpio::{self, GpioLed, LedSlot};
use crate::indicator::{Led, LedState};
use crate::lockstore::{pid_alive, FsLockStore, LockRecord, LockStore};
use crate::monitor::{CancelToken, Monitor};
use crate::stats::{self, SysfsTrafficSource};
use anyhow::{bail, Context, Result};
use daemonize::Daemonize;
use nix::libc;
use nix::sys::signal::{kill, sigaction, signal, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd::Pid;
use std::collections::HashSet;
use std::fs::File;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

const INITIAL_WAIT_SECS: u64 = 10;
const WAIT_STEP_SECS: u64 = 10;
const MAX_WAIT_SECS: u64 = 30;

const STOP_POLL_ATTEMPTS: u32 = 10;
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(500);

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigterm(_sig: libc::c_int) {
    // async-signal-safe: flip the flag, nothing else
    SHUTDOWN.store(true, Ordering::SeqCst);
}

fn install_signal_handlers() -> Result<()> {
    let term = SigAction::new(
        SigHandler::Handler(on_sigterm),
        SaFlags::empty(),
        SigSet::empty(),
    );
    unsafe {
        sigaction(Signal::SIGTERM, &term).context("cannot install SIGTERM handler")?;
        signal(Signal::SIGHUP, SigHandler::SigIgn).context("cannot ignore SIGHUP")?;
        signal(Signal::SIGCHLD, SigHandler::SigIgn).context("cannot ignore SIGCHLD")?;
    }
    Ok(())
}

fn validate_interface(iface: &str) -> Result<()> {
    let ok = !iface.is_empty()
        && iface.len() <= 15
        && iface != "."
        && iface != ".."
        && !iface.contains('/')
        && !iface.chars().any(char::is_whitespace);
    if !ok {
        bail!("invalid interface name '{iface}'");
    }
    Ok(())
}

/// Picks the first led slot not claimed by a live instance. The pool size
/// is a hard ceiling on concurrent instances per device.
pub fn select_slot(store: &dyn LockStore) -> Result<LedSlot> {
    let used: HashSet<LedSlot> = store
        .list()
        .into_iter()
        .filter_map(|iface| store.owner(&iface))
        .map(|record| record.led)
        .collect();
    LedSlot::POOL
        .into_iter()
        .find(|slot| !used.contains(slot))
        .ok_or_else(|| {
            anyhow::anyhow!(
                "maximum {} ledmon instances supported (lan, power)",
                LedSlot::POOL.len()
            )
        })
}

pub(crate) fn next_wait(current_secs: u64) -> u64 {
    (current_secs + WAIT_STEP_SECS).min(MAX_WAIT_SECS)
}

/// Blocks until `iface` has carrier, backing off 10s, 20s, then 30s between
/// probes. Returns false if cancelled while waiting.
fn wait_for_interface(cfg: &Config, iface: &str, cancel: CancelToken) -> bool {
    let mut wait_secs = INITIAL_WAIT_SECS;
    let mut waited = 0u64;

    while !stats::link_up(&cfg.net_dir, iface) {
        if cancel.is_cancelled() {
            return false;
        }
        info!("interface {iface} not found, waiting {wait_secs} seconds...");
        for _ in 0..wait_secs {
            if cancel.is_cancelled() {
                return false;
            }
            thread::sleep(Duration::from_secs(1));
        }
        waited += wait_secs;
        wait_secs = next_wait(wait_secs);
    }

    if waited > 0 {
        info!("interface {iface} found after waiting {waited} seconds");
    } else {
        info!("interface {iface} found");
    }
    true
}

/// Starts a daemon instance for `iface`: claims a led slot, detaches from
/// the terminal, records ownership, waits for the interface, then runs the
/// monitor loop until terminated.
pub fn start(cfg: &Config, iface: &str) -> Result<()> {
    validate_interface(iface)?;

    let store = FsLockStore::new(&cfg.run_dir);
    if let Some(record) = store.owner(iface) {
        bail!(
            "traffic monitor for {iface} is already running (pid {})",
            record.pid
        );
    }
    let slot = select_slot(&store)?;

    // resolve the pin map up front so an unsupported kernel fails on the
    // console instead of in the log
    let release = gpio::kernel_release()?;
    let pins = gpio::resolve_pins(&release)?.for_slot(slot);

    println!("Starting traffic monitor for {iface} using the {slot} led...");
    info!("starting traffic monitor for {iface} using the {slot} led");

    let log = File::create(&cfg.log_file)
        .with_context(|| format!("cannot open log file {}", cfg.log_file.display()))?;
    let log_err = log.try_clone()?;
    Daemonize::new()
        .working_directory("/")
        .stdout(log)
        .stderr(log_err)
        .start()
        .context("cannot detach from terminal")?;

    // child from here on; failures land in the log file
    install_signal_handlers()?;

    let mut led = GpioLed::new(&cfg.gpio_dir, pins)?;

    // the daemon must not run without recorded ownership
    let record = LockRecord {
        pid: std::process::id() as i32,
        interface: iface.to_string(),
        led: slot,
    };
    store
        .acquire(&record)
        .with_context(|| format!("cannot record ownership of {iface}"))?;

    info!("daemon started (pid {})", record.pid);

    let cancel = CancelToken::new(&SHUTDOWN);
    if wait_for_interface(cfg, iface, cancel) {
        let source = SysfsTrafficSource::new(&cfg.net_dir, iface);
        Monitor::new(cfg, source, &mut led, cancel).run();
    }

    store.release(iface)?;
    led.apply(LedState::On);
    info!("daemon stopped");
    Ok(())
}

/// Stops the instance monitoring `iface`: graceful SIGTERM, a bounded poll
/// for death, then SIGKILL. Stopping a stopped instance reports "not
/// running" and touches nothing.
pub fn stop(cfg: &Config, iface: &str) -> Result<()> {
    let store = FsLockStore::new(&cfg.run_dir);
    let Some(record) = store.read(iface) else {
        bail!("traffic monitor for {iface} is not running");
    };

    println!(
        "Stopping traffic monitor for {iface} (pid {})...",
        record.pid
    );

    let pid = Pid::from_raw(record.pid);
    if kill(pid, Signal::SIGTERM).is_err() {
        store.release(iface)?;
        bail!(
            "pid {} does not exist; removed its stale record",
            record.pid
        );
    }

    let mut dead = false;
    for _ in 0..STOP_POLL_ATTEMPTS {
        if !pid_alive(record.pid) {
            dead = true;
            break;
        }
        thread::sleep(STOP_POLL_INTERVAL);
    }
    if !dead {
        println!("pid {} did not exit, sending SIGKILL", record.pid);
        let _ = kill(pid, Signal::SIGKILL);
    }

    store.release(iface)?;
    restore_led(cfg, record.led);
    println!("Traffic monitor for {iface} stopped.");
    Ok(())
}

pub fn stop_all(cfg: &Config) -> Result<()> {
    let store = FsLockStore::new(&cfg.run_dir);
    let interfaces = store.list();
    if interfaces.is_empty() {
        bail!("no running ledmon instances found");
    }
    println!("Stopping all running ledmon instances...");
    for iface in &interfaces {
        if let Err(err) = stop(cfg, iface) {
            println!("{err}");
        }
    }
    Ok(())
}

/// Reports the run state recorded for `iface`. A record naming a dead pid
/// is reported as inconsistent and cleaned up as a side effect.
pub fn status(cfg: &Config, iface: &str) -> Result<()> {
    let store = FsLockStore::new(&cfg.run_dir);
    let Some(record) = store.read(iface) else {
        bail!("traffic monitor for {iface} is not running");
    };

    if pid_alive(record.pid) {
        println!(
            "Traffic monitor is running (pid {}), interface: {}, led: {}",
            record.pid, record.interface, record.led
        );
        Ok(())
    } else {
        // reporting stays best-effort: a failed cleanup is not an error here
        let _ = store.release(iface);
        bail!(
            "lock record for {iface} named dead pid {}; cleaned it up",
            record.pid
        );
    }
}

pub fn status_all(cfg: &Config) -> Result<()> {
    let store = FsLockStore::new(&cfg.run_dir);
    let interfaces = store.list();
    if interfaces.is_empty() {
        bail!("no running ledmon instances found");
    }
    for iface in &interfaces {
        if let Err(err) = status(cfg, iface) {
            println!("{err}");
        }
    }
    Ok(())
}

pub fn list(cfg: &Config) -> Result<()> {
    let store = FsLockStore::new(&cfg.run_dir);
    let interfaces = store.list();
    if interfaces.is_empty() {
        bail!("no running ledmon instances found");
    }
    println!("Running ledmon instances:");
    for iface in interfaces {
        println!(" - {iface}");
    }
    Ok(())
}

fn restore_led(cfg: &Config, slot: LedSlot) {
    let led = gpio::kernel_release()
        .and_then(|release| gpio::resolve_pins(&release))
        .and_then(|pins| GpioLed::new(&cfg.gpio_dir, pins.for_slot(slot)));
    match led {
        Ok(mut led) => led.apply(LedState::On),
        Err(err) => warn!("cannot restore {slot} led to on: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_backoff_is_10_20_30_capped() {
        let mut wait = INITIAL_WAIT_SECS;
        let mut schedule = vec![wait];
        for _ in 0..4 {
            wait = next_wait(wait);
            schedule.push(wait);
        }
        assert_eq!(schedule, vec![10, 20, 30, 30, 30]);
    }

    #[test]
    fn interface_names_are_validated() {
        assert!(validate_interface("eth0").is_ok());
        assert!(validate_interface("br-lan").is_ok());
        assert!(validate_interface("").is_err());
        assert!(validate_interface("a/b").is_err());
        assert!(validate_interface("eth 0").is_err());
        assert!(validate_interface("..").is_err());
        assert!(validate_interface("interface-name-way-too-long").is_err());
    }

    #[test]
    fn slot_selection_skips_stale_claims() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsLockStore::new(dir.path());

        // a dead claim on the lan slot must not block it
        store
            .acquire(&LockRecord {
                pid: i32::MAX - 7,
                interface: "eth0".to_string(),
                led: LedSlot::Lan,
            })
            .unwrap();

        assert_eq!(select_slot(&store).unwrap(), LedSlot::Lan);
    }

    #[test]
    fn slots_are_claimed_in_pool_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsLockStore::new(dir.path());
        assert_eq!(select_slot(&store).unwrap(), LedSlot::Lan);

        store
            .acquire(&LockRecord {
                pid: std::process::id() as i32,
                interface: "eth0".to_string(),
                led: LedSlot::Lan,
            })
            .unwrap();
        assert_eq!(select_slot(&store).unwrap(), LedSlot::Power);
    }
}
