use crate::indicator::{Led, LedState};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Logical indicator slots the board exposes. A device supports at most one
/// daemon instance per slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedSlot {
    Lan,
    Power,
}

impl LedSlot {
    /// Claim order for new instances.
    pub const POOL: [LedSlot; 2] = [LedSlot::Lan, LedSlot::Power];

    pub fn as_str(self) -> &'static str {
        match self {
            LedSlot::Lan => "lan",
            LedSlot::Power => "power",
        }
    }
}

impl fmt::Display for LedSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two GPIO legs driving one indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedPins {
    pub on: u32,
    pub off: u32,
}

/// Pin assignments for every slot on this board revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinMap {
    pub power: LedPins,
    pub lan: LedPins,
}

impl PinMap {
    pub fn for_slot(&self, slot: LedSlot) -> LedPins {
        match slot {
            LedSlot::Lan => self.lan,
            LedSlot::Power => self.power,
        }
    }
}

/// Running kernel release string, used once at startup to resolve pins.
pub fn kernel_release() -> Result<String> {
    let release = fs::read_to_string("/proc/sys/kernel/osrelease")
        .context("cannot read /proc/sys/kernel/osrelease")?;
    Ok(release.trim().to_string())
}

/// Resolves GPIO pin assignments from a kernel release string. The GPIO
/// chip base shifted between kernel lines, so the numbering is keyed on
/// major.minor.
pub fn resolve_pins(release: &str) -> Result<PinMap> {
    let (major, minor) = parse_release(release)
        .with_context(|| format!("cannot parse kernel release '{release}'"))?;

    if major >= 6 {
        Ok(PinMap {
            power: LedPins { on: 547, off: 548 },
            lan: LedPins { on: 521, off: 517 },
        })
    } else if major == 5 && minor == 15 {
        Ok(PinMap {
            power: LedPins { on: 425, off: 426 },
            lan: LedPins { on: 510, off: 506 },
        })
    } else {
        bail!("unsupported kernel version {major}.{minor}")
    }
}

fn parse_release(release: &str) -> Option<(u32, u32)> {
    let mut parts = release.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor: String = parts
        .next()?
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    Some((major, minor.parse().ok()?))
}

/// Two-leg indicator driven through the sysfs GPIO tree.
///
/// Construction exports both pins and sets them as outputs; that failing is
/// fatal for start-up. Value writes during the monitor loop fail soft: the
/// next tick rewrites the pins anyway.
pub struct GpioLed {
    gpio_dir: PathBuf,
    pins: LedPins,
}

impl GpioLed {
    pub fn new(gpio_dir: &Path, pins: LedPins) -> Result<Self> {
        let led = GpioLed {
            gpio_dir: gpio_dir.to_path_buf(),
            pins,
        };
        for pin in [pins.on, pins.off] {
            led.export(pin)?;
            led.set_direction(pin, "out")?;
        }
        Ok(led)
    }

    fn value_path(&self, pin: u32) -> PathBuf {
        self.gpio_dir.join(format!("gpio{pin}")).join("value")
    }

    fn export(&self, pin: u32) -> Result<()> {
        if self.value_path(pin).exists() {
            return Ok(());
        }
        fs::write(self.gpio_dir.join("export"), pin.to_string())
            .with_context(|| format!("cannot export gpio {pin}"))
    }

    fn set_direction(&self, pin: u32, direction: &str) -> Result<()> {
        let path = self.gpio_dir.join(format!("gpio{pin}")).join("direction");
        fs::write(&path, direction).with_context(|| format!("cannot set direction of gpio {pin}"))
    }

    fn set_value(&self, pin: u32, value: u8) {
        if let Err(err) = fs::write(self.value_path(pin), value.to_string()) {
            warn!("gpio {pin} write failed: {err}");
        }
    }
}

impl Led for GpioLed {
    fn apply(&mut self, state: LedState) {
        let (on_leg, off_leg) = match state {
            LedState::On => (1, 0),
            LedState::Off => (0, 1),
            LedState::Disabled => (0, 0),
        };
        self.set_value(self.pins.on, on_leg);
        self.set_value(self.pins.off, off_leg);
    }
}
