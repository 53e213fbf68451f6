use std::thread;
use std::time::Duration;

/// Primitive states the indicator hardware can hold.
///
/// `Disabled` drops both legs of the two-leg led and is reserved for
/// transient traffic indication and faulted interfaces; `On` is the
/// human-meaningful "idle/ready" state the daemon starts and stops in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedState {
    On,
    Off,
    Disabled,
}

/// Indicator driver capability. Production is the sysfs GPIO driver in
/// [`crate::gpio`]; tests substitute an in-memory recorder.
pub trait Led {
    fn apply(&mut self, state: LedState);
}

impl<T: Led + ?Sized> Led for &mut T {
    fn apply(&mut self, state: LedState) {
        (**self).apply(state)
    }
}

/// Fixed two-step blink sequences over the primitive states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    /// Disabled then on: traffic indication.
    DisOn,
    /// Disabled then off: link down.
    DisOff,
    OnOff,
    /// Off then on: idle heartbeat.
    OffOn,
}

impl PatternKind {
    pub fn steps(self) -> [LedState; 2] {
        match self {
            PatternKind::DisOn => [LedState::Disabled, LedState::On],
            PatternKind::DisOff => [LedState::Disabled, LedState::Off],
            PatternKind::OnOff => [LedState::On, LedState::Off],
            PatternKind::OffOn => [LedState::Off, LedState::On],
        }
    }
}

/// Runs `pattern` `repeat` times, holding the first step for `first` and the
/// second for `second`. Blocks the caller for the whole sequence; the
/// monitor tick accounts for this, which couples sampling cadence to blink
/// cadence.
pub fn blink(led: &mut dyn Led, pattern: PatternKind, first: Duration, second: Duration, repeat: u32) {
    let [a, b] = pattern.steps();
    for _ in 0..repeat {
        led.apply(a);
        thread::sleep(first);
        led.apply(b);
        thread::sleep(second);
    }
}
