use std::fmt::Debug;
use std::time::Duration;

use crate::clock::Clock;
use crate::model::GateState;

/// 指示灯编号。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lamp {
    Red,
    Green,
    /// 补光灯（抓拍前关闭）。
    Flash,
}

/// 两态灯驱动。
pub trait Signals {
    type Error: Debug;

    fn set(&mut self, lamp: Lamp, on: bool) -> Result<(), Self::Error>;
}

/// 红绿灯 + 补光灯：常态下是闸门状态的投影（红 = 关，绿 = 开）。
pub struct Indicators<S, C> {
    signals: S,
    clock: C,
    warn_cycles: u8,
    warn_half_period: Duration,
}

impl<S: Signals, C: Clock> Indicators<S, C> {
    pub fn new(signals: S, clock: C, warn_cycles: u8, warn_half_period: Duration) -> Self {
        Self {
            signals,
            clock,
            warn_cycles,
            warn_half_period,
        }
    }

    pub fn set_red(&mut self, on: bool) {
        self.apply(Lamp::Red, on);
    }

    pub fn set_green(&mut self, on: bool) {
        self.apply(Lamp::Green, on);
    }

    pub fn set_flash(&mut self, on: bool) {
        self.apply(Lamp::Flash, on);
    }

    /// 按闸门状态恢复红绿灯。
    pub fn show(&mut self, state: GateState) {
        let open = state == GateState::Open;
        self.set_red(!open);
        self.set_green(open);
    }

    /// 拒绝/异常警示：红灯熄灭-点亮交替闪烁，结束时红灯常亮。
    pub fn warn(&mut self) {
        self.set_green(false);
        for _ in 0..self.warn_cycles {
            self.set_red(false);
            self.clock.sleep_for(self.warn_half_period);
            self.set_red(true);
            self.clock.sleep_for(self.warn_half_period);
        }
        self.set_red(true);
    }

    pub fn signals(&self) -> &S {
        &self.signals
    }

    fn apply(&mut self, lamp: Lamp, on: bool) {
        if let Err(err) = self.signals.set(lamp, on) {
            log::warn!("Indicator {:?} update failed: {:?}", lamp, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimSignals, VirtualClock};

    fn indicators(clock: &VirtualClock) -> Indicators<SimSignals, VirtualClock> {
        Indicators::new(SimSignals::new(), clock.clone(), 5, Duration::from_millis(100))
    }

    #[test]
    fn show_projects_gate_state() {
        let clock = VirtualClock::new();
        let mut lights = indicators(&clock);
        lights.show(GateState::Open);
        assert!(!lights.signals().is_on(Lamp::Red));
        assert!(lights.signals().is_on(Lamp::Green));
        lights.show(GateState::Closed);
        assert!(lights.signals().is_on(Lamp::Red));
        assert!(!lights.signals().is_on(Lamp::Green));
    }

    #[test]
    fn warn_blinks_five_times_and_ends_red() {
        let clock = VirtualClock::new();
        let mut lights = indicators(&clock);
        lights.warn();
        assert_eq!(lights.signals().off_commands(Lamp::Red), 5);
        assert!(lights.signals().is_on(Lamp::Red));
        assert!(!lights.signals().is_on(Lamp::Green));
        assert_eq!(clock.now(), Duration::from_millis(1000));
    }

    #[test]
    fn lamp_errors_are_absorbed() {
        let clock = VirtualClock::new();
        let mut signals = SimSignals::new();
        signals.fail_next();
        let mut lights = Indicators::new(signals, clock, 5, Duration::from_millis(100));
        lights.set_flash(true);
        assert!(!lights.signals().is_on(Lamp::Flash));
        lights.set_flash(true);
        assert!(lights.signals().is_on(Lamp::Flash));
    }
}
