use std::fmt::Debug;
use std::time::Duration;

use crate::clock::Clock;
use crate::model::GateState;

// 舵机 50Hz 周期 20ms，脉宽 0.5ms(0 度) ~ 2.5ms(180 度)。
const PERIOD_US: u32 = 20_000;
const MIN_PULSE_US: u32 = 500;
const MAX_PULSE_US: u32 = 2_500;

/// 舵机驱动：下发目标角度（0-180 度）。
pub trait Servo {
    type Error: Debug;

    fn set_angle(&mut self, degrees: u8) -> Result<(), Self::Error>;
}

/// 道闸执行器，持有唯一的闸门状态。
pub struct Barrier<S, C> {
    servo: S,
    clock: C,
    open_angle: u8,
    closed_angle: u8,
    state: GateState,
}

impl<S: Servo, C: Clock> Barrier<S, C> {
    pub fn new(servo: S, clock: C, open_angle: u8, closed_angle: u8) -> Self {
        Self {
            servo,
            clock,
            open_angle,
            closed_angle,
            state: GateState::Closed,
        }
    }

    /// 上电归位到关闭角度。
    pub fn home(&mut self) -> Result<(), S::Error> {
        self.close()
    }

    pub fn close(&mut self) -> Result<(), S::Error> {
        self.set_position(self.closed_angle)
    }

    /// 下发角度；状态随实际指令更新（非开闸角度均视为关闭）。
    pub fn set_position(&mut self, angle: u8) -> Result<(), S::Error> {
        self.servo.set_angle(angle)?;
        self.state = if angle == self.open_angle {
            GateState::Open
        } else {
            GateState::Closed
        };
        Ok(())
    }

    /// 开闸并阻塞停留 `dwell`，随后落闸。开闸失败时不等待。
    pub fn open_for(&mut self, dwell: Duration) -> Result<(), S::Error> {
        self.open_for_with(dwell, || {})
    }

    /// 同 `open_for`，开闸指令成功后、停留前调用 `on_open`。
    pub fn open_for_with<F: FnOnce()>(&mut self, dwell: Duration, on_open: F) -> Result<(), S::Error> {
        self.set_position(self.open_angle)?;
        on_open();
        log::info!("Gate open, dwell {}ms", dwell.as_millis());
        self.clock.sleep_for(dwell);
        let closed = self.set_position(self.closed_angle);
        if closed.is_ok() {
            log::info!("Gate closed");
        }
        closed
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn servo(&self) -> &S {
        &self.servo
    }
}

/// 角度换算 PWM 占空比（超过 180 度按 180 处理）。
pub fn duty_for_angle(degrees: u8, max_duty: u32) -> u32 {
    let degrees = degrees.min(180) as u32;
    let pulse_us = MIN_PULSE_US + (MAX_PULSE_US - MIN_PULSE_US) * degrees / 180;
    (max_duty as u64 * pulse_us as u64 / PERIOD_US as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimServo, VirtualClock};

    #[test]
    fn open_for_dwells_then_closes() {
        let clock = VirtualClock::new();
        let mut barrier = Barrier::new(SimServo::new(), clock.clone(), 90, 0);
        barrier.open_for(Duration::from_secs(3)).unwrap();
        assert_eq!(barrier.servo().angles(), &[90, 0]);
        assert_eq!(clock.now(), Duration::from_secs(3));
        assert_eq!(barrier.state(), GateState::Closed);
    }

    #[test]
    fn state_tracks_commanded_angle() {
        let mut barrier = Barrier::new(SimServo::new(), VirtualClock::new(), 90, 0);
        assert_eq!(barrier.state(), GateState::Closed);
        barrier.set_position(90).unwrap();
        assert_eq!(barrier.state(), GateState::Open);
        barrier.set_position(45).unwrap();
        assert_eq!(barrier.state(), GateState::Closed);
    }

    #[test]
    fn failed_open_does_not_dwell() {
        let clock = VirtualClock::new();
        let mut servo = SimServo::new();
        servo.fail_next();
        let mut barrier = Barrier::new(servo, clock.clone(), 90, 0);
        assert!(barrier.open_for(Duration::from_secs(5)).is_err());
        assert_eq!(clock.now(), Duration::ZERO);
        assert_eq!(barrier.state(), GateState::Closed);
    }

    #[test]
    fn open_callback_runs_only_after_servo_opens() {
        let clock = VirtualClock::new();
        let mut servo = SimServo::new();
        servo.fail_next();
        let mut barrier = Barrier::new(servo, clock.clone(), 90, 0);
        let mut notified = false;
        assert!(barrier.open_for_with(Duration::from_secs(5), || notified = true).is_err());
        assert!(!notified);

        barrier
            .open_for_with(Duration::from_secs(5), || notified = true)
            .unwrap();
        assert!(notified);
        assert_eq!(barrier.servo().angles(), &[90, 0]);
    }

    #[test]
    fn maps_angles_to_pulse_width() {
        let max = 1 << 14;
        assert_eq!(duty_for_angle(0, max), max * 500 / 20_000);
        assert_eq!(duty_for_angle(90, max), max * 1500 / 20_000);
        assert_eq!(duty_for_angle(200, max), duty_for_angle(180, max));
    }
}
