use std::thread;
use std::time::{Duration, Instant};

/// 单调时钟抽象：控制循环的所有等待都经由这里，测试中替换为虚拟时间。
pub trait Clock {
    /// 自时钟创建以来的单调时间。
    fn now(&self) -> Duration;

    /// 阻塞等待指定时长。
    fn sleep_for(&self, duration: Duration);

    /// 从当前时刻起算的截止时间。
    fn deadline(&self, after: Duration) -> Deadline {
        Deadline {
            at: self.now().saturating_add(after),
        }
    }
}

/// 绝对截止时间（相对时钟零点）。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deadline {
    at: Duration,
}

impl Deadline {
    pub fn is_expired<C: Clock + ?Sized>(&self, clock: &C) -> bool {
        clock.now() >= self.at
    }

    pub fn remaining<C: Clock + ?Sized>(&self, clock: &C) -> Duration {
        self.at.saturating_sub(clock.now())
    }
}

/// 基于 std 线程休眠的真实时钟（ESP-IDF 上映射到 FreeRTOS 调度）。
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    started: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.started.elapsed()
    }

    fn sleep_for(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::VirtualClock;

    #[test]
    fn deadline_expires_on_virtual_time() {
        let clock = VirtualClock::new();
        let deadline = clock.deadline(Duration::from_millis(50));
        assert!(!deadline.is_expired(&clock));
        assert_eq!(deadline.remaining(&clock), Duration::from_millis(50));
        clock.sleep_for(Duration::from_millis(30));
        assert_eq!(deadline.remaining(&clock), Duration::from_millis(20));
        clock.sleep_for(Duration::from_millis(20));
        assert!(deadline.is_expired(&clock));
        assert_eq!(deadline.remaining(&clock), Duration::ZERO);
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let first = clock.now();
        clock.sleep_for(Duration::from_millis(1));
        assert!(clock.now() > first);
    }
}
