use std::fmt::Debug;
use std::time::Duration;

use crate::model::{Distance, SensorChannel};

/// 超声波测距底层：拉一次共享 trigger，并在限定时间内测量对应 echo 的高电平时长。
pub trait EchoTimer {
    type Error: Debug;

    /// 返回 echo 高电平时长；超时未收到回波返回 `Ok(None)`。
    fn ping(&mut self, channel: SensorChannel, timeout: Duration)
        -> Result<Option<Duration>, Self::Error>;
}

/// 双通道测距器（入口/出口共用 trigger，调用方负责交错读取）。
pub struct RangeFinder<E> {
    echo: E,
    timeout: Duration,
}

impl<E: EchoTimer> RangeFinder<E> {
    pub fn new(echo: E, timeout: Duration) -> Self {
        Self { echo, timeout }
    }

    /// 测量一次距离；超时或引脚错误统一返回哨兵值。
    pub fn measure(&mut self, channel: SensorChannel) -> Distance {
        match self.echo.ping(channel, self.timeout) {
            Ok(Some(high_time)) if high_time <= self.timeout => Distance::from_echo(high_time),
            Ok(_) => Distance::NO_ECHO,
            Err(err) => {
                log::warn!("{} sensor read failed: {:?}", channel.as_str(), err);
                Distance::NO_ECHO
            }
        }
    }

    pub fn echo_mut(&mut self) -> &mut E {
        &mut self.echo
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimEcho;
    use approx::assert_relative_eq;

    #[test]
    fn converts_echo_to_distance() {
        let mut echo = SimEcho::new();
        echo.push(SensorChannel::Exit, Some(Duration::from_micros(583)));
        let mut sensor = RangeFinder::new(echo, Duration::from_millis(25));
        assert_relative_eq!(sensor.measure(SensorChannel::Exit).cm(), 10.0, epsilon = 0.01);
    }

    #[test]
    fn timeout_yields_sentinel() {
        let mut echo = SimEcho::new();
        echo.push(SensorChannel::Entry, None);
        let mut sensor = RangeFinder::new(echo, Duration::from_millis(25));
        assert_eq!(sensor.measure(SensorChannel::Entry), Distance::NO_ECHO);
    }

    #[test]
    fn overlong_echo_is_treated_as_timeout() {
        let mut echo = SimEcho::new();
        echo.push(SensorChannel::Entry, Some(Duration::from_millis(30)));
        let mut sensor = RangeFinder::new(echo, Duration::from_millis(25));
        assert!(sensor.measure(SensorChannel::Entry).is_no_echo());
    }

    #[test]
    fn pin_error_yields_sentinel() {
        let mut echo = SimEcho::new();
        echo.fail_next();
        let mut sensor = RangeFinder::new(echo, Duration::from_millis(25));
        assert!(sensor.measure(SensorChannel::Exit).is_no_echo());
    }

    #[test]
    fn passes_timeout_to_driver() {
        let mut sensor = RangeFinder::new(SimEcho::new(), Duration::from_millis(25));
        sensor.measure(SensorChannel::Exit);
        sensor.measure(SensorChannel::Entry);
        let pings = sensor.echo_mut().pings();
        assert_eq!(
            pings,
            &[
                (SensorChannel::Exit, Duration::from_millis(25)),
                (SensorChannel::Entry, Duration::from_millis(25)),
            ]
        );
    }
}
