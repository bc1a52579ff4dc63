use std::time::{Duration, Instant};

use esp_idf_hal::delay::Ets;
use esp_idf_hal::gpio::{AnyIOPin, AnyOutputPin, Input, Output, PinDriver};
use esp_idf_hal::sys::EspError;

use crate::model::SensorChannel;
use crate::sensor::EchoTimer;

/// HC-SR04 双通道：共用 trigger，入口/出口各一路 echo。
pub struct UltrasonicPair {
    trigger: PinDriver<'static, AnyOutputPin, Output>,
    entry_echo: PinDriver<'static, AnyIOPin, Input>,
    exit_echo: PinDriver<'static, AnyIOPin, Input>,
}

impl UltrasonicPair {
    pub fn new(trigger: AnyOutputPin, entry_echo: AnyIOPin, exit_echo: AnyIOPin) -> Result<Self, EspError> {
        let mut trigger = PinDriver::output(trigger)?;
        trigger.set_low()?;
        Ok(Self {
            trigger,
            entry_echo: PinDriver::input(entry_echo)?,
            exit_echo: PinDriver::input(exit_echo)?,
        })
    }

    /// 10us 高电平触发脉冲。
    fn pulse_trigger(&mut self) -> Result<(), EspError> {
        self.trigger.set_low()?;
        Ets::delay_us(2);
        self.trigger.set_high()?;
        Ets::delay_us(10);
        self.trigger.set_low()
    }
}

impl EchoTimer for UltrasonicPair {
    type Error = EspError;

    fn ping(
        &mut self,
        channel: SensorChannel,
        timeout: Duration,
    ) -> Result<Option<Duration>, Self::Error> {
        self.pulse_trigger()?;
        let echo = match channel {
            SensorChannel::Entry => &self.entry_echo,
            SensorChannel::Exit => &self.exit_echo,
        };

        // 等待与测量共用同一超时窗口
        let started = Instant::now();
        while echo.is_low() {
            if started.elapsed() >= timeout {
                return Ok(None);
            }
        }
        let rise = Instant::now();
        while echo.is_high() {
            if started.elapsed() >= timeout {
                return Ok(None);
            }
        }
        Ok(Some(rise.elapsed()))
    }
}
