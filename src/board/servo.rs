use esp_idf_hal::ledc::{config::TimerConfig, LedcDriver, Resolution};
use esp_idf_hal::prelude::*;
use esp_idf_hal::sys::EspError;

use crate::barrier::{duty_for_angle, Servo};

/// LEDC 驱动的道闸舵机。
pub struct LedcServo<'d> {
    driver: LedcDriver<'d>,
}

impl<'d> LedcServo<'d> {
    /// 包装已绑定 50Hz 定时器的 LEDC 通道。
    pub fn new(driver: LedcDriver<'d>) -> Self {
        Self { driver }
    }
}

/// 舵机定时器配置：50Hz，14 位分辨率。
pub fn timer_config() -> TimerConfig {
    TimerConfig::default()
        .frequency(50.Hz().into())
        .resolution(Resolution::Bits14)
}

impl Servo for LedcServo<'_> {
    type Error = EspError;

    fn set_angle(&mut self, degrees: u8) -> Result<(), Self::Error> {
        let duty = duty_for_angle(degrees, self.driver.get_max_duty());
        self.driver.set_duty(duty)
    }
}
