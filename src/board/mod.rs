//! ESP32-S3 板级支持：引脚分配与外设初始化。
//!
//! 引脚（ESP32-S3 WROOM CAM）：
//! - 超声波 trigger GPIO1，出口 echo GPIO2，入口 echo GPIO14
//! - 舵机 GPIO21（LEDC timer1/channel1，timer0/channel0 留给摄像头 XCLK）
//! - 红灯 GPIO38，绿灯 GPIO39，补光灯 GPIO40，WS2812 状态灯 GPIO48

mod camera;
mod echo;
mod lamps;
mod servo;
mod tls;
mod wifi;

use esp_idf_hal::gpio::{IOPin, OutputPin};
use esp_idf_hal::ledc::{LedcDriver, LedcTimerDriver};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::sys::EspError;

pub use camera::{Camera, CameraError, CameraFrame, CameraPins};
pub use echo::UltrasonicPair;
pub use lamps::{BoardLamps, StatusPixel};
pub use servo::LedcServo;
pub use tls::TlsConnector;
pub use wifi::connect_wifi;

/// 初始化完成的外设集合。
pub struct Board {
    pub echo: UltrasonicPair,
    pub servo: LedcServo<'static>,
    pub lamps: BoardLamps,
    pub camera: Camera,
    pub connector: TlsConnector,
}

#[derive(Debug)]
pub enum BoardError {
    Esp(EspError),
    Camera(CameraError),
}

impl From<EspError> for BoardError {
    fn from(err: EspError) -> Self {
        BoardError::Esp(err)
    }
}

impl From<CameraError> for BoardError {
    fn from(err: CameraError) -> Self {
        BoardError::Camera(err)
    }
}

impl Board {
    /// 外设初始化；Wi-Fi 连接阻塞到拿到 IP 为止。
    pub fn take() -> Result<Self, BoardError> {
        let peripherals = Peripherals::take()?;
        let pins = peripherals.pins;

        let echo = UltrasonicPair::new(
            pins.gpio1.downgrade_output(),
            pins.gpio14.downgrade(),
            pins.gpio2.downgrade(),
        )?;

        let timer = LedcTimerDriver::new(peripherals.ledc.timer1, &servo::timer_config())?;
        let servo = LedcServo::new(LedcDriver::new(peripherals.ledc.channel1, timer, pins.gpio21)?);

        // 状态灯失败不影响主流程
        let pixel = match StatusPixel::new(peripherals.rmt.channel0, pins.gpio48) {
            Ok(pixel) => Some(pixel),
            Err(err) => {
                log::warn!("Status pixel init failed: {:?}", err);
                None
            }
        };
        let lamps = BoardLamps::new(
            pins.gpio38.downgrade_output(),
            pins.gpio39.downgrade_output(),
            pins.gpio40.downgrade_output(),
            pixel,
        )?;

        let camera = Camera::new(&CameraPins::S3_WROOM_CAM)?;

        let wifi = connect_wifi(peripherals.modem)?;
        let connector = TlsConnector::new(wifi);

        Ok(Self {
            echo,
            servo,
            lamps,
            camera,
            connector,
        })
    }
}
