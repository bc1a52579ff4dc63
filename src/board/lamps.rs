use std::time::Duration;

use esp_idf_hal::gpio::{AnyOutputPin, Output, OutputPin, PinDriver};
use esp_idf_hal::rmt::{config::TransmitConfig, FixedLengthSignal, PinState, Pulse, TxRmtDriver};
use esp_idf_hal::sys::EspError;
use esp_idf_hal::{peripheral::Peripheral, rmt::RmtChannel};
use smart_leds::{SmartLedsWrite, RGB8};

use crate::indicator::{Lamp, Signals};

// 默认亮度（约 30%）。
const DEFAULT_BRIGHTNESS: u8 = 77;

/// WS2812 位时序：(高电平, 低电平) 纳秒。
const BIT0_NS: (u64, u64) = (350, 800);
const BIT1_NS: (u64, u64) = (700, 600);

/// WS2812 状态灯（RMT 发送），镜像红/绿灯状态。
pub struct StatusPixel<'d> {
    tx: TxRmtDriver<'d>,
    bit0: (Pulse, Pulse),
    bit1: (Pulse, Pulse),
    brightness: u8,
}

impl<'d> StatusPixel<'d> {
    /// 初始化 RMT 发送器并预先计算位脉冲。
    pub fn new<C, P, Ch, Pin>(channel: C, pin: P) -> Result<Self, EspError>
    where
        C: Peripheral<P = Ch> + 'd,
        P: Peripheral<P = Pin> + 'd,
        Ch: RmtChannel,
        Pin: OutputPin,
    {
        let config = TransmitConfig::new().clock_divider(1);
        let tx = TxRmtDriver::new(channel, pin, &config)?;
        let ticks_hz = tx.counter_clock()?;
        let pulse_pair = |(high_ns, low_ns): (u64, u64)| -> Result<(Pulse, Pulse), EspError> {
            Ok((
                Pulse::new_with_duration(ticks_hz, PinState::High, &Duration::from_nanos(high_ns))?,
                Pulse::new_with_duration(ticks_hz, PinState::Low, &Duration::from_nanos(low_ns))?,
            ))
        };
        Ok(Self {
            bit0: pulse_pair(BIT0_NS)?,
            bit1: pulse_pair(BIT1_NS)?,
            tx,
            brightness: DEFAULT_BRIGHTNESS,
        })
    }

    pub fn set_color(&mut self, color: RGB8) -> Result<(), EspError> {
        self.write([color].into_iter())
    }

    /// 按亮度缩放后编码为 GRB 顺序的 24 位脉冲。
    fn encode(&self, color: RGB8) -> Result<FixedLengthSignal<24>, EspError> {
        let scale = |v: u8| ((v as u16 * self.brightness as u16) / 255) as u32;
        let grb = (scale(color.g) << 16) | (scale(color.r) << 8) | scale(color.b);
        let mut signal = FixedLengthSignal::<24>::new();
        for slot in 0..24 {
            let bit = grb & (1 << (23 - slot)) != 0;
            let pulses = if bit { &self.bit1 } else { &self.bit0 };
            signal.set(slot, pulses)?;
        }
        Ok(signal)
    }
}

impl SmartLedsWrite for StatusPixel<'_> {
    type Color = RGB8;
    type Error = EspError;

    fn write<T, I>(&mut self, iterator: T) -> Result<(), Self::Error>
    where
        T: IntoIterator<Item = I>,
        I: Into<Self::Color>,
    {
        // 单颗灯珠，只取第一个颜色
        let color = iterator.into_iter().next().map(Into::into).unwrap_or_default();
        let signal = self.encode(color)?;
        self.tx.start_blocking(&signal)
    }
}

/// 板载灯组：红/绿/补光灯 GPIO，可选 WS2812 镜像。
pub struct BoardLamps {
    red: PinDriver<'static, AnyOutputPin, Output>,
    green: PinDriver<'static, AnyOutputPin, Output>,
    flash: PinDriver<'static, AnyOutputPin, Output>,
    pixel: Option<StatusPixel<'static>>,
    red_on: bool,
    green_on: bool,
}

impl BoardLamps {
    pub fn new(
        red: AnyOutputPin,
        green: AnyOutputPin,
        flash: AnyOutputPin,
        pixel: Option<StatusPixel<'static>>,
    ) -> Result<Self, EspError> {
        let mut flash = PinDriver::output(flash)?;
        flash.set_low()?;
        Ok(Self {
            red: PinDriver::output(red)?,
            green: PinDriver::output(green)?,
            flash,
            pixel,
            red_on: false,
            green_on: false,
        })
    }

    /// 刷新状态灯颜色（红优先于绿）。
    fn refresh_pixel(&mut self) {
        let color = pixel_color(self.red_on, self.green_on);
        if let Some(pixel) = self.pixel.as_mut() {
            if let Err(err) = pixel.set_color(color) {
                log::warn!("Status pixel update failed: {:?}", err);
            }
        }
    }
}

impl Signals for BoardLamps {
    type Error = EspError;

    fn set(&mut self, lamp: Lamp, on: bool) -> Result<(), Self::Error> {
        let pin = match lamp {
            Lamp::Red => &mut self.red,
            Lamp::Green => &mut self.green,
            Lamp::Flash => &mut self.flash,
        };
        if on {
            pin.set_high()?;
        } else {
            pin.set_low()?;
        }
        match lamp {
            Lamp::Red => self.red_on = on,
            Lamp::Green => self.green_on = on,
            Lamp::Flash => return Ok(()),
        }
        self.refresh_pixel();
        Ok(())
    }
}

/// 红绿灯状态映射到状态灯颜色。
fn pixel_color(red: bool, green: bool) -> RGB8 {
    match (red, green) {
        (true, _) => RGB8 { r: 255, g: 0, b: 0 },
        (false, true) => RGB8 { r: 0, g: 255, b: 0 },
        (false, false) => RGB8::default(),
    }
}
