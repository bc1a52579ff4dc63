use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 道闸状态（上电默认关闭）。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    #[default]
    Closed,
    Open,
}

/// 一次抓拍上传所属的方向（入场/出场）。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionContext {
    Entry,
    Exit,
}

impl ActionContext {
    /// 写入 x-parking-action 请求头的取值。
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionContext::Entry => "ENTRY",
            ActionContext::Exit => "EXIT",
        }
    }
}

impl fmt::Display for ActionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 超声波测距通道（两路共用一个 trigger，echo 独立）。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SensorChannel {
    Entry,
    Exit,
}

impl SensorChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorChannel::Entry => "entry",
            SensorChannel::Exit => "exit",
        }
    }
}

/// 距离读数（厘米）；超时无回波时为哨兵值 999。
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Distance(f32);

impl Distance {
    /// 无回波哨兵值。
    pub const NO_ECHO: Distance = Distance(999.0);

    pub fn from_cm(cm: f32) -> Self {
        if cm.is_nan() || cm < 0.0 {
            return Self::NO_ECHO;
        }
        Distance(cm)
    }

    /// 由 echo 高电平持续时间换算距离（声速 0.0343 cm/us，往返除 2）。
    pub fn from_echo(high_time: Duration) -> Self {
        let micros = high_time.as_micros() as f32;
        Distance(micros * 0.0343 / 2.0)
    }

    pub fn cm(&self) -> f32 {
        self.0
    }

    pub fn is_no_echo(&self) -> bool {
        self.0 >= Self::NO_ECHO.0
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_no_echo() {
            write!(f, "no-echo")
        } else {
            write!(f, "{:.1}cm", self.0)
        }
    }
}

/// 0 cm 读数的处理策略：视为传感器故障（忽略）或视为贴近物体（检测）。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroReadingPolicy {
    #[default]
    Ignore,
    Detect,
}

/// 道闸运行参数（编译期可覆盖）。
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GateSettings {
    pub detection_threshold_cm: f32,
    pub zero_reading: ZeroReadingPolicy,
    pub echo_timeout_ms: u32,
    pub interleave_settle_ms: u32,
    pub camera_settle_ms: u32,
    pub exit_dwell_ms: u32,
    pub entry_dwell_ms: u32,
    pub exit_debounce_ms: u32,
    pub entry_debounce_ms: u32,
    pub idle_delay_ms: u32,
    pub open_angle: u8,
    pub closed_angle: u8,
    pub warn_cycles: u8,
    pub warn_half_period_ms: u32,
    pub chunk_size: usize,
    pub connect_timeout_ms: u32,
    pub response_deadline_ms: u32,
    pub event_log_max: usize,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            detection_threshold_cm: 15.0,
            zero_reading: ZeroReadingPolicy::Ignore,
            echo_timeout_ms: 25,
            interleave_settle_ms: 20,
            camera_settle_ms: 200,
            exit_dwell_ms: 3000,
            entry_dwell_ms: 5000,
            exit_debounce_ms: 2000,
            entry_debounce_ms: 2000,
            idle_delay_ms: 100,
            open_angle: 90,
            closed_angle: 0,
            warn_cycles: 5,
            warn_half_period_ms: 100,
            chunk_size: 1024,
            connect_timeout_ms: 5000,
            response_deadline_ms: 10_000,
            event_log_max: 32,
        }
    }
}

/// 参数校验错误。
#[derive(Clone, Debug, PartialEq)]
pub enum SettingsError {
    Json(String),
    Threshold(f32),
    InterleaveTooShort(u32),
    ZeroChunkSize,
    SameAngles(u8),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::Json(msg) => write!(f, "invalid settings json: {}", msg),
            SettingsError::Threshold(cm) => {
                write!(f, "detection threshold {} must be in (0, {})", cm, Distance::NO_ECHO.cm())
            }
            SettingsError::InterleaveTooShort(ms) => {
                write!(f, "interleave settle {}ms is below 20ms", ms)
            }
            SettingsError::ZeroChunkSize => write!(f, "upload chunk size must be non-zero"),
            SettingsError::SameAngles(angle) => {
                write!(f, "open and closed angle are both {}", angle)
            }
        }
    }
}

impl std::error::Error for SettingsError {}

impl From<serde_json::Error> for SettingsError {
    fn from(err: serde_json::Error) -> Self {
        SettingsError::Json(err.to_string())
    }
}

impl GateSettings {
    /// 在默认值之上叠加 JSON 覆盖项，并做合法性校验。
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        let settings: GateSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// 编译期 GATE_SETTINGS_JSON 覆盖项；缺失或非法时回退默认值。
    pub fn from_build_env() -> Self {
        Self::resolve(option_env!("GATE_SETTINGS_JSON"))
    }

    pub fn resolve(json: Option<&str>) -> Self {
        match json.map(str::trim).filter(|json| !json.is_empty()) {
            None => Self::default(),
            Some(json) => Self::from_json(json).unwrap_or_else(|err| {
                log::warn!("Settings override rejected ({}), using defaults", err);
                Self::default()
            }),
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        // 哨兵值必须永远不满足检测条件
        let threshold = self.detection_threshold_cm;
        if !(threshold > 0.0 && threshold < Distance::NO_ECHO.cm()) {
            return Err(SettingsError::Threshold(threshold));
        }
        if self.interleave_settle_ms < 20 {
            return Err(SettingsError::InterleaveTooShort(self.interleave_settle_ms));
        }
        if self.chunk_size == 0 {
            return Err(SettingsError::ZeroChunkSize);
        }
        if self.open_angle == self.closed_angle {
            return Err(SettingsError::SameAngles(self.open_angle));
        }
        Ok(())
    }

    /// 检测判定：距离小于阈值即有车，哨兵值永不命中。
    pub fn detects(&self, distance: Distance) -> bool {
        if distance.is_no_echo() {
            return false;
        }
        let cm = distance.cm();
        if cm <= 0.0 {
            return self.zero_reading == ZeroReadingPolicy::Detect;
        }
        cm < self.detection_threshold_cm
    }

    pub fn echo_timeout(&self) -> Duration {
        ms(self.echo_timeout_ms)
    }

    pub fn interleave_settle(&self) -> Duration {
        ms(self.interleave_settle_ms)
    }

    pub fn camera_settle(&self) -> Duration {
        ms(self.camera_settle_ms)
    }

    pub fn exit_dwell(&self) -> Duration {
        ms(self.exit_dwell_ms)
    }

    pub fn entry_dwell(&self) -> Duration {
        ms(self.entry_dwell_ms)
    }

    pub fn exit_debounce(&self) -> Duration {
        ms(self.exit_debounce_ms)
    }

    pub fn entry_debounce(&self) -> Duration {
        ms(self.entry_debounce_ms)
    }

    pub fn idle_delay(&self) -> Duration {
        ms(self.idle_delay_ms)
    }

    pub fn warn_half_period(&self) -> Duration {
        ms(self.warn_half_period_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        ms(self.connect_timeout_ms)
    }

    pub fn response_deadline(&self) -> Duration {
        ms(self.response_deadline_ms)
    }
}

fn ms(value: u32) -> Duration {
    Duration::from_millis(value as u64)
}
