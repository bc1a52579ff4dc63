use core::convert::TryInto;

use embedded_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::modem::Modem;
use esp_idf_hal::sys::EspError;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{BlockingWifi, EspWifi};

const WIFI_SSID: &str = env!("WIFI_SSID");
const WIFI_PASS: &str = env!("WIFI_PASS");
const JOIN_ATTEMPTS: u32 = 3;
const JOIN_BACKOFF_MS: u32 = 2_000;

pub type StationWifi = BlockingWifi<EspWifi<'static>>;

fn station_config() -> Configuration {
    let auth_method = if WIFI_PASS.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPA2Personal
    };
    // SSID/密码超长时退化为空配置，由 connect 报错
    Configuration::Client(ClientConfiguration {
        ssid: WIFI_SSID.try_into().unwrap_or_default(),
        password: WIFI_PASS.try_into().unwrap_or_default(),
        auth_method,
        ..Default::default()
    })
}

/// 以 STA 模式入网，阻塞直到拿到 IP；关联失败按固定间隔重试。
pub fn connect_wifi(modem: Modem) -> Result<StationWifi, EspError> {
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take().ok();
    let mut wifi = BlockingWifi::wrap(EspWifi::new(modem, sys_loop.clone(), nvs)?, sys_loop)?;

    wifi.set_configuration(&station_config())?;
    wifi.start()?;

    let mut attempt = 1;
    loop {
        match join(&mut wifi) {
            Ok(()) => break,
            Err(err) if attempt < JOIN_ATTEMPTS => {
                log::warn!("Wi-Fi join attempt {} failed: {:?}", attempt, err);
                attempt += 1;
                FreeRtos::delay_ms(JOIN_BACKOFF_MS);
            }
            Err(err) => return Err(err),
        }
    }
    log::info!("Wi-Fi joined {}", WIFI_SSID);
    Ok(wifi)
}

fn join(wifi: &mut StationWifi) -> Result<(), EspError> {
    wifi.connect()?;
    wifi.wait_netif_up()
}

/// 断线后重连（每次上传前调用）。
pub fn ensure_connected(wifi: &mut StationWifi) {
    match wifi.is_connected() {
        Ok(true) => {}
        Ok(false) => {
            log::warn!("Wi-Fi link lost, rejoining");
            if let Err(err) = join(wifi) {
                log::warn!("Wi-Fi rejoin failed: {:?}", err);
            }
        }
        Err(err) => log::warn!("Wi-Fi status query failed: {:?}", err),
    }
}
