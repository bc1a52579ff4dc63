use std::time::Duration;

use esp_idf_hal::sys::EspError;
use esp_idf_svc::tls::{self, EspTls, InternalSocket};

use crate::board::wifi::{ensure_connected, StationWifi};
use crate::upload::Connector;

/// 基于 esp-tls 的加密连接（证书包校验，SNI 使用目标主机名）。
pub struct TlsConnector {
    wifi: StationWifi,
}

impl TlsConnector {
    pub fn new(wifi: StationWifi) -> Self {
        Self { wifi }
    }
}

impl Connector for TlsConnector {
    type Stream = EspTls<InternalSocket>;
    type Error = EspError;

    fn connect(
        &mut self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Self::Stream, Self::Error> {
        ensure_connected(&mut self.wifi);
        let mut stream = EspTls::new()?;
        // timeout_ms 同时作为 socket 收发超时
        let config = tls::Config {
            common_name: Some(host),
            timeout_ms: timeout.as_millis() as u32,
            use_crt_bundle_attach: true,
            ..tls::Config::new()
        };
        stream.connect(host, port, &config)?;
        log::debug!("TLS connected to {}:{}", host, port);
        Ok(stream)
    }
}
