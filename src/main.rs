#[cfg(target_os = "espidf")]
fn main() {
    use park_gate::api::Endpoint;
    use park_gate::board::Board;
    use park_gate::clock::SystemClock;
    use park_gate::controller::GateController;
    use park_gate::model::GateSettings;
    use park_gate::upload::{UploadClient, UploadOptions};

    // ESP-IDF 运行时初始化（链接补丁 & 日志）
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    log::info!("ParkGate controller booting (ESP-IDF)...");

    let settings = GateSettings::from_build_env();
    let Some(endpoint) = Endpoint::from_build_env() else {
        log::error!("GATE_HOST not configured, controller halted");
        halt();
    };
    log::info!("Upload endpoint {}", endpoint.url());

    // 外设初始化：测距、舵机、灯组、摄像头、Wi-Fi
    let board = match Board::take() {
        Ok(board) => board,
        Err(err) => {
            log::error!("Board init failed: {:?}", err);
            halt();
        }
    };

    let clock = SystemClock::new();
    let uploader = UploadClient::new(
        board.camera,
        board.connector,
        clock.clone(),
        endpoint,
        UploadOptions::from(&settings),
    );
    let mut controller = GateController::new(
        settings,
        board.echo,
        board.servo,
        board.lamps,
        uploader,
        clock,
    );
    controller.run();

    fn halt() -> ! {
        loop {
            esp_idf_hal::delay::FreeRtos::delay_ms(1000);
        }
    }
}

#[cfg(not(target_os = "espidf"))]
fn main() {
    eprintln!("ParkGate-controller runs on ESP-IDF targets only");
}
