use std::env;
use std::fs;

fn main() {
    // 仅在 ESP-IDF 目标上输出构建环境（主机测试跳过）
    if env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("espidf") {
        embuild::espidf::sysenv::output();
    }
    // 从 .env 读取编译期配置
    load_dotenv();
}

/// 读取 .env 并注入为编译期环境变量。
fn load_dotenv() {
    const ENV_PATH: &str = ".env";
    println!("cargo:rerun-if-changed={}", ENV_PATH);

    let Ok(contents) = fs::read_to_string(ENV_PATH) else {
        println!("cargo:warning=missing .env (expected WIFI_SSID/WIFI_PASS/GATE_HOST)");
        return;
    };

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = unquote(value.trim());
        // 仅允许白名单字段进入编译期环境
        if matches!(
            key,
            "WIFI_SSID" | "WIFI_PASS" | "GATE_HOST" | "GATE_UPLOAD_PATH" | "GATE_SETTINGS_JSON"
        ) {
            println!("cargo:rustc-env={}={}", key, value);
        }
    }
}

/// 去掉成对的单/双引号（JSON 配置通常用单引号包裹）。
fn unquote(value: &str) -> String {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return value[1..value.len() - 1].to_string();
        }
    }
    value.to_string()
}
