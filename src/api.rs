/// 授权服务默认端口（HTTPS）。
pub const UPLOAD_PORT: u16 = 443;
pub const DEFAULT_UPLOAD_PATH: &str = "/default/parking";

/// 授权服务地址（编译期配置）。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: UPLOAD_PORT,
            path: path.into(),
        }
    }

    /// 读取 .env 注入的 GATE_HOST / GATE_UPLOAD_PATH；未配置主机时返回 `None`。
    pub fn from_build_env() -> Option<Self> {
        let host = option_env!("GATE_HOST").filter(|host| !host.trim().is_empty())?;
        let path = option_env!("GATE_UPLOAD_PATH").unwrap_or(DEFAULT_UPLOAD_PATH);
        Some(Self::new(host.trim(), normalize_path(path)))
    }

    pub fn url(&self) -> String {
        if self.port == UPLOAD_PORT {
            format!("https://{}{}", self.host, self.path)
        } else {
            format!("https://{}:{}{}", self.host, self.port, self.path)
        }
    }
}

/// 保证路径以 `/` 开头。
fn normalize_path(path: &str) -> String {
    let path = path.trim();
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}
