use std::net::SocketAddr;
use std::path::PathBuf;

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_MODEL_PATH: &str = "maternal_health_model.json";
const DEFAULT_INDEX_PATH: &str = "index.html";
const DEFAULT_CORS_ORIGIN: &str = "*";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub model_path: PathBuf,
    pub index_path: PathBuf,
    pub cors_origin: String,
    pub strict_status: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            index_path: PathBuf::from(DEFAULT_INDEX_PATH),
            cors_origin: DEFAULT_CORS_ORIGIN.to_string(),
            strict_status: false,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source so tests never touch
    /// the process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = lookup("PORT")
            .and_then(|value| value.trim().parse::<u16>().ok())
            .map(normalize_port)
            .unwrap_or(DEFAULT_PORT);

        let host = lookup("RISK_API_HOST")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let model_path = path_or_default(lookup("RISK_MODEL_PATH"), DEFAULT_MODEL_PATH);
        let index_path = path_or_default(lookup("RISK_INDEX_PATH"), DEFAULT_INDEX_PATH);
        let cors_origin = normalize_cors_origin(lookup("RISK_CORS_ORIGIN").as_deref());
        let strict_status = parse_bool(lookup("RISK_STRICT_STATUS").as_deref(), false);

        ServiceConfig {
            host,
            port,
            model_path,
            index_path,
            cors_origin,
            strict_status,
        }
    }

    pub fn bind_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.bind_addr().parse()
    }
}

fn normalize_port(value: u16) -> u16 {
    if value == 0 {
        DEFAULT_PORT
    } else {
        value
    }
}

fn path_or_default(value: Option<String>, default: &str) -> PathBuf {
    match value {
        Some(value) if !value.trim().is_empty() => PathBuf::from(value.trim()),
        _ => PathBuf::from(default),
    }
}

fn normalize_cors_origin(value: Option<&str>) -> String {
    let origin = value.unwrap_or(DEFAULT_CORS_ORIGIN).trim();
    // Must survive conversion into a header value later on.
    if origin.is_empty() || !origin.bytes().all(|byte| (0x20..0x7f).contains(&byte)) {
        DEFAULT_CORS_ORIGIN.to_string()
    } else {
        origin.to_string()
    }
}

fn parse_bool(value: Option<&str>, default: bool) -> bool {
    value
        .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}
