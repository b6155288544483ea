use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_BIND_HOST: &str = "0.0.0.0";
const DEFAULT_MODEL_NAME: &str = "resnet";
const DEFAULT_SIGNATURE_NAME: &str = "serving_default";
const DEFAULT_CLASS_INDEX_PATH: &str = "/app/conf/imagenet_class_index.json";
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024;
const DEFAULT_PREDICT_CONNECT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_PREDICT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

/// Where the TensorFlow Serving endpoint lives and which model to ask for.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub host: String,
    pub port: String,
    pub model_name: String,
    pub signature_name: String,
    pub model_version: Option<i64>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl InferenceConfig {
    /// `host:port`, composed as-is.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn endpoint_uri(&self) -> String {
        format!("http://{}", self.address())
    }
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub max_image_bytes: usize,
    /// Empty means any host is accepted.
    pub allowed_hosts: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ClassIndexConfig {
    pub path: PathBuf,
    pub reload_per_request: bool,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub inference: InferenceConfig,
    pub fetch: FetchConfig,
    pub class_index: ClassIndexConfig,
}

impl GatewayConfig {
    /// Reads the process environment, after loading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let server = ServerConfig {
            bind_host: get("BIND_HOST").unwrap_or_else(|| DEFAULT_BIND_HOST.to_string()),
            port: parse_or(&get, "PORT", DEFAULT_PORT)?,
        };

        let inference = InferenceConfig {
            host: get("SERVER_HOST").ok_or(ConfigError::Missing("SERVER_HOST"))?,
            port: get("SERVER_PORT").ok_or(ConfigError::Missing("SERVER_PORT"))?,
            model_name: get("MODEL_NAME").unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string()),
            signature_name: get("MODEL_SIGNATURE")
                .unwrap_or_else(|| DEFAULT_SIGNATURE_NAME.to_string()),
            model_version: match get("MODEL_VERSION") {
                Some(raw) => Some(parse_value("MODEL_VERSION", raw)?),
                None => None,
            },
            connect_timeout: Duration::from_secs(parse_or(
                &get,
                "PREDICT_CONNECT_TIMEOUT_SECS",
                DEFAULT_PREDICT_CONNECT_TIMEOUT_SECS,
            )?),
            request_timeout: Duration::from_secs(parse_or(
                &get,
                "PREDICT_TIMEOUT_SECS",
                DEFAULT_PREDICT_TIMEOUT_SECS,
            )?),
        };

        let fetch = FetchConfig {
            timeout: Duration::from_secs(parse_or(
                &get,
                "FETCH_TIMEOUT_SECS",
                DEFAULT_FETCH_TIMEOUT_SECS,
            )?),
            max_image_bytes: parse_or(&get, "MAX_IMAGE_BYTES", DEFAULT_MAX_IMAGE_BYTES)?,
            allowed_hosts: get("ALLOWED_IMAGE_HOSTS")
                .map(|raw| {
                    raw.split(',')
                        .map(|h| h.trim().to_ascii_lowercase())
                        .filter(|h| !h.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        };

        let class_index = ClassIndexConfig {
            path: get("CLASS_INDEX_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CLASS_INDEX_PATH)),
            reload_per_request: parse_or(&get, "CLASS_INDEX_RELOAD_PER_REQUEST", false)?,
        };

        Ok(Self {
            server,
            inference,
            fetch,
            class_index,
        })
    }
}

fn parse_or<T, G>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(raw) => parse_value(name, raw),
        None => Ok(default),
    }
}

fn parse_value<T: FromStr>(name: &'static str, raw: String) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { name, value: raw })
}
