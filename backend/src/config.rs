use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_CONFIG_PATH: &str = "config/cropdoc.yaml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("YAML parsing failed: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error("Invalid URL for {key}: {source}")]
    InvalidUrl {
        key: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("The vision backend requires GEMINI_API_KEY to be set")]
    MissingApiKey,
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Which service answers `/api/diagnose`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[serde(alias = "ml")]
    Proxy,
    #[serde(alias = "gemini", alias = "direct")]
    Vision,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Proxy => "proxy",
            BackendKind::Vision => "vision",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "proxy" | "ml" => Ok(BackendKind::Proxy),
            "vision" | "gemini" | "direct" => Ok(BackendKind::Vision),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: Url,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-1.5-flash".to_string(),
            base_url: Url::parse("https://generativelanguage.googleapis.com/")
                .expect("static URL is valid"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub port: u16,
    pub backend: BackendKind,
    pub ml_service_url: Url,
    pub gemini: GeminiConfig,
    pub weather_base_url: Url,
    pub upload_dir: PathBuf,
    pub static_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8081,
            backend: BackendKind::Proxy,
            ml_service_url: Url::parse("http://localhost:8000/").expect("static URL is valid"),
            gemini: GeminiConfig::default(),
            weather_base_url: Url::parse("https://api.open-meteo.com/")
                .expect("static URL is valid"),
            upload_dir: env::temp_dir().join("cropdoc-uploads"),
            static_dir: PathBuf::from("frontend/dist"),
            max_upload_bytes: 10 * 1024 * 1024,
            request_timeout_secs: 30,
            connect_timeout_secs: 5,
        }
    }
}

impl AppConfig {
    /// Built-in defaults, then the YAML file, then process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match env::var("CROPDOC_CONFIG") {
            Ok(path) => Self::from_yaml_file(Path::new(&path))?,
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_yaml_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            Err(_) => {
                log::info!("No config file found, using built-in defaults");
                Self::default()
            }
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Loaded configuration from {}", path.display());
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("PORT") {
            self.port = parse_var("PORT", value)?;
        }
        if let Some(value) = lookup("DIAGNOSIS_BACKEND") {
            self.backend = value
                .parse()
                .map_err(|_| ConfigError::InvalidValue {
                    key: "DIAGNOSIS_BACKEND",
                    value,
                })?;
        }
        if let Some(value) = lookup("ML_SERVICE_URL") {
            self.ml_service_url = parse_url("ML_SERVICE_URL", &value)?;
        }
        if let Some(value) = lookup("GEMINI_API_KEY") {
            self.gemini.api_key = Some(value);
        }
        if let Some(value) = lookup("GEMINI_MODEL") {
            self.gemini.model = value;
        }
        if let Some(value) = lookup("GEMINI_BASE_URL") {
            self.gemini.base_url = parse_url("GEMINI_BASE_URL", &value)?;
        }
        if let Some(value) = lookup("WEATHER_BASE_URL") {
            self.weather_base_url = parse_url("WEATHER_BASE_URL", &value)?;
        }
        if let Some(value) = lookup("UPLOAD_DIR") {
            self.upload_dir = PathBuf::from(value);
        }
        if let Some(value) = lookup("STATIC_DIR") {
            self.static_dir = PathBuf::from(value);
        }
        if let Some(value) = lookup("MAX_UPLOAD_BYTES") {
            self.max_upload_bytes = parse_var("MAX_UPLOAD_BYTES", value)?;
        }
        if let Some(value) = lookup("REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_var("REQUEST_TIMEOUT_SECS", value)?;
        }
        if let Some(value) = lookup("CONNECT_TIMEOUT_SECS") {
            self.connect_timeout_secs = parse_var("CONNECT_TIMEOUT_SECS", value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Zero("request_timeout_secs"));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::Zero("connect_timeout_secs"));
        }
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::Zero("max_upload_bytes"));
        }
        if self.backend == BackendKind::Vision && self.gemini_api_key().is_none() {
            return Err(ConfigError::MissingApiKey);
        }
        Ok(())
    }

    pub fn gemini_api_key(&self) -> Option<&str> {
        self.gemini
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// The one outbound client shared by every handler for the life of the process.
    pub fn http_client(&self) -> Result<reqwest::Client, ConfigError> {
        Ok(reqwest::Client::builder()
            .timeout(self.request_timeout())
            .connect_timeout(self.connect_timeout())
            .build()?)
    }
}

fn parse_var<T: FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key, value })
}

fn parse_url(key: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value.trim()).map_err(|source| ConfigError::InvalidUrl { key, source })
}

/// Joins `path` under `base`, keeping any path prefix the base already has.
pub fn endpoint(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path.trim_start_matches('/'))
}
