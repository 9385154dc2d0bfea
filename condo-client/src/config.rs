//! Client configuration

use std::path::PathBuf;

use serde::{Deserialize, Deserializer};
use tracing_subscriber::filter::Directive;

/// Logging output format
#[derive(Debug, Clone, Copy, Deserialize)]
pub enum LogFormat {
    Compact,
    Pretty,
}

impl Default for LogFormat {
    fn default() -> Self {
        Self::Compact
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Logging {
    /// Additional filtering directives
    #[serde(default, deserialize_with = "Logging::deserialize_filters")]
    pub filters: Vec<Directive>,

    /// Logging format
    #[serde(default)]
    pub format: LogFormat,
}

impl Logging {
    fn deserialize_filters<'de, D>(deserializer: D) -> Result<Vec<Directive>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let dirs: Vec<String> = Deserialize::deserialize(deserializer)?;
        dirs.into_iter()
            .map(|dir| dir.parse().map_err(serde::de::Error::custom))
            .collect()
    }
}

/// Paths of the authentication endpoints, relative to the API base url
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthEndpoints {
    pub login: String,
    pub register: String,
    pub logout: String,
    pub profile: String,
    pub change_password: String,
    pub password_reset: String,
    pub password_reset_confirm: String,
    /// User administration collection, single users live below it
    pub users: String,
}

impl Default for AuthEndpoints {
    fn default() -> Self {
        Self {
            login: "/api/auth/iniciar-sesion/".to_owned(),
            register: "/api/auth/registrar/".to_owned(),
            logout: "/api/auth/logout/".to_owned(),
            profile: "/api/auth/perfil/".to_owned(),
            change_password: "/api/auth/change-password/".to_owned(),
            password_reset: "/api/auth/password-reset/".to_owned(),
            password_reset_confirm: "/api/auth/password-reset-confirm/".to_owned(),
            users: "/api/auth/users/".to_owned(),
        }
    }
}

/// Remote API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Api {
    /// Base url all request paths are resolved against
    #[serde(default = "Api::default_base_url")]
    pub base_url: String,

    /// Endpoint exchanging a refresh token for a new access token
    #[serde(default = "Api::default_refresh_path")]
    pub refresh_path: String,

    /// Per-request timeout in seconds
    #[serde(default = "Api::default_timeout_secs")]
    pub timeout_secs: u64,

    /// Authentication endpoints
    #[serde(default)]
    pub auth: AuthEndpoints,
}

impl Api {
    fn default_base_url() -> String {
        "https://back-smart-condominium-1.onrender.com".to_owned()
    }

    fn default_refresh_path() -> String {
        "/api/auth/token/refresh/".to_owned()
    }

    fn default_timeout_secs() -> u64 {
        30
    }

    /// Configuration pointing to the given base url, everything else defaulted
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}

impl Default for Api {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            refresh_path: Self::default_refresh_path(),
            timeout_secs: Self::default_timeout_secs(),
            auth: AuthEndpoints::default(),
        }
    }
}

/// Where session credentials are kept between runs
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "store")]
pub enum Session {
    /// Credentials live only as long as the process
    Memory,
    /// Credentials are persisted in a TOML file
    File { path: PathBuf },
}

impl Default for Session {
    fn default() -> Self {
        Self::File {
            path: "session.toml".into(),
        }
    }
}

/// Top level client configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// API configuration
    #[serde(default)]
    pub api: Api,

    /// Session storage
    #[serde(default)]
    pub session: Session,

    /// Logging configuration
    #[serde(default)]
    pub logging: Logging,
}
