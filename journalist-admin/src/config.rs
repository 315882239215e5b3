//! Configuration loading for the admin interface.
//!
//! Loads configuration from TOML files and/or environment variables using figment.
//!
//! # Configuration Sources (in order of priority, lowest to highest)
//!
//! 1. Default values (from `#[serde(default)]` attributes)
//! 2. TOML config file (if it exists)
//! 3. Environment variables (prefix: `JOURNALIST_ADMIN_`, nested with `__`)
//!
//! # Environment Variable Naming
//!
//! - `JOURNALIST_ADMIN_HTTP__LISTEN_ADDR` → `http.listen_addr`
//! - `JOURNALIST_ADMIN_DATABASE__PATH` → `database.path`
//! - `JOURNALIST_ADMIN_ADMIN__SESSION_TIMEOUT_SECS` → `admin.session_timeout_secs`
//! - `JOURNALIST_ADMIN_PASSWORDS__WORD_COUNT` → `passwords.word_count`

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::passwords::PasswordPolicy;

const ENV_PREFIX: &str = "JOURNALIST_ADMIN_";

/// Main configuration for the admin interface.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// HTTP listener settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Session and presentation settings
    #[serde(default)]
    pub admin: AdminConfig,

    /// Passphrase policy and generation
    #[serde(default)]
    pub passwords: PasswordPolicy,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    /// Address to listen on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:8081".to_string()
}

/// Admin UI settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdminConfig {
    /// Session lifetime in seconds (default: 2 hours)
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,

    /// Directory served under `/static`; the uploaded logo lands in `i/logo.png`.
    /// Defaults to `static` in the data directory.
    #[serde(default)]
    pub static_dir: Option<PathBuf>,

    /// Issuer shown by authenticator apps for provisioned secrets
    #[serde(default = "default_otp_issuer")]
    pub otp_issuer: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            session_timeout_secs: default_session_timeout(),
            static_dir: None,
            otp_issuer: default_otp_issuer(),
        }
    }
}

impl AdminConfig {
    /// Resolve the static directory against the data directory.
    pub fn static_dir(&self, data_dir: &Path) -> PathBuf {
        self.static_dir
            .clone()
            .unwrap_or_else(|| data_dir.join("static"))
    }
}

fn default_session_timeout() -> u64 {
    2 * 60 * 60
}

fn default_otp_issuer() -> String {
    "Journalist Interface".to_string()
}

// =============================================================================
// Database Configuration (compile-time feature selection)
// =============================================================================

/// SQLite database configuration (used when compiled with `sqlite` feature).
#[cfg(feature = "sqlite")]
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    /// If not specified, defaults to `journalists.db` in the data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// PostgreSQL database configuration (used when compiled with `postgres` feature).
#[cfg(feature = "postgres")]
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database host (default: "localhost")
    #[serde(default = "default_postgres_host")]
    pub host: String,

    /// Database port (default: 5432)
    #[serde(default = "default_postgres_port")]
    pub port: u16,

    /// Database user
    #[serde(default)]
    pub user: String,

    /// Database password
    #[serde(default)]
    pub password: String,

    /// Database name (default: "journalist_admin")
    #[serde(default = "default_postgres_database")]
    pub database: String,
}

#[cfg(feature = "postgres")]
fn default_postgres_host() -> String {
    "localhost".to_string()
}

#[cfg(feature = "postgres")]
fn default_postgres_port() -> u16 {
    5432
}

#[cfg(feature = "postgres")]
fn default_postgres_database() -> String {
    "journalist_admin".to_string()
}

#[cfg(feature = "postgres")]
impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_postgres_host(),
            port: default_postgres_port(),
            user: String::new(),
            password: String::new(),
            database: default_postgres_database(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file and environment variables.
    ///
    /// A missing file is not an error: every section has defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let mut figment = Figment::new();

        if path.exists() {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract().with_context(|| {
            format!(
                "Failed to load config from {} and environment",
                path.display()
            )
        })?;

        Ok(config)
    }

    /// Get the default config file path
    /// - macOS: ~/Library/Application Support/journalist-admin/config.toml
    /// - Linux: ~/.config/journalist-admin/config.toml
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("journalist-admin")
            .join("config.toml")
    }

    /// Get the default data directory (database, logs, static files)
    /// - macOS: ~/Library/Application Support/journalist-admin/
    /// - Linux: ~/.local/share/journalist-admin/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("journalist-admin")
    }
}

/// Create a default configuration template
pub fn default_config_template() -> String {
    let data_dir = Config::default_data_dir();
    let data_dir_str = data_dir.display();

    format!(
        r#"# Journalist Admin Configuration
# Data directory: {data_dir_str}

[http]
listen_addr = "127.0.0.1:8081"

# =============================================================================
# Database Configuration
# =============================================================================
#
# The backend is selected at compile time via cargo features:
#   - cargo build -p journalist-admin --features sqlite (default)
#   - cargo build -p journalist-admin --features postgres --no-default-features

# SQLite configuration
[database]
# path = "{data_dir_str}/journalists.db"  # Optional, defaults to data_dir/journalists.db

# PostgreSQL configuration
# [database]
# host = "localhost"
# port = 5432
# user = "journalist_admin"
# password = "secret"
# database = "journalist_admin"

[admin]
session_timeout_secs = 7200
# static_dir = "{data_dir_str}/static"
otp_issuer = "Journalist Interface"

# =============================================================================
# Passphrases
# =============================================================================
#
# Generated passphrases use `word_count` words. Every password set through the
# interface must satisfy the length bounds and contain at least `min_words`
# whitespace-separated words.

[passwords]
word_count = 7
min_length = 14
max_length = 128
min_words = 7
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::providers::Toml as TomlProvider;

    fn parse_config(toml_str: &str) -> Config {
        Figment::new()
            .merge(TomlProvider::string(toml_str))
            .extract()
            .expect("Failed to parse test config")
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("");
        assert_eq!(config.http.listen_addr, "127.0.0.1:8081");
        assert_eq!(config.admin.session_timeout_secs, 7200);
        assert_eq!(config.passwords.word_count, 7);
        assert_eq!(config.passwords.min_words, 7);
    }

    #[test]
    fn test_parse_config() {
        let config = parse_config(
            r#"
[http]
listen_addr = "0.0.0.0:9000"

[admin]
session_timeout_secs = 60
static_dir = "/srv/static"

[passwords]
word_count = 8
min_length = 20
"#,
        );
        assert_eq!(config.http.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.admin.session_timeout_secs, 60);
        assert_eq!(
            config.admin.static_dir(Path::new("/data")),
            PathBuf::from("/srv/static")
        );
        assert_eq!(config.passwords.word_count, 8);
        assert_eq!(config.passwords.min_length, 20);
        assert_eq!(config.passwords.max_length, 128);
    }

    #[test]
    fn test_static_dir_defaults_to_data_dir() {
        let config = parse_config("");
        assert_eq!(
            config.admin.static_dir(Path::new("/data")),
            PathBuf::from("/data/static")
        );
    }

    #[test]
    fn test_default_template_parses() {
        let config = parse_config(&default_config_template());
        assert_eq!(config.admin.otp_issuer, "Journalist Interface");
    }
}
