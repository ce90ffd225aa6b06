//! Configuration module for socksd
//!
//! The daemon reads `settings.ini` from the working directory. Every key is
//! optional; a missing file yields the built-in defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::Path;

fn default_true() -> bool {
    true
}

/// `serde_ini` deserializes values as strings, so a plain `bool` field fails
/// with "invalid type: string ..., expected a boolean". Parse the string
/// ourselves to accept the `true`/`false` literals written in `settings.ini`.
fn bool_from_str<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    match s.as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "invalid boolean value: {:?}",
            other
        ))),
    }
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_socks4_port() -> u16 {
    1080
}

fn default_socks5_port() -> u16 {
    1081
}

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// SOCKS4 server configuration (`[socks4]` section)
    #[serde(default)]
    pub socks4: Socks4Config,

    /// SOCKS5 server configuration (`[socks5]` section)
    #[serde(default)]
    pub socks5: Socks5Config,
}

/// SOCKS4 server configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Socks4Config {
    /// Enable the SOCKS4 listener
    #[serde(default = "default_true", deserialize_with = "bool_from_str")]
    pub enable: bool,

    /// Allow the CONNECT command
    #[serde(default = "default_true", deserialize_with = "bool_from_str")]
    pub enable_connect: bool,

    /// Allow the BIND command
    #[serde(default = "default_true", deserialize_with = "bool_from_str")]
    pub enable_bind: bool,

    /// Expected USER-ID; an empty string accepts any client
    #[serde(default)]
    pub user_id: String,

    /// Listen address
    #[serde(default = "default_address")]
    pub address: String,

    /// Listen port
    #[serde(default = "default_socks4_port")]
    pub port: u16,
}

impl Default for Socks4Config {
    fn default() -> Self {
        Self {
            enable: true,
            enable_connect: true,
            enable_bind: true,
            user_id: String::new(),
            address: default_address(),
            port: default_socks4_port(),
        }
    }
}

/// SOCKS5 server configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Socks5Config {
    /// Enable the SOCKS5 listener
    #[serde(default = "default_true", deserialize_with = "bool_from_str")]
    pub enable: bool,

    /// Allow the CONNECT command
    #[serde(default = "default_true", deserialize_with = "bool_from_str")]
    pub enable_connect: bool,

    /// Allow the BIND command
    #[serde(default = "default_true", deserialize_with = "bool_from_str")]
    pub enable_bind: bool,

    /// Allow the UDP ASSOCIATE command
    #[serde(default = "default_true", deserialize_with = "bool_from_str")]
    pub enable_udp: bool,

    /// Username for user/password authentication
    #[serde(default)]
    pub username: String,

    /// Password for user/password authentication
    #[serde(default)]
    pub password: String,

    /// Listen address
    #[serde(default = "default_address")]
    pub address: String,

    /// Listen port
    #[serde(default = "default_socks5_port")]
    pub port: u16,
}

impl Default for Socks5Config {
    fn default() -> Self {
        Self {
            enable: true,
            enable_connect: true,
            enable_bind: true,
            enable_udp: true,
            username: String::new(),
            password: String::new(),
            address: default_address(),
            port: default_socks5_port(),
        }
    }
}

impl Socks5Config {
    /// True when both a username and a password are configured; the server
    /// then requires the user/password method and refuses "no auth".
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

/// Load configuration from an INI file.
///
/// A missing file is not an error: the original deployment model treats an
/// absent `settings.ini` as "all defaults".
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = match std::fs::read_to_string(path.as_ref()) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Config::default()),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))
        }
    };

    parse_config(&content)
}

/// Parse configuration from an INI string
pub fn parse_config(content: &str) -> Result<Config> {
    serde_ini::from_str(content).with_context(|| "Failed to parse configuration")
}
