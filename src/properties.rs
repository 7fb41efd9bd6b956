// src/properties.rs
use std::collections::HashMap;
use std::path::Path;

use crate::error::{FleetError, Result};

pub const SERVER_PROPERTIES: &str = "server.properties";

pub const KEY_SERVER_IP: &str = "server-ip";
pub const KEY_SERVER_PORT: &str = "server-port";
pub const KEY_ENABLE_RCON: &str = "enable-rcon";
pub const KEY_RCON_PORT: &str = "rcon.port";
pub const KEY_RCON_PASSWORD: &str = "rcon.password";

pub const DEFAULT_SERVER_IP: &str = "127.0.0.1";

/// Key/value pairs from a Java-style `.properties` file.
///
/// Lines are trimmed; blank lines, `#` comments and lines without `=` are
/// skipped. The first `=` splits key from value and both sides are trimmed.
/// Later duplicates win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: HashMap<String, String>,
}

impl Properties {
    pub fn parse(text: &str) -> Self {
        let mut entries = HashMap::new();
        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                entries.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        Self { entries }
    }

    pub async fn load(path: &Path) -> Result<Self> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => {}
            _ => {
                return Err(FleetError::Properties(format!(
                    "Properties file not found: {}",
                    path.display()
                )))
            }
        }
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            FleetError::Properties(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Ok(Self::parse(&text))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// `true` only for a case-insensitive `true`; anything else, including a
    /// missing key, is `false`.
    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    /// Missing and empty values read as 0. Anything that is not a valid port
    /// number is an error.
    pub fn get_port(&self, key: &str) -> Result<u16> {
        match self.get(key) {
            None | Some("") => Ok(0),
            Some(v) => v.parse::<u16>().map_err(|_| {
                FleetError::Properties(format!("{} has an invalid port value '{}'", key, v))
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Read the RCON password straight from disk. It is never cached because the
/// server owner may rotate it at any time.
pub async fn read_rcon_password(server_dir: &Path) -> Option<String> {
    let props = Properties::load(&server_dir.join(SERVER_PROPERTIES)).await.ok()?;
    props
        .get(KEY_RCON_PASSWORD)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
}
