// src/models/server.rs
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Online,
    Offline,
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// One discovered server as of the scan that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub path: PathBuf,
    pub status: ServerStatus,
    pub ip: String,
    pub port: u16,
    pub rcon_port: u16,
    pub rcon_enabled: bool,
}

impl ServerInfo {
    pub fn is_online(&self) -> bool {
        self.status == ServerStatus::Online
    }
}

/// The complete name -> ServerInfo mapping produced by a single scan.
/// Never mutated after construction; a new scan builds a new one.
#[derive(Debug, Clone, Serialize)]
pub struct FleetSnapshot {
    servers: BTreeMap<String, ServerInfo>,
    scanned_at: Option<SystemTime>,
}

impl FleetSnapshot {
    pub fn empty() -> Self {
        Self {
            servers: BTreeMap::new(),
            scanned_at: None,
        }
    }

    pub fn new(servers: BTreeMap<String, ServerInfo>, scanned_at: SystemTime) -> Self {
        Self {
            servers,
            scanned_at: Some(scanned_at),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ServerInfo> {
        self.servers.get(name)
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// When the scan behind this snapshot completed; `None` before the first scan.
    pub fn scanned_at(&self) -> Option<SystemTime> {
        self.scanned_at
    }

    /// Servers ordered by name.
    pub fn servers(&self) -> impl Iterator<Item = &ServerInfo> {
        self.servers.values()
    }

    pub fn names_with_status(&self, status: ServerStatus) -> Vec<String> {
        self.servers
            .values()
            .filter(|s| s.status == status)
            .map(|s| s.name.clone())
            .collect()
    }

    pub fn count(&self, status: ServerStatus) -> usize {
        self.servers.values().filter(|s| s.status == status).count()
    }
}

impl Default for FleetSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}
