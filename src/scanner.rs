// src/scanner.rs
use log::{debug, error, info, warn};
use nix::unistd::{access, AccessFlags};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tokio::task::JoinSet;

use crate::error::{FleetError, Result};
use crate::models::server::{ServerInfo, ServerStatus};
use crate::probe::is_port_open;
use crate::properties::{
    Properties, DEFAULT_SERVER_IP, KEY_ENABLE_RCON, KEY_RCON_PORT, KEY_SERVER_IP,
    KEY_SERVER_PORT, SERVER_PROPERTIES,
};

pub const HEARTBEAT_LOG: &str = "logs/latest.log";

/// Outcome of one pass over the servers directory.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub servers: BTreeMap<String, ServerInfo>,
    /// Candidates that passed the cheap checks but could not be built.
    pub failures: Vec<(String, FleetError)>,
}

impl ScanReport {
    /// Names of every candidate that reached the build stage.
    pub fn candidate_names(&self) -> Vec<String> {
        self.servers
            .keys()
            .cloned()
            .chain(self.failures.iter().map(|(name, _)| name.clone()))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct Scanner {
    root: PathBuf,
    max_log_age: Duration,
    script_name: String,
    probe_timeout: Duration,
}

impl Scanner {
    pub fn new(
        root: impl Into<PathBuf>,
        max_log_age: Duration,
        script_name: impl Into<String>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            root: root.into(),
            max_log_age,
            script_name: script_name.into(),
            probe_timeout,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Subdirectories of the root that pass the cheap checks, sorted.
    pub async fn candidates(&self) -> Vec<PathBuf> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot read servers directory {}: {}", self.root.display(), e);
                return Vec::new();
            }
        };

        let mut out = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Error listing {}: {}", self.root.display(), e);
                    break;
                }
            };
            let path = entry.path();
            if self.is_candidate(&path).await {
                out.push(path);
            }
        }
        out.sort();
        out
    }

    async fn is_candidate(&self, dir: &Path) -> bool {
        let log_path = dir.join(HEARTBEAT_LOG);
        let modified = match tokio::fs::metadata(&log_path).await.and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(_) => return false,
        };
        // A timestamp in the future counts as fresh.
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        if age > self.max_log_age {
            debug!("Skipping {}: heartbeat log is {:?} old", dir.display(), age);
            return false;
        }

        if !is_file(&dir.join(SERVER_PROPERTIES)).await {
            debug!("Skipping {}: no {}", dir.display(), SERVER_PROPERTIES);
            return false;
        }

        let script = dir.join(&self.script_name);
        if !is_file(&script).await || access(script.as_path(), AccessFlags::X_OK).is_err() {
            debug!("Skipping {}: {} missing or not executable", dir.display(), self.script_name);
            return false;
        }
        true
    }

    /// Build a fresh name -> ServerInfo map. Candidates are verified
    /// concurrently; one that fails is reported and left out.
    pub async fn scan(&self) -> ScanReport {
        let started = Instant::now();
        let mut tasks = JoinSet::new();
        for dir in self.candidates().await {
            let probe_timeout = self.probe_timeout;
            tasks.spawn(async move {
                let name = server_name(&dir);
                let result = build_server_info(dir, probe_timeout).await;
                (name, result)
            });
        }

        let mut report = ScanReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(info))) => {
                    report.servers.insert(name, info);
                }
                Ok((name, Err(e))) => report.failures.push((name, e)),
                Err(e) => error!("Server scan task failed: {}", e),
            }
        }
        report.failures.sort_by(|a, b| a.0.cmp(&b.0));

        info!(
            "Scanned {} in {:.2}s: {} servers, {} rejected",
            self.root.display(),
            started.elapsed().as_secs_f64(),
            report.servers.len(),
            report.failures.len()
        );
        report
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

pub fn server_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Parse `server.properties` in `dir` and probe the game port.
pub async fn build_server_info(dir: PathBuf, probe_timeout: Duration) -> Result<ServerInfo> {
    let props = Properties::load(&dir.join(SERVER_PROPERTIES)).await?;

    let ip = match props.get(KEY_SERVER_IP) {
        Some(ip) if !ip.is_empty() => ip.to_string(),
        _ => DEFAULT_SERVER_IP.to_string(),
    };
    let port = props.get_port(KEY_SERVER_PORT)?;
    if port == 0 {
        return Err(FleetError::Properties(
            "server-port is missing or invalid.".to_string(),
        ));
    }
    let rcon_enabled = props.get_bool(KEY_ENABLE_RCON);
    let rcon_port = props.get_port(KEY_RCON_PORT)?;

    let status = if is_port_open(&ip, port, probe_timeout).await {
        ServerStatus::Online
    } else {
        ServerStatus::Offline
    };

    Ok(ServerInfo {
        name: server_name(&dir),
        path: dir,
        status,
        ip,
        port,
        rcon_port,
        rcon_enabled,
    })
}
