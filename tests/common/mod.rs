//! Temporary server trees for driving the manager end to end.
#![allow(dead_code)]

use fleetms::{ManagerOptions, Timings};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Appends the argument it was called with to `actions.log` in its own directory.
pub const RECORDING_SCRIPT: &str = "echo \"$1\" >> actions.log";

pub struct Fleet {
    root: TempDir,
}

impl Fleet {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().expect("create temp root"),
        }
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn dir(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }

    /// A well-formed server directory with a recording lifecycle script.
    pub fn add_server(&self, name: &str, properties: &str) -> PathBuf {
        let dir = self.dir(name);
        fs::create_dir_all(dir.join("logs")).unwrap();
        fs::write(dir.join("logs/latest.log"), "[Server thread/INFO]: Done\n").unwrap();
        fs::write(dir.join("server.properties"), properties).unwrap();
        self.set_script(name, RECORDING_SCRIPT);
        dir
    }

    pub fn set_script(&self, name: &str, body: &str) {
        let path = self.dir(name).join("tmux.sh");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    pub fn set_properties(&self, name: &str, properties: &str) {
        fs::write(self.dir(name).join("server.properties"), properties).unwrap();
    }

    /// Arguments the lifecycle script has been invoked with, in order.
    pub fn actions(&self, name: &str) -> Vec<String> {
        fs::read_to_string(self.dir(name).join("actions.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn options(&self) -> ManagerOptions {
        let mut options = ManagerOptions::new(self.root());
        options.timings = Timings {
            port_probe_timeout: Duration::from_millis(500),
            ..Timings::default()
        };
        options
    }
}

pub async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// A port nothing is listening on.
pub async fn closed_port() -> u16 {
    let (listener, port) = listener().await;
    drop(listener);
    port
}
