// src/manager.rs
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::error::{FleetError, Result};
use crate::models::server::{FleetSnapshot, ServerInfo, ServerStatus};
use crate::process::{run_script, LifecycleScript};
use crate::properties::read_rcon_password;
use crate::rcon::{self, RconTimeouts};
use crate::scanner::Scanner;
use crate::storage::memory::{ScanFailures, SnapshotStore};

/// Internal waits. The defaults are the production values.
#[derive(Debug, Clone, Copy)]
pub struct Timings {
    /// How long after a start/stop before the follow-up scan runs.
    pub post_action_refresh_delay: Duration,
    pub subprocess_timeout: Duration,
    pub port_probe_timeout: Duration,
    pub rcon: RconTimeouts,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            post_action_refresh_delay: Duration::from_secs(5),
            subprocess_timeout: Duration::from_secs(3),
            port_probe_timeout: Duration::from_secs(1),
            rcon: RconTimeouts::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ManagerOptions {
    pub servers_path: PathBuf,
    pub refresh_interval: Duration,
    pub log_max_age: Duration,
    pub lifecycle: LifecycleScript,
    pub failure_alert_threshold: u32,
    pub timings: Timings,
}

impl ManagerOptions {
    pub fn new(servers_path: impl Into<PathBuf>) -> Self {
        Self {
            servers_path: servers_path.into(),
            refresh_interval: Duration::from_secs(300),
            log_max_age: Duration::from_secs(7 * 86_400),
            lifecycle: LifecycleScript::default(),
            failure_alert_threshold: 3,
            timings: Timings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum LifecycleAction {
    Start,
    Stop,
}

impl LifecycleAction {
    fn verb(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
        }
    }
}

/// Work handed to the manager task. Each carries the channel its result goes back on.
enum Request {
    Lifecycle {
        name: String,
        action: LifecycleAction,
        reply: oneshot::Sender<Result<()>>,
    },
    Rcon {
        name: String,
        command: String,
        reply: oneshot::Sender<Result<String>>,
    },
    Refresh {
        reply: oneshot::Sender<()>,
    },
}

/// Owns the fleet snapshot and runs every scan and action on one task.
///
/// `open` spawns that task on the calling runtime. `start`, `stop`, `run_rcon`
/// and `force_refresh` queue a request on it and wait for the answer, so at
/// most one scan or action runs at a time no matter which thread asked.
/// Reads (`list`, `status`, `online`, ...) only clone the current snapshot
/// pointer and never wait on running actions.
pub struct ServerManager {
    snapshot: Arc<SnapshotStore>,
    failures: Arc<ScanFailures>,
    requests: mpsc::UnboundedSender<Request>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ServerManager {
    /// Start the manager task and run the first scan before returning, so
    /// the manager is populated on return.
    pub async fn open(options: ManagerOptions) -> Self {
        if !tokio::fs::metadata(&options.servers_path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            warn!("Servers directory not found: {}", options.servers_path.display());
        }

        info!("ServerManager starting up...");
        let snapshot = Arc::new(SnapshotStore::new());
        let failures = Arc::new(ScanFailures::new(options.failure_alert_threshold));
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = Worker {
            scanner: Scanner::new(
                options.servers_path,
                options.log_max_age,
                options.lifecycle.file_name.clone(),
                options.timings.port_probe_timeout,
            ),
            lifecycle: options.lifecycle,
            timings: options.timings,
            refresh_interval: options.refresh_interval,
            snapshot: Arc::clone(&snapshot),
            failures: Arc::clone(&failures),
            pending: BTreeSet::new(),
        };

        let task = tokio::spawn(worker.run(request_rx, shutdown_rx));
        let manager = Self {
            snapshot,
            failures,
            requests: request_tx,
            shutdown: shutdown_tx,
            task: Mutex::new(Some(task)),
        };
        manager.force_refresh().await;
        info!("ServerManager startup complete. Initial scan finished.");
        manager
    }

    /// Stop the manager task and wait for it to exit. A scan or action
    /// already in progress is allowed to finish.
    pub async fn close(&self) {
        let _ = self.shutdown.send(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("Manager task ended abnormally: {}", e);
            }
            info!("ServerManager background task shut down.");
        }
    }

    // --- reads ---

    pub fn snapshot(&self) -> Arc<FleetSnapshot> {
        self.snapshot.current()
    }

    /// Every known server, ordered by name.
    pub fn list(&self) -> Vec<ServerInfo> {
        self.snapshot().servers().cloned().collect()
    }

    pub fn all_servers(&self) -> BTreeMap<String, ServerInfo> {
        self.snapshot()
            .servers()
            .map(|s| (s.name.clone(), s.clone()))
            .collect()
    }

    pub fn server(&self, name: &str) -> Option<ServerInfo> {
        self.snapshot().get(name).cloned()
    }

    pub fn status(&self, name: &str) -> Result<ServerStatus> {
        self.server(name)
            .map(|s| s.status)
            .ok_or_else(|| FleetError::NotFound(name.to_string()))
    }

    pub fn online(&self) -> Vec<String> {
        self.snapshot().names_with_status(ServerStatus::Online)
    }

    pub fn offline(&self) -> Vec<String> {
        self.snapshot().names_with_status(ServerStatus::Offline)
    }

    /// Online servers that accept RCON commands.
    pub fn rcon_capable(&self) -> Vec<String> {
        self.snapshot()
            .servers()
            .filter(|s| s.is_online() && s.rcon_enabled)
            .map(|s| s.name.clone())
            .collect()
    }

    /// Candidates that are currently failing to load, with their streaks.
    pub fn scan_failures(&self) -> Vec<(String, u32)> {
        self.failures.snapshot()
    }

    // --- actions ---

    pub async fn start(&self, name: &str) -> Result<()> {
        self.lifecycle(name, LifecycleAction::Start).await
    }

    pub async fn stop(&self, name: &str) -> Result<()> {
        self.lifecycle(name, LifecycleAction::Stop).await
    }

    async fn lifecycle(&self, name: &str, action: LifecycleAction) -> Result<()> {
        info!("Received {} command for server '{}'.", action.verb(), name);
        self.call(|reply| Request::Lifecycle {
            name: name.to_string(),
            action,
            reply,
        })
        .await
        .unwrap_or_else(|| Err(shut_down()))
    }

    /// Send one command over a fresh RCON session and return the raw reply.
    pub async fn run_rcon(&self, name: &str, command: &str) -> Result<String> {
        info!("Executing RCON command on '{}': {}", name, command);
        if command.len() > rcon::MAX_COMMAND_LEN {
            return Err(FleetError::InvalidCommand(format!(
                "RCON command is {} bytes, the limit is {}.",
                command.len(),
                rcon::MAX_COMMAND_LEN
            )));
        }
        self.call(|reply| Request::Rcon {
            name: name.to_string(),
            command: command.to_string(),
            reply,
        })
        .await
        .unwrap_or_else(|| Err(shut_down()))
    }

    /// Scan now and wait for the new snapshot to be installed.
    pub async fn force_refresh(&self) {
        if self.call(|reply| Request::Refresh { reply }).await.is_none() {
            warn!("Refresh skipped: the manager is shut down.");
        }
    }

    /// Queue a request and wait for its reply. `None` once the task is gone.
    async fn call<T>(&self, request: impl FnOnce(oneshot::Sender<T>) -> Request) -> Option<T> {
        let (reply, answer) = oneshot::channel();
        self.requests.send(request(reply)).ok()?;
        answer.await.ok()
    }
}

impl Drop for ServerManager {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

fn shut_down() -> FleetError {
    FleetError::State("The server manager is shut down.".to_string())
}

/// State owned by the manager task.
struct Worker {
    scanner: Scanner,
    lifecycle: LifecycleScript,
    timings: Timings,
    refresh_interval: Duration,
    snapshot: Arc<SnapshotStore>,
    failures: Arc<ScanFailures>,
    // One deadline per start/stop whose follow-up scan has not run yet.
    pending: BTreeSet<Instant>,
}

impl Worker {
    /// Serves requests, and scans every `refresh_interval` or earlier when a
    /// delayed refresh comes due. Returns once shutdown is signalled.
    async fn run(
        mut self,
        mut requests: mpsc::UnboundedReceiver<Request>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("Background refresh loop started.");
        let mut next_periodic = Instant::now() + self.refresh_interval;

        loop {
            let deadline = self
                .pending
                .first()
                .map_or(next_periodic, |at| (*at).min(next_periodic));
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                request = requests.recv() => match request {
                    Some(request) => self.handle(request).await,
                    None => break,
                },
                _ = sleep_until(deadline) => {
                    let now = Instant::now();
                    let reason = if self.pending.first().is_some_and(|at| *at <= now) {
                        "Scheduled"
                    } else {
                        "Periodic"
                    };
                    self.scan_and_replace(reason).await;
                    self.pending.retain(|at| *at > now);
                    next_periodic = Instant::now() + self.refresh_interval;
                }
            }
        }
        info!("Background refresh loop stopped.");
    }

    async fn handle(&mut self, request: Request) {
        match request {
            Request::Lifecycle { name, action, reply } => {
                let result = self.run_lifecycle(&name, action).await;
                let _ = reply.send(result);
            }
            Request::Rcon { name, command, reply } => {
                let result = self.run_rcon(&name, &command).await;
                let _ = reply.send(result);
            }
            Request::Refresh { reply } => {
                info!("Forcing a manual refresh...");
                self.scan_and_replace("Manual").await;
                let _ = reply.send(());
            }
        }
    }

    async fn scan_and_replace(&self, reason: &str) {
        let report = self.scanner.scan().await;

        for (name, err) in &report.failures {
            self.failures.record_failure(name, &err.to_string());
        }
        for name in report.servers.keys() {
            self.failures.record_success(name);
        }
        self.failures.retain_seen(&report.candidate_names());

        let snapshot = FleetSnapshot::new(report.servers, SystemTime::now());
        info!(
            "{} scan complete. Status: {} online, {} offline.",
            reason,
            snapshot.count(ServerStatus::Online),
            snapshot.count(ServerStatus::Offline)
        );
        self.snapshot.replace(snapshot);
    }

    fn lookup(&self, name: &str) -> Result<ServerInfo> {
        self.snapshot
            .current()
            .get(name)
            .cloned()
            .ok_or_else(|| FleetError::NotFound(name.to_string()))
    }

    async fn run_lifecycle(&mut self, name: &str, action: LifecycleAction) -> Result<()> {
        let server = self.lookup(name)?;
        let arg = match (action, server.status) {
            (LifecycleAction::Start, ServerStatus::Online) => {
                return Err(FleetError::State(format!("Server '{}' is already online.", name)))
            }
            (LifecycleAction::Stop, ServerStatus::Offline) => {
                return Err(FleetError::State(format!("Server '{}' is already offline.", name)))
            }
            (LifecycleAction::Start, _) => &self.lifecycle.start_arg,
            (LifecycleAction::Stop, _) => &self.lifecycle.stop_arg,
        };

        let script = self.lifecycle.path_in(&server.path);
        run_script(&script, arg, self.timings.subprocess_timeout).await?;
        info!("{} script executed for '{}'.", action.verb(), name);

        let due = Instant::now() + self.timings.post_action_refresh_delay;
        debug!("Refresh for '{}' scheduled in {:?}", name, self.timings.post_action_refresh_delay);
        self.pending.insert(due);
        Ok(())
    }

    async fn run_rcon(&self, name: &str, command: &str) -> Result<String> {
        let server = self.lookup(name)?;
        if !server.is_online() {
            return Err(FleetError::State(format!(
                "Cannot run RCON on offline server '{}'.",
                name
            )));
        }
        if !server.rcon_enabled {
            return Err(FleetError::Properties(format!(
                "RCON is not enabled for server '{}'.",
                name
            )));
        }
        if server.rcon_port == 0 {
            return Err(FleetError::Properties(format!(
                "rcon.port is not set for server '{}'.",
                name
            )));
        }
        let password = read_rcon_password(&server.path)
            .await
            .ok_or_else(|| FleetError::Properties(format!("RCON password not found for '{}'.", name)))?;

        rcon::execute(&server.ip, server.rcon_port, &password, command, self.timings.rcon)
            .await
            .map_err(|source| {
                warn!("RCON to '{}' at {}:{} failed: {}", name, server.ip, server.rcon_port, source);
                FleetError::RconConnection {
                    name: name.to_string(),
                    source,
                }
            })
    }
}
