use governor::Quota;
use ipnetwork::IpNetwork;
use log::warn;
use std::env;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::manager::{ManagerOptions, Timings};
use crate::process::LifecycleScript;

#[derive(Clone, Debug)]
pub struct Config {
    // Fleet
    pub servers_path: PathBuf,
    pub refresh_interval_secs: u64,
    pub log_max_age_days: u64,
    pub lifecycle_script: String,
    pub lifecycle_start_arg: String,
    pub lifecycle_stop_arg: String,
    pub failure_alert_threshold: u32,

    // Admin HTTP surface
    pub bind_address: String,
    pub port: u16,
    pub admin_allowed_networks: Vec<IpNetwork>,

    // Rate limiting configs
    pub action_period_secs: u64,
    pub action_burst_limit: u32,
    pub read_period_secs: u64,
    pub read_burst_limit: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            servers_path: expand_home("~/servers"),
            refresh_interval_secs: 300,
            log_max_age_days: 7,
            lifecycle_script: "tmux.sh".to_string(),
            lifecycle_start_arg: "sstart".to_string(),
            lifecycle_stop_arg: "sstop".to_string(),
            failure_alert_threshold: 3,
            bind_address: "127.0.0.1".to_string(),
            port: 8080,
            admin_allowed_networks: parse_networks("127.0.0.0/8,::1/128"),
            action_period_secs: 5,
            action_burst_limit: 10,
            read_period_secs: 1,
            read_burst_limit: 60,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: String) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
}

/// Expand a leading `~/` using `$HOME`.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}

/// Comma separated CIDR list; invalid entries are logged and skipped.
pub fn parse_networks(list: &str) -> Vec<IpNetwork> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match IpNetwork::from_str(s) {
            Ok(net) => Some(net),
            Err(e) => {
                warn!("Ignoring invalid admin network '{}': {}", s, e);
                None
            }
        })
        .collect()
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            servers_path: env::var("SERVERS_PATH")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(|v| expand_home(v.trim()))
                .unwrap_or(defaults.servers_path),
            refresh_interval_secs: env_or("REFRESH_INTERVAL_SECS", defaults.refresh_interval_secs),
            log_max_age_days: env_or("LOG_MAX_AGE_DAYS", defaults.log_max_age_days),
            lifecycle_script: env_string("LIFECYCLE_SCRIPT", defaults.lifecycle_script),
            lifecycle_start_arg: env_string("LIFECYCLE_START_ARG", defaults.lifecycle_start_arg),
            lifecycle_stop_arg: env_string("LIFECYCLE_STOP_ARG", defaults.lifecycle_stop_arg),
            failure_alert_threshold: env_or(
                "FAILURE_ALERT_THRESHOLD",
                defaults.failure_alert_threshold,
            ),
            bind_address: env_string("BIND_ADDRESS", defaults.bind_address),
            port: env_or("PORT", defaults.port),
            admin_allowed_networks: env::var("ADMIN_ALLOWED_NETWORKS")
                .ok()
                .map(|v| parse_networks(&v))
                .unwrap_or(defaults.admin_allowed_networks),
            action_period_secs: env_or("ACTION_PERIOD_SECS", defaults.action_period_secs),
            action_burst_limit: env_or("ACTION_BURST_LIMIT", defaults.action_burst_limit),
            read_period_secs: env_or("READ_PERIOD_SECS", defaults.read_period_secs),
            read_burst_limit: env_or("READ_BURST_LIMIT", defaults.read_burst_limit),
        }
    }

    pub fn manager_options(&self) -> ManagerOptions {
        ManagerOptions {
            servers_path: self.servers_path.clone(),
            refresh_interval: Duration::from_secs(self.refresh_interval_secs.max(1)),
            log_max_age: Duration::from_secs(self.log_max_age_days * 86_400),
            lifecycle: LifecycleScript {
                file_name: self.lifecycle_script.clone(),
                start_arg: self.lifecycle_start_arg.clone(),
                stop_arg: self.lifecycle_stop_arg.clone(),
            },
            failure_alert_threshold: self.failure_alert_threshold,
            timings: Timings::default(),
        }
    }

    pub fn bind(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn action_quota(&self) -> Quota {
        quota(self.action_period_secs, self.action_burst_limit)
    }

    pub fn read_quota(&self) -> Quota {
        quota(self.read_period_secs, self.read_burst_limit)
    }
}

fn quota(period_secs: u64, burst: u32) -> Quota {
    let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
    Quota::with_period(Duration::from_secs(period_secs.max(1)))
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
        .allow_burst(burst)
}
