//! Discovery, supervision and remote administration for a fleet of game
//! servers living under one directory tree.
//!
//! [`ServerManager`] is the entry point; everything else is the machinery it
//! drives.

pub mod config;
pub mod error;
pub mod handlers;
pub mod manager;
pub mod models;
pub mod probe;
pub mod process;
pub mod properties;
pub mod rcon;
pub mod scanner;
pub mod storage;
pub mod utils;

pub use error::{FleetError, Result};
pub use manager::{ManagerOptions, ServerManager, Timings};
pub use models::server::{FleetSnapshot, ServerInfo, ServerStatus};
pub use process::LifecycleScript;
