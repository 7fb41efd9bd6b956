// src/probe.rs
use log::debug;
use std::time::Duration;
use tokio::net::TcpStream;

/// TCP reachability check: true when a connection to `host:port` is accepted
/// within `limit`. Refusals, resolution failures and timeouts all read as
/// unreachable.
pub async fn is_port_open(host: &str, port: u16, limit: Duration) -> bool {
    match tokio::time::timeout(limit, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => {
            drop(stream);
            debug!("Port {}:{} accepted a connection", host, port);
            true
        }
        Ok(Err(e)) => {
            debug!("Port {}:{} unreachable: {}", host, port, e);
            false
        }
        Err(_) => {
            debug!("Port {}:{} probe timed out after {:?}", host, port, limit);
            false
        }
    }
}
