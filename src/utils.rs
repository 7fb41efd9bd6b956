// src/utils.rs
use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, ResponseError};
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::RateLimiter;
use ipnetwork::IpNetwork;
use log::{error, warn};
use serde_json::json;
use std::fmt;
use std::net::IpAddr;

use crate::error::FleetError;

pub type KeyedLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

/// Admin networks allowed to reach the HTTP surface.
#[derive(Clone, Debug)]
pub struct AdminNetworks(pub Vec<IpNetwork>);

impl AdminNetworks {
    pub fn allows(&self, ip: IpAddr) -> bool {
        self.0.iter().any(|net| net.contains(ip))
    }
}

/// Rate limiter for requests that change fleet state.
pub struct ActionLimiter(pub KeyedLimiter);

/// Rate limiter for read-only requests.
pub struct ReadLimiter(pub KeyedLimiter);

#[derive(Debug)]
pub enum RequestError {
    MissingPeerIP,
    UntrustedIP(String),
    RateLimitExceeded,
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingPeerIP => write!(f, "Failed to extract client IP"),
            Self::UntrustedIP(ip) => write!(f, "Request from untrusted IP: {}", ip),
            Self::RateLimitExceeded => write!(f, "Rate limit exceeded"),
        }
    }
}

impl ResponseError for RequestError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::UntrustedIP(_) => StatusCode::FORBIDDEN,
            Self::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::MissingPeerIP => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}

impl ResponseError for FleetError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::State(_) => StatusCode::CONFLICT,
            Self::Properties(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidCommand(_) => StatusCode::BAD_REQUEST,
            Self::RconConnection { .. } => StatusCode::BAD_GATEWAY,
            Self::CommandExecution { .. } | Self::CommandTimeout { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        if !self.is_user_safe() {
            error!("{} (stderr: {})", self, self.stderr().unwrap_or("").trim_end());
        }
        HttpResponse::build(self.status_code()).json(json!({ "error": self.user_message() }))
    }
}

/// Either a request-level rejection or a fleet operation failure.
#[derive(Debug)]
pub enum ApiError {
    Request(RequestError),
    Fleet(FleetError),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request(e) => fmt::Display::fmt(e, f),
            Self::Fleet(e) => fmt::Display::fmt(e, f),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Request(e) => e.status_code(),
            Self::Fleet(e) => e.status_code(),
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            Self::Request(e) => e.error_response(),
            Self::Fleet(e) => e.error_response(),
        }
    }
}

impl From<RequestError> for ApiError {
    fn from(e: RequestError) -> Self {
        Self::Request(e)
    }
}

impl From<FleetError> for ApiError {
    fn from(e: FleetError) -> Self {
        Self::Fleet(e)
    }
}

/// The connecting peer's address, if it belongs to an admin network.
/// Forwarding headers are ignored: the admin surface is meant to be reached
/// directly, not through a proxy.
pub fn extract_client_ip(req: &HttpRequest, allowed: &AdminNetworks) -> Result<IpAddr, RequestError> {
    let peer = req.peer_addr().ok_or(RequestError::MissingPeerIP)?.ip();
    if !allowed.allows(peer) {
        warn!("Rejected admin request from {}", peer);
        return Err(RequestError::UntrustedIP(peer.to_string()));
    }
    Ok(peer)
}

pub fn check_rate(limiter: &KeyedLimiter, ip: IpAddr, what: &str) -> Result<(), RequestError> {
    if limiter.check_key(&ip).is_err() {
        error!("Rate limit exceeded for {} for ip: {}", what, ip);
        return Err(RequestError::RateLimitExceeded);
    }
    Ok(())
}
