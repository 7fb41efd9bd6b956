// src/handlers/actions.rs
use actix_web::{web, HttpRequest, HttpResponse};
use log::info;
use serde::Deserialize;
use serde_json::json;
use std::net::IpAddr;

use crate::manager::ServerManager;
use crate::models::server::ServerStatus;
use crate::utils::{check_rate, extract_client_ip, ActionLimiter, AdminNetworks, ApiError};

#[derive(Deserialize, Default)]
pub struct ActionBody {
    reason: Option<String>,
}

#[derive(Deserialize)]
pub struct RconBody {
    command: String,
    reason: Option<String>,
}

fn admit(
    req: &HttpRequest,
    networks: &AdminNetworks,
    limiter: &ActionLimiter,
) -> Result<IpAddr, ApiError> {
    let ip = extract_client_ip(req, networks)?;
    check_rate(&limiter.0, ip, "server action")?;
    Ok(ip)
}

fn audit(action: &str, server: &str, client: IpAddr, reason: Option<&str>, details: Option<&str>) {
    info!(
        target: "audit",
        "action={} server={} client={} reason={:?} details={:?}",
        action,
        server,
        client,
        reason.unwrap_or(""),
        details.unwrap_or("")
    );
}

pub async fn start_server(
    req: HttpRequest,
    path: web::Path<String>,
    body: Option<web::Json<ActionBody>>,
    manager: web::Data<ServerManager>,
    networks: web::Data<AdminNetworks>,
    limiter: web::Data<ActionLimiter>,
) -> Result<HttpResponse, ApiError> {
    let client = admit(&req, &networks, &limiter)?;
    let name = path.into_inner();
    let body = body.map(web::Json::into_inner).unwrap_or_default();

    manager.start(&name).await?;
    audit("start", &name, client, body.reason.as_deref(), None);
    Ok(HttpResponse::Accepted().json(json!({
        "message": format!("Start command sent for '{}'.", name)
    })))
}

pub async fn stop_server(
    req: HttpRequest,
    path: web::Path<String>,
    body: Option<web::Json<ActionBody>>,
    manager: web::Data<ServerManager>,
    networks: web::Data<AdminNetworks>,
    limiter: web::Data<ActionLimiter>,
) -> Result<HttpResponse, ApiError> {
    let client = admit(&req, &networks, &limiter)?;
    let name = path.into_inner();
    let body = body.map(web::Json::into_inner).unwrap_or_default();

    manager.stop(&name).await?;
    audit("stop", &name, client, body.reason.as_deref(), None);
    Ok(HttpResponse::Accepted().json(json!({
        "message": format!("Stop command sent for '{}'.", name)
    })))
}

pub async fn run_rcon(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<RconBody>,
    manager: web::Data<ServerManager>,
    networks: web::Data<AdminNetworks>,
    limiter: web::Data<ActionLimiter>,
) -> Result<HttpResponse, ApiError> {
    let client = admit(&req, &networks, &limiter)?;
    let name = path.into_inner();
    let RconBody { command, reason } = body.into_inner();

    let response = manager.run_rcon(&name, &command).await?;
    audit("rcon", &name, client, reason.as_deref(), Some(&command));
    Ok(HttpResponse::Ok().json(json!({ "response": response })))
}

pub async fn refresh(
    req: HttpRequest,
    body: Option<web::Json<ActionBody>>,
    manager: web::Data<ServerManager>,
    networks: web::Data<AdminNetworks>,
    limiter: web::Data<ActionLimiter>,
) -> Result<HttpResponse, ApiError> {
    let client = admit(&req, &networks, &limiter)?;
    let body = body.map(web::Json::into_inner).unwrap_or_default();

    manager.force_refresh().await;
    audit("refresh", "all", client, body.reason.as_deref(), None);
    let snapshot = manager.snapshot();
    Ok(HttpResponse::Ok().json(json!({
        "online": snapshot.names_with_status(ServerStatus::Online),
        "offline": snapshot.names_with_status(ServerStatus::Offline),
    })))
}
