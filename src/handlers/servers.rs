// src/handlers/servers.rs
use actix_web::{web, HttpRequest, HttpResponse};
use log::debug;
use serde_json::json;

use crate::error::FleetError;
use crate::manager::ServerManager;
use crate::utils::{check_rate, extract_client_ip, AdminNetworks, ApiError, ReadLimiter};

fn admit(
    req: &HttpRequest,
    networks: &AdminNetworks,
    limiter: &ReadLimiter,
) -> Result<(), ApiError> {
    let ip = extract_client_ip(req, networks)?;
    check_rate(&limiter.0, ip, "server list")?;
    Ok(())
}

pub async fn list_servers(
    req: HttpRequest,
    manager: web::Data<ServerManager>,
    networks: web::Data<AdminNetworks>,
    limiter: web::Data<ReadLimiter>,
) -> Result<HttpResponse, ApiError> {
    admit(&req, &networks, &limiter)?;
    let servers = manager.list();
    debug!("Building server list response with {} servers", servers.len());
    Ok(HttpResponse::Ok().json(servers))
}

pub async fn online_servers(
    req: HttpRequest,
    manager: web::Data<ServerManager>,
    networks: web::Data<AdminNetworks>,
    limiter: web::Data<ReadLimiter>,
) -> Result<HttpResponse, ApiError> {
    admit(&req, &networks, &limiter)?;
    Ok(HttpResponse::Ok().json(manager.online()))
}

pub async fn offline_servers(
    req: HttpRequest,
    manager: web::Data<ServerManager>,
    networks: web::Data<AdminNetworks>,
    limiter: web::Data<ReadLimiter>,
) -> Result<HttpResponse, ApiError> {
    admit(&req, &networks, &limiter)?;
    Ok(HttpResponse::Ok().json(manager.offline()))
}

pub async fn rcon_servers(
    req: HttpRequest,
    manager: web::Data<ServerManager>,
    networks: web::Data<AdminNetworks>,
    limiter: web::Data<ReadLimiter>,
) -> Result<HttpResponse, ApiError> {
    admit(&req, &networks, &limiter)?;
    Ok(HttpResponse::Ok().json(manager.rcon_capable()))
}

pub async fn get_server(
    req: HttpRequest,
    path: web::Path<String>,
    manager: web::Data<ServerManager>,
    networks: web::Data<AdminNetworks>,
    limiter: web::Data<ReadLimiter>,
) -> Result<HttpResponse, ApiError> {
    admit(&req, &networks, &limiter)?;
    let name = path.into_inner();
    let info = manager.server(&name).ok_or(FleetError::NotFound(name))?;
    Ok(HttpResponse::Ok().json(info))
}

pub async fn scan_failures(
    req: HttpRequest,
    manager: web::Data<ServerManager>,
    networks: web::Data<AdminNetworks>,
    limiter: web::Data<ReadLimiter>,
) -> Result<HttpResponse, ApiError> {
    admit(&req, &networks, &limiter)?;
    let failures: Vec<_> = manager
        .scan_failures()
        .into_iter()
        .map(|(name, streak)| json!({ "name": name, "consecutive_failures": streak }))
        .collect();
    Ok(HttpResponse::Ok().json(failures))
}
