// src/handlers/index.rs
use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::manager::ServerManager;

pub async fn index(manager: web::Data<ServerManager>) -> HttpResponse {
    let snapshot = manager.snapshot();
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "servers": snapshot.len(),
        "last_scan": snapshot.scanned_at(),
    }))
}
