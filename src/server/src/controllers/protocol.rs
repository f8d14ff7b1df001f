//! GET `/protocol-version` — the handshake every client opens with
//! (spec.md §6.2).

use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn protocol_version() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "version": 2 }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/protocol-version", web::get().to(protocol_version));
}
