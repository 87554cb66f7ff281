//! Comprobación de vida para el balanceador

use actix_web::{get, web, HttpResponse};
use serde_json::json;

#[get("/health")]
async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health);
}
