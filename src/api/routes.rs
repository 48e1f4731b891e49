use actix_web::{web, HttpResponse, Responder};
use serde_json::json;

use crate::api::handlers::capture::{get_capture_status, list_interfaces, start_capture};

/// Root endpoint to provide information about the API
async fn index() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "name": "wirestream",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Live TCP/UDP capture streamed as server-sent events",
        "endpoints": [
            {
                "path": "/api/interfaces",
                "method": "GET",
                "description": "List available network interfaces"
            },
            {
                "path": "/api/capture",
                "method": "GET",
                "description": "Capture on ?i=<interface> with optional tcp, udp, h, h.src, h.dst, p, p.src, p.dst filters; replaces any running capture"
            },
            {
                "path": "/api/capture/status",
                "method": "GET",
                "description": "Get the running capture session, if any"
            }
        ]
    }))
}

/// Configure API routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index)).service(
        web::scope("/api")
            .route("/interfaces", web::get().to(list_interfaces))
            .service(
                web::scope("/capture")
                    .route("", web::get().to(start_capture))
                    .route("/status", web::get().to(get_capture_status)),
            ),
    );
}
