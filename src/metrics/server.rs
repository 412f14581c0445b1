use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::Arc;

/// Serve `/metrics` and `/health`. Runs until the server is stopped, so call
/// it from its own thread with an actix system.
pub async fn start_metrics_server(registry: Arc<Registry>, port: u16) -> std::io::Result<()> {
    tracing::info!(port, "📊 Starting metrics server on /metrics");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(registry.clone()))
            .configure(routes)
    })
    .workers(1)
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/metrics", web::get().to(scrape))
        .route("/health", web::get().to(health));
}

async fn scrape(registry: web::Data<Arc<Registry>>) -> impl Responder {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&registry.gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "service-orders",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
