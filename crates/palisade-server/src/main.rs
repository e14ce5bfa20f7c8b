//! Palisade API Gateway Server
//!
//! `actix-web` host binary that exercises `palisade-core`'s `GatewayModule`
//! against real HTTP traffic: a single catch-all service reads the request,
//! builds a framework-agnostic `RequestContext`, and hands it to the module.

mod http_adapter;
mod tenant_store;

use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use http_adapter::{ApiError, IntrospectionRouteRegistrar, ReqwestHttpTransport};
use log::{error, info};
use palisade_core::events::LoggingEventSink;
use palisade_core::gateway::GatewayModule;
use palisade_core::logs::logger::configure_logger;
use palisade_core::routing::dispatcher::RequestContext;
use std::sync::Arc;
use std::time::Duration;
use tenant_store::{load_global_config, load_tenant_overlays, FileTenantConfigStore};
use tokio::signal;

async fn proxy(
    req: HttpRequest,
    body: web::Bytes,
    module: web::Data<Arc<GatewayModule>>,
    tenant_header: web::Data<String>,
) -> Result<HttpResponse, ApiError> {
    let tenant_id = req
        .headers()
        .get(tenant_header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let headers = req
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let context = RequestContext {
        tenant_id: tenant_id.clone(),
        method: reqwest::Method::from_bytes(req.method().as_str().as_bytes())
            .unwrap_or(reqwest::Method::GET),
        path: req.uri().path().to_string(),
        headers,
        body: body.to_vec(),
        original_host: req
            .headers()
            .get("host")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string(),
    };

    let outcome = module.dispatch(tenant_id.as_deref(), context).await.map_err(ApiError::from)?;

    let mut response = HttpResponse::build(
        actix_web::http::StatusCode::from_u16(outcome.response.status)
            .unwrap_or(actix_web::http::StatusCode::OK),
    );
    for (name, value) in &outcome.response.headers {
        response.insert_header((name.clone(), value.clone()));
    }
    Ok(response.body(outcome.response.body))
}

async fn healthz() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

async fn admin_routes(router: web::Data<Arc<IntrospectionRouteRegistrar>>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "patterns": router.registered_patterns() }))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    configure_logger();

    let global = load_global_config().unwrap_or_else(|e| {
        error!("failed to load configuration: {}", e);
        std::process::exit(1);
    });
    let tenant_id_header = global.tenant_id_header.clone();

    let overlays_dir =
        std::env::var("PALISADE_TENANT_OVERLAYS_DIR").unwrap_or_else(|_| "./tenants".to_string());
    let overlays = load_tenant_overlays(&overlays_dir);
    info!("loaded {} tenant overlay(s) from {}", overlays.len(), overlays_dir);

    let store = Arc::new(FileTenantConfigStore::new(global, overlays));
    let sink = Arc::new(LoggingEventSink);
    let transport = Arc::new(ReqwestHttpTransport::new(Duration::from_secs(30), 32));
    let module = Arc::new(GatewayModule::new_with_transport(store, transport, Some(sink)));

    let router = Arc::new(IntrospectionRouteRegistrar::default());
    module.set_router(router.clone()).await;

    module.start().await.unwrap_or_else(|e| {
        error!("failed to start gateway module: {}", e);
        std::process::exit(1);
    });
    info!("gateway module started");

    let host = std::env::var("PALISADE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("PALISADE_PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse::<u16>()
        .unwrap_or(8080);

    info!("starting server on {}:{}", host, port);

    let module_data = module.clone();
    let router_data = router.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(module_data.clone()))
            .app_data(web::Data::new(router_data.clone()))
            .app_data(web::Data::new(tenant_id_header.clone()))
            .wrap(actix_web::middleware::Logger::default())
            .wrap(actix_web::middleware::Compress::default())
            .route("/healthz", web::get().to(healthz))
            .route("/admin/routes", web::get().to(admin_routes))
            .default_service(web::route().to(proxy))
    })
    .bind((host.as_str(), port))?
    .run();

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!("server error: {}", e);
            }
        }
        _ = signal::ctrl_c() => {
            info!("received shutdown signal, stopping gateway module...");
        }
    }

    module.stop().await;
    info!("gateway module stopped");
    Ok(())
}
