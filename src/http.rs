use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer, Responder};
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::lifecycle::OrderService;
use crate::models::{AuthContext, CreateOrderRequest, UpdateOrderRequest};

// ============================================================================
// HTTP Surface
// ============================================================================
//
// Thin handlers over the OrderService plus the metrics scrape endpoint.
// Authentication itself lives in the upstream gateway; handlers only lift
// the forwarded bearer token into an AuthContext so the catalog call can
// re-forward it.
//
// ============================================================================

pub async fn start_http_server(
    service: Arc<OrderService>,
    registry: Arc<Registry>,
    port: u16,
) -> std::io::Result<()> {
    tracing::info!(port = port, "HTTP server listening");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(service.clone()))
            .app_data(web::Data::new(registry.clone()))
            .route("/api/orders", web::post().to(create_order))
            .route("/api/orders", web::get().to(list_orders))
            .route("/api/orders/{id}", web::get().to(get_order))
            .route("/api/orders/{id}", web::put().to(update_order))
            .route("/api/orders/{id}", web::delete().to(delete_order))
            .route("/metrics", web::get().to(metrics_handler))
            .route("/health", web::get().to(health_handler))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

fn auth_from_request(request: &HttpRequest) -> AuthContext {
    let bearer = request
        .headers()
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match bearer {
        Some(token) => AuthContext::with_bearer(token),
        None => AuthContext::anonymous(),
    }
}

/// Keep the error taxonomy visible at the edge: validation, not-found and
/// infrastructure failures each map to their own status code.
fn error_response(err: ServiceError) -> HttpResponse {
    match &err {
        ServiceError::Validation(message) => {
            HttpResponse::BadRequest().json(serde_json::json!({ "error": message }))
        }
        ServiceError::NotFound(_) => {
            HttpResponse::NotFound().json(serde_json::json!({ "error": err.to_string() }))
        }
        ServiceError::Store(_) => {
            tracing::error!(error = %err, "Request failed on infrastructure");
            HttpResponse::InternalServerError()
                .json(serde_json::json!({ "error": "internal error" }))
        }
    }
}

async fn create_order(
    service: web::Data<Arc<OrderService>>,
    body: web::Json<CreateOrderRequest>,
) -> HttpResponse {
    match service.create_order(body.into_inner()).await {
        Ok(order) => HttpResponse::Created().json(order),
        Err(err) => error_response(err),
    }
}

async fn list_orders(service: web::Data<Arc<OrderService>>, request: HttpRequest) -> HttpResponse {
    let auth = auth_from_request(&request);
    match service.list_orders(&auth).await {
        Ok(orders) => HttpResponse::Ok().json(orders),
        Err(err) => error_response(err),
    }
}

async fn get_order(
    service: web::Data<Arc<OrderService>>,
    path: web::Path<Uuid>,
    request: HttpRequest,
) -> HttpResponse {
    let auth = auth_from_request(&request);
    match service.get_order(path.into_inner(), &auth).await {
        Ok(order) => HttpResponse::Ok().json(order),
        Err(err) => error_response(err),
    }
}

async fn update_order(
    service: web::Data<Arc<OrderService>>,
    path: web::Path<Uuid>,
    body: web::Json<UpdateOrderRequest>,
) -> HttpResponse {
    match service.update_order(path.into_inner(), body.into_inner()).await {
        Ok(order) => HttpResponse::Ok().json(order),
        Err(err) => error_response(err),
    }
}

async fn delete_order(service: web::Data<Arc<OrderService>>, path: web::Path<Uuid>) -> HttpResponse {
    match service.delete_order(path.into_inner()).await {
        Ok(order) => HttpResponse::Ok().json(order),
        Err(err) => error_response(err),
    }
}

async fn metrics_handler(registry: web::Data<Arc<Registry>>) -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %err, "Failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

async fn health_handler() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "order-reconciler"
    }))
}
