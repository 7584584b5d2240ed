use crate::db;
use actix_web::{get, web, HttpResponse, Responder};
use sea_orm::DatabaseConnection;
use serde_json::json;

pub(super) fn configure(conf: &mut web::ServiceConfig) {
    conf.service(view_index).service(view_health);
}

#[get("/")]
async fn view_index() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "message": "Survey Platform API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Liveness plus a database round trip.
#[get("/health")]
async fn view_health(db: web::Data<DatabaseConnection>) -> impl Responder {
    match db::ping(&db).await {
        Ok(()) => HttpResponse::Ok().json(json!({
            "status": "healthy",
            "database": "connected",
        })),
        Err(e) => {
            log::error!("Health check failed: {}", e);
            HttpResponse::ServiceUnavailable().json(json!({
                "status": "unhealthy",
                "database": "unreachable",
            }))
        }
    }
}
