// HTTP request handlers for API endpoints

use crate::api::models::*;
use crate::catalog::db::Db;
use crate::catalog::search;
use crate::compare::{self, PgListSource};
use crate::feed;
use crate::util::env as env_util;
use actix_web::{web, HttpResponse, Result};
use std::path::PathBuf;
use std::time::SystemTime;

/// Health check endpoint
pub async fn health_check(db: web::Data<Db>) -> Result<HttpResponse> {
    // Quick database connectivity check
    let db_status = match sqlx::query_scalar::<_, bool>("SELECT true")
        .fetch_one(&db.pool)
        .await
    {
        Ok(_) => "connected",
        Err(_) => "disconnected",
    };

    let uptime = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let response = ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        database: db_status.to_string(),
        uptime_seconds: uptime,
    });

    Ok(HttpResponse::Ok().json(response))
}

/// Compare a shopping list across chains.
/// List ownership/authorization is checked by the external list service
/// before requests reach this surface.
pub async fn compare_list(path: web::Path<i64>, db: web::Data<Db>) -> Result<HttpResponse> {
    let list_id = path.into_inner();
    let source = PgListSource::new(db.get_ref().clone());

    match compare::compare_list(db.get_ref(), &source, list_id).await {
        Ok(result) => Ok(HttpResponse::Ok().json(ApiResponse::success(result))),
        Err(e) => {
            tracing::error!(error = %e, list_id, "comparison failed");
            // never return a partial comparison
            Ok(HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Error comparing prices")))
        }
    }
}

/// Search catalog products by name
pub async fn search_products(
    query: web::Query<SearchQuery>,
    db: web::Data<Db>,
) -> Result<HttpResponse> {
    let limit = query.limit.unwrap_or(15).clamp(1, 50);
    match search::search_products(db.get_ref(), &query.q, limit).await {
        Ok(hits) => Ok(HttpResponse::Ok().json(ApiResponse::success(hits))),
        Err(e) => {
            tracing::error!(error = %e, q = %query.q, "product search failed");
            Ok(HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Search error")))
        }
    }
}

/// Operator endpoint: run one scheduler pass over FEEDS_DIR.
pub async fn import_feeds(db: web::Data<Db>) -> Result<HttpResponse> {
    let root = match env_util::feeds_dir() {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            return Ok(HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(e.to_string())));
        }
    };

    match feed::run_feed_scan(db.get_ref(), &root).await {
        Ok(summary) => Ok(HttpResponse::Ok().json(ApiResponse::success(summary))),
        Err(e) => {
            tracing::error!(error = %e, "feed scan failed");
            Ok(HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Feed import failed")))
        }
    }
}
