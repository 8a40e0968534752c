// API route configuration

use crate::api::handlers;
use actix_web::web;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Health check (no auth required)
        .route("/health", web::get().to(handlers::health_check))
        .route("/", web::get().to(handlers::health_check))
        // API v1 routes (all require authentication)
        .service(
            web::scope("/api/v1")
                // Price comparison
                .route(
                    "/lists/{id}/compare",
                    web::get().to(handlers::compare_list),
                )
                // Catalog search
                .route(
                    "/products/search",
                    web::get().to(handlers::search_products),
                )
                // Feed ingestion control
                .route("/feeds/import", web::post().to(handlers::import_feeds)),
        );
}
