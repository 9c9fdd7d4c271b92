// HTTP surface of the discovery service
pub mod matches;

use actix_web::web;

/// Versioned prefix shared by every endpoint
pub const API_PREFIX: &str = "/api/v1";

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope(API_PREFIX)
            .route("/health", web::get().to(matches::health_check))
            .service(web::scope("/matches").configure(matches::configure)),
    );
}
