use actix_web::web;

pub mod ai_query;
pub mod health;

/// Mounts the API under `api_prefix` (e.g. `/api`).
pub fn configure(api_prefix: String) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        cfg.service(
            web::scope(&api_prefix)
                .route("/ai-query", web::post().to(ai_query::handle))
                .route("/health", web::get().to(health::handle)),
        );
    }
}
