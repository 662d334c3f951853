// Route modules organization

pub mod base_routes;
pub mod printer_routes;

use actix_web::web;

// Re-export all routes for convenience
pub use base_routes::*;
pub use printer_routes::*;

/// Mounts every gateway route.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health_check)
        .service(print_image)
        .service(list_printers);
}
