use actix_web::{get, web, HttpResponse, Responder};
use std::sync::Arc;

use crate::config::Config;
use crate::printers::{resolve_printer, Spooler};

/// Liveness probe. Deliberately unauthenticated so monitors can poll it.
#[get("/health")]
pub async fn health_check(
    config: web::Data<Config>,
    spooler: web::Data<Arc<dyn Spooler>>,
) -> impl Responder {
    let printer = resolve_printer(&config.printer, spooler.get_ref().as_ref()).await;

    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "printer_configured": printer.is_some(),
        "printer": printer
    }))
}
