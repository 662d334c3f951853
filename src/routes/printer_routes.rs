use actix_multipart::Multipart;
use actix_web::{get, post, web, HttpRequest, HttpResponse};
use std::sync::Arc;
use tracing::{error, info};

use crate::auth::ApiKey;
use crate::config::Config;
use crate::errors::{AppError, AppResult};
use crate::printers::{self, Spooler};
use crate::upload;

/// Receives an image as multipart field `image` (plus optional `copies`)
/// and hands it to the spooler.
#[post("/print")]
pub async fn print_image(
    _auth: ApiKey,
    req: HttpRequest,
    payload: Multipart,
    config: web::Data<Config>,
    spooler: web::Data<Arc<dyn Spooler>>,
) -> AppResult<HttpResponse> {
    let form =
        upload::read_print_form(&req, payload, &config.upload, config.printer.max_copies).await?;
    info!(
        "Print request received: {} bytes, {} copies",
        form.upload.len(),
        form.copies
    );

    let result = printers::print_image(
        &config.printer,
        spooler.get_ref().as_ref(),
        form.upload.path(),
        form.copies,
    )
    .await;

    form.upload.cleanup();

    match result {
        Ok(receipt) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": receipt.message(),
            "job_id": receipt.job_id,
            "copies": form.copies
        }))),
        Err(e) => {
            error!("Print job failed: {}", e);
            Err(AppError::PrintFailed(e))
        }
    }
}

#[get("/printers")]
pub async fn list_printers(
    _auth: ApiKey,
    config: web::Data<Config>,
    spooler: web::Data<Arc<dyn Spooler>>,
) -> AppResult<HttpResponse> {
    let directory = printers::list_printers(&config.printer, spooler.get_ref().as_ref())
        .await
        .map_err(|e| {
            error!("Printer listing failed: {}", e);
            AppError::Spooler(e)
        })?;

    Ok(HttpResponse::Ok().json(directory))
}
