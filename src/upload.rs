// Multipart upload handling for print submissions.

use actix_multipart::{Field, Multipart};
use actix_web::{http::header, HttpMessage, HttpRequest};
use bytes::BytesMut;
use futures::StreamExt;
use std::io::Write;
use std::num::IntErrorKind;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::config::UploadConfig;
use crate::errors::{AppError, AppResult};

pub const ALLOWED_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "gif", "bmp", "webp"];

const IMAGE_FIELD: &str = "image";
const COPIES_FIELD: &str = "copies";

// Longest `copies` value still read in full. Padded values such as
// "0003" must parse as 3, so the cap sits well above any real count.
const MAX_TEXT_FIELD_BYTES: usize = 4300;

/// Lowercased extension of `filename` if it is on the allow-list.
pub fn allowed_extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Effective copy count: unparsable input becomes 1, then the value is
/// clamped to `[1, max_copies]`.
pub fn parse_copies(raw: Option<&str>, max_copies: u32) -> u32 {
    let max = i64::from(max_copies.max(1));
    let requested = match raw.map(|r| r.trim().parse::<i64>()) {
        None => 1,
        Some(Ok(n)) => n,
        Some(Err(e)) if *e.kind() == IntErrorKind::PosOverflow => max,
        Some(Err(_)) => 1,
    };

    // Both bounds fit in u32.
    requested.clamp(1, max) as u32
}

/// An uploaded image on disk. Removed by `cleanup`, or by `Drop` if the
/// request bails out before that.
#[derive(Debug)]
pub struct TempUpload {
    file: NamedTempFile,
    len: u64,
}

impl TempUpload {
    pub fn create(dir: &Path, extension: &str) -> AppResult<Self> {
        let file = tempfile::Builder::new()
            .prefix("print-")
            .suffix(&format!(".{}", extension))
            .tempfile_in(dir)?;
        Ok(Self { file, len: 0 })
    }

    pub fn write_chunk(&mut self, chunk: &[u8]) -> AppResult<()> {
        self.file.as_file_mut().write_all(chunk)?;
        self.len += chunk.len() as u64;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Removes the file. Failures are logged and otherwise ignored.
    pub fn cleanup(self) {
        let path = self.file.path().to_path_buf();
        match self.file.close() {
            Ok(()) => debug!("Removed temporary upload {:?}", path),
            Err(e) => warn!("Failed to remove temporary upload {:?}: {}", path, e),
        }
    }
}

/// A validated `/print` form.
#[derive(Debug)]
pub struct PrintForm {
    pub upload: TempUpload,
    pub copies: u32,
}

/// Reads and validates the `/print` multipart body. The image is streamed
/// straight to disk; nothing reaches the spooler unless this returns `Ok`.
pub async fn read_print_form(
    req: &HttpRequest,
    mut payload: Multipart,
    config: &UploadConfig,
    max_copies: u32,
) -> AppResult<PrintForm> {
    if !req.content_type().eq_ignore_ascii_case("multipart/form-data") {
        return Err(AppError::MissingImage);
    }

    if let Some(declared) = content_length(req) {
        if declared > config.max_bytes {
            return Err(AppError::PayloadTooLarge {
                limit: config.max_bytes,
            });
        }
    }

    let mut upload: Option<TempUpload> = None;
    let mut copies_raw: Option<String> = None;

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| AppError::MalformedUpload(e.to_string()))?;

        let name = field.name().map(str::to_string);
        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);

        match (name.as_deref(), filename) {
            (Some(IMAGE_FIELD), Some(filename)) if upload.is_none() => {
                if filename.is_empty() {
                    return Err(AppError::EmptyFilename);
                }
                let extension = allowed_extension(&filename).ok_or(AppError::DisallowedExtension)?;

                let mut temp = TempUpload::create(&config.dir, &extension)?;
                save_field(&mut field, &mut temp, config.max_bytes).await?;
                debug!(
                    "Saved upload '{}' ({} bytes) to {:?}",
                    filename,
                    temp.len(),
                    temp.path()
                );
                upload = Some(temp);
            }
            (Some(COPIES_FIELD), None) if copies_raw.is_none() => {
                // An oversized value counts as unparsable and falls back to 1.
                copies_raw = Some(
                    read_text_field(&mut field, MAX_TEXT_FIELD_BYTES)
                        .await?
                        .unwrap_or_default(),
                );
            }
            _ => {
                // Unknown or repeated parts are drained and ignored.
                while let Some(chunk) = field.next().await {
                    chunk.map_err(|e| AppError::MalformedUpload(e.to_string()))?;
                }
            }
        }
    }

    let upload = upload.ok_or(AppError::MissingImage)?;
    let copies = parse_copies(copies_raw.as_deref(), max_copies);

    Ok(PrintForm { upload, copies })
}

fn content_length(req: &HttpRequest) -> Option<usize> {
    req.headers()
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

async fn save_field(field: &mut Field, temp: &mut TempUpload, limit: usize) -> AppResult<()> {
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| AppError::MalformedUpload(e.to_string()))?;
        if temp.len() + chunk.len() as u64 > limit as u64 {
            return Err(AppError::PayloadTooLarge { limit });
        }
        temp.write_chunk(&chunk)?;
    }

    temp.file.as_file_mut().flush()?;
    Ok(())
}

/// Reads a small text field whole. `None` when it exceeds `limit` bytes;
/// the rest of the field is still drained.
async fn read_text_field(field: &mut Field, limit: usize) -> AppResult<Option<String>> {
    let mut buf = BytesMut::new();
    let mut oversized = false;
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| AppError::MalformedUpload(e.to_string()))?;
        if oversized || buf.len() + chunk.len() > limit {
            oversized = true;
            continue;
        }
        buf.extend_from_slice(&chunk);
    }

    if oversized {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}
