use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest};
use std::future::{ready, Ready};
use subtle::ConstantTimeEq;

use crate::config::Config;
use crate::errors::AppError;

pub const API_KEY_HEADER: &str = "X-API-Key";

/// Proof that the request carried the configured API key.
///
/// Take it as the first argument of a handler to protect that route:
///
/// ```ignore
/// #[get("/printers")]
/// async fn list(_auth: ApiKey, ...) -> AppResult<HttpResponse> { ... }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ApiKey;

impl ApiKey {
    pub fn check(req: &HttpRequest, expected: &str) -> Result<Self, AppError> {
        let presented = match req.headers().get(API_KEY_HEADER) {
            Some(value) if !value.is_empty() => value.as_bytes(),
            _ => return Err(AppError::MissingApiKey),
        };

        if bool::from(presented.ct_eq(expected.as_bytes())) {
            Ok(ApiKey)
        } else {
            Err(AppError::InvalidApiKey)
        }
    }
}

impl FromRequest for ApiKey {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let result = match req.app_data::<web::Data<Config>>() {
            Some(config) => Self::check(req, &config.auth.api_key),
            None => Err(AppError::Initialization(
                "Config missing from application data".to_string(),
            )),
        };

        if let Err(e) = &result {
            tracing::warn!("Rejected {} {}: {}", req.method(), req.path(), e);
        }

        ready(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_missing_header() {
        let req = TestRequest::default().to_http_request();
        assert!(matches!(
            ApiKey::check(&req, "secret"),
            Err(AppError::MissingApiKey)
        ));
    }

    #[test]
    fn test_empty_header_counts_as_missing() {
        let req = TestRequest::default()
            .insert_header((API_KEY_HEADER, ""))
            .to_http_request();
        assert!(matches!(
            ApiKey::check(&req, "secret"),
            Err(AppError::MissingApiKey)
        ));
    }

    #[test]
    fn test_wrong_key() {
        for presented in ["secreT", "secret2", "s"] {
            let req = TestRequest::default()
                .insert_header((API_KEY_HEADER, presented))
                .to_http_request();
            assert!(matches!(
                ApiKey::check(&req, "secret"),
                Err(AppError::InvalidApiKey)
            ));
        }
    }

    #[test]
    fn test_correct_key_case_insensitive_header_name() {
        let req = TestRequest::default()
            .insert_header(("x-api-key", "secret"))
            .to_http_request();
        assert!(ApiKey::check(&req, "secret").is_ok());
    }
}
