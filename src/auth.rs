// src/auth.rs
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{
    AddDaysRequest, AdminMessageRequest, AdminTokenQuery, SaveBookRequest, SaveMagazineRequest,
    SetSubscriptionRequest,
};
use actix_web::{HttpRequest, http::header, web};
use serde::de::DeserializeOwned;

pub const ADMIN_TOKEN_HEADER: &str = "X-Admin-Token";

// Token from the header, the `admin_token` query parameter, or the JSON body,
// in that order.
fn admin_token_from_request(req: &HttpRequest, body_token: Option<&str>) -> Option<String> {
    if let Some(value) = req
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        return Some(value.to_string());
    }

    if let Some(token) = web::Query::<AdminTokenQuery>::from_query(req.query_string())
        .ok()
        .and_then(|q| q.into_inner().admin_token)
    {
        return Some(token);
    }

    body_token.map(str::to_string)
}

/// Exact comparison with the configured shared secret. An empty secret
/// never matches.
pub fn require_admin(req: &HttpRequest, config: &Config, body_token: Option<&str>) -> AppResult<()> {
    if config.admin_secret_token.is_empty() {
        return Err(AppError::unauthorized());
    }
    match admin_token_from_request(req, body_token) {
        Some(token) if token == config.admin_secret_token => Ok(()),
        _ => Err(AppError::unauthorized()),
    }
}

/// Admin request bodies, which may carry the token themselves.
pub trait AdminBody: DeserializeOwned {
    fn admin_token(&self) -> Option<&str>;
}

macro_rules! admin_body {
    ($($ty:ty),* $(,)?) => {
        $(impl AdminBody for $ty {
            fn admin_token(&self) -> Option<&str> {
                self.admin_token.as_deref()
            }
        })*
    };
}

admin_body!(
    AddDaysRequest,
    SetSubscriptionRequest,
    AdminMessageRequest,
    SaveBookRequest,
    SaveMagazineRequest,
);

/// Decodes an admin JSON body, checking the token first. A malformed body
/// is a 400 only for an authorized caller; everyone else gets a 401.
pub fn admin_json<T: AdminBody>(req: &HttpRequest, config: &Config, body: &[u8]) -> AppResult<T> {
    match serde_json::from_slice::<T>(body) {
        Ok(parsed) => {
            require_admin(req, config, parsed.admin_token())?;
            Ok(parsed)
        }
        Err(e) => {
            let body_token = serde_json::from_slice::<AdminTokenQuery>(body)
                .ok()
                .and_then(|t| t.admin_token);
            require_admin(req, config, body_token.as_deref())?;
            Err(AppError::InvalidArgument(format!("Json deserialize error: {}", e)))
        }
    }
}

/// Checks the token from header or query, then decodes the query string.
pub fn admin_query<T: DeserializeOwned>(req: &HttpRequest, config: &Config) -> AppResult<T> {
    require_admin(req, config, None)?;
    web::Query::<T>::from_query(req.query_string())
        .map(web::Query::into_inner)
        .map_err(|e| AppError::InvalidArgument(e.to_string()))
}

pub fn require_cron(req: &HttpRequest, config: &Config) -> AppResult<()> {
    if config.cron_secret.is_empty() {
        return Err(AppError::unauthorized());
    }
    let expected = format!("Bearer {}", config.cron_secret);
    match req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        Some(value) if value == expected => Ok(()),
        _ => Err(AppError::unauthorized()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    fn config(admin: &str, cron: &str) -> Config {
        Config::from_pairs(vec![
            ("ADMIN_SECRET_TOKEN".to_string(), admin.to_string()),
            ("CRON_SECRET".to_string(), cron.to_string()),
        ])
        .unwrap()
    }

    #[test]
    fn admin_token_accepted_from_any_source() {
        let config = config("s3cret", "");

        let req = TestRequest::default()
            .insert_header((ADMIN_TOKEN_HEADER, "s3cret"))
            .to_http_request();
        assert!(require_admin(&req, &config, None).is_ok());

        let req = TestRequest::with_uri("/admin/users?admin_token=s3cret").to_http_request();
        assert!(require_admin(&req, &config, None).is_ok());

        let req = TestRequest::default().to_http_request();
        assert!(require_admin(&req, &config, Some("s3cret")).is_ok());
    }

    #[test]
    fn admin_token_must_match_exactly() {
        let config = config("s3cret", "");
        let req = TestRequest::default()
            .insert_header((ADMIN_TOKEN_HEADER, "S3CRET"))
            .to_http_request();
        assert!(matches!(
            require_admin(&req, &config, None),
            Err(AppError::Unauthorized(_))
        ));

        let req = TestRequest::default().to_http_request();
        assert!(require_admin(&req, &config, None).is_err());
    }

    #[test]
    fn header_takes_precedence_over_body() {
        let config = config("s3cret", "");
        let req = TestRequest::default()
            .insert_header((ADMIN_TOKEN_HEADER, "wrong"))
            .to_http_request();
        assert!(require_admin(&req, &config, Some("s3cret")).is_err());
    }

    #[test]
    fn empty_secrets_lock_everything() {
        let config = config("", "");
        let req = TestRequest::default()
            .insert_header((ADMIN_TOKEN_HEADER, ""))
            .insert_header((header::AUTHORIZATION, "Bearer "))
            .to_http_request();
        assert!(require_admin(&req, &config, Some("")).is_err());
        assert!(require_cron(&req, &config).is_err());
    }

    #[test]
    fn unauthorized_beats_malformed_body() {
        let config = config("s3cret", "");
        let anon = TestRequest::default().to_http_request();

        let err = admin_json::<AddDaysRequest>(&anon, &config, br#"{"user_id": "x"}"#).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        let err = admin_json::<AddDaysRequest>(&anon, &config, b"not json").unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        // A token in an otherwise invalid body still authorizes the caller.
        let body = br#"{"user_id": 1, "admin_token": "s3cret"}"#;
        let err = admin_json::<AddDaysRequest>(&anon, &config, body).unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));

        let body = br#"{"user_id": 1, "days": 3, "admin_token": "s3cret"}"#;
        let parsed = admin_json::<AddDaysRequest>(&anon, &config, body).unwrap();
        assert_eq!(parsed.days, 3);
    }

    #[test]
    fn admin_query_checks_token_before_parsing() {
        let config = config("s3cret", "");

        let req = TestRequest::with_uri("/admin/messages").to_http_request();
        let err = admin_query::<AdminTokenQuery>(&req, &config).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        let req = TestRequest::with_uri("/admin/messages?admin_token=s3cret").to_http_request();
        let parsed = admin_query::<AdminTokenQuery>(&req, &config).unwrap();
        assert_eq!(parsed.admin_token.as_deref(), Some("s3cret"));
    }

    #[test]
    fn cron_requires_bearer_secret() {
        let config = config("", "tick");
        let ok = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Bearer tick"))
            .to_http_request();
        assert!(require_cron(&ok, &config).is_ok());

        let bare = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "tick"))
            .to_http_request();
        assert!(require_cron(&bare, &config).is_err());
    }
}
