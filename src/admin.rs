// src/admin.rs
use crate::auth;
use crate::chat;
use crate::config::Config;
use crate::content::ContentCache;
use crate::db::Db;
use crate::error::{AppError, AppResult};
use crate::ledger;
use crate::models::{
    AddDaysRequest, AdminMessageRequest, ConversationQuery, SaveBookRequest, SaveMagazineRequest,
    SetSubscriptionRequest,
};
use crate::sweep;
use crate::telegram::TelegramClient;
use actix_web::{HttpRequest, HttpResponse, get, post, web};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(list_users);
    cfg.service(add_days);
    cfg.service(set_subscription);
    cfg.service(conversation);
    cfg.service(send_message);
    cfg.service(save_book);
    cfg.service(save_magazine);
    cfg.service(cron);
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates (midnight UTC).
fn parse_end_date(raw: Option<&str>) -> AppResult<Option<DateTime<Utc>>> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Some(naive.and_utc()))
        .ok_or_else(|| AppError::invalid(format!("Invalid end_date: {}", raw)))
}

#[get("/admin/users")]
pub async fn list_users(
    db: web::Data<Db>,
    config: web::Data<Config>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    auth::require_admin(&req, &config, None)?;
    let users = ledger::list_users(&db, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(json!({ "users": users })))
}

#[post("/admin/add-days")]
pub async fn add_days(
    db: web::Data<Db>,
    config: web::Data<Config>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let body: AddDaysRequest = auth::admin_json(&req, &config, &body)?;
    let sub = ledger::add_days(&db, body.user_id, body.days, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "new_end_date": sub.end_at,
    })))
}

#[post("/admin/set-subscription")]
pub async fn set_subscription(
    db: web::Data<Db>,
    config: web::Data<Config>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let body: SetSubscriptionRequest = auth::admin_json(&req, &config, &body)?;
    let end = parse_end_date(body.end_date.as_deref())?;
    let sub = ledger::set_subscription(&db, body.user_id, body.status, end, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "status": sub.status,
        "subscription_end": sub.end_at,
    })))
}

#[get("/admin/messages")]
pub async fn conversation(
    db: web::Data<Db>,
    config: web::Data<Config>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let query: ConversationQuery = auth::admin_query(&req, &config)?;
    let messages = chat::conversation(&db, query.user_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "messages": messages })))
}

#[post("/admin/send-message")]
pub async fn send_message(
    db: web::Data<Db>,
    config: web::Data<Config>,
    telegram: web::Data<TelegramClient>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let body: AdminMessageRequest = auth::admin_json(&req, &config, &body)?;
    let message =
        chat::send_admin_message(&db, &telegram, body.user_id, &body.text, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "message": message })))
}

#[post("/admin/book-of-month")]
pub async fn save_book(
    db: web::Data<Db>,
    config: web::Data<Config>,
    content: web::Data<ContentCache>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let body: SaveBookRequest = auth::admin_json(&req, &config, &body)?;
    let book = content.save_book(&db, body, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "book": book })))
}

#[post("/admin/magazine")]
pub async fn save_magazine(
    db: web::Data<Db>,
    config: web::Data<Config>,
    content: web::Data<ContentCache>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let body: SaveMagazineRequest = auth::admin_json(&req, &config, &body)?;
    let magazine = content.save_magazine(&db, body, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "magazine": magazine })))
}

#[post("/cron")]
pub async fn cron(
    db: web::Data<Db>,
    config: web::Data<Config>,
    telegram: web::Data<TelegramClient>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    auth::require_cron(&req, &config)?;
    let report = sweep::run(&db, telegram.get_ref(), Utc::now()).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Channel access updated",
        "granted": report.granted,
        "revoked": report.revoked,
        "failed": report.failed,
        "total": report.total,
    })))
}
