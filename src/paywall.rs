// src/paywall.rs
use crate::access;
use crate::chat;
use crate::config::Config;
use crate::content::ContentCache;
use crate::db::Db;
use crate::error::AppError;
use crate::ledger;
use crate::models::{
    BookPeriodQuery, CancelRequest, ConfirmPaymentRequest, CreatePaymentRequest, UserMessageRequest,
    UserQuery,
};
use crate::payment::{self, ConfirmOutcome};
use crate::telegram::TelegramClient;
use actix_web::{HttpResponse, get, post, routes, web};
use chrono::Utc;
use serde_json::json;

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health);
    cfg.service(subscription_status);
    cfg.service(create_payment);
    cfg.service(confirm_payment);
    cfg.service(reading_room_access);
    cfg.service(cancel_subscription);
    cfg.service(book_of_month);
    cfg.service(latest_magazine);
    cfg.service(post_message);
}

// The empty path answers the bare `/api` scope prefix.
#[routes]
#[get("")]
#[get("/")]
#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "timestamp": Utc::now(),
        "service": "Bookflix API",
    }))
}

#[get("/subscription-status")]
pub async fn subscription_status(
    db: web::Data<Db>,
    query: web::Query<UserQuery>,
) -> Result<HttpResponse, AppError> {
    let view = ledger::get_status(&db, query.user_id, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(view))
}

#[post("/create-payment")]
pub async fn create_payment(
    db: web::Data<Db>,
    config: web::Data<Config>,
    req: web::Json<CreatePaymentRequest>,
) -> Result<HttpResponse, AppError> {
    let intent = payment::create(
        &db,
        &config.webapp_url,
        req.user_id,
        req.amount,
        req.days,
        Utc::now(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(intent))
}

#[post("/confirm-payment")]
pub async fn confirm_payment(
    db: web::Data<Db>,
    req: web::Json<ConfirmPaymentRequest>,
) -> Result<HttpResponse, AppError> {
    if req.payment_id.trim().is_empty() {
        return Err(AppError::invalid("Missing payment_id"));
    }

    let body = match payment::confirm(&db, &req.payment_id, req.user_id, Utc::now()).await? {
        ConfirmOutcome::Activated(sub) => json!({
            "status": "success",
            "message": "Payment confirmed and subscription activated",
            "subscription_end": sub.end_at,
        }),
        ConfirmOutcome::AlreadyConfirmed => json!({
            "status": "success",
            "message": "Payment already confirmed",
        }),
        ConfirmOutcome::Failed => json!({
            "status": "failed",
            "message": "Payment failed",
        }),
    };
    Ok(HttpResponse::Ok().json(body))
}

#[get("/reading-room-access")]
pub async fn reading_room_access(
    db: web::Data<Db>,
    telegram: web::Data<TelegramClient>,
    query: web::Query<UserQuery>,
) -> Result<HttpResponse, AppError> {
    if !access::has_active_access(&db, query.user_id, Utc::now()).await? {
        return Ok(HttpResponse::Ok().json(json!({
            "has_access": false,
            "message": "Subscription expired",
        })));
    }

    let channel_link = telegram
        .channel_link()
        .await
        .unwrap_or_else(|| "#".to_string());
    Ok(HttpResponse::Ok().json(json!({
        "has_access": true,
        "channel_link": channel_link,
    })))
}

#[post("/cancel-subscription")]
pub async fn cancel_subscription(
    db: web::Data<Db>,
    req: web::Json<CancelRequest>,
) -> Result<HttpResponse, AppError> {
    ledger::cancel(&db, req.user_id, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Subscription cancelled",
    })))
}

#[get("/book-of-month")]
pub async fn book_of_month(
    db: web::Data<Db>,
    content: web::Data<ContentCache>,
    query: web::Query<BookPeriodQuery>,
) -> Result<HttpResponse, AppError> {
    let period = match (query.month, query.year) {
        (Some(month), Some(year)) => Some((month, year)),
        (None, None) => None,
        _ => return Err(AppError::invalid("month and year must be given together")),
    };
    let book = content.book_of_month(&db, period).await?;
    Ok(HttpResponse::Ok().json(book))
}

#[get("/magazine/latest")]
pub async fn latest_magazine(
    db: web::Data<Db>,
    content: web::Data<ContentCache>,
) -> Result<HttpResponse, AppError> {
    let magazine = content.latest_magazine(&db).await?;
    Ok(HttpResponse::Ok().json(magazine))
}

#[post("/messages")]
pub async fn post_message(
    db: web::Data<Db>,
    req: web::Json<UserMessageRequest>,
) -> Result<HttpResponse, AppError> {
    let message = chat::post_user_message(&db, req.user_id, &req.text, Utc::now()).await?;
    Ok(HttpResponse::Created().json(message))
}

#[cfg(test)]
mod tests {
    use crate::test_support::{TestApp, read_json};
    use actix_web::http::StatusCode;
    use actix_web::test;
    use serde_json::{Value, json};

    #[actix_web::test]
    async fn health_responds_on_both_mounts() {
        let app = TestApp::new().await;
        let srv = test::init_service(app.app()).await;

        for uri in ["/", "/health", "/api", "/api/", "/api/health"] {
            let resp = test::call_service(&srv, test::TestRequest::get().uri(uri).to_request()).await;
            assert_eq!(resp.status(), StatusCode::OK, "{}", uri);
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["status"], json!("ok"));
        }
    }

    #[actix_web::test]
    async fn unknown_user_status_is_inactive() {
        let app = TestApp::new().await;
        let srv = test::init_service(app.app()).await;

        let req = test::TestRequest::get()
            .uri("/api/subscription-status?user_id=1001")
            .to_request();
        let body: Value = test::call_and_read_body_json(&srv, req).await;
        assert_eq!(body["status"], json!("inactive"));
        assert_eq!(body["days_remaining"], json!(0));
        assert_eq!(body["history"], json!([]));
    }

    #[actix_web::test]
    async fn missing_user_id_is_bad_request() {
        let app = TestApp::new().await;
        let srv = test::init_service(app.app()).await;

        let req = test::TestRequest::get().uri("/subscription-status").to_request();
        let resp = test::call_service(&srv, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = read_json(resp).await;
        assert!(body["error"].is_string());

        let req = test::TestRequest::post()
            .uri("/create-payment")
            .set_json(json!({ "user_id": 42, "days": 30 }))
            .to_request();
        let resp = test::call_service(&srv, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn payment_scenario_credits_once() {
        let app = TestApp::new().await;
        let srv = test::init_service(app.app()).await;

        let req = test::TestRequest::post()
            .uri("/api/create-payment")
            .set_json(json!({ "user_id": 42, "days": 30, "amount": 299 }))
            .to_request();
        let created: Value = test::call_and_read_body_json(&srv, req).await;
        let payment_id = created["payment_id"].as_str().unwrap().to_string();
        assert_eq!(created["days"], json!(30));
        assert_eq!(created["status"], json!("pending"));

        let confirm = || {
            test::TestRequest::post()
                .uri("/api/confirm-payment")
                .set_json(json!({ "payment_id": payment_id, "user_id": 42 }))
                .to_request()
        };

        let first: Value = test::call_and_read_body_json(&srv, confirm()).await;
        assert_eq!(first["status"], json!("success"));
        assert_eq!(first["message"], json!("Payment confirmed and subscription activated"));

        let req = test::TestRequest::get()
            .uri("/api/subscription-status?user_id=42")
            .to_request();
        let status: Value = test::call_and_read_body_json(&srv, req).await;
        assert_eq!(status["status"], json!("active"));
        assert_eq!(status["days_remaining"], json!(30));
        let end_after_first = status["subscription_end"].clone();

        let second: Value = test::call_and_read_body_json(&srv, confirm()).await;
        assert_eq!(second["status"], json!("success"));
        assert_eq!(second["message"], json!("Payment already confirmed"));

        let req = test::TestRequest::get()
            .uri("/api/subscription-status?user_id=42")
            .to_request();
        let status: Value = test::call_and_read_body_json(&srv, req).await;
        assert_eq!(status["subscription_end"], end_after_first);
        assert_eq!(status["history"].as_array().unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn confirm_unknown_payment_is_404() {
        let app = TestApp::new().await;
        let srv = test::init_service(app.app()).await;

        let req = test::TestRequest::post()
            .uri("/confirm-payment")
            .set_json(json!({ "payment_id": "payment_1_nope", "user_id": 1 }))
            .to_request();
        let resp = test::call_service(&srv, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(read_json(resp).await, json!({ "error": "Payment not found" }));
    }

    #[actix_web::test]
    async fn reading_room_follows_gate() {
        let app = TestApp::new().await;
        let srv = test::init_service(app.app()).await;

        let req = test::TestRequest::get()
            .uri("/reading-room-access?user_id=5")
            .to_request();
        let denied: Value = test::call_and_read_body_json(&srv, req).await;
        assert_eq!(denied["has_access"], json!(false));

        app.activate(5, 30).await;

        let req = test::TestRequest::get()
            .uri("/reading-room-access?user_id=5")
            .to_request();
        let granted: Value = test::call_and_read_body_json(&srv, req).await;
        assert_eq!(granted["has_access"], json!(true));
        assert_eq!(granted["channel_link"], json!("https://t.me/+reading-room"));

        let req = test::TestRequest::post()
            .uri("/cancel-subscription")
            .set_json(json!({ "user_id": 5 }))
            .to_request();
        let cancelled: Value = test::call_and_read_body_json(&srv, req).await;
        assert_eq!(cancelled["success"], json!(true));

        let req = test::TestRequest::get()
            .uri("/reading-room-access?user_id=5")
            .to_request();
        let denied: Value = test::call_and_read_body_json(&srv, req).await;
        assert_eq!(denied["has_access"], json!(false));
        assert_eq!(denied["message"], json!("Subscription expired"));
    }

    #[actix_web::test]
    async fn content_reads_are_public() {
        let app = TestApp::new().await;
        let srv = test::init_service(app.app()).await;

        let req = test::TestRequest::get().uri("/api/book-of-month").to_request();
        let book: Value = test::call_and_read_body_json(&srv, req).await;
        assert_eq!(book, Value::Null);

        let req = test::TestRequest::get().uri("/book-of-month?month=3").to_request();
        let resp = test::call_service(&srv, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::get().uri("/magazine/latest").to_request();
        let magazine: Value = test::call_and_read_body_json(&srv, req).await;
        assert_eq!(magazine, Value::Null);
    }

    #[actix_web::test]
    async fn user_messages_are_logged() {
        let app = TestApp::new().await;
        let srv = test::init_service(app.app()).await;

        let req = test::TestRequest::post()
            .uri("/api/messages")
            .set_json(json!({ "user_id": 12, "text": "Когда выйдет новый журнал?" }))
            .to_request();
        let resp = test::call_service(&srv, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let message = read_json(resp).await;
        assert_eq!(message["direction"], json!("from_user"));
        assert_eq!(message["user_id"], json!(12));
    }
}
