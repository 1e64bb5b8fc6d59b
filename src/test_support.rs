// src/test_support.rs
use crate::config::Config;
use crate::content::ContentCache;
use crate::db::Db;
use crate::ledger;
use crate::telegram::TelegramClient;
use actix_web::body::MessageBody;
use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{App, test, web};
use chrono::Utc;
use serde_json::Value;
use std::time::Duration;
use tempfile::TempDir;

pub const ADMIN_TOKEN: &str = "admin-secret";
pub const CRON_SECRET: &str = "cron-secret";

/// Application wiring over a fresh in-memory store, with no bot token so
/// nothing reaches the network.
pub struct TestApp {
    pub db: Db,
    pub config: Config,
    pub telegram: TelegramClient,
    pub content: ContentCache,
}

impl TestApp {
    pub async fn new() -> Self {
        let config = Config::from_pairs(vec![
            ("ADMIN_SECRET_TOKEN".to_string(), ADMIN_TOKEN.to_string()),
            ("CRON_SECRET".to_string(), CRON_SECRET.to_string()),
            ("WEBAPP_URL".to_string(), "https://bookflix.test".to_string()),
            (
                "CHANNEL_INVITE_LINK".to_string(),
                "https://t.me/+reading-room".to_string(),
            ),
        ])
        .unwrap();
        Self {
            db: Db::in_memory().await.unwrap(),
            telegram: TelegramClient::new(&config),
            content: ContentCache::new(Duration::from_secs(60)),
            config,
        }
    }

    pub fn app(
        &self,
    ) -> App<
        impl ServiceFactory<
            ServiceRequest,
            Config = (),
            Response = ServiceResponse<impl MessageBody + use<>>,
            Error = actix_web::Error,
            InitError = (),
        > + use<>,
    > {
        App::new()
            .app_data(web::Data::new(self.db.clone()))
            .app_data(web::Data::new(self.config.clone()))
            .app_data(web::Data::new(self.telegram.clone()))
            .app_data(web::Data::new(self.content.clone()))
            .configure(crate::routes)
    }

    pub async fn activate(&self, user_id: i64, days: i64) {
        let payment_id = format!("payment_{}_seed", user_id);
        ledger::activate(&self.db, user_id, days, &payment_id, Utc::now())
            .await
            .unwrap();
    }
}

pub async fn read_json<B: MessageBody>(resp: ServiceResponse<B>) -> Value {
    test::read_body_json(resp).await
}

/// File-backed store with the production pool settings, for tests where
/// several connections must actually race. Keep the `TempDir` alive.
pub async fn file_db() -> (TempDir, Db) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bookflix.db");
    let db = Db::open(path.to_str().unwrap()).await.unwrap();
    (dir, db)
}
