// src/main.rs
use actix_cors::Cors;
use actix_web::{App, HttpServer, http::header, middleware::Logger, web};
use std::time::Duration;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod access;
mod admin;
mod auth;
mod chat;
mod config;
mod content;
mod db;
mod error;
mod ledger;
mod models;
mod payment;
mod paywall;
mod sweep;
mod telegram;
#[cfg(test)]
mod test_support;

use crate::error::AppError;

/// Route table. Mounted under `/api` for the Mini-App and admin panel and at
/// the root for direct calls.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        AppError::InvalidArgument(err.to_string()).into()
    }));
    cfg.app_data(web::QueryConfig::default().error_handler(|err, _req| {
        AppError::InvalidArgument(err.to_string()).into()
    }));
    cfg.service(web::scope("/api").configure(mount));
    mount(cfg);
}

fn mount(cfg: &mut web::ServiceConfig) {
    paywall::init_routes(cfg);
    admin::init_routes(cfg);
}

fn cors() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allowed_headers(vec![
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::HeaderName::from_static("x-admin-token"),
        ])
        .max_age(3600)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // `init` also bridges `log` records, which actix's Logger emits.
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting Bookflix API");

    dotenv::dotenv().ok();
    let config = config::Config::from_env().expect("Failed to load config from environment");

    let db = db::Db::open(&config.database_path)
        .await
        .expect("Failed to open SQLite database");

    let telegram = telegram::TelegramClient::new(&config);
    if config.telegram_bot_token.is_none() {
        tracing::warn!("TELEGRAM_BOT_TOKEN is not set; channel sweep and admin replies will fail");
    }

    let content = content::ContentCache::new(Duration::from_secs(config.content_cache_ttl_secs));
    let bind = (config.host.clone(), config.port);

    tracing::info!("Listening on {}:{}", bind.0, bind.1);
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(db.clone()))
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(telegram.clone()))
            .app_data(web::Data::new(content.clone()))
            .wrap(cors())
            .wrap(Logger::default())
            .configure(routes)
    })
    .bind(bind)?
    .run()
    .await
}
