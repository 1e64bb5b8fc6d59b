// src/content.rs
//! Book of the month and magazine issues. Reads are cached as ready-made
//! JSON; every admin write drops the cached entries.

use crate::db::{self, Db};
use crate::error::{AppError, AppResult};
use crate::models::{BookOfMonth, Magazine, SaveBookRequest, SaveMagazineRequest};
use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

const LATEST_BOOK_KEY: &str = "book_of_month:latest";
const LATEST_MAGAZINE_KEY: &str = "magazine:latest";

#[derive(Clone)]
pub struct ContentCache {
    cache: Cache<String, Value>,
}

impl ContentCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Cache::builder().max_capacity(256).time_to_live(ttl).build(),
        }
    }

    async fn cached<T, F>(&self, key: String, load: F) -> AppResult<Value>
    where
        T: Serialize,
        F: Future<Output = Result<Option<T>, sqlx::Error>>,
    {
        if let Some(hit) = self.cache.get(&key).await {
            tracing::debug!("Content cache hit for key: {}", key);
            return Ok(hit);
        }

        let value = serde_json::to_value(load.await?)
            .map_err(|e| AppError::Internal(format!("Failed to encode content: {}", e)))?;
        self.cache.insert(key, value.clone()).await;
        Ok(value)
    }

    /// Book for the given period, or the most recent one. `null` when absent.
    pub async fn book_of_month(&self, db: &Db, period: Option<(i64, i64)>) -> AppResult<Value> {
        match period {
            Some((month, year)) => {
                validate_month(month)?;
                self.cached(
                    format!("book_of_month:{}-{}", year, month),
                    db::find_book(db.pool(), month, year),
                )
                .await
            }
            None => {
                self.cached(LATEST_BOOK_KEY.to_string(), db::latest_book(db.pool()))
                    .await
            }
        }
    }

    pub async fn latest_magazine(&self, db: &Db) -> AppResult<Value> {
        self.cached(
            LATEST_MAGAZINE_KEY.to_string(),
            db::latest_magazine(db.pool()),
        )
        .await
    }

    pub async fn save_book(
        &self,
        db: &Db,
        req: SaveBookRequest,
        now: DateTime<Utc>,
    ) -> AppResult<BookOfMonth> {
        validate_month(req.month)?;
        if req.year < 1 {
            return Err(AppError::invalid("year must be positive"));
        }
        require_text("title", &req.title)?;
        require_text("author", &req.author)?;

        let book = BookOfMonth {
            month: req.month,
            year: req.year,
            title: req.title,
            author: req.author,
            description: req.description,
            image_url: req.image_url.filter(|url| !url.is_empty()),
            updated_at: now,
        };
        db::upsert_book(db.pool(), &book).await?;
        self.cache.invalidate_all();

        tracing::info!("Saved book of the month {}-{}", book.year, book.month);
        Ok(book)
    }

    pub async fn save_magazine(
        &self,
        db: &Db,
        req: SaveMagazineRequest,
        now: DateTime<Utc>,
    ) -> AppResult<Magazine> {
        if req.issue_number < 1 {
            return Err(AppError::invalid("issue_number must be positive"));
        }
        require_text("title", &req.title)?;

        let magazine = Magazine {
            issue_number: req.issue_number,
            title: req.title,
            short_description: req.short_description,
            full_description: req.full_description,
            image_url: req.image_url.filter(|url| !url.is_empty()),
            updated_at: now,
        };
        db::upsert_magazine(db.pool(), &magazine).await?;
        self.cache.invalidate_all();

        tracing::info!("Saved magazine issue {}", magazine.issue_number);
        Ok(magazine)
    }
}

fn validate_month(month: i64) -> AppResult<()> {
    if !(1..=12).contains(&month) {
        return Err(AppError::invalid("month must be between 1 and 12"));
    }
    Ok(())
}

fn require_text(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::invalid(format!("Missing {}", field)));
    }
    Ok(())
}
