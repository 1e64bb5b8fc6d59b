// src/chat.rs
use crate::db::{self, Db};
use crate::error::{AppError, AppResult};
use crate::models::{Message, MessageDirection};
use crate::telegram::TelegramClient;
use chrono::{DateTime, Utc};

/// Telegram's limit for a single text message.
const MAX_MESSAGE_CHARS: usize = 4096;

fn validate_text(text: &str) -> AppResult<&str> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AppError::invalid("Message text is empty"));
    }
    if text.chars().count() > MAX_MESSAGE_CHARS {
        return Err(AppError::invalid(format!(
            "Message text exceeds {} characters",
            MAX_MESSAGE_CHARS
        )));
    }
    Ok(text)
}

pub async fn post_user_message(
    db: &Db,
    user_id: i64,
    text: &str,
    now: DateTime<Utc>,
) -> AppResult<Message> {
    let text = validate_text(text)?;
    Ok(db::insert_message(db.pool(), user_id, text, MessageDirection::FromUser, now).await?)
}

pub async fn conversation(db: &Db, user_id: i64) -> AppResult<Vec<Message>> {
    Ok(db::list_messages(db.pool(), user_id).await?)
}

/// Delivers an admin reply through the bot. Only delivered messages land in
/// the log.
pub async fn send_admin_message(
    db: &Db,
    telegram: &TelegramClient,
    user_id: i64,
    text: &str,
    now: DateTime<Utc>,
) -> AppResult<Message> {
    let text = validate_text(text)?;
    telegram.send_message(user_id, text).await?;
    let message =
        db::insert_message(db.pool(), user_id, text, MessageDirection::FromAdmin, now).await?;
    tracing::info!("Admin message delivered to user {}", user_id);
    Ok(message)
}
