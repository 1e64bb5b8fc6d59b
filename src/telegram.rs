// src/telegram.rs
//! Thin Telegram Bot API client: channel ban/unban, chat lookup, and
//! messages to users.

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::sweep::ChannelMembership;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;

#[derive(Deserialize)]
struct BotResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct Chat {
    pub username: Option<String>,
}

#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    api_url: String,
    bot_token: Option<String>,
    channel_id: Option<String>,
    invite_link: Option<String>,
}

impl TelegramClient {
    pub fn new(config: &Config) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            http,
            api_url: config.telegram_api_url.trim_end_matches('/').to_string(),
            bot_token: config.telegram_bot_token.clone().filter(|t| !t.is_empty()),
            channel_id: config.telegram_channel_id.clone().filter(|c| !c.is_empty()),
            invite_link: config.channel_invite_link.clone().filter(|l| !l.is_empty()),
        }
    }

    fn channel(&self) -> AppResult<&str> {
        match (&self.bot_token, &self.channel_id) {
            (Some(_), Some(channel)) => Ok(channel),
            _ => Err(AppError::Internal("Bot or channel not configured".into())),
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> AppResult<T> {
        let token = self
            .bot_token
            .as_deref()
            .ok_or_else(|| AppError::Internal("Bot not configured".into()))?;

        let response: BotResponse<T> = self
            .http
            .post(format!("{}/bot{}/{}", self.api_url, token, method))
            .json(&params)
            .send()
            .await?
            .json()
            .await?;

        if !response.ok {
            return Err(AppError::Internal(
                response
                    .description
                    .unwrap_or_else(|| format!("Telegram {} failed", method)),
            ));
        }
        response
            .result
            .ok_or_else(|| AppError::Internal(format!("Telegram {} returned no result", method)))
    }

    pub async fn ban_chat_member(&self, user_id: i64) -> AppResult<()> {
        let channel = self.channel()?;
        let _: bool = self
            .call("banChatMember", json!({ "chat_id": channel, "user_id": user_id }))
            .await?;
        Ok(())
    }

    /// Lifts a ban. Members that were never banned are left untouched.
    pub async fn unban_chat_member(&self, user_id: i64) -> AppResult<()> {
        let channel = self.channel()?;
        let _: bool = self
            .call(
                "unbanChatMember",
                json!({ "chat_id": channel, "user_id": user_id, "only_if_banned": true }),
            )
            .await?;
        Ok(())
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> AppResult<()> {
        let _: Value = self
            .call("sendMessage", json!({ "chat_id": chat_id, "text": text }))
            .await?;
        Ok(())
    }

    pub async fn get_chat(&self, chat_id: &str) -> AppResult<Chat> {
        self.call("getChat", json!({ "chat_id": chat_id })).await
    }

    /// Link handed out to subscribers. The configured invite link wins;
    /// otherwise the public `t.me` address of the channel, if it has one.
    pub async fn channel_link(&self) -> Option<String> {
        if let Some(link) = &self.invite_link {
            return Some(link.clone());
        }
        let channel = self.channel().ok()?;
        match self.get_chat(channel).await {
            Ok(chat) => Some(format!(
                "https://t.me/{}",
                chat.username.unwrap_or_else(|| channel.to_string())
            )),
            Err(e) => {
                tracing::warn!("Error getting channel link: {}", e);
                None
            }
        }
    }
}

impl ChannelMembership for TelegramClient {
    async fn grant(&self, user_id: i64) -> AppResult<()> {
        self.unban_chat_member(user_id).await
    }

    async fn revoke(&self, user_id: i64) -> AppResult<()> {
        self.ban_chat_member(user_id).await
    }
}
