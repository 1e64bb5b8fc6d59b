// src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Inactive,
    Active,
    Cancelled,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum MessageDirection {
    FromUser,
    FromAdmin,
}

/// One row per user. `status` is the stored value; expiry is only ever
/// derived at read time, so an `Active` row may well be past its `end_at`.
#[derive(Serialize, Deserialize, Clone, Debug, FromRow)]
pub struct Subscription {
    pub user_id: i64,
    pub status: SubscriptionStatus,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, FromRow)]
pub struct PaymentRecord {
    pub user_id: i64,
    pub payment_id: String,
    pub amount: f64,
    pub days: i64,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, FromRow)]
pub struct Message {
    pub id: i64,
    pub user_id: i64,
    pub text: String,
    pub direction: MessageDirection,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, FromRow)]
pub struct BookOfMonth {
    pub month: i64,
    pub year: i64,
    pub title: String,
    pub author: String,
    pub description: String,
    pub image_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, FromRow)]
pub struct Magazine {
    pub issue_number: i64,
    pub title: String,
    pub short_description: String,
    pub full_description: String,
    pub image_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

// Read models

#[derive(Serialize, Clone, Debug)]
pub struct SubscriptionView {
    pub status: SubscriptionStatus,
    pub subscription_start: Option<DateTime<Utc>>,
    pub subscription_end: Option<DateTime<Utc>>,
    pub days_remaining: i64,
    pub payment_id: Option<String>,
    pub history: Vec<PaymentRecord>,
}

#[derive(Serialize, Clone, Debug)]
pub struct UserSummary {
    pub user_id: i64,
    pub status: SubscriptionStatus,
    pub stored_status: SubscriptionStatus,
    pub subscription_start: Option<DateTime<Utc>>,
    pub subscription_end: Option<DateTime<Utc>>,
    pub days_remaining: i64,
    pub has_access: bool,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Clone, Debug)]
pub struct PaymentIntent {
    pub payment_id: String,
    pub payment_url: String,
    pub amount: f64,
    pub days: i64,
    pub status: PaymentStatus,
}

// Requests

#[derive(Serialize, Deserialize, Debug)]
pub struct UserQuery {
    pub user_id: i64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CreatePaymentRequest {
    pub user_id: i64,
    pub days: i64,
    pub amount: f64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ConfirmPaymentRequest {
    pub payment_id: String,
    pub user_id: i64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CancelRequest {
    pub user_id: i64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct UserMessageRequest {
    pub user_id: i64,
    pub text: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct AdminTokenQuery {
    pub admin_token: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct AddDaysRequest {
    pub user_id: i64,
    pub days: i64,
    pub admin_token: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SetSubscriptionRequest {
    pub user_id: i64,
    pub status: SubscriptionStatus,
    pub end_date: Option<String>,
    pub admin_token: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct AdminMessageRequest {
    pub user_id: i64,
    pub text: String,
    pub admin_token: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ConversationQuery {
    pub user_id: i64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct BookPeriodQuery {
    pub month: Option<i64>,
    pub year: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SaveBookRequest {
    pub month: i64,
    pub year: i64,
    pub title: String,
    pub author: String,
    pub description: String,
    pub image_url: Option<String>,
    pub admin_token: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SaveMagazineRequest {
    pub issue_number: i64,
    pub title: String,
    pub short_description: String,
    pub full_description: String,
    pub image_url: Option<String>,
    pub admin_token: Option<String>,
}
