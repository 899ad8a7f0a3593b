//! Process-global inbox (dedupe) and outbox (pending notifications). Both are
//! consumed by out-of-scope collaborators; the core only keeps their state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub id: Uuid,
    pub topic: String,
    pub payload: Value,
    pub sent: bool,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl OutboxMessage {
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self { id: Uuid::new_v4(), topic: topic.into(), payload, sent: false, created_at: Utc::now(), sent_at: None }
    }
}
