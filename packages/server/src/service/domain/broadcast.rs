//! `GET /broadcast_messages`: instance-wide banners, readable by anyone.

use apigate_core::ApiError;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::service::request::{HandlerCall, HandlerResponse};
use crate::service::router::ApiHandler;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastMessage {
    pub id: u64,
    pub message: String,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Default)]
pub struct ListBroadcastMessages {
    messages: RwLock<Vec<BroadcastMessage>>,
}

impl ListBroadcastMessages {
    #[must_use]
    pub fn new(messages: Vec<BroadcastMessage>) -> Self {
        Self {
            messages: RwLock::new(messages),
        }
    }

    pub fn push(&self, message: BroadcastMessage) {
        self.messages.write().push(message);
    }
}

#[async_trait]
impl ApiHandler for ListBroadcastMessages {
    async fn handle(&self, _call: HandlerCall) -> Result<HandlerResponse, ApiError> {
        let messages = self.messages.read().clone();
        let body = serde_json::to_value(messages).map_err(anyhow::Error::from)?;
        Ok(HandlerResponse::ok(body))
    }
}
