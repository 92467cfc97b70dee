//! Per-item results.
//!
//! An item's result is a watch channel. Synchronous items are created already
//! settled; deferred items start PENDING and are settled by their write task.
//! Serializing a [`ResultHandle`] writes whatever value is current at that
//! moment.

use serde::{Deserialize, Serialize, Serializer};
use tokio::sync::watch;
use uuid::Uuid;

use crate::connector::KeyRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Success,
    Pending,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorItem {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemResult {
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorItem>,
}

impl ItemResult {
    pub fn success() -> Self {
        Self {
            status: ItemStatus::Success,
            errors: Vec::new(),
        }
    }

    pub fn pending() -> Self {
        Self {
            status: ItemStatus::Pending,
            errors: Vec::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: ItemStatus::Failed,
            errors: vec![ErrorItem {
                message: message.into(),
            }],
        }
    }
}

/// Write side of a deferred item's result.
pub type ResultSender = watch::Sender<ItemResult>;

/// Read side of an item's result.
#[derive(Debug, Clone)]
pub struct ResultHandle(watch::Receiver<ItemResult>);

impl ResultHandle {
    /// A handle that already holds its final value.
    pub fn settled(result: ItemResult) -> Self {
        let (_, rx) = watch::channel(result);
        Self(rx)
    }

    /// A PENDING handle and the sender that will settle it.
    pub fn pending() -> (ResultSender, Self) {
        let (tx, rx) = watch::channel(ItemResult::pending());
        (tx, Self(rx))
    }

    pub fn current(&self) -> ItemResult {
        self.0.borrow().clone()
    }

    /// Wait until the result leaves PENDING. A sender dropped while still
    /// pending reports FAILED.
    pub async fn settled_result(&self) -> ItemResult {
        let mut rx = self.0.clone();
        let settled = match rx.wait_for(|r| r.status != ItemStatus::Pending).await {
            Ok(result) => result.clone(),
            Err(_) => {
                let current = self.current();
                if current.status == ItemStatus::Pending {
                    ItemResult::failed("deferred write was abandoned")
                } else {
                    current
                }
            }
        };
        settled
    }
}

impl Serialize for ResultHandle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.borrow().serialize(serializer)
    }
}

/// The response-facing view of an object, after field filtering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectResponse {
    #[serde(rename = "@context")]
    pub context: String,
    #[serde(rename = "@class", skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_time_unix: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<KeyRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thing_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_id: Option<Uuid>,
    pub last_update_time_unix: i64,
}

/// One entry of a batch response, in request order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchItemResult {
    #[serde(skip)]
    pub index: usize,
    #[serde(flatten)]
    pub object: ObjectResponse,
    pub result: ResultHandle,
}
