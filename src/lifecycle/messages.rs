//! Control messages in, notifications out.
//!
//! Both directions are one-way: commands carry no reply, notifications
//! expect no acknowledgement.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// A command sent to the lifecycle controller by a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Leave the waiting state and activate now.
    SkipWaiting,
    /// Warm the dynamic-pages tier with these URLs.
    CacheUrls(Vec<String>),
    #[serde(other)]
    Unknown,
}

impl ControlMessage {
    /// Interpret an arbitrary JSON payload. Anything unrecognized is `Unknown`.
    pub fn from_value(value: serde_json::Value) -> Self {
        match serde_json::from_value(value.clone()) {
            Ok(message) => message,
            Err(e) => {
                debug!(payload = %value, error = %e, "Unrecognized control message");
                ControlMessage::Unknown
            }
        }
    }
}

/// A broadcast to every open consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Notification {
    /// A new version took control; consumers may reload.
    Activated { version: String },
    /// URLs were added to a tier.
    CacheUpdated { tier: String, urls: Vec<String> },
}
