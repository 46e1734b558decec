//! SSE (Server-Sent Events) streaming of lifecycle notifications.
//!
//! Each open event stream is one consumer: it receives every activation and
//! cache-update notice broadcast after it connected.

use axum::response::sse::Event;
use futures::stream::Stream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::warn;

use crate::lifecycle::messages::Notification;

/// SSE event name for a notification.
fn event_name(notification: &Notification) -> &'static str {
    match notification {
        Notification::Activated { .. } => "activated",
        Notification::CacheUpdated { .. } => "cache-updated",
    }
}

/// Convert a notification receiver into an SSE stream.
///
/// A consumer that falls behind skips the notices it missed.
pub fn notifications_to_sse_stream(
    rx: broadcast::Receiver<Notification>,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    BroadcastStream::new(rx).filter_map(|item| match item {
        Ok(notification) => {
            let data = serde_json::to_string(&notification).unwrap_or_default();
            Some(Ok(Event::default().event(event_name(&notification)).data(data)))
        }
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            warn!(skipped, "Notification consumer lagged");
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stream_yields_notifications() {
        let (tx, rx) = broadcast::channel(4);
        let mut stream = Box::pin(notifications_to_sse_stream(rx));

        tx.send(Notification::Activated {
            version: "v2".to_string(),
        })
        .unwrap();
        drop(tx);

        assert!(stream.next().await.is_some());
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn test_event_names() {
        let n = Notification::CacheUpdated {
            tier: "v2-dynamic".to_string(),
            urls: vec![],
        };
        assert_eq!(event_name(&n), "cache-updated");
    }
}
