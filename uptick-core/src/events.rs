//! Monitor lifecycle events consumed from the external event bus.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use thiserror::Error;

/// The three lifecycle transitions the scheduler reacts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MonitorEvent {
    Created,
    Updated,
    Deleted,
}

impl MonitorEvent {
    /// The event-type string used on the wire.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MonitorEvent::Created => "monitor.created",
            MonitorEvent::Updated => "monitor.updated",
            MonitorEvent::Deleted => "monitor.deleted",
        }
    }
}

impl fmt::Display for MonitorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// The payload could not be reduced to a monitor id.
    #[error("undecodable event payload: {0}")]
    Payload(String),
    /// The transport refused the subscription.
    #[error("event bus subscription failed: {0}")]
    Subscribe(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An opaque payload as delivered by the bus transport.
///
/// The bus contract is "the monitor id as a string", but transports differ in
/// how they serialize it. The adapter tries, in order: a JSON string
/// (`"m1"`), a JSON object carrying an `id` field, and finally the raw bytes
/// as UTF-8 text.
#[derive(Clone, Debug)]
pub struct EventPayload(Vec<u8>);

impl EventPayload {
    #[must_use]
    pub fn new(raw: Vec<u8>) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn from_id(id: &str) -> Self {
        Self(format!("\"{id}\"").into_bytes())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Extract the monitor id this payload refers to.
    pub fn monitor_id(&self) -> Result<String> {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&self.0) {
            match value {
                serde_json::Value::String(id) if !id.is_empty() => return Ok(id),
                serde_json::Value::Object(obj) => {
                    if let Some(id) = obj.get("id").and_then(|v| v.as_str()) {
                        return Ok(id.to_string());
                    }
                    return Err(Error::Payload("object payload without an id field".into()));
                }
                other => {
                    return Err(Error::Payload(format!(
                        "unsupported JSON payload: {other}"
                    )))
                }
            }
        }
        let raw = std::str::from_utf8(&self.0)
            .map_err(|_| Error::Payload("payload is not UTF-8".into()))?
            .trim();
        if raw.is_empty() {
            return Err(Error::Payload("empty payload".into()));
        }
        Ok(raw.to_string())
    }
}

/// A subscriber callback. Handlers are cheap and must not block; anything
/// slow belongs on a spawned task inside the handler.
pub type EventHandler = Box<dyn Fn(EventPayload) -> BoxFuture<'static, ()> + Send + Sync>;

/// Subscription surface of the external event bus.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn subscribe(&self, event: MonitorEvent, handler: EventHandler) -> Result<()>;
}

/// Process-local bus fan-out, for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryEventBus {
    handlers: RwLock<HashMap<MonitorEvent, Vec<EventHandler>>>,
}

impl MemoryEventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `payload` to every handler subscribed to `event`, in order.
    pub async fn publish(&self, event: MonitorEvent, payload: EventPayload) {
        let futures: Vec<BoxFuture<'static, ()>> = {
            let handlers = self.handlers.read();
            handlers
                .get(&event)
                .map(|hs| hs.iter().map(|h| h(payload.clone())).collect())
                .unwrap_or_default()
        };
        for fut in futures {
            fut.await;
        }
    }
}

#[async_trait]
impl EventBus for MemoryEventBus {
    async fn subscribe(&self, event: MonitorEvent, handler: EventHandler) -> Result<()> {
        self.handlers.write().entry(event).or_default().push(handler);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn payload_decodes_json_string() {
        let p = EventPayload::new(b"\"m1\"".to_vec());
        assert_eq!(p.monitor_id().unwrap(), "m1");
    }

    #[test]
    fn payload_decodes_object_with_id() {
        let p = EventPayload::new(br#"{"id": "m2", "name": "edge"}"#.to_vec());
        assert_eq!(p.monitor_id().unwrap(), "m2");
    }

    #[test]
    fn payload_falls_back_to_raw_text() {
        let p = EventPayload::new(b"m3".to_vec());
        assert_eq!(p.monitor_id().unwrap(), "m3");
    }

    #[test]
    fn payload_rejects_garbage() {
        assert!(EventPayload::new(b"".to_vec()).monitor_id().is_err());
        assert!(EventPayload::new(b"[1, 2]".to_vec()).monitor_id().is_err());
        assert!(EventPayload::new(br#"{"name": "no id"}"#.to_vec())
            .monitor_id()
            .is_err());
    }

    #[tokio::test]
    async fn memory_bus_delivers_to_matching_subscribers_only() {
        let bus = MemoryEventBus::new();
        let created = Arc::new(AtomicUsize::new(0));
        let deleted = Arc::new(AtomicUsize::new(0));

        let c = created.clone();
        bus.subscribe(
            MonitorEvent::Created,
            Box::new(move |_| {
                let c = c.clone();
                Box::pin(async move {
                    c.fetch_add(1, Ordering::SeqCst);
                })
            }),
        )
        .await
        .unwrap();
        let d = deleted.clone();
        bus.subscribe(
            MonitorEvent::Deleted,
            Box::new(move |_| {
                let d = d.clone();
                Box::pin(async move {
                    d.fetch_add(1, Ordering::SeqCst);
                })
            }),
        )
        .await
        .unwrap();

        bus.publish(MonitorEvent::Created, EventPayload::from_id("m1"))
            .await;
        bus.publish(MonitorEvent::Created, EventPayload::from_id("m2"))
            .await;
        assert_eq!(created.load(Ordering::SeqCst), 2);
        assert_eq!(deleted.load(Ordering::SeqCst), 0);
    }
}
