// Cross-tab signal bus for admin event-mode changes.
//
// An admin toggling event mode broadcasts `{year, enabled, ts}` to every other
// client sharing the local origin, so their live sync starts or stops without
// waiting for a server round trip. Delivery is one-directional with no
// acknowledgment; the publisher never receives its own signal.
//
// Subscribers receive the raw payload string and run it through
// [`signal_for_year`], so malformed payloads are dropped at the listener.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::storage::{KeyValueStore, StorageError};

/// Storage key carrying the most recent event-mode broadcast.
pub const EVENT_MODE_SIGNAL_KEY: &str = "oscars:event-mode-signal";

const SUBSCRIBER_BUFFER: usize = 32;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("failed to write signal: {0}")]
    Storage(#[from] StorageError),
}

/// An event-mode broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventModeSignal {
    pub year: u32,
    pub enabled: bool,
    /// Milliseconds since the Unix epoch. Makes repeated toggles to the same
    /// value distinct writes.
    pub ts: i64,
}

impl EventModeSignal {
    pub fn new(year: u32, enabled: bool) -> Self {
        EventModeSignal {
            year,
            enabled,
            ts: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn encode(&self) -> String {
        serde_json::json!({ "year": self.year, "enabled": self.enabled, "ts": self.ts })
            .to_string()
    }
}

/// Parse a raw signal payload. Accepts a numeric or numeric-string year and
/// any JSON truthiness for `enabled`; returns `None` for anything malformed.
pub fn parse_signal(raw: &str) -> Option<EventModeSignal> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let obj = value.as_object()?;

    let year = match obj.get("year")? {
        Value::Number(n) => n.as_u64().and_then(|y| u32::try_from(y).ok())?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    let enabled = match obj.get("enabled") {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
        Some(Value::Null) | None => false,
    };
    let ts = obj.get("ts").and_then(Value::as_i64).unwrap_or(0);

    Some(EventModeSignal { year, enabled, ts })
}

/// The event-mode flag a listener viewing `current_year` should adopt, or
/// `None` when the payload is malformed or targets another year.
pub fn signal_for_year(raw: &str, current_year: Option<u32>) -> Option<bool> {
    let signal = parse_signal(raw)?;
    if Some(signal.year) != current_year {
        debug!(
            "Ignoring event-mode signal for {} (viewing {:?})",
            signal.year, current_year
        );
        return None;
    }
    Some(signal.enabled)
}

/// Generic publish/subscribe channel for event-mode broadcasts.
pub trait SignalBus: Send + Sync {
    /// Broadcast a signal to every other subscriber.
    fn publish(&self, signal: &EventModeSignal) -> Result<(), BusError>;

    /// Start observing signals written by other handles. Must be called from
    /// within a tokio runtime.
    fn subscribe(&self) -> mpsc::Receiver<String>;
}

// ---------------------------------------------------------------------------
// In-process bus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Envelope {
    origin: u64,
    payload: String,
}

/// Shared hub for clients living in one process. Each [`InProcessBus`]
/// handle handed out by [`SignalHub::tab`] acts as one tab.
#[derive(Clone)]
pub struct SignalHub {
    tx: broadcast::Sender<Envelope>,
    next_id: Arc<AtomicU64>,
}

impl SignalHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        SignalHub {
            tx,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn tab(&self) -> InProcessBus {
        InProcessBus {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            tx: self.tx.clone(),
        }
    }
}

impl Default for SignalHub {
    fn default() -> Self {
        SignalHub::new(64)
    }
}

pub struct InProcessBus {
    id: u64,
    tx: broadcast::Sender<Envelope>,
}

impl SignalBus for InProcessBus {
    fn publish(&self, signal: &EventModeSignal) -> Result<(), BusError> {
        let envelope = Envelope {
            origin: self.id,
            payload: signal.encode(),
        };
        // No receivers just means no other tab is open.
        if self.tx.send(envelope).is_err() {
            debug!("Event-mode signal published with no subscribers");
        }
        Ok(())
    }

    fn subscribe(&self) -> mpsc::Receiver<String> {
        let (out_tx, out_rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let mut rx = self.tx.subscribe();
        let own_id = self.id;

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) if envelope.origin == own_id => continue,
                    Ok(envelope) => {
                        if out_tx.send(envelope.payload).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Signal subscriber lagged, skipped {skipped} signals");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        out_rx
    }
}

// ---------------------------------------------------------------------------
// Storage-backed bus
// ---------------------------------------------------------------------------

/// Bus over the shared key-value store, for clients in separate processes
/// that open the same store file. Publishing writes the signal key;
/// subscribers poll the key and report each new value not written by
/// their own handle.
pub struct StoreSignalBus {
    store: Arc<dyn KeyValueStore>,
    check_interval: Duration,
    last_published: Arc<Mutex<Option<String>>>,
}

impl StoreSignalBus {
    pub fn new(store: Arc<dyn KeyValueStore>, check_interval: Duration) -> Self {
        StoreSignalBus {
            store,
            check_interval,
            last_published: Arc::new(Mutex::new(None)),
        }
    }
}

impl SignalBus for StoreSignalBus {
    fn publish(&self, signal: &EventModeSignal) -> Result<(), BusError> {
        let raw = signal.encode();
        *self
            .last_published
            .lock()
            .expect("signal bus mutex poisoned") = Some(raw.clone());
        self.store.set(EVENT_MODE_SIGNAL_KEY, &raw)?;
        Ok(())
    }

    fn subscribe(&self) -> mpsc::Receiver<String> {
        let (out_tx, out_rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let store = Arc::clone(&self.store);
        let last_published = Arc::clone(&self.last_published);
        let period = self.check_interval.max(Duration::from_millis(1));

        // Only changes after subscription count, like a storage event.
        let mut last_seen = store.get(EVENT_MODE_SIGNAL_KEY).ok().flatten();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let current = match store.get(EVENT_MODE_SIGNAL_KEY) {
                    Ok(value) => value,
                    Err(e) => {
                        warn!("Failed to read event-mode signal: {e}");
                        continue;
                    }
                };
                if current == last_seen {
                    continue;
                }
                last_seen = current.clone();

                let Some(raw) = current else { continue };
                let own = last_published
                    .lock()
                    .expect("signal bus mutex poisoned")
                    .as_deref()
                    == Some(raw.as_str());
                if own {
                    continue;
                }
                if out_tx.send(raw).await.is_err() {
                    break;
                }
            }
        });

        out_rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn encode_then_parse() {
        let signal = EventModeSignal {
            year: 2026,
            enabled: true,
            ts: 42,
        };
        assert_eq!(parse_signal(&signal.encode()), Some(signal));
    }

    #[test]
    fn parse_tolerates_string_year_and_truthy_flags() {
        let parsed = parse_signal(r#"{"year":"2025","enabled":1}"#).unwrap();
        assert_eq!(parsed.year, 2025);
        assert!(parsed.enabled);
        assert!(!parse_signal(r#"{"year":2025}"#).unwrap().enabled);
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        assert_eq!(parse_signal("not json"), None);
        assert_eq!(parse_signal("null"), None);
        assert_eq!(parse_signal("[2026,true]"), None);
        assert_eq!(parse_signal(r#"{"enabled":true}"#), None);
        assert_eq!(parse_signal(r#"{"year":"soon","enabled":true}"#), None);
    }

    #[test]
    fn signal_for_other_year_is_ignored() {
        let raw = EventModeSignal::new(2025, true).encode();
        assert_eq!(signal_for_year(&raw, Some(2026)), None);
        assert_eq!(signal_for_year(&raw, None), None);
        assert_eq!(signal_for_year(&raw, Some(2025)), Some(true));
    }

    #[tokio::test]
    async fn in_process_bus_skips_publisher() {
        let hub = SignalHub::default();
        let admin = hub.tab();
        let viewer = hub.tab();

        let mut admin_rx = admin.subscribe();
        let mut viewer_rx = viewer.subscribe();

        admin.publish(&EventModeSignal::new(2026, true)).unwrap();

        let raw = viewer_rx.recv().await.unwrap();
        assert_eq!(signal_for_year(&raw, Some(2026)), Some(true));

        tokio::task::yield_now().await;
        assert!(admin_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn in_process_publish_without_subscribers_is_ok() {
        let hub = SignalHub::default();
        assert!(hub.tab().publish(&EventModeSignal::new(2026, false)).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn store_bus_delivers_other_writers_only() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let admin = StoreSignalBus::new(Arc::clone(&store), Duration::from_millis(100));
        let viewer = StoreSignalBus::new(Arc::clone(&store), Duration::from_millis(100));

        let mut admin_rx = admin.subscribe();
        let mut viewer_rx = viewer.subscribe();

        let signal = EventModeSignal {
            year: 2026,
            enabled: true,
            ts: 1,
        };
        admin.publish(&signal).unwrap();

        let raw = viewer_rx.recv().await.unwrap();
        assert_eq!(parse_signal(&raw), Some(signal));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(admin_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn store_bus_ignores_value_present_before_subscribe() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        store
            .set(EVENT_MODE_SIGNAL_KEY, r#"{"year":2026,"enabled":true,"ts":1}"#)
            .unwrap();

        let viewer = StoreSignalBus::new(Arc::clone(&store), Duration::from_millis(50));
        let mut rx = viewer.subscribe();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(rx.try_recv().is_err());

        store.set(EVENT_MODE_SIGNAL_KEY, "garbage").unwrap();
        // Raw payloads are forwarded as-is; filtering happens at the listener.
        assert_eq!(rx.recv().await.unwrap(), "garbage");
    }
}
