use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use liftboard_hub::{HubEvent, HubEventKind};
use log::{debug, warn};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, broadcast};
use tokio::time::{Duration, Instant, sleep_until};
use tokio_util::sync::CancellationToken;

/// What downstream displays receive: the event name and platform, never
/// a payload. Clients pull the processed view they care about.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub event_kind: HubEventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fop_name: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    fn from_event(event: &HubEvent) -> Self {
        Notification {
            event_kind: event.kind(),
            fop_name: event.fop().map(str::to_owned),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug)]
struct SubscriberInner {
    queue: Mutex<VecDeque<Notification>>,
    notify: Notify,
    closed: AtomicBool,
    depth: usize,
}

impl SubscriberInner {
    /// Enqueue, dropping the oldest notification when the queue is at
    /// depth. Returns whether something was dropped.
    fn push(&self, notification: Notification) -> bool {
        let mut queue = self.queue.lock().expect("subscriber queue lock poisoned");
        let mut dropped = false;
        if queue.len() >= self.depth {
            queue.pop_front();
            dropped = true;
        }
        queue.push_back(notification);
        drop(queue);
        self.notify.notify_one();
        dropped
    }
}

/// One downstream connection's end of the push channel. Dropping it
/// unsubscribes on the broker's next delivery.
pub struct SubscriberHandle {
    inner: Arc<SubscriberInner>,
}

impl SubscriberHandle {
    pub async fn next(&self) -> Notification {
        loop {
            {
                let mut queue = self
                    .inner
                    .queue
                    .lock()
                    .expect("subscriber queue lock poisoned");
                if let Some(notification) = queue.pop_front() {
                    return notification;
                }
            }
            self.inner.notify.notified().await;
        }
    }
}

impl Drop for SubscriberHandle {
    fn drop(&mut self) {
        self.inner.closed.store(true, Ordering::Relaxed);
    }
}

struct SubscriberEntry {
    inner: Arc<SubscriberInner>,
    fop_filter: Option<String>,
}

/// Coalesces hub events into per-(platform, kind) debounced
/// notifications and fans them out to every subscriber. A slow display
/// only ever loses its own oldest notifications.
pub struct Broker {
    subscribers: Mutex<Vec<SubscriberEntry>>,
    window: Duration,
    depth: usize,
    dropped: AtomicU64,
}

impl Broker {
    pub fn new(coalesce_window: Duration, queue_depth: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            window: coalesce_window,
            depth: queue_depth.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    /// Register a subscriber. With a filter, only that platform's
    /// notifications (plus the global ones) are delivered.
    pub fn subscribe(&self, fop_filter: Option<String>) -> SubscriberHandle {
        let inner = Arc::new(SubscriberInner {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            depth: self.depth,
        });
        self.subscribers
            .lock()
            .expect("subscriber list lock poisoned")
            .push(SubscriberEntry {
                inner: inner.clone(),
                fop_filter,
            });
        SubscriberHandle { inner }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .expect("subscriber list lock poisoned")
            .len()
    }

    pub fn dropped_notifications(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn deliver(&self, notification: &Notification) {
        let mut subscribers = self
            .subscribers
            .lock()
            .expect("subscriber list lock poisoned");
        subscribers.retain(|entry| !entry.inner.closed.load(Ordering::Relaxed));

        for entry in subscribers.iter() {
            let interested = match (&entry.fop_filter, &notification.fop_name) {
                (Some(filter), Some(fop)) => filter == fop,
                // Global events reach everyone; unfiltered subscribers
                // see everything.
                _ => true,
            };
            if interested && entry.inner.push(notification.clone()) {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Pump hub events until shutdown. Bursts within the coalesce
    /// window collapse to one notification per (platform, kind), the
    /// latest timestamp winning.
    pub async fn run(
        self: Arc<Self>,
        mut events: broadcast::Receiver<HubEvent>,
        shutdown: CancellationToken,
    ) {
        let mut pending: HashMap<(Option<String>, HubEventKind), (Notification, Instant)> =
            HashMap::new();

        loop {
            let next_deadline = pending
                .values()
                .map(|(_, deadline)| *deadline)
                .min()
                .unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Ok(event) => {
                        let notification = Notification::from_event(&event);
                        if self.window.is_zero() {
                            self.deliver(&notification);
                            continue;
                        }
                        let key = (notification.fop_name.clone(), notification.event_kind);
                        match pending.get_mut(&key) {
                            // Replace the payload, keep the deadline: a
                            // steady burst still flushes once per window.
                            Some((existing, _)) => *existing = notification,
                            None => {
                                pending.insert(
                                    key,
                                    (notification, Instant::now() + self.window),
                                );
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("Broker lagged {missed} hub events; notifications are lossy by design");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = sleep_until(next_deadline) => {
                    let now = Instant::now();
                    let due: Vec<_> = pending
                        .iter()
                        .filter(|(_, (_, deadline))| *deadline <= now)
                        .map(|(key, _)| key.clone())
                        .collect();
                    for key in due {
                        if let Some((notification, _)) = pending.remove(&key) {
                            debug!(
                                "Flushing {:?} notification for {:?}",
                                notification.event_kind, notification.fop_name
                            );
                            self.deliver(&notification);
                        }
                    }
                }
            }
        }

        // Flush whatever is still pending so a clean shutdown doesn't
        // eat the last notifications.
        for (notification, _) in pending.into_values() {
            self.deliver(&notification);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liftboard_hub::HubEvent;

    fn notification(kind: HubEventKind, fop: Option<&str>) -> Notification {
        Notification {
            event_kind: kind,
            fop_name: fop.map(str::to_owned),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn queue_overflow_drops_the_oldest() {
        let broker = Broker::new(Duration::ZERO, 2);
        let handle = broker.subscribe(None);

        for _ in 0..3 {
            broker.deliver(&notification(HubEventKind::Update, Some("A")));
        }
        broker.deliver(&notification(HubEventKind::Timer, Some("A")));

        assert_eq!(broker.dropped_notifications(), 2);
        let queue = handle.inner.queue.lock().unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue[1].event_kind, HubEventKind::Timer);
    }

    #[test]
    fn fop_filter_limits_delivery() {
        let broker = Broker::new(Duration::ZERO, 8);
        let for_a = broker.subscribe(Some("A".into()));
        let for_all = broker.subscribe(None);

        broker.deliver(&notification(HubEventKind::Update, Some("B")));
        broker.deliver(&notification(HubEventKind::Update, Some("A")));
        broker.deliver(&notification(HubEventKind::HubReady, None));

        assert_eq!(for_a.inner.queue.lock().unwrap().len(), 2);
        assert_eq!(for_all.inner.queue.lock().unwrap().len(), 3);
    }

    #[test]
    fn dropped_handles_are_pruned_on_delivery() {
        let broker = Broker::new(Duration::ZERO, 8);
        let handle = broker.subscribe(None);
        assert_eq!(broker.subscriber_count(), 1);

        drop(handle);
        broker.deliver(&notification(HubEventKind::Update, Some("A")));
        assert_eq!(broker.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn bursts_coalesce_per_fop_and_kind() {
        let broker = Arc::new(Broker::new(Duration::from_millis(100), 8));
        let handle = broker.subscribe(None);

        let (sender, receiver) = broadcast::channel(64);
        let shutdown = CancellationToken::new();
        let pump = tokio::spawn(broker.clone().run(receiver, shutdown.clone()));

        for _ in 0..10 {
            sender.send(HubEvent::Update { fop: "A".into() }).unwrap();
        }
        sender.send(HubEvent::Timer { fop: "A".into() }).unwrap();
        sender.send(HubEvent::Update { fop: "B".into() }).unwrap();

        // One notification per (fop, kind), whatever the burst size.
        let mut kinds = Vec::new();
        for _ in 0..3 {
            let n = handle.next().await;
            kinds.push((n.fop_name.clone().unwrap(), n.event_kind));
        }
        kinds.sort();
        assert_eq!(
            kinds,
            vec![
                ("A".to_string(), HubEventKind::Update),
                ("A".to_string(), HubEventKind::Timer),
                ("B".to_string(), HubEventKind::Update),
            ]
        );
        assert!(handle.inner.queue.lock().unwrap().is_empty());

        shutdown.cancel();
        pump.await.unwrap();
    }
}
