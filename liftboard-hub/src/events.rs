use serde::Serialize;
use tokio::sync::broadcast;

/// Everything the hub announces to in-process subscribers. Events carry
/// names, never payloads; observers pull what they need back out of the
/// hub.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HubEvent {
    Database,
    DatabaseReady,
    HubReady,
    Update { fop: String },
    Timer { fop: String },
    Decision { fop: String },
    SessionDone { fop: String, session: String },
    SessionReopened { fop: String, session: String },
    FlagsLoaded { count: usize },
    LogosLoaded { count: usize },
    PicturesLoaded { count: usize },
    StylesLoaded { count: usize },
    TranslationsLoaded { count: usize },
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum HubEventKind {
    Database,
    DatabaseReady,
    HubReady,
    Update,
    Timer,
    Decision,
    SessionDone,
    SessionReopened,
    FlagsLoaded,
    LogosLoaded,
    PicturesLoaded,
    StylesLoaded,
    TranslationsLoaded,
}

impl HubEvent {
    pub fn kind(&self) -> HubEventKind {
        match self {
            HubEvent::Database => HubEventKind::Database,
            HubEvent::DatabaseReady => HubEventKind::DatabaseReady,
            HubEvent::HubReady => HubEventKind::HubReady,
            HubEvent::Update { .. } => HubEventKind::Update,
            HubEvent::Timer { .. } => HubEventKind::Timer,
            HubEvent::Decision { .. } => HubEventKind::Decision,
            HubEvent::SessionDone { .. } => HubEventKind::SessionDone,
            HubEvent::SessionReopened { .. } => HubEventKind::SessionReopened,
            HubEvent::FlagsLoaded { .. } => HubEventKind::FlagsLoaded,
            HubEvent::LogosLoaded { .. } => HubEventKind::LogosLoaded,
            HubEvent::PicturesLoaded { .. } => HubEventKind::PicturesLoaded,
            HubEvent::StylesLoaded { .. } => HubEventKind::StylesLoaded,
            HubEvent::TranslationsLoaded { .. } => HubEventKind::TranslationsLoaded,
        }
    }

    /// The platform this event concerns, for events scoped to one.
    pub fn fop(&self) -> Option<&str> {
        match self {
            HubEvent::Update { fop }
            | HubEvent::Timer { fop }
            | HubEvent::Decision { fop }
            | HubEvent::SessionDone { fop, .. }
            | HubEvent::SessionReopened { fop, .. } => Some(fop),
            _ => None,
        }
    }
}

/// Fan-in point for hub events. Wraps a broadcast channel so emission
/// never blocks on slow observers; an observer that falls behind sees a
/// `Lagged` error from its receiver and re-syncs from hub state.
#[derive(Debug)]
pub struct EventEmitter {
    sender: broadcast::Sender<HubEvent>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: HubEvent) {
        log::debug!("Emitting {event:?}");
        // Err means no subscribers, which is fine: the hub state is the
        // source of truth and late subscribers read it directly.
        let _ = self.sender.send(event);
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_reach_subscribers_in_order() {
        let emitter = EventEmitter::default();
        let mut rx = emitter.subscribe();

        emitter.emit(HubEvent::Database);
        emitter.emit(HubEvent::Update { fop: "A".into() });

        assert_eq!(rx.recv().await.unwrap(), HubEvent::Database);
        let update = rx.recv().await.unwrap();
        assert_eq!(update.kind(), HubEventKind::Update);
        assert_eq!(update.fop(), Some("A"));
    }

    #[test]
    fn emitting_without_subscribers_is_fine() {
        EventEmitter::default().emit(HubEvent::HubReady);
    }

    #[test]
    fn kind_serializes_like_the_event_tag() {
        assert_eq!(
            serde_json::to_value(HubEventKind::SessionDone).unwrap(),
            serde_json::json!("SESSION_DONE")
        );
        let event = serde_json::to_value(HubEvent::SessionDone {
            fop: "A".into(),
            session: "M1".into(),
        })
        .unwrap();
        assert_eq!(event["kind"], "SESSION_DONE");
    }
}
