use crate::archive::{self, ArchiveError};
use crate::config::RelayConfig;
use fopwire::{
    BinaryFrame, BundleKind, EventFrame, EventFrameKind, ProtocolVersion, Reply,
};
use liftboard_hub::SharedHub;
use log::{debug, error, warn};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Running totals for the status surface. Shared between the handler
/// and the operator API, so everything is atomic.
#[derive(Debug, Default)]
pub struct IngressCounters {
    pub updates: AtomicU64,
    pub timers: AtomicU64,
    pub decisions: AtomicU64,
    pub databases: AtomicU64,
    pub bundles: AtomicU64,
    pub rejected_frames: AtomicU64,
    pub processing_errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterSnapshot {
    pub updates: u64,
    pub timers: u64,
    pub decisions: u64,
    pub databases: u64,
    pub bundles: u64,
    pub rejected_frames: u64,
    pub processing_errors: u64,
}

impl IngressCounters {
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            updates: self.updates.load(Ordering::Relaxed),
            timers: self.timers.load(Ordering::Relaxed),
            decisions: self.decisions.load(Ordering::Relaxed),
            databases: self.databases.load(Ordering::Relaxed),
            bundles: self.bundles.load(Ordering::Relaxed),
            rejected_frames: self.rejected_frames.load(Ordering::Relaxed),
            processing_errors: self.processing_errors.load(Ordering::Relaxed),
        }
    }
}

/// Per-frame routing: version gate, precondition handshake, then hand
/// the payload to the hub or the extractor. Every frame gets exactly one
/// reply envelope; nothing here ever closes the channel.
pub struct ProtocolHandler {
    hub: SharedHub,
    counters: Arc<IngressCounters>,
    min_version: ProtocolVersion,
    current_version: ProtocolVersion,
    local_files_dir: PathBuf,
    max_binary_frame_bytes: usize,
}

impl ProtocolHandler {
    /// Fails only on an unparseable version setting, which is a startup
    /// configuration error.
    pub fn new(
        hub: SharedHub,
        counters: Arc<IngressCounters>,
        config: &RelayConfig,
    ) -> Result<Self, fopwire::VersionParseError> {
        Ok(Self {
            hub,
            counters,
            min_version: config.min_protocol_version.parse()?,
            current_version: config.current_protocol_version.parse()?,
            local_files_dir: config.local_files_dir.clone(),
            max_binary_frame_bytes: config.max_binary_frame_bytes,
        })
    }

    /// Handle one text frame and produce its reply.
    pub fn handle_text(&self, text: &str) -> Reply {
        let frame = match EventFrame::parse(text) {
            Ok(frame) => frame,
            Err(err) => {
                warn!("Dropping malformed text frame: {err}");
                self.counters.rejected_frames.fetch_add(1, Ordering::Relaxed);
                return Reply::processing_error(err.to_string());
            }
        };

        if let Some(declared) = &frame.version {
            match declared.parse::<ProtocolVersion>() {
                Ok(version) if version.meets_minimum(&self.min_version) => {}
                Ok(version) => {
                    warn!("Dropping {:?} frame with protocol version {version} below minimum {}",
                        frame.kind, self.min_version);
                    self.counters.rejected_frames.fetch_add(1, Ordering::Relaxed);
                    // Advertise what this relay speaks so the upstream
                    // can renegotiate instead of guessing.
                    return Reply::version_mismatch(format!(
                        "protocol version {version} is below the minimum {}; this relay speaks {}",
                        self.min_version, self.current_version
                    ));
                }
                Err(err) => {
                    self.counters.rejected_frames.fetch_add(1, Ordering::Relaxed);
                    return Reply::version_mismatch(format!(
                        "{err}; this relay speaks {}",
                        self.current_version
                    ));
                }
            }
        }

        // Database frames are how preconditions get satisfied, so only
        // the event frames gate on them.
        if frame.kind != EventFrameKind::Database {
            let missing = self
                .hub
                .read()
                .expect("hub lock poisoned")
                .missing_preconditions();
            if !missing.is_empty() {
                debug!("Dropping {:?} frame, still missing {missing:?}", frame.kind);
                return Reply::missing_preconditions(missing);
            }
        }

        let mut hub = self.hub.write().expect("hub lock poisoned");
        let (result, counter, message) = match frame.kind {
            EventFrameKind::Update => (
                hub.apply_update(&frame.payload),
                &self.counters.updates,
                "Update processed",
            ),
            EventFrameKind::Timer => (
                hub.apply_timer(&frame.payload),
                &self.counters.timers,
                "Timer processed",
            ),
            EventFrameKind::Decision => (
                hub.apply_decision(&frame.payload),
                &self.counters.decisions,
                "Decision processed",
            ),
            EventFrameKind::Database => (
                hub.apply_database(&frame.payload),
                &self.counters.databases,
                "Database processed",
            ),
        };
        drop(hub);

        match result {
            Ok(()) => {
                counter.fetch_add(1, Ordering::Relaxed);
                Reply::ok(message)
            }
            Err(err) => {
                error!("Hub rejected {:?} frame: {err}", frame.kind);
                self.counters.processing_errors.fetch_add(1, Ordering::Relaxed);
                Reply::processing_error(err.to_string())
            }
        }
    }

    /// Handle one binary frame: decode, extract on the blocking pool,
    /// feed translations through the hub, and reply.
    pub async fn handle_binary(&self, bytes: Vec<u8>) -> Reply {
        if bytes.len() > self.max_binary_frame_bytes {
            warn!(
                "Dropping {} byte binary frame over the {} byte cap",
                bytes.len(),
                self.max_binary_frame_bytes
            );
            self.counters.rejected_frames.fetch_add(1, Ordering::Relaxed);
            return Reply::processing_error(format!(
                "binary frame of {} bytes exceeds the configured maximum",
                bytes.len()
            ));
        }

        let kind = match BinaryFrame::decode(&bytes) {
            Ok(frame) => frame.kind,
            Err(err) => {
                warn!("Dropping malformed binary frame: {err}");
                self.counters.rejected_frames.fetch_add(1, Ordering::Relaxed);
                return Reply::processing_error(err.to_string());
            }
        };

        // The payload offset is recomputed inside the blocking task; the
        // zip reader locates the archive from the tail either way.
        let local_files_dir = self.local_files_dir.clone();
        let extraction = tokio::task::spawn_blocking(move || {
            let payload = match BinaryFrame::decode(&bytes) {
                Ok(frame) => frame.payload,
                Err(_) => &bytes,
            };
            let translations = match kind {
                BundleKind::TranslationsZip => Some(archive::read_translations(payload)),
                _ => None,
            };
            let outcome = archive::extract_bundle(payload, kind, &local_files_dir);
            (outcome, translations)
        })
        .await;

        let (outcome, translations) = match extraction {
            Ok(parts) => parts,
            Err(err) => {
                error!("Archive extraction task failed to join: {err}");
                self.counters.processing_errors.fetch_add(1, Ordering::Relaxed);
                return Reply::processing_error("archive extraction task failed");
            }
        };

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                error!("Failed to extract {kind} bundle: {err}");
                self.counters.processing_errors.fetch_add(1, Ordering::Relaxed);
                return Reply::processing_error(err.to_string());
            }
        };
        if outcome.failed > 0 || outcome.skipped_unsafe > 0 {
            warn!(
                "{kind} bundle extracted {} entries ({} unsafe skipped, {} failed)",
                outcome.written, outcome.skipped_unsafe, outcome.failed
            );
        }

        let mut hub = self.hub.write().expect("hub lock poisoned");
        if let Some(translations) = translations {
            match translations {
                Ok(file) => {
                    let processed =
                        hub.ingest_translations(file.locales, file.checksum.as_deref());
                    debug!("Translations bundle processed: {processed}");
                }
                Err(err @ ArchiveError::MissingTranslations) => {
                    warn!("{err}");
                }
                Err(err) => {
                    error!("Failed to parse translations bundle: {err}");
                    self.counters.processing_errors.fetch_add(1, Ordering::Relaxed);
                    return Reply::processing_error(err.to_string());
                }
            }
        }
        hub.notify_bundle_loaded(kind, outcome.written);
        drop(hub);

        self.counters.bundles.fetch_add(1, Ordering::Relaxed);
        Reply::ok(format!("Extracted {} {kind} entries", outcome.written))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fopwire::Precondition;
    use liftboard_hub::CompetitionHub;
    use serde_json::json;

    fn handler_with_hub() -> (ProtocolHandler, SharedHub) {
        let hub = CompetitionHub::new("en").into_shared();
        let handler = ProtocolHandler::new(
            hub.clone(),
            Arc::new(IngressCounters::default()),
            &RelayConfig::default(),
        )
        .unwrap();
        (handler, hub)
    }

    fn database_frame() -> String {
        json!({
            "type": "database",
            "version": "2.0.0",
            "payload": {
                "formatVersion": "2.0",
                "competition": {"name": "Test Meet", "fops": ["A"]},
                "athletes": [],
            },
        })
        .to_string()
    }

    fn translations_zip() -> Vec<u8> {
        let body = r#"{"en": {"Start": "Start"}}"#;
        let zip = crate::archive::tests::zip_of(&[("translations.json", body)]);
        fopwire::BinaryFrame::encode(BundleKind::TranslationsZip, &zip)
    }

    #[tokio::test]
    async fn precondition_handshake_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let hub = CompetitionHub::new("en").into_shared();
        let config = RelayConfig {
            local_files_dir: dir.path().to_owned(),
            ..RelayConfig::default()
        };
        let handler =
            ProtocolHandler::new(hub, Arc::new(IngressCounters::default()), &config).unwrap();

        let update = json!({
            "type": "update",
            "version": "2.0.0",
            "payload": {"fopName": "A", "uiEvent": "LiftingOrderUpdated"},
        })
        .to_string();

        // Fresh hub: the update is refused with the full missing list.
        let reply = handler.handle_text(&update);
        assert_eq!(reply.status, 428);
        assert_eq!(reply.reason.as_deref(), Some("missing_preconditions"));
        assert_eq!(
            reply.missing,
            Some(vec![Precondition::Database, Precondition::Translations])
        );

        // Database alone is not enough.
        assert_eq!(handler.handle_text(&database_frame()).status, 200);
        let reply = handler.handle_text(&update);
        assert_eq!(reply.status, 428);
        assert_eq!(reply.missing, Some(vec![Precondition::Translations]));

        // Translations complete the handshake; the resent update goes
        // through.
        assert_eq!(handler.handle_binary(translations_zip()).await.status, 200);
        let reply = handler.handle_text(&update);
        assert_eq!(reply.status, 200);
        assert_eq!(reply.message.as_deref(), Some("Update processed"));
    }

    #[test]
    fn below_minimum_version_is_rejected_and_advertises_ours() {
        let (handler, _) = handler_with_hub();
        let reply = handler.handle_text(
            &json!({"type": "update", "version": "1.9.0", "payload": {"fopName": "A"}})
                .to_string(),
        );
        assert_eq!(reply.status, 400);
        let reason = reply.reason.unwrap();
        assert!(reason.contains("below the minimum"));
        assert!(reason.contains("this relay speaks 2.0.0"));
    }

    #[test]
    fn unparseable_version_is_rejected_and_advertises_ours() {
        let (handler, _) = handler_with_hub();
        let reply = handler.handle_text(
            &json!({"type": "update", "version": "latest", "payload": {"fopName": "A"}})
                .to_string(),
        );
        assert_eq!(reply.status, 400);
        assert!(reply.reason.unwrap().contains("this relay speaks 2.0.0"));
    }

    #[test]
    fn malformed_text_frame_gets_a_500_and_channel_logic_continues() {
        let (handler, _) = handler_with_hub();
        assert_eq!(handler.handle_text("{nonsense").status, 500);
        assert_eq!(handler.handle_text(&database_frame()).status, 200);
    }

    #[test]
    fn hub_errors_become_500_replies() {
        let (handler, hub) = handler_with_hub();
        // Satisfy preconditions first.
        handler.handle_text(&database_frame());
        {
            let mut hub = hub.write().unwrap();
            let mut locales = hashbrown::HashMap::new();
            locales.insert("en".to_string(), hashbrown::HashMap::new());
            hub.ingest_translations(locales, None);
        }

        let reply = handler.handle_text(
            &json!({"type": "update", "payload": {"uiEvent": "NoFopHere"}}).to_string(),
        );
        assert_eq!(reply.status, 500);
    }

    #[tokio::test]
    async fn oversize_binary_frame_is_rejected_before_decode() {
        let dir = tempfile::tempdir().unwrap();
        let hub = CompetitionHub::new("en").into_shared();
        let config = RelayConfig {
            local_files_dir: dir.path().to_owned(),
            max_binary_frame_bytes: 16,
            ..RelayConfig::default()
        };
        let handler =
            ProtocolHandler::new(hub, Arc::new(IngressCounters::default()), &config).unwrap();

        let reply = handler.handle_binary(vec![0u8; 64]).await;
        assert_eq!(reply.status, 500);
        assert!(reply.reason.unwrap().contains("exceeds"));
    }

    #[tokio::test]
    async fn legacy_raw_zip_extracts_as_flags() {
        let dir = tempfile::tempdir().unwrap();
        let hub = CompetitionHub::new("en").into_shared();
        let mut events = hub.read().unwrap().subscribe();
        let config = RelayConfig {
            local_files_dir: dir.path().to_owned(),
            ..RelayConfig::default()
        };
        let handler =
            ProtocolHandler::new(hub, Arc::new(IngressCounters::default()), &config).unwrap();

        // A bogus 255-byte tag length followed by a real archive.
        let zip = crate::archive::tests::zip_of(&[("CAN.svg", "<svg/>")]);
        let mut frame = vec![0, 0, 0, 0xFF];
        frame.extend_from_slice(&zip);

        let reply = handler.handle_binary(frame).await;
        assert_eq!(reply.status, 200);
        assert!(dir.path().join("flags/CAN.svg").is_file());
        assert_eq!(
            events.try_recv().unwrap(),
            liftboard_hub::HubEvent::FlagsLoaded { count: 1 }
        );
    }
}
