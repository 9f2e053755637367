use crate::athlete::{Athlete, AthleteKey};
use crate::database::{
    DatabaseFormat, DatabaseIndexes, DatabaseParseError, DatabaseState,
};
use crate::events::{EventEmitter, HubEvent};
use crate::fop::{DecisionState, FopUpdate, SessionAthlete, TimerState};
use crate::session::{PhaseChange, SessionPhase};
use crate::translations::TranslationStore;
use fopwire::{BundleKind, Precondition};
use hashbrown::HashMap;
use itertools::Itertools;
use log::{debug, info};
use miette::Diagnostic;
use serde_json::Value;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Debug, Error, Diagnostic)]
pub enum HubError {
    #[error("frame payload is not a JSON object")]
    PayloadNotAnObject,

    #[error("frame payload carries no fopName")]
    MissingFopName,

    #[error(transparent)]
    Database(#[from] DatabaseParseError),

    #[error("error deserializing frame payload")]
    Malformed(#[from] serde_json::Error),
}

/// The hub plus the lock everything shares. Writers are serialized; the
/// request side takes short read locks and works on copies.
pub type SharedHub = Arc<RwLock<CompetitionHub>>;

#[derive(Debug)]
struct FopEntry {
    update: FopUpdate,
    /// Bumps on every observable frame for this platform.
    version: u64,
    /// Bumps only when the cached portion of a view can change: updates
    /// and database frames. Clock and decision frames are overlaid at
    /// read time, so they leave this one alone and memoized views keep
    /// hitting.
    content_version: u64,
    phase: SessionPhase,
}

impl FopEntry {
    fn new(fop_name: &str) -> Self {
        FopEntry {
            update: FopUpdate::new(fop_name),
            version: 0,
            content_version: 0,
            phase: SessionPhase::Active,
        }
    }
}

/// Everything a projection needs to compute one view, copied out of the
/// hub so computation can run without holding any lock.
#[derive(Debug, Clone)]
pub struct FopSnapshot {
    pub version: u64,
    pub update: FopUpdate,
    pub database: DatabaseState,
    pub phase: SessionPhase,
}

/// The ephemeral clock/decision state that is overlaid at read time and
/// must never end up inside a cached projection payload.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LiveOverlay {
    pub athlete_timer: TimerState,
    pub break_timer: TimerState,
    pub decision: DecisionState,
}

/// The in-memory competition state store. Owns the database snapshot,
/// the per-platform merged updates with their version counters, and the
/// translation tables; everything else observes through accessors that
/// copy.
#[derive(Debug)]
pub struct CompetitionHub {
    database: Option<DatabaseState>,
    indexes: DatabaseIndexes,
    fops: HashMap<String, FopEntry>,
    translations: TranslationStore,
    emitter: EventEmitter,
    default_locale: String,
    ready_announced: bool,
}

impl CompetitionHub {
    pub fn new(default_locale: impl Into<String>) -> Self {
        CompetitionHub {
            database: None,
            indexes: DatabaseIndexes::default(),
            fops: HashMap::new(),
            translations: TranslationStore::new(),
            emitter: EventEmitter::default(),
            default_locale: default_locale.into(),
            ready_announced: false,
        }
    }

    pub fn into_shared(self) -> SharedHub {
        Arc::new(RwLock::new(self))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.emitter.subscribe()
    }

    /// The resource kinds still required before event frames are
    /// processed.
    pub fn missing_preconditions(&self) -> Vec<Precondition> {
        let mut missing = Vec::new();
        if self.database.is_none() {
            missing.push(Precondition::Database);
        }
        if !self.translations.has_any() {
            missing.push(Precondition::Translations);
        }
        missing
    }

    pub fn is_ready(&self) -> bool {
        self.missing_preconditions().is_empty()
    }

    /// Replace the global state from a `database` frame. Every known
    /// platform's version bumps, because rosters and ranks feed every
    /// projection.
    pub fn apply_database(&mut self, payload: &Value) -> Result<(), HubError> {
        let (state, format) = DatabaseState::parse(payload)?;
        info!(
            "Applying database frame ({} athletes, {} format)",
            state.athletes.len(),
            match format {
                DatabaseFormat::V2 => "2.0",
                DatabaseFormat::Legacy => "legacy",
            }
        );

        self.indexes = DatabaseIndexes::build(&state);

        // Platforms named by the competition exist from this moment even
        // if no update frame arrived for them yet.
        for fop_name in &state.competition.fops {
            self.fops
                .entry(fop_name.clone())
                .or_insert_with(|| FopEntry::new(fop_name));
        }

        self.database = Some(state);
        for entry in self.fops.values_mut() {
            entry.version += 1;
            entry.content_version += 1;
        }

        self.emitter.emit(HubEvent::Database);
        self.emitter.emit(HubEvent::DatabaseReady);
        self.announce_ready_if_complete();
        Ok(())
    }

    /// Merge an `update` frame into its platform.
    pub fn apply_update(&mut self, payload: &Value) -> Result<(), HubError> {
        let object = payload.as_object().ok_or(HubError::PayloadNotAnObject)?;
        let fop_name = require_fop_name(object)?;

        let entry = self.entry_mut(&fop_name);
        entry.update.merge_update(object)?;
        entry.version += 1;
        entry.content_version += 1;
        debug!(
            "Merged update for {fop_name}, version now {}",
            entry.version
        );

        let phase_change = entry.phase.on_update(&entry.update.ui_event);
        let session_name = entry.update.session_name.clone();
        let session_athletes = entry.update.session_athletes.clone();

        // Keep the roster's attempt results fresh between full dumps.
        if let Some(database) = &mut self.database {
            patch_athlete_results(database, &self.indexes, &session_athletes);
        }

        self.emitter.emit(HubEvent::Update {
            fop: fop_name.clone(),
        });
        self.emit_phase_change(phase_change, &fop_name, &session_name);
        Ok(())
    }

    /// Merge a `timer` frame: clocks only, ordering untouched.
    pub fn apply_timer(&mut self, payload: &Value) -> Result<(), HubError> {
        let object = payload.as_object().ok_or(HubError::PayloadNotAnObject)?;
        let fop_name = require_fop_name(object)?;
        let entry = self.entry_mut(&fop_name);
        entry.update.merge_timer(object);
        entry.version += 1;

        let phase_change = entry.phase.on_activity();
        let session_name = entry.update.session_name.clone();

        self.emitter.emit(HubEvent::Timer {
            fop: fop_name.clone(),
        });
        self.emit_phase_change(phase_change, &fop_name, &session_name);
        Ok(())
    }

    /// Merge a `decision` frame: decision substate only. The ordering
    /// does not change until the update frame that follows; the version
    /// still bumps so cached views re-key once.
    pub fn apply_decision(&mut self, payload: &Value) -> Result<(), HubError> {
        let object = payload.as_object().ok_or(HubError::PayloadNotAnObject)?;
        let fop_name = require_fop_name(object)?;
        let entry = self.entry_mut(&fop_name);
        entry.update.merge_decision(object);
        entry.version += 1;

        let phase_change = entry.phase.on_activity();
        let session_name = entry.update.session_name.clone();

        self.emitter.emit(HubEvent::Decision {
            fop: fop_name.clone(),
        });
        self.emit_phase_change(phase_change, &fop_name, &session_name);
        Ok(())
    }

    /// Merge a bulk translation delivery. Returns whether the tables
    /// were actually (re)processed.
    pub fn ingest_translations(
        &mut self,
        locales: HashMap<String, HashMap<String, String>>,
        declared_checksum: Option<&str>,
    ) -> bool {
        let processed = self.translations.ingest_bulk(locales, declared_checksum);
        self.announce_ready_if_complete();
        processed
    }

    /// Emit the loaded event for an extracted resource bundle.
    pub fn notify_bundle_loaded(&self, kind: BundleKind, count: usize) {
        self.emitter.emit(match kind {
            BundleKind::FlagsZip => HubEvent::FlagsLoaded { count },
            BundleKind::LogosZip => HubEvent::LogosLoaded { count },
            BundleKind::PicturesZip => HubEvent::PicturesLoaded { count },
            BundleKind::Styles => HubEvent::StylesLoaded { count },
            BundleKind::TranslationsZip => HubEvent::TranslationsLoaded { count },
        });
    }

    pub fn fop_state_version(&self, fop_name: &str) -> u64 {
        self.fops.get(fop_name).map(|entry| entry.version).unwrap_or(0)
    }

    /// The version memoized views key on. Trails `fop_state_version`
    /// whenever only clocks or decisions have moved.
    pub fn projection_version(&self, fop_name: &str) -> u64 {
        self.fops
            .get(fop_name)
            .map(|entry| entry.content_version)
            .unwrap_or(0)
    }

    pub fn session_phase(&self, fop_name: &str) -> SessionPhase {
        self.fops
            .get(fop_name)
            .map(|entry| entry.phase)
            .unwrap_or_default()
    }

    /// All platforms: the ones the competition declares plus the ones
    /// we've seen frames for.
    pub fn fop_names(&self) -> Vec<String> {
        self.fops
            .keys()
            .cloned()
            .chain(
                self.database
                    .iter()
                    .flat_map(|db| db.competition.fops.iter().cloned()),
            )
            .unique()
            .sorted()
            .collect()
    }

    /// Copy out everything a projection needs. None until a database has
    /// arrived; an unknown platform yields an empty update at version 0.
    pub fn snapshot(&self, fop_name: &str) -> Option<FopSnapshot> {
        let database = self.database.clone()?;
        let (version, update, phase) = match self.fops.get(fop_name) {
            Some(entry) => (entry.version, entry.update.clone(), entry.phase),
            None => (0, FopUpdate::new(fop_name), SessionPhase::Active),
        };
        Some(FopSnapshot {
            version,
            update,
            database,
            phase,
        })
    }

    /// The cheap read: just the clock and decision substates, for
    /// overlaying onto cached views.
    pub fn live_overlay(&self, fop_name: &str) -> LiveOverlay {
        match self.fops.get(fop_name) {
            Some(entry) => LiveOverlay {
                athlete_timer: entry.update.athlete_timer,
                break_timer: entry.update.break_timer,
                decision: entry.update.decision,
            },
            None => LiveOverlay::default(),
        }
    }

    pub fn athlete(&self, key: &AthleteKey) -> Option<Athlete> {
        let database = self.database.as_ref()?;
        self.indexes
            .athletes_by_key
            .get(key)
            .and_then(|&index| database.athletes.get(index))
            .cloned()
    }

    pub fn team_name(&self, team_id: i64) -> Option<String> {
        self.indexes.team_names.get(&team_id).cloned()
    }

    pub fn age_group_of(&self, category: &str) -> Option<String> {
        self.indexes.age_group_by_category.get(category).cloned()
    }

    pub fn translations(&self, locale: &str) -> HashMap<String, String> {
        self.translations.lookup(locale, &self.default_locale)
    }

    pub fn translation_locales(&self) -> Vec<String> {
        self.translations.locale_names()
    }

    pub fn translation_checksum_mismatches(&self) -> u64 {
        self.translations.checksum_mismatches()
    }

    pub fn default_locale(&self) -> &str {
        &self.default_locale
    }

    fn entry_mut(&mut self, fop_name: &str) -> &mut FopEntry {
        self.fops
            .entry(fop_name.to_owned())
            .or_insert_with(|| FopEntry::new(fop_name))
    }

    fn emit_phase_change(&self, change: Option<PhaseChange>, fop: &str, session: &str) {
        match change {
            Some(PhaseChange::BecameDone) => self.emitter.emit(HubEvent::SessionDone {
                fop: fop.to_owned(),
                session: session.to_owned(),
            }),
            Some(PhaseChange::Reopened) => self.emitter.emit(HubEvent::SessionReopened {
                fop: fop.to_owned(),
                session: session.to_owned(),
            }),
            None => {}
        }
    }

    fn announce_ready_if_complete(&mut self) {
        if !self.ready_announced && self.is_ready() {
            info!("Hub is ready: database and translations are both present");
            self.ready_announced = true;
            self.emitter.emit(HubEvent::HubReady);
        }
    }
}

fn require_fop_name(object: &serde_json::Map<String, Value>) -> Result<String, HubError> {
    object
        .get("fopName")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or(HubError::MissingFopName)
}

/// The patch-back scope between full database dumps: per-slot attempt
/// fields and the rank block. Identity fields stay untouched until the
/// next full dump.
fn patch_athlete_results(
    database: &mut DatabaseState,
    indexes: &DatabaseIndexes,
    session_athletes: &[SessionAthlete],
) {
    for session_athlete in session_athletes {
        let Some(&index) = indexes.athletes_by_key.get(&session_athlete.athlete.key) else {
            continue;
        };
        let Some(athlete) = database.athletes.get_mut(index) else {
            continue;
        };
        athlete.snatch = session_athlete.athlete.snatch.clone();
        athlete.clean_jerk = session_athlete.athlete.clean_jerk.clone();
        athlete.ranks = session_athlete.athlete.ranks;
    }
}
