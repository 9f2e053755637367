mod attempt_board;
mod lifting_order;
mod medals;
mod records_board;
mod results;
mod scoreboard;
mod sinclair_ranking;
pub mod support;
mod team_ranking;

pub use attempt_board::AttemptBoard;
pub use lifting_order::LiftingOrder;
pub use medals::Medals;
pub use records_board::RecordsBoard;
pub use results::Results;
pub use scoreboard::Scoreboard;
pub use sinclair_ranking::SinclairRanking;
pub use team_ranking::TeamRanking;

use crate::cache::{CacheRegistry, DEFAULT_CACHE_CAPACITY, ProjectionCache, cache_key};
use chrono::{DateTime, Utc};
use liftboard_hub::{FopSnapshot, LiveOverlay, SharedHub};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// The closed set of option value types a projection may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OptionType {
    String,
    Number,
    Boolean,
    Enum,
}

/// A parsed option value. Canonical display order comes from the
/// `BTreeMap` holding them, which is what makes cache keys stable.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl OptionValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            OptionValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_usize(&self) -> Option<usize> {
        self.as_f64().filter(|n| *n >= 0.0).map(|n| n as usize)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(b) => b.fmt(f),
            OptionValue::Number(n) if n.fract() == 0.0 => (*n as i64).fmt(f),
            OptionValue::Number(n) => n.fmt(f),
            OptionValue::String(s) => s.fmt(f),
        }
    }
}

pub type Options = BTreeMap<String, OptionValue>;

/// One declared option of a projection, as surfaced by the discovery
/// action.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionSpec {
    pub key: &'static str,
    pub label: &'static str,
    #[serde(rename = "type")]
    pub kind: OptionType,
    pub default: OptionValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<&'static str>>,
}

impl OptionSpec {
    pub fn number(key: &'static str, label: &'static str, default: f64) -> Self {
        Self {
            key,
            label,
            kind: OptionType::Number,
            default: OptionValue::Number(default),
            min: None,
            max: None,
            choices: None,
        }
    }

    pub fn bounded(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn boolean(key: &'static str, label: &'static str, default: bool) -> Self {
        Self {
            key,
            label,
            kind: OptionType::Boolean,
            default: OptionValue::Bool(default),
            min: None,
            max: None,
            choices: None,
        }
    }

    pub fn string(key: &'static str, label: &'static str, default: &str) -> Self {
        Self {
            key,
            label,
            kind: OptionType::String,
            default: OptionValue::String(default.to_owned()),
            min: None,
            max: None,
            choices: None,
        }
    }

    pub fn choice(
        key: &'static str,
        label: &'static str,
        choices: Vec<&'static str>,
        default: &'static str,
    ) -> Self {
        Self {
            key,
            label,
            kind: OptionType::Enum,
            default: OptionValue::String(default.to_owned()),
            min: None,
            max: None,
            choices: Some(choices),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum OptionError {
    #[error("unknown option {0:?}")]
    Unknown(String),

    #[error("option {key:?} expects a {expected} value")]
    WrongType { key: String, expected: OptionType },

    #[error("option {key:?} must be between {min} and {max}")]
    OutOfRange { key: String, min: f64, max: f64 },

    #[error("option {key:?} must be one of {choices:?}")]
    NotAChoice {
        key: String,
        choices: Vec<&'static str>,
    },
}

/// Validate raw query parameters against a projection's schema, filling
/// defaults for anything omitted. Anything undeclared is rejected.
pub fn parse_options(
    specs: &[OptionSpec],
    raw: &BTreeMap<String, String>,
) -> Result<Options, OptionError> {
    for key in raw.keys() {
        if !specs.iter().any(|spec| spec.key == key) {
            return Err(OptionError::Unknown(key.clone()));
        }
    }

    let mut options = Options::new();
    for spec in specs {
        let value = match raw.get(spec.key) {
            None => spec.default.clone(),
            Some(raw_value) => match spec.kind {
                OptionType::Number => {
                    let parsed: f64 =
                        raw_value.parse().map_err(|_| OptionError::WrongType {
                            key: spec.key.to_owned(),
                            expected: OptionType::Number,
                        })?;
                    if let (Some(min), Some(max)) = (spec.min, spec.max) {
                        if parsed < min || parsed > max {
                            return Err(OptionError::OutOfRange {
                                key: spec.key.to_owned(),
                                min,
                                max,
                            });
                        }
                    }
                    OptionValue::Number(parsed)
                }
                OptionType::Boolean => match raw_value.as_str() {
                    "true" | "1" => OptionValue::Bool(true),
                    "false" | "0" => OptionValue::Bool(false),
                    _ => {
                        return Err(OptionError::WrongType {
                            key: spec.key.to_owned(),
                            expected: OptionType::Boolean,
                        });
                    }
                },
                OptionType::String => OptionValue::String(raw_value.clone()),
                OptionType::Enum => {
                    let choices = spec.choices.clone().unwrap_or_default();
                    if !choices.contains(&raw_value.as_str()) {
                        return Err(OptionError::NotAChoice {
                            key: spec.key.to_owned(),
                            choices,
                        });
                    }
                    OptionValue::String(raw_value.clone())
                }
            },
        };
        options.insert(spec.key.to_owned(), value);
    }
    Ok(options)
}

/// Canonical `k=v&k=v` form of parsed options, in key order.
pub fn canonical_options(options: &Options) -> String {
    options
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct ProjectionError(pub String);

/// What a projection gets to work with: an immutable snapshot plus the
/// resolved options and translation table. No clock or decision state
/// in here on purpose; that arrives as a read-time overlay.
pub struct ProjectionContext<'a> {
    pub snapshot: &'a FopSnapshot,
    pub options: &'a Options,
    pub locale: &'a str,
    pub translations: &'a hashbrown::HashMap<String, String>,
}

impl ProjectionContext<'_> {
    /// Translate a label key, falling back to the key itself.
    pub fn translate<'k>(&'k self, key: &'k str) -> &'k str {
        self.translations.get(key).map(String::as_str).unwrap_or(key)
    }
}

/// A named pure view over hub state.
pub trait Projection: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn options(&self) -> Vec<OptionSpec> {
        Vec::new()
    }
    fn project(&self, ctx: &ProjectionContext<'_>) -> Result<serde_json::Value, ProjectionError>;
}

/// Discovery listing of one projection.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreboardInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub options: Vec<OptionSpec>,
}

/// A successful projection query response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub success: bool,
    #[serde(rename = "type")]
    pub kind: String,
    pub fop: String,
    pub options: Options,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Everything a projection query can come back with. The API layer maps
/// these onto status codes and body shapes.
#[derive(Debug)]
pub enum QueryOutcome {
    Ok(Box<QueryResponse>),
    Waiting,
    UnknownProjection,
    InvalidOptions(OptionError),
    Failed(String),
}

struct ProjectionSlot {
    projection: Arc<dyn Projection>,
    cache: Arc<ProjectionCache>,
}

/// Hosts the registered projections, memoizes their output per
/// `(projection, fop, version, options, locale)`, and overlays the live
/// clock/decision state onto every response.
pub struct ViewHost {
    hub: SharedHub,
    registry: Arc<CacheRegistry>,
    slots: Vec<ProjectionSlot>,
}

impl ViewHost {
    pub fn new(hub: SharedHub, projections: Vec<Arc<dyn Projection>>) -> Self {
        let registry = Arc::new(CacheRegistry::new());
        let slots = projections
            .into_iter()
            .map(|projection| {
                let cache = Arc::new(ProjectionCache::new(
                    projection.name(),
                    DEFAULT_CACHE_CAPACITY,
                ));
                registry.register(cache.clone());
                ProjectionSlot { projection, cache }
            })
            .collect();
        Self {
            hub,
            registry,
            slots,
        }
    }

    /// The standard projection set.
    pub fn with_default_projections(hub: SharedHub) -> Self {
        Self::new(
            hub,
            vec![
                Arc::new(Scoreboard),
                Arc::new(LiftingOrder),
                Arc::new(Results),
                Arc::new(TeamRanking),
                Arc::new(SinclairRanking),
                Arc::new(Medals),
                Arc::new(RecordsBoard),
                Arc::new(AttemptBoard),
            ],
        )
    }

    pub fn registry(&self) -> Arc<CacheRegistry> {
        self.registry.clone()
    }

    pub fn list(&self) -> Vec<ScoreboardInfo> {
        self.slots
            .iter()
            .map(|slot| ScoreboardInfo {
                name: slot.projection.name(),
                description: slot.projection.description(),
                options: slot.projection.options(),
            })
            .collect()
    }

    /// Serve one projection query. Cache hits never recompute the view;
    /// both paths get the live overlay stitched into `data`.
    pub fn query(
        &self,
        name: &str,
        fop: &str,
        raw_options: &BTreeMap<String, String>,
        locale_override: Option<&str>,
    ) -> QueryOutcome {
        let Some(slot) = self.slots.iter().find(|slot| slot.projection.name() == name) else {
            return QueryOutcome::UnknownProjection;
        };

        let options = match parse_options(&slot.projection.options(), raw_options) {
            Ok(options) => options,
            Err(err) => return QueryOutcome::InvalidOptions(err),
        };

        // First, the cheap reads under a short lock.
        let (version, overlay, locale) = {
            let hub = self.hub.read().expect("hub lock poisoned");
            if !hub.is_ready() {
                return QueryOutcome::Waiting;
            }
            let locale = locale_override.unwrap_or(hub.default_locale()).to_owned();
            (hub.projection_version(fop), hub.live_overlay(fop), locale)
        };

        let key = cache_key(name, fop, version, &canonical_options(&options), &locale);
        let data = match slot.cache.get(&key) {
            Some(cached) => cached,
            None => {
                // Copy the slice we need, then compute without the lock.
                let (snapshot, translations) = {
                    let hub = self.hub.read().expect("hub lock poisoned");
                    match hub.snapshot(fop) {
                        Some(snapshot) => (snapshot, hub.translations(&locale)),
                        None => return QueryOutcome::Waiting,
                    }
                };
                let ctx = ProjectionContext {
                    snapshot: &snapshot,
                    options: &options,
                    locale: &locale,
                    translations: &translations,
                };
                match slot.projection.project(&ctx) {
                    Ok(value) if value.is_object() => {
                        slot.cache.insert(key, value.clone());
                        value
                    }
                    Ok(_) => {
                        return QueryOutcome::Failed(format!(
                            "projection {name} produced a non-object view"
                        ));
                    }
                    Err(err) => return QueryOutcome::Failed(err.to_string()),
                }
            }
        };

        QueryOutcome::Ok(Box::new(QueryResponse {
            success: true,
            kind: name.to_owned(),
            fop: fop.to_owned(),
            options,
            data: overlay_live_state(data, &overlay),
            timestamp: Utc::now(),
        }))
    }
}

/// Stitch the ephemeral substates into a view object. The cached copy
/// never contains them, so this cannot double-apply.
fn overlay_live_state(mut data: serde_json::Value, overlay: &LiveOverlay) -> serde_json::Value {
    if let Some(object) = data.as_object_mut() {
        object.insert(
            "timer".to_owned(),
            serde_json::to_value(overlay.athlete_timer.view())
                .expect("timer view serialization cannot fail"),
        );
        object.insert(
            "breakTimer".to_owned(),
            serde_json::to_value(overlay.break_timer.view())
                .expect("timer view serialization cannot fail"),
        );
        object.insert(
            "decision".to_owned(),
            serde_json::to_value(overlay.decision)
                .expect("decision serialization cannot fail"),
        );
    }
    data
}
