use crate::athlete::{Athlete, AthleteKey, AttemptCell, json_scalar_string};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Row styling for a session athlete. The running session's styling is
/// computed upstream and relayed verbatim; locally constructed rows stay
/// unstyled.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum RowClass {
    #[default]
    #[serde(rename = "")]
    #[strum(serialize = "")]
    None,
    Current,
    CurrentBlink,
    Next,
    GoodLift,
    NoLift,
    Waiting,
    Finished,
}

/// Display-ready athlete row scoped to one session and moment: the raw
/// registration record plus everything the scoreboard needs precomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionAthlete {
    #[serde(flatten)]
    pub athlete: Athlete,
    #[serde(default)]
    pub attempts: Vec<AttemptCell>,
    #[serde(default)]
    pub best_snatch: f64,
    #[serde(default)]
    pub best_clean_jerk: f64,
    #[serde(default)]
    pub total: f64,
    #[serde(default)]
    pub sinclair: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<i32>,
    #[serde(default)]
    pub classname: RowClass,
}

impl SessionAthlete {
    /// Build a compatible row from raw registration fields, for athletes
    /// that are not part of the running session and therefore have no
    /// upstream-computed snapshot.
    pub fn from_athlete(athlete: &Athlete) -> Self {
        SessionAthlete {
            attempts: athlete.attempt_cells(),
            best_snatch: athlete.best_snatch(),
            best_clean_jerk: athlete.best_clean_jerk(),
            total: athlete.total(),
            sinclair: 0.0,
            rank: None,
            classname: RowClass::None,
            athlete: athlete.clone(),
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
pub enum TimerEventKind {
    #[serde(rename = "StartTime", alias = "Start")]
    Start,
    #[serde(rename = "StopTime", alias = "Stop")]
    Stop,
    #[default]
    #[serde(rename = "SetTime", alias = "Set")]
    Set,
}

/// Clock substate for the athlete or break timer. Merged wholesale from
/// timer frames and deliberately excluded from cached projection
/// payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimerState {
    pub event_type: TimerEventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub millis_remaining: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_millis: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
}

impl TimerState {
    pub fn is_running(&self) -> bool {
        self.event_type == TimerEventKind::Start
    }

    /// The read-time view shape overlaid onto every projection response.
    pub fn view(&self) -> TimerView {
        TimerView {
            state: match self.event_type {
                TimerEventKind::Start => "running",
                TimerEventKind::Stop => "stopped",
                TimerEventKind::Set => "set",
            },
            time_remaining: self.millis_remaining,
            duration: self.duration,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerView {
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_remaining: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
pub enum DecisionEventKind {
    FullDecision,
    #[default]
    Reset,
    DownSignal,
}

/// Referee decision substate. Like the timers, merged wholesale and
/// never cached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DecisionState {
    pub event_type: DecisionEventKind,
    pub referee_votes: [Option<bool>; 3],
    pub visible: bool,
    pub down: bool,
}

impl DecisionState {
    /// Majority of the three referees, once all have voted.
    pub fn verdict(&self) -> Option<bool> {
        let votes: Vec<bool> = self.referee_votes.iter().flatten().copied().collect();
        if votes.len() < 3 {
            return None;
        }
        let good = votes.iter().filter(|v| **v).count();
        Some(good >= 2)
    }
}

/// One slot of a start or lifting order: an athlete reference, or a
/// spacer marking a category / lift-type boundary for renderers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OrderEntry {
    Spacer { spacer: String },
    Athlete(AthleteKey),
}

impl OrderEntry {
    pub fn athlete_key(&self) -> Option<&AthleteKey> {
        match self {
            OrderEntry::Athlete(key) => Some(key),
            OrderEntry::Spacer { .. } => None,
        }
    }
}

/// The latest merged state of one platform. Updates are merged field by
/// field, last write wins: a key absent from an incoming payload leaves
/// the previous value in place, which is what keeps a running timer
/// alive across a pure lifting-order change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FopUpdate {
    pub fop_name: String,
    pub competition_name: String,
    pub session_name: String,
    pub fop_state: String,
    pub break_type: String,
    pub ui_event: String,
    pub current_athlete_key: Option<AthleteKey>,
    pub next_athlete_key: Option<AthleteKey>,
    pub previous_athlete_key: Option<AthleteKey>,
    pub session_athletes: Vec<SessionAthlete>,
    pub start_order: Vec<OrderEntry>,
    pub lifting_order: Vec<OrderEntry>,
    pub athlete_timer: TimerState,
    pub break_timer: TimerState,
    pub decision: DecisionState,
}

impl FopUpdate {
    pub fn new(fop_name: impl Into<String>) -> Self {
        FopUpdate {
            fop_name: fop_name.into(),
            ..Default::default()
        }
    }

    /// Merge an `update` payload. Only keys present in the payload are
    /// touched.
    pub fn merge_update(&mut self, payload: &Map<String, Value>) -> Result<(), serde_json::Error> {
        merge_string(payload, "competitionName", &mut self.competition_name);
        if !merge_string(payload, "sessionName", &mut self.session_name) {
            merge_string(payload, "groupName", &mut self.session_name);
        }
        merge_string(payload, "fopState", &mut self.fop_state);
        merge_string(payload, "breakType", &mut self.break_type);
        merge_string(payload, "uiEvent", &mut self.ui_event);

        if let Some(value) = payload.get("sessionAthletes") {
            self.session_athletes = serde_json::from_value(value.clone())?;
        }

        let mut orders_changed = false;
        if let Some(value) = payload.get("startOrderKeys") {
            self.start_order = serde_json::from_value(value.clone())?;
            orders_changed = true;
        }
        if let Some(value) = payload.get("liftingOrderKeys") {
            self.lifting_order = serde_json::from_value(value.clone())?;
            orders_changed = true;
        }
        self.drop_unresolvable_order_keys();

        let explicit_current = merge_key(payload, "currentAthleteKey", &mut self.current_athlete_key);
        let explicit_next = merge_key(payload, "nextAthleteKey", &mut self.next_athlete_key);
        merge_key(payload, "previousAthleteKey", &mut self.previous_athlete_key);

        if orders_changed {
            // A reordered payload that doesn't spell out the head of the
            // order still needs current/next to track it.
            let mut lifting = self
                .lifting_order
                .iter()
                .filter_map(OrderEntry::athlete_key);
            let derived_current = lifting.next().cloned();
            let derived_next = lifting.next().cloned();
            if !explicit_current {
                self.current_athlete_key = derived_current;
            }
            if !explicit_next {
                self.next_athlete_key = derived_next;
            }
        }

        // Timer and decision keys are allowed to piggyback on updates;
        // same last-write-wins rule.
        self.merge_timer(payload);
        self.merge_decision(payload);
        Ok(())
    }

    /// Merge a `timer` payload: clock substates only, ordering untouched.
    pub fn merge_timer(&mut self, payload: &Map<String, Value>) {
        merge_timer_state(
            payload,
            &mut self.athlete_timer,
            "athleteTimerEventType",
            "athleteMillisRemaining",
            "athleteStartMillis",
            "timeAllowed",
        );
        merge_timer_state(
            payload,
            &mut self.break_timer,
            "breakTimerEventType",
            "breakMillisRemaining",
            "breakStartMillis",
            "breakTimeAllowed",
        );
    }

    /// Merge a `decision` payload: decision substate only, ordering
    /// untouched.
    pub fn merge_decision(&mut self, payload: &Map<String, Value>) {
        if let Some(value) = payload.get("decisionEventType") {
            if let Ok(kind) = serde_json::from_value(value.clone()) {
                self.decision.event_type = kind;
            } else {
                warn!("Ignoring unrecognized decisionEventType {value}");
            }
        }
        if let Some(value) = payload.get("refereeVotes") {
            match serde_json::from_value(value.clone()) {
                Ok(votes) => self.decision.referee_votes = votes,
                Err(_) => warn!("Ignoring malformed refereeVotes {value}"),
            }
        }
        if let Some(visible) = payload.get("decisionsVisible").and_then(Value::as_bool) {
            self.decision.visible = visible;
        }
        if let Some(down) = payload.get("down").and_then(Value::as_bool) {
            self.decision.down = down;
        }
    }

    pub fn session_athlete(&self, key: &AthleteKey) -> Option<&SessionAthlete> {
        self.session_athletes.iter().find(|a| a.athlete.key == *key)
    }

    pub fn current_athlete(&self) -> Option<&SessionAthlete> {
        self.current_athlete_key
            .as_ref()
            .and_then(|key| self.session_athlete(key))
    }

    /// Order arrays may only reference athletes the session list knows
    /// about; anything else is an upstream inconsistency we drop early so
    /// downstream code can index fearlessly.
    fn drop_unresolvable_order_keys(&mut self) {
        let known: Vec<&AthleteKey> = self.session_athletes.iter().map(|a| &a.athlete.key).collect();
        for order in [&mut self.start_order, &mut self.lifting_order] {
            order.retain(|entry| match entry.athlete_key() {
                Some(key) if !known.contains(&key) => {
                    warn!("Dropping order entry for unknown athlete key {key}");
                    false
                }
                _ => true,
            });
        }
    }
}

/// Returns whether the key was present (even as null).
fn merge_string(payload: &Map<String, Value>, key: &str, target: &mut String) -> bool {
    match payload.get(key) {
        Some(value) => {
            *target = json_scalar_string(value);
            true
        }
        None => false,
    }
}

/// Merge an athlete-key field. An explicit null clears it; absence leaves
/// it alone. Returns whether the key was present.
fn merge_key(payload: &Map<String, Value>, key: &str, target: &mut Option<AthleteKey>) -> bool {
    match payload.get(key) {
        Some(Value::Null) => {
            *target = None;
            true
        }
        Some(value) => match AthleteKey::from_json(value) {
            Some(parsed) => {
                *target = Some(parsed);
                true
            }
            None => {
                warn!("Ignoring malformed athlete key in {key}: {value}");
                false
            }
        },
        None => false,
    }
}

fn merge_timer_state(
    payload: &Map<String, Value>,
    timer: &mut TimerState,
    event_key: &str,
    millis_key: &str,
    start_key: &str,
    duration_key: &str,
) {
    if let Some(value) = payload.get(event_key) {
        if let Ok(kind) = serde_json::from_value(value.clone()) {
            timer.event_type = kind;
        } else {
            warn!("Ignoring unrecognized {event_key} {value}");
        }
    }
    if let Some(ms) = payload.get(millis_key).and_then(Value::as_i64) {
        timer.millis_remaining = Some(ms);
    }
    if let Some(ms) = payload.get(start_key).and_then(Value::as_i64) {
        timer.start_millis = Some(ms);
    }
    if let Some(ms) = payload.get(duration_key).and_then(Value::as_i64) {
        timer.duration = Some(ms);
    }
}
