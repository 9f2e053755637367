use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Athlete keys come off the wire as integers or strings, and synthetic
/// athletes (spacers excepted) can carry negative integers. Two keys are
/// the same athlete only if they are the same variant and value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AthleteKey {
    Int(i64),
    Str(String),
}

impl AthleteKey {
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_i64().map(AthleteKey::Int),
            serde_json::Value::String(s) => Some(AthleteKey::Str(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for AthleteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AthleteKey::Int(n) => n.fmt(f),
            AthleteKey::Str(s) => s.fmt(f),
        }
    }
}

impl From<i64> for AthleteKey {
    fn from(n: i64) -> Self {
        AthleteKey::Int(n)
    }
}

impl From<&str> for AthleteKey {
    fn from(s: &str) -> Self {
        AthleteKey::Str(s.to_owned())
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
pub enum Gender {
    M,
    F,
}

/// Birth information arrives either as a bare year or a full date,
/// depending on what the federation's registration system exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BirthDate {
    Year(i32),
    Date(NaiveDate),
}

impl BirthDate {
    pub fn year(&self) -> i32 {
        match self {
            BirthDate::Year(y) => *y,
            BirthDate::Date(d) => {
                use chrono::Datelike;
                d.year()
            }
        }
    }
}

/// The raw weight fields of one attempt slot, as registered. Values are
/// kept in their wire string form; empty means the field was never set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttemptFields {
    #[serde(
        skip_serializing_if = "String::is_empty",
        deserialize_with = "weight_string"
    )]
    pub declaration: String,
    #[serde(
        skip_serializing_if = "String::is_empty",
        deserialize_with = "weight_string"
    )]
    pub change1: String,
    #[serde(
        skip_serializing_if = "String::is_empty",
        deserialize_with = "weight_string"
    )]
    pub change2: String,
    #[serde(
        skip_serializing_if = "String::is_empty",
        deserialize_with = "weight_string"
    )]
    pub actual_lift: String,
    #[serde(
        skip_serializing_if = "String::is_empty",
        deserialize_with = "weight_string"
    )]
    pub automatic_progression: String,
}

impl AttemptFields {
    /// The recorded result: positive weight for a good lift, negative for
    /// a miss. None while the attempt hasn't happened ("0" and "-0" count
    /// as not happened).
    pub fn actual(&self) -> Option<f64> {
        nonzero_weight(&self.actual_lift)
    }

    /// The weight currently requested for this slot: latest change wins,
    /// falling back through the declaration to the automatic progression.
    pub fn requested(&self) -> Option<f64> {
        nonzero_weight(&self.change2)
            .or_else(|| nonzero_weight(&self.change1))
            .or_else(|| nonzero_weight(&self.declaration))
            .or_else(|| nonzero_weight(&self.automatic_progression))
    }

    /// Project this slot into its display cell.
    pub fn cell(&self) -> AttemptCell {
        if let Some(v) = self.actual() {
            if v < 0.0 {
                AttemptCell {
                    status: AttemptStatus::Fail,
                    display_value: format!("({})", format_weight(-v)),
                    highlight_class: String::new(),
                }
            } else {
                AttemptCell {
                    status: AttemptStatus::Good,
                    display_value: format_weight(v),
                    highlight_class: String::new(),
                }
            }
        } else if let Some(w) = self.requested() {
            AttemptCell {
                status: AttemptStatus::Request,
                display_value: format_weight(w),
                highlight_class: String::new(),
            }
        } else {
            AttemptCell::default()
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AttemptStatus {
    #[default]
    Empty,
    Request,
    Good,
    Fail,
}

/// A display-ready attempt: what the cell shows and how it is styled.
/// For athletes in the running session the styling comes from upstream
/// verbatim; cells built locally never carry a highlight.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttemptCell {
    pub status: AttemptStatus,
    pub display_value: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub highlight_class: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AthleteRanks {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snatch: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clean_jerk: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<i32>,
}

/// One competitor's registration and lift results. This is the
/// authoritative record; per-session display snapshots reference it by
/// key and never point back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Athlete {
    pub key: AthleteKey,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub gender: Gender,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth: Option<BirthDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<i64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub team_name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub session_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_number: Option<i32>,
    #[serde(default, deserialize_with = "weight_string")]
    pub lot_number: String,
    #[serde(default)]
    pub snatch: [AttemptFields; 3],
    #[serde(default)]
    pub clean_jerk: [AttemptFields; 3],
    #[serde(default)]
    pub ranks: AthleteRanks,
}

impl Athlete {
    /// Scoreboard name form: family name uppercased, then given name.
    pub fn display_name(&self) -> String {
        format!("{}, {}", self.last_name.to_uppercase(), self.first_name)
    }

    pub fn best_snatch(&self) -> f64 {
        best_of(&self.snatch)
    }

    pub fn best_clean_jerk(&self) -> f64 {
        best_of(&self.clean_jerk)
    }

    /// Snatch + clean & jerk, but only once both lifts have a successful
    /// attempt on the books.
    pub fn total(&self) -> f64 {
        let (s, cj) = (self.best_snatch(), self.best_clean_jerk());
        if s > 0.0 && cj > 0.0 { s + cj } else { 0.0 }
    }

    /// All six display cells, snatch first.
    pub fn attempt_cells(&self) -> Vec<AttemptCell> {
        self.snatch
            .iter()
            .chain(self.clean_jerk.iter())
            .map(AttemptFields::cell)
            .collect()
    }

    pub fn birth_year(&self) -> Option<i32> {
        self.birth.as_ref().map(BirthDate::year)
    }
}

fn best_of(attempts: &[AttemptFields; 3]) -> f64 {
    attempts
        .iter()
        .filter_map(AttemptFields::actual)
        .filter(|v| *v > 0.0)
        .fold(0.0, f64::max)
}

/// Parse a raw weight field, treating empty, unparseable, and zero (of
/// either sign) as "not present".
pub fn nonzero_weight(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v != 0.0 => Some(v),
        _ => None,
    }
}

/// Canonical display form of a weight: integral kilos without a decimal
/// point, anything else as parsed.
pub fn format_weight(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

/// Accepts a JSON string or number and yields the trimmed string form.
/// Registration exports are inconsistent about which one they send.
fn weight_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(json_scalar_string(&value))
}

/// The string form of a scalar JSON value; null and non-scalars are "".
pub fn json_scalar_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.trim().to_owned(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(declaration: &str, c1: &str, c2: &str, actual: &str) -> AttemptFields {
        AttemptFields {
            declaration: declaration.into(),
            change1: c1.into(),
            change2: c2.into(),
            actual_lift: actual.into(),
            automatic_progression: String::new(),
        }
    }

    #[test]
    fn declared_attempt_projects_as_request() {
        let cell = slot("120", "", "", "").cell();
        assert_eq!(cell.status, AttemptStatus::Request);
        assert_eq!(cell.display_value, "120");
    }

    #[test]
    fn failed_attempt_projects_in_parens() {
        let cell = slot("120", "", "", "-122").cell();
        assert_eq!(cell.status, AttemptStatus::Fail);
        assert_eq!(cell.display_value, "(122)");
    }

    #[test]
    fn good_attempt_projects_plain() {
        let cell = slot("120", "", "", "125").cell();
        assert_eq!(cell.status, AttemptStatus::Good);
        assert_eq!(cell.display_value, "125");
    }

    #[test]
    fn zero_actual_counts_as_not_attempted() {
        for zero in ["0", "-0"] {
            let cell = slot("", "", "", zero).cell();
            assert_eq!(cell.status, AttemptStatus::Empty);
            assert_eq!(cell.display_value, "");
        }
    }

    #[test]
    fn latest_change_wins_for_request() {
        let cell = slot("120", "123", "126", "").cell();
        assert_eq!(cell.display_value, "126");

        let cell = slot("120", "123", "", "").cell();
        assert_eq!(cell.display_value, "123");
    }

    #[test]
    fn automatic_progression_is_the_last_resort() {
        let fields = AttemptFields {
            automatic_progression: "131".into(),
            ..Default::default()
        };
        let cell = fields.cell();
        assert_eq!(cell.status, AttemptStatus::Request);
        assert_eq!(cell.display_value, "131");
    }

    #[test]
    fn exactly_one_status_per_cell() {
        // Actual beats pending changes: the slot is decided.
        let cell = slot("120", "123", "126", "-126").cell();
        assert_eq!(cell.status, AttemptStatus::Fail);
        assert_eq!(cell.display_value, "(126)");
    }

    fn athlete_with(snatch: [AttemptFields; 3], clean_jerk: [AttemptFields; 3]) -> Athlete {
        Athlete {
            key: AthleteKey::Int(1),
            first_name: "Karin".into(),
            last_name: "Freyova".into(),
            gender: Gender::F,
            body_weight: Some(63.4),
            birth: Some(BirthDate::Year(1998)),
            team_id: Some(7),
            team_name: String::new(),
            category: "SR_F64".into(),
            session_name: "F1".into(),
            start_number: Some(4),
            lot_number: "17".into(),
            snatch,
            clean_jerk,
            ranks: AthleteRanks::default(),
        }
    }

    #[test]
    fn best_lift_ignores_misses() {
        let athlete = athlete_with(
            [
                slot("90", "", "", "90"),
                slot("", "", "", "-94"),
                slot("", "", "", "94"),
            ],
            [
                slot("110", "", "", "-110"),
                slot("", "", "", "-110"),
                slot("", "", "", ""),
            ],
        );
        assert_eq!(athlete.best_snatch(), 94.0);
        assert_eq!(athlete.best_clean_jerk(), 0.0);
        // No clean & jerk made, so no total yet.
        assert_eq!(athlete.total(), 0.0);
    }

    #[test]
    fn total_needs_both_lifts() {
        let athlete = athlete_with(
            [
                slot("90", "", "", "90"),
                Default::default(),
                Default::default(),
            ],
            [
                slot("110", "", "", "112"),
                Default::default(),
                Default::default(),
            ],
        );
        assert_eq!(athlete.total(), 202.0);
    }

    #[test]
    fn display_name_uppercases_family_name() {
        let athlete = athlete_with(Default::default(), Default::default());
        assert_eq!(athlete.display_name(), "FREYOVA, Karin");
    }

    #[test]
    fn athlete_round_trips_through_json() {
        let athlete = athlete_with(
            [
                slot("90", "92", "", "-92"),
                Default::default(),
                Default::default(),
            ],
            Default::default(),
        );
        let json = serde_json::to_string(&athlete).unwrap();
        let back: Athlete = serde_json::from_str(&json).unwrap();
        assert_eq!(back, athlete);
    }

    #[test]
    fn numeric_wire_fields_become_strings() {
        let athlete: Athlete = serde_json::from_value(serde_json::json!({
            "key": -3,
            "firstName": "A",
            "lastName": "B",
            "gender": "M",
            "lotNumber": 12,
            "snatch": [{"declaration": 97}, {}, {}],
        }))
        .unwrap();
        assert_eq!(athlete.key, AthleteKey::Int(-3));
        assert_eq!(athlete.lot_number, "12");
        assert_eq!(athlete.snatch[0].declaration, "97");
    }
}
