use crate::athlete::Gender;
use serde::{Deserialize, Serialize};

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
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordKind {
    Snatch,
    #[serde(rename = "CLEANJERK")]
    #[strum(serialize = "CLEANJERK")]
    CleanJerk,
    Total,
}

/// One record holder line of the records board. `session_name` is empty
/// for records that predate this meet and carries the session in which a
/// new record was just set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEntry {
    pub federation: String,
    pub kind: RecordKind,
    pub gender: Gender,
    pub bw_lower: f64,
    pub bw_upper: f64,
    pub age_lower: i32,
    pub age_upper: i32,
    pub value: f64,
    pub holder: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub session_name: String,
}

impl RecordEntry {
    /// Whether an athlete of this gender, age, and body weight lifts
    /// inside this record's band.
    pub fn applies_to(&self, gender: Gender, age: i32, body_weight: f64) -> bool {
        self.gender == gender
            && (self.age_lower..=self.age_upper).contains(&age)
            && body_weight > self.bw_lower
            && body_weight <= self.bw_upper
    }

    /// Whether this record was set during the current meet.
    pub fn set_this_meet(&self) -> bool {
        !self.session_name.is_empty()
    }
}
