use crate::athlete::{Athlete, AthleteKey};
#[cfg(feature = "legacy-database")]
use crate::athlete::{AttemptFields, BirthDate, Gender, json_scalar_string};
use crate::records::RecordEntry;
use hashbrown::HashMap;
#[cfg(feature = "legacy-database")]
use itertools::Itertools;
use log::warn;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum DatabaseParseError {
    #[error("database payload is not an object")]
    NotAnObject,

    #[error("database payload declares unsupported format {0:?}")]
    UnsupportedFormat(String),

    #[error("database payload has no format marker and legacy parsing is disabled")]
    LegacyDisabled,

    #[error("error deserializing database payload")]
    Malformed(#[from] serde_json::Error),
}

/// Which parser handled a database frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseFormat {
    V2,
    Legacy,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompetitionInfo {
    pub name: String,
    pub fops: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgeGroup {
    pub code: String,
    pub name: String,
    pub categories: Vec<String>,
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
    Deserialize,
    strum::Display,
)]
pub enum OfficialRole {
    Speaker,
    CompetitionSecretary,
    TechnicalController,
    Marshal,
    Timekeeper,
    Referee,
    Jury,
    Doctor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Official {
    pub role: OfficialRole,
    pub name: String,
}

/// Protocol-order sort for officials displays: announcing and technical
/// roles first, then the referees and jury, medical last. Stable within
/// a role.
pub fn sort_officials(officials: &mut [Official]) {
    officials.sort_by(|a, b| a.role.cmp(&b.role).then_with(|| a.name.cmp(&b.name)));
}

/// The global competition state: roster, teams, categories, records,
/// officials. Replaced atomically by each `database` frame and patched
/// with fresh attempt results in between.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseState {
    pub competition: CompetitionInfo,
    pub athletes: Vec<Athlete>,
    pub teams: Vec<Team>,
    pub age_groups: Vec<AgeGroup>,
    pub records: Vec<RecordEntry>,
    pub officials: Vec<Official>,
}

impl DatabaseState {
    /// Parse a `database` frame payload, picking the parser by the
    /// explicit format marker.
    pub fn parse(payload: &Value) -> Result<(Self, DatabaseFormat), DatabaseParseError> {
        let object = payload.as_object().ok_or(DatabaseParseError::NotAnObject)?;

        match object.get("formatVersion").and_then(Value::as_str) {
            Some("2.0") => {
                let mut state: DatabaseState = serde_json::from_value(payload.clone())?;
                state.finish_parse();
                Ok((state, DatabaseFormat::V2))
            }
            Some(other) => Err(DatabaseParseError::UnsupportedFormat(other.to_owned())),
            None => {
                #[cfg(feature = "legacy-database")]
                {
                    let mut state = parse_legacy(object)?;
                    state.finish_parse();
                    Ok((state, DatabaseFormat::Legacy))
                }
                #[cfg(not(feature = "legacy-database"))]
                Err(DatabaseParseError::LegacyDisabled)
            }
        }
    }

    /// Post-parse normalization shared by both formats: duplicate keys
    /// dropped, team names resolved onto athletes, category sanity
    /// checks.
    fn finish_parse(&mut self) {
        let mut seen: Vec<&AthleteKey> = Vec::with_capacity(self.athletes.len());
        let mut duplicates = Vec::new();
        for (index, athlete) in self.athletes.iter().enumerate() {
            if seen.contains(&&athlete.key) {
                warn!("Duplicate athlete key {} in database frame, keeping the first", athlete.key);
                duplicates.push(index);
            } else {
                seen.push(&athlete.key);
            }
        }
        drop(seen);
        for index in duplicates.into_iter().rev() {
            self.athletes.remove(index);
        }

        let team_names: HashMap<i64, &str> =
            self.teams.iter().map(|t| (t.id, t.name.as_str())).collect();
        for athlete in &mut self.athletes {
            if athlete.team_name.is_empty() {
                if let Some(name) = athlete.team_id.and_then(|id| team_names.get(&id)) {
                    athlete.team_name = (*name).to_owned();
                }
            }
        }

        for athlete in &self.athletes {
            if athlete.category.is_empty() {
                continue;
            }
            let owners = self
                .age_groups
                .iter()
                .filter(|group| group.categories.contains(&athlete.category))
                .count();
            if owners != 1 {
                warn!(
                    "Category {} of athlete {} belongs to {owners} age groups (expected 1)",
                    athlete.category, athlete.key
                );
            }
        }
    }

    pub fn athlete(&self, key: &AthleteKey) -> Option<&Athlete> {
        self.athletes.iter().find(|a| a.key == *key)
    }

    pub fn team_name(&self, id: i64) -> Option<&str> {
        self.teams
            .iter()
            .find(|team| team.id == id)
            .map(|team| team.name.as_str())
    }

    pub fn age_group_of(&self, category: &str) -> Option<&AgeGroup> {
        self.age_groups
            .iter()
            .find(|group| group.categories.iter().any(|c| c == category))
    }
}

/// O(1) lookup tables over a database snapshot. Rebuilt whenever the
/// snapshot is replaced.
#[derive(Debug, Clone, Default)]
pub struct DatabaseIndexes {
    pub athletes_by_key: HashMap<AthleteKey, usize>,
    pub team_names: HashMap<i64, String>,
    pub age_group_by_category: HashMap<String, String>,
}

impl DatabaseIndexes {
    pub fn build(state: &DatabaseState) -> Self {
        DatabaseIndexes {
            athletes_by_key: state
                .athletes
                .iter()
                .enumerate()
                .map(|(index, athlete)| (athlete.key.clone(), index))
                .collect(),
            team_names: state
                .teams
                .iter()
                .map(|team| (team.id, team.name.clone()))
                .collect(),
            age_group_by_category: state
                .age_groups
                .iter()
                .flat_map(|group| {
                    group
                        .categories
                        .iter()
                        .map(|category| (category.clone(), group.code.clone()))
                })
                .collect(),
        }
    }
}

#[cfg(feature = "legacy-database")]
fn parse_legacy(object: &serde_json::Map<String, Value>) -> Result<DatabaseState, DatabaseParseError> {
    let competition = CompetitionInfo {
        name: object
            .get("competition")
            .and_then(|c| c.get("name"))
            .map(json_scalar_string)
            .unwrap_or_default(),
        fops: object
            .get("competition")
            .and_then(|c| c.get("fops"))
            .and_then(Value::as_array)
            .map(|fops| fops.iter().map(json_scalar_string).collect())
            .unwrap_or_default(),
    };

    // Category ids are numeric in the old dumps; the table maps them to
    // the string codes everything downstream uses.
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct LegacyCategory {
        id: i64,
        code: String,
        #[serde(default)]
        age_group: String,
    }
    let categories: Vec<LegacyCategory> = match object.get("categories") {
        Some(value) => serde_json::from_value(value.clone())?,
        None => Vec::new(),
    };
    let category_codes: HashMap<i64, &str> = categories
        .iter()
        .map(|c| (c.id, c.code.as_str()))
        .collect();

    let age_groups = categories
        .iter()
        .filter(|c| !c.age_group.is_empty())
        .into_group_map_by(|c| c.age_group.clone())
        .into_iter()
        .map(|(code, members)| AgeGroup {
            name: code.clone(),
            code,
            categories: members.into_iter().map(|c| c.code.clone()).sorted().collect(),
        })
        .sorted_by(|a, b| a.code.cmp(&b.code))
        .collect();

    let teams: Vec<Team> = match object.get("teams") {
        Some(value) => value
            .as_array()
            .map(|teams| {
                teams
                    .iter()
                    .filter_map(|team| {
                        let id = team.get("id").map(json_scalar_string)?.parse().ok()?;
                        let name = team.get("name").map(json_scalar_string)?;
                        Some(Team { id, name })
                    })
                    .collect()
            })
            .unwrap_or_default(),
        None => Vec::new(),
    };

    let athletes = match object.get("athletes").and_then(Value::as_array) {
        Some(list) => list
            .iter()
            .filter_map(|raw| match parse_legacy_athlete(raw, &category_codes) {
                Some(athlete) => Some(athlete),
                None => {
                    warn!("Skipping legacy athlete entry without a usable key: {raw}");
                    None
                }
            })
            .collect(),
        None => Vec::new(),
    };

    let records = match object.get("records") {
        Some(value) => serde_json::from_value(value.clone())?,
        None => Vec::new(),
    };

    Ok(DatabaseState {
        competition,
        athletes,
        teams,
        age_groups,
        records,
        officials: Vec::new(),
    })
}

/// The old dumps carry every value as a string and flatten the six
/// attempts into `snatch1Declaration`-style keys.
#[cfg(feature = "legacy-database")]
fn parse_legacy_athlete(raw: &Value, category_codes: &HashMap<i64, &str>) -> Option<Athlete> {
    let get = |key: &str| raw.get(key).map(json_scalar_string).unwrap_or_default();

    let key = AthleteKey::from_json(raw.get("key")?)?;
    let gender = get("gender").parse::<Gender>().ok()?;

    let attempts = |lift: &str| -> [AttemptFields; 3] {
        [1, 2, 3].map(|slot| AttemptFields {
            declaration: get(&format!("{lift}{slot}Declaration")),
            change1: get(&format!("{lift}{slot}Change1")),
            change2: get(&format!("{lift}{slot}Change2")),
            actual_lift: get(&format!("{lift}{slot}ActualLift")),
            automatic_progression: get(&format!("{lift}{slot}AutomaticProgression")),
        })
    };

    let category = match raw.get("categoryId").and_then(Value::as_i64) {
        Some(id) => match category_codes.get(&id) {
            Some(code) => (*code).to_owned(),
            None => {
                warn!("Legacy athlete {key} references unknown category id {id}");
                String::new()
            }
        },
        None => get("category"),
    };

    // Birth arrives as "1995" or "1995-06-21", both strings.
    let raw_birth = get("birth");
    let birth = if raw_birth.is_empty() {
        None
    } else if let Ok(year) = raw_birth.parse::<i32>() {
        Some(BirthDate::Year(year))
    } else {
        raw_birth.parse().ok().map(BirthDate::Date)
    };

    Some(Athlete {
        key,
        first_name: get("firstName"),
        last_name: get("lastName"),
        gender,
        body_weight: get("bodyWeight").parse().ok(),
        birth,
        team_id: get("teamId").parse().ok(),
        team_name: get("teamName"),
        category,
        session_name: get("sessionName"),
        start_number: get("startNumber").parse().ok(),
        lot_number: get("lotNumber"),
        snatch: attempts("snatch"),
        clean_jerk: attempts("cleanJerk"),
        ranks: Default::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::athlete::AttemptStatus;
    use serde_json::json;

    fn v2_payload() -> Value {
        json!({
            "formatVersion": "2.0",
            "competition": {"name": "Nationals", "fops": ["A", "B"]},
            "teams": [{"id": 1, "name": "Halterofilia Norte"}],
            "ageGroups": [
                {"code": "SR", "name": "Senior", "categories": ["SR_M89", "SR_F64"]},
            ],
            "athletes": [
                {"key": 11, "firstName": "Ivan", "lastName": "Stoev", "gender": "M",
                 "bodyWeight": 88.2, "birth": 1995, "teamId": 1, "category": "SR_M89",
                 "sessionName": "M1", "startNumber": 1, "lotNumber": "4",
                 "snatch": [{"declaration": 150}, {}, {}]},
            ],
            "records": [],
        })
    }

    #[test]
    fn v2_payload_parses_natively() {
        let (state, format) = DatabaseState::parse(&v2_payload()).unwrap();
        assert_eq!(format, DatabaseFormat::V2);
        assert_eq!(state.competition.fops, vec!["A", "B"]);
        assert_eq!(state.athletes.len(), 1);
        let athlete = &state.athletes[0];
        assert_eq!(athlete.snatch[0].declaration, "150");
        // Team name resolved through the teams table.
        assert_eq!(athlete.team_name, "Halterofilia Norte");
        assert_eq!(state.age_group_of("SR_M89").unwrap().code, "SR");
    }

    #[test]
    fn duplicate_keys_keep_the_first() {
        let mut payload = v2_payload();
        let copy = payload["athletes"][0].clone();
        let mut second = copy.clone();
        second["firstName"] = json!("Impostor");
        payload["athletes"].as_array_mut().unwrap().push(second);

        let (state, _) = DatabaseState::parse(&payload).unwrap();
        assert_eq!(state.athletes.len(), 1);
        assert_eq!(state.athletes[0].first_name, "Ivan");
    }

    #[test]
    fn unknown_format_version_is_rejected() {
        let mut payload = v2_payload();
        payload["formatVersion"] = json!("3.1");
        assert!(matches!(
            DatabaseState::parse(&payload),
            Err(DatabaseParseError::UnsupportedFormat(v)) if v == "3.1"
        ));
    }

    #[cfg(feature = "legacy-database")]
    #[test]
    fn legacy_payload_parses_flat_strings() {
        let payload = json!({
            "competition": {"name": "Provincials", "fops": ["A"]},
            "categories": [
                {"id": 7, "code": "SR_M89", "ageGroup": "SR"},
                {"id": 8, "code": "JR_M89", "ageGroup": "JR"},
            ],
            "teams": [{"id": "3", "name": "East"}],
            "athletes": [
                {"key": "a-1", "firstName": "Louis", "lastName": "Petit", "gender": "M",
                 "bodyWeight": "88.40", "teamId": "3", "categoryId": 7,
                 "sessionName": "M1", "startNumber": "2", "lotNumber": "9",
                 "snatch1Declaration": "120", "snatch1Change1": "", "snatch1Change2": "",
                 "snatch1ActualLift": "-122",
                 "snatch2ActualLift": "122",
                 "cleanJerk1Declaration": "150"},
            ],
        });

        let (state, format) = DatabaseState::parse(&payload).unwrap();
        assert_eq!(format, DatabaseFormat::Legacy);
        let athlete = &state.athletes[0];
        assert_eq!(athlete.key, AthleteKey::Str("a-1".into()));
        assert_eq!(athlete.category, "SR_M89");
        assert_eq!(athlete.team_name, "East");
        assert_eq!(athlete.body_weight, Some(88.4));
        assert_eq!(athlete.snatch[0].cell().status, AttemptStatus::Fail);
        assert_eq!(athlete.snatch[0].cell().display_value, "(122)");
        assert_eq!(athlete.snatch[1].cell().display_value, "122");
        assert_eq!(athlete.clean_jerk[0].cell().display_value, "150");
        // Age groups synthesized from the category table.
        assert_eq!(state.age_groups.len(), 2);
        assert_eq!(state.age_group_of("JR_M89").unwrap().code, "JR");
    }

    #[test]
    fn officials_sort_in_protocol_order() {
        let mut officials = vec![
            Official {
                role: OfficialRole::Referee,
                name: "B. Side".into(),
            },
            Official {
                role: OfficialRole::Speaker,
                name: "M. Voice".into(),
            },
            Official {
                role: OfficialRole::Referee,
                name: "A. Centre".into(),
            },
            Official {
                role: OfficialRole::Doctor,
                name: "D. Oncall".into(),
            },
        ];
        sort_officials(&mut officials);
        let order: Vec<&str> = officials.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(order, ["M. Voice", "A. Centre", "B. Side", "D. Oncall"]);
    }

    #[test]
    fn indexes_cover_every_athlete_and_category() {
        let (state, _) = DatabaseState::parse(&v2_payload()).unwrap();
        let indexes = DatabaseIndexes::build(&state);
        assert_eq!(indexes.athletes_by_key[&AthleteKey::Int(11)], 0);
        assert_eq!(indexes.team_names[&1], "Halterofilia Norte");
        assert_eq!(indexes.age_group_by_category["SR_F64"], "SR");
    }
}
