use serde::{Deserialize, Serialize};

/// Resource kinds the hub requires before it will process event frames.
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
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Precondition {
    Database,
    Translations,
}

/// Reply envelope sent back to the meet-management server over the same
/// channel the frame arrived on. HTTP status conventions, without HTTP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<Precondition>>,
}

impl Reply {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: 200,
            message: Some(message.into()),
            reason: None,
            missing: None,
        }
    }

    pub fn version_mismatch(reason: impl Into<String>) -> Self {
        Self {
            status: 400,
            message: None,
            reason: Some(reason.into()),
            missing: None,
        }
    }

    pub fn missing_preconditions(missing: Vec<Precondition>) -> Self {
        Self {
            status: 428,
            message: None,
            reason: Some("missing_preconditions".to_owned()),
            missing: Some(missing),
        }
    }

    pub fn processing_error(reason: impl Into<String>) -> Self {
        Self {
            status: 500,
            message: None,
            reason: Some(reason.into()),
            missing: None,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("reply serialization cannot fail")
    }
}
