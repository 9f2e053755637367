use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Local-file-header signature that opens every ZIP archive.
pub const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

#[derive(Debug, Error, Diagnostic)]
pub enum FrameError {
    #[error("error deserializing event frame envelope")]
    Envelope(#[source] serde_json::Error),

    #[error("binary frame of {len} bytes is too short to carry a type tag")]
    Truncated { len: usize },

    #[error(
        "binary frame declares a type tag of {type_len} bytes but only {frame_len} bytes arrived"
    )]
    BadTypeLength { type_len: usize, frame_len: usize },

    #[error("binary frame type tag is not UTF-8")]
    TagNotUtf8(#[source] std::str::Utf8Error),

    #[error("unrecognized binary frame type tag {0:?}")]
    UnknownTag(String),
}

/// One JSON event frame from the meet-management server.
///
/// The envelope is always `{"type": ..., "payload": {...}}` with an
/// optional top-level `version` declaring the sender's protocol version.
/// Payload keys are left as raw JSON here; the hub is the layer that knows
/// which of them matter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    #[serde(rename = "type")]
    pub kind: EventFrameKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub payload: serde_json::Value,
}

impl EventFrame {
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        serde_json::from_str(text).map_err(FrameError::Envelope)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("event frame serialization cannot fail")
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EventFrameKind {
    Update,
    Timer,
    Decision,
    Database,
}

/// The resource bundle categories that arrive as binary frames.
///
/// The string forms are the wire tags. `flags` is a tag some older senders
/// still use for what is now `flags_zip`.
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
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
pub enum BundleKind {
    #[strum(serialize = "flags_zip", serialize = "flags")]
    #[serde(rename = "flags_zip", alias = "flags")]
    FlagsZip,
    #[strum(serialize = "logos_zip")]
    LogosZip,
    #[strum(serialize = "pictures_zip")]
    PicturesZip,
    #[strum(serialize = "styles")]
    Styles,
    #[strum(serialize = "translations_zip")]
    TranslationsZip,
}

impl BundleKind {
    /// Directory name under the local files dir that this bundle
    /// extracts into.
    pub fn category(&self) -> &'static str {
        match self {
            BundleKind::FlagsZip => "flags",
            BundleKind::LogosZip => "logos",
            BundleKind::PicturesZip => "pictures",
            BundleKind::Styles => "styles",
            BundleKind::TranslationsZip => "translations",
        }
    }
}

/// A decoded binary frame. Layout on the wire is
/// `u32 type-tag length (big endian) | UTF-8 type tag | payload`.
///
/// Borrows the payload from the receive buffer; extraction copies what it
/// needs.
#[derive(Debug, PartialEq, Eq)]
pub struct BinaryFrame<'a> {
    pub kind: BundleKind,
    pub payload: &'a [u8],
}

impl<'a> BinaryFrame<'a> {
    pub fn decode(buf: &'a [u8]) -> Result<Self, FrameError> {
        if buf.len() < 5 {
            return Err(FrameError::Truncated { len: buf.len() });
        }

        let type_len = u32::from_be_bytes(
            buf[..4].try_into().expect("slice of 4 bytes is 4 bytes"),
        ) as usize;

        if type_len == 0 || type_len > buf.len() - 4 {
            // Some senders ship the archive with no framing at all, and at
            // least one known sender prefixes a garbage length word. Either
            // way the ZIP signature gives it away, and historically these
            // were always flag archives.
            if has_zip_prefix(buf) {
                return Ok(BinaryFrame {
                    kind: BundleKind::FlagsZip,
                    payload: buf,
                });
            }
            return Err(FrameError::BadTypeLength {
                type_len,
                frame_len: buf.len(),
            });
        }

        let tag = std::str::from_utf8(&buf[4..4 + type_len]).map_err(FrameError::TagNotUtf8)?;
        let kind = tag
            .parse()
            .map_err(|_| FrameError::UnknownTag(tag.to_owned()))?;

        Ok(BinaryFrame {
            kind,
            payload: &buf[4 + type_len..],
        })
    }

    pub fn encode(kind: BundleKind, payload: &[u8]) -> Vec<u8> {
        let tag = kind.to_string();
        let mut buf = Vec::with_capacity(4 + tag.len() + payload.len());
        buf.extend_from_slice(&(tag.len() as u32).to_be_bytes());
        buf.extend_from_slice(tag.as_bytes());
        buf.extend_from_slice(payload);
        buf
    }
}

fn has_zip_prefix(buf: &[u8]) -> bool {
    buf.len() >= 8 && (buf[..4] == ZIP_MAGIC || buf[4..8] == ZIP_MAGIC)
}
