use miette::Diagnostic;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("cannot parse {input:?} as a protocol version")]
pub struct VersionParseError {
    input: String,
    #[source]
    source: semver::Error,
}

/// A declared protocol version, ordered by semver precedence.
///
/// Senders are not perfectly disciplined about the patch component, so
/// `"2.0"` parses the same as `"2.0.0"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProtocolVersion(semver::Version);

impl ProtocolVersion {
    pub fn meets_minimum(&self, minimum: &ProtocolVersion) -> bool {
        self >= minimum
    }
}

impl FromStr for ProtocolVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match semver::Version::parse(trimmed) {
            Ok(v) => Ok(Self(v)),
            Err(first_err) => {
                // Retry a major.minor form with an implied .0 patch.
                let padded = format!("{trimmed}.0");
                semver::Version::parse(&padded)
                    .map(Self)
                    .map_err(|_| VersionParseError {
                        input: s.to_owned(),
                        source: first_err,
                    })
            }
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
