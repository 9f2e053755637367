use fopwire::BundleKind;
use hashbrown::HashMap;
use log::{debug, warn};
use miette::Diagnostic;
use serde_json::Value;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::ZipArchive;

/// The entry a translations bundle must contain.
const TRANSLATIONS_ENTRY: &str = "translations.json";

#[derive(Debug, Error, Diagnostic)]
pub enum ArchiveError {
    #[error("error opening zip archive")]
    Zip(#[from] zip::result::ZipError),

    #[error("error creating extraction directory {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("translations bundle has no {TRANSLATIONS_ENTRY} entry")]
    MissingTranslations,

    #[error("error reading {TRANSLATIONS_ENTRY}")]
    TranslationsRead(#[source] std::io::Error),

    #[error("error parsing {TRANSLATIONS_ENTRY}")]
    TranslationsParse(#[source] serde_json::Error),

    #[error("{TRANSLATIONS_ENTRY} is not an object of locale tables")]
    TranslationsShape,
}

/// What one extraction pass did. Unsafe or unreadable entries never
/// abort the pass; whatever extracted stays extracted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionOutcome {
    pub written: usize,
    pub skipped_unsafe: usize,
    pub failed: usize,
}

/// Unpack a resource bundle under `<local_files_dir>/<category>/`.
pub fn extract_bundle(
    bytes: &[u8],
    kind: BundleKind,
    local_files_dir: &Path,
) -> Result<ExtractionOutcome, ArchiveError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let target_dir = local_files_dir.join(kind.category());
    std::fs::create_dir_all(&target_dir).map_err(|source| ArchiveError::CreateDir {
        path: target_dir.clone(),
        source,
    })?;

    let mut outcome = ExtractionOutcome::default();
    for index in 0..archive.len() {
        let mut entry = match archive.by_index(index) {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Skipping unreadable zip entry {index}: {err}");
                outcome.failed += 1;
                continue;
            }
        };

        let name = entry.name().to_owned();
        if name.ends_with('/') {
            // Directory markers carry no content; intermediate dirs are
            // created as files need them.
            continue;
        }

        let Some(relative) = safe_entry_path(&name) else {
            warn!("Skipping unsafe zip entry name {name:?}");
            outcome.skipped_unsafe += 1;
            continue;
        };

        let path = target_dir.join(relative);
        let write_result = (|| -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut file = std::fs::File::create(&path)?;
            std::io::copy(&mut entry, &mut file)?;
            Ok(())
        })();

        match write_result {
            Ok(()) => {
                debug!("Extracted {name} to {}", path.display());
                outcome.written += 1;
            }
            Err(err) => {
                warn!("Failed to extract {name}: {err}");
                outcome.failed += 1;
            }
        }
    }

    Ok(outcome)
}

/// Entry names with traversal components, absolute paths, or drive
/// letters are rejected outright rather than rewritten.
fn safe_entry_path(name: &str) -> Option<PathBuf> {
    if name.is_empty()
        || name.starts_with('/')
        || name.starts_with('\\')
        || name.split(['/', '\\']).any(|part| part == "..")
        || has_drive_prefix(name)
    {
        return None;
    }
    Some(name.split(['/', '\\']).collect())
}

fn has_drive_prefix(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some(letter), Some(':')) if letter.is_ascii_alphabetic()
    )
}

/// The parsed body of a translations bundle.
#[derive(Debug, PartialEq)]
pub struct TranslationsFile {
    pub locales: HashMap<String, HashMap<String, String>>,
    pub checksum: Option<String>,
}

/// Pull `translations.json` out of a translations bundle. Accepts both
/// the wrapped form `{"locales": {...}, "translationsChecksum": ...}`
/// and the flat form with locales at the top level.
pub fn read_translations(bytes: &[u8]) -> Result<TranslationsFile, ArchiveError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut entry = archive
        .by_name(TRANSLATIONS_ENTRY)
        .map_err(|_| ArchiveError::MissingTranslations)?;

    let mut body = String::new();
    entry
        .read_to_string(&mut body)
        .map_err(ArchiveError::TranslationsRead)?;

    let value: Value = serde_json::from_str(&body).map_err(ArchiveError::TranslationsParse)?;
    let object = value.as_object().ok_or(ArchiveError::TranslationsShape)?;

    let checksum = object
        .get("translationsChecksum")
        .and_then(Value::as_str)
        .map(str::to_owned);

    let locale_source = match object.get("locales") {
        Some(locales) => locales.as_object().ok_or(ArchiveError::TranslationsShape)?,
        None => object,
    };

    let mut locales = HashMap::new();
    for (locale, table) in locale_source {
        if locale == "translationsChecksum" {
            continue;
        }
        let Some(table) = table.as_object() else {
            warn!("Ignoring non-object locale entry {locale:?} in {TRANSLATIONS_ENTRY}");
            continue;
        };
        let table: HashMap<String, String> = table
            .iter()
            .filter_map(|(key, value)| Some((key.clone(), value.as_str()?.to_owned())))
            .collect();
        locales.insert(locale.clone(), table);
    }

    Ok(TranslationsFile { locales, checksum })
}
