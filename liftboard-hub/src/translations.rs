use hashbrown::HashMap;
use itertools::Itertools;
use log::{debug, info, warn};
use sha2::{Digest, Sha256};

/// Per-locale translation tables with base-locale fallback merging.
///
/// The merge rule keeps every regional map (`fr-CA`) a superset of its
/// base (`fr`), with the regional value winning on conflict, no matter
/// which of the two arrived first.
#[derive(Debug, Default)]
pub struct TranslationStore {
    locales: HashMap<String, HashMap<String, String>>,
    checksum: Option<String>,
    checksum_mismatches: u64,
}

impl TranslationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_any(&self) -> bool {
        !self.locales.is_empty()
    }

    pub fn locale_names(&self) -> Vec<String> {
        self.locales.keys().cloned().sorted().collect()
    }

    pub fn checksum_mismatches(&self) -> u64 {
        self.checksum_mismatches
    }

    /// Ingest one locale's table, merging per the base/regional rules.
    pub fn ingest_locale(&mut self, locale: &str, incoming: HashMap<String, String>) {
        let incoming = match base_of(locale) {
            // Regional variant: seed with the base map if we have it,
            // then let the incoming keys override.
            Some(base) => match self.locales.get(base) {
                Some(base_map) => {
                    let mut merged = base_map.clone();
                    merged.extend(incoming);
                    merged
                }
                None => incoming,
            },
            // Base locale: push its keys under every cached regional,
            // keeping the regional overrides on conflict.
            None => {
                let prefix = format!("{locale}-");
                let regionals: Vec<String> = self
                    .locales
                    .keys()
                    .filter(|name| name.starts_with(&prefix))
                    .cloned()
                    .collect();
                for name in regionals {
                    let regional = self
                        .locales
                        .remove(&name)
                        .expect("regional locale was just listed");
                    let mut merged = incoming.clone();
                    merged.extend(regional);
                    self.locales.insert(name, merged);
                }
                incoming
            }
        };

        debug!("Caching locale {locale} with {} keys", incoming.len());
        self.locales.insert(locale.to_owned(), incoming);
    }

    /// Ingest a bulk delivery of locales, short-circuiting when the
    /// declared checksum matches what we already processed. Returns
    /// whether the tables were (re)processed.
    pub fn ingest_bulk(
        &mut self,
        locales: HashMap<String, HashMap<String, String>>,
        declared_checksum: Option<&str>,
    ) -> bool {
        if let (Some(declared), Some(stored)) = (declared_checksum, self.checksum.as_deref()) {
            if declared == stored {
                info!("Translation checksum unchanged, skipping reprocessing");
                return false;
            }
        }

        let computed = canonical_checksum(&locales);
        if let Some(declared) = declared_checksum {
            if declared != computed {
                // The upstream is authoritative, so the data is accepted
                // either way; the mismatch only gets counted and logged.
                warn!(
                    "Translation checksum mismatch: declared {declared}, computed {computed}"
                );
                self.checksum_mismatches += 1;
            }
        }

        // Base locales first so regionals merge over them
        // deterministically regardless of map iteration order.
        for (locale, table) in locales
            .into_iter()
            .sorted_by_key(|(name, _)| (name.contains('-'), name.clone()))
        {
            self.ingest_locale(&locale, table);
        }
        self.checksum = Some(declared_checksum.map(str::to_owned).unwrap_or(computed));
        true
    }

    /// Resolve a locale's table: exact match, then base, then the given
    /// default, then empty.
    pub fn lookup(&self, locale: &str, default_locale: &str) -> HashMap<String, String> {
        if let Some(table) = self.locales.get(locale) {
            return table.clone();
        }
        if let Some(base) = base_of(locale) {
            if let Some(table) = self.locales.get(base) {
                return table.clone();
            }
        }
        self.locales.get(default_locale).cloned().unwrap_or_default()
    }
}

fn base_of(locale: &str) -> Option<&str> {
    locale.split_once('-').map(|(base, _)| base)
}

/// Hex SHA-256 over the canonical serialization: locales sorted, keys
/// sorted within each locale, each triple fed as `locale|key|value`.
pub fn canonical_checksum(locales: &HashMap<String, HashMap<String, String>>) -> String {
    let mut hasher = Sha256::new();
    for locale in locales.keys().sorted() {
        let table = &locales[locale];
        for key in table.keys().sorted() {
            hasher.update(locale.as_bytes());
            hasher.update(b"|");
            hasher.update(key.as_bytes());
            hasher.update(b"|");
            hasher.update(table[key].as_bytes());
        }
    }
    format!("{:x}", hasher.finalize())
}
