use std::time::Duration;

use serde::Serialize;

use crate::{
    entry_store::EntryStore,
    error::{Error, Result},
};

const KEY_PREFIX: &str = "setting.";

/// A user-tunable setting stored in the entry store's meta table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum SettingKey {
    /// Prefix of entry URLs; empty means relative URLs.
    BaseUrl,
    /// Seconds a search page stays cached.
    SearchCacheTtl,
    /// Seconds the letter counts stay cached.
    LetterCountsCacheTtl,
    /// Seconds a word of the day stays selected.
    WotdTtl,
}

impl SettingKey {
    pub const ALL: [SettingKey; 4] = [
        SettingKey::BaseUrl,
        SettingKey::SearchCacheTtl,
        SettingKey::LetterCountsCacheTtl,
        SettingKey::WotdTtl,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SettingKey::BaseUrl => "base_url",
            SettingKey::SearchCacheTtl => "search_cache_ttl",
            SettingKey::LetterCountsCacheTtl => "letter_counts_cache_ttl",
            SettingKey::WotdTtl => "wotd_ttl",
        }
    }

    pub fn default_value(self) -> &'static str {
        match self {
            SettingKey::BaseUrl => "",
            SettingKey::SearchCacheTtl => "3600",
            SettingKey::LetterCountsCacheTtl | SettingKey::WotdTtl => "86400",
        }
    }

    fn meta_key(self) -> String {
        format!("{KEY_PREFIX}{}", self.name())
    }

    fn validate(self, value: &str) -> Result<()> {
        match self {
            SettingKey::BaseUrl => Ok(()),
            _ => parse_seconds(self, value).map(|_| ()),
        }
    }
}

/// Effective settings, defaults filled in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub base_url: String,
    #[serde(serialize_with = "as_secs")]
    pub search_cache_ttl: Duration,
    #[serde(serialize_with = "as_secs")]
    pub letter_counts_cache_ttl: Duration,
    #[serde(serialize_with = "as_secs")]
    pub wotd_ttl: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            search_cache_ttl: Duration::from_secs(3600),
            letter_counts_cache_ttl: Duration::from_secs(86_400),
            wotd_ttl: Duration::from_secs(86_400),
        }
    }
}

impl Settings {
    pub fn load(store: &EntryStore) -> Result<Self> {
        let get = |key: SettingKey| -> Result<String> {
            Ok(store
                .get_meta(&key.meta_key())?
                .unwrap_or_else(|| key.default_value().to_string()))
        };

        Ok(Self {
            base_url: get(SettingKey::BaseUrl)?,
            search_cache_ttl: parse_seconds(
                SettingKey::SearchCacheTtl,
                &get(SettingKey::SearchCacheTtl)?,
            )?,
            letter_counts_cache_ttl: parse_seconds(
                SettingKey::LetterCountsCacheTtl,
                &get(SettingKey::LetterCountsCacheTtl)?,
            )?,
            wotd_ttl: parse_seconds(
                SettingKey::WotdTtl,
                &get(SettingKey::WotdTtl)?,
            )?,
        })
    }

    /// Validate and persist one setting.
    pub fn set(store: &EntryStore, key: SettingKey, value: &str) -> Result<()> {
        let value = value.trim();
        key.validate(value)?;
        store.set_meta(&key.meta_key(), value)
    }

    /// Remove a stored setting so its default applies again.
    pub fn clear(store: &EntryStore, key: SettingKey) -> Result<bool> {
        store.remove_meta(&key.meta_key())
    }

    /// Settings that were explicitly stored, as `(name, value)`.
    pub fn stored(store: &EntryStore) -> Result<Vec<(String, String)>> {
        Ok(store
            .list_meta(KEY_PREFIX)?
            .into_iter()
            .map(|(k, v)| (k.trim_start_matches(KEY_PREFIX).to_string(), v))
            .collect())
    }
}

fn parse_seconds(key: SettingKey, value: &str) -> Result<Duration> {
    match value.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(Error::Config(format!(
            "{} must be a positive number of seconds, got '{value}'",
            key.name()
        ))),
    }
}

fn as_secs<S: serde::Serializer>(
    d: &Duration,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}
