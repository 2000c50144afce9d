use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

use crate::{
    entry_store::EntryStore,
    error::{Error, Result},
    model::{Gender, Term},
    text_util,
};

const STATE_KEY: &str = "word_of_the_day";

/// Persisted selection of the word of the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WotdState {
    Unset,
    /// `expires_at` is in seconds since the Unix epoch.
    Set { term_id: u64, expires_at: u64 },
}

impl WotdState {
    pub fn load(store: &EntryStore) -> Result<Self> {
        let Some(raw) = store.get_meta(STATE_KEY)? else {
            return Ok(WotdState::Unset);
        };
        match Self::decode(&raw) {
            Some(state) => Ok(state),
            None => {
                tracing::warn!(value = %raw, "ignoring malformed word of the day");
                Ok(WotdState::Unset)
            }
        }
    }

    pub fn save(self, store: &EntryStore) -> Result<()> {
        match self {
            WotdState::Unset => store.remove_meta(STATE_KEY).map(|_| ()),
            WotdState::Set {
                term_id,
                expires_at,
            } => store.set_meta(STATE_KEY, &format!("{term_id}:{expires_at}")),
        }
    }

    fn decode(raw: &str) -> Option<Self> {
        let (id, expires) = raw.split_once(':')?;
        Some(WotdState::Set {
            term_id: id.parse().ok()?,
            expires_at: expires.parse().ok()?,
        })
    }
}

/// The featured term with its first definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordOfTheDay {
    pub id: u64,
    pub word: String,
    pub slug: String,
    pub homonym_number: Option<u8>,
    pub pos: String,
    pub pos_detail: Option<String>,
    pub plural: Option<String>,
    pub gender: Option<Gender>,
    pub definition_preview: String,
    pub url: String,
}

/// Seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Current word of the day as of `now`, picking and persisting a new one
/// when none is selected, the selection expired, or its term is gone.
///
/// Returns `None` when no top-level term has a definition.
pub fn resolve_at(
    store: &EntryStore,
    now: u64,
    ttl: Duration,
    base_url: &str,
) -> Result<Option<WordOfTheDay>> {
    if let WotdState::Set {
        term_id,
        expires_at,
    } = WotdState::load(store)?
        && expires_at > now
    {
        match store.find_by_id(term_id) {
            Ok(term) => return format(store, term, base_url).map(Some),
            Err(Error::NotFound { .. }) => {
                tracing::debug!(term_id, "word of the day was deleted");
            }
            Err(e) => return Err(e),
        }
    }

    let candidates = store.term_ids_with_definitions()?;
    let Some(&term_id) = candidates.choose(&mut rand::rng()) else {
        WotdState::Unset.save(store)?;
        return Ok(None);
    };

    WotdState::Set {
        term_id,
        expires_at: now.saturating_add(ttl.as_secs()),
    }
    .save(store)?;
    tracing::info!(term_id, "picked a new word of the day");

    let term = store.find_by_id(term_id)?;
    format(store, term, base_url).map(Some)
}

/// Drop the current selection and pick again.
pub fn refresh_at(
    store: &EntryStore,
    now: u64,
    ttl: Duration,
    base_url: &str,
) -> Result<Option<WordOfTheDay>> {
    WotdState::Unset.save(store)?;
    resolve_at(store, now, ttl, base_url)
}

fn format(
    store: &EntryStore,
    term: Term,
    base_url: &str,
) -> Result<WordOfTheDay> {
    let first = store.first_definition_text(term.id)?.unwrap_or_default();
    Ok(WordOfTheDay {
        url: text_util::entry_url(base_url, &term.slug),
        definition_preview: text_util::definition_preview(&first),
        id: term.id,
        word: term.word,
        slug: term.slug,
        homonym_number: term.homonym_number,
        pos: term.pos,
        pos_detail: term.pos_detail,
        plural: term.plural,
        gender: term.gender,
    })
}
