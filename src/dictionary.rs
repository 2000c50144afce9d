//! The dictionary service: one handle over the entry store, the
//! definition index and the cache.

use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock},
};

use serde::{Deserialize, Serialize};

use crate::{
    cache::{CacheBackend, MemoryCache, QueryCache},
    data_dir::DataDir,
    definition_index::DefinitionIndex,
    entry_store::{EntryStore, EntryTree, InsertReport},
    error::{Error, Result},
    model::{
        FullEntry,
        NewDefinition,
        NewEntry,
        NewExample,
        NewRelation,
        NewTerm,
        Term,
        TermPatch,
    },
    query_plan::{self, SearchRequest},
    search::{self, SearchPage},
    settings::{SettingKey, Settings},
    text_util,
    wotd::{self, WordOfTheDay},
};

/// How many terms [`Dictionary::random_terms`] returns by default.
pub const DEFAULT_RANDOM_COUNT: usize = 6;

/// A full entry plus its public URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordDetail {
    #[serde(flatten)]
    pub entry: FullEntry,
    pub url: String,
}

/// A lightweight link to another term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedTerm {
    pub id: u64,
    pub word: String,
    pub slug: String,
    pub homonym_number: Option<u8>,
    pub pos: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub data_dir: Option<PathBuf>,
    pub schema_version: Option<u32>,
    pub terms: u64,
    pub indexed_definitions: u64,
    pub settings: Settings,
}

/// Outcome of [`Dictionary::import`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub inserted: usize,
    pub skipped: Vec<String>,
    pub relations_resolved: usize,
    pub definitions_indexed: usize,
}

/// Shared, thread-safe dictionary handle.
///
/// Reads run concurrently on redb snapshots. Writes are serialized so the
/// store and the definition index change together.
pub struct Dictionary {
    store: EntryStore,
    index: DefinitionIndex,
    cache: QueryCache,
    settings: RwLock<Settings>,
    writes: Mutex<()>,
    data_dir: Option<PathBuf>,
}

impl Dictionary {
    /// Open the dictionary in `data_dir` with an in-process cache.
    pub fn open(data_dir: &DataDir) -> Result<Self> {
        Self::open_with_cache(data_dir, Arc::new(MemoryCache::new()))
    }

    pub fn open_with_cache(
        data_dir: &DataDir,
        backend: Arc<dyn CacheBackend>,
    ) -> Result<Self> {
        let store = EntryStore::open(&data_dir.entries_db())?;
        let index = DefinitionIndex::open(&data_dir.definitions_dir()?)?;
        let dict = Self::assemble(
            store,
            index,
            QueryCache::new(backend),
            Some(data_dir.root().to_path_buf()),
        )?;
        dict.heal_index()?;
        Ok(dict)
    }

    fn assemble(
        store: EntryStore,
        index: DefinitionIndex,
        cache: QueryCache,
        data_dir: Option<PathBuf>,
    ) -> Result<Self> {
        let settings = Settings::load(&store)?;
        Ok(Self {
            store,
            index,
            cache,
            settings: RwLock::new(settings),
            writes: Mutex::new(()),
            data_dir,
        })
    }

    /// Rebuild the index when it is empty but the store is not, e.g.
    /// after the index directory was removed.
    fn heal_index(&self) -> Result<()> {
        if self.index.num_docs()? > 0 {
            return Ok(());
        }
        let definitions = self.store.all_definitions()?;
        if !definitions.is_empty() {
            tracing::info!(
                definitions = definitions.len(),
                "definition index is empty, rebuilding"
            );
            self.index.rebuild(&definitions)?;
        }
        Ok(())
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn settings(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn store(&self) -> &EntryStore {
        &self.store
    }

    // -- Reads --

    pub fn search(&self, req: &SearchRequest) -> Result<SearchPage> {
        let plan = query_plan::plan(req)?;
        tracing::debug!(?plan, "planned search");

        let settings = self.settings();
        self.cache.search(&plan, settings.search_cache_ttl, || {
            search::execute_search(
                &plan,
                &self.store,
                &self.index,
                &settings.base_url,
            )
        })
    }

    /// Look a term up by slug.
    pub fn get_word(&self, slug: &str) -> Result<WordDetail> {
        let term = self.term_by_slug(slug)?;
        let entry = self.store.get_full_entry(term.id)?;
        let url = text_util::entry_url(&self.settings().base_url, &term.slug);
        Ok(WordDetail { entry, url })
    }

    pub fn term_by_slug(&self, slug: &str) -> Result<Term> {
        let slug = slug.trim();
        if slug.is_empty() {
            return Err(Error::invalid("slug", "must not be empty"));
        }
        self.store.find_by_slug(slug)
    }

    /// Number of top-level terms per letter A to Z.
    pub fn get_letter_counts(&self) -> Result<BTreeMap<String, u64>> {
        let ttl = self.settings().letter_counts_cache_ttl;
        self.cache
            .letter_counts(ttl, || self.store.letter_counts())
    }

    /// Current word of the day, choosing one if needed.
    pub fn word_of_the_day(&self) -> Result<Option<WordOfTheDay>> {
        let _guard = self.lock_writes();
        let settings = self.settings();
        wotd::resolve_at(
            &self.store,
            wotd::unix_now(),
            settings.wotd_ttl,
            &settings.base_url,
        )
    }

    /// Discard the current word of the day and choose another.
    pub fn refresh_word_of_the_day(&self) -> Result<Option<WordOfTheDay>> {
        let _guard = self.lock_writes();
        let settings = self.settings();
        wotd::refresh_at(
            &self.store,
            wotd::unix_now(),
            settings.wotd_ttl,
            &settings.base_url,
        )
    }

    /// Up to `count` random top-level terms other than `exclude`.
    pub fn random_terms(
        &self,
        count: usize,
        exclude: Option<u64>,
    ) -> Result<Vec<RelatedTerm>> {
        let base_url = self.settings().base_url;
        Ok(self
            .store
            .random_terms(count, exclude)?
            .into_iter()
            .map(|t| RelatedTerm {
                url: text_util::entry_url(&base_url, &t.slug),
                id: t.id,
                word: t.word,
                slug: t.slug,
                homonym_number: t.homonym_number,
                pos: t.pos,
            })
            .collect())
    }

    pub fn status(&self) -> Result<Status> {
        Ok(Status {
            data_dir: self.data_dir.clone(),
            schema_version: self.store.schema_version()?,
            terms: self.store.term_count()?,
            indexed_definitions: self.index.num_docs()?,
            settings: self.settings(),
        })
    }

    // -- Writes --

    pub fn create_term(&self, data: &NewTerm) -> Result<Term> {
        let _guard = self.lock_writes();
        let id = self.store.insert_term(data)?;
        self.cache.invalidate();
        tracing::debug!(id, word = %data.word, "term created");
        self.store.find_by_id(id)
    }

    /// Create a term together with its definitions, examples and
    /// relations.
    pub fn create_entry(&self, entry: &NewEntry) -> Result<FullEntry> {
        let _guard = self.lock_writes();
        let (term, definitions) = self.store.insert_entry(
            &entry.term,
            &entry.definitions,
            &entry.examples,
            &entry.relations,
        )?;
        let indexed = self.index.replace_term(term.id, &definitions);
        self.cache.invalidate();
        indexed?;
        tracing::debug!(id = term.id, word = %term.word, "entry created");
        self.store.get_full_entry(term.id)
    }

    pub fn update_term(&self, id: u64, patch: &TermPatch) -> Result<Term> {
        let _guard = self.lock_writes();
        let term = self.store.update_term(id, patch)?;
        self.cache.invalidate();
        tracing::debug!(id, word = %term.word, "term updated");
        Ok(term)
    }

    /// Delete a term and everything below it. Returns the removed ids.
    pub fn delete_term(&self, id: u64) -> Result<Vec<u64>> {
        let _guard = self.lock_writes();
        let removed = self.store.delete_term(id)?;
        if removed.is_empty() {
            return Ok(removed);
        }
        let indexed = self.index.delete_terms(&removed);
        self.cache.invalidate();
        indexed?;
        tracing::debug!(id, removed = removed.len(), "term deleted");
        Ok(removed)
    }

    pub fn replace_children(
        &self,
        term_id: u64,
        definitions: &[NewDefinition],
        examples: &[NewExample],
        relations: &[NewRelation],
    ) -> Result<FullEntry> {
        let _guard = self.lock_writes();
        let stored = self.store.replace_children(
            term_id,
            definitions,
            examples,
            relations,
        )?;
        let indexed = self.index.replace_term(term_id, &stored);
        self.cache.invalidate();
        indexed?;
        self.store.get_full_entry(term_id)
    }

    pub fn resolve_relations(&self) -> Result<usize> {
        let _guard = self.lock_writes();
        let updated = self.store.resolve_relations()?;
        tracing::info!(updated, "relations resolved");
        Ok(updated)
    }

    /// Re-index every stored definition. Returns how many were indexed.
    pub fn rebuild_index(&self) -> Result<usize> {
        let _guard = self.lock_writes();
        self.rebuild_index_locked()
    }

    fn rebuild_index_locked(&self) -> Result<usize> {
        let definitions = self.store.all_definitions()?;
        self.index.rebuild(&definitions)?;
        self.cache.invalidate();
        tracing::info!(definitions = definitions.len(), "definition index rebuilt");
        Ok(definitions.len())
    }

    /// Insert prepared entry trees, then resolve relations and rebuild
    /// the index. With `truncate`, existing terms are removed first.
    pub fn import(
        &self,
        trees: &[EntryTree],
        truncate: bool,
    ) -> Result<ImportReport> {
        let _guard = self.lock_writes();

        if truncate {
            self.store.truncate()?;
            wotd::WotdState::Unset.save(&self.store)?;
            tracing::info!("existing entries removed");
        }

        let InsertReport { inserted, skipped } =
            self.store.insert_trees(trees)?;
        for slug in &skipped {
            tracing::warn!(slug = %slug, "skipped entry with a slug already in use");
        }

        let relations_resolved = self.store.resolve_relations()?;
        let definitions_indexed = self.rebuild_index_locked()?;

        tracing::info!(
            inserted,
            skipped = skipped.len(),
            relations_resolved,
            "import finished"
        );

        Ok(ImportReport {
            inserted,
            skipped,
            relations_resolved,
            definitions_indexed,
        })
    }

    // -- Settings --

    pub fn set_setting(&self, key: SettingKey, value: &str) -> Result<()> {
        let _guard = self.lock_writes();
        Settings::set(&self.store, key, value)?;
        self.reload_settings()
    }

    pub fn clear_setting(&self, key: SettingKey) -> Result<bool> {
        let _guard = self.lock_writes();
        let cleared = Settings::clear(&self.store, key)?;
        self.reload_settings()?;
        Ok(cleared)
    }

    fn reload_settings(&self) -> Result<()> {
        let fresh = Settings::load(&self.store)?;
        *self
            .settings
            .write()
            .unwrap_or_else(PoisonError::into_inner) = fresh;
        // Cached rows embed URLs built from base_url.
        self.cache.invalidate();
        Ok(())
    }
}

impl std::fmt::Debug for Dictionary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dictionary")
            .field("data_dir", &self.data_dir)
            .finish_non_exhaustive()
    }
}
