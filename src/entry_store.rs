use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
};

use redb::{
    Database,
    MultimapTable,
    MultimapTableDefinition,
    ReadableDatabase,
    ReadableMultimapTable,
    ReadableTable,
    Table,
    TableDefinition,
    WriteTransaction,
};
use rand::seq::IndexedRandom;
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    error::{Error, Result},
    model::{
        DEFAULT_RELATION_TYPE,
        Definition,
        Example,
        FullEntry,
        NewDefinition,
        NewExample,
        NewRelation,
        NewTerm,
        Relation,
        RelationTarget,
        ResolvedRelation,
        Term,
        TermPatch,
    },
    text_util,
};

/// Version of the table layout written by this build.
pub const SCHEMA_VERSION: u32 = 1;

const TERMS: TableDefinition<u64, &[u8]> = TableDefinition::new("terms");
const SLUGS: TableDefinition<&str, u64> = TableDefinition::new("term_slugs");
const SUB_ENTRIES: MultimapTableDefinition<u64, u64> =
    MultimapTableDefinition::new("term_sub_entries");
const DEFINITIONS: TableDefinition<u64, &[u8]> =
    TableDefinition::new("definitions");
const TERM_DEFINITIONS: MultimapTableDefinition<u64, u64> =
    MultimapTableDefinition::new("term_definitions");
const EXAMPLES: TableDefinition<u64, &[u8]> = TableDefinition::new("examples");
const TERM_EXAMPLES: MultimapTableDefinition<u64, u64> =
    MultimapTableDefinition::new("term_examples");
const RELATIONS: TableDefinition<u64, &[u8]> =
    TableDefinition::new("relations");
const TERM_RELATIONS: MultimapTableDefinition<u64, u64> =
    MultimapTableDefinition::new("term_relations");
const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");
const META: TableDefinition<&str, &str> = TableDefinition::new("meta");

const SCHEMA_VERSION_KEY: &str = "schema_version";

/// Letter/part-of-speech restriction applied to top-level terms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermFilter {
    /// Uppercase letter, as stored in [`Term::letter`].
    pub letter: Option<String>,
    pub pos: Option<String>,
}

impl TermFilter {
    pub fn accepts(&self, term: &Term) -> bool {
        term.is_top_level()
            && self.letter.as_ref().is_none_or(|l| *l == term.letter)
            && self.pos.as_ref().is_none_or(|p| *p == term.pos)
    }
}

/// Where [`EntryStore::match_text`] looks for the needle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchScope {
    /// Word prefix only.
    Word,
    /// Word prefix or definition substring.
    WordOrDefinition,
}

/// A term found by [`EntryStore::match_text`].
#[derive(Debug, Clone)]
pub struct TextMatch {
    pub term: Term,
    /// First definition by sort order, captured when the scan already
    /// loaded the definitions. `Some("")` means the term has none.
    pub first_definition: Option<String>,
}

/// A term plus its children, ready for a single-transaction insert.
#[derive(Debug, Clone, Default)]
pub struct EntryTree {
    pub term: NewTerm,
    pub definitions: Vec<NewDefinition>,
    pub examples: Vec<NewExample>,
    pub relations: Vec<NewRelation>,
    pub sub_entries: Vec<EntryTree>,
}

/// Outcome of [`EntryStore::insert_trees`].
#[derive(Debug, Default)]
pub struct InsertReport {
    pub inserted: usize,
    /// Slugs that collided with an existing term; the whole subtree is
    /// skipped.
    pub skipped: Vec<String>,
}

/// Durable storage for terms and their children.
pub struct EntryStore {
    db: Database,
}

impl EntryStore {
    /// Open or create the store, creating missing tables and recording
    /// the schema version.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).map_err(redb::Error::from)?;

        let txn = db.begin_write()?;
        {
            WriteTables::open(&txn)?;
            let mut meta = txn.open_table(META)?;
            let installed = meta
                .get(SCHEMA_VERSION_KEY)?
                .and_then(|v| v.value().parse::<u32>().ok());
            if installed.is_none_or(|v| v < SCHEMA_VERSION) {
                meta.insert(
                    SCHEMA_VERSION_KEY,
                    SCHEMA_VERSION.to_string().as_str(),
                )?;
            }
        }
        txn.commit()?;

        Ok(Self { db })
    }

    pub fn schema_version(&self) -> Result<Option<u32>> {
        Ok(self
            .get_meta(SCHEMA_VERSION_KEY)?
            .and_then(|v| v.parse().ok()))
    }

    // -- Terms --

    /// Insert a term, returning its new id.
    pub fn insert_term(&self, data: &NewTerm) -> Result<u64> {
        let txn = self.db.begin_write()?;
        let term = {
            let mut tables = WriteTables::open(&txn)?;
            tables.insert_term(data)?
        };
        txn.commit()?;
        Ok(term.id)
    }

    /// Insert a term and its children in one transaction.
    pub fn insert_entry(
        &self,
        data: &NewTerm,
        definitions: &[NewDefinition],
        examples: &[NewExample],
        relations: &[NewRelation],
    ) -> Result<(Term, Vec<Definition>)> {
        validate_examples(examples, definitions.len())?;

        let txn = self.db.begin_write()?;
        let inserted = {
            let mut tables = WriteTables::open(&txn)?;
            let term = tables.insert_term(data)?;
            let defs = tables.replace_children(
                term.id,
                definitions,
                examples,
                relations,
            )?;
            (term, defs)
        };
        txn.commit()?;
        Ok(inserted)
    }

    /// Insert whole entry trees (terms with nested sub-entries) in a
    /// single transaction. Trees whose slug is already taken are skipped.
    pub fn insert_trees(&self, trees: &[EntryTree]) -> Result<InsertReport> {
        let mut report = InsertReport::default();
        if trees.is_empty() {
            return Ok(report);
        }

        let txn = self.db.begin_write()?;
        {
            let mut tables = WriteTables::open(&txn)?;
            let mut stack: Vec<(&EntryTree, Option<u64>)> =
                trees.iter().rev().map(|t| (t, None)).collect();

            while let Some((tree, parent)) = stack.pop() {
                if validate_examples(&tree.examples, tree.definitions.len())
                    .is_err()
                {
                    report.skipped.push(tree.term.word.clone());
                    continue;
                }

                let mut data = tree.term.clone();
                if parent.is_some() {
                    data.parent_id = parent;
                }

                let term = match tables.insert_term(&data) {
                    Ok(term) => term,
                    Err(Error::DuplicateSlug(slug)) => {
                        report.skipped.push(slug);
                        continue;
                    }
                    Err(e) => return Err(e),
                };

                tables.replace_children(
                    term.id,
                    &tree.definitions,
                    &tree.examples,
                    &tree.relations,
                )?;
                report.inserted += 1;

                for sub in tree.sub_entries.iter().rev() {
                    stack.push((sub, Some(term.id)));
                }
            }
        }
        txn.commit()?;
        Ok(report)
    }

    /// Apply a partial update to a term. Children are not touched.
    pub fn update_term(&self, id: u64, patch: &TermPatch) -> Result<Term> {
        let txn = self.db.begin_write()?;
        let term = {
            let mut tables = WriteTables::open(&txn)?;
            tables.update_term(id, patch)?
        };
        txn.commit()?;
        Ok(term)
    }

    /// Delete a term, its children and, transitively, its sub-entries.
    ///
    /// Returns the ids of every removed term, the requested one first.
    /// Deleting a missing id is a no-op.
    pub fn delete_term(&self, id: u64) -> Result<Vec<u64>> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut tables = WriteTables::open(&txn)?;
            tables.delete_term(id)?
        };
        txn.commit()?;
        Ok(removed)
    }

    /// Replace every definition, example and relation of a term.
    ///
    /// `sort_order` of each new child is its index in the given list.
    /// Returns the stored definitions.
    pub fn replace_children(
        &self,
        term_id: u64,
        definitions: &[NewDefinition],
        examples: &[NewExample],
        relations: &[NewRelation],
    ) -> Result<Vec<Definition>> {
        validate_examples(examples, definitions.len())?;

        let txn = self.db.begin_write()?;
        let stored = {
            let mut tables = WriteTables::open(&txn)?;
            if tables.term(term_id)?.is_none() {
                return Err(Error::term_not_found(term_id));
            }
            tables.replace_children(
                term_id,
                definitions,
                examples,
                relations,
            )?
        };
        txn.commit()?;
        Ok(stored)
    }

    pub fn find_by_id(&self, id: u64) -> Result<Term> {
        let txn = self.db.begin_read()?;
        let terms = txn.open_table(TERMS)?;
        get_record(&terms, id)?.ok_or_else(|| Error::term_not_found(id))
    }

    pub fn find_by_slug(&self, slug: &str) -> Result<Term> {
        let txn = self.db.begin_read()?;
        let slugs = txn.open_table(SLUGS)?;
        let terms = txn.open_table(TERMS)?;

        let id = slugs.get(slug)?.map(|v| v.value());
        id.map(|id| get_record(&terms, id))
            .transpose()?
            .flatten()
            .ok_or_else(|| Error::NotFound {
                kind: "term",
                name: slug.to_string(),
            })
    }

    /// A term with ordered definitions, examples, annotated relations and
    /// sub-entries.
    pub fn get_full_entry(&self, id: u64) -> Result<FullEntry> {
        let txn = self.db.begin_read()?;
        let terms = txn.open_table(TERMS)?;
        let term: Term =
            get_record(&terms, id)?.ok_or_else(|| Error::term_not_found(id))?;

        let definitions = {
            let index = txn.open_multimap_table(TERM_DEFINITIONS)?;
            let table = txn.open_table(DEFINITIONS)?;
            let mut defs: Vec<Definition> =
                load_children(&index, &table, id)?;
            defs.sort_by_key(|d| (d.sort_order, d.id));
            defs
        };

        let examples = {
            let index = txn.open_multimap_table(TERM_EXAMPLES)?;
            let table = txn.open_table(EXAMPLES)?;
            let mut examples: Vec<Example> =
                load_children(&index, &table, id)?;
            examples.sort_by_key(|e| (e.sort_order, e.id));
            examples
        };

        let relations = {
            let index = txn.open_multimap_table(TERM_RELATIONS)?;
            let table = txn.open_table(RELATIONS)?;
            let relations: Vec<Relation> = load_children(&index, &table, id)?;

            let mut resolved = Vec::with_capacity(relations.len());
            for relation in relations {
                let target = match relation.related_term_id {
                    Some(target_id) => get_record::<Term>(&terms, target_id)?
                        .map(|t| RelationTarget {
                            word: t.word,
                            slug: t.slug,
                            pos: t.pos,
                        }),
                    None => None,
                };
                resolved.push(ResolvedRelation { relation, target });
            }
            resolved
        };

        let sub_entries = {
            let index = txn.open_multimap_table(SUB_ENTRIES)?;
            let mut subs: Vec<Term> = load_children(&index, &terms, id)?;
            subs.sort_by_key(|t| (t.sort_order, t.id));
            subs
        };

        Ok(FullEntry {
            term,
            definitions,
            examples,
            relations,
            sub_entries,
        })
    }

    /// Point unresolved relations at the term whose word equals
    /// `related_word` ignoring case, lowest id first. Returns how many
    /// were updated.
    pub fn resolve_relations(&self) -> Result<usize> {
        let txn = self.db.begin_write()?;
        let updated = {
            let mut tables = WriteTables::open(&txn)?;

            let mut by_word: HashMap<String, u64> = HashMap::new();
            for term in all_records::<Term>(&tables.terms)? {
                by_word
                    .entry(term.word.to_lowercase())
                    .and_modify(|id| *id = (*id).min(term.id))
                    .or_insert(term.id);
            }

            let pending: Vec<Relation> =
                all_records::<Relation>(&tables.relations)?
                    .into_iter()
                    .filter(|r| r.related_term_id.is_none())
                    .collect();

            let mut updated = 0;
            for mut relation in pending {
                let word = relation.related_word.to_lowercase();
                if let Some(&target) = by_word.get(&word) {
                    relation.related_term_id = Some(target);
                    put_record(&mut tables.relations, relation.id, &relation)?;
                    updated += 1;
                }
            }
            updated
        };
        txn.commit()?;
        Ok(updated)
    }

    // -- Search primitives --

    /// Top-level terms accepted by `filter`.
    pub fn browse(&self, filter: &TermFilter) -> Result<Vec<Term>> {
        let txn = self.db.begin_read()?;
        let terms = txn.open_table(TERMS)?;
        Ok(all_records::<Term>(&terms)?
            .into_iter()
            .filter(|t| filter.accepts(t))
            .collect())
    }

    /// Case-insensitive prefix match on the word and, for
    /// [`MatchScope::WordOrDefinition`], substring match on any
    /// definition text.
    pub fn match_text(
        &self,
        filter: &TermFilter,
        needle: &str,
        scope: MatchScope,
    ) -> Result<Vec<TextMatch>> {
        let needle = needle.to_lowercase();
        let txn = self.db.begin_read()?;
        let terms = txn.open_table(TERMS)?;
        let index = txn.open_multimap_table(TERM_DEFINITIONS)?;
        let definitions = txn.open_table(DEFINITIONS)?;

        let mut matches = Vec::new();
        for term in all_records::<Term>(&terms)? {
            if !filter.accepts(&term) {
                continue;
            }
            let word_hit = term.word.to_lowercase().starts_with(&needle);

            match scope {
                MatchScope::Word if word_hit => matches.push(TextMatch {
                    term,
                    first_definition: None,
                }),
                MatchScope::Word => {}
                MatchScope::WordOrDefinition => {
                    let mut defs: Vec<Definition> =
                        load_children(&index, &definitions, term.id)?;
                    let definition_hit = defs.iter().any(|d| {
                        d.definition_text.to_lowercase().contains(&needle)
                    });
                    if word_hit || definition_hit {
                        defs.sort_by_key(|d| (d.sort_order, d.id));
                        let first = defs
                            .into_iter()
                            .next()
                            .map(|d| d.definition_text)
                            .unwrap_or_default();
                        matches.push(TextMatch {
                            term,
                            first_definition: Some(first),
                        });
                    }
                }
            }
        }

        Ok(matches)
    }

    /// Load the given terms; ids without a term are left out.
    pub fn terms_by_ids(&self, ids: &[u64]) -> Result<Vec<Term>> {
        let txn = self.db.begin_read()?;
        let terms = txn.open_table(TERMS)?;
        let mut result = Vec::with_capacity(ids.len());
        for &id in ids {
            if let Some(term) = get_record(&terms, id)? {
                result.push(term);
            }
        }
        Ok(result)
    }

    /// Text of the term's first definition by sort order.
    pub fn first_definition_text(&self, term_id: u64) -> Result<Option<String>> {
        let txn = self.db.begin_read()?;
        let index = txn.open_multimap_table(TERM_DEFINITIONS)?;
        let definitions = txn.open_table(DEFINITIONS)?;
        let defs: Vec<Definition> =
            load_children(&index, &definitions, term_id)?;
        Ok(defs
            .into_iter()
            .min_by_key(|d| (d.sort_order, d.id))
            .map(|d| d.definition_text))
    }

    /// Every stored definition, for rebuilding the relevance index.
    pub fn all_definitions(&self) -> Result<Vec<Definition>> {
        let txn = self.db.begin_read()?;
        let definitions = txn.open_table(DEFINITIONS)?;
        all_records(&definitions)
    }

    // -- Aggregates --

    /// Number of top-level terms per starting letter, A to Z, zeros
    /// included.
    pub fn letter_counts(&self) -> Result<BTreeMap<String, u64>> {
        let mut counts: BTreeMap<String, u64> =
            ('A'..='Z').map(|c| (c.to_string(), 0)).collect();

        let txn = self.db.begin_read()?;
        let terms = txn.open_table(TERMS)?;
        for term in all_records::<Term>(&terms)? {
            if !term.is_top_level() {
                continue;
            }
            if let Some(count) = counts.get_mut(&term.letter) {
                *count += 1;
            }
        }
        Ok(counts)
    }

    /// Number of terms, sub-entries included.
    pub fn term_count(&self) -> Result<u64> {
        let txn = self.db.begin_read()?;
        let terms = txn.open_table(TERMS)?;
        let mut count = 0;
        for entry in terms.iter()? {
            entry?;
            count += 1;
        }
        Ok(count)
    }

    /// Up to `count` distinct top-level terms picked at random, never
    /// including `exclude`.
    pub fn random_terms(
        &self,
        count: usize,
        exclude: Option<u64>,
    ) -> Result<Vec<Term>> {
        let txn = self.db.begin_read()?;
        let terms = txn.open_table(TERMS)?;
        let pool: Vec<Term> = all_records::<Term>(&terms)?
            .into_iter()
            .filter(|t| t.is_top_level() && Some(t.id) != exclude)
            .collect();

        let mut rng = rand::rng();
        Ok(pool
            .choose_multiple(&mut rng, count)
            .cloned()
            .collect())
    }

    /// Ids of top-level terms that have at least one definition.
    pub fn term_ids_with_definitions(&self) -> Result<Vec<u64>> {
        let txn = self.db.begin_read()?;
        let terms = txn.open_table(TERMS)?;
        let index = txn.open_multimap_table(TERM_DEFINITIONS)?;

        let mut ids = Vec::new();
        for term in all_records::<Term>(&terms)? {
            if term.is_top_level() && index.get(term.id)?.next().is_some() {
                ids.push(term.id);
            }
        }
        Ok(ids)
    }

    /// Remove every term and child record. Meta rows are kept.
    pub fn truncate(&self) -> Result<()> {
        let txn = self.db.begin_write()?;
        txn.delete_table(TERMS)?;
        txn.delete_table(SLUGS)?;
        txn.delete_multimap_table(SUB_ENTRIES)?;
        txn.delete_table(DEFINITIONS)?;
        txn.delete_multimap_table(TERM_DEFINITIONS)?;
        txn.delete_table(EXAMPLES)?;
        txn.delete_multimap_table(TERM_EXAMPLES)?;
        txn.delete_table(RELATIONS)?;
        txn.delete_multimap_table(TERM_RELATIONS)?;
        txn.delete_table(SEQUENCES)?;
        WriteTables::open(&txn)?;
        txn.commit()?;
        Ok(())
    }

    // -- Meta --

    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(META)?;
            table.insert(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(META)?;
        Ok(table.get(key)?.map(|v| v.value().to_string()))
    }

    pub fn remove_meta(&self, key: &str) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(META)?;
            table.remove(key)?.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    /// All meta rows whose key starts with `prefix`.
    pub fn list_meta(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(META)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            if k.value().starts_with(prefix) {
                result.push((k.value().to_string(), v.value().to_string()));
            }
        }
        Ok(result)
    }
}

impl std::fmt::Debug for EntryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryStore").finish_non_exhaustive()
    }
}

/// All record tables of one write transaction, opened together so a
/// single operation can touch every kind of row.
struct WriteTables<'txn> {
    terms: Table<'txn, u64, &'static [u8]>,
    slugs: Table<'txn, &'static str, u64>,
    sub_entries: MultimapTable<'txn, u64, u64>,
    definitions: Table<'txn, u64, &'static [u8]>,
    term_definitions: MultimapTable<'txn, u64, u64>,
    examples: Table<'txn, u64, &'static [u8]>,
    term_examples: MultimapTable<'txn, u64, u64>,
    relations: Table<'txn, u64, &'static [u8]>,
    term_relations: MultimapTable<'txn, u64, u64>,
    sequences: Table<'txn, &'static str, u64>,
}

impl<'txn> WriteTables<'txn> {
    fn open(txn: &'txn WriteTransaction) -> Result<Self> {
        Ok(Self {
            terms: txn.open_table(TERMS)?,
            slugs: txn.open_table(SLUGS)?,
            sub_entries: txn.open_multimap_table(SUB_ENTRIES)?,
            definitions: txn.open_table(DEFINITIONS)?,
            term_definitions: txn.open_multimap_table(TERM_DEFINITIONS)?,
            examples: txn.open_table(EXAMPLES)?,
            term_examples: txn.open_multimap_table(TERM_EXAMPLES)?,
            relations: txn.open_table(RELATIONS)?,
            term_relations: txn.open_multimap_table(TERM_RELATIONS)?,
            sequences: txn.open_table(SEQUENCES)?,
        })
    }

    fn next_id(&mut self, sequence: &str) -> Result<u64> {
        let next = self.sequences.get(sequence)?.map(|v| v.value()).unwrap_or(0)
            + 1;
        self.sequences.insert(sequence, next)?;
        Ok(next)
    }

    fn term(&self, id: u64) -> Result<Option<Term>> {
        get_record(&self.terms, id)
    }

    fn slug_owner(&self, slug: &str) -> Result<Option<u64>> {
        Ok(self.slugs.get(slug)?.map(|v| v.value()))
    }

    fn insert_term(&mut self, data: &NewTerm) -> Result<Term> {
        let word = data.word.trim();
        if word.is_empty() {
            return Err(Error::invalid("word", "must not be empty"));
        }

        let slug = match data.slug.as_deref().map(str::trim) {
            Some(slug) if !slug.is_empty() => slug.to_string(),
            _ => text_util::term_slug(word, data.homonym_number),
        };
        if slug.is_empty() {
            return Err(Error::invalid(
                "word",
                format!("cannot derive a slug from '{word}'"),
            ));
        }
        if self.slug_owner(&slug)?.is_some() {
            return Err(Error::DuplicateSlug(slug));
        }
        if let Some(parent) = data.parent_id
            && self.term(parent)?.is_none()
        {
            return Err(Error::term_not_found(parent));
        }

        let id = self.next_id("terms")?;
        let term = Term {
            id,
            word: word.to_string(),
            slug,
            homonym_number: data.homonym_number,
            plural: data.plural.clone(),
            pos: data.pos.clone(),
            pos_detail: data.pos_detail.clone(),
            gender: data.gender,
            dialect: data.dialect.clone(),
            verb_stem: data.verb_stem.clone(),
            letter: text_util::first_letter(word).unwrap_or_default(),
            usage_labels: data.usage_labels.clone(),
            parent_id: data.parent_id,
            sort_order: data.sort_order,
        };

        put_record(&mut self.terms, id, &term)?;
        self.slugs.insert(term.slug.as_str(), id)?;
        if let Some(parent) = term.parent_id {
            self.sub_entries.insert(parent, id)?;
        }
        Ok(term)
    }

    fn update_term(&mut self, id: u64, patch: &TermPatch) -> Result<Term> {
        let old = self.term(id)?.ok_or_else(|| Error::term_not_found(id))?;
        let mut term = old.clone();

        if let Some(word) = &patch.word {
            let word = word.trim();
            if word.is_empty() {
                return Err(Error::invalid("word", "must not be empty"));
            }
            term.word = word.to_string();
        }
        if let Some(v) = patch.homonym_number {
            term.homonym_number = v;
        }
        if let Some(v) = &patch.plural {
            term.plural = v.clone();
        }
        if let Some(v) = &patch.pos {
            term.pos = v.clone();
        }
        if let Some(v) = &patch.pos_detail {
            term.pos_detail = v.clone();
        }
        if let Some(v) = patch.gender {
            term.gender = v;
        }
        if let Some(v) = &patch.dialect {
            term.dialect = v.clone();
        }
        if let Some(v) = &patch.verb_stem {
            term.verb_stem = v.clone();
        }
        if let Some(v) = &patch.usage_labels {
            term.usage_labels = v.clone();
        }
        if let Some(v) = patch.sort_order {
            term.sort_order = v;
        }
        if let Some(parent) = patch.parent_id {
            term.parent_id = parent;
        }

        term.letter = text_util::first_letter(&term.word).unwrap_or_default();

        let spelling_changed = term.word != old.word
            || term.homonym_number != old.homonym_number;
        term.slug = match &patch.slug {
            Some(Some(slug)) if !slug.trim().is_empty() => {
                slug.trim().to_string()
            }
            Some(_) => text_util::term_slug(&term.word, term.homonym_number),
            None if spelling_changed => {
                text_util::term_slug(&term.word, term.homonym_number)
            }
            None => old.slug.clone(),
        };
        if term.slug.is_empty() {
            return Err(Error::invalid(
                "word",
                format!("cannot derive a slug from '{}'", term.word),
            ));
        }
        if term.slug != old.slug
            && self.slug_owner(&term.slug)?.is_some_and(|owner| owner != id)
        {
            return Err(Error::DuplicateSlug(term.slug));
        }

        if term.parent_id != old.parent_id {
            if let Some(parent) = term.parent_id {
                self.check_parent(id, parent)?;
            }
            if let Some(parent) = old.parent_id {
                self.sub_entries.remove(parent, id)?;
            }
            if let Some(parent) = term.parent_id {
                self.sub_entries.insert(parent, id)?;
            }
        }

        if term.slug != old.slug {
            self.slugs.remove(old.slug.as_str())?;
            self.slugs.insert(term.slug.as_str(), id)?;
        }
        put_record(&mut self.terms, id, &term)?;
        Ok(term)
    }

    /// Reject a parent that is missing, the term itself, or one of its
    /// descendants.
    fn check_parent(&self, id: u64, parent: u64) -> Result<()> {
        let mut cursor = Some(parent);
        while let Some(current) = cursor {
            if current == id {
                return Err(Error::invalid(
                    "parent_id",
                    "a term cannot be nested under itself",
                ));
            }
            cursor = self
                .term(current)?
                .ok_or_else(|| Error::term_not_found(current))?
                .parent_id;
        }
        Ok(())
    }

    fn delete_term(&mut self, id: u64) -> Result<Vec<u64>> {
        let Some(root) = self.term(id)? else {
            return Ok(Vec::new());
        };
        if let Some(parent) = root.parent_id {
            self.sub_entries.remove(parent, id)?;
        }

        let mut removed = Vec::new();
        let mut worklist = vec![id];
        while let Some(current) = worklist.pop() {
            self.clear_children(current)?;

            worklist.extend(child_ids(&self.sub_entries, current)?);
            self.sub_entries.remove_all(current)?;

            if let Some(term) = self.term(current)? {
                self.slugs.remove(term.slug.as_str())?;
            }
            self.terms.remove(current)?;
            removed.push(current);
        }
        Ok(removed)
    }

    fn clear_children(&mut self, term_id: u64) -> Result<()> {
        for def_id in child_ids(&self.term_definitions, term_id)? {
            self.definitions.remove(def_id)?;
        }
        self.term_definitions.remove_all(term_id)?;

        for example_id in child_ids(&self.term_examples, term_id)? {
            self.examples.remove(example_id)?;
        }
        self.term_examples.remove_all(term_id)?;

        for relation_id in child_ids(&self.term_relations, term_id)? {
            self.relations.remove(relation_id)?;
        }
        self.term_relations.remove_all(term_id)?;
        Ok(())
    }

    fn replace_children(
        &mut self,
        term_id: u64,
        definitions: &[NewDefinition],
        examples: &[NewExample],
        relations: &[NewRelation],
    ) -> Result<Vec<Definition>> {
        self.clear_children(term_id)?;

        let mut stored = Vec::with_capacity(definitions.len());
        for (i, def) in definitions.iter().enumerate() {
            let id = self.next_id("definitions")?;
            let record = Definition {
                id,
                term_id,
                definition_text: def.text.clone(),
                sort_order: i as u32,
            };
            put_record(&mut self.definitions, id, &record)?;
            self.term_definitions.insert(term_id, id)?;
            stored.push(record);
        }

        for (i, ex) in examples.iter().enumerate() {
            let id = self.next_id("examples")?;
            let record = Example {
                id,
                term_id,
                definition_id: ex
                    .definition
                    .and_then(|idx| stored.get(idx))
                    .map(|d| d.id),
                source_text: ex.source_text.clone(),
                target_text: ex.target_text.clone(),
                sort_order: i as u32,
            };
            put_record(&mut self.examples, id, &record)?;
            self.term_examples.insert(term_id, id)?;
        }

        for rel in relations {
            let id = self.next_id("relations")?;
            let record = Relation {
                id,
                term_id,
                related_term_id: None,
                related_word: rel.related_word.clone(),
                relation_type: rel
                    .relation_type
                    .clone()
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| DEFAULT_RELATION_TYPE.to_string()),
            };
            put_record(&mut self.relations, id, &record)?;
            self.term_relations.insert(term_id, id)?;
        }

        Ok(stored)
    }
}

fn validate_examples(examples: &[NewExample], definitions: usize) -> Result<()> {
    for ex in examples {
        if let Some(idx) = ex.definition
            && idx >= definitions
        {
            return Err(Error::invalid(
                "examples",
                format!(
                    "example refers to definition {idx} but only \
                     {definitions} were given"
                ),
            ));
        }
    }
    Ok(())
}

fn get_record<T: DeserializeOwned>(
    table: &impl ReadableTable<u64, &'static [u8]>,
    id: u64,
) -> Result<Option<T>> {
    match table.get(id)? {
        Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
        None => Ok(None),
    }
}

fn put_record<T: Serialize>(
    table: &mut Table<'_, u64, &'static [u8]>,
    id: u64,
    record: &T,
) -> Result<()> {
    let bytes = serde_json::to_vec(record)?;
    table.insert(id, bytes.as_slice())?;
    Ok(())
}

fn all_records<T: DeserializeOwned>(
    table: &impl ReadableTable<u64, &'static [u8]>,
) -> Result<Vec<T>> {
    let mut result = Vec::new();
    for entry in table.iter()? {
        let (_k, v) = entry?;
        result.push(serde_json::from_slice(v.value())?);
    }
    Ok(result)
}

fn child_ids(
    index: &impl ReadableMultimapTable<u64, u64>,
    owner: u64,
) -> Result<Vec<u64>> {
    let mut ids = Vec::new();
    for id in index.get(owner)? {
        ids.push(id?.value());
    }
    Ok(ids)
}

fn load_children<T: DeserializeOwned>(
    index: &impl ReadableMultimapTable<u64, u64>,
    table: &impl ReadableTable<u64, &'static [u8]>,
    owner: u64,
) -> Result<Vec<T>> {
    let mut records = Vec::new();
    for id in child_ids(index, owner)? {
        if let Some(record) = get_record(table, id)? {
            records.push(record);
        }
    }
    Ok(records)
}
