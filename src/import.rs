use std::path::Path;

use rayon::prelude::*;
use serde::Deserialize;

use crate::{
    entry_store::EntryTree,
    error::Result,
    model::{Gender, NewDefinition, NewExample, NewRelation, NewTerm},
};

/// Relation type assigned to `cp_refs` from the source material.
const COMPARE: &str = "cp";

/// Converter output: `{"metadata": .., "entries": [..]}` or a bare array.
/// Metadata is informational and ignored.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ImportFile {
    Wrapped { entries: Vec<RawEntry> },
    Bare(Vec<RawEntry>),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEntry {
    word: String,
    slug: Option<String>,
    homonym_number: Option<u8>,
    plural: Option<String>,
    pos: Option<String>,
    pos_detail: Option<String>,
    gender: Option<String>,
    dialect: Option<String>,
    verb_stem: Option<String>,
    usage_labels: Vec<String>,
    definitions: Vec<RawDefinition>,
    examples: Vec<RawExample>,
    sub_entries: Vec<RawEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawDefinition {
    text: String,
    cp_refs: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawExample {
    #[serde(alias = "ateso", alias = "source")]
    source_text: String,
    #[serde(alias = "english", alias = "target")]
    target_text: String,
}

/// Parse converter JSON into entry trees ready for insertion.
///
/// Entries are converted in parallel; their order is preserved.
pub fn parse_entries(json: &str) -> Result<Vec<EntryTree>> {
    let entries = match serde_json::from_str::<ImportFile>(json)? {
        ImportFile::Wrapped { entries, .. } => entries,
        ImportFile::Bare(entries) => entries,
    };

    let trees: Vec<EntryTree> = entries
        .into_par_iter()
        .filter(|e| !e.word.trim().is_empty())
        .map(to_tree)
        .collect();

    tracing::debug!(entries = trees.len(), "parsed import file");
    Ok(trees)
}

/// Read and parse a converter JSON file.
pub fn read_entries(path: &Path) -> Result<Vec<EntryTree>> {
    let json = std::fs::read_to_string(path)?;
    parse_entries(&json)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn to_tree(raw: RawEntry) -> EntryTree {
    let labels: Vec<&str> = raw
        .usage_labels
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();

    let term = NewTerm {
        word: raw.word.trim().to_string(),
        slug: non_empty(raw.slug),
        homonym_number: raw.homonym_number,
        plural: non_empty(raw.plural),
        pos: raw.pos.map(|p| p.trim().to_string()).unwrap_or_default(),
        pos_detail: non_empty(raw.pos_detail),
        gender: raw.gender.as_deref().and_then(Gender::parse),
        dialect: non_empty(raw.dialect),
        verb_stem: non_empty(raw.verb_stem),
        usage_labels: (!labels.is_empty()).then(|| labels.join(", ")),
        parent_id: None,
        sort_order: 0,
    };

    let mut definitions = Vec::new();
    let mut relations: Vec<NewRelation> = Vec::new();
    for def in raw.definitions {
        for word in def.cp_refs {
            let word = word.trim();
            if !word.is_empty()
                && !relations.iter().any(|r| r.related_word == word)
            {
                relations.push(NewRelation {
                    related_word: word.to_string(),
                    relation_type: Some(COMPARE.to_string()),
                });
            }
        }
        let text = def.text.trim();
        if !text.is_empty() {
            definitions.push(NewDefinition::new(text));
        }
    }

    let examples = raw
        .examples
        .into_iter()
        .filter(|e| !e.source_text.trim().is_empty())
        .map(|e| NewExample::new(e.source_text.trim(), e.target_text.trim()))
        .collect();

    let sub_entries = raw
        .sub_entries
        .into_iter()
        .filter(|e| !e.word.trim().is_empty())
        .enumerate()
        .map(|(i, sub)| {
            let mut tree = to_tree(sub);
            tree.term.sort_order = i as u32;
            tree
        })
        .collect();

    EntryTree {
        term,
        definitions,
        examples,
        relations,
        sub_entries,
    }
}
