//! Typed dictionary records as stored in the entry store.

use serde::{Deserialize, Deserializer, Serialize};

/// Default relation type: "compare".
pub const DEFAULT_RELATION_TYPE: &str = "cp";

/// Grammatical gender of a noun headword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "F")]
    Feminine,
    #[serde(rename = "M")]
    Masculine,
    #[serde(rename = "N/A")]
    NotApplicable,
}

impl Gender {
    /// Parse the labels found in source material (`f`, `M`, `neuter`,
    /// `dimin.` ...). Unknown labels yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "F" => Some(Gender::Feminine),
            "M" => Some(Gender::Masculine),
            "N/A" | "NEUTER" | "DIMIN." | "NEUTER/DIMIN." | "M/DIMIN."
            | "F/DIMIN." => Some(Gender::NotApplicable),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Feminine => "F",
            Gender::Masculine => "M",
            Gender::NotApplicable => "N/A",
        }
    }
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dictionary headword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub id: u64,
    pub word: String,
    pub slug: String,
    pub homonym_number: Option<u8>,
    pub plural: Option<String>,
    pub pos: String,
    pub pos_detail: Option<String>,
    pub gender: Option<Gender>,
    pub dialect: Option<String>,
    pub verb_stem: Option<String>,
    /// Uppercase first alphabetic character of `word`, empty if none.
    pub letter: String,
    pub usage_labels: Option<String>,
    pub parent_id: Option<u64>,
    pub sort_order: u32,
}

impl Term {
    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// One numbered meaning of a term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    pub id: u64,
    pub term_id: u64,
    pub definition_text: String,
    pub sort_order: u32,
}

/// A bilingual usage sentence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    pub id: u64,
    pub term_id: u64,
    pub definition_id: Option<u64>,
    pub source_text: String,
    pub target_text: String,
    pub sort_order: u32,
}

/// A cross-reference from one term to another, possibly unresolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub id: u64,
    pub term_id: u64,
    pub related_term_id: Option<u64>,
    pub related_word: String,
    pub relation_type: String,
}

/// The term a relation points at, when it still exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationTarget {
    pub word: String,
    pub slug: String,
    pub pos: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRelation {
    #[serde(flatten)]
    pub relation: Relation,
    pub target: Option<RelationTarget>,
}

/// A term with all of its children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullEntry {
    #[serde(flatten)]
    pub term: Term,
    pub definitions: Vec<Definition>,
    pub examples: Vec<Example>,
    pub relations: Vec<ResolvedRelation>,
    pub sub_entries: Vec<Term>,
}

/// Field values for a new term. `letter` is always derived and `slug`
/// defaults to one built from `word` and `homonym_number`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewTerm {
    pub word: String,
    pub slug: Option<String>,
    pub homonym_number: Option<u8>,
    pub plural: Option<String>,
    pub pos: String,
    pub pos_detail: Option<String>,
    pub gender: Option<Gender>,
    pub dialect: Option<String>,
    pub verb_stem: Option<String>,
    pub usage_labels: Option<String>,
    pub parent_id: Option<u64>,
    pub sort_order: u32,
}

impl NewTerm {
    pub fn new(word: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            ..Self::default()
        }
    }

    pub fn with_pos(mut self, pos: impl Into<String>) -> Self {
        self.pos = pos.into();
        self
    }

    pub fn with_homonym(mut self, n: u8) -> Self {
        self.homonym_number = Some(n);
        self
    }

    pub fn with_parent(mut self, parent_id: u64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}

/// A partial update. `None` leaves a field alone; for nullable fields
/// `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TermPatch {
    pub word: Option<String>,
    #[serde(deserialize_with = "double_option")]
    pub slug: Option<Option<String>>,
    #[serde(deserialize_with = "double_option")]
    pub homonym_number: Option<Option<u8>>,
    #[serde(deserialize_with = "double_option")]
    pub plural: Option<Option<String>>,
    pub pos: Option<String>,
    #[serde(deserialize_with = "double_option")]
    pub pos_detail: Option<Option<String>>,
    #[serde(deserialize_with = "double_option")]
    pub gender: Option<Option<Gender>>,
    #[serde(deserialize_with = "double_option")]
    pub dialect: Option<Option<String>>,
    #[serde(deserialize_with = "double_option")]
    pub verb_stem: Option<Option<String>>,
    #[serde(deserialize_with = "double_option")]
    pub usage_labels: Option<Option<String>>,
    #[serde(deserialize_with = "double_option")]
    pub parent_id: Option<Option<u64>>,
    pub sort_order: Option<u32>,
}

// A present `null` must become `Some(None)`, not `None`.
fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(de).map(Some)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDefinition {
    pub text: String,
}

impl NewDefinition {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewExample {
    #[serde(alias = "ateso")]
    pub source_text: String,
    #[serde(alias = "english")]
    pub target_text: String,
    /// Index into the definitions passed alongside this example.
    #[serde(default)]
    pub definition: Option<usize>,
}

impl NewExample {
    pub fn new(
        source_text: impl Into<String>,
        target_text: impl Into<String>,
    ) -> Self {
        Self {
            source_text: source_text.into(),
            target_text: target_text.into(),
            definition: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRelation {
    pub related_word: String,
    #[serde(default)]
    pub relation_type: Option<String>,
}

impl NewRelation {
    pub fn compare(related_word: impl Into<String>) -> Self {
        Self {
            related_word: related_word.into(),
            relation_type: None,
        }
    }
}

/// A term together with the children to store for it, as accepted by
/// `Dictionary::create_entry`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewEntry {
    #[serde(flatten)]
    pub term: NewTerm,
    pub definitions: Vec<NewDefinition>,
    pub examples: Vec<NewExample>,
    pub relations: Vec<NewRelation>,
}
