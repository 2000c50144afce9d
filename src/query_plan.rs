//! Validation and normalization of search parameters.
//!
//! Every search goes through [`plan`], which decides how the request is
//! answered: an alphabetical listing, a substring scan for very short
//! queries, or a relevance-scored lookup in the definition index.

use serde::{Deserialize, Serialize};

use crate::{
    entry_store::TermFilter,
    error::{Error, Result},
};

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

/// Queries shorter than this (in characters) are answered by a substring
/// scan instead of the relevance index.
pub const MIN_RELEVANCE_CHARS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// No query: alphabetical listing.
    Browse,
    /// Word prefix or definition substring.
    ShortQuery,
    /// Word prefix plus scored definition matches.
    Relevance,
}

/// One step of the ordering applied to result rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKey {
    /// 0 exact word, 1 word prefix, 2 definition only.
    MatchRank,
    /// Descending relevance score, only among definition-only rows.
    Score,
    /// Case-insensitive word, ascending.
    Word,
    /// Homonym number ascending, unnumbered first.
    Homonym,
    Id,
}

/// Raw search parameters as received from a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchRequest {
    pub q: String,
    pub letter: String,
    pub pos: String,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl SearchRequest {
    pub fn query(q: impl Into<String>) -> Self {
        Self {
            q: q.into(),
            ..Self::default()
        }
    }
}

/// A validated, normalized search.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryPlan {
    pub mode: SearchMode,
    pub q: String,
    pub letter: Option<String>,
    pub pos: Option<String>,
    pub page: u32,
    pub per_page: u32,
    pub order: Vec<OrderKey>,
}

impl QueryPlan {
    pub fn filter(&self) -> TermFilter {
        TermFilter {
            letter: self.letter.clone(),
            pos: self.pos.clone(),
        }
    }

    /// Index of the first row on the requested page.
    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.per_page as usize
    }
}

/// Validate `req` and decide how to answer it.
pub fn plan(req: &SearchRequest) -> Result<QueryPlan> {
    let page = req.page.unwrap_or(1);
    if page < 1 {
        return Err(Error::invalid("page", "must be at least 1"));
    }

    let per_page = req.per_page.unwrap_or(DEFAULT_PER_PAGE);
    if !(1..=MAX_PER_PAGE).contains(&per_page) {
        return Err(Error::invalid(
            "per_page",
            format!("must be between 1 and {MAX_PER_PAGE}"),
        ));
    }

    let letter = normalize_letter(&req.letter)?;

    let pos = req.pos.trim();
    let pos = (!pos.is_empty()).then(|| pos.to_string());

    let q = req.q.trim().to_string();
    let mode = match q.chars().count() {
        0 => SearchMode::Browse,
        n if n < MIN_RELEVANCE_CHARS => SearchMode::ShortQuery,
        _ => SearchMode::Relevance,
    };

    let order = match mode {
        SearchMode::Browse => {
            vec![OrderKey::Word, OrderKey::Homonym, OrderKey::Id]
        }
        SearchMode::ShortQuery => vec![
            OrderKey::MatchRank,
            OrderKey::Word,
            OrderKey::Homonym,
            OrderKey::Id,
        ],
        SearchMode::Relevance => vec![
            OrderKey::MatchRank,
            OrderKey::Score,
            OrderKey::Word,
            OrderKey::Homonym,
            OrderKey::Id,
        ],
    };

    Ok(QueryPlan {
        mode,
        q,
        letter,
        pos,
        page,
        per_page,
        order,
    })
}

fn normalize_letter(raw: &str) -> Result<Option<String>> {
    let raw = raw.trim();
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (None, _) => Ok(None),
        (Some(c), None) if c.is_alphabetic() => {
            Ok(Some(c.to_uppercase().collect()))
        }
        _ => Err(Error::invalid(
            "letter",
            format!("expected a single letter, got '{raw}'"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(q: &str) -> SearchRequest {
        SearchRequest::query(q)
    }

    #[test]
    fn mode_depends_on_query_length() {
        assert_eq!(plan(&req("")).unwrap().mode, SearchMode::Browse);
        assert_eq!(plan(&req("   ")).unwrap().mode, SearchMode::Browse);
        assert_eq!(plan(&req("a")).unwrap().mode, SearchMode::ShortQuery);
        assert_eq!(plan(&req("aro")).unwrap().mode, SearchMode::ShortQuery);
        assert_eq!(plan(&req("arob")).unwrap().mode, SearchMode::Relevance);
        assert_eq!(plan(&req(" aro ")).unwrap().q, "aro");
    }

    #[test]
    fn length_counts_characters() {
        // Three characters, six bytes.
        assert_eq!(plan(&req("ŋɔɛ")).unwrap().mode, SearchMode::ShortQuery);
    }

    #[test]
    fn defaults() {
        let p = plan(&SearchRequest::default()).unwrap();
        assert_eq!(p.page, 1);
        assert_eq!(p.per_page, DEFAULT_PER_PAGE);
        assert_eq!(p.letter, None);
        assert_eq!(p.pos, None);
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn page_bounds() {
        let mut r = req("aro");
        r.page = Some(0);
        assert!(matches!(
            plan(&r),
            Err(Error::InvalidParameter { name: "page", .. })
        ));

        r.page = Some(3);
        r.per_page = Some(10);
        assert_eq!(plan(&r).unwrap().offset(), 20);
    }

    #[test]
    fn per_page_bounds() {
        let mut r = req("");
        for bad in [0, 101] {
            r.per_page = Some(bad);
            assert!(matches!(
                plan(&r),
                Err(Error::InvalidParameter {
                    name: "per_page",
                    ..
                })
            ));
        }
        for good in [1, 100] {
            r.per_page = Some(good);
            assert_eq!(plan(&r).unwrap().per_page, good);
        }
    }

    #[test]
    fn letter_is_uppercased_and_validated() {
        let mut r = req("");
        r.letter = "a".into();
        assert_eq!(plan(&r).unwrap().letter.as_deref(), Some("A"));

        for bad in ["ab", "1", "-"] {
            r.letter = bad.into();
            assert!(matches!(
                plan(&r),
                Err(Error::InvalidParameter { name: "letter", .. })
            ));
        }
    }

    #[test]
    fn empty_pos_is_no_filter() {
        let mut r = req("");
        r.pos = " ".into();
        assert_eq!(plan(&r).unwrap().pos, None);
        r.pos = "noun".into();
        assert_eq!(plan(&r).unwrap().filter().pos.as_deref(), Some("noun"));
    }

    #[test]
    fn order_per_mode() {
        assert_eq!(plan(&req("")).unwrap().order[0], OrderKey::Word);
        assert_eq!(plan(&req("ar")).unwrap().order[0], OrderKey::MatchRank);
        assert!(!plan(&req("ar")).unwrap().order.contains(&OrderKey::Score));
        assert_eq!(plan(&req("water")).unwrap().order[1], OrderKey::Score);
    }
}
