use std::{cmp::Ordering, collections::HashMap};

use serde::{Deserialize, Serialize};

use crate::{
    definition_index::DefinitionIndex,
    entry_store::{EntryStore, MatchScope},
    error::Result,
    model::{Gender, Term},
    query_plan::{OrderKey, QueryPlan, SearchMode},
    text_util,
};

/// Word equals the query, ignoring case.
pub const RANK_EXACT: u8 = 0;
/// Word starts with the query.
pub const RANK_PREFIX: u8 = 1;
/// Only a definition matched.
pub const RANK_DEFINITION: u8 = 2;

/// One row of a result page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRow {
    pub id: u64,
    pub word: String,
    pub slug: String,
    pub homonym_number: Option<u8>,
    pub pos: String,
    pub pos_detail: Option<String>,
    pub gender: Option<Gender>,
    pub plural: Option<String>,
    pub dialect: Option<String>,
    pub verb_stem: Option<String>,
    pub definition_preview: String,
    pub url: String,
    /// Match rank; absent when browsing.
    pub rank: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    pub results: Vec<SearchRow>,
    pub total: u64,
    pub pages: u64,
    pub current_page: u32,
}

struct Candidate {
    term: Term,
    sort_word: String,
    rank: u8,
    score: f32,
    first_definition: Option<String>,
}

impl Candidate {
    fn new(term: Term, rank: u8, first_definition: Option<String>) -> Self {
        Self {
            sort_word: term.word.to_lowercase(),
            term,
            rank,
            score: 0.0,
            first_definition,
        }
    }
}

/// Answer a planned search.
///
/// 1. Collect candidates for the plan's mode
/// 2. Deduplicate on term id, keeping the best rank and score
/// 3. Order by the plan's tie-break sequence
/// 4. Cut the requested page and build its rows
pub fn execute_search(
    plan: &QueryPlan,
    store: &EntryStore,
    index: &DefinitionIndex,
    base_url: &str,
) -> Result<SearchPage> {
    let filter = plan.filter();
    let needle = plan.q.to_lowercase();

    let mut candidates: HashMap<u64, Candidate> = HashMap::new();
    let mut offer = |c: Candidate| {
        candidates
            .entry(c.term.id)
            .and_modify(|existing| {
                if (c.rank, -c.score) < (existing.rank, -existing.score) {
                    existing.rank = c.rank;
                    existing.score = c.score;
                }
                if existing.first_definition.is_none() {
                    existing.first_definition = c.first_definition.clone();
                }
            })
            .or_insert(c);
    };

    match plan.mode {
        SearchMode::Browse => {
            for term in store.browse(&filter)? {
                offer(Candidate::new(term, RANK_EXACT, None));
            }
        }
        SearchMode::ShortQuery => {
            for m in
                store.match_text(&filter, &plan.q, MatchScope::WordOrDefinition)?
            {
                let rank = match_rank(&m.term.word, &needle);
                offer(Candidate::new(m.term, rank, m.first_definition));
            }
        }
        SearchMode::Relevance => {
            for m in store.match_text(&filter, &plan.q, MatchScope::Word)? {
                let rank = match_rank(&m.term.word, &needle);
                offer(Candidate::new(m.term, rank, m.first_definition));
            }

            let scores = index.relevance(&plan.q)?;
            let ids: Vec<u64> = scores.iter().map(|s| s.term_id).collect();
            let score_of: HashMap<u64, f32> =
                scores.iter().map(|s| (s.term_id, s.score)).collect();
            for term in store.terms_by_ids(&ids)? {
                if !filter.accepts(&term) {
                    continue;
                }
                let rank = match_rank(&term.word, &needle);
                let mut c = Candidate::new(term, rank, None);
                c.score = score_of.get(&c.term.id).copied().unwrap_or(0.0);
                offer(c);
            }
        }
    }

    let mut ordered: Vec<Candidate> = candidates.into_values().collect();
    ordered.sort_by(|a, b| compare(&plan.order, a, b));

    let total = ordered.len() as u64;
    let pages = total.div_ceil(u64::from(plan.per_page));

    let mut results = Vec::with_capacity(plan.per_page as usize);
    for c in ordered
        .into_iter()
        .skip(plan.offset())
        .take(plan.per_page as usize)
    {
        let first = match c.first_definition {
            Some(text) => text,
            None => store.first_definition_text(c.term.id)?.unwrap_or_default(),
        };
        let rank = (plan.mode != SearchMode::Browse).then_some(c.rank);
        results.push(to_row(c.term, &first, rank, base_url));
    }

    tracing::debug!(
        mode = ?plan.mode,
        q = %plan.q,
        total,
        page = plan.page,
        "search executed"
    );

    Ok(SearchPage {
        results,
        total,
        pages,
        current_page: plan.page,
    })
}

/// Rank a word against a lowercased query.
fn match_rank(word: &str, needle: &str) -> u8 {
    let word = word.to_lowercase();
    if word == needle {
        RANK_EXACT
    } else if word.starts_with(needle) {
        RANK_PREFIX
    } else {
        RANK_DEFINITION
    }
}

fn compare(order: &[OrderKey], a: &Candidate, b: &Candidate) -> Ordering {
    order.iter().fold(Ordering::Equal, |acc, key| {
        acc.then_with(|| match key {
            OrderKey::MatchRank => a.rank.cmp(&b.rank),
            OrderKey::Score if a.rank == RANK_DEFINITION
                && b.rank == RANK_DEFINITION =>
            {
                b.score.total_cmp(&a.score)
            }
            OrderKey::Score => Ordering::Equal,
            OrderKey::Word => a.sort_word.cmp(&b.sort_word),
            OrderKey::Homonym => {
                a.term.homonym_number.cmp(&b.term.homonym_number)
            }
            OrderKey::Id => a.term.id.cmp(&b.term.id),
        })
    })
}

fn to_row(
    term: Term,
    first_definition: &str,
    rank: Option<u8>,
    base_url: &str,
) -> SearchRow {
    SearchRow {
        url: text_util::entry_url(base_url, &term.slug),
        definition_preview: text_util::definition_preview(first_definition),
        id: term.id,
        word: term.word,
        slug: term.slug,
        homonym_number: term.homonym_number,
        pos: term.pos,
        pos_detail: term.pos_detail,
        gender: term.gender,
        plural: term.plural,
        dialect: term.dialect,
        verb_stem: term.verb_stem,
        rank,
    }
}

/// Format a result page for human-readable terminal output.
pub fn format_human(page: &SearchPage) {
    if page.results.is_empty() {
        println!("No results found.");
        return;
    }

    for r in &page.results {
        let homonym = r.homonym_number.map(|n| format!(" ({n})")).unwrap_or_default();
        let pos = if r.pos.is_empty() {
            String::new()
        } else {
            format!(" [{}]", r.pos)
        };
        println!("{}{}{}  {}", r.word, homonym, pos, r.url);
        if !r.definition_preview.is_empty() {
            println!("     {}", r.definition_preview);
        }
    }
    println!(
        "\npage {}/{} ({} result(s))",
        page.current_page,
        page.pages.max(1),
        page.total
    );
}
