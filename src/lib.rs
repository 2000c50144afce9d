//! wordbank - a bilingual dictionary with ranked search.
//!
//! wordbank stores headwords with their definitions, examples and
//! cross-references in [redb](https://github.com/cberner/redb), indexes
//! definitions with [Tantivy](https://github.com/quickwit-oss/tantivy) for
//! stemmed relevance search, and ranks results so exact headword matches
//! come first, then headword prefixes, then definition matches.
//!
//! # Quick start
//!
//! ```no_run
//! use wordbank::{DataDir, Dictionary, SearchRequest};
//! use wordbank::model::{NewDefinition, NewEntry, NewTerm};
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let dict = Dictionary::open(&data_dir).unwrap();
//!
//! dict.create_entry(&NewEntry {
//!     term: NewTerm::new("akoro").with_pos("verb"),
//!     definitions: vec![NewDefinition::new("to cultivate")],
//!     ..NewEntry::default()
//! })
//! .unwrap();
//!
//! let page = dict.search(&SearchRequest::query("cultivate")).unwrap();
//! for row in &page.results {
//!     println!("{} ({}): {}", row.word, row.url, row.definition_preview);
//! }
//! ```

pub mod cache;
pub mod cli;
pub mod data_dir;
pub mod definition_index;
pub mod dictionary;
pub mod entry_store;
pub mod error;
pub mod import;
pub mod mcp;
pub mod model;
pub mod query_plan;
pub mod search;
pub mod settings;
pub mod text_util;
pub mod wotd;

pub use data_dir::DataDir;
pub use definition_index::DefinitionIndex;
pub use dictionary::Dictionary;
pub use entry_store::EntryStore;
pub use error::{Error, Result};
pub use query_plan::SearchRequest;
pub use search::{SearchPage, SearchRow};
