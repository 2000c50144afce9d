use std::{collections::HashMap, path::Path};

use tantivy::{
    Index,
    IndexReader,
    IndexWriter,
    TantivyDocument,
    collector::{Count, TopDocs},
    doc,
    query::{BooleanQuery, Occur, Query, TermQuery},
    schema::*,
    tokenizer::{
        LowerCaser,
        RemoveLongFilter,
        SimpleTokenizer,
        Stemmer,
        TextAnalyzer,
        TokenStream,
    },
};

use crate::{error::Result, model::Definition};

/// Memory budget handed to every index writer.
const WRITER_MEMORY_BUDGET: usize = 15_000_000;

/// Field names used in the schema.
pub mod fields {
    pub const DEFINITION_ID: &str = "definition_id";
    pub const TERM_ID: &str = "term_id";
    pub const BODY: &str = "body";
}

/// Full-text index over definition texts, one document per definition.
pub struct DefinitionIndex {
    index: Index,
    reader: IndexReader,
    fields: SchemaFields,
}

#[derive(Clone, Copy)]
struct SchemaFields {
    definition_id: Field,
    term_id: Field,
    body: Field,
}

/// Relevance of one term: the best score among its definitions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TermScore {
    pub term_id: u64,
    pub score: f32,
}

fn build_schema() -> (Schema, SchemaFields) {
    let mut builder = Schema::builder();

    let definition_id =
        builder.add_u64_field(fields::DEFINITION_ID, INDEXED | STORED);
    let term_id =
        builder.add_u64_field(fields::TERM_ID, INDEXED | STORED | FAST);

    let body_opts = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer("en_stem")
            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
    );
    let body = builder.add_text_field(fields::BODY, body_opts);

    let schema = builder.build();
    (
        schema,
        SchemaFields {
            definition_id,
            term_id,
            body,
        },
    )
}

fn register_tokenizers(index: &Index) {
    let en_stem = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .filter(Stemmer::new(tantivy::tokenizer::Language::English))
        .build();
    index.tokenizers().register("en_stem", en_stem);
}

impl DefinitionIndex {
    /// Open or create the index in the given directory.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let (schema, fields) = build_schema();

        let mmap_dir = tantivy::directory::MmapDirectory::open(dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?;
        let index = if Index::exists(&mmap_dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?
        {
            Index::open(mmap_dir)?
        } else {
            Index::create(mmap_dir, schema, tantivy::IndexSettings::default())?
        };

        register_tokenizers(&index);
        let reader = index.reader()?;

        Ok(Self {
            index,
            reader,
            fields,
        })
    }

    /// Create an in-memory index (for testing).
    pub fn open_in_ram() -> Result<Self> {
        let (schema, fields) = build_schema();
        let index = Index::create_in_ram(schema);
        register_tokenizers(&index);
        let reader = index.reader()?;

        Ok(Self {
            index,
            reader,
            fields,
        })
    }

    fn writer(&self) -> Result<IndexWriter> {
        Ok(self.index.writer(WRITER_MEMORY_BUDGET)?)
    }

    fn commit(&self, mut writer: IndexWriter) -> Result<()> {
        writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    fn add(&self, writer: &IndexWriter, def: &Definition) -> Result<()> {
        let f = self.fields;
        writer.delete_term(tantivy::Term::from_field_u64(
            f.definition_id,
            def.id,
        ));
        writer.add_document(doc!(
            f.definition_id => def.id,
            f.term_id => def.term_id,
            f.body => def.definition_text.as_str(),
        ))?;
        Ok(())
    }

    /// Drop every indexed definition of `term_id` and index `definitions`
    /// in its place.
    pub fn replace_term(
        &self,
        term_id: u64,
        definitions: &[Definition],
    ) -> Result<()> {
        let writer = self.writer()?;
        writer
            .delete_term(tantivy::Term::from_field_u64(self.fields.term_id, term_id));
        for def in definitions {
            self.add(&writer, def)?;
        }
        self.commit(writer)
    }

    /// Remove every document belonging to the given terms.
    pub fn delete_terms(&self, term_ids: &[u64]) -> Result<()> {
        if term_ids.is_empty() {
            return Ok(());
        }
        let writer = self.writer()?;
        for &id in term_ids {
            writer.delete_term(tantivy::Term::from_field_u64(
                self.fields.term_id,
                id,
            ));
        }
        self.commit(writer)
    }

    /// Throw the current contents away and index `definitions` afresh.
    pub fn rebuild(&self, definitions: &[Definition]) -> Result<()> {
        let writer = self.writer()?;
        writer.delete_all_documents()?;
        for def in definitions {
            self.add(&writer, def)?;
        }
        self.commit(writer)
    }

    /// Number of indexed definitions.
    pub fn num_docs(&self) -> Result<u64> {
        self.reader.reload()?;
        Ok(self.reader.searcher().num_docs())
    }

    /// Score every definition against `query` and fold the hits down to
    /// one entry per term, keeping the best score. Sorted best first.
    pub fn relevance(&self, query: &str) -> Result<Vec<TermScore>> {
        let f = self.fields;
        self.reader.reload()?;
        let searcher = self.reader.searcher();

        let query = match self.text_query(query)? {
            Some(query) => query,
            None => return Ok(Vec::new()),
        };

        let hits = searcher.search(&query, &Count)?;
        if hits == 0 {
            return Ok(Vec::new());
        }
        let top_docs = searcher.search(&query, &TopDocs::with_limit(hits))?;

        let mut best: HashMap<u64, f32> = HashMap::new();
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            let term_id = extract_u64(&doc, f.term_id);
            best.entry(term_id)
                .and_modify(|s| *s = s.max(score))
                .or_insert(score);
        }

        let mut scores: Vec<TermScore> = best
            .into_iter()
            .map(|(term_id, score)| TermScore { term_id, score })
            .collect();
        scores.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.term_id.cmp(&b.term_id))
        });
        Ok(scores)
    }

    /// Run `text` through the body analyzer and OR the resulting terms.
    /// Query syntax has no meaning here; `None` when nothing is left to
    /// match.
    fn text_query(&self, text: &str) -> Result<Option<BooleanQuery>> {
        let body = self.fields.body;
        let mut analyzer = self.index.tokenizer_for_field(body)?;
        let mut stream = analyzer.token_stream(text);

        let mut tokens: Vec<String> = Vec::new();
        stream.process(&mut |token| {
            if !tokens.contains(&token.text) {
                tokens.push(token.text.clone());
            }
        });
        if tokens.is_empty() {
            return Ok(None);
        }

        let clauses: Vec<(Occur, Box<dyn Query>)> = tokens
            .iter()
            .map(|t| {
                let term = tantivy::Term::from_field_text(body, t);
                let query: Box<dyn Query> = Box::new(TermQuery::new(
                    term,
                    IndexRecordOption::WithFreqs,
                ));
                (Occur::Should, query)
            })
            .collect();
        Ok(Some(BooleanQuery::new(clauses)))
    }
}

impl std::fmt::Debug for DefinitionIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefinitionIndex").finish_non_exhaustive()
    }
}

fn extract_u64(doc: &TantivyDocument, field: Field) -> u64 {
    doc.get_first(field).and_then(|v| v.as_u64()).unwrap_or(0)
}
