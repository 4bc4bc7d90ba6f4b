//! In-memory tantivy index over document titles and contents.
//!
//! `id` is an untokenized stored key; `title` and `content` go through the
//! CJK n-gram analyzer and are stored for rendering. Queries score title
//! clauses with `title_boost` and content clauses with `content_boost`.
//! All writes serialize on the writer lock and commit before returning.

use std::collections::HashSet;

use parking_lot::Mutex;
use tantivy::{
    Index,
    IndexReader,
    IndexWriter,
    ReloadPolicy,
    TantivyDocument,
    Term,
    collector::{Count, TopDocs},
    doc,
    query::{BooleanQuery, BoostQuery, FuzzyTermQuery, Occur, Query, TermQuery},
    schema::*,
    tokenizer::{RemoveLongFilter, TextAnalyzer},
};

use crate::{
    config::IndexConfig,
    error::Result,
    record::DocumentRecord,
    tokenizer::{NgramTokenizer, TOKENIZER_NAME, tokenize},
};

/// Terms longer than this many bytes are dropped at index time.
const MAX_TERM_BYTES: usize = 4096;

/// Field names used in the schema.
pub mod fields {
    pub const ID: &str = "id";
    pub const TITLE: &str = "title";
    pub const CONTENT: &str = "content";
}

/// In-memory inverted index over document titles and contents.
///
/// Derived state only: it is rebuilt from [`DocumentRecord`]s whenever the
/// engine (re)initializes and is never persisted.
pub struct SearchIndex {
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    fields: SchemaFields,
    config: IndexConfig,
}

#[derive(Clone, Copy)]
struct SchemaFields {
    id: Field,
    title: Field,
    content: Field,
}

/// An unfiltered hit straight from the index.
#[derive(Debug, Clone)]
pub struct RawHit {
    pub id: String,
    pub score: f32,
    /// Distinct document terms that matched some query token.
    pub terms: Vec<String>,
    pub title: String,
    pub content: String,
}

fn build_schema() -> (Schema, SchemaFields) {
    let mut builder = Schema::builder();

    let id = builder.add_text_field(fields::ID, STRING | STORED);

    let text_opts = TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(TOKENIZER_NAME)
                .set_index_option(IndexRecordOption::WithFreqs),
        )
        .set_stored();
    let title = builder.add_text_field(fields::TITLE, text_opts.clone());
    let content = builder.add_text_field(fields::CONTENT, text_opts);

    (builder.build(), SchemaFields { id, title, content })
}

fn register_tokenizers(index: &Index) {
    let analyzer = TextAnalyzer::builder(NgramTokenizer)
        .filter(RemoveLongFilter::limit(MAX_TERM_BYTES))
        .build();
    index.tokenizers().register(TOKENIZER_NAME, analyzer);
}

impl SearchIndex {
    /// Create an empty index.
    pub fn new(config: IndexConfig) -> Result<Self> {
        let (schema, fields) = build_schema();
        let index = Index::create_in_ram(schema);
        register_tokenizers(&index);

        let writer = index.writer(config.writer_memory_budget)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        Ok(Self {
            reader,
            writer: Mutex::new(writer),
            fields,
            config,
        })
    }

    /// Bulk-load records into a freshly created index.
    ///
    /// Ids must be unique and not already present.
    pub fn add_all(&self, records: &[DocumentRecord]) -> Result<()> {
        let mut writer = self.writer.lock();
        for record in records {
            writer.add_document(self.to_document(record))?;
        }
        self.commit(&mut writer)
    }

    /// Insert one record. The caller discards any previous entry first.
    pub fn add(&self, record: &DocumentRecord) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.add_document(self.to_document(record))?;
        self.commit(&mut writer)
    }

    /// Replace any entry with the record's id by `record` in one commit.
    /// Returns whether an entry was replaced.
    pub fn upsert(&self, record: &DocumentRecord) -> Result<bool> {
        let mut writer = self.writer.lock();
        let replaced = self.contains(&record.id)?;
        writer.delete_term(self.id_term(&record.id));
        writer.add_document(self.to_document(record))?;
        self.commit(&mut writer)?;
        Ok(replaced)
    }

    /// Remove the record with `id`. Returns whether it was present.
    pub fn discard(&self, id: &str) -> Result<bool> {
        let mut writer = self.writer.lock();
        // The reader reloads inside `commit`, so under the writer lock it
        // sees every earlier write.
        if !self.contains(id)? {
            return Ok(false);
        }
        writer.delete_term(self.id_term(id));
        self.commit(&mut writer)?;
        Ok(true)
    }

    pub fn contains(&self, id: &str) -> Result<bool> {
        let searcher = self.reader.searcher();
        let query = TermQuery::new(self.id_term(id), IndexRecordOption::Basic);
        Ok(searcher.search(&query, &Count)? > 0)
    }

    /// Number of live documents.
    pub fn document_count(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Run a tokenized, boosted, prefix- and fuzzy-matching query.
    ///
    /// Each query token is looked up as an exact term (BM25-scored) and as
    /// a fuzzy prefix whose edit distance grows with the token length.
    /// Title clauses carry `title_boost`. Every matching document comes
    /// back, best first.
    pub fn search(&self, query_str: &str) -> Result<Vec<RawHit>> {
        let query_terms = dedup(tokenize(query_str));
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();
        let query = self.build_query(&query_terms);
        let limit = (searcher.num_docs() as usize).max(1);
        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address)?;
            let title = extract_text(&doc, self.fields.title);
            let content = extract_text(&doc, self.fields.content);
            hits.push(RawHit {
                id: extract_text(&doc, self.fields.id),
                score,
                terms: self.matched_terms(&query_terms, &title, &content),
                title,
                content,
            });
        }

        Ok(hits)
    }

    fn build_query(&self, query_terms: &[String]) -> BooleanQuery {
        let boosted_fields = [
            (self.fields.title, self.config.title_boost),
            (self.fields.content, self.config.content_boost),
        ];

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for (field, boost) in boosted_fields {
            for term_str in query_terms {
                let term = Term::from_field_text(field, term_str);
                let distance =
                    self.config.fuzzy_distance(term_str.chars().count());

                let exact =
                    TermQuery::new(term.clone(), IndexRecordOption::WithFreqs);
                let fuzzy = FuzzyTermQuery::new_prefix(term, distance, true);

                clauses.push((
                    Occur::Should,
                    Box::new(BoostQuery::new(Box::new(exact), boost)),
                ));
                clauses.push((
                    Occur::Should,
                    Box::new(BoostQuery::new(Box::new(fuzzy), boost)),
                ));
            }
        }

        BooleanQuery::new(clauses)
    }

    fn matched_terms(
        &self,
        query_terms: &[String],
        title: &str,
        content: &str,
    ) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut matched = Vec::new();

        for term in tokenize(title).into_iter().chain(tokenize(content)) {
            if !seen.insert(term.clone()) {
                continue;
            }
            let hit = query_terms.iter().any(|q| {
                let distance = self.config.fuzzy_distance(q.chars().count());
                term_matches(q, &term, distance)
            });
            if hit {
                matched.push(term);
            }
        }

        matched
    }

    fn to_document(&self, record: &DocumentRecord) -> TantivyDocument {
        let f = self.fields;
        doc!(
            f.id => record.id.as_str(),
            f.title => record.title.as_str(),
            f.content => record.content.as_str(),
        )
    }

    fn id_term(&self, id: &str) -> Term {
        Term::from_field_text(self.fields.id, id)
    }

    fn commit(&self, writer: &mut IndexWriter) -> Result<()> {
        writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }
}

impl std::fmt::Debug for SearchIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchIndex")
            .field("documents", &self.document_count())
            .finish_non_exhaustive()
    }
}

fn dedup(terms: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    terms.into_iter().filter(|t| seen.insert(t.clone())).collect()
}

fn extract_text(doc: &TantivyDocument, field: Field) -> String {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

/// Mirror of tantivy's fuzzy-prefix semantics: `term` matches when some
/// prefix of it lies within `distance` edits (transpositions count as one)
/// of `query`.
fn term_matches(query: &str, term: &str, distance: u8) -> bool {
    if term.starts_with(query) {
        return true;
    }
    distance > 0 && prefix_edit_distance(query, term) <= distance as usize
}

fn prefix_edit_distance(query: &str, term: &str) -> usize {
    let q: Vec<char> = query.chars().collect();
    let t: Vec<char> = term.chars().collect();

    // dp[i][j]: distance between q[..i] and t[..j]
    let mut dp = vec![vec![0usize; t.len() + 1]; q.len() + 1];
    for (i, row) in dp.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=t.len() {
        dp[0][j] = j;
    }

    for i in 1..=q.len() {
        for j in 1..=t.len() {
            let cost = usize::from(q[i - 1] != t[j - 1]);
            let mut best = (dp[i - 1][j] + 1)
                .min(dp[i][j - 1] + 1)
                .min(dp[i - 1][j - 1] + cost);
            if i > 1
                && j > 1
                && q[i - 1] == t[j - 2]
                && q[i - 2] == t[j - 1]
            {
                best = best.min(dp[i - 2][j - 2] + 1);
            }
            dp[i][j] = best;
        }
    }

    dp[q.len()].iter().copied().min().unwrap_or(q.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(records: &[DocumentRecord]) -> SearchIndex {
        let idx = SearchIndex::new(IndexConfig::default()).unwrap();
        idx.add_all(records).unwrap();
        idx
    }

    #[test]
    fn create_and_search() {
        let idx = index_with(&[
            DocumentRecord::new("a", "Hello World", "lorem ipsum"),
            DocumentRecord::new("b", "Rust Programming", "systems language"),
        ]);

        assert_eq!(idx.document_count(), 2);
        let hits = idx.search("hello").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[0].title, "Hello World");
        assert_eq!(hits[0].content, "lorem ipsum");
        assert!(hits[0].score > 0.0);
    }

    #[test]
    fn empty_query_returns_nothing() {
        let idx = index_with(&[DocumentRecord::new("a", "Hello", "World")]);
        assert!(idx.search("").unwrap().is_empty());
        assert!(idx.search(" ,. ").unwrap().is_empty());
    }

    #[test]
    fn prefix_matching() {
        let idx = index_with(&[DocumentRecord::new(
            "a",
            "Quarterly Report",
            "revenue up",
        )]);
        let hits = idx.search("quart").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].terms, vec!["quarterly"]);
    }

    #[test]
    fn fuzzy_matching_finds_typos() {
        let idx = index_with(&[DocumentRecord::new(
            "a",
            "Guide",
            "an introduction to programming",
        )]);
        let hits = idx.search("programing").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].terms, vec!["programming"]);
    }

    #[test]
    fn title_boost() {
        let idx = index_with(&[
            DocumentRecord::new("a", "Rust Guide", "programming language guide"),
            DocumentRecord::new(
                "b",
                "Language Guide",
                "rust is a programming language",
            ),
        ]);

        let hits = idx.search("rust").unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
    }

    #[test]
    fn cjk_substring_matches() {
        let idx = index_with(&[
            DocumentRecord::new("a", "年度总结", "本季度报告已经完成"),
            DocumentRecord::new("b", "English only", "nothing to see"),
        ]);
        let hits = idx.search("季度").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
        assert!(hits[0].terms.contains(&"季度".to_string()));
    }

    #[test]
    fn add_then_discard() {
        let idx = index_with(&[]);
        assert_eq!(idx.document_count(), 0);

        idx.add(&DocumentRecord::new("d1", "Quarterly Report", "revenue up"))
            .unwrap();
        assert_eq!(idx.document_count(), 1);
        assert!(idx.contains("d1").unwrap());

        assert!(idx.discard("d1").unwrap());
        assert_eq!(idx.document_count(), 0);
        assert!(idx.search("quarterly").unwrap().is_empty());
    }

    #[test]
    fn discard_missing_id_is_not_an_error() {
        let idx = index_with(&[DocumentRecord::new("a", "Hello", "World")]);
        assert!(!idx.discard("ghost").unwrap());
        assert!(idx.discard("a").unwrap());
        assert!(!idx.discard("a").unwrap());
        assert_eq!(idx.document_count(), 0);
    }

    #[test]
    fn discard_then_add_replaces() {
        let idx = index_with(&[DocumentRecord::new("a", "Old Title", "old")]);
        idx.discard("a").unwrap();
        idx.add(&DocumentRecord::new("a", "New Title", "new")).unwrap();

        assert_eq!(idx.document_count(), 1);
        let hits = idx.search("title").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "New Title");
        assert!(idx.search("old").unwrap().is_empty());
    }

    #[test]
    fn upsert_replaces_in_place() {
        let idx = index_with(&[DocumentRecord::new("a", "Old Title", "old")]);

        assert!(idx.upsert(&DocumentRecord::new("a", "New Title", "new")).unwrap());
        assert!(!idx.upsert(&DocumentRecord::new("b", "Other", "")).unwrap());
        assert!(idx.upsert(&DocumentRecord::new("b", "Other", "")).unwrap());

        assert_eq!(idx.document_count(), 2);
        assert_eq!(idx.search("title").unwrap().len(), 1);
        assert!(idx.search("old").unwrap().is_empty());
    }

    #[test]
    fn concurrent_upserts_keep_one_entry_per_id() {
        let idx = index_with(&[]);

        std::thread::scope(|scope| {
            for worker in 0..8 {
                let idx = &idx;
                scope.spawn(move || {
                    for round in 0..20 {
                        idx.upsert(&DocumentRecord::new(
                            "same",
                            "Hello",
                            format!("worker {worker} round {round}"),
                        ))
                        .unwrap();
                        assert_eq!(idx.document_count(), 1);
                    }
                });
            }
        });

        assert_eq!(idx.document_count(), 1);
        assert_eq!(idx.search("hello").unwrap().len(), 1);
    }

    #[test]
    fn search_returns_every_match() {
        let mut records = Vec::new();
        for i in 0..150 {
            records.push(DocumentRecord::new(format!("r{i}"), "Report", ""));
        }
        for i in 0..120 {
            records.push(DocumentRecord::new(format!("s{i}"), "Reports", ""));
        }
        let idx = index_with(&records);

        assert_eq!(idx.search("report").unwrap().len(), 270);
    }

    #[test]
    fn prefix_edit_distance_basics() {
        assert_eq!(prefix_edit_distance("prog", "programming"), 0);
        assert_eq!(prefix_edit_distance("programing", "programming"), 1);
        assert_eq!(prefix_edit_distance("teh", "the"), 1);
        assert_eq!(prefix_edit_distance("xyz", "abc"), 3);
        assert_eq!(prefix_edit_distance("", "abc"), 0);
    }

    #[test]
    fn term_matches_respects_distance() {
        assert!(term_matches("quart", "quarterly", 0));
        assert!(!term_matches("qwart", "quarterly", 0));
        assert!(term_matches("qwart", "quarterly", 1));
    }
}
