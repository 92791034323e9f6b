//! TF-IDF vector index.
//!
//! Every mutation rebuilds the vocabulary and re-vectorizes all documents so
//! vectors always share one vocabulary snapshot. Document frequencies are
//! maintained incrementally; the rebuild itself runs in parallel.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant, SystemTime};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, trace};

use super::tokenizer::{is_builtin_stop_word, Tokenizer};
use crate::error::VectorIndexError;
use crate::model::Metadata;

/// Index construction settings.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndexConfig {
    /// Maximum vocabulary size
    pub max_features: usize,
    /// Minimum number of documents a term must appear in
    pub min_doc_freq: usize,
    /// Maximum share of documents a term may appear in, in (0, 1]
    pub max_doc_freq: f64,
    /// Caller stop words, on top of the built-in list
    pub stop_words: Vec<String>,
    /// Apply the suffix stemmer
    pub enable_stemming: bool,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            max_features: codeloom_config::DEFAULT_MAX_FEATURES,
            min_doc_freq: 1,
            max_doc_freq: codeloom_config::DEFAULT_MAX_DOC_FREQ,
            stop_words: Vec::new(),
            enable_stemming: false,
        }
    }
}

impl From<&codeloom_config::VectorConfig> for VectorIndexConfig {
    fn from(config: &codeloom_config::VectorConfig) -> Self {
        Self {
            max_features: config.max_features,
            min_doc_freq: config.min_doc_freq,
            max_doc_freq: config.max_doc_freq,
            stop_words: config.stop_words.clone(),
            enable_stemming: config.enable_stemming,
        }
    }
}

impl VectorIndexConfig {
    /// Reject settings outside their valid ranges
    pub fn validate(&self) -> Result<(), VectorIndexError> {
        if self.max_features == 0 {
            return Err(VectorIndexError::invalid_config(
                "max_features",
                "must be greater than 0",
            ));
        }
        if self.min_doc_freq == 0 {
            return Err(VectorIndexError::invalid_config(
                "min_doc_freq",
                "must be at least 1",
            ));
        }
        if !(self.max_doc_freq > 0.0 && self.max_doc_freq <= 1.0) {
            return Err(VectorIndexError::invalid_config(
                "max_doc_freq",
                format!("{} is outside (0, 1]", self.max_doc_freq),
            ));
        }
        Ok(())
    }
}

/// Per-search options.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    /// Maximum number of results
    pub top_k: usize,
    /// Minimum cosine similarity in [0, 1]
    pub threshold: f32,
    /// Exact metadata equality filters
    pub filters: Metadata,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: codeloom_config::DEFAULT_TOP_K,
            threshold: codeloom_config::DEFAULT_THRESHOLD,
            filters: Metadata::new(),
        }
    }
}

impl From<&codeloom_config::VectorConfig> for SearchOptions {
    fn from(config: &codeloom_config::VectorConfig) -> Self {
        Self {
            top_k: config.top_k,
            threshold: config.threshold,
            filters: Metadata::new(),
        }
    }
}

impl SearchOptions {
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    fn validate(&self) -> Result<(), VectorIndexError> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(VectorIndexError::invalid_config(
                "threshold",
                format!("{} is outside [0, 1]", self.threshold),
            ));
        }
        if self.top_k == 0 {
            return Err(VectorIndexError::invalid_config(
                "top_k",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// A document and its vector under the current vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentVector {
    pub id: String,
    pub content: String,
    /// L2-normalized; dimension equals the vocabulary size
    pub vector: Vec<f32>,
    pub metadata: Metadata,
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub id: String,
    /// Cosine similarity in [0, 1]
    pub score: f32,
    pub content: String,
    pub metadata: Metadata,
}

/// Search hits plus timing.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    /// Sorted by descending score
    pub results: Vec<SearchResult>,
    pub search_time: Duration,
    pub total_documents: usize,
}

/// Index size statistics.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub document_count: usize,
    pub vocabulary_size: usize,
    /// Approximate memory footprint, human readable ("1.2 KB")
    pub index_size: String,
    pub last_updated: SystemTime,
}

#[derive(Debug, Clone)]
struct IndexedDocument {
    content: String,
    metadata: Metadata,
    term_counts: HashMap<String, usize>,
    token_count: usize,
    /// Insertion order, used to break score ties
    seq: u64,
    vector: Vec<f32>,
}

/// TF-IDF index over free-text documents.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    config: VectorIndexConfig,
    tokenizer: Tokenizer,
    stop_words: HashSet<String>,

    documents: HashMap<String, IndexedDocument>,
    doc_freq: HashMap<String, usize>,

    /// term → slot
    vocabulary: HashMap<String, usize>,
    /// slot → term
    terms: Vec<String>,
    /// slot → idf
    idf: Vec<f32>,

    next_seq: u64,
    last_updated: SystemTime,
}

impl VectorIndex {
    /// Create an empty index, rejecting invalid settings.
    pub fn new(config: VectorIndexConfig) -> Result<Self, VectorIndexError> {
        config.validate()?;
        let tokenizer = Tokenizer::new(config.enable_stemming);
        let stop_words = config.stop_words.iter().map(|w| w.to_lowercase()).collect();

        Ok(Self {
            config,
            tokenizer,
            stop_words,
            documents: HashMap::new(),
            doc_freq: HashMap::new(),
            vocabulary: HashMap::new(),
            terms: Vec::new(),
            idf: Vec::new(),
            next_seq: 0,
            last_updated: SystemTime::now(),
        })
    }

    pub fn config(&self) -> &VectorIndexConfig {
        &self.config
    }

    /// Number of documents
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.documents.contains_key(id)
    }

    /// Vocabulary terms by slot
    pub fn vocabulary(&self) -> &[String] {
        &self.terms
    }

    /// IDF of a vocabulary term
    pub fn idf(&self, term: &str) -> Option<f32> {
        self.vocabulary.get(term).map(|&slot| self.idf[slot])
    }

    /// Document with its current vector
    pub fn get_document(&self, id: &str) -> Option<DocumentVector> {
        self.documents.get(id).map(|doc| DocumentVector {
            id: id.to_string(),
            content: doc.content.clone(),
            vector: doc.vector.clone(),
            metadata: doc.metadata.clone(),
        })
    }

    /// Add or replace a document, then rebuild.
    pub fn index_document(
        &mut self,
        id: impl Into<String>,
        content: impl Into<String>,
        metadata: Metadata,
    ) {
        self.insert(id.into(), content.into(), metadata);
        self.rebuild();
    }

    /// Add or replace many documents with a single rebuild.
    pub fn index_documents<I>(&mut self, documents: I) -> usize
    where
        I: IntoIterator<Item = (String, String, Metadata)>,
    {
        let mut count = 0;
        for (id, content, metadata) in documents {
            self.insert(id, content, metadata);
            count += 1;
        }
        if count > 0 {
            self.rebuild();
        }
        count
    }

    fn insert(&mut self, id: String, content: String, metadata: Metadata) {
        self.detach(&id);

        let tokens = self.tokenizer.tokenize(&content);
        let token_count = tokens.len();
        let mut term_counts: HashMap<String, usize> = HashMap::new();
        for token in tokens {
            *term_counts.entry(token).or_insert(0) += 1;
        }
        for term in term_counts.keys() {
            *self.doc_freq.entry(term.clone()).or_insert(0) += 1;
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        trace!("Indexed document {} ({} tokens)", id, token_count);
        self.documents.insert(
            id,
            IndexedDocument {
                content,
                metadata,
                term_counts,
                token_count,
                seq,
                vector: Vec::new(),
            },
        );
    }

    /// Remove a document. Returns `false` for unknown ids.
    pub fn remove_document(&mut self, id: &str) -> bool {
        if !self.detach(id) {
            return false;
        }
        self.rebuild();
        true
    }

    /// Remove every document.
    pub fn clear(&mut self) {
        self.documents.clear();
        self.doc_freq.clear();
        self.rebuild();
    }

    /// Drop a document and its document-frequency contributions.
    fn detach(&mut self, id: &str) -> bool {
        let Some(doc) = self.documents.remove(id) else {
            return false;
        };
        for term in doc.term_counts.keys() {
            if let Some(df) = self.doc_freq.get_mut(term) {
                *df = df.saturating_sub(1);
                if *df == 0 {
                    self.doc_freq.remove(term);
                }
            }
        }
        true
    }

    /// Recompute vocabulary, IDF and every document vector.
    fn rebuild(&mut self) {
        let start = Instant::now();
        let total_docs = self.documents.len();
        let max_df = self.config.max_doc_freq * total_docs as f64;

        let mut candidates: Vec<(&String, usize)> = self
            .doc_freq
            .iter()
            .map(|(term, &df)| (term, df))
            .filter(|(term, df)| {
                *df >= self.config.min_doc_freq
                    && (*df as f64) <= max_df
                    && !is_builtin_stop_word(term)
                    && !self.stop_words.contains(*term)
            })
            .collect();
        candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        candidates.truncate(self.config.max_features);

        let idf: Vec<f32> = candidates
            .iter()
            .map(|(_, df)| (total_docs as f64 / *df as f64).ln() as f32)
            .collect();
        let terms: Vec<String> = candidates.into_iter().map(|(term, _)| term.clone()).collect();
        let vocabulary: HashMap<String, usize> = terms
            .iter()
            .enumerate()
            .map(|(slot, term)| (term.clone(), slot))
            .collect();

        self.documents.par_iter_mut().for_each(|(_, doc)| {
            doc.vector = vectorize(&doc.term_counts, doc.token_count, &vocabulary, &idf);
        });

        self.terms = terms;
        self.vocabulary = vocabulary;
        self.idf = idf;
        self.last_updated = SystemTime::now();

        debug!(
            "Rebuilt vocabulary: {} terms over {} documents in {:?}",
            self.terms.len(),
            total_docs,
            start.elapsed()
        );
    }

    /// Vectorize a query under the current vocabulary.
    fn query_vector(&self, query: &str) -> Vec<f32> {
        let tokens = self.tokenizer.tokenize(query);
        let token_count = tokens.len();
        let mut term_counts: HashMap<String, usize> = HashMap::new();
        for token in tokens {
            *term_counts.entry(token).or_insert(0) += 1;
        }
        vectorize(&term_counts, token_count, &self.vocabulary, &self.idf)
    }

    /// Rank documents by cosine similarity to `query`.
    ///
    /// Documents with zero similarity never match. Ties keep insertion order.
    pub fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<SearchResponse, VectorIndexError> {
        options.validate()?;
        let start = Instant::now();
        let query_vector = self.query_vector(query);

        let mut scored: Vec<(f32, u64, &String, &IndexedDocument)> = if query_vector
            .iter()
            .all(|v| *v == 0.0)
        {
            Vec::new()
        } else {
            self.documents
                .iter()
                .filter(|(_, doc)| {
                    options
                        .filters
                        .iter()
                        .all(|(key, value)| doc.metadata.get(key) == Some(value))
                })
                .map(|(id, doc)| (dot(&query_vector, &doc.vector), doc.seq, id, doc))
                .filter(|(score, ..)| *score > 0.0 && *score >= options.threshold)
                .collect()
        };

        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        scored.truncate(options.top_k);

        let results = scored
            .into_iter()
            .map(|(score, _, id, doc)| SearchResult {
                id: id.clone(),
                score,
                content: doc.content.clone(),
                metadata: doc.metadata.clone(),
            })
            .collect();

        Ok(SearchResponse {
            query: query.to_string(),
            results,
            search_time: start.elapsed(),
            total_documents: self.documents.len(),
        })
    }

    /// Size statistics
    pub fn get_index_stats(&self) -> IndexStats {
        IndexStats {
            document_count: self.documents.len(),
            vocabulary_size: self.terms.len(),
            index_size: format_bytes(self.approximate_size()),
            last_updated: self.last_updated,
        }
    }

    fn approximate_size(&self) -> usize {
        let documents: usize = self
            .documents
            .iter()
            .map(|(id, doc)| {
                id.len()
                    + doc.content.len()
                    + doc.vector.len() * std::mem::size_of::<f32>()
                    + doc.term_counts.keys().map(|t| t.len() + 8).sum::<usize>()
            })
            .sum();
        let vocabulary: usize = self
            .terms
            .iter()
            .map(|t| t.len() * 2 + std::mem::size_of::<f32>() + 8)
            .sum();
        documents + vocabulary
    }
}

/// TF-IDF weights for one document, L2-normalized.
fn vectorize(
    term_counts: &HashMap<String, usize>,
    token_count: usize,
    vocabulary: &HashMap<String, usize>,
    idf: &[f32],
) -> Vec<f32> {
    let mut vector = vec![0.0f32; idf.len()];
    if token_count == 0 {
        return vector;
    }
    for (term, &count) in term_counts {
        if let Some(&slot) = vocabulary.get(term) {
            let tf = count as f32 / token_count as f32;
            vector[slot] = tf * idf[slot];
        }
    }
    normalize(&mut vector);
    vector
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Format a byte count as "512 B", "1.2 KB", "3.4 MB".
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}
