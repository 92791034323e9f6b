//! Lexical vector index.
//!
//! A TF-IDF alternative to graph traversal: documents are tokenized,
//! weighted against a shared vocabulary and compared by cosine similarity.

pub mod index;
pub mod tokenizer;

pub use index::{
    format_bytes, DocumentVector, IndexStats, SearchOptions, SearchResponse, SearchResult,
    VectorIndex, VectorIndexConfig,
};
pub use tokenizer::{is_builtin_stop_word, stem, Tokenizer};
