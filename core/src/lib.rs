//! Full-text index and TF-IDF scoring for fragment witnesses.

pub mod builder;
pub mod config;
pub mod error;
pub mod fuzzy;
pub mod index;
pub mod persist;
pub mod query;
pub mod reader;
pub mod search;
pub mod service;
pub mod source;
pub mod store;
pub mod tfidf;
pub mod tokenizer;

pub use builder::QueryBuilder;
pub use config::IndexerConfig;
pub use error::{IndexError, Result};
pub use index::{DocId, Field, IndexedDocument, StoredDocument};
pub use query::Query;
pub use reader::{DocAddress, Hit, ReaderSession};
pub use search::SearchService;
pub use service::IndexerService;
pub use source::{DomainKind, FragmentRef, Resolver, TextSource};
pub use store::{IndexStore, IndexWriter};
pub use tfidf::{TermFrequencies, TermWeights, TfIdfEngine};
