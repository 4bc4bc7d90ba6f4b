//! doclens - incremental client-side full-text search over a remote document
//! set.
//!
//! Documents come from a [`DocumentProvider`], are cached locally in a
//! [redb](https://github.com/cberner/redb) file together with a version
//! marker, and are indexed in memory with
//! [Tantivy](https://github.com/quickwit-oss/tantivy) using a tokenizer that
//! adds bigrams and trigrams for CJK text. On startup the cache is reused
//! when its version matches the remote one; otherwise everything is
//! refetched. Local edits update the index in place.
//!
//! # Quick start
//!
//! ```no_run
//! use doclens::{EngineConfig, HttpProvider, SearchEngine};
//!
//! # async fn run() -> doclens::Result<()> {
//! let provider = HttpProvider::new(
//!     "https://example.com/api/search/version",
//!     "https://example.com/api/search/documents",
//! )?;
//! let engine = SearchEngine::new(
//!     provider,
//!     EngineConfig::default().with_cache_path("/tmp/doclens/cache.redb"),
//! );
//!
//! for r in engine.search("quarterly report").await? {
//!     println!("{} (score: {:.3})", r.title, r.score);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache_store;
pub mod config;
pub mod data_dir;
pub mod error;
pub mod index;
pub mod provider;
pub mod record;
pub mod search;
pub mod sync;
pub mod text_util;
pub mod tokenizer;

pub use cache_store::{CacheStore, LazyCacheStore};
pub use config::{EngineConfig, IndexConfig};
pub use data_dir::DataDir;
pub use error::{Error, Result};
pub use index::SearchIndex;
pub use provider::{DocumentProvider, HttpProvider};
pub use record::{DocumentRecord, IndexStatus, ResultItem};
pub use sync::{IndexEvent, Phase, SearchEngine, Subscription};
