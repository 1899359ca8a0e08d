//! Hybrid search: local index plus pluggable external sources, blended into
//! one ranked list.

pub mod blend;
pub mod cache;
pub mod config;
pub mod error;
pub mod filter;
pub mod local;
pub mod manager;
pub mod model;
pub mod source;

pub use cache::{MemoryCache, SearchCache};
pub use config::SearchConfig;
pub use error::{SearchError, SourceError};
pub use local::LocalSearch;
pub use manager::{SearchManager, SearchRequest, SearchStats};
pub use model::{ResponseMetadata, SearchMode, SearchOptions, SearchResponse, SearchResult};
pub use source::{ExternalHit, ExternalSearch};
