// Module declarations
pub mod builder;
pub mod common;
pub mod error;
pub mod indexer;
pub mod query;
pub mod query_parser;
pub mod schema;
pub mod searcher;
pub mod store;
pub mod tokenizer;

// Re-export public APIs
pub use builder::{BuildReport, build_from_feed, build_from_records};
pub use common::{IndexStats, PublicationHit, SearchRequest, SearchResponse, SortOrder};
pub use error::{ErrorKind, SearchError, SearchResult};
pub use searcher::{PublicationSearcher, search};
pub use store::{OpenOutcome, PublicationStore, index_stats};
