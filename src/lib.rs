pub mod checkpoint;
pub mod config;
pub mod dates;
pub mod db;
pub mod error;
pub mod formatting;
pub mod indexer;
pub mod models;
pub mod parser;
pub mod path_codec;
pub mod search;
pub mod shutdown;
pub mod stats;
pub mod storage;

/// Current version of the extraction logic. Bumping this would trigger a
/// force re-sync suggestion; nothing has needed one yet.
pub const EXTRACTION_VERSION: i32 = 1;
