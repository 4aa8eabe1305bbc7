//! **tagdb** - Indexed symbol lookup over ctags files
//!
//! Binary-searchable side-file indexes, multi-repository queries with a
//! current-file sort policy, transactional single-file re-tagging and a
//! per-repository hot-tag cache.

/// Command-line interface with clap integration
pub mod cli;

/// Shell completion generation
pub mod completion;

/// Command handlers behind the CLI
pub mod cli_ext {
    pub mod tags_cmd;
}

/// Tag records, indexes, repositories and queries
pub mod core {
    /// Typed failures callers may want to match on
    pub mod error;
    pub use error::TagsError;

    /// ctags line grammar and pattern handling
    pub mod tag;
    pub use tag::{ParseContext, TagRecord, parse_line};

    /// Sorted offset index with a persisted side-file
    pub mod index;
    pub use index::{KeyOrder, TagIndex};

    /// Frequency/recency cache of navigated tags
    pub mod cache;
    pub use cache::{CacheEntry, TagsCache};

    /// Process and editor seams
    pub mod host;
    pub use host::{CommandRunner, Navigator, ProcessRunner};

    /// Tag generation and two-phase single-file updates
    pub mod update;
    pub use update::{UpdateSummary, UpdateTransaction};

    pub mod repository;
    pub use repository::{Repository, RepositoryInfo, RepositoryKind};

    /// Registry of loaded repositories
    pub mod storage;
    pub use storage::{RepositoryHandle, RepositoryStorage};

    /// Cross-repository merge and sort policy
    pub mod selector;
    pub use selector::{Selector, SortOptions, TagRow};
}

/// Infrastructure - Configuration, I/O, and utilities
pub mod infra {
    /// Configuration management with TOML support
    pub mod config;
    pub use config::{Config, init as config_init, load_config};

    /// Memory-mapped file I/O for large files (>1MB threshold)
    pub mod io;
    pub use io::{FileContent, read_file_smart};

    /// CRLF/LF-robust line indexing
    pub mod line_index;
    pub use line_index::NewlineIndex;

    /// Newline-delimited path lists
    pub mod path_list;
    pub use path_list::PathList;

    /// Path normalisation and durable writes
    pub mod utils;
}

pub use cli::{AppContext, Cli, Commands};
pub use core::{
    Repository, RepositoryKind, RepositoryStorage, Selector, SortOptions, TagIndex, TagRecord,
    TagsError,
};
pub use infra::{Config, load_config};
