//! Typed failures that callers are expected to match on.
//!
//! Everything else travels as `anyhow::Error` with context attached; these
//! variants sit at the root of such chains so `downcast_ref::<TagsError>()`
//! recovers the category.

use std::path::PathBuf;

/// Failure categories surfaced by repositories and storage
#[derive(Debug, thiserror::Error)]
pub enum TagsError {
    /// Tags file is missing or cannot be opened
    #[error("cannot read tags file {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    /// File exists but has no `!_TAG_FILE_FORMAT` header
    #[error("{0} is not a ctags file")]
    NotTagsFile(PathBuf),

    /// Offsets are stored as u32; larger files cannot be indexed
    #[error("{path} is too large to index ({size} bytes)")]
    TooLarge { path: PathBuf, size: u64 },

    /// External tag generator exited unsuccessfully
    #[error("{program} exited with status {status}")]
    ToolFailed { program: String, status: i32 },

    /// File lies outside the repository asked to handle it
    #[error("{file} does not belong to repository {tags}")]
    NotInRepository { file: PathBuf, tags: PathBuf },

    /// No repository registered for the tags path
    #[error("no repository registered for {0}")]
    UnknownRepository(PathBuf),
}
