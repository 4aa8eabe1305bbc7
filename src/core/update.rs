//! Tag generation and incremental re-indexing.
//!
//! `prepare` runs the generator for one file into a scratch directory,
//! merges the fragment into a staged copy of the tags file, and stages a
//! matching index next to it. The canonical tags file and index are only
//! replaced by `UpdateTransaction::commit`; dropping the transaction
//! removes every staged file.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use bstr::ByteSlice;
use indicatif::ProgressBar;
use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, info, instrument, warn};

use crate::{
    core::{
        error::TagsError,
        host::ProcessRunner,
        index::{KeyOrder, TagIndex, tags_dir},
        tag::{ParseContext, parse_line, resolve_file},
    },
    infra::{config::CtagsConfig, io::read_file_smart, utils::{FsUtils, PathUtils}},
};

/// What a committed update changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateSummary {
    /// File column the update was scoped to
    pub file: String,
    /// Records dropped from the previous tags file
    pub removed: usize,
    /// Records taken from the fresh fragment
    pub added: usize,
}

/// Staged single-file update awaiting `commit`
#[derive(Debug)]
pub struct UpdateTransaction {
    tags_file: PathBuf,
    staged_tags: NamedTempFile,
    staged_index: NamedTempFile,
    _scratch: TempDir,
    summary: UpdateSummary,
}

impl UpdateTransaction {
    pub fn summary(&self) -> &UpdateSummary {
        &self.summary
    }

    /// Install the staged tags file, then its index.
    ///
    /// Each step is a rename within the tags directory. A failure on the
    /// index step leaves a valid tags file whose index is rebuilt on next use.
    #[instrument(skip(self), fields(tags = %self.tags_file.display()))]
    pub fn commit(self) -> Result<UpdateSummary> {
        let Self {
            tags_file,
            staged_tags,
            staged_index,
            _scratch,
            summary,
        } = self;

        FsUtils::persist(staged_tags, &tags_file)?;
        if let Err(e) = FsUtils::persist(staged_index, &TagIndex::index_path(&tags_file)) {
            warn!(error = %format!("{e:#}"), "tags updated but index was not; it will be rebuilt");
        }
        info!(file = %summary.file, removed = summary.removed, added = summary.added, "tags updated");
        Ok(summary)
    }
}

/// Re-tag the file written as `file_column` in `tags_file`.
#[instrument(skip(runner, ctags), fields(tags = %tags_file.display()))]
pub fn prepare(
    tags_file: &Path,
    file_column: &str,
    runner: &dyn ProcessRunner,
    ctags: &CtagsConfig,
) -> Result<UpdateTransaction> {
    let base_dir = tags_dir(tags_file);
    let scratch = tempfile::Builder::new()
        .prefix("tagdb-update-")
        .tempdir()
        .context("create scratch directory")?;
    let fragment_path = scratch.path().join("fragment.tags");

    let mut args = ctags.args.clone();
    args.push("-f".into());
    args.push(fragment_path.to_string_lossy().into_owned());
    args.push(file_column.to_string());
    run_generator(runner, &ctags.executable, &args, &base_dir)?;

    let fragment = fs::read(&fragment_path)
        .with_context(|| format!("read generated fragment {}", fragment_path.display()))?;
    let current = read_file_smart(tags_file)?;
    let ctx = ParseContext::new(tags_file, &base_dir);
    let merged = merge(current.as_ref(), &fragment, file_column, &ctx);
    debug!(removed = merged.removed, added = merged.added, "fragment merged");

    let staged_tags = FsUtils::stage(tags_file, &merged.text)?;
    let staged_index = TagIndex::build(staged_tags.path(), &ProgressBar::hidden())
        .and_then(|index| index.stage_for(tags_file))
        .context("index merged tags")?;

    Ok(UpdateTransaction {
        tags_file: tags_file.to_path_buf(),
        staged_tags,
        staged_index,
        _scratch: scratch,
        summary: UpdateSummary {
            file: file_column.to_string(),
            removed: merged.removed,
            added: merged.added,
        },
    })
}

/// Regenerate `tags_file` from everything under `root`.
#[instrument(skip(runner, ctags, progress))]
pub fn generate_into(
    tags_file: &Path,
    root: &Path,
    runner: &dyn ProcessRunner,
    ctags: &CtagsConfig,
    progress: &ProgressBar,
) -> Result<()> {
    progress.set_message(format!("tagging {}", root.display()));
    let staged = FsUtils::stage(tags_file, b"")?;

    let mut args = ctags.args.clone();
    args.push("-R".into());
    args.push("-f".into());
    args.push(staged.path().to_string_lossy().into_owned());
    args.push(".".into());
    run_generator(runner, &ctags.executable, &args, root)?;

    // Refuse to install output that is not a tags file
    TagIndex::build(staged.path(), progress)?;
    FsUtils::persist(staged, tags_file)?;
    info!(tags = %tags_file.display(), "tags generated");
    Ok(())
}

/// Tag a directory into `<dir>/<tags_name>`; returns the tags path.
pub fn generate_directory(
    dir: &Path,
    runner: &dyn ProcessRunner,
    ctags: &CtagsConfig,
    progress: &ProgressBar,
) -> Result<PathBuf> {
    let tags_file = dir.join(&ctags.tags_name);
    generate_into(&tags_file, dir, runner, ctags, progress)?;
    Ok(tags_file)
}

/// Tag a single file into a fresh scratch directory.
pub fn generate_for_file(
    source: &Path,
    runner: &dyn ProcessRunner,
    ctags: &CtagsConfig,
) -> Result<(TempDir, PathBuf)> {
    let scratch = tempfile::Builder::new()
        .prefix("tagdb-temp-")
        .tempdir()
        .context("create scratch directory")?;
    let tags_file = scratch.path().join("tags");
    let cwd = tags_dir(source);

    let mut args = ctags.args.clone();
    args.push("-f".into());
    args.push(tags_file.to_string_lossy().into_owned());
    args.push(source.to_string_lossy().into_owned());
    run_generator(runner, &ctags.executable, &args, &cwd)?;

    if !tags_file.is_file() {
        anyhow::bail!("{} produced no tags for {}", ctags.executable, source.display());
    }
    Ok((scratch, tags_file))
}

fn run_generator(
    runner: &dyn ProcessRunner,
    program: &str,
    args: &[String],
    cwd: &Path,
) -> Result<()> {
    let status = runner.run(program, args, cwd)?;
    if status != 0 {
        return Err(TagsError::ToolFailed {
            program: program.to_string(),
            status,
        }
        .into());
    }
    Ok(())
}

/// Result of splicing a fragment into a tags file
struct Merged {
    text: Vec<u8>,
    removed: usize,
    added: usize,
}

/// Drop every record of `file_column` from `current` and insert the
/// fragment's records, keeping byte order when `current` was sorted.
fn merge(
    current: &[u8],
    fragment: &[u8],
    file_column: &str,
    ctx: &ParseContext<'_>,
) -> Merged {
    let target = PathUtils::lexical_clean(&resolve_file(file_column, ctx));
    let is_target = |line: &[u8]| {
        KeyOrder::File.key(line).is_some_and(|f| {
            let path = PathUtils::lexical_clean(&resolve_file(&f.to_str_lossy(), ctx));
            PathUtils::same_file(&path, &target)
        })
    };

    let mut headers: Vec<&[u8]> = Vec::new();
    let mut kept: Vec<&[u8]> = Vec::new();
    let mut removed = 0;
    for line in current.lines() {
        if line.is_empty() {
            continue;
        }
        if line[0] == b'!' {
            headers.push(line);
        } else if is_target(line) {
            removed += 1;
        } else {
            kept.push(line);
        }
    }

    let mut fresh: Vec<&[u8]> = fragment
        .lines()
        .filter(|l| !l.is_empty() && l[0] != b'!')
        .filter(|l| parse_line(&l.to_str_lossy(), ctx).is_some())
        .collect();
    let added = fresh.len();

    let body: Vec<&[u8]> = if kept.is_sorted() {
        fresh.sort_unstable();
        itertools::merge(kept, fresh).collect()
    } else {
        kept.into_iter().chain(fresh).collect()
    };

    let mut text = Vec::with_capacity(current.len() + fragment.len());
    for line in headers.into_iter().chain(body) {
        text.extend_from_slice(line);
        text.push(b'\n');
    }
    Merged {
        text,
        removed,
        added,
    }
}
