//! One tags file together with its index and hot-tag cache.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use anyhow::{Result, anyhow};
use indexmap::IndexSet;
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing::{debug, instrument, warn};

use crate::{
    core::{
        cache::{CacheEntry, TagsCache},
        error::TagsError,
        host::ProcessRunner,
        index::{KeyOrder, OpenOutcome, TagIndex, tags_dir},
        tag::{TagRecord, resolve_file},
        update::{self, UpdateTransaction},
    },
    infra::{config::CtagsConfig, utils::PathUtils},
};

/// How a repository entered the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RepositoryKind {
    /// Loaded explicitly by the user
    Regular,
    /// Generated for one edited file; discarded with its last editor
    Temporary,
    /// Loaded every session; involved in every query
    Permanent,
}

impl fmt::Display for RepositoryKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let s = match self {
            RepositoryKind::Regular => "regular",
            RepositoryKind::Temporary => "temporary",
            RepositoryKind::Permanent => "permanent",
        };
        f.write_str(s)
    }
}

/// Snapshot of a repository's identity and bookkeeping
#[derive(Debug, Clone)]
pub struct RepositoryInfo {
    pub tags_file: PathBuf,
    pub kind: RepositoryKind,
    pub root: PathBuf,
    pub last_visited: Option<PathBuf>,
    pub since_reset: chrono::TimeDelta,
    pub symbols: Option<usize>,
}

#[derive(Debug)]
pub struct Repository {
    tags_file: PathBuf,
    kind: RepositoryKind,
    root: PathBuf,
    /// The single file a temporary repository covers
    source_file: Option<PathBuf>,
    last_visited: Option<PathBuf>,
    index: Option<TagIndex>,
    cache: TagsCache,
    /// Scratch directory holding a temporary repository's tags
    scratch: Option<TempDir>,
}

impl Repository {
    pub fn new(
        tags_file: &Path,
        kind: RepositoryKind,
        cache_capacity: usize,
    ) -> Self {
        let tags_file = PathUtils::canonical(tags_file);
        let root = tags_dir(&tags_file);
        Self {
            tags_file,
            kind,
            root,
            source_file: None,
            last_visited: None,
            index: None,
            cache: TagsCache::new(cache_capacity),
            scratch: None,
        }
    }

    /// Scratch repository for `source` whose tags live in `scratch`.
    pub fn temporary(
        source: &Path,
        tags_file: &Path,
        scratch: TempDir,
        cache_capacity: usize,
    ) -> Self {
        let source = PathUtils::canonical(source);
        let mut repo = Self::new(tags_file, RepositoryKind::Temporary, cache_capacity);
        repo.root = tags_dir(&source);
        repo.source_file = Some(source);
        repo.scratch = Some(scratch);
        repo
    }

    /// Build or validate the index; returns the symbol count.
    pub fn load(&mut self) -> Result<usize> {
        self.load_with(&ProgressBar::hidden())
    }

    #[instrument(skip(self, progress), fields(tags = %self.tags_file.display()))]
    pub fn load_with(
        &mut self,
        progress: &ProgressBar,
    ) -> Result<usize> {
        if !self.tags_file.is_file() {
            return Err(TagsError::Unreadable {
                path: self.tags_file.clone(),
                reason: "no such file".into(),
            }
            .into());
        }
        let (index, outcome) = TagIndex::open(&self.tags_file, progress)?;
        let count = index.symbol_count();
        if outcome == OpenOutcome::Built {
            debug!(count, "tags index rebuilt");
        }
        self.index = Some(index);
        Ok(count)
    }

    /// Current index, reloaded first if the tags file changed under it.
    fn fresh_index(&mut self) -> Result<&TagIndex> {
        let stale = self
            .index
            .as_ref()
            .is_none_or(|i| !i.is_fresh());
        if stale {
            debug!(tags = %self.tags_file.display(), "reloading stale index");
            let (index, _) = TagIndex::open(&self.tags_file, &ProgressBar::hidden())?;
            self.index = Some(index);
        }
        self.index
            .as_ref()
            .ok_or_else(|| anyhow!("index for {} unavailable", self.tags_file.display()))
    }

    /// Whether `file` lies under this repository.
    ///
    /// Temporary repositories own exactly their source file.
    pub fn belongs(
        &self,
        file: &Path,
    ) -> bool {
        match &self.source_file {
            Some(src) => src == file,
            None => file.starts_with(&self.root),
        }
    }

    /// Records named `name`; the empty name selects every record.
    pub fn find_by_name(
        &mut self,
        name: &str,
        case_insensitive: bool,
    ) -> Result<Vec<TagRecord>> {
        let index = self.fresh_index()?;
        let mut found = index.lookup(KeyOrder::Name, name.as_bytes());
        if !name.is_empty() {
            found.retain(|t| {
                if case_insensitive {
                    t.name.eq_ignore_ascii_case(name)
                } else {
                    t.name == name
                }
            });
        }
        Ok(found)
    }

    /// Records whose name starts with `prefix`; `limit` 0 means unlimited.
    pub fn find_by_name_part(
        &mut self,
        prefix: &str,
        limit: usize,
        case_insensitive: bool,
    ) -> Result<Vec<TagRecord>> {
        let index = self.fresh_index()?;
        let mut found = index.lookup(KeyOrder::Name, prefix.as_bytes());
        if !case_insensitive {
            found.retain(|t| t.name.starts_with(prefix));
        }
        truncate(&mut found, limit);
        Ok(found)
    }

    /// Every record defined in `path` (relative to the root, or absolute).
    pub fn find_files(
        &mut self,
        path: &Path,
    ) -> Result<Vec<TagRecord>> {
        let target = self.absolute(path);
        let keys = self.file_keys(&target);
        let index = self.fresh_index()?;

        let mut seen = IndexSet::new();
        for key in keys {
            for tag in index.lookup(KeyOrder::File, key.as_bytes()) {
                if PathUtils::same_file(&PathUtils::lexical_clean(&tag.file), &target) {
                    seen.insert(tag);
                }
            }
        }
        Ok(seen.into_iter().collect())
    }

    /// One file tag per distinct file whose path starts with `prefix`.
    pub fn find_files_by_part(
        &mut self,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<TagRecord>> {
        let owner = self.tags_file.clone();
        let index = self.fresh_index()?;
        let files: IndexSet<PathBuf> = index
            .lookup(KeyOrder::File, prefix.as_bytes())
            .into_iter()
            .map(|t| t.file)
            .collect();
        let mut found: Vec<TagRecord> = files
            .into_iter()
            .map(|f| TagRecord::file_tag(f, owner.clone()))
            .collect();
        truncate(&mut found, limit);
        Ok(found)
    }

    /// Records scoped to `class_name` via `class:`/`struct:` fields.
    pub fn find_class_members(
        &mut self,
        class_name: &str,
    ) -> Result<Vec<TagRecord>> {
        if class_name.is_empty() {
            return Ok(Vec::new());
        }
        let index = self.fresh_index()?;
        let mut found = index.lookup(KeyOrder::Class, class_name.as_bytes());
        found.retain(|t| t.class_name() == Some(class_name));
        Ok(found)
    }

    /// Symbols of `file` in source order.
    pub fn find_by_file(
        &mut self,
        file: &Path,
    ) -> Result<Vec<TagRecord>> {
        let mut found = self.find_files(file)?;
        found.sort_by_key(|t| t.line);
        Ok(found)
    }

    pub fn cache_tag(
        &mut self,
        tag: &TagRecord,
    ) {
        self.cache.insert(tag, 1);
    }

    pub fn erase_cached_tag(
        &mut self,
        tag: &TagRecord,
    ) -> bool {
        self.cache.erase(tag)
    }

    pub fn cached_tags(
        &self,
        limit: usize,
    ) -> Vec<CacheEntry> {
        self.cache.get(limit)
    }

    pub fn cache_stat(&self) -> Vec<CacheEntry> {
        self.cache.stat()
    }

    pub fn reset_cache(&mut self) {
        self.cache.reset();
    }

    pub fn cache(&self) -> &TagsCache {
        &self.cache
    }

    pub fn set_cache_capacity(
        &mut self,
        capacity: usize,
    ) {
        self.cache.set_capacity(capacity);
    }

    /// Where this repository's cache is saved between sessions.
    pub fn cache_path(&self) -> PathBuf {
        PathUtils::with_suffix(&self.tags_file, "cache.json")
    }

    /// Restore a saved cache if one exists; a broken file is ignored.
    pub fn restore_cache(&mut self) {
        let path = self.cache_path();
        if self.kind == RepositoryKind::Temporary || !path.is_file() {
            return;
        }
        match TagsCache::load(&path, self.cache.capacity()) {
            Ok(cache) => self.cache = cache,
            Err(e) => warn!(error = %format!("{e:#}"), "ignoring unreadable tags cache"),
        }
    }

    /// Save the cache next to the tags file (never for temporary repos).
    pub fn save_cache(&self) -> Result<()> {
        if self.kind == RepositoryKind::Temporary {
            return Ok(());
        }
        self.cache.save(&self.cache_path())
    }

    /// Prepare an incremental re-index of one file.
    ///
    /// Nothing on disk changes until the returned transaction is committed.
    pub fn update_tags_by_file(
        &mut self,
        file: &Path,
        runner: &dyn ProcessRunner,
        ctags: &CtagsConfig,
    ) -> Result<UpdateTransaction> {
        let file = PathUtils::canonical(file);
        if !self.belongs(&file) {
            return Err(TagsError::NotInRepository {
                file,
                tags: self.tags_file.clone(),
            }
            .into());
        }
        let written_as = self.written_name(&file)?;
        update::prepare(&self.tags_file, &written_as, runner, ctags)
    }

    /// Regenerate the whole tags file from the repository root.
    pub fn reindex(
        &mut self,
        runner: &dyn ProcessRunner,
        ctags: &CtagsConfig,
        progress: &ProgressBar,
    ) -> Result<usize> {
        update::generate_into(&self.tags_file, &self.root, runner, ctags, progress)?;
        self.load_with(progress)
    }

    /// Referenced files that changed since the index was built.
    pub fn stale_files(&mut self) -> Result<Vec<PathBuf>> {
        Ok(self.fresh_index()?.stale_files())
    }

    pub fn is_file_stale(
        &mut self,
        file: &Path,
    ) -> Result<bool> {
        let file = PathUtils::canonical(file);
        Ok(self.fresh_index()?.is_file_stale(&file))
    }

    pub fn set_last_visited(
        &mut self,
        dir: &Path,
    ) {
        self.last_visited = Some(dir.to_path_buf());
    }

    pub fn tags_file(&self) -> &Path {
        &self.tags_file
    }

    pub fn kind(&self) -> RepositoryKind {
        self.kind
    }

    /// Promote or demote between Regular and Permanent.
    pub fn set_kind(
        &mut self,
        kind: RepositoryKind,
    ) {
        if self.kind != RepositoryKind::Temporary && kind != RepositoryKind::Temporary {
            self.kind = kind;
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn info(&self) -> RepositoryInfo {
        RepositoryInfo {
            tags_file: self.tags_file.clone(),
            kind: self.kind,
            root: self.root.clone(),
            last_visited: self.last_visited.clone(),
            since_reset: self.cache.since_reset(),
            symbols: self.index.as_ref().map(TagIndex::symbol_count),
        }
    }

    fn absolute(
        &self,
        path: &Path,
    ) -> PathBuf {
        if path.is_absolute() {
            PathUtils::canonical(path)
        } else {
            PathUtils::canonical(&self.root.join(path))
        }
    }

    /// Candidate file-column spellings for an absolute path.
    fn file_keys(
        &self,
        target: &Path,
    ) -> Vec<String> {
        let base = tags_dir(&self.tags_file);
        let mut keys = Vec::with_capacity(2);
        if let Some(rel) = PathUtils::relative_slash(&base, target) {
            keys.push(rel);
        }
        keys.push(target.to_string_lossy().into_owned());
        keys
    }

    /// File column a source file has, or would have, in this tags file.
    fn written_name(
        &mut self,
        file: &Path,
    ) -> Result<String> {
        let base = tags_dir(&self.tags_file);
        let index = self.fresh_index()?;
        let ctx = index.parse_context();
        let existing = index
            .tracked_files()
            .iter()
            .find(|f| PathUtils::lexical_clean(&resolve_file(&f.name, &ctx)) == file)
            .map(|f| f.name.clone());
        Ok(existing
            .or_else(|| PathUtils::relative_slash(&base, file))
            .unwrap_or_else(|| file.to_string_lossy().into_owned()))
    }
}

fn truncate(
    found: &mut Vec<TagRecord>,
    limit: usize,
) {
    if limit > 0 {
        found.truncate(limit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const TAGS: &str = "!_TAG_FILE_FORMAT\t2\t/extended format/\n\
first\tsrc/one.c\t/^int first(void)$/;\"\tf\tline:3\n\
second\tsrc/one.c\t/^int second(void)$/;\"\tf\tline:9\n\
third\tsrc/two.c\t4;\"\tf\n\
Widget\tsrc/w.h\t/^struct Widget {$/;\"\ts\n\
size\tsrc/w.h\t/^  int size;$/;\"\tm\tstruct:Widget\n";

    fn repo() -> (TempDir, Repository) {
        let tmp = TempDir::new().unwrap();
        let tags = tmp.path().join("tags");
        fs::write(&tags, TAGS).unwrap();
        let mut repo = Repository::new(&tags, RepositoryKind::Regular, 10);
        assert_eq!(repo.load().unwrap(), 5);
        (tmp, repo)
    }

    #[test]
    fn missing_tags_file_is_unreadable() {
        let tmp = TempDir::new().unwrap();
        let mut r = Repository::new(&tmp.path().join("nope"), RepositoryKind::Regular, 1);
        let err = r.load().unwrap_err();
        assert!(matches!(err.downcast_ref::<TagsError>(), Some(TagsError::Unreadable { .. })));
    }

    #[test]
    fn exact_and_prefix_name_queries() {
        let (_tmp, mut r) = repo();
        assert_eq!(r.find_by_name("first", false).unwrap().len(), 1);
        assert!(r.find_by_name("FIRST", false).unwrap().is_empty());
        assert_eq!(r.find_by_name("FIRST", true).unwrap().len(), 1);
        assert_eq!(r.find_by_name("", false).unwrap().len(), 5);

        let s = r.find_by_name_part("s", 0, false).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(r.find_by_name_part("s", 1, false).unwrap().len(), 1);
        assert!(r.find_by_name_part("W", 0, false).unwrap().len() == 1);
        assert_eq!(r.find_by_name_part("w", 0, true).unwrap().len(), 1);
    }

    #[test]
    fn file_queries() {
        let (tmp, mut r) = repo();
        let one = r.find_files(Path::new("src/one.c")).unwrap();
        assert_eq!(one.len(), 2);
        let outline = r.find_by_file(&tmp.path().join("src/one.c")).unwrap();
        let lines: Vec<usize> = outline.iter().map(|t| t.line).collect();
        assert_eq!(lines, vec![3, 9]);

        let files = r.find_files_by_part("src/", 0).unwrap();
        assert_eq!(files.len(), 3);
        assert!(files.iter().all(TagRecord::is_file_tag));
        assert_eq!(r.find_files_by_part("src/", 2).unwrap().len(), 2);
    }

    #[cfg(not(any(windows, target_os = "macos")))]
    #[test]
    fn files_differing_in_case_stay_apart() {
        let tmp = TempDir::new().unwrap();
        let tags = tmp.path().join("tags");
        fs::write(
            &tags,
            "!_TAG_FILE_FORMAT\t2\t/extended format/\n\
lower\tsrc/a.c\t1;\"\tf\n\
upper\tsrc/A.c\t2;\"\tf\n",
        )
        .unwrap();
        let mut r = Repository::new(&tags, RepositoryKind::Regular, 10);
        r.load().unwrap();

        let names = |found: Vec<TagRecord>| found.into_iter().map(|t| t.name).collect::<Vec<_>>();
        assert_eq!(names(r.find_files(Path::new("src/a.c")).unwrap()), vec!["lower"]);
        assert_eq!(names(r.find_by_file(&tmp.path().join("src/A.c")).unwrap()), vec!["upper"]);
        assert_eq!(r.find_files_by_part("src/", 0).unwrap().len(), 2);
    }

    #[test]
    fn members_without_extension_marker() {
        let tmp = TempDir::new().unwrap();
        let tags = tmp.path().join("tags");
        fs::write(
            &tags,
            "!_TAG_FILE_FORMAT\t1\t/original ctags format/\nm\tx.c\t12\tclass:K\n",
        )
        .unwrap();
        let mut r = Repository::new(&tags, RepositoryKind::Regular, 10);
        r.load().unwrap();
        let found = r.find_class_members("K").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].line, 12);
    }

    #[test]
    fn class_members() {
        let (_tmp, mut r) = repo();
        let m = r.find_class_members("Widget").unwrap();
        assert_eq!(m.len(), 1);
        assert_eq!(m[0].name, "size");
        assert!(r.find_class_members("Gadget").unwrap().is_empty());
    }

    #[test]
    fn belongs_checks_root() {
        let (tmp, r) = repo();
        let root = PathUtils::canonical(tmp.path());
        assert!(r.belongs(&root.join("src/one.c")));
        assert!(!r.belongs(Path::new("/definitely/elsewhere.c")));
    }

    #[test]
    fn reloads_after_external_rewrite() {
        let (tmp, mut r) = repo();
        fs::write(
            tmp.path().join("tags"),
            format!("{TAGS}fourth\tsrc/two.c\t8;\"\tf\n"),
        )
        .unwrap();
        assert_eq!(r.find_by_name("fourth", false).unwrap().len(), 1);
    }

    #[test]
    fn cache_round_trip_on_disk() {
        let (_tmp, mut r) = repo();
        let first = r.find_by_name("first", false).unwrap().remove(0);
        r.cache_tag(&first);
        r.cache_tag(&first);
        r.save_cache().unwrap();

        let mut again = Repository::new(r.tags_file(), RepositoryKind::Regular, 10);
        again.restore_cache();
        let cached = again.cached_tags(0);
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].frequency, 2);
    }
}
