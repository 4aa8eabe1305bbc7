//! Registry of loaded repositories.
//!
//! `RepositoryStorage` is an owned value passed by the caller; there is no
//! process-wide registry. Repositories are keyed by canonical tags-file
//! path in load order and shared with selectors through
//! `Rc<RefCell<Repository>>` handles.

use std::{
    cell::RefCell,
    collections::HashMap,
    path::{Path, PathBuf},
    rc::Rc,
};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use indicatif::ProgressBar;
use tracing::{debug, info, instrument, warn};

use crate::{
    core::{
        error::TagsError,
        host::{Navigator, ProcessRunner},
        index::tags_dir,
        repository::{Repository, RepositoryInfo, RepositoryKind},
        selector::{Selector, SortOptions},
        tag::TagRecord,
        update,
    },
    infra::{config::CtagsConfig, io::read_text_lossy, path_list::PathList, utils::PathUtils},
};

pub type RepositoryHandle = Rc<RefCell<Repository>>;

/// Open editors on a file covered by a temporary repository
#[derive(Debug)]
struct TemporaryRef {
    tags_file: PathBuf,
    editors: usize,
}

#[derive(Debug)]
pub struct RepositoryStorage {
    repos: IndexMap<PathBuf, RepositoryHandle>,
    temporary: HashMap<PathBuf, TemporaryRef>,
    cache_capacity: usize,
    persist_caches: bool,
}

impl RepositoryStorage {
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            repos: IndexMap::new(),
            temporary: HashMap::new(),
            cache_capacity,
            persist_caches: false,
        }
    }

    /// Restore caches on load and allow `save_caches`.
    pub fn with_persisted_caches(
        mut self,
        persist: bool,
    ) -> Self {
        self.persist_caches = persist;
        self
    }

    pub fn load(
        &mut self,
        tags_file: &Path,
        kind: RepositoryKind,
    ) -> Result<RepositoryHandle> {
        self.load_with(tags_file, kind, &ProgressBar::hidden())
    }

    /// Register `tags_file`, reusing the repository already loaded for it.
    ///
    /// A new repository is registered only once its index is valid. A
    /// reused one keeps its cache; asking for Permanent promotes it.
    #[instrument(skip(self, progress), fields(tags = %tags_file.display()))]
    pub fn load_with(
        &mut self,
        tags_file: &Path,
        kind: RepositoryKind,
        progress: &ProgressBar,
    ) -> Result<RepositoryHandle> {
        let key = PathUtils::canonical(tags_file);
        if let Some(existing) = self.repos.get(&key) {
            let mut repo = existing.borrow_mut();
            repo.load_with(progress)?;
            if kind == RepositoryKind::Permanent {
                repo.set_kind(kind);
            }
            debug!("reusing loaded repository");
            return Ok(Rc::clone(existing));
        }

        let mut repo = Repository::new(&key, kind, self.cache_capacity);
        let count = repo.load_with(progress)?;
        if self.persist_caches {
            repo.restore_cache();
        }
        info!(count, %kind, "repository loaded");
        let handle = Rc::new(RefCell::new(repo));
        self.repos.insert(key, Rc::clone(&handle));
        Ok(handle)
    }

    pub fn get(
        &self,
        tags_file: &Path,
    ) -> Option<RepositoryHandle> {
        self.repos
            .get(&PathUtils::canonical(tags_file))
            .cloned()
    }

    /// Repositories that geometrically contain `file`.
    pub fn owners(
        &self,
        file: &Path,
    ) -> Vec<RepositoryHandle> {
        let file = PathUtils::canonical(file);
        self.repos
            .values()
            .filter(|r| r.borrow().belongs(&file))
            .cloned()
            .collect()
    }

    /// Owners of `file` followed by every other permanent repository.
    pub fn involved(
        &self,
        file: &Path,
    ) -> Vec<RepositoryHandle> {
        let file = PathUtils::canonical(file);
        self.repos
            .values()
            .filter(|r| {
                let r = r.borrow();
                r.belongs(&file) || r.kind() == RepositoryKind::Permanent
            })
            .cloned()
            .collect()
    }

    /// Selector over the repositories involved for `file` right now.
    ///
    /// Without a current file only permanent repositories take part.
    pub fn selector(
        &self,
        file: Option<&Path>,
        case_insensitive: bool,
        sort: SortOptions,
        limit: usize,
    ) -> Selector {
        let repos = match file {
            Some(f) => self.involved(f),
            None => self.permanent(),
        };
        Selector::new(
            repos,
            file.map(PathUtils::canonical),
            case_insensitive,
            sort,
            limit,
        )
    }

    /// Selector over every registered repository.
    pub fn selector_all(
        &self,
        file: Option<&Path>,
        case_insensitive: bool,
        sort: SortOptions,
        limit: usize,
    ) -> Selector {
        Selector::new(
            self.repos.values().cloned().collect(),
            file.map(PathUtils::canonical),
            case_insensitive,
            sort,
            limit,
        )
    }

    /// Deregister `tags_file`; returns the handle if it was loaded.
    pub fn remove(
        &mut self,
        tags_file: &Path,
    ) -> Option<RepositoryHandle> {
        let key = PathUtils::canonical(tags_file);
        let removed = self.repos.shift_remove(&key)?;
        self.temporary.retain(|_, t| t.tags_file != key);
        Some(removed)
    }

    /// Count a visit of `tag` in the cache of the repository that owns it.
    pub fn cache_tag(
        &self,
        tag: &TagRecord,
    ) -> Result<()> {
        self.owner_of(tag)?
            .borrow_mut()
            .cache_tag(tag);
        Ok(())
    }

    pub fn erase_cached_tag(
        &self,
        tag: &TagRecord,
    ) -> Result<bool> {
        Ok(self
            .owner_of(tag)?
            .borrow_mut()
            .erase_cached_tag(tag))
    }

    /// Load every tags file in `list` as permanent.
    ///
    /// Entries that fail to load are reported and skipped; returns the
    /// number loaded.
    pub fn load_permanent(
        &mut self,
        list: &PathList,
    ) -> usize {
        let mut loaded = 0;
        for path in list.iter() {
            match self.load(path, RepositoryKind::Permanent) {
                Ok(_) => loaded += 1,
                Err(e) => {
                    warn!(tags = %path.display(), error = %format!("{e:#}"), "skipping permanent repository")
                }
            }
        }
        loaded
    }

    /// Tags files of the permanent repositories, ready to be saved.
    pub fn permanent_paths(&self) -> PathList {
        self.repos
            .iter()
            .filter(|(_, r)| r.borrow().kind() == RepositoryKind::Permanent)
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Open `file` in one more editor, tagging it into a temporary
    /// repository when nothing else covers it.
    ///
    /// Returns `None` when a regular or permanent repository owns the file.
    pub fn add_temporary(
        &mut self,
        file: &Path,
        runner: &dyn ProcessRunner,
        ctags: &CtagsConfig,
    ) -> Result<Option<RepositoryHandle>> {
        let file = PathUtils::canonical(file);
        if let Some(t) = self.temporary.get_mut(&file) {
            t.editors += 1;
            return Ok(self.repos.get(&t.tags_file).cloned());
        }
        if !self.owners(&file).is_empty() {
            return Ok(None);
        }

        let (scratch, tags_file) = update::generate_for_file(&file, runner, ctags)?;
        let mut repo = Repository::temporary(&file, &tags_file, scratch, self.cache_capacity);
        repo.load()
            .with_context(|| format!("index temporary tags for {}", file.display()))?;

        let key = repo.tags_file().to_path_buf();
        debug!(file = %file.display(), tags = %key.display(), "temporary repository created");
        let handle = Rc::new(RefCell::new(repo));
        self.repos.insert(key.clone(), Rc::clone(&handle));
        self.temporary.insert(
            file,
            TemporaryRef {
                tags_file: key,
                editors: 1,
            },
        );
        Ok(Some(handle))
    }

    /// Close one editor of `file`; the last close discards its temporary
    /// repository. Returns whether the repository was discarded.
    pub fn release_temporary(
        &mut self,
        file: &Path,
    ) -> bool {
        let file = PathUtils::canonical(file);
        let Some(t) = self.temporary.get_mut(&file) else {
            return false;
        };
        t.editors -= 1;
        if t.editors > 0 {
            return false;
        }
        if let Some(t) = self.temporary.remove(&file) {
            self.repos.shift_remove(&t.tags_file);
            debug!(file = %file.display(), "temporary repository discarded");
        }
        true
    }

    /// Move `navigator` to `tag` and count the visit.
    ///
    /// Returns the line actually navigated to.
    pub fn navigate(
        &self,
        tag: &TagRecord,
        navigator: &mut dyn Navigator,
    ) -> Result<usize> {
        let owner = self.owner_of(tag)?;
        let line = if tag.is_file_tag() {
            1
        } else {
            let source = read_text_lossy(&tag.file)
                .with_context(|| format!("open {}", tag.file.display()))?;
            tag.locate(&source).unwrap_or(1)
        };
        navigator.set_position(&tag.file, line)?;

        let mut repo = owner.borrow_mut();
        repo.cache_tag(tag);
        repo.set_last_visited(&tags_dir(&tag.file));
        Ok(line)
    }

    /// Save the cache of every regular and permanent repository.
    pub fn save_caches(&self) -> Result<()> {
        if !self.persist_caches {
            return Ok(());
        }
        for repo in self.repos.values() {
            let repo = repo.borrow();
            repo.save_cache()
                .with_context(|| format!("save cache for {}", repo.tags_file().display()))?;
        }
        Ok(())
    }

    pub fn set_cache_capacity(
        &mut self,
        capacity: usize,
    ) {
        self.cache_capacity = capacity;
        for repo in self.repos.values() {
            repo.borrow_mut()
                .set_cache_capacity(capacity);
        }
    }

    pub fn repositories(&self) -> Vec<RepositoryInfo> {
        self.repos
            .values()
            .map(|r| r.borrow().info())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.repos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
    }

    fn permanent(&self) -> Vec<RepositoryHandle> {
        self.repos
            .values()
            .filter(|r| r.borrow().kind() == RepositoryKind::Permanent)
            .cloned()
            .collect()
    }

    fn owner_of(
        &self,
        tag: &TagRecord,
    ) -> Result<RepositoryHandle> {
        self.get(&tag.owner)
            .ok_or_else(|| TagsError::UnknownRepository(tag.owner.clone()).into())
    }
}
