//! Per-query view over a fixed set of repositories.
//!
//! Results from every repository are merged in registry order with
//! duplicate records dropped, then arranged by `SortOptions`:
//! cached tags first (in cache order), then records of the current file,
//! then everything else; `sort_by_name` orders within the last two groups.

use std::{
    cmp::{Ordering, Reverse},
    collections::HashMap,
    path::{Path, PathBuf},
};

use anyhow::Result;
use indexmap::IndexSet;
use serde::Serialize;
use tabled::Tabled;

use crate::{
    core::{
        cache::{CacheEntry, CacheKey},
        repository::Repository,
        storage::RepositoryHandle,
        tag::TagRecord,
    },
    infra::{config::SearchConfig, utils::PathUtils},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SortOptions {
    pub cached_on_top: bool,
    pub cur_file_first: bool,
    pub sort_by_name: bool,
}

impl From<&SearchConfig> for SortOptions {
    fn from(s: &SearchConfig) -> Self {
        Self {
            cached_on_top: s.cached_on_top,
            cur_file_first: s.cur_file_first,
            sort_by_name: s.sort_by_name,
        }
    }
}

/// Display form of one result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Tabled)]
pub struct TagRow {
    pub name: String,
    pub kind: String,
    pub location: String,
    pub declaration: String,
}

pub struct Selector {
    repos: Vec<RepositoryHandle>,
    current_file: Option<PathBuf>,
    case_insensitive: bool,
    sort: SortOptions,
    /// 0 means unlimited
    limit: usize,
}

impl Selector {
    pub fn new(
        repos: Vec<RepositoryHandle>,
        current_file: Option<PathBuf>,
        case_insensitive: bool,
        sort: SortOptions,
        limit: usize,
    ) -> Self {
        Self {
            repos,
            current_file,
            case_insensitive,
            sort,
            limit,
        }
    }

    pub fn repository_count(&self) -> usize {
        self.repos.len()
    }

    pub fn find_by_name(
        &self,
        name: &str,
    ) -> Result<Vec<TagRecord>> {
        let ci = self.case_insensitive;
        let merged = self.merge(|r| r.find_by_name(name, ci))?;
        Ok(self.arrange(merged))
    }

    pub fn find_by_name_part(
        &self,
        prefix: &str,
    ) -> Result<Vec<TagRecord>> {
        let (ci, limit) = (self.case_insensitive, self.per_repository_limit());
        let merged = self.merge(|r| r.find_by_name_part(prefix, limit, ci))?;
        Ok(self.arrange(merged))
    }

    pub fn find_files(
        &self,
        path: &Path,
    ) -> Result<Vec<TagRecord>> {
        let merged = self.merge(|r| r.find_files(path))?;
        Ok(self.arrange(merged))
    }

    pub fn find_files_by_part(
        &self,
        prefix: &str,
    ) -> Result<Vec<TagRecord>> {
        let limit = self.per_repository_limit();
        let merged = self.merge(|r| r.find_files_by_part(prefix, limit))?;
        Ok(self.arrange(merged))
    }

    pub fn find_class_members(
        &self,
        class_name: &str,
    ) -> Result<Vec<TagRecord>> {
        let merged = self.merge(|r| r.find_class_members(class_name))?;
        Ok(self.arrange(merged))
    }

    /// Outline of `file`: source order, never re-sorted.
    pub fn find_by_file(
        &self,
        file: &Path,
    ) -> Result<Vec<TagRecord>> {
        let mut merged = self.merge(|r| r.find_by_file(file))?;
        merged.sort_by_key(|t| t.line);
        self.truncate(&mut merged);
        Ok(merged)
    }

    /// Hot tags of every repository, most frequent first.
    pub fn cached_tags(&self) -> Vec<CacheEntry> {
        let mut all: Vec<(usize, CacheEntry)> = self
            .repos
            .iter()
            .flat_map(|r| {
                r.borrow()
                    .cached_tags(0)
                    .into_iter()
                    .enumerate()
                    .collect::<Vec<_>>()
            })
            .collect();
        all.sort_by_key(|(rank, e)| (Reverse(e.frequency), *rank));
        let mut out: Vec<CacheEntry> = all.into_iter().map(|(_, e)| e).collect();
        if self.limit > 0 {
            out.truncate(self.limit);
        }
        out
    }

    /// Display rows; locations are relative to the current file's
    /// repository root when possible.
    pub fn rows(
        &self,
        tags: &[TagRecord],
    ) -> Vec<TagRow> {
        let root = self.current_root();
        tags.iter()
            .map(|t| {
                let file = root
                    .as_deref()
                    .and_then(|r| PathUtils::relative_slash(r, &t.file))
                    .unwrap_or_else(|| t.file.to_string_lossy().into_owned());
                let location = if t.line > 0 {
                    format!("{file}:{}", t.line)
                } else {
                    file
                };
                TagRow {
                    name: t.name.clone(),
                    kind: t.kind.map(String::from).unwrap_or_default(),
                    location,
                    declaration: t.declaration(),
                }
            })
            .collect()
    }

    fn current_root(&self) -> Option<PathBuf> {
        let current = self.current_file.as_deref()?;
        self.repos
            .iter()
            .map(|r| r.borrow())
            .find(|r| r.belongs(current))
            .map(|r| r.root().to_path_buf())
    }

    fn merge<F>(
        &self,
        mut query: F,
    ) -> Result<Vec<TagRecord>>
    where
        F: FnMut(&mut Repository) -> Result<Vec<TagRecord>>,
    {
        let mut seen = IndexSet::new();
        for repo in &self.repos {
            let found = query(&mut repo.borrow_mut())?;
            seen.extend(found);
        }
        Ok(seen.into_iter().collect())
    }

    fn arrange(
        &self,
        tags: Vec<TagRecord>,
    ) -> Vec<TagRecord> {
        let ranks = if self.sort.cached_on_top {
            self.cache_ranks()
        } else {
            HashMap::new()
        };

        let (mut cached, mut rest): (Vec<TagRecord>, Vec<TagRecord>) = tags
            .into_iter()
            .partition(|t| ranks.contains_key(&rank_key(t)));
        cached.sort_by_key(|t| ranks.get(&rank_key(t)).copied());

        if self.sort.sort_by_name {
            let ci = self.case_insensitive;
            rest.sort_by(|a, b| compare_names(&a.name, &b.name, ci));
        }
        if self.sort.cur_file_first
            && let Some(current) = &self.current_file
        {
            rest.sort_by_key(|t| PathUtils::lexical_clean(&t.file) != *current);
        }

        cached.append(&mut rest);
        self.truncate(&mut cached);
        cached
    }

    /// Cache order across repositories: frequency, then per-repository rank.
    /// A record only ranks through the cache of the repository it came from.
    fn cache_ranks(&self) -> HashMap<(PathBuf, CacheKey), (Reverse<u64>, usize, usize)> {
        let mut out = HashMap::new();
        for (ri, repo) in self.repos.iter().enumerate() {
            let repo = repo.borrow();
            for (rank, e) in repo.cached_tags(0).iter().enumerate() {
                out.entry((repo.tags_file().to_path_buf(), CacheKey::from(&e.tag)))
                    .or_insert((Reverse(e.frequency), rank, ri));
            }
        }
        out
    }

    /// Limit handed to each repository. Any reordering can promote a
    /// record from past the first `limit` hits, so only the plain merge
    /// order may cut early.
    fn per_repository_limit(&self) -> usize {
        if self.sort == SortOptions::default() {
            self.limit
        } else {
            0
        }
    }

    fn truncate(
        &self,
        tags: &mut Vec<TagRecord>,
    ) {
        if self.limit > 0 {
            tags.truncate(self.limit);
        }
    }
}

fn rank_key(tag: &TagRecord) -> (PathBuf, CacheKey) {
    (tag.owner.clone(), CacheKey::from(tag))
}

fn compare_names(
    a: &str,
    b: &str,
    case_insensitive: bool,
) -> Ordering {
    if case_insensitive {
        a.bytes()
            .map(|c| c.to_ascii_lowercase())
            .cmp(b.bytes().map(|c| c.to_ascii_lowercase()))
    } else {
        a.cmp(b)
    }
}
