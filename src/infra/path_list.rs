//! Newline-delimited list of paths, used for permanent tags files.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use indexmap::IndexSet;

use crate::infra::utils::FsUtils;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathList {
    paths: IndexSet<PathBuf>,
}

impl PathList {
    /// Read `path`; a missing file is an empty list.
    /// Blank lines and `#` comments are ignored.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("read path list {}", path.display()))?;
        let paths = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(PathBuf::from)
            .collect();
        Ok(Self { paths })
    }

    pub fn save(
        &self,
        path: &Path,
    ) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let mut text = String::new();
        for p in &self.paths {
            text.push_str(&p.to_string_lossy());
            text.push('\n');
        }
        FsUtils::write_atomic(path, text.as_bytes())
    }

    /// Returns false if the path was already listed.
    pub fn add(
        &mut self,
        path: PathBuf,
    ) -> bool {
        self.paths.insert(path)
    }

    pub fn remove(
        &mut self,
        path: &Path,
    ) -> bool {
        self.paths.shift_remove(path)
    }

    pub fn contains(
        &self,
        path: &Path,
    ) -> bool {
        self.paths.contains(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FromIterator<PathBuf> for PathList {
    fn from_iter<I: IntoIterator<Item = PathBuf>>(iter: I) -> Self {
        Self {
            paths: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let list = PathList::load(&dir.path().join("none")).unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn save_then_load_keeps_order_and_skips_noise() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("nested/permanent.list");
        let mut list = PathList::default();
        assert!(list.add(PathBuf::from("/b/tags")));
        assert!(list.add(PathBuf::from("/a/tags")));
        assert!(!list.add(PathBuf::from("/b/tags")));
        list.save(&file).unwrap();

        let mut text = fs::read_to_string(&file).unwrap();
        text.push_str("\n# comment\n   \n");
        fs::write(&file, text).unwrap();

        let back = PathList::load(&file).unwrap();
        let got: Vec<&Path> = back.iter().collect();
        assert_eq!(got, vec![Path::new("/b/tags"), Path::new("/a/tags")]);
    }

    #[test]
    fn remove_reports_presence() {
        let mut list: PathList = [PathBuf::from("/x/tags")].into_iter().collect();
        assert!(list.remove(Path::new("/x/tags")));
        assert!(!list.remove(Path::new("/x/tags")));
    }
}
