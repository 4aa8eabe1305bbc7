//! Filepath: src/infra/utils.rs
//! Utility helpers organized by small, focused structs.
//! All functions are associated fns to keep call sites
//! ergonomic, testable, and discoverable.

use std::{
    ffi::OsString,
    fs::{self, OpenOptions},
    io::Write,
    path::{Component, Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

/// Path normalisation helpers
pub struct PathUtils;

impl PathUtils {
    /// Canonicalize when the path exists, otherwise make it absolute
    /// against the current directory without touching the filesystem.
    pub fn canonical(path: &Path) -> PathBuf {
        if let Ok(p) = dunce::canonicalize(path) {
            return p;
        }
        let abs = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        };
        Self::lexical_clean(&abs)
    }

    /// Drop `.` components and fold `..` without resolving symlinks
    pub fn lexical_clean(path: &Path) -> PathBuf {
        let mut out = PathBuf::new();
        for c in path.components() {
            match c {
                Component::CurDir => {}
                Component::ParentDir => {
                    out.pop();
                }
                other => out.push(other.as_os_str()),
            }
        }
        out
    }

    /// Path of `file` relative to `root`, with '/' separators.
    /// Returns None if `file` is not under `root`.
    pub fn relative_slash(
        root: &Path,
        file: &Path,
    ) -> Option<String> {
        let rel = file.strip_prefix(root).ok()?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }

    /// Whether two cleaned absolute paths name the same file. Case is
    /// ignored only where the filesystem usually ignores it.
    pub fn same_file(
        a: &Path,
        b: &Path,
    ) -> bool {
        if cfg!(any(windows, target_os = "macos")) {
            a.to_string_lossy()
                .eq_ignore_ascii_case(&b.to_string_lossy())
        } else {
            a == b
        }
    }

    /// `tags` → `tags.<ext>` (appends, never replaces)
    pub fn with_suffix(
        path: &Path,
        ext: &str,
    ) -> PathBuf {
        let mut s: OsString = path.as_os_str().to_owned();
        s.push(".");
        s.push(ext);
        PathBuf::from(s)
    }
}

/// Timestamps and durable writes
pub struct FsUtils;

impl FsUtils {
    /// Modification time in nanoseconds since the epoch
    pub fn mtime_nanos(meta: &fs::Metadata) -> u64 {
        meta.modified()
            .unwrap_or(SystemTime::UNIX_EPOCH)
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default()
    }

    /// Modification time in whole seconds; None if the file is missing
    pub fn mtime_secs(path: &Path) -> Option<u64> {
        let meta = fs::metadata(path).ok()?;
        Some(Self::mtime_nanos(&meta) / 1_000_000_000)
    }

    /// Stage `data` in a temp file next to `path` without replacing it.
    pub fn stage(
        path: &Path,
        data: &[u8],
    ) -> Result<NamedTempFile> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let tmp = tempfile::Builder::new()
            .prefix(".tagdb-")
            .tempfile_in(dir)
            .with_context(|| format!("create staging file in {}", dir.display()))?;

        let mut file = tmp.as_file();
        file.write_all(data)
            .with_context(|| format!("write staging file for {}", path.display()))?;
        file.sync_all()?;
        Ok(tmp)
    }

    /// Atomically replace `path` with a staged file and sync the directory.
    pub fn persist(
        staged: NamedTempFile,
        path: &Path,
    ) -> Result<()> {
        staged
            .persist(path)
            .map_err(|e| e.error)
            .with_context(|| format!("replace {}", path.display()))?;
        if let Some(dir) = path.parent() {
            let _ = Self::sync_dir(dir);
        }
        Ok(())
    }

    /// Atomic write with same-directory temp file
    pub fn write_atomic(
        path: &Path,
        data: &[u8],
    ) -> Result<()> {
        let staged = Self::stage(path, data)?;
        Self::persist(staged, path)
    }

    /// Cross-platform directory fsync helper.
    #[cfg(unix)]
    pub fn sync_dir(p: &Path) -> std::io::Result<()> {
        use std::os::unix::fs::OpenOptionsExt;
        let dir = if p.as_os_str().is_empty() { Path::new(".") } else { p };
        let f = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_DIRECTORY)
            .open(dir)?;
        f.sync_all()
    }

    #[cfg(windows)]
    pub fn sync_dir(_p: &Path) -> std::io::Result<()> {
        // Windows does not expose a reliable directory fsync; best-effort no-op.
        Ok(())
    }
}
