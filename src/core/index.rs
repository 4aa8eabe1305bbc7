//! Persisted, binary-searchable index over a ctags file.
//!
//! The index never copies tag text: it keeps the tags file bytes (mapped for
//! large files) and three arrays of line offsets sorted by different keys.
//! A side-file `<tags>.idx` stores the arrays so later sessions skip the
//! sort; it is trusted only while the tags file's mtime and size match the
//! values recorded next to the arrays.
//!
//! Side-file layout (little endian):
//!
//! ```text
//! "TAGDBIX1" | sep:u8 | tags_mtime_ns:u64 | tags_size:u64
//! name:  count:u32 | offset:u32 * count
//! file:  count:u32 | offset:u32 * count
//! class: count:u32 | offset:u32 * count
//! files: count:u32 | (len:u16 | bytes | mtime_secs:u64) * count
//! ```

use std::{
    cmp::Ordering,
    fs,
    path::{MAIN_SEPARATOR, Path, PathBuf},
};

use anyhow::{Context, Result};
use bstr::ByteSlice;
use indexmap::IndexSet;
use indicatif::ProgressBar;
use rayon::prelude::*;
use tracing::{debug, instrument, warn};

use crate::{
    core::{
        error::TagsError,
        tag::{
            ParseContext, SCOPE_FIELDS, TagRecord, extension_tail, locator_end, parse_line,
            resolve_file,
        },
    },
    infra::{
        io::{FileContent, read_file_smart},
        line_index::NewlineIndex,
        utils::{FsUtils, PathUtils},
    },
};

/// Magic bytes opening every side-file
pub const SIGNATURE: &[u8; 8] = b"TAGDBIX1";

/// First line of every file we accept as a tags file
pub const HEADER_PREFIX: &[u8] = b"!_TAG_FILE_FORMAT";

/// Extension appended to the tags path for the side-file
pub const INDEX_SUFFIX: &str = "idx";

/// Which sorted array a lookup runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOrder {
    /// Tag name, ASCII case-folded
    Name,
    /// File column, case-folded with '/' separators
    File,
    /// Class/struct scope from the extension fields, case-sensitive
    Class,
}

impl KeyOrder {
    /// Sort key of one raw tags line. Lines without a key yield None.
    pub fn key<'a>(
        self,
        line: &'a [u8],
    ) -> Option<&'a [u8]> {
        let mut cols = line.splitn(3, |&b| b == b'\t');
        let name = cols.next()?;
        match self {
            KeyOrder::Name => Some(name),
            KeyOrder::File => cols.next(),
            KeyOrder::Class => {
                let rest = cols.nth(1)?;
                let tail = extension_tail(&rest[locator_end(rest)?..])?;
                tail.split(|&b| b == b'\t').find_map(|field| {
                    SCOPE_FIELDS
                        .iter()
                        .find_map(|p| field.strip_prefix(p.as_bytes()))
                        .filter(|v| !v.is_empty())
                })
            }
        }
    }

    /// Normalise one key byte for comparison.
    fn fold(
        self,
        b: u8,
    ) -> u8 {
        match self {
            KeyOrder::Name => b.to_ascii_lowercase(),
            KeyOrder::File if b == b'\\' => b'/',
            KeyOrder::File => b.to_ascii_lowercase(),
            KeyOrder::Class => b,
        }
    }

    /// Normalise a caller-supplied search key.
    pub fn normalize(
        self,
        key: &[u8],
    ) -> Vec<u8> {
        key.iter()
            .map(|&b| self.fold(b))
            .collect()
    }

    fn cmp_keys(
        self,
        a: &[u8],
        b: &[u8],
    ) -> Ordering {
        a.iter()
            .map(|&x| self.fold(x))
            .cmp(b.iter().map(|&x| self.fold(x)))
    }

    /// Compare a line's key, truncated to the prefix length, with a
    /// normalised prefix. Lines without a key sort first.
    fn cmp_prefix(
        self,
        line: &[u8],
        prefix: &[u8],
    ) -> Ordering {
        let Some(key) = self.key(line) else {
            return Ordering::Less;
        };
        let head = &key[..key.len().min(prefix.len())];
        head.iter()
            .map(|&x| self.fold(x))
            .cmp(prefix.iter().copied())
    }

    /// Total order used to sort the array: key first, then raw line.
    fn cmp_lines(
        self,
        a: &[u8],
        b: &[u8],
    ) -> Ordering {
        let ka = self.key(a).unwrap_or_default();
        let kb = self.key(b).unwrap_or_default();
        self.cmp_keys(ka, kb)
            .then_with(|| a.cmp(b))
    }
}

/// Offsets of tags lines kept in `KeyOrder` order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortedOffsets {
    offsets: Vec<u32>,
}

impl SortedOffsets {
    /// Sort `offsets` by `order`, skipping the sort if already ordered.
    fn sorted(
        mut offsets: Vec<u32>,
        text: &FileContent,
        order: KeyOrder,
    ) -> Self {
        let line = |off: &u32| text.line_at(*off as usize).unwrap_or_default();
        let cmp = |a: &u32, b: &u32| order.cmp_lines(line(a), line(b));
        if offsets.is_sorted_by(|a, b| cmp(a, b) != Ordering::Greater) {
            debug!(?order, count = offsets.len(), "input already sorted");
        } else {
            offsets.par_sort_by(cmp);
        }
        Self { offsets }
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Positions `lo..hi` whose key starts with the normalised `prefix`.
    ///
    /// Binary search finds one match, then the run of equal-prefix
    /// neighbours is collected in both directions.
    pub fn prefix_range(
        &self,
        text: &FileContent,
        order: KeyOrder,
        prefix: &[u8],
    ) -> std::ops::Range<usize> {
        let probe = |pos: usize| {
            let line = text
                .line_at(self.offsets[pos] as usize)
                .unwrap_or_default();
            order.cmp_prefix(line, prefix)
        };

        let Ok(hit) = self
            .offsets
            .binary_search_by(|&off| {
                let line = text.line_at(off as usize).unwrap_or_default();
                order.cmp_prefix(line, prefix)
            })
        else {
            return 0..0;
        };

        let mut lo = hit;
        while lo > 0 && probe(lo - 1) == Ordering::Equal {
            lo -= 1;
        }
        let mut hi = hit + 1;
        while hi < self.offsets.len() && probe(hi) == Ordering::Equal {
            hi += 1;
        }
        lo..hi
    }

    fn slice(
        &self,
        range: std::ops::Range<usize>,
    ) -> &[u32] {
        &self.offsets[range]
    }
}

/// Modification stamp of a tags file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub mtime_nanos: u64,
    pub size: u64,
}

impl FileStamp {
    pub fn of(path: &Path) -> Result<Self, TagsError> {
        let meta = fs::metadata(path).map_err(|e| TagsError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            mtime_nanos: FsUtils::mtime_nanos(&meta),
            size: meta.len(),
        })
    }
}

/// One entry of the referenced-file table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFile {
    /// File column as written in the tags file
    pub name: String,
    /// Source mtime in seconds at index time (0 if it was missing)
    pub mtime_secs: u64,
}

/// How `TagIndex::open` obtained its arrays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    /// Side-file was current and reused as is
    Loaded,
    /// Arrays were rebuilt from the tags file and persisted
    Built,
}

/// Sorted-offset index over one tags file
#[derive(Debug)]
pub struct TagIndex {
    tags_file: PathBuf,
    base_dir: PathBuf,
    text: FileContent,
    separator: u8,
    stamp: FileStamp,
    by_name: SortedOffsets,
    by_file: SortedOffsets,
    by_class: SortedOffsets,
    files: Vec<TrackedFile>,
}

impl TagIndex {
    /// Side-file location for a tags file.
    pub fn index_path(tags_file: &Path) -> PathBuf {
        PathUtils::with_suffix(tags_file, INDEX_SUFFIX)
    }

    /// Load the persisted index, rebuilding and persisting it when stale.
    #[instrument(skip(progress), fields(tags = %tags_file.display()))]
    pub fn open(
        tags_file: &Path,
        progress: &ProgressBar,
    ) -> Result<(Self, OpenOutcome)> {
        if let Some(index) = Self::load(tags_file)? {
            debug!(symbols = index.symbol_count(), "index side-file is current");
            return Ok((index, OpenOutcome::Loaded));
        }

        let index = Self::build(tags_file, progress)?;
        // An unwritable side-file only costs a rebuild next session
        if let Err(e) = index.persist() {
            warn!(error = %e, "could not persist tags index");
        }
        Ok((index, OpenOutcome::Built))
    }

    /// Read the tags file once and produce all three orderings.
    #[instrument(skip(progress), fields(tags = %tags_file.display()))]
    pub fn build(
        tags_file: &Path,
        progress: &ProgressBar,
    ) -> Result<Self> {
        let stamp = FileStamp::of(tags_file)?;
        if stamp.size > u64::from(u32::MAX) {
            return Err(TagsError::TooLarge {
                path: tags_file.to_path_buf(),
                size: stamp.size,
            }
            .into());
        }

        let text = read_file_smart(tags_file).map_err(|e| TagsError::Unreadable {
            path: tags_file.to_path_buf(),
            reason: format!("{e:#}"),
        })?;
        if !text.as_ref().starts_with(HEADER_PREFIX) {
            return Err(TagsError::NotTagsFile(tags_file.to_path_buf()).into());
        }

        let base_dir = tags_dir(tags_file);
        let lines = NewlineIndex::build(text.as_ref());
        let candidates: Vec<u32> = lines
            .line_starts()
            .filter(|&off| {
                text.line_at(off)
                    .is_some_and(|l| !l.is_empty() && l[0] != b'!')
            })
            .map(|off| off as u32)
            .collect();

        progress.set_message(format!("indexing {} tag lines", candidates.len()));

        let separator = detect_separator(&text, &candidates);
        let ctx = ParseContext::new(tags_file, &base_dir).with_separator(separator);
        let valid: Vec<u32> = candidates
            .par_iter()
            .copied()
            .filter(|&off| {
                text.line_at(off as usize)
                    .is_some_and(|l| parse_line(&l.to_str_lossy(), &ctx).is_some())
            })
            .collect();

        let skipped = candidates.len() - valid.len();
        if skipped > 0 {
            debug!(skipped, "malformed tag lines ignored");
        }

        let with_class: Vec<u32> = valid
            .iter()
            .copied()
            .filter(|&off| {
                text.line_at(off as usize)
                    .and_then(|l| KeyOrder::Class.key(l))
                    .is_some()
            })
            .collect();

        let by_name = SortedOffsets::sorted(valid.clone(), &text, KeyOrder::Name);
        let by_file = SortedOffsets::sorted(valid, &text, KeyOrder::File);
        let by_class = SortedOffsets::sorted(with_class, &text, KeyOrder::Class);

        let files = track_files(&text, &by_file, &base_dir, separator);
        progress.set_message(format!("indexed {} symbols", by_name.len()));

        Ok(Self {
            tags_file: tags_file.to_path_buf(),
            base_dir,
            text,
            separator,
            stamp,
            by_name,
            by_file,
            by_class,
            files,
        })
    }

    /// Read the side-file; None when it is missing, corrupt or stale.
    pub fn load(tags_file: &Path) -> Result<Option<Self>> {
        let stamp = FileStamp::of(tags_file)?;
        let index_path = Self::index_path(tags_file);
        let Ok(raw) = fs::read(&index_path) else {
            return Ok(None);
        };

        let Some(persisted) = Persisted::decode(&raw) else {
            warn!(path = %index_path.display(), "corrupt tags index, rebuilding");
            return Ok(None);
        };
        if persisted.stamp != stamp {
            debug!(path = %index_path.display(), "tags index is stale");
            return Ok(None);
        }

        let text = read_file_smart(tags_file).map_err(|e| TagsError::Unreadable {
            path: tags_file.to_path_buf(),
            reason: format!("{e:#}"),
        })?;
        let in_bounds = |s: &SortedOffsets| {
            s.offsets.iter().all(|&off| {
                let off = off as usize;
                off < text.len() && (off == 0 || text.as_ref()[off - 1] == b'\n')
            })
        };
        if !(in_bounds(&persisted.by_name)
            && in_bounds(&persisted.by_file)
            && in_bounds(&persisted.by_class))
        {
            warn!(path = %index_path.display(), "tags index offsets out of bounds, rebuilding");
            return Ok(None);
        }

        Ok(Some(Self {
            tags_file: tags_file.to_path_buf(),
            base_dir: tags_dir(tags_file),
            text,
            separator: persisted.separator,
            stamp,
            by_name: persisted.by_name,
            by_file: persisted.by_file,
            by_class: persisted.by_class,
            files: persisted.files,
        }))
    }

    /// Write the side-file atomically.
    pub fn persist(&self) -> Result<()> {
        let path = Self::index_path(&self.tags_file);
        FsUtils::write_atomic(&path, &self.encode())
            .with_context(|| format!("write tags index {}", path.display()))
    }

    /// Write the side-file for a tags file that will later be renamed to
    /// `final_tags`, returning the staged index without installing it.
    pub fn stage_for(
        &self,
        final_tags: &Path,
    ) -> Result<tempfile::NamedTempFile> {
        FsUtils::stage(&Self::index_path(final_tags), &self.encode())
    }

    fn encode(&self) -> Vec<u8> {
        Persisted::encode(
            self.separator,
            self.stamp,
            [&self.by_name, &self.by_file, &self.by_class],
            &self.files,
        )
    }

    /// True while the tags file still carries the stamp this index saw.
    pub fn is_fresh(&self) -> bool {
        FileStamp::of(&self.tags_file).is_ok_and(|s| s == self.stamp)
    }

    pub fn symbol_count(&self) -> usize {
        self.by_name.len()
    }

    pub fn tracked_files(&self) -> &[TrackedFile] {
        &self.files
    }

    fn ordering(
        &self,
        order: KeyOrder,
    ) -> &SortedOffsets {
        match order {
            KeyOrder::Name => &self.by_name,
            KeyOrder::File => &self.by_file,
            KeyOrder::Class => &self.by_class,
        }
    }

    /// Raw lines whose `order` key starts with `prefix`, deduplicated,
    /// in index order.
    pub fn lookup_lines(
        &self,
        order: KeyOrder,
        prefix: &[u8],
    ) -> Vec<&[u8]> {
        let sorted = self.ordering(order);
        let normalized = order.normalize(prefix);
        let range = if prefix.is_empty() {
            0..sorted.len()
        } else {
            sorted.prefix_range(&self.text, order, &normalized)
        };

        let unique: IndexSet<&[u8]> = sorted
            .slice(range)
            .iter()
            .filter_map(|&off| self.text.line_at(off as usize))
            .collect();
        unique.into_iter().collect()
    }

    /// Parsed records whose `order` key starts with `prefix`.
    pub fn lookup(
        &self,
        order: KeyOrder,
        prefix: &[u8],
    ) -> Vec<TagRecord> {
        let ctx = self.parse_context();
        self.lookup_lines(order, prefix)
            .into_iter()
            .filter_map(|line| parse_line(&line.to_str_lossy(), &ctx))
            .collect()
    }

    pub fn parse_context(&self) -> ParseContext<'_> {
        ParseContext::new(&self.tags_file, &self.base_dir).with_separator(self.separator)
    }

    /// Referenced files whose mtime changed, or that vanished, since indexing.
    pub fn stale_files(&self) -> Vec<PathBuf> {
        let ctx = self.parse_context();
        self.files
            .iter()
            .filter_map(|f| {
                let path = resolve_file(&f.name, &ctx);
                match FsUtils::mtime_secs(&path) {
                    Some(m) if m == f.mtime_secs => None,
                    _ => Some(path),
                }
            })
            .collect()
    }

    /// Whether `file` (absolute) is new or changed relative to the index.
    pub fn is_file_stale(
        &self,
        file: &Path,
    ) -> bool {
        let ctx = self.parse_context();
        let current = FsUtils::mtime_secs(file);
        match self
            .files
            .iter()
            .find(|f| resolve_file(&f.name, &ctx) == file)
        {
            Some(f) => current != Some(f.mtime_secs),
            None => true,
        }
    }
}

/// Directory relative file columns resolve against
pub fn tags_dir(tags_file: &Path) -> PathBuf {
    match tags_file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// First explicit separator found in a file column; native otherwise.
fn detect_separator(
    text: &FileContent,
    offsets: &[u32],
) -> u8 {
    offsets
        .iter()
        .filter_map(|&off| text.line_at(off as usize))
        .filter_map(|l| KeyOrder::File.key(l))
        .find_map(|file| {
            file.iter()
                .copied()
                .find(|&b| b == b'/' || b == b'\\')
        })
        .unwrap_or(MAIN_SEPARATOR as u8)
}

/// Distinct file columns with their current mtimes, in file order.
fn track_files(
    text: &FileContent,
    by_file: &SortedOffsets,
    base_dir: &Path,
    separator: u8,
) -> Vec<TrackedFile> {
    let names: IndexSet<String> = by_file
        .offsets
        .iter()
        .filter_map(|&off| text.line_at(off as usize))
        .filter_map(|l| KeyOrder::File.key(l))
        .map(|f| f.to_str_lossy().into_owned())
        .collect();

    let dummy_owner = base_dir.join("tags");
    let ctx = ParseContext::new(&dummy_owner, base_dir).with_separator(separator);
    names
        .into_iter()
        .map(|name| {
            let mtime_secs = FsUtils::mtime_secs(&resolve_file(&name, &ctx)).unwrap_or(0);
            TrackedFile { name, mtime_secs }
        })
        .collect()
}

/// Side-file contents without the tags text
struct Persisted {
    separator: u8,
    stamp: FileStamp,
    by_name: SortedOffsets,
    by_file: SortedOffsets,
    by_class: SortedOffsets,
    files: Vec<TrackedFile>,
}

impl Persisted {
    fn encode(
        separator: u8,
        stamp: FileStamp,
        orders: [&SortedOffsets; 3],
        files: &[TrackedFile],
    ) -> Vec<u8> {
        let offsets: usize = orders.iter().map(|o| o.len()).sum();
        let mut out = Vec::with_capacity(32 + offsets * 4 + files.len() * 48);
        out.extend_from_slice(SIGNATURE);
        out.push(separator);
        out.extend_from_slice(&stamp.mtime_nanos.to_le_bytes());
        out.extend_from_slice(&stamp.size.to_le_bytes());
        for order in orders {
            out.extend_from_slice(&(order.len() as u32).to_le_bytes());
            for off in &order.offsets {
                out.extend_from_slice(&off.to_le_bytes());
            }
        }

        // Names longer than u16::MAX cannot be stored; they are dropped
        // and simply read as "new" by staleness checks.
        let storable: Vec<&TrackedFile> = files
            .iter()
            .filter(|f| f.name.len() <= usize::from(u16::MAX))
            .collect();
        out.extend_from_slice(&(storable.len() as u32).to_le_bytes());
        for f in storable {
            out.extend_from_slice(&(f.name.len() as u16).to_le_bytes());
            out.extend_from_slice(f.name.as_bytes());
            out.extend_from_slice(&f.mtime_secs.to_le_bytes());
        }
        out
    }

    fn decode(raw: &[u8]) -> Option<Self> {
        let mut r = Reader { buf: raw, pos: 0 };
        if r.take(SIGNATURE.len())? != SIGNATURE {
            return None;
        }
        let separator = r.u8()?;
        let stamp = FileStamp {
            mtime_nanos: r.u64()?,
            size: r.u64()?,
        };
        let mut orders = Vec::with_capacity(3);
        for _ in 0..3 {
            let count = r.u32()? as usize;
            if count > r.remaining() / 4 {
                return None;
            }
            let offsets = (0..count)
                .map(|_| r.u32())
                .collect::<Option<Vec<u32>>>()?;
            orders.push(SortedOffsets { offsets });
        }
        let count = r.u32()? as usize;
        let mut files = Vec::with_capacity(count.min(r.remaining() / 10));
        for _ in 0..count {
            let len = r.u16()? as usize;
            let name = std::str::from_utf8(r.take(len)?).ok()?.to_string();
            let mtime_secs = r.u64()?;
            files.push(TrackedFile { name, mtime_secs });
        }
        if r.remaining() != 0 {
            return None;
        }

        let by_class = orders.pop()?;
        let by_file = orders.pop()?;
        let by_name = orders.pop()?;
        Some(Self {
            separator,
            stamp,
            by_name,
            by_file,
            by_class,
            files,
        })
    }
}

/// Bounds-checked little-endian cursor
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(
        &mut self,
        n: usize,
    ) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let out = self.buf.get(self.pos..end)?;
        self.pos = end;
        Some(out)
    }

    fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    fn u16(&mut self) -> Option<u16> {
        self.take(2)?.try_into().ok().map(u16::from_le_bytes)
    }

    fn u32(&mut self) -> Option<u32> {
        self.take(4)?.try_into().ok().map(u32::from_le_bytes)
    }

    fn u64(&mut self) -> Option<u64> {
        self.take(8)?.try_into().ok().map(u64::from_le_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TAGS: &str = "!_TAG_FILE_FORMAT\t2\t/extended format/\n\
!_TAG_FILE_SORTED\t1\t/0=unsorted, 1=sorted, 2=foldcase/\n\
zeta\tsrc/z.c\t/^int zeta;$/;\"\tv\n\
Alpha\tsrc/a.cpp\t/^class Alpha {$/;\"\tc\n\
alpha_init\tsrc/a.cpp\t/^void Alpha::init()$/;\"\tf\tclass:Alpha\n\
broken line without tabs\n\
alpha_run\tsrc/a.cpp\t/^void Alpha::run()$/;\"\tf\tline:30\tclass:Alpha\n\
beta\tsrc/b.cpp\t12;\"\tf\n";

    fn fixture() -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("src")).unwrap();
        for f in ["z.c", "a.cpp", "b.cpp"] {
            fs::write(tmp.path().join("src").join(f), "x\n").unwrap();
        }
        let tags = tmp.path().join("tags");
        fs::write(&tags, TAGS).unwrap();
        (tmp, tags)
    }

    fn names(records: &[TagRecord]) -> Vec<&str> {
        records.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn build_skips_headers_and_malformed_lines() {
        let (_tmp, tags) = fixture();
        let idx = TagIndex::build(&tags, &ProgressBar::hidden()).unwrap();
        assert_eq!(idx.symbol_count(), 5);
        assert_eq!(idx.tracked_files().len(), 3);
    }

    #[test]
    fn name_order_is_case_folded() {
        let (_tmp, tags) = fixture();
        let idx = TagIndex::build(&tags, &ProgressBar::hidden()).unwrap();
        let all = idx.lookup(KeyOrder::Name, b"");
        assert_eq!(names(&all), vec!["Alpha", "alpha_init", "alpha_run", "beta", "zeta"]);
        let part = idx.lookup(KeyOrder::Name, b"ALPHA_");
        assert_eq!(names(&part), vec!["alpha_init", "alpha_run"]);
        assert!(idx.lookup(KeyOrder::Name, b"gamma").is_empty());
    }

    #[test]
    fn file_and_class_orders() {
        let (_tmp, tags) = fixture();
        let idx = TagIndex::build(&tags, &ProgressBar::hidden()).unwrap();
        let in_a = idx.lookup(KeyOrder::File, b"SRC/A.CPP");
        assert_eq!(in_a.len(), 3);
        let members = idx.lookup(KeyOrder::Class, b"Alpha");
        assert_eq!(names(&members), vec!["alpha_init", "alpha_run"]);
        assert!(idx.lookup(KeyOrder::Class, b"alpha").is_empty());
    }

    #[test]
    fn rejects_files_without_header() {
        let tmp = TempDir::new().unwrap();
        let p = tmp.path().join("tags");
        fs::write(&p, "main\tm.c\t1;\"\tf\n").unwrap();
        let err = TagIndex::build(&p, &ProgressBar::hidden()).unwrap_err();
        assert!(matches!(err.downcast_ref::<TagsError>(), Some(TagsError::NotTagsFile(_))));
    }

    #[test]
    fn persisted_index_round_trips_and_goes_stale() {
        let (_tmp, tags) = fixture();
        let (first, how) = TagIndex::open(&tags, &ProgressBar::hidden()).unwrap();
        assert_eq!(how, OpenOutcome::Built);

        let (second, how) = TagIndex::open(&tags, &ProgressBar::hidden()).unwrap();
        assert_eq!(how, OpenOutcome::Loaded);
        assert_eq!(second.by_name, first.by_name);
        assert_eq!(second.by_file, first.by_file);
        assert_eq!(second.by_class, first.by_class);
        assert_eq!(second.files, first.files);

        fs::write(&tags, format!("{TAGS}extra\tsrc/z.c\t2;\"\tv\n")).unwrap();
        assert!(!second.is_fresh());
        let (third, how) = TagIndex::open(&tags, &ProgressBar::hidden()).unwrap();
        assert_eq!(how, OpenOutcome::Built);
        assert_eq!(third.symbol_count(), 6);
    }

    #[test]
    fn corrupt_side_file_is_rebuilt() {
        let (_tmp, tags) = fixture();
        TagIndex::open(&tags, &ProgressBar::hidden()).unwrap();
        let idx_path = TagIndex::index_path(&tags);
        let mut raw = fs::read(&idx_path).unwrap();
        raw.truncate(raw.len() - 3);
        fs::write(&idx_path, raw).unwrap();

        let (idx, how) = TagIndex::open(&tags, &ProgressBar::hidden()).unwrap();
        assert_eq!(how, OpenOutcome::Built);
        assert_eq!(idx.symbol_count(), 5);
    }

    #[test]
    fn class_key_ignores_pattern_text() {
        let line = b"f\ta.c\t/^class:Fake$/;\"\tf\tstruct:Real";
        assert_eq!(KeyOrder::Class.key(line), Some(&b"Real"[..]));
        assert_eq!(KeyOrder::Class.key(b"f\ta.c\t1;\"\tf"), None);
    }

    #[test]
    fn stale_files_track_source_changes() {
        let (tmp, tags) = fixture();
        let idx = TagIndex::build(&tags, &ProgressBar::hidden()).unwrap();
        assert!(idx.stale_files().is_empty());

        fs::remove_file(tmp.path().join("src/z.c")).unwrap();
        assert_eq!(idx.stale_files(), vec![tmp.path().join("src/z.c")]);
        assert!(idx.is_file_stale(&tmp.path().join("src/new.c")));
        assert!(!idx.is_file_stale(&tmp.path().join("src/a.cpp")));
    }
}
