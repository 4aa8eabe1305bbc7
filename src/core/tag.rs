//! Tag records and the ctags line parser.
//!
//! A data line looks like
//! `<name>\t<file>\t<locator>;"\t<kind>[\tline:<n>][\t<field>...]`
//! where the locator is either a decimal line number or a `/pattern/`
//! (`?pattern?`) search expression. Lines that do not fit are skipped by
//! returning `None`; a corrupt line never aborts the caller.

use std::{
    borrow::Cow,
    path::{MAIN_SEPARATOR, MAIN_SEPARATOR_STR, Path, PathBuf},
    sync::LazyLock,
};

use regex::Regex;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Extension-field prefixes that denote class/struct membership.
pub const SCOPE_FIELDS: [&str; 2] = ["class:", "struct:"];

static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// One symbol definition read from a tags file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagRecord {
    /// Symbol name; empty for file tags
    pub name: String,

    /// Absolute path of the defining file
    pub file: PathBuf,

    /// 1-based line, 0 when only a pattern is known
    pub line: usize,

    /// Raw search pattern between the delimiters (escapes intact)
    pub pattern: Option<String>,

    /// One-character ctags kind
    pub kind: Option<char>,

    /// Remaining extension fields, tab separated (e.g. `class:Foo`)
    pub info: String,

    /// Tags file this record was read from
    pub owner: PathBuf,
}

/// Everything the parser needs to know about the tags file being read
#[derive(Debug, Clone, Copy)]
pub struct ParseContext<'a> {
    /// Path of the tags file (becomes `TagRecord::owner`)
    pub tags_file: &'a Path,

    /// Directory relative file names resolve against
    pub base_dir: &'a Path,

    /// Path separator the tags file was written with
    pub separator: u8,
}

impl<'a> ParseContext<'a> {
    pub fn new(
        tags_file: &'a Path,
        base_dir: &'a Path,
    ) -> Self {
        Self {
            tags_file,
            base_dir,
            separator: MAIN_SEPARATOR as u8,
        }
    }

    pub fn with_separator(
        mut self,
        separator: u8,
    ) -> Self {
        self.separator = separator;
        self
    }
}

impl TagRecord {
    /// A pure file-location result (empty name, no line).
    pub fn file_tag(
        file: PathBuf,
        owner: PathBuf,
    ) -> Self {
        Self {
            name: String::new(),
            file,
            line: 0,
            pattern: None,
            kind: None,
            info: String::new(),
            owner,
        }
    }

    pub fn is_file_tag(&self) -> bool {
        self.name.is_empty()
    }

    /// Class or struct this record is a member of, if any.
    pub fn class_name(&self) -> Option<&str> {
        class_of(&self.info)
    }

    /// Human-readable declaration derived from the search pattern.
    ///
    /// Anchors are stripped, ctags quoting removed and whitespace runs
    /// collapsed. Records without a pattern yield an empty string.
    pub fn declaration(&self) -> String {
        match &self.pattern {
            Some(raw) => {
                let decoded = PatternText::decode(raw);
                WHITESPACE_RUN
                    .replace_all(decoded.text.trim(), " ")
                    .into_owned()
            }
            None => String::new(),
        }
    }

    /// Resolve the 1-based line of this tag inside `source`.
    ///
    /// The stored line is trusted when it still matches the pattern;
    /// otherwise the nearest line matching the pattern wins. Without a
    /// pattern, or when nothing matches, the stored line is returned.
    pub fn locate(
        &self,
        source: &str,
    ) -> Option<usize> {
        let stored = (self.line > 0).then_some(self.line);
        let Some(raw) = &self.pattern else {
            return stored;
        };
        let pattern = PatternText::decode(raw);
        let lines: Vec<&str> = source
            .lines()
            .map(|l| l.trim_end_matches('\r'))
            .collect();

        if let Some(line) = stored
            && lines
                .get(line - 1)
                .is_some_and(|l| pattern.matches(l))
        {
            return Some(line);
        }

        let anchor = stored.unwrap_or(1);
        lines
            .iter()
            .enumerate()
            .filter(|(_, l)| pattern.matches(l))
            .map(|(i, _)| i + 1)
            .min_by_key(|&n| n.abs_diff(anchor))
            .or(stored)
    }
}

/// Extract the class/struct scope from an extension string.
pub fn class_of(info: &str) -> Option<&str> {
    info.split('\t').find_map(|field| {
        SCOPE_FIELDS
            .iter()
            .find_map(|prefix| field.strip_prefix(prefix))
            .filter(|v| !v.is_empty())
    })
}

/// Decoded form of a ctags search pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternText {
    pub anchored_start: bool,
    pub anchored_end: bool,
    pub text: String,
}

impl PatternText {
    /// Strip `^`/`$` anchors and undo ctags escaping.
    pub fn decode(raw: &str) -> Self {
        let (anchored_start, body) = match raw.strip_prefix('^') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        // A trailing `\$` is a literal dollar, not an anchor
        let anchored_end = body.ends_with('$') && !body.ends_with("\\$");
        let body = if anchored_end { &body[..body.len() - 1] } else { body };

        let mut text = String::with_capacity(body.len());
        let mut chars = body.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                match chars.next() {
                    Some(n @ ('\\' | '/' | '?' | '$' | '^')) => text.push(n),
                    Some(n) => {
                        text.push('\\');
                        text.push(n);
                    }
                    None => text.push('\\'),
                }
            } else {
                text.push(c);
            }
        }

        Self {
            anchored_start,
            anchored_end,
            text,
        }
    }

    /// Literal match of one source line against the pattern.
    pub fn matches(
        &self,
        line: &str,
    ) -> bool {
        match (self.anchored_start, self.anchored_end) {
            (true, true) => line == self.text,
            (true, false) => line.starts_with(&self.text),
            (false, true) => line.ends_with(&self.text),
            (false, false) => line.contains(&self.text),
        }
    }
}

/// Parse one tags-file line; `None` for headers, blanks and malformed input.
pub fn parse_line(
    line: &str,
    ctx: &ParseContext<'_>,
) -> Option<TagRecord> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() || line.starts_with('!') {
        return None;
    }

    let (name, rest) = line.split_once('\t')?;
    let (file, rest) = rest.split_once('\t')?;
    if name.is_empty() || file.is_empty() {
        return None;
    }

    let (locator, fields) = split_locator(rest)?;
    let (mut line_no, pattern) = match locator {
        Locator::Line(n) => (n, None),
        Locator::Pattern(p) => (0, Some(p.to_string())),
    };

    let mut kind = None;
    let mut info: SmallVec<[&str; 4]> = SmallVec::new();
    for field in fields
        .split('\t')
        .filter(|f| !f.is_empty())
    {
        if let Some(n) = field.strip_prefix("line:") {
            line_no = n.parse().ok()?;
        } else if let Some(k) = field.strip_prefix("kind:") {
            kind = kind.or_else(|| k.chars().next());
        } else if !field.contains(':') && field.chars().count() == 1 {
            kind = kind.or_else(|| field.chars().next());
        } else {
            info.push(field);
        }
    }

    Some(TagRecord {
        name: name.to_string(),
        file: resolve_file(file, ctx),
        line: line_no,
        pattern,
        kind,
        info: info.join("\t"),
        owner: ctx.tags_file.to_path_buf(),
    })
}

enum Locator<'a> {
    Line(usize),
    Pattern(&'a str),
}

/// Split the locator off the third column, returning the extension tail.
fn split_locator(rest: &str) -> Option<(Locator<'_>, &str)> {
    let end = locator_end(rest.as_bytes())?;
    let locator = match rest.as_bytes()[0] {
        b'/' | b'?' => Locator::Pattern(&rest[1..end - 1]),
        _ => Locator::Line(rest[..end].parse().ok()?),
    };
    let tail = extension_tail(&rest.as_bytes()[end..])?;
    Some((locator, &rest[rest.len() - tail.len()..]))
}

/// Byte length of the locator at the start of the third column,
/// closing delimiter included.
pub fn locator_end(rest: &[u8]) -> Option<usize> {
    match *rest.first()? {
        delim @ (b'/' | b'?') => {
            let mut i = 1;
            loop {
                match *rest.get(i)? {
                    b'\\' => i += 2,
                    b if b == delim => return Some(i + 1),
                    _ => i += 1,
                }
            }
        }
        b'0'..=b'9' => Some(
            rest.iter()
                .position(|b| !b.is_ascii_digit())
                .unwrap_or(rest.len()),
        ),
        _ => None,
    }
}

/// Extension fields following a locator: `;"` is optional, and anything
/// else must start with a tab.
pub fn extension_tail(after: &[u8]) -> Option<&[u8]> {
    let tail = after.strip_prefix(b";\"").unwrap_or(after);
    if !tail.is_empty() && tail[0] != b'\t' {
        return None;
    }
    Some(tail)
}

/// Resolve a file column against the tags directory.
pub fn resolve_file(
    file: &str,
    ctx: &ParseContext<'_>,
) -> PathBuf {
    let normalized = normalize_separators(file, ctx.separator);
    let trimmed = normalized
        .strip_prefix("./")
        .unwrap_or(&normalized);
    let path = Path::new(trimmed);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        ctx.base_dir.join(path)
    }
}

/// Rewrite foreign separators to the native one.
pub fn normalize_separators(
    file: &str,
    separator: u8,
) -> Cow<'_, str> {
    let native = MAIN_SEPARATOR as u8;
    if separator == native || !file.contains(separator as char) {
        Cow::Borrowed(file)
    } else {
        Cow::Owned(file.replace(separator as char, MAIN_SEPARATOR_STR))
    }
}
