//! Shared fixtures for integration tests
//!
//! Tags files are written by hand, and the tag generator is replaced by
//! a scripted `ProcessRunner` so no ctags binary is needed.
#![allow(dead_code)]

use std::{
    cell::RefCell,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Result;
use assert_fs::prelude::*;
use tagdb::core::{Navigator, ProcessRunner};
use tagdb::infra::utils::PathUtils;

pub const HEADER: &str = "!_TAG_FILE_FORMAT\t2\t/extended format/\n!_TAG_FILE_SORTED\t1\t/0=unsorted, 1=sorted/\n";

/// Temp project with a `tags` file holding `records` after the header.
pub fn project(records: &str) -> (assert_fs::TempDir, PathBuf) {
    let tmp = assert_fs::TempDir::new().expect("tempdir");
    tmp.child("tags")
        .write_str(&format!("{HEADER}{records}"))
        .expect("write tags");
    let tags = PathUtils::canonical(&tmp.path().join("tags"));
    (tmp, tags)
}

/// Canonical path of `rel` inside `dir`, creating the file if asked.
pub fn source(
    dir: &Path,
    rel: &str,
    body: Option<&str>,
) -> PathBuf {
    let path = dir.join(rel);
    if let Some(body) = body {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(&path, body).expect("write source");
    }
    PathUtils::canonical(&path)
}

/// Stand-in for ctags: writes `output` to the `-f` target and exits
/// with `status`, recording every invocation.
pub struct ScriptedCtags {
    pub output: String,
    pub status: i32,
    pub calls: RefCell<Vec<(Vec<String>, PathBuf)>>,
}

impl ScriptedCtags {
    pub fn writing(output: &str) -> Self {
        Self {
            output: output.to_string(),
            status: 0,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn failing(status: i32) -> Self {
        Self {
            output: String::new(),
            status,
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl ProcessRunner for ScriptedCtags {
    fn run(
        &self,
        _program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<i32> {
        self.calls
            .borrow_mut()
            .push((args.to_vec(), cwd.to_path_buf()));
        if self.status != 0 {
            return Ok(self.status);
        }
        if let Some(pos) = args.iter().position(|a| a == "-f") {
            let target = Path::new(&args[pos + 1]);
            let target = if target.is_absolute() {
                target.to_path_buf()
            } else {
                cwd.join(target)
            };
            fs::write(target, &self.output)?;
        }
        Ok(0)
    }
}

/// Navigator that remembers where it was sent
#[derive(Default)]
pub struct Recorder {
    pub visits: Vec<(PathBuf, usize)>,
}

impl Navigator for Recorder {
    fn set_position(
        &mut self,
        file: &Path,
        line: usize,
    ) -> Result<()> {
        self.visits.push((file.to_path_buf(), line));
        Ok(())
    }
}
