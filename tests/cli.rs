//! Argument parsing and end-to-end runs of the `tagdb` binary.

mod util;

use std::process::Command;

use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use clap::Parser;
use predicates::prelude::*;
use serde_json::Value;
use tagdb::cli::{Cli, Commands, FindArgs, OutputFormat, PermanentAction};
use util::project;

const RECORDS: &str = "\
Widget\tsrc/widget.h\t/^struct Widget {$/;\"\ts
draw\tsrc/widget.c\t/^void draw(struct Widget *w)$/;\"\tf\tline:12
drawAll\tsrc/widget.c\t/^void drawAll(void)$/;\"\tf\tline:30
size\tsrc/widget.h\t/^  int size;$/;\"\tm\tstruct:Widget
";

fn tagdb() -> Command {
    let mut cmd = Command::cargo_bin("tagdb").expect("bin");
    cmd.env_remove("TAGDB_PERMANENT_LIST")
        .env_remove("RUST_LOG")
        .env("TAGDB_CACHE__PERSIST", "false");
    cmd
}

#[test]
fn find_flags_parse() {
    let cli = Cli::parse_from([
        "tagdb", "find", "dra", "--prefix", "-t", "a/tags", "-t", "b/tags", "--limit", "5",
        "--format", "json", "-i",
    ]);
    match cli.command {
        Commands::Find(FindArgs { name, prefix, query }) => {
            assert_eq!(name, "dra");
            assert!(prefix);
            assert_eq!(query.repo.tags.len(), 2);
            assert_eq!(query.limit, Some(5));
            assert!(query.ignore_case);
            assert!(matches!(query.format, OutputFormat::Json));
        }
        _ => panic!("expected Find command"),
    }
}

#[test]
fn permanent_subcommands_parse() {
    let cli = Cli::parse_from(["tagdb", "permanent", "add", "x/tags"]);
    match cli.command {
        Commands::Permanent(args) => {
            assert!(matches!(args.action, PermanentAction::Add { ref tags } if tags.len() == 1));
        }
        _ => panic!("expected Permanent command"),
    }
    assert!(Cli::try_parse_from(["tagdb", "find", "x", "--exact-case", "-i"]).is_err());
}

#[test]
fn index_reports_symbol_count() {
    let (tmp, _tags) = project(RECORDS);
    tagdb()
        .current_dir(tmp.path())
        .args(["index", "tags", "--quiet"])
        .assert()
        .success()
        .stdout(predicate::str::contains("4 symbols"));
    tmp.child("tags.idx").assert(predicate::path::exists());
}

#[test]
fn find_discovers_tags_upwards() {
    let (tmp, _tags) = project(RECORDS);
    tmp.child("src/deep").create_dir_all().unwrap();
    tagdb()
        .current_dir(tmp.child("src/deep").path())
        .args(["find", "draw", "--quiet"])
        .assert()
        .success()
        .stdout(predicate::str::contains("draw\tf\t"))
        .stdout(predicate::str::contains("void draw(struct Widget *w)"))
        .stdout(predicate::str::contains("drawAll").not());
}

#[test]
fn prefix_find_as_json() {
    let (tmp, _tags) = project(RECORDS);
    let out = tagdb()
        .current_dir(tmp.path())
        .args(["find", "dr", "--prefix", "--format", "json", "--quiet"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let v: Value = serde_json::from_slice(&out.stdout).expect("json");
    let names: Vec<&str> = v
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"draw") && names.contains(&"drawAll"));
}

#[test]
fn members_and_outline() {
    let (tmp, _tags) = project(RECORDS);
    tagdb()
        .current_dir(tmp.path())
        .args(["members", "Widget", "--quiet"])
        .assert()
        .success()
        .stdout(predicate::str::contains("size"));

    tmp.child("src/widget.c").write_str("").unwrap();
    let out = tagdb()
        .current_dir(tmp.path())
        .args(["outline", "src/widget.c", "--quiet"])
        .output()
        .unwrap();
    let text = String::from_utf8(out.stdout).unwrap();
    let first_draw = text.find("draw\t").unwrap();
    let draw_all = text.find("drawAll").unwrap();
    assert!(first_draw < draw_all);
    assert!(text.contains("src/widget.c:12"));
}

#[test]
fn files_lists_distinct_paths() {
    let (tmp, _tags) = project(RECORDS);
    tagdb()
        .current_dir(tmp.path())
        .args(["files", "src/w", "--quiet"])
        .assert()
        .success()
        .stdout(predicate::str::contains("widget.c"))
        .stdout(predicate::str::contains("widget.h"));
}

#[test]
fn goto_prints_the_current_location() {
    let (tmp, _tags) = project(RECORDS);
    tmp.child("src/widget.c")
        .write_str("#include \"widget.h\"\n\nvoid draw(struct Widget *w)\n")
        .unwrap();
    tagdb()
        .current_dir(tmp.path())
        .args(["goto", "draw", "--quiet"])
        .assert()
        .success()
        .stdout(predicate::str::ends_with("widget.c:3\n"));
}

#[test]
fn missing_symbol_fails() {
    let (tmp, _tags) = project(RECORDS);
    tagdb()
        .current_dir(tmp.path())
        .args(["goto", "nothing_here", "--quiet"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No symbol named"));
}

#[test]
fn no_tags_file_is_an_error() {
    let tmp = assert_fs::TempDir::new().unwrap();
    tagdb()
        .current_dir(tmp.path())
        .args(["find", "x", "--quiet"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No tags file found"));
}

#[test]
fn permanent_list_round_trip() {
    let (tmp, _tags) = project(RECORDS);
    let list = tmp.child("state/permanent.list");
    let run = |args: &[&str]| {
        let mut cmd = tagdb();
        cmd.current_dir(tmp.path())
            .env("TAGDB_PERMANENT_LIST", list.path())
            .args(args);
        cmd
    };

    run(&["permanent", "add", "tags"]).assert().success();
    list.assert(predicate::str::contains("tags"));
    run(&["permanent", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tags"));

    // a permanent repository answers from anywhere
    let elsewhere = assert_fs::TempDir::new().unwrap();
    tagdb()
        .current_dir(elsewhere.path())
        .env("TAGDB_PERMANENT_LIST", list.path())
        .args(["find", "Widget", "--quiet"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Widget"));

    run(&["permanent", "remove", "tags"]).assert().success();
    run(&["permanent", "list"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn stat_as_json_lists_repositories() {
    let (tmp, _tags) = project(RECORDS);
    let out = tagdb()
        .current_dir(tmp.path())
        .args(["stat", "--format", "json", "--quiet"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let v: Value = serde_json::from_slice(&out.stdout).expect("json");
    assert_eq!(v["repositories"].as_array().unwrap().len(), 1);
    assert_eq!(v["repositories"][0]["kind"], "regular");
    assert_eq!(v["repositories"][0]["symbols"], "4");
}

#[test]
fn init_writes_config_once() {
    let tmp = assert_fs::TempDir::new().unwrap();
    tagdb()
        .current_dir(tmp.path())
        .arg("init")
        .assert()
        .success();
    tmp.child("tagdb.toml")
        .assert(predicate::str::contains("[ctags]"));
    tagdb()
        .current_dir(tmp.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
}

#[test]
fn completions_to_stdout() {
    tagdb()
        .args(["completions", "bash", "--stdout"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tagdb"));
}
