//! Repository, storage and selector behaviour against real tags files.

mod util;

use std::{fs, path::Path};

use proptest::prelude::*;
use tagdb::core::{
    Repository, RepositoryKind, RepositoryStorage, SortOptions, TagIndex, TagRecord,
    index::OpenOutcome,
};
use util::{Recorder, project, source};

const THREE: &str = "\
first\tmain.c\t/^int first(void)$/;\"\tf\tline:1
second\tmain.c\t/^int second(void)$/;\"\tf\tline:2
third\tmain.c\t/^int third(void)$/;\"\tf\tline:3
";

#[test]
fn cached_tag_counts_visits() {
    let (_tmp, tags) = project(THREE);
    let mut repo = Repository::new(&tags, RepositoryKind::Regular, 10);
    assert_eq!(repo.load().unwrap(), 3);

    let first = repo.find_by_name("first", false).unwrap().remove(0);
    let second = repo.find_by_name("second", false).unwrap().remove(0);
    repo.cache_tag(&second);
    for _ in 0..3 {
        repo.cache_tag(&first);
    }

    let cached = repo.cached_tags(0);
    assert_eq!(cached[0].tag.name, "first");
    assert_eq!(cached[0].frequency, 3);
    assert_eq!(cached.len(), 2);
}

#[test]
fn find_files_returns_every_record_of_the_file() {
    let (_tmp, tags) = project(
        "\
alpha\ta/b.cpp\t10;\"\tf
beta\ta/b.cpp\t42;\"\tf
gamma\ta/bc.cpp\t1;\"\tf
",
    );
    let mut repo = Repository::new(&tags, RepositoryKind::Regular, 10);
    repo.load().unwrap();

    let mut found = repo.find_files(Path::new("a/b.cpp")).unwrap();
    found.sort_by_key(|t| t.line);
    let got: Vec<(&str, usize)> = found.iter().map(|t| (t.name.as_str(), t.line)).collect();
    assert_eq!(got, vec![("alpha", 10), ("beta", 42)]);
}

#[test]
fn second_load_is_idempotent() {
    let (_tmp, tags) = project(THREE);
    let idx = TagIndex::index_path(&tags);

    let mut repo = Repository::new(&tags, RepositoryKind::Regular, 10);
    let count = repo.load().unwrap();
    let before = fs::metadata(&idx).unwrap().modified().unwrap();
    let bytes = fs::read(&idx).unwrap();

    let mut again = Repository::new(&tags, RepositoryKind::Regular, 10);
    assert_eq!(again.load().unwrap(), count);
    assert_eq!(fs::metadata(&idx).unwrap().modified().unwrap(), before);
    assert_eq!(fs::read(&idx).unwrap(), bytes);

    let (_, outcome) = TagIndex::open(&tags, &indicatif::ProgressBar::hidden()).unwrap();
    assert_eq!(outcome, OpenOutcome::Loaded);
}

#[test]
fn corrupt_side_file_is_rebuilt_silently() {
    let (_tmp, tags) = project(THREE);
    let mut repo = Repository::new(&tags, RepositoryKind::Regular, 10);
    repo.load().unwrap();
    fs::write(TagIndex::index_path(&tags), b"TAGDBIX1garbage").unwrap();

    let mut again = Repository::new(&tags, RepositoryKind::Regular, 10);
    assert_eq!(again.load().unwrap(), 3);
    assert_eq!(again.find_by_name("third", false).unwrap().len(), 1);
}

#[test]
fn malformed_lines_do_not_abort_loading() {
    let (_tmp, tags) = project(
        "\
good\tx.c\t1;\"\tf
no tabs at all
broken\tx.c\t/^unterminated
also_good\tx.c\t2;\"\tf
",
    );
    let mut repo = Repository::new(&tags, RepositoryKind::Regular, 10);
    assert_eq!(repo.load().unwrap(), 2);
}

#[test]
fn declarations_carry_no_quoting() {
    let (_tmp, tags) = project(
        "\
split\tp.c\t/^char *split(const char *s, char delim) \\/* \\/ *\\/$/;\"\tf
",
    );
    let mut repo = Repository::new(&tags, RepositoryKind::Regular, 10);
    repo.load().unwrap();
    let tag = repo.find_by_name("split", false).unwrap().remove(0);
    let decl = tag.declaration();
    assert_eq!(decl, "char *split(const char *s, char delim) /* / */");
    assert!(!decl.starts_with('^') && !decl.ends_with('$') && !decl.contains('\\'));
}

#[test]
fn regular_and_permanent_are_both_involved() {
    let (proj, proj_tags) = project("shared\tx.cpp\t1;\"\tf\nlocal\tx.cpp\t2;\"\tf\n");
    let (_lib, lib_tags) = project("shared\tlib.cpp\t7;\"\tf\nremote\tlib.cpp\t9;\"\tf\n");

    let mut storage = RepositoryStorage::new(10);
    storage.load(&proj_tags, RepositoryKind::Regular).unwrap();
    storage.load(&lib_tags, RepositoryKind::Permanent).unwrap();

    let current = source(proj.path(), "x.cpp", Some("int local;\n"));
    let selector = storage.selector(Some(&current), false, SortOptions::default(), 0);
    assert_eq!(selector.repository_count(), 2);

    let shared = selector.find_by_name("shared").unwrap();
    assert_eq!(shared.len(), 2);
    assert_eq!(selector.find_by_name("remote").unwrap().len(), 1);
    assert_eq!(selector.find_by_name("local").unwrap().len(), 1);

    let everything = selector.find_by_name("").unwrap();
    assert_eq!(everything.len(), 4);
}

#[test]
fn current_file_records_come_first() {
    let (proj, proj_tags) = project("shared\tx.cpp\t1;\"\tf\n");
    let (_lib, lib_tags) = project("shared\tlib.cpp\t7;\"\tf\n");
    let mut storage = RepositoryStorage::new(10);
    // Permanent first so registry order would put lib.cpp on top
    storage.load(&lib_tags, RepositoryKind::Permanent).unwrap();
    storage.load(&proj_tags, RepositoryKind::Regular).unwrap();

    let current = source(proj.path(), "x.cpp", Some("int shared;\n"));
    let sort = SortOptions {
        cur_file_first: true,
        ..SortOptions::default()
    };
    let found = storage
        .selector(Some(&current), false, sort, 0)
        .find_by_name("shared")
        .unwrap();
    assert_eq!(found[0].file, current);
}

#[test]
fn navigation_feeds_cached_on_top() {
    let (proj, tags) = project(THREE);
    source(proj.path(), "main.c", Some("int first(void)\nint second(void)\nint third(void)\n"));
    let mut storage = RepositoryStorage::new(10);
    storage.load(&tags, RepositoryKind::Regular).unwrap();

    let sort = SortOptions {
        cached_on_top: true,
        ..SortOptions::default()
    };
    let current = source(proj.path(), "main.c", None);
    let third = storage
        .selector(Some(&current), false, sort, 0)
        .find_by_name("third")
        .unwrap()
        .remove(0);

    let mut nav = Recorder::default();
    assert_eq!(storage.navigate(&third, &mut nav).unwrap(), 3);
    assert_eq!(nav.visits, vec![(current.clone(), 3)]);

    let all = storage
        .selector(Some(&current), false, sort, 0)
        .find_by_name("")
        .unwrap();
    assert_eq!(all[0].name, "third");
}

#[test]
fn erase_routes_to_owner() {
    let (_tmp, tags) = project(THREE);
    let mut storage = RepositoryStorage::new(10);
    let repo = storage.load(&tags, RepositoryKind::Regular).unwrap();
    let first: TagRecord = repo.borrow_mut().find_by_name("first", false).unwrap().remove(0);

    storage.cache_tag(&first).unwrap();
    assert!(storage.erase_cached_tag(&first).unwrap());
    assert!(!storage.erase_cached_tag(&first).unwrap());
    assert!(repo.borrow().cache_stat().is_empty());
}

#[test]
fn stale_files_follow_source_changes() {
    let (proj, tags) = project("f\tsrc.c\t1;\"\tf\ng\tgone.c\t1;\"\tf\n");
    let src = source(proj.path(), "src.c", Some("int f;\n"));
    let mut repo = Repository::new(&tags, RepositoryKind::Regular, 10);
    repo.load().unwrap();

    let stale = repo.stale_files().unwrap();
    assert_eq!(stale.len(), 1);
    assert!(stale[0].ends_with("gone.c"));
    assert!(!repo.is_file_stale(&src).unwrap());
    assert!(repo.is_file_stale(&proj.path().join("new.c")).unwrap());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn longer_prefixes_select_subsets(
        names in proptest::collection::btree_set("[a-c]{1,4}", 1..30),
        needle in "[a-c]{1,3}",
    ) {
        let records: String = names
            .iter()
            .enumerate()
            .map(|(i, n)| format!("{n}\tf.c\t{};\"\tf\n", i + 1))
            .collect();
        let (_tmp, tags) = project(&records);
        let mut repo = Repository::new(&tags, RepositoryKind::Regular, 10);
        repo.load().unwrap();

        prop_assert_eq!(repo.find_by_name("", false).unwrap().len(), names.len());

        let wide = repo.find_by_name_part(&needle[..1], 0, false).unwrap();
        let narrow = repo.find_by_name_part(&needle, 0, false).unwrap();
        prop_assert!(narrow.iter().all(|t| wide.contains(t)));
        let expected = names.iter().filter(|n| n.starts_with(needle.as_str())).count();
        prop_assert_eq!(narrow.len(), expected);
    }
}
