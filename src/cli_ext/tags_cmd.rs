//! CLI command handlers for tag queries, updates and repository upkeep.

use std::{
    io::IsTerminal,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use serde::Serialize;
use serde_json::json;
use tabled::{Table, Tabled};
use tracing::{debug, instrument};

use crate::{
    cli::{
        AppContext, FilesArgs, FindArgs, GenerateArgs, GotoArgs, IndexArgs, MembersArgs,
        OutlineArgs, OutputFormat, PermanentAction, PermanentArgs, QueryArgs, RepoArgs, StatArgs,
        UpdateArgs,
    },
    core::{
        host::{CommandRunner, Navigator},
        index::TagIndex,
        repository::{Repository, RepositoryKind},
        selector::{Selector, SortOptions},
        storage::RepositoryStorage,
        tag::TagRecord,
        update,
    },
    infra::{
        config::{Config, load_config},
        path_list::PathList,
        utils::PathUtils,
    },
};

/// Terminal styling that honours `--no-color` and non-tty output
#[derive(Debug, Clone, Copy)]
struct Paint {
    on: bool,
}

impl Paint {
    fn new(ctx: &AppContext) -> Self {
        Self {
            on: !ctx.no_color && std::io::stdout().is_terminal(),
        }
    }

    fn name(
        self,
        s: &str,
    ) -> String {
        if self.on { s.cyan().bold().to_string() } else { s.to_string() }
    }

    fn dim(
        self,
        s: &str,
    ) -> String {
        if self.on { s.dimmed().to_string() } else { s.to_string() }
    }

    fn good(
        self,
        s: &str,
    ) -> String {
        if self.on { s.green().bold().to_string() } else { s.to_string() }
    }
}

fn spinner(ctx: &AppContext) -> ProgressBar {
    if ctx.quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Nearest `name` file in `start` or one of its ancestors.
pub fn discover_tags(
    start: &Path,
    name: &str,
) -> Option<PathBuf> {
    let start = PathUtils::canonical(start);
    let dir = if start.is_file() {
        start.parent()?.to_path_buf()
    } else {
        start
    };
    dir.ancestors()
        .map(|d| d.join(name))
        .find(|p| p.is_file())
}

/// Loaded configuration and repositories for one command
struct Session {
    config: Config,
    storage: RepositoryStorage,
    current: Option<PathBuf>,
}

impl Session {
    fn open(
        repo: &RepoArgs,
        ctx: &AppContext,
    ) -> Result<Self> {
        let config = load_config()?;
        let mut storage = RepositoryStorage::new(config.cache.capacity)
            .with_persisted_caches(config.cache.persist && !ctx.dry_run);

        if !repo.no_permanent
            && let Some(list_path) = config.permanent_list_path()
        {
            let list = PathList::load(&list_path)?;
            let loaded = storage.load_permanent(&list);
            debug!(loaded, listed = list.len(), "permanent repositories");
        }

        let mut tags = repo.tags.clone();
        if tags.is_empty() {
            let start = match &repo.file {
                Some(f) => f.clone(),
                None => std::env::current_dir().context("current directory")?,
            };
            tags.extend(discover_tags(&start, &config.ctags.tags_name));
        }

        let pb = spinner(ctx);
        for t in &tags {
            pb.set_message(format!("loading {}", t.display()));
            storage
                .load_with(t, RepositoryKind::Regular, &pb)
                .with_context(|| format!("load {}", t.display()))?;
        }
        pb.finish_and_clear();

        if storage.is_empty() {
            bail!("No tags file found. Pass --tags or run `tagdb generate` first.");
        }
        Ok(Self {
            config,
            storage,
            current: repo.file.clone(),
        })
    }

    fn selector(
        &self,
        q: &QueryArgs,
    ) -> Selector {
        let search = &self.config.search;
        let case_insensitive = if q.ignore_case {
            true
        } else if q.exact_case {
            false
        } else {
            search.ignore_case
        };
        let mut sort = SortOptions::from(search);
        sort.sort_by_name |= q.sort_by_name;
        self.storage.selector_all(
            self.current.as_deref(),
            case_insensitive,
            sort,
            q.limit.unwrap_or(search.limit),
        )
    }

    fn finish(self) -> Result<()> {
        self.storage.save_caches()
    }
}

fn print_tags(
    selector: &Selector,
    tags: &[TagRecord],
    format: OutputFormat,
    ctx: &AppContext,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(tags)?);
        }
        OutputFormat::Table => {
            if !tags.is_empty() {
                println!("{}", Table::new(selector.rows(tags)));
            }
        }
        OutputFormat::Text => {
            let paint = Paint::new(ctx);
            for row in selector.rows(tags) {
                if row.name.is_empty() {
                    println!("{}", row.location);
                    continue;
                }
                let mut line = format!("{}\t{}\t{}", paint.name(&row.name), row.kind, row.location);
                if !row.declaration.is_empty() {
                    line.push('\t');
                    line.push_str(&paint.dim(&row.declaration));
                }
                println!("{line}");
            }
        }
    }
    if tags.is_empty() && !ctx.quiet {
        eprintln!("No matches");
    }
    Ok(())
}

#[instrument(skip_all)]
pub fn index(
    args: IndexArgs,
    ctx: &AppContext,
) -> Result<()> {
    let config = load_config()?;
    let paint = Paint::new(ctx);
    let pb = spinner(ctx);
    for tags in &args.tags {
        let idx = TagIndex::index_path(&PathUtils::canonical(tags));
        if ctx.dry_run {
            println!("Would index {} into {}", tags.display(), idx.display());
            continue;
        }
        if args.force && idx.exists() {
            std::fs::remove_file(&idx).with_context(|| format!("remove {}", idx.display()))?;
        }
        let mut repo = Repository::new(tags, RepositoryKind::Regular, config.cache.capacity);
        let count = repo
            .load_with(&pb)
            .with_context(|| format!("index {}", tags.display()))?;
        pb.suspend(|| {
            println!(
                "{} {} ({count} symbols)",
                paint.good("Indexed"),
                repo.tags_file().display()
            )
        });
    }
    pb.finish_and_clear();
    Ok(())
}

pub fn find(
    args: FindArgs,
    ctx: &AppContext,
) -> Result<()> {
    let session = Session::open(&args.query.repo, ctx)?;
    let selector = session.selector(&args.query);
    let tags = if args.prefix {
        selector.find_by_name_part(&args.name)?
    } else {
        selector.find_by_name(&args.name)?
    };
    print_tags(&selector, &tags, args.query.format, ctx)?;
    session.finish()
}

pub fn files(
    args: FilesArgs,
    ctx: &AppContext,
) -> Result<()> {
    let session = Session::open(&args.query.repo, ctx)?;
    let selector = session.selector(&args.query);
    let tags = if args.exact {
        selector.find_files(Path::new(&args.path))?
    } else {
        selector.find_files_by_part(&args.path)?
    };
    print_tags(&selector, &tags, args.query.format, ctx)?;
    session.finish()
}

pub fn members(
    args: MembersArgs,
    ctx: &AppContext,
) -> Result<()> {
    let session = Session::open(&args.query.repo, ctx)?;
    let selector = session.selector(&args.query);
    let tags = selector.find_class_members(&args.class)?;
    print_tags(&selector, &tags, args.query.format, ctx)?;
    session.finish()
}

pub fn outline(
    mut args: OutlineArgs,
    ctx: &AppContext,
) -> Result<()> {
    if args.query.repo.file.is_none() {
        args.query.repo.file = Some(args.file.clone());
    }
    let session = Session::open(&args.query.repo, ctx)?;
    let selector = session.selector(&args.query);
    let tags = selector.find_by_file(&args.file)?;
    print_tags(&selector, &tags, args.query.format, ctx)?;
    session.finish()
}

/// Navigator that reports the position on stdout
struct PrintNavigator {
    paint: Paint,
}

impl Navigator for PrintNavigator {
    fn set_position(
        &mut self,
        file: &Path,
        line: usize,
    ) -> Result<()> {
        println!("{}:{line}", self.paint.name(&file.to_string_lossy()));
        Ok(())
    }
}

pub fn goto(
    args: GotoArgs,
    ctx: &AppContext,
) -> Result<()> {
    let session = Session::open(&args.repo, ctx)?;
    let ci = session.config.search.ignore_case;
    let selector = session.storage.selector_all(
        session.current.as_deref(),
        ci,
        SortOptions::from(&session.config.search),
        0,
    );
    let found = selector.find_by_name(&args.name)?;
    let Some(tag) = args
        .nth
        .checked_sub(1)
        .and_then(|i| found.get(i))
    else {
        bail!("No symbol named '{}' (match #{})", args.name, args.nth);
    };

    let mut nav = PrintNavigator {
        paint: Paint::new(ctx),
    };
    session.storage.navigate(tag, &mut nav)?;
    session.finish()
}

#[instrument(skip_all, fields(file = %args.file.display()))]
pub fn update(
    args: UpdateArgs,
    ctx: &AppContext,
) -> Result<()> {
    let config = load_config()?;
    let tags = match args.tags {
        Some(t) => t,
        None => discover_tags(&args.file, &config.ctags.tags_name).with_context(|| {
            format!("No {} file above {}", config.ctags.tags_name, args.file.display())
        })?,
    };

    let mut repo = Repository::new(&tags, RepositoryKind::Regular, config.cache.capacity);
    repo.load()?;
    let tx = repo.update_tags_by_file(&args.file, &CommandRunner, &config.ctags)?;

    let paint = Paint::new(ctx);
    if ctx.dry_run {
        let s = tx.summary();
        println!(
            "Would replace {} records of {} with {} new ones",
            s.removed, s.file, s.added
        );
        return Ok(());
    }
    let summary = tx.commit()?;
    if !ctx.quiet {
        println!(
            "{} {}: -{} +{}",
            paint.good("Updated"),
            summary.file,
            summary.removed,
            summary.added
        );
    }
    Ok(())
}

#[instrument(skip_all, fields(dir = %args.dir.display()))]
pub fn generate(
    args: GenerateArgs,
    ctx: &AppContext,
) -> Result<()> {
    let config = load_config()?;
    let dir = PathUtils::canonical(&args.dir);
    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }
    if ctx.dry_run {
        println!(
            "Would run {} over {} into {}",
            config.ctags.executable,
            dir.display(),
            dir.join(&config.ctags.tags_name).display()
        );
        return Ok(());
    }

    let pb = spinner(ctx);
    let tags = update::generate_directory(&dir, &CommandRunner, &config.ctags, &pb)?;
    let mut repo = Repository::new(&tags, RepositoryKind::Regular, config.cache.capacity);
    let count = repo.load_with(&pb)?;
    pb.finish_and_clear();

    if args.permanent {
        edit_permanent(&config, |list| {
            list.add(repo.tags_file().to_path_buf());
        })?;
    }
    if !ctx.quiet {
        println!(
            "{} {} ({count} symbols)",
            Paint::new(ctx).good("Generated"),
            tags.display()
        );
    }
    Ok(())
}

#[derive(Serialize, Tabled)]
struct RepoRow {
    tags: String,
    kind: String,
    symbols: String,
    cached: usize,
    since_reset: String,
}

#[derive(Serialize, Tabled)]
struct CacheRow {
    frequency: u64,
    hot: bool,
    name: String,
    location: String,
}

pub fn stat(
    args: StatArgs,
    ctx: &AppContext,
) -> Result<()> {
    let session = Session::open(&args.repo, ctx)?;
    let repos = session.storage.repositories();

    let repo_rows: Vec<RepoRow> = repos
        .iter()
        .map(|info| {
            let cached = session
                .storage
                .get(&info.tags_file)
                .map_or(0, |r| r.borrow().cache().len());
            RepoRow {
                tags: info.tags_file.display().to_string(),
                kind: info.kind.to_string(),
                symbols: info.symbols.map_or_else(|| "-".into(), |n| n.to_string()),
                cached,
                since_reset: format_elapsed(info.since_reset),
            }
        })
        .collect();

    let mut cache_rows: Vec<CacheRow> = Vec::new();
    let mut stale: Vec<String> = Vec::new();
    for info in &repos {
        let Some(handle) = session.storage.get(&info.tags_file) else {
            continue;
        };
        let mut repo = handle.borrow_mut();
        for entry in repo.cache_stat() {
            cache_rows.push(CacheRow {
                frequency: entry.frequency,
                hot: repo.cache().contains(&entry.tag),
                name: entry.tag.name.clone(),
                location: format!("{}:{}", entry.tag.file.display(), entry.tag.line),
            });
        }
        if args.stale {
            stale.extend(
                repo.stale_files()?
                    .into_iter()
                    .map(|p| p.display().to_string()),
            );
        }
        if args.reset && !ctx.dry_run {
            repo.reset_cache();
        }
    }

    match args.format {
        OutputFormat::Json => {
            let out = json!({
                "repositories": repo_rows,
                "cache": cache_rows,
                "stale": stale,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Table => {
            println!("{}", Table::new(&repo_rows));
            if !cache_rows.is_empty() {
                println!("{}", Table::new(&cache_rows));
            }
            for s in &stale {
                println!("stale: {s}");
            }
        }
        OutputFormat::Text => {
            let paint = Paint::new(ctx);
            for r in &repo_rows {
                println!(
                    "{} [{}] {} symbols, {} cached, reset {} ago",
                    paint.name(&r.tags),
                    r.kind,
                    r.symbols,
                    r.cached,
                    r.since_reset
                );
            }
            for c in &cache_rows {
                let mark = if c.hot { "*" } else { " " };
                println!("{mark} {:>5} {} {}", c.frequency, c.name, paint.dim(&c.location));
            }
            for s in &stale {
                println!("stale: {s}");
            }
        }
    }
    session.finish()
}

fn format_elapsed(d: chrono::TimeDelta) -> String {
    let secs = d.num_seconds().max(0);
    match secs {
        0..60 => format!("{secs}s"),
        60..3600 => format!("{}m", secs / 60),
        3600..86400 => format!("{}h", secs / 3600),
        _ => format!("{}d", secs / 86400),
    }
}

fn permanent_list_path(config: &Config) -> Result<PathBuf> {
    config.permanent_list_path().context(
        "No permanent list configured. Set `permanent_list` in tagdb.toml or TAGDB_PERMANENT_LIST.",
    )
}

fn edit_permanent(
    config: &Config,
    edit: impl FnOnce(&mut PathList),
) -> Result<()> {
    let path = permanent_list_path(config)?;
    let mut list = PathList::load(&path)?;
    edit(&mut list);
    list.save(&path)
}

pub fn permanent(
    args: PermanentArgs,
    ctx: &AppContext,
) -> Result<()> {
    let config = load_config()?;
    match args.action {
        PermanentAction::List => {
            let list = PathList::load(&permanent_list_path(&config)?)?;
            for p in list.iter() {
                println!("{}", p.display());
            }
        }
        PermanentAction::Add { tags } => {
            let mut added = Vec::new();
            for t in &tags {
                // Only valid tags files enter the list
                let mut repo = Repository::new(t, RepositoryKind::Permanent, 0);
                repo.load()
                    .with_context(|| format!("load {}", t.display()))?;
                added.push(repo.tags_file().to_path_buf());
            }
            if ctx.dry_run {
                for p in &added {
                    println!("Would add {}", p.display());
                }
                return Ok(());
            }
            edit_permanent(&config, |list| {
                for p in added {
                    list.add(p);
                }
            })?;
        }
        PermanentAction::Remove { tags } => {
            let targets: Vec<PathBuf> = tags.iter().map(|t| PathUtils::canonical(t)).collect();
            if ctx.dry_run {
                for p in &targets {
                    println!("Would remove {}", p.display());
                }
                return Ok(());
            }
            let mut missing = Vec::new();
            edit_permanent(&config, |list| {
                for p in targets {
                    if !list.remove(&p) {
                        missing.push(p);
                    }
                }
            })?;
            if !ctx.quiet {
                for p in missing {
                    eprintln!("Not in the permanent list: {}", p.display());
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovers_nearest_tags_upwards() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(tmp.path().join("tags"), "").unwrap();
        std::fs::write(nested.join("x.c"), "").unwrap();

        let found = discover_tags(&nested.join("x.c"), "tags").unwrap();
        assert_eq!(found, PathUtils::canonical(&tmp.path().join("tags")));
        assert!(discover_tags(&nested, "no-such-tags-name").is_none());
    }

    #[test]
    fn elapsed_is_compact() {
        assert_eq!(format_elapsed(chrono::TimeDelta::seconds(5)), "5s");
        assert_eq!(format_elapsed(chrono::TimeDelta::seconds(125)), "2m");
        assert_eq!(format_elapsed(chrono::TimeDelta::hours(30)), "1d");
    }
}
