use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shared application context for global flags
#[derive(Clone, Debug)]
pub struct AppContext {
    pub quiet: bool,    // global --quiet
    pub no_color: bool, // global --no-color
    pub dry_run: bool,  // global --dry-run
}

#[derive(Parser)]
#[command(name = "tagdb")]
#[command(about = "Indexed symbol lookup over ctags files")]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Suppress progress spinners and non-essential output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Show what would be done without writing anything
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Log more (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build or validate the index of tags files
    Index(IndexArgs),

    /// Look up symbols by name or name prefix
    Find(FindArgs),

    /// List files known to the tags files
    Files(FilesArgs),

    /// List members of a class or struct
    Members(MembersArgs),

    /// Symbols defined in one file, in source order
    Outline(OutlineArgs),

    /// Resolve a symbol's current location and count the visit
    Goto(GotoArgs),

    /// Re-tag one changed file and merge it into its tags file
    Update(UpdateArgs),

    /// Run ctags over a directory to create its tags file
    Generate(GenerateArgs),

    /// Show loaded repositories and their tag caches
    Stat(StatArgs),

    /// Manage the list of always-loaded tags files
    Permanent(PermanentArgs),

    /// Initialize a tagdb.toml config file
    Init(InitArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Which repositories a command works against
#[derive(Args, Debug, Clone, Default)]
pub struct RepoArgs {
    /// Tags files to load (default: nearest tags file above the current file or directory)
    #[arg(short, long = "tags", value_name = "TAGS")]
    pub tags: Vec<PathBuf>,

    /// File the query is made from; drives repository selection and sorting
    #[arg(long, value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Skip permanent tags files
    #[arg(long)]
    pub no_permanent: bool,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Table,
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    #[command(flatten)]
    pub repo: RepoArgs,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Maximum results (0 = unlimited; default from config)
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Match case exactly
    #[arg(long, conflicts_with = "ignore_case")]
    pub exact_case: bool,

    /// Ignore case
    #[arg(short = 'i', long)]
    pub ignore_case: bool,

    /// Order results alphabetically
    #[arg(long)]
    pub sort_by_name: bool,
}

#[derive(Parser, Debug)]
pub struct IndexArgs {
    /// Tags files to index
    #[arg(required = true)]
    pub tags: Vec<PathBuf>,

    /// Rebuild even when the saved index is current
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
pub struct FindArgs {
    /// Symbol name (empty matches everything)
    #[arg(default_value = "")]
    pub name: String,

    /// Treat NAME as a prefix
    #[arg(short, long)]
    pub prefix: bool,

    #[command(flatten)]
    pub query: QueryArgs,
}

#[derive(Parser, Debug)]
pub struct FilesArgs {
    /// Path prefix, or a file path with --exact
    #[arg(default_value = "")]
    pub path: String,

    /// List every symbol of exactly this file
    #[arg(long)]
    pub exact: bool,

    #[command(flatten)]
    pub query: QueryArgs,
}

#[derive(Parser, Debug)]
pub struct MembersArgs {
    /// Class or struct name
    pub class: String,

    #[command(flatten)]
    pub query: QueryArgs,
}

#[derive(Parser, Debug)]
pub struct OutlineArgs {
    /// Source file to outline
    #[arg(id = "outline_file", value_name = "FILE")]
    pub file: PathBuf,

    #[command(flatten)]
    pub query: QueryArgs,
}

#[derive(Parser, Debug)]
pub struct GotoArgs {
    /// Symbol name
    pub name: String,

    /// Pick the N-th match (1-based)
    #[arg(short, long, default_value_t = 1)]
    pub nth: usize,

    #[command(flatten)]
    pub repo: RepoArgs,
}

#[derive(Parser, Debug)]
pub struct UpdateArgs {
    /// Changed source file
    pub file: PathBuf,

    /// Tags file to update (default: nearest tags file above FILE)
    #[arg(short, long)]
    pub tags: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// Directory to tag
    #[arg(default_value = ".")]
    pub dir: PathBuf,

    /// Also add the generated tags file to the permanent list
    #[arg(long)]
    pub permanent: bool,
}

#[derive(Parser, Debug)]
pub struct StatArgs {
    #[command(flatten)]
    pub repo: RepoArgs,

    /// Clear cache counters after printing
    #[arg(long)]
    pub reset: bool,

    /// List files changed since their tags were generated
    #[arg(long)]
    pub stale: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct PermanentArgs {
    #[command(subcommand)]
    pub action: PermanentAction,
}

#[derive(Subcommand, Debug)]
pub enum PermanentAction {
    /// Add tags files to the permanent list
    Add {
        #[arg(required = true)]
        tags: Vec<PathBuf>,
    },
    /// Remove tags files from the permanent list
    Remove {
        #[arg(required = true)]
        tags: Vec<PathBuf>,
    },
    /// Show the permanent list
    List,
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Directory to initialize config in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,

    /// Output directory; the script goes to stdout when omitted
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Print completion script to stdout instead of a file
    #[arg(long)]
    pub stdout: bool,
}
