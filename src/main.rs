use anyhow::Result;
use clap::Parser;
use tagdb::cli::{AppContext, Cli, Commands};
use tagdb::cli_ext::tags_cmd;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "tagdb=debug",
        _ => "tagdb=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // Logs go to stderr so query output stays pipeable
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Build a context once, pass everywhere
    let ctx = AppContext {
        quiet: cli.quiet,
        no_color: cli.no_color,
        dry_run: cli.dry_run,
    };

    match cli.command {
        Commands::Index(args) => tags_cmd::index(args, &ctx),
        Commands::Find(args) => tags_cmd::find(args, &ctx),
        Commands::Files(args) => tags_cmd::files(args, &ctx),
        Commands::Members(args) => tags_cmd::members(args, &ctx),
        Commands::Outline(args) => tags_cmd::outline(args, &ctx),
        Commands::Goto(args) => tags_cmd::goto(args, &ctx),
        Commands::Update(args) => tags_cmd::update(args, &ctx),
        Commands::Generate(args) => tags_cmd::generate(args, &ctx),
        Commands::Stat(args) => tags_cmd::stat(args, &ctx),
        Commands::Permanent(args) => tags_cmd::permanent(args, &ctx),
        Commands::Init(args) => tagdb::infra::config::init(args, &ctx),
        Commands::Completions(args) => tagdb::completion::run(args, &ctx),
    }
}
