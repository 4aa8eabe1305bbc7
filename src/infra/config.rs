use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cli::{AppContext, InitArgs};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Newline-delimited list of permanent tags files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permanent_list: Option<PathBuf>,

    /// External tag generator settings
    pub ctags: CtagsConfig,

    /// Hot-tag cache settings
    pub cache: CacheConfig,

    /// Default query settings
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CtagsConfig {
    /// Program invoked to generate tags
    pub executable: String,

    /// Arguments passed before `-f <output>` and the inputs
    pub args: Vec<String>,

    /// File name used when tagging a whole directory
    pub tags_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Size of the hot set per repository
    pub capacity: usize,

    /// Save caches next to tags files between sessions
    pub persist: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub limit: usize,
    pub ignore_case: bool,
    pub cached_on_top: bool,
    pub cur_file_first: bool,
    pub sort_by_name: bool,
}

impl Default for CtagsConfig {
    fn default() -> Self {
        Self {
            executable: "ctags".to_string(),
            args: vec![
                "--fields=+n".to_string(),
                "--sort=yes".to_string(),
            ],
            tags_name: "tags".to_string(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 20,
            persist: true,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: 100,
            ignore_case: true,
            cached_on_top: true,
            cur_file_first: true,
            sort_by_name: false,
        }
    }
}

impl Config {
    /// Permanent list path with `~` and `$VAR` expanded
    pub fn permanent_list_path(&self) -> Option<PathBuf> {
        self.permanent_list
            .as_deref()
            .map(expand_path)
    }
}

/// Expand `~` and environment variables, leaving the path as is on failure
pub fn expand_path(p: &Path) -> PathBuf {
    let raw = p.to_string_lossy();
    match shellexpand::full(&raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => p.to_path_buf(),
    }
}

pub fn load_config() -> Result<Config> {
    let mut builder = config::Config::builder();

    // Load from config files in priority order
    let config_paths = ["tagdb.toml", ".tagdb.toml", "tagdb.yaml", "tagdb.json"];

    for path in &config_paths {
        if Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
            break;
        }
    }

    // Add environment variables with TAGDB_ prefix (TAGDB_CACHE__CAPACITY=50)
    builder = builder.add_source(
        config::Environment::with_prefix("TAGDB")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let cfg = builder
        .build()
        .context("Failed to load configuration")?;
    let parsed: Config = cfg
        .try_deserialize()
        .context("Failed to parse configuration")?;

    Ok(parsed)
}

pub fn init(
    args: InitArgs,
    ctx: &AppContext,
) -> Result<()> {
    let config_path = args.path.join("tagdb.toml");

    if config_path.exists() && !args.force {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let config = Config::default();
    let toml_string =
        toml::to_string_pretty(&config).context("Failed to serialize default config")?;

    std::fs::write(&config_path, toml_string).context("Failed to write config file")?;

    if !ctx.quiet {
        println!("Created config file at {}", config_path.display());
    }
    Ok(())
}
