//! Session state and configuration management
//!
//! Settings are layered: command-line flags win over `LOTLEDGER_*`
//! environment variables, which win over the init file.

use crate::cli::Cli;
use anyhow::{Context, Result};
use log::debug;
use lotledger_core::PolicyKind;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Prefix of the environment variables read as options
pub const ENV_PREFIX: &str = "LOTLEDGER_";

/// Global session state for the lotledger application
#[derive(Debug)]
pub struct Session {
    /// Configuration loaded from files and environment
    pub config: Config,

    /// Book file to process
    pub book_file: Option<PathBuf>,

    /// Lot policy to apply before scrubbing
    pub policy: Option<PolicyKind>,

    /// Whether verbose mode is enabled
    pub verbose_enabled: bool,

    /// Whether to use color output
    pub use_color: bool,
}

/// Configuration loaded from init files and environment variables
#[derive(Debug, Default)]
pub struct Config {
    /// Key-value configuration options, keyed by long option name
    pub options: HashMap<String, String>,

    /// Init file that was read, if any
    pub init_file: Option<PathBuf>,
}

impl Session {
    /// Create a new session from command-line arguments
    pub fn new(cli: &Cli) -> Result<Self> {
        let mut config = Config::default();
        if !cli.args_only {
            config.load_init_file(cli)?;
            config.load_environment();
        }

        let book_file = cli
            .file
            .clone()
            .or_else(|| config.options.get("file").cloned())
            .map(PathBuf::from);

        let policy = match cli.policy.as_ref().or_else(|| config.options.get("policy")) {
            Some(name) => Some(
                name.parse::<PolicyKind>()
                    .with_context(|| format!("Invalid lot policy: {}", name))?,
            ),
            None => None,
        };

        let use_color = !cli.no_color && !config.flag("no-color");
        let verbose_enabled = cli.verbose || config.flag("verbose");

        Ok(Session {
            config,
            book_file,
            policy,
            verbose_enabled,
            use_color,
        })
    }

    /// Book file, or an error naming how to give one
    pub fn require_book_file(&self) -> Result<&Path> {
        self.book_file
            .as_deref()
            .context("No book file specified (use --file or LOTLEDGER_FILE)")
    }

    /// Get configuration value by key
    pub fn get_config_value(&self, key: &str) -> Option<&String> {
        self.config.options.get(key)
    }
}

impl Config {
    /// True when a boolean option is set to anything but `false` or `0`
    pub fn flag(&self, key: &str) -> bool {
        self.options
            .get(key)
            .is_some_and(|v| v != "false" && v != "0")
    }

    /// Load every `LOTLEDGER_*` variable as an option
    fn load_environment(&mut self) {
        for (key, value) in env::vars() {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            if name == "INIT" {
                continue;
            }
            let option_name = name.to_lowercase().replace('_', "-");
            debug!("option {} from environment", option_name);
            self.options.insert(option_name, value);
        }
    }

    /// Find and read the init file
    fn load_init_file(&mut self, cli: &Cli) -> Result<()> {
        let explicit = cli
            .init_file
            .clone()
            .or_else(|| env::var(format!("{}INIT", ENV_PREFIX)).ok())
            .map(PathBuf::from);

        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Init file not found: {}", path.display());
                }
                Some(path)
            }
            None => default_init_files().into_iter().find(|p| p.exists()),
        };

        if let Some(path) = path {
            self.parse_init_file(&path)?;
            self.init_file = Some(path);
        }
        Ok(())
    }

    /// Parse an init file of `--option value` lines
    fn parse_init_file(&mut self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read init file: {}", path.display()))?;

        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            let Some(option) = line.strip_prefix("--") else {
                anyhow::bail!(
                    "Error parsing init file {} at line {}: expected --option",
                    path.display(),
                    line_num + 1
                );
            };
            let (name, value) = match option.split_once(char::is_whitespace) {
                Some((name, value)) => (name, value.trim().to_string()),
                None => (option, "true".to_string()),
            };
            self.options.insert(name.to_string(), value);
        }
        Ok(())
    }
}

/// Init file locations searched when none is given, most specific first
pub fn default_init_files() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Ok(xdg_config) = env::var("XDG_CONFIG_HOME") {
        candidates.push(PathBuf::from(xdg_config).join("lotledger").join("lotledgerrc"));
    }
    if let Some(config_dir) = dirs::config_dir() {
        candidates.push(config_dir.join("lotledger").join("lotledgerrc"));
    }
    if let Some(home_dir) = dirs::home_dir() {
        candidates.push(home_dir.join(".lotledgerrc"));
    }
    candidates
}
