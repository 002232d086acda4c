//! Bootstrap configuration and root folder resolution
//!
//! Two configuration tiers:
//! 1. **Bootstrap** (this module): root folder, database file name, logging.
//!    Read once at start-up from CLI arguments, environment and TOML.
//! 2. **Runtime**: tenant settings stored in the database
//!    (see `dts_he::db::config`).
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. `DTS_ROOT_FOLDER` environment variable
//! 3. TOML config file (`~/.config/dts/<module>.toml`, then `/etc/dts/<module>.toml`)
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or broken TOML file never aborts start-up: it is logged and the
//! compiled defaults are used instead.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "DTS_ROOT_FOLDER";

/// Database file name inside the root folder unless configured otherwise
pub const DEFAULT_DATABASE_FILE: &str = "dts.db";

/// Built-in defaults used when nothing else is configured
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub database_file: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            database_file: DEFAULT_DATABASE_FILE.to_string(),
        }
    }
}

/// Bootstrap configuration loaded from a TOML file
///
/// Every field is optional; absent fields fall back to [`CompiledDefaults`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Folder holding the database file
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Database file name (relative to the root folder) or absolute path
    #[serde(default)]
    pub database_file: Option<String>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Parse TOML text
    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load and parse a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Load the TOML file at `path`, or defaults when there is none
    ///
    /// Errors name the file so callers can report them once logging is up.
    pub fn load_optional(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let config = Self::load(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        debug!("Loaded config file {}", path.display());
        Ok(config)
    }

    /// Load the module's TOML file if one exists, otherwise defaults
    pub fn load_module(module_name: &str) -> Result<Self> {
        Self::load_optional(config_file_path(module_name).as_deref())
    }

    /// Like [`TomlConfig::load_module`], but a broken file is logged and
    /// replaced by defaults
    pub fn load_or_default(module_name: &str) -> Self {
        Self::load_module(module_name).unwrap_or_else(|e| {
            warn!("Ignoring broken config ({}), using defaults", e);
            Self::default()
        })
    }
}

/// Locate the module's TOML file (user config first, then system-wide)
///
/// Returns `None` when neither exists.
pub fn config_file_path(module_name: &str) -> Option<PathBuf> {
    let file_name = format!("{}.toml", module_name);

    let user_config = dirs::config_dir().map(|d| d.join("dts").join(&file_name));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(unix) {
        let system_config = PathBuf::from("/etc/dts").join(&file_name);
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// OS-dependent default root folder
fn default_root_folder() -> PathBuf {
    // ~/.local/share/dts, ~/Library/Application Support/dts, %LOCALAPPDATA%\dts
    dirs::data_local_dir()
        .map(|d| d.join("dts"))
        .unwrap_or_else(|| PathBuf::from("./dts_data"))
}

/// Resolves the root folder following the priority order above
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    toml: Option<TomlConfig>,
}

impl RootFolderResolver {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            cli_arg: None,
            toml: None,
        }
    }

    /// Command-line override (priority 1)
    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    /// Use an already loaded TOML config instead of searching for one
    pub fn with_toml(mut self, config: TomlConfig) -> Self {
        self.toml = Some(config);
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.is_empty() {
                return PathBuf::from(path);
            }
        }

        let toml_root = match &self.toml {
            Some(config) => config.root_folder.clone(),
            None => TomlConfig::load_or_default(&self.module_name).root_folder,
        };
        if let Some(path) = toml_root {
            return path;
        }

        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder and locates the database inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
    database_file: String,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self {
            root_folder,
            database_file: DEFAULT_DATABASE_FILE.to_string(),
        }
    }

    /// Override the database file name (absolute paths are used as-is)
    pub fn with_database_file(mut self, database_file: Option<String>) -> Self {
        if let Some(file) = database_file {
            self.database_file = file;
        }
        self
    }

    /// Create the root folder if missing (idempotent)
    pub fn ensure_directory_exists(&self) -> Result<()> {
        if self.root_folder.exists() && !self.root_folder.is_dir() {
            return Err(Error::Config(format!(
                "Root folder is not a directory: {}",
                self.root_folder.display()
            )));
        }
        std::fs::create_dir_all(&self.root_folder)?;
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(&self.database_file)
    }

    pub fn database_exists(&self) -> bool {
        self.database_path().exists()
    }
}
