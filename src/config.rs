use std::env;
use std::path::{Path, PathBuf};

pub const APP_NAME: &str = "Tempi";
pub const REGISTRY_FILE_NAME: &str = "registry.json";
pub const PENDING_FILE_NAME: &str = "pending.json";
pub const DEFAULT_DEADTIME: &str = "4h";
pub const FOLDER_PREFIX: &str = "tempi_";

/// Where tempi keeps its state and creates folders.
///
/// Built once in `main` and handed to every lifecycle operation.
#[derive(Debug, Clone)]
pub struct Config {
    pub registry_path: PathBuf,
    /// Paths whose deletion failed and must be retried.
    pub pending_path: PathBuf,
    pub base_dir: PathBuf,
    pub default_deadtime: String,
}

impl Config {
    /// Keeps the registry and the deferred-deletion queue together under `state_dir`.
    pub fn new(state_dir: &Path, base_dir: &Path) -> Self {
        Config {
            registry_path: state_dir.join(REGISTRY_FILE_NAME),
            pending_path: state_dir.join(PENDING_FILE_NAME),
            base_dir: base_dir.to_path_buf(),
            default_deadtime: DEFAULT_DEADTIME.to_string(),
        }
    }

    /// Defaults, overridden by `TEMPI_HOME`, `TEMPI_BASE_DIR` and `TEMPI_DEADTIME` when set.
    #[must_use]
    pub fn from_env() -> Self {
        let state_dir = non_empty_var("TEMPI_HOME").map_or_else(default_state_dir, PathBuf::from);
        let base_dir = non_empty_var("TEMPI_BASE_DIR").map_or_else(default_base_dir, PathBuf::from);
        let mut config = Config::new(&state_dir, &base_dir);
        if let Some(deadtime) = non_empty_var("TEMPI_DEADTIME") {
            config.default_deadtime = deadtime;
        }
        config
    }

    /// The deadtime asked for on the command line, else the configured default.
    #[must_use]
    pub fn resolve_deadtime<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested.unwrap_or(&self.default_deadtime)
    }

    #[must_use]
    pub fn with_base_dir(mut self, base_dir: Option<PathBuf>) -> Self {
        if let Some(dir) = base_dir {
            self.base_dir = dir;
        }
        self
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// `<local data dir>/Tempi`, e.g. `~/.local/share/Tempi` or `%LOCALAPPDATA%\Tempi`.
fn default_state_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local").join("share")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

fn default_base_dir() -> PathBuf {
    env::temp_dir().join("tempi")
}
