use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::{flog_debug, Error, Result};

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:1099";
pub const DEFAULT_SPACE_ADDR: &str = "127.0.0.1:1099";

/// Process configuration, read once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Size worker pools to the number of available cores instead of one thread.
    #[serde(default)]
    pub exploit_multicore: bool,
    /// Execute trivial Join tasks on the coordinator and let workers prefetch.
    #[serde(default)]
    pub absorb_joins: bool,
    /// Address the coordinator binds to.
    pub listen_addr: Option<String>,
    /// Address workers and clients connect to.
    pub space_addr: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            exploit_multicore: false,
            absorb_joins: false,
            listen_addr: None,
            space_addr: None,
        }
    }
}

/// The two tuning flags the core consumes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Settings {
    pub exploit_multicore: bool,
    pub absorb_joins: bool,
}

impl Settings {
    /// Worker pool size implied by `exploit_multicore`.
    pub fn parallelism(&self) -> usize {
        if self.exploit_multicore {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            1
        }
    }
}

impl Config {
    pub fn forkspace_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".forkspace"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::forkspace_dir()?.join("forkspace.toml"))
    }

    pub fn settings(&self) -> Settings {
        Settings {
            exploit_multicore: self.exploit_multicore,
            absorb_joins: self.absorb_joins,
        }
    }

    pub fn effective_listen_addr(&self) -> &str {
        self.listen_addr.as_deref().unwrap_or(DEFAULT_LISTEN_ADDR)
    }

    pub fn effective_space_addr(&self) -> &str {
        self.space_addr.as_deref().unwrap_or(DEFAULT_SPACE_ADDR)
    }

    /// Load from the default location, falling back to defaults when absent.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        flog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            flog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        flog_debug!(
            "Config loaded: exploit_multicore={}, absorb_joins={}, listen_addr={:?}, space_addr={:?}",
            config.exploit_multicore,
            config.absorb_joins,
            config.listen_addr,
            config.space_addr
        );
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                flog_debug!("Creating config directory: {}", dir.display());
                fs::create_dir_all(dir)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        flog_debug!("Config saved to {}", path.display());
        Ok(())
    }
}
