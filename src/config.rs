use crate::core::db::DEFAULT_CHAR_LIMIT;
use crate::core::Result;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Driver stanza name written to `odbcinst.ini` by default.
pub const DEFAULT_DRIVER_NAME: &str = "FreeTDS";
/// Shared library path of the FreeTDS ODBC driver.
pub const DEFAULT_DRIVER_PATH: &str = "/usr/local/lib/libtdsodbc.so";

/// Top-level settings parsed from a TOML file. Every section is optional.
#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    pub odbc: Option<OdbcSettings>,
    pub write: Option<WriteSettings>,
    pub sqlite: Option<SqliteSettings>,
}

/// Where the ODBC files live and which driver new DSNs use.
#[derive(Debug, Default, Deserialize)]
pub struct OdbcSettings {
    pub odbc_ini: Option<PathBuf>,
    pub odbcinst_ini: Option<PathBuf>,
    pub driver_name: Option<String>,
    pub driver_path: Option<String>,
}

/// Defaults for table writes.
#[derive(Debug, Default, Deserialize)]
pub struct WriteSettings {
    pub char_limit: Option<usize>,
}

/// SQLite connection tuning.
#[derive(Debug, Default, Deserialize)]
pub struct SqliteSettings {
    pub busy_timeout_ms: Option<u64>,
}

impl Settings {
    /// Loads settings from a TOML file at the given path.
    ///
    /// # Example
    ///
    /// ```no_run
    /// let settings = dbframe::config::Settings::load("config.toml").expect("Failed to load settings");
    /// println!("{:?}", settings);
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Settings> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Loads `<config dir>/dbframe/config.toml`, or defaults when absent.
    pub fn load_default() -> Result<Settings> {
        match default_path() {
            Some(path) if path.exists() => {
                debug!("Loading settings from {:?}", path);
                Settings::load(path)
            }
            _ => Ok(Settings::default()),
        }
    }

    pub fn driver_name(&self) -> &str {
        self.odbc
            .as_ref()
            .and_then(|o| o.driver_name.as_deref())
            .unwrap_or(DEFAULT_DRIVER_NAME)
    }

    pub fn driver_path(&self) -> &str {
        self.odbc
            .as_ref()
            .and_then(|o| o.driver_path.as_deref())
            .unwrap_or(DEFAULT_DRIVER_PATH)
    }

    pub fn char_limit(&self) -> usize {
        self.write
            .as_ref()
            .and_then(|w| w.char_limit)
            .unwrap_or(DEFAULT_CHAR_LIMIT)
    }

    pub fn busy_timeout(&self) -> Option<Duration> {
        self.sqlite
            .as_ref()
            .and_then(|s| s.busy_timeout_ms)
            .map(Duration::from_millis)
    }
}

/// Location of the settings file, if the platform has a config directory.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("dbframe").join("config.toml"))
}
