//! DSN registry for unixODBC.
//!
//! Manages a per-user `odbc.ini` holding named data sources and the
//! companion `odbcinst.ini` that registers the driver they use. Entries are
//! appended as text stanzas and read back by parsing the file; existing
//! content is never rewritten.
pub mod ini;

use crate::config::{Settings, DEFAULT_DRIVER_NAME, DEFAULT_DRIVER_PATH};
use crate::core::{DbFrameError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Sections of `odbc.ini` that are not data sources.
const RESERVED_SECTIONS: [&str; 4] = ["Data Sources", "ODBC Data Sources", "Default", "ODBC"];

static DSN_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\[\]=\r\n]+$").expect("dsn name pattern is valid"));

/// Locations of the two ODBC configuration files.
#[derive(Debug, Clone, PartialEq)]
pub struct OdbcPaths {
    pub odbc_ini: PathBuf,
    pub odbcinst_ini: PathBuf,
}

impl OdbcPaths {
    /// `~/.odbc.ini` and `~/.odbcinst.ini`.
    #[cfg(unix)]
    pub fn user_default() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| DbFrameError::Config("home directory could not be determined".to_string()))?;
        Ok(OdbcPaths::in_dir(home))
    }

    #[cfg(not(unix))]
    pub fn user_default() -> Result<Self> {
        Err(DbFrameError::UnsupportedPlatform(
            "DSN files can only be managed on Unix-like systems; configure data sources with the system ODBC administrator".to_string(),
        ))
    }

    /// The per-user file layout under an arbitrary directory.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        OdbcPaths {
            odbc_ini: dir.join(".odbc.ini"),
            odbcinst_ini: dir.join(".odbcinst.ini"),
        }
    }
}

/// A registered data source.
#[derive(Debug, Clone, PartialEq)]
pub struct DsnEntry {
    pub name: String,
    pub server: String,
    pub database: String,
    pub driver: String,
}

/// Creates, extends and lists the user's ODBC data sources.
#[derive(Debug, Clone)]
pub struct DsnRegistry {
    paths: OdbcPaths,
    driver_name: String,
    driver_path: String,
}

impl DsnRegistry {
    /// Registry over `paths` using the FreeTDS driver.
    pub fn new(paths: OdbcPaths) -> Self {
        DsnRegistry {
            paths,
            driver_name: DEFAULT_DRIVER_NAME.to_string(),
            driver_path: DEFAULT_DRIVER_PATH.to_string(),
        }
    }

    /// Registry over the current user's home directory files.
    pub fn for_user() -> Result<Self> {
        Ok(DsnRegistry::new(OdbcPaths::user_default()?))
    }

    /// Registry configured from settings; unset paths fall back to the
    /// user's home directory.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let odbc = settings.odbc.as_ref();
        let configured = (
            odbc.and_then(|o| o.odbc_ini.clone()),
            odbc.and_then(|o| o.odbcinst_ini.clone()),
        );
        let paths = match configured {
            (Some(odbc_ini), Some(odbcinst_ini)) => OdbcPaths { odbc_ini, odbcinst_ini },
            (odbc_ini, odbcinst_ini) => {
                let defaults = OdbcPaths::user_default()?;
                OdbcPaths {
                    odbc_ini: odbc_ini.unwrap_or(defaults.odbc_ini),
                    odbcinst_ini: odbcinst_ini.unwrap_or(defaults.odbcinst_ini),
                }
            }
        };
        Ok(DsnRegistry::new(paths).with_driver(settings.driver_name(), settings.driver_path()))
    }

    pub fn with_driver(mut self, name: impl Into<String>, path: impl Into<String>) -> Self {
        self.driver_name = name.into();
        self.driver_path = path.into();
        self
    }

    pub fn paths(&self) -> &OdbcPaths {
        &self.paths
    }

    /// Ensures both configuration files exist. Existing files are left
    /// untouched apart from appending a missing driver stanza to
    /// `odbcinst.ini`.
    pub fn create_config(&self) -> Result<()> {
        if self.paths.odbc_ini.exists() {
            debug!("{:?} already exists", self.paths.odbc_ini);
        } else {
            let initial = format!(
                "[Data Sources]\n\n{}",
                ini::render_stanza("Default", &[("Driver", &self.driver_path)])
            );
            fs::write(&self.paths.odbc_ini, initial.trim_end().to_string() + "\n")?;
            info!("Created {:?}", self.paths.odbc_ini);
        }

        let driver_stanza = ini::render_stanza(
            &self.driver_name,
            &[
                ("Description", &format!("{} ODBC driver", self.driver_name)),
                ("Driver", &self.driver_path),
            ],
        );
        match read_optional(&self.paths.odbcinst_ini)? {
            None => {
                fs::write(&self.paths.odbcinst_ini, &driver_stanza)?;
                info!("Created {:?}", self.paths.odbcinst_ini);
            }
            Some(text) => {
                let registered = ini::parse(&text)
                    .iter()
                    .any(|s| s.name.eq_ignore_ascii_case(&self.driver_name));
                if !registered {
                    fs::write(&self.paths.odbcinst_ini, append_stanza(&text, &driver_stanza))?;
                    info!("Registered driver {} in {:?}", self.driver_name, self.paths.odbcinst_ini);
                }
            }
        }
        Ok(())
    }

    /// Adds a data source pointing at `database` on `server`.
    ///
    /// The stanza is placed before the `[Default]` section. A name that is
    /// already registered is rejected rather than overwritten.
    pub fn add_dsn(&self, name: &str, server: &str, database: &str) -> Result<DsnEntry> {
        let name = name.trim();
        if !DSN_NAME_RE.is_match(name) {
            return Err(DbFrameError::InvalidDsn(format!(
                "{:?} is not a valid data source name",
                name
            )));
        }
        if is_reserved(name) {
            return Err(DbFrameError::InvalidDsn(format!("{} is a reserved section name", name)));
        }
        for (field, value) in [("server", server), ("database", database)] {
            if value.contains(['\r', '\n']) {
                return Err(DbFrameError::InvalidDsn(format!("{} must be a single line", field)));
            }
        }

        let text = self.read_odbc_ini()?;
        let stanzas = ini::parse(&text);
        if stanzas.iter().any(|s| s.name.eq_ignore_ascii_case(name)) {
            return Err(DbFrameError::DsnExists(name.to_string()));
        }

        let stanza = ini::render_stanza(
            name,
            &[
                ("Driver", &self.driver_path),
                ("Description", "MS SQL Server"),
                ("Trace", "No"),
                ("Servername", server),
                ("Database", database),
            ],
        );
        let updated = match stanzas.iter().find(|s| s.name.eq_ignore_ascii_case("Default")) {
            Some(default) => format!("{}{}{}", &text[..default.offset], stanza, &text[default.offset..]),
            None => append_stanza(&text, &stanza),
        };
        fs::write(&self.paths.odbc_ini, updated)?;
        info!("Added DSN {} ({} / {})", name, server, database);

        Ok(DsnEntry {
            name: name.to_string(),
            server: server.to_string(),
            database: database.to_string(),
            driver: self.driver_path.clone(),
        })
    }

    /// Names of all registered data sources, in file order.
    pub fn list_dsns(&self) -> Result<Vec<String>> {
        Ok(self.entries()?.into_iter().map(|e| e.name).collect())
    }

    /// Distinct database names across all data sources, in first-seen order.
    pub fn list_databases(&self) -> Result<Vec<String>> {
        let mut databases: Vec<String> = Vec::new();
        for entry in self.entries()? {
            if !entry.database.is_empty() && !databases.contains(&entry.database) {
                databases.push(entry.database);
            }
        }
        Ok(databases)
    }

    /// Every data source stanza, parsed.
    pub fn entries(&self) -> Result<Vec<DsnEntry>> {
        let text = self.read_odbc_ini()?;
        Ok(ini::parse(&text)
            .into_iter()
            .filter(|s| !is_reserved(&s.name))
            .map(|s| DsnEntry {
                server: s.get("Servername").or_else(|| s.get("Server")).unwrap_or_default().to_string(),
                database: s.get("Database").unwrap_or_default().to_string(),
                driver: s.get("Driver").unwrap_or_default().to_string(),
                name: s.name,
            })
            .collect())
    }

    /// Looks up one data source by name.
    pub fn get(&self, name: &str) -> Result<Option<DsnEntry>> {
        Ok(self.entries()?.into_iter().find(|e| e.name.eq_ignore_ascii_case(name)))
    }

    fn read_odbc_ini(&self) -> Result<String> {
        read_optional(&self.paths.odbc_ini)?
            .ok_or_else(|| DbFrameError::ConfigMissing(self.paths.odbc_ini.clone()))
    }
}

fn is_reserved(name: &str) -> bool {
    RESERVED_SECTIONS.iter().any(|r| r.eq_ignore_ascii_case(name))
}

/// File contents, or `None` when the file does not exist.
fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Appends a stanza, separated from existing content by one blank line.
fn append_stanza(text: &str, stanza: &str) -> String {
    let body = text.trim_end();
    if body.is_empty() {
        stanza.to_string()
    } else {
        format!("{}\n\n{}", body, stanza)
    }
}
