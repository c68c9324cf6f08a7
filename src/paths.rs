//! Data and store directory resolution.
//!
//! Both directories follow an environment-first policy:
//!
//! | Directory | 1st | 2nd | otherwise |
//! |-----------|-----|-----|-----------|
//! | data  | `LLAMA_RAG_DATA_DIR` | `./data` (only if it exists) | [`ConfigError`] |
//! | store | `LLAMA_RAG_DB_DIR`   | `$XDG_DATA_HOME/rag-server` or `~/.local/share/rag-server` | [`ConfigError`] |
//!
//! The process environment is captured once into an [`EnvSnapshot`]; the
//! resolvers are pure functions of that snapshot and the working directory.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::ConfigError;

pub const DATA_DIR_VAR: &str = "LLAMA_RAG_DATA_DIR";
pub const DB_DIR_VAR: &str = "LLAMA_RAG_DB_DIR";
pub const XDG_DATA_HOME_VAR: &str = "XDG_DATA_HOME";
pub const PARSER_API_KEY_VAR: &str = "LLAMA_CLOUD_API_KEY";

/// Directory name under the per-user data location.
pub const APP_DIR_NAME: &str = "rag-server";

/// Environment variables relevant to this server, read once at startup.
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    pub data_dir: Option<String>,
    pub db_dir: Option<String>,
    pub xdg_data_home: Option<String>,
    pub home: Option<PathBuf>,
    pub parser_api_key: Option<String>,
    pub cwd: PathBuf,
}

impl EnvSnapshot {
    pub fn capture() -> Self {
        Self {
            data_dir: non_empty_var(DATA_DIR_VAR),
            db_dir: non_empty_var(DB_DIR_VAR),
            xdg_data_home: non_empty_var(XDG_DATA_HOME_VAR),
            home: std::env::var_os("HOME")
                .filter(|h| !h.is_empty())
                .map(PathBuf::from),
            parser_api_key: non_empty_var(PARSER_API_KEY_VAR),
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Where a resolved directory came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DirSource {
    Environment,
    Workspace,
    Standard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDir {
    pub path: PathBuf,
    pub source: DirSource,
}

/// Resolve the directory documents are ingested from.
pub fn resolve_data_dir(env: &EnvSnapshot) -> Result<ResolvedDir, ConfigError> {
    if let Some(dir) = &env.data_dir {
        return Ok(ResolvedDir {
            path: absolutize(&expand_tilde(Path::new(dir), env.home.as_deref()), &env.cwd),
            source: DirSource::Environment,
        });
    }

    let workspace = env.cwd.join("data");
    if workspace.is_dir() {
        return Ok(ResolvedDir {
            path: workspace,
            source: DirSource::Workspace,
        });
    }

    Err(ConfigError {
        variable: DATA_DIR_VAR,
        message: format!(
            "No data directory is configured for this RAG system. \
             The system cannot access any documents without a data directory.\n\n\
             To set up a data directory, you can:\n\
             1. Set the {var} environment variable:\n   \
                export {var}=/path/to/your/documents\n\
             2. Create a 'data' directory in the current working directory:\n   \
                mkdir data\n\n\
             After setting up the data directory, add your documents to it and restart the server \
             or use the reingest_data_directory tool to load them.",
            var = DATA_DIR_VAR
        ),
    })
}

/// Resolve the directory owned by the vector engine.
pub fn resolve_store_dir(env: &EnvSnapshot) -> Result<ResolvedDir, ConfigError> {
    if let Some(dir) = &env.db_dir {
        return Ok(ResolvedDir {
            path: absolutize(&expand_tilde(Path::new(dir), env.home.as_deref()), &env.cwd),
            source: DirSource::Environment,
        });
    }

    let data_home = match (&env.xdg_data_home, &env.home) {
        (Some(xdg), _) => Some(absolutize(
            &expand_tilde(Path::new(xdg), env.home.as_deref()),
            &env.cwd,
        )),
        (None, Some(home)) => Some(home.join(".local").join("share")),
        (None, None) => None,
    };

    match data_home {
        Some(base) => Ok(ResolvedDir {
            path: base.join(APP_DIR_NAME),
            source: DirSource::Standard,
        }),
        None => Err(ConfigError {
            variable: DB_DIR_VAR,
            message: format!(
                "No database directory found. Please either:\n\
                 1. Set the {var} environment variable to specify a database directory, or\n\
                 2. Ensure the XDG Base Directory standard location is accessible\n\n\
                 Examples:\n  \
                 export {var}=/path/to/your/database\n  \
                 # Or ensure ~/.local/share is accessible for XDG standard",
                var = DB_DIR_VAR
            ),
        }),
    }
}

/// Expand `~` at the start of a path to the user's home directory.
pub fn expand_tilde(path: &Path, home: Option<&Path>) -> PathBuf {
    let s = path.to_string_lossy();
    if s.starts_with("~/") || s == "~" {
        if let Some(home) = home {
            return home.join(s.strip_prefix("~/").unwrap_or(""));
        }
    }
    path.to_path_buf()
}

fn absolutize(path: &Path, cwd: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    };
    // Normalize without touching the filesystem; the directory may not exist yet.
    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
