//! Purpose: Resolve the on-disk layout and data source for a catalog.
//! Exports: `CatalogConfig`, `SourceSpec`, default path and env-var constants.
//! Role: Keep CLI and library path semantics aligned from one source.
//! Invariants: Default home remains `~/.tradinghours` unless `TRADINGHOURS_HOME` is set.
//! Invariants: Explicit overrides always win over environment values.
use std::path::{Path, PathBuf};

use crate::core::error::Error;
use crate::remote::{DataSource, DirectoryDataSource, HttpDataSource, LocalMirror};

pub const HOME_ENV: &str = "TRADINGHOURS_HOME";
pub const SOURCE_ENV: &str = "TRADINGHOURS_SOURCE";
pub const TOKEN_ENV: &str = "TRADINGHOURS_TOKEN";
pub const DEFAULT_SOURCE_URL: &str = "https://api.tradinghours.com/v3";

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SourceSpec {
    Http(String),
    Directory(PathBuf),
}

impl SourceSpec {
    /// `http://` and `https://` values are service URLs; anything else is a directory.
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            SourceSpec::Http(trimmed.to_string())
        } else {
            SourceSpec::Directory(PathBuf::from(trimmed))
        }
    }
}

#[derive(Clone, Debug)]
pub struct CatalogConfig {
    home: PathBuf,
    source: SourceSpec,
    token: Option<String>,
    cache: bool,
}

impl CatalogConfig {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            source: SourceSpec::Http(DEFAULT_SOURCE_URL.to_string()),
            token: None,
            cache: true,
        }
    }

    /// Reads `TRADINGHOURS_HOME`, `TRADINGHOURS_SOURCE`, and `TRADINGHOURS_TOKEN`.
    pub fn from_env() -> Self {
        let home = std::env::var_os(HOME_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(default_home);
        let mut config = Self::new(home);
        if let Ok(source) = std::env::var(SOURCE_ENV) {
            if !source.trim().is_empty() {
                config.source = SourceSpec::parse(&source);
            }
        }
        config.token = std::env::var(TOKEN_ENV)
            .ok()
            .filter(|token| !token.trim().is_empty());
        config
    }

    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = home.into();
        self
    }

    pub fn with_source(mut self, source: SourceSpec) -> Self {
        self.source = source;
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn source(&self) -> &SourceSpec {
        &self.source
    }

    pub fn cache(&self) -> bool {
        self.cache
    }

    pub fn store_dir(&self) -> PathBuf {
        self.home.join("store")
    }

    pub fn remote_dir(&self) -> PathBuf {
        self.home.join("remote")
    }

    pub fn mirror(&self) -> LocalMirror {
        LocalMirror::new(self.remote_dir())
    }

    pub fn csv_dir(&self) -> PathBuf {
        self.mirror().csv_folder()
    }

    pub fn data_source(&self) -> Result<Box<dyn DataSource>, Error> {
        Ok(match &self.source {
            SourceSpec::Http(url) => Box::new(
                HttpDataSource::new(url, self.mirror())?.with_token(self.token.clone()),
            ),
            SourceSpec::Directory(dir) => Box::new(DirectoryDataSource::new(dir, self.mirror())),
        })
    }
}

pub fn default_home() -> PathBuf {
    let home = std::env::var_os("HOME").unwrap_or_default();
    PathBuf::from(home).join(".tradinghours")
}
