//! Persisted scrapers, keyed by site domain.
//!
//! The registry is one pretty-printed JSON object mapping domain to routine
//! source. A missing or corrupt document reads as "no scrapers yet". Saving
//! rewrites the whole document, last writer wins.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use tracing::{info, instrument, warn};

/// Mapping from domain to routine source.
pub type ScraperMap = BTreeMap<String, String>;

#[derive(Debug, Clone)]
pub struct ScraperRegistry {
    path: PathBuf,
}

impl ScraperRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every saved scraper. Never fails.
    #[instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    pub fn load(&self) -> ScraperMap {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return ScraperMap::new(),
            Err(e) => {
                warn!(error = %e, "Could not read scraper registry; treating as empty");
                return ScraperMap::new();
            }
        };
        match serde_json::from_str::<ScraperMap>(&raw) {
            Ok(map) => map,
            Err(e) => {
                warn!(error = %e, "Scraper registry is not a JSON object of strings; treating as empty");
                ScraperMap::new()
            }
        }
    }

    /// Routine source saved for `domain`, if any.
    pub fn get(&self, domain: &str) -> Option<String> {
        self.load().remove(domain)
    }

    /// Store `routine_source` for `domain`, replacing any previous routine.
    #[instrument(level = "info", skip(self, routine_source), fields(path = %self.path.display()))]
    pub fn save(&self, domain: &str, routine_source: &str) -> io::Result<()> {
        let mut scrapers = self.load();
        scrapers.insert(domain.to_string(), routine_source.to_string());
        self.write(&scrapers)?;
        info!(count = scrapers.len(), "Saved scraper");
        Ok(())
    }

    /// Forget the routine for `domain`. Returns whether one existed.
    #[instrument(level = "info", skip(self), fields(path = %self.path.display()))]
    pub fn remove(&self, domain: &str) -> io::Result<bool> {
        let mut scrapers = self.load();
        let existed = scrapers.remove(domain).is_some();
        if existed {
            self.write(&scrapers)?;
        }
        Ok(existed)
    }

    fn write(&self, scrapers: &ScraperMap) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut buf = Vec::new();
        let mut ser = Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
        scrapers.serialize(&mut ser).map_err(io::Error::other)?;
        std::fs::write(&self.path, buf)
    }
}
