use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use crate::forge::ForgeSource;
use crate::store::{page_file_stem, write_artifact};

/// Identity of one cached remote rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheKey {
    History { page: String },
    Diff { page: String, revision: u64 },
}

impl CacheKey {
    pub fn history(page: &str) -> Self {
        Self::History {
            page: page.to_string(),
        }
    }

    pub fn diff(page: &str, revision: u64) -> Self {
        Self::Diff {
            page: page.to_string(),
            revision,
        }
    }

    pub fn file_name(&self) -> String {
        match self {
            Self::History { page } => format!("{}_history.html", page_file_stem(page)),
            Self::Diff { page, revision } => {
                format!("{}_diff_{revision}.html", page_file_stem(page))
            }
        }
    }
}

/// Write-once memoization of remote fetches. An entry's presence is the only signal that
/// it is valid; entries are never refreshed.
#[derive(Debug, Clone)]
pub struct PageCache {
    dir: PathBuf,
}

impl PageCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.path_for(key).is_file()
    }

    /// Return the cached body for `key`, fetching `url` through `source` only on a miss.
    pub fn fetch<S: ForgeSource>(&self, source: &mut S, url: &str, key: &CacheKey) -> Result<String> {
        let path = self.path_for(key);
        if !path.is_file() {
            let body = source.get_text(url)?;
            write_artifact(&path, body.as_bytes())?;
            info!(url, path = %path.display(), "cached");
            return Ok(body);
        }
        fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))
    }
}
