use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;
use walkdir::WalkDir;

use crate::error::SlurpError;
use crate::history::RevisionRecord;
use crate::runtime::ResolvedPaths;

const PARTIAL_SUFFIX: &str = ".partial";

/// On-disk shape of one history entry: `[revision, username, display_name, timestamp]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StoredRevision(u64, String, String, String);

/// Durable per-page histories and per-revision page text.
#[derive(Debug, Clone)]
pub struct RevisionStore {
    history_dir: PathBuf,
    md_dir: PathBuf,
}

impl RevisionStore {
    pub fn new(history_dir: impl Into<PathBuf>, md_dir: impl Into<PathBuf>) -> Self {
        Self {
            history_dir: history_dir.into(),
            md_dir: md_dir.into(),
        }
    }

    pub fn from_paths(paths: &ResolvedPaths) -> Self {
        Self::new(&paths.history_dir, &paths.md_dir)
    }

    pub fn history_path(&self, page: &str) -> PathBuf {
        self.history_dir.join(format!("{}.json", page_file_stem(page)))
    }

    pub fn content_path(&self, page: &str, revision: u64) -> PathBuf {
        self.md_dir.join(format!("{}_{revision}.md", page_file_stem(page)))
    }

    /// Write every record of `page` as one JSON document, in the order given.
    pub fn store_history(&self, page: &str, records: &[RevisionRecord]) -> Result<PathBuf> {
        let rows = records
            .iter()
            .map(|record| {
                StoredRevision(
                    record.revision,
                    record.author_username.clone(),
                    record.author_display_name.clone(),
                    record.timestamp.clone(),
                )
            })
            .collect::<Vec<_>>();
        let rendered = serde_json::to_string(&rows).context("failed to serialize history")?;
        let path = self.history_path(page);
        write_artifact(&path, rendered.as_bytes())?;
        info!(page, records = records.len(), "stored history");
        Ok(path)
    }

    pub fn load_history(&self, page: &str) -> Result<Vec<RevisionRecord>> {
        let path = self.history_path(page);
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let rows: Vec<StoredRevision> = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(rows
            .into_iter()
            .map(|StoredRevision(revision, username, display_name, timestamp)| {
                RevisionRecord {
                    page_name: page.to_string(),
                    revision,
                    author_username: username,
                    author_display_name: display_name,
                    timestamp,
                }
            })
            .collect())
    }

    pub fn store_content(&self, page: &str, revision: u64, text: &str) -> Result<PathBuf> {
        let path = self.content_path(page, revision);
        write_artifact(&path, text.as_bytes())?;
        info!(page, revision, path = %path.display(), "stored content");
        Ok(path)
    }

    pub fn load_content(&self, page: &str, revision: u64) -> Result<String> {
        let path = self.content_path(page, revision);
        fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))
    }

    /// Pages with a stored history, sorted by name.
    pub fn list_pages(&self) -> Result<Vec<String>> {
        if !self.history_dir.exists() {
            return Ok(Vec::new());
        }
        let mut pages = Vec::new();
        for entry in WalkDir::new(&self.history_dir).min_depth(1).max_depth(1) {
            let entry = entry
                .with_context(|| format!("failed to read {}", self.history_dir.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                pages.push(page_from_file_stem(stem));
            }
        }
        pages.sort();
        Ok(pages)
    }
}

/// Write `bytes` to `path` so that either the complete artifact exists afterwards or nothing
/// does. Data goes to a sibling `.partial` file first, which is removed on any failure.
pub fn write_artifact(path: &Path, bytes: &[u8]) -> Result<()> {
    let partial = partial_path(path);
    let outcome = write_partial(&partial, bytes).and_then(|()| fs::rename(&partial, path));
    if let Err(source) = outcome {
        let _ = fs::remove_file(&partial);
        return Err(SlurpError::persistence(path, source).into());
    }
    Ok(())
}

fn write_partial(partial: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(partial)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|name| name.to_os_string()).unwrap_or_default();
    name.push(PARTIAL_SUFFIX);
    path.with_file_name(name)
}

/// Map a page name to a file stem that is safe on common filesystems and reversible with
/// [`page_from_file_stem`].
pub fn page_file_stem(page: &str) -> String {
    let mut output = String::with_capacity(page.len());
    for ch in page.chars() {
        if matches!(ch, '%' | '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
            || ch.is_control()
        {
            let mut buffer = [0u8; 4];
            for byte in ch.encode_utf8(&mut buffer).bytes() {
                output.push_str(&format!("%{byte:02X}"));
            }
        } else {
            output.push(ch);
        }
    }
    output
}

pub fn page_from_file_stem(stem: &str) -> String {
    let bytes = stem.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        let escaped = if bytes[index] == b'%' {
            bytes
                .get(index + 1..index + 3)
                .and_then(|hex| std::str::from_utf8(hex).ok())
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
        } else {
            None
        };
        match escaped {
            Some(byte) => {
                decoded.push(byte);
                index += 3;
            }
            None => {
                decoded.push(bytes[index]);
                index += 1;
            }
        }
    }
    String::from_utf8_lossy(&decoded).into_owned()
}
