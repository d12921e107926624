use std::fs;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::error::SlurpError;
use crate::store::{RevisionStore, page_file_stem};
use crate::vcs::{CommitRequest, VcsEngine};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub pages: usize,
    pub commits: usize,
    /// Revisions that left the working tree unchanged.
    pub skipped: usize,
}

/// Repository file that holds the current text of `page`.
pub fn page_file_name(page: &str) -> String {
    format!("{}.md", page_file_stem(page))
}

/// Replay the stored history of every page in `pages`, oldest revision first, as one commit
/// per revision that changes the page's file.
///
/// Pages are replayed in the order given; commit order is only chronological within a page.
/// Any engine failure aborts the whole replay.
pub fn replay_pages<E: VcsEngine>(
    engine: &mut E,
    store: &RevisionStore,
    pages: &[String],
    author_domain: &str,
) -> Result<ReplayReport> {
    if !engine.is_initialized() {
        engine.init()?;
    }

    let mut report = ReplayReport::default();
    for page in pages {
        replay_page(engine, store, page, author_domain, &mut report)
            .with_context(|| format!("failed to replay page {page}"))?;
        report.pages += 1;
    }
    Ok(report)
}

fn replay_page<E: VcsEngine>(
    engine: &mut E,
    store: &RevisionStore,
    page: &str,
    author_domain: &str,
    report: &mut ReplayReport,
) -> Result<()> {
    let mut history = store.load_history(page)?;
    history.reverse();

    let file_name = page_file_name(page);
    let target = engine.work_tree().join(&file_name);
    for record in &history {
        let content = store.load_content(page, record.revision)?;
        fs::write(&target, content).map_err(|source| SlurpError::persistence(&target, source))?;

        if engine.working_tree_status(&file_name)?.is_empty() {
            debug!(page, revision = record.revision, "no changes, skipping");
            report.skipped += 1;
            continue;
        }

        engine.add(&file_name)?;
        engine.commit(&CommitRequest {
            author: record.author_identity(author_domain),
            date: record.timestamp.clone(),
            message: record.commit_message(),
        })?;
        report.commits += 1;
    }
    info!(page, revisions = history.len(), "replayed");
    Ok(())
}
