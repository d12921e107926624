use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cache::{CacheKey, PageCache};
use crate::content::extract_revision_content;
use crate::forge::{ForgeEndpoints, ForgeSource, page_list};
use crate::history::{RevisionRecord, parse_history};
use crate::store::RevisionStore;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlurpReport {
    pub pages: usize,
    pub revisions: usize,
    /// Pages whose history listing was full and may be missing older revisions.
    pub histories_at_limit: Vec<String>,
}

/// Fetch-and-extract half of the pipeline: remote renderings in, stored histories and
/// page text out.
pub struct Slurper<S: ForgeSource> {
    source: S,
    endpoints: ForgeEndpoints,
    cache: PageCache,
    store: RevisionStore,
}

impl<S: ForgeSource> Slurper<S> {
    pub fn new(source: S, endpoints: ForgeEndpoints, cache: PageCache, store: RevisionStore) -> Self {
        Self {
            source,
            endpoints,
            cache,
            store,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn store(&self) -> &RevisionStore {
        &self.store
    }

    pub fn page_list(&mut self) -> Result<Vec<String>> {
        page_list(&mut self.source, &self.endpoints)
    }

    /// Cached fetch, extraction and storage of one page's history, newest revision first.
    pub fn page_history(&mut self, page: &str) -> Result<Vec<RevisionRecord>> {
        let url = self.endpoints.history_url(page);
        let html = self
            .cache
            .fetch(&mut self.source, &url, &CacheKey::history(page))?;
        let records = parse_history(page, &html)?;
        if records.len() >= self.endpoints.history_limit {
            warn!(
                page,
                records = records.len(),
                limit = self.endpoints.history_limit,
                "history listing is full; older revisions may be missing"
            );
        }
        self.store.store_history(page, &records)?;
        Ok(records)
    }

    /// Cached fetch, extraction and storage of one revision's text.
    pub fn page_version(&mut self, page: &str, revision: u64) -> Result<String> {
        let url = self.endpoints.diff_url(page, revision);
        let html = self
            .cache
            .fetch(&mut self.source, &url, &CacheKey::diff(page, revision))?;
        let content = extract_revision_content(&html)
            .with_context(|| format!("failed to extract {page} revision {revision}"))?;
        self.store.store_content(page, revision, &content)?;
        Ok(content)
    }

    /// History and every revision's text for every page the forge lists.
    pub fn all_page_versions(&mut self) -> Result<(Vec<String>, SlurpReport)> {
        let pages = self.page_list()?;
        info!(pages = pages.len(), "listed wiki pages");

        let mut report = SlurpReport::default();
        for page in &pages {
            let history = self
                .page_history(page)
                .with_context(|| format!("failed to read history of page {page}"))?;
            if history.len() >= self.endpoints.history_limit {
                report.histories_at_limit.push(page.clone());
            }
            for record in &history {
                self.page_version(page, record.revision)?;
                report.revisions += 1;
            }
            report.pages += 1;
        }
        Ok((pages, report))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::Path;

    use serde_json::{Value, json};
    use tempfile::tempdir;

    use super::Slurper;
    use crate::cache::PageCache;
    use crate::error::SlurpError;
    use crate::forge::{ForgeEndpoints, ForgeSource};
    use crate::store::RevisionStore;

    const HISTORY_FIXTURE: &str = include_str!("../tests/fixtures/history_home.html");

    #[derive(Default)]
    struct MockSource {
        bodies: BTreeMap<String, String>,
        pages: Vec<String>,
        requests: Vec<String>,
    }

    impl ForgeSource for MockSource {
        fn get_text(&mut self, url: &str) -> anyhow::Result<String> {
            self.requests.push(url.to_string());
            self.bodies.get(url).cloned().ok_or_else(|| {
                SlurpError::Fetch {
                    url: url.to_string(),
                    message: "HTTP 404 Not Found".to_string(),
                }
                .into()
            })
        }

        fn get_json(&mut self, url: &str) -> anyhow::Result<Value> {
            self.requests.push(url.to_string());
            Ok(json!({ "pages": self.pages }))
        }

        fn request_count(&self) -> usize {
            self.requests.len()
        }
    }

    fn endpoints(history_limit: usize) -> ForgeEndpoints {
        ForgeEndpoints {
            web_base: "https://sourceforge.net/p/demo/wiki/".to_string(),
            api_base: "https://sourceforge.net/rest/p/demo/wiki/".to_string(),
            history_limit,
        }
    }

    fn diff_body(text: &str) -> String {
        format!(
            "<html><body><div style=\"font-family: fixed-width, monospace; padding: 10px;\"><span> {text} </span></div></body></html>"
        )
    }

    fn slurper(root: &Path, source: MockSource, history_limit: usize) -> Slurper<MockSource> {
        for dir in ["html", "md", "history"] {
            fs::create_dir_all(root.join(dir)).expect("create dir");
        }
        Slurper::new(
            source,
            endpoints(history_limit),
            PageCache::new(root.join("html")),
            RevisionStore::new(root.join("history"), root.join("md")),
        )
    }

    fn home_source() -> MockSource {
        let endpoints = endpoints(250);
        let mut source = MockSource {
            pages: vec!["Home".to_string()],
            ..MockSource::default()
        };
        source
            .bodies
            .insert(endpoints.history_url("Home"), HISTORY_FIXTURE.to_string());
        for (revision, text) in [(1, "first"), (2, "second"), (3, "third")] {
            source
                .bodies
                .insert(endpoints.diff_url("Home", revision), diff_body(text));
        }
        source
    }

    #[test]
    fn all_page_versions_stores_history_and_every_revision() {
        let temp = tempdir().expect("tempdir");
        let mut slurper = slurper(temp.path(), home_source(), 250);

        let (pages, report) = slurper.all_page_versions().expect("slurp");
        assert_eq!(pages, vec!["Home".to_string()]);
        assert_eq!(report.pages, 1);
        assert_eq!(report.revisions, 3);
        assert!(report.histories_at_limit.is_empty());

        let stored = slurper.store().load_history("Home").expect("history");
        assert_eq!(
            stored.iter().map(|record| record.revision).collect::<Vec<_>>(),
            vec![3, 2, 1]
        );
        assert_eq!(
            slurper.store().load_content("Home", 2).expect("content"),
            "second"
        );
        // page list + history + three diffs
        assert_eq!(slurper.source().request_count(), 5);
    }

    #[test]
    fn second_run_only_refetches_the_page_list() {
        let temp = tempdir().expect("tempdir");
        slurper(temp.path(), home_source(), 250)
            .all_page_versions()
            .expect("first run");

        let offline = MockSource {
            pages: vec!["Home".to_string()],
            ..MockSource::default()
        };
        let mut rerun = slurper(temp.path(), offline, 250);
        let (_, report) = rerun.all_page_versions().expect("cached run");
        assert_eq!(report.revisions, 3);
        assert_eq!(rerun.source().request_count(), 1);
    }

    #[test]
    fn full_history_listing_is_flagged() {
        let temp = tempdir().expect("tempdir");
        let mut slurper = slurper(temp.path(), home_source(), 3);
        let (_, report) = slurper.all_page_versions().expect("slurp");
        assert_eq!(report.histories_at_limit, vec!["Home".to_string()]);
    }

    #[test]
    fn unparseable_revision_aborts_without_storing_it() {
        let temp = tempdir().expect("tempdir");
        let mut source = home_source();
        source.bodies.insert(
            endpoints(250).diff_url("Home", 2),
            "<html><body><p>maintenance</p></body></html>".to_string(),
        );
        let mut slurper = slurper(temp.path(), source, 250);

        let error = slurper.all_page_versions().expect_err("must fail");
        assert!(matches!(
            error.downcast_ref::<SlurpError>(),
            Some(SlurpError::Parse(_))
        ));
        assert!(slurper.store().content_path("Home", 3).exists());
        assert!(!slurper.store().content_path("Home", 2).exists());
    }

    #[test]
    fn fetch_failure_is_fatal() {
        let temp = tempdir().expect("tempdir");
        let source = MockSource {
            pages: vec!["Missing".to_string()],
            ..MockSource::default()
        };
        let mut slurper = slurper(temp.path(), source, 250);
        let error = slurper.all_page_versions().expect_err("must fail");
        assert!(matches!(
            error.downcast_ref::<SlurpError>(),
            Some(SlurpError::Fetch { .. })
        ));
        assert!(!slurper.store().history_path("Missing").exists());
    }
}
