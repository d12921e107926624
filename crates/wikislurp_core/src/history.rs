use anyhow::Result;
use chrono::NaiveDateTime;
use scraper::{ElementRef, Html, Node, Selector};

use crate::error::SlurpError;

const TITLE_TIME_FORMAT: &str = "%a %b %d, %Y %I:%M %p";
const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const UTC_SUFFIX: &str = " UTC";

/// One saved edit of a wiki page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionRecord {
    pub page_name: String,
    pub revision: u64,
    pub author_username: String,
    pub author_display_name: String,
    /// Naive UTC timestamp, `YYYY-MM-DDTHH:MM:SS`.
    pub timestamp: String,
}

impl RevisionRecord {
    pub fn author_identity(&self, author_domain: &str) -> String {
        format!(
            "{} <{}@{}>",
            self.author_display_name, self.author_username, author_domain
        )
    }

    pub fn commit_message(&self) -> String {
        format!("{} version {}", self.page_name, self.revision)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RevisionInfo {
    revision: u64,
    username: String,
    display_name: String,
}

/// Extract the revision list from a rendered history page.
///
/// Rows come back in document order, which the forge renders newest first. A listing that
/// yields no complete row is reported as [`SlurpError::Parse`]: the renderer's layout has
/// most likely changed.
pub fn parse_history(page: &str, html: &str) -> Result<Vec<RevisionRecord>> {
    let document = Html::parse_document(html);
    let form_selector = selector(r#"form[action="diff"]"#)?;
    let row_selector = selector("tr")?;
    let cell_selector = selector("td")?;

    let form = document
        .select(&form_selector)
        .next()
        .ok_or_else(|| SlurpError::parse(format!("history form not found for page {page}")))?;

    let mut records = Vec::new();
    for row in form.select(&row_selector) {
        let mut info = None;
        let mut timestamp = None;
        for cell in row.select(&cell_selector) {
            // A cell that reads as revision info is never also a timestamp cell.
            if let Some(parsed) = single_string(cell).and_then(|text| try_parse_revision_info(&text))
            {
                info.get_or_insert(parsed);
                continue;
            }
            if timestamp.is_none() {
                timestamp = try_parse_cell_timestamp(cell);
            }
        }
        if let (Some(info), Some(timestamp)) = (info, timestamp) {
            records.push(RevisionRecord {
                page_name: page.to_string(),
                revision: info.revision,
                author_username: info.username,
                author_display_name: info.display_name,
                timestamp,
            });
        }
    }

    if records.is_empty() {
        return Err(SlurpError::parse(format!(
            "no revisions found in history of page {page}"
        ))
        .into());
    }
    Ok(records)
}

/// `"<rev> by <First> <Last> ... (<username>)"`. The display name may be empty.
fn try_parse_revision_info(text: &str) -> Option<RevisionInfo> {
    let tokens = text.split_whitespace().collect::<Vec<_>>();
    if tokens.len() < 2 || tokens[1] != "by" {
        return None;
    }
    let revision = tokens[0].parse::<u64>().ok().filter(|rev| *rev > 0)?;
    let username = tokens[tokens.len() - 1]
        .trim_matches(|ch| ch == '(' || ch == ')')
        .to_string();
    if username.is_empty() {
        return None;
    }
    let display_name = tokens[2..tokens.len().min(4)].join(" ");
    Some(RevisionInfo {
        revision,
        username,
        display_name,
    })
}

fn try_parse_cell_timestamp(cell: ElementRef<'_>) -> Option<String> {
    let titled = Selector::parse("[title]").ok()?;
    cell.select(&titled)
        .filter_map(|element| element.value().attr("title"))
        .find_map(try_parse_timestamp)
}

/// Parse a tooltip such as `"Mon Jan 06, 2020 03:04 PM UTC"` into `2020-01-06T15:04:00`.
fn try_parse_timestamp(title: &str) -> Option<String> {
    let local = title.trim().strip_suffix(UTC_SUFFIX)?;
    let parsed = NaiveDateTime::parse_from_str(local.trim(), TITLE_TIME_FORMAT).ok()?;
    Some(parsed.format(ISO_FORMAT).to_string())
}

/// The only string inside `element`, descending through single-child chains. Elements with
/// mixed or multiple children have no single string.
fn single_string(element: ElementRef<'_>) -> Option<String> {
    let mut children = element.children();
    let child = children.next()?;
    if children.next().is_some() {
        return None;
    }
    match child.value() {
        Node::Text(text) => Some(str::to_owned(text)),
        Node::Element(_) => ElementRef::wrap(child).and_then(single_string),
        _ => None,
    }
}

fn selector(source: &str) -> Result<Selector> {
    Selector::parse(source)
        .map_err(|error| anyhow::anyhow!("invalid selector {source}: {error}"))
}
