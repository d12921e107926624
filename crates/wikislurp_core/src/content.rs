use anyhow::Result;
use scraper::{Html, Selector};

use crate::error::SlurpError;

/// Inline style of the diff view's content area. It has no id or class, so the exact style
/// string is the only thing that identifies it.
pub const CONTENT_STYLE: &str = "font-family: fixed-width, monospace; padding: 10px;";

/// Recover the text of a revision from a diff rendered against itself.
pub fn extract_revision_content(html: &str) -> Result<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("div[style]")
        .map_err(|error| anyhow::anyhow!("invalid content selector: {error}"))?;

    let container = document
        .select(&selector)
        .find(|div| div.value().attr("style") == Some(CONTENT_STYLE))
        .ok_or_else(|| SlurpError::parse("page content not found"))?;

    Ok(container.text().map(normalize_fragment).collect())
}

/// Undo the renderer's padding on one text fragment: a single leading space (or the space
/// right after a leading newline) and a single trailing space.
pub fn normalize_fragment(fragment: &str) -> String {
    let mut line = if let Some(rest) = fragment.strip_prefix(' ') {
        rest.to_string()
    } else if let Some(rest) = fragment.strip_prefix("\n ") {
        format!("\n{rest}")
    } else {
        fragment.to_string()
    };
    if line.ends_with(' ') {
        line.pop();
    }
    line
}

#[cfg(test)]
mod tests {
    use super::{CONTENT_STYLE, extract_revision_content, normalize_fragment};
    use crate::error::SlurpError;

    const DIFF_FIXTURE: &str = include_str!("../tests/fixtures/diff_home_2.html");

    /// Render `text` the way the forge's diff view pads it: one fragment per line, each
    /// line after the first introduced by its newline.
    fn pad(text: &str) -> String {
        let mut body = String::new();
        for (index, line) in text.split('\n').enumerate() {
            let escaped = line
                .replace('&', "&amp;")
                .replace('<', "&lt;")
                .replace('>', "&gt;");
            if index == 0 {
                body.push_str(&format!("<span> {escaped} </span>"));
            } else {
                body.push_str(&format!("<span>\n {escaped} </span>"));
            }
        }
        format!(
            "<html><body><div style=\"{CONTENT_STYLE}\">{body}</div></body></html>"
        )
    }

    #[test]
    fn extracts_fixture_content_with_entities_decoded() {
        let content = extract_revision_content(DIFF_FIXTURE).expect("extract");
        assert_eq!(
            content,
            "Welcome to the <demo> wiki\n\n* Install & configure\n* Run `make`\n"
        );
    }

    #[test]
    fn padded_text_round_trips() {
        for text in [
            "Hello\n",
            "Hello world\n",
            "no trailing newline",
            "  indented code\n    deeper\n",
            "trailing spaces  \nkept  \n",
            "\n\nleading blank lines",
            "",
        ] {
            let content = extract_revision_content(&pad(text)).expect("extract");
            assert_eq!(content, text, "round trip of {text:?}");
        }
    }

    #[test]
    fn missing_container_is_a_parse_error() {
        let html = r#"<html><body><div style="font-family: monospace; padding: 10px;"> text </div></body></html>"#;
        let error = extract_revision_content(html).expect_err("must fail");
        assert!(matches!(
            error.downcast_ref::<SlurpError>(),
            Some(SlurpError::Parse(_))
        ));
        assert!(error.to_string().contains("page content not found"));
    }

    #[test]
    fn first_matching_container_wins() {
        let html = format!(
            "<html><body><div style=\"{CONTENT_STYLE}\"> first </div><div style=\"{CONTENT_STYLE}\"> second </div></body></html>"
        );
        assert_eq!(extract_revision_content(&html).expect("extract"), "first");
    }

    #[test]
    fn normalization_strips_exactly_one_space_each_side() {
        assert_eq!(normalize_fragment(" line "), "line");
        assert_eq!(normalize_fragment("  two  "), " two ");
        assert_eq!(normalize_fragment("\n line "), "\nline");
        assert_eq!(normalize_fragment("\n  nested "), "\n nested");
        assert_eq!(normalize_fragment("\nbare"), "\nbare");
        assert_eq!(normalize_fragment(" "), "");
        assert_eq!(normalize_fragment(""), "");
    }
}
