//! Main-content extraction and text conversion for fetched pages.
//!
//! Readability runs through `spider_transformations`; the title is read from
//! the document head and the extracted HTML is rendered to plain text with
//! `html2text`.

use anyhow::Context;
use scraper::{ElementRef, Html, Selector};
use spider_transformations::transformation::content::{
    transform_content_input, ReturnFormat, TransformConfig, TransformInput,
};

/// Title and cleaned HTML of a page's main content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub title: String,
    pub html: String,
}

/// Extract the title and main content of an HTML document.
///
/// Falls back to the whole `<body>` when readability finds nothing worth
/// reading, so short pages still yield their text.
pub fn extract_main_content(html: &str) -> Extracted {
    let doc = Html::parse_document(html);
    let title = extract_title(&doc);

    let config = TransformConfig {
        readability: true,
        main_content: true,
        return_format: ReturnFormat::Raw,
        filter_images: true,
        filter_svg: true,
        clean_html: true,
    };
    let input = TransformInput {
        url: None,
        content: html.as_bytes(),
        screenshot_bytes: None,
        encoding: None,
        selector_config: None,
        ignore_tags: None,
    };
    let main = transform_content_input(input, &config);

    if has_visible_text(&main) {
        return Extracted { title, html: main };
    }

    tracing::debug!("readability found no main content, using the page body");
    let body = first_match(&doc, "body")
        .map(|body| body.inner_html())
        .unwrap_or_else(|| html.to_string());
    Extracted { title, html: body }
}

/// Convert HTML to plain text, collapsing runs of blank lines.
pub fn html_to_text(html: &str) -> anyhow::Result<String> {
    let text = html2text::from_read(html.as_bytes(), 80).context("html to text conversion")?;

    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    Ok(out.trim().to_string())
}

/// Keep at most `budget` characters (not bytes) of `text`.
pub fn truncate_chars(text: &str, budget: usize) -> String {
    match text.char_indices().nth(budget) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

fn has_visible_text(html: &str) -> bool {
    Html::parse_fragment(html)
        .root_element()
        .text()
        .any(|t| !t.trim().is_empty())
}

fn first_match<'a>(doc: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    let sel = Selector::parse(selector).ok()?;
    doc.select(&sel).next()
}

/// `<title>`, then `og:title`, then the first `<h1>`.
fn extract_title(doc: &Html) -> String {
    if let Some(title) = first_match(doc, "title") {
        let text = collapse(&title.text().collect::<String>());
        if !text.is_empty() {
            return text;
        }
    }

    if let Some(content) = first_match(doc, "meta[property=\"og:title\"]")
        .and_then(|meta| meta.value().attr("content"))
    {
        let text = collapse(content);
        if !text.is_empty() {
            return text;
        }
    }

    first_match(doc, "h1")
        .map(|h1| collapse(&h1.text().collect::<String>()))
        .unwrap_or_default()
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
