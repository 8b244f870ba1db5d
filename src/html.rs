//! HTML helpers for building model prompts.
//!
//! The inference prompts carry markup, not text, so the model can see class
//! names and nesting. [`prettify`] re-serialises an element one tag per line
//! with single-space indentation, which keeps samples readable and makes
//! character budgets predictable. Script, style and template bodies are
//! dropped because they only burn budget.

use itertools::Itertools;
use scraper::{ElementRef, Html, Node, Selector};
use std::fmt::Write;
use tracing::{debug, warn};

use crate::utils::take_chars;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const OPAQUE_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Pretty-print an element and its subtree.
pub fn prettify(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    write_element(element, 0, &mut out);
    out
}

fn write_element(element: ElementRef<'_>, depth: usize, out: &mut String) {
    let el = element.value();
    let name = el.name();
    let indent = " ".repeat(depth);

    let _ = write!(out, "{indent}<{name}");
    for (key, value) in el.attrs() {
        let _ = write!(out, " {key}=\"{}\"", escape_attr(value));
    }
    out.push_str(">\n");

    if VOID_ELEMENTS.contains(&name) {
        return;
    }

    if !OPAQUE_ELEMENTS.contains(&name) {
        for child in element.children() {
            match child.value() {
                Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        write_element(child_el, depth + 1, out);
                    }
                }
                Node::Text(text) => {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        let _ = writeln!(out, "{indent} {}", escape_text(trimmed));
                    }
                }
                Node::Comment(comment) => {
                    let _ = writeln!(out, "{indent} <!--{}-->", &**comment);
                }
                _ => {}
            }
        }
    }

    let _ = writeln!(out, "{indent}</{name}>");
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;").replace('"', "&quot;")
}

/// The first `max_chars` characters of the pretty-printed `<body>`.
///
/// Returns an empty string when the document has no body element.
pub fn body_sample(document: &Html, max_chars: usize) -> String {
    let body_selector = Selector::parse("body").unwrap();
    match document.select(&body_selector).next() {
        Some(body) => {
            let pretty = prettify(body);
            let sample = take_chars(&pretty, max_chars).to_string();
            debug!(
                pretty_chars = pretty.chars().count(),
                sample_chars = sample.chars().count(),
                "Built body sample"
            );
            sample
        }
        None => String::new(),
    }
}

/// Containers matched by the union of `candidates`, in document order.
pub struct ContainerSamples {
    /// Candidates that parsed as CSS selectors.
    pub valid_selectors: Vec<String>,
    /// Pretty-printed markup of up to `limit` matched containers.
    pub samples: Vec<String>,
}

/// Select up to `limit` containers matching any of `candidates`.
///
/// Candidates that are not valid CSS are dropped with a warning instead of
/// failing the whole union.
pub fn sample_containers(document: &Html, candidates: &[String], limit: usize) -> ContainerSamples {
    let valid_selectors: Vec<String> = candidates
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .unique()
        .filter(|c| match Selector::parse(c) {
            Ok(_) => true,
            Err(e) => {
                warn!(selector = %c, error = %e, "Dropping invalid candidate selector");
                false
            }
        })
        .map(str::to_string)
        .collect();

    if valid_selectors.is_empty() {
        return ContainerSamples {
            valid_selectors,
            samples: Vec::new(),
        };
    }

    let union = valid_selectors.iter().join(", ");
    let samples = match Selector::parse(&union) {
        Ok(selector) => document
            .select(&selector)
            .take(limit)
            .map(prettify)
            .collect(),
        Err(e) => {
            warn!(selector = %union, error = %e, "Union of candidate selectors failed to parse");
            Vec::new()
        }
    };

    ContainerSamples {
        valid_selectors,
        samples,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head><title>Front</title></head><body>
        <script>var tracking = 1;</script>
        <div class="card"><a href="/a">First &amp; best</a><p>One</p></div>
        <div class="card"><a href="/b">Second</a><br><p>Two</p></div>
        <li class="item"><a href="/c">Third</a></li>
        </body></html>"#;

    #[test]
    fn test_prettify_structure() {
        let doc = Html::parse_fragment(r#"<div class="card"><a href="/a?x=1&amp;y=2">Hi</a><br></div>"#);
        let sel = Selector::parse("div.card").unwrap();
        let div = doc.select(&sel).next().unwrap();
        let pretty = prettify(div);
        assert_eq!(
            pretty,
            "<div class=\"card\">\n <a href=\"/a?x=1&amp;y=2\">\n  Hi\n </a>\n <br>\n</div>\n"
        );
    }

    #[test]
    fn test_body_sample_drops_scripts_and_truncates() {
        let doc = Html::parse_document(PAGE);
        let full = body_sample(&doc, usize::MAX);
        assert!(full.starts_with("<body>"));
        assert!(!full.contains("tracking"));
        assert!(full.contains("First &amp; best"));

        let short = body_sample(&doc, 10);
        assert_eq!(short.chars().count(), 10);
    }

    #[test]
    fn test_sample_containers_union_in_document_order() {
        let doc = Html::parse_document(PAGE);
        let candidates = vec!["li.item".to_string(), "div.card".to_string()];
        let found = sample_containers(&doc, &candidates, 5);
        assert_eq!(found.samples.len(), 3);
        assert!(found.samples[0].contains("First"));
        assert!(found.samples[2].contains("Third"));
    }

    #[test]
    fn test_sample_containers_respects_limit() {
        let doc = Html::parse_document(PAGE);
        let found = sample_containers(&doc, &["div.card".to_string()], 1);
        assert_eq!(found.samples.len(), 1);
    }

    #[test]
    fn test_sample_containers_drops_invalid_candidates() {
        let doc = Html::parse_document(PAGE);
        let candidates = vec!["div[".to_string(), "li.item".to_string(), "li.item".to_string()];
        let found = sample_containers(&doc, &candidates, 5);
        assert_eq!(found.valid_selectors, vec!["li.item"]);
        assert_eq!(found.samples.len(), 1);
    }

    #[test]
    fn test_sample_containers_nothing_matches() {
        let doc = Html::parse_document(PAGE);
        let found = sample_containers(&doc, &["section.none".to_string()], 5);
        assert!(found.samples.is_empty());
    }
}
