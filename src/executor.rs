//! Extraction routine interpreter.
//!
//! A routine is a JSON document of named [`RoutineDefinition`]s; the executor
//! looks up the `scrape_news` entry point and walks the page with it. Because
//! routines are data, running a model-written routine never executes
//! model-written code.
//!
//! Items are isolated from each other: a container whose link can't be
//! resolved, or which yields no field at all, is skipped and the rest of the
//! page is still extracted.

use crate::error::ExecutionError;
use crate::models::{
    ArticleRecord, ENTRYPOINT, ExtractionRoutine, FieldRule, RoutineDefinition, SELF_SELECTOR,
};
use crate::utils::collapse_whitespace;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument};
use url::Url;

static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());

/// A field rule with its selector compiled.
struct CompiledField {
    selector: Option<Selector>,
    attribute: Option<String>,
}

impl CompiledField {
    fn compile(field: &str, rule: &FieldRule) -> Result<Self, ExecutionError> {
        let trimmed = rule.selector.trim();
        let selector = if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(SELF_SELECTOR) {
            None
        } else {
            Some(Selector::parse(trimmed).map_err(|e| {
                ExecutionError::Runtime(format!("invalid {field} selector `{trimmed}`: {e}"))
            })?)
        };
        Ok(Self {
            selector,
            attribute: rule.attribute.clone().filter(|a| !a.trim().is_empty()),
        })
    }

    /// The element this field reads from: the container for `"self"`,
    /// otherwise the first matching descendant.
    fn target<'a>(&self, container: ElementRef<'a>) -> Option<ElementRef<'a>> {
        match &self.selector {
            None => Some(container),
            Some(sel) => container.select(sel).next(),
        }
    }

    fn text(&self, container: ElementRef<'_>) -> Option<String> {
        let el = self.target(container)?;
        let value = match &self.attribute {
            Some(attr) => el.value().attr(attr).map(collapse_whitespace)?,
            None => collapse_whitespace(&el.text().collect::<String>()),
        };
        (!value.is_empty()).then_some(value)
    }

    /// Raw link target. Falls back to the first `a[href]` inside the target
    /// when the target itself lacks the attribute.
    fn href(&self, container: ElementRef<'_>) -> Option<String> {
        let el = self.target(container)?;
        let attr = self.attribute.as_deref().unwrap_or("href");
        if let Some(v) = el.value().attr(attr) {
            return Some(v.trim().to_string()).filter(|v| !v.is_empty());
        }
        el.select(&ANCHOR)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

/// A routine ready to run against many pages.
pub struct CompiledRoutine {
    items: Selector,
    base_url: Option<Url>,
    title: Option<CompiledField>,
    link: Option<CompiledField>,
    description: Option<CompiledField>,
}

impl CompiledRoutine {
    /// Parse routine source and compile its entry point.
    pub fn from_source(routine_source: &str) -> Result<Self, ExecutionError> {
        let scope: ExtractionRoutine = serde_json::from_str(routine_source)
            .map_err(|e| ExecutionError::Runtime(format!("routine is not valid JSON: {e}")))?;
        let definition = scope
            .get(ENTRYPOINT)
            .ok_or_else(|| ExecutionError::MissingEntrypoint(ENTRYPOINT.to_string()))?;
        Self::compile(definition)
    }

    pub fn compile(def: &RoutineDefinition) -> Result<Self, ExecutionError> {
        let items = Selector::parse(def.item_selector.trim()).map_err(|e| {
            ExecutionError::Runtime(format!(
                "invalid item selector `{}`: {e}",
                def.item_selector
            ))
        })?;
        let base_url = match def.base_url.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(
                Url::parse(raw)
                    .map_err(|e| ExecutionError::Runtime(format!("invalid base_url `{raw}`: {e}")))?,
            ),
            _ => None,
        };
        let compile = |name: &str, rule: &Option<FieldRule>| {
            rule.as_ref()
                .map(|r| CompiledField::compile(name, r))
                .transpose()
        };
        Ok(Self {
            items,
            base_url,
            title: compile("title", &def.title)?,
            link: compile("link", &def.link)?,
            description: compile("description", &def.description)?,
        })
    }

    /// Extract records from `html`. `page_url` is the fallback base for
    /// relative links when the routine names none.
    pub fn run(&self, html: &str, page_url: Option<&str>) -> Vec<ArticleRecord> {
        let fallback_base = page_url.and_then(|u| Url::parse(u).ok());
        let base = self.base_url.as_ref().or(fallback_base.as_ref());

        let document = Html::parse_document(html);
        let mut records = Vec::new();
        let mut skipped = 0usize;
        for (index, container) in document.select(&self.items).enumerate() {
            match self.extract_item(container, base) {
                Ok(record) => records.push(record),
                Err(reason) => {
                    skipped += 1;
                    debug!(index, %reason, "Skipping item");
                }
            }
        }
        info!(extracted = records.len(), skipped, "Routine finished");
        records
    }

    fn extract_item(
        &self,
        container: ElementRef<'_>,
        base: Option<&Url>,
    ) -> Result<ArticleRecord, String> {
        let title = self.title.as_ref().and_then(|f| f.text(container));
        let description = self.description.as_ref().and_then(|f| f.text(container));
        let link = match self.link.as_ref().and_then(|f| f.href(container)) {
            Some(raw) => Some(resolve_link(&raw, base)?),
            None => None,
        };

        if title.is_none() && link.is_none() && description.is_none() {
            return Err("no fields matched".to_string());
        }
        Ok(ArticleRecord {
            title,
            link,
            description,
        })
    }
}

/// Resolve `raw` against `base`. Absolute links pass through.
fn resolve_link(raw: &str, base: Option<&Url>) -> Result<String, String> {
    match Url::parse(raw) {
        Ok(abs) => Ok(abs.to_string()),
        Err(url::ParseError::RelativeUrlWithoutBase) => match base {
            Some(base) => base
                .join(raw)
                .map(|u| u.to_string())
                .map_err(|e| format!("cannot resolve `{raw}`: {e}")),
            None => Ok(raw.to_string()),
        },
        Err(e) => Err(format!("malformed link `{raw}`: {e}")),
    }
}

/// Run `routine_source` against `html`.
///
/// # Arguments
///
/// * `html` - Page markup
/// * `routine_source` - Routine JSON with a `scrape_news` entry point
/// * `page_url` - Base for relative links when the routine names none
///
/// # Returns
///
/// Records in document order. Per-item problems never fail the call; the
/// item is skipped.
///
/// # Errors
///
/// [`ExecutionError::MissingEntrypoint`] when the routine has no
/// `scrape_news`, and [`ExecutionError::Runtime`] when the document or one of
/// its selectors is invalid.
#[instrument(level = "info", skip_all, fields(html_bytes = html.len()))]
pub fn execute(
    html: &str,
    routine_source: &str,
    page_url: Option<&str>,
) -> Result<Vec<ArticleRecord>, ExecutionError> {
    let routine = CompiledRoutine::from_source(routine_source)?;
    Ok(routine.run(html, page_url))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
        <div class="card"><h3> First
            story </h3><a href="/news/1">more</a><p>Desc one</p></div>
        <div class="card"><h3>Second story</h3><a href="https://other.org/2">more</a></div>
        <div class="card"><h3>Broken story</h3><a href="http://[::1">more</a></div>
        <div class="card"><h3>Fourth story</h3><a href="news/4">more</a><p>Desc four</p></div>
        <div class="card"><h3>Fifth story</h3><a href="/news/5">more</a></div>
        </body></html>"#;

    fn routine(json: &str) -> String {
        json.to_string()
    }

    #[test]
    fn test_extracts_in_document_order_and_skips_bad_item() {
        let source = routine(
            r#"{"scrape_news": {
                "base_url": "https://example.com/section/",
                "item_selector": "div.card",
                "title": {"selector": "h3"},
                "link": {"selector": "a"},
                "description": {"selector": "p"}
            }}"#,
        );
        let records = execute(PAGE, &source, None).unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].title.as_deref(), Some("First story"));
        assert_eq!(records[0].link.as_deref(), Some("https://example.com/news/1"));
        assert_eq!(records[0].description.as_deref(), Some("Desc one"));
        assert_eq!(records[1].link.as_deref(), Some("https://other.org/2"));
        assert_eq!(records[1].description, None);
        assert_eq!(records[2].title.as_deref(), Some("Fourth story"));
        assert_eq!(records[2].link.as_deref(), Some("https://example.com/section/news/4"));
        assert_eq!(records[3].title.as_deref(), Some("Fifth story"));
    }

    #[test]
    fn test_self_selector_on_anchor_container() {
        let html = r#"<body>
            <a class="tile" href="/a"><span>Alpha</span></a>
            <a class="tile" href="/b"><span>Beta</span></a>
        </body>"#;
        let source = routine(
            r#"{"scrape_news": {
                "item_selector": "a.tile",
                "title": {"selector": "span"},
                "link": {"selector": "self", "attribute": "href"}
            }}"#,
        );
        let records = execute(html, &source, Some("https://site.test/home")).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].title.as_deref(), Some("Beta"));
        assert_eq!(records[1].link.as_deref(), Some("https://site.test/b"));
    }

    #[test]
    fn test_link_falls_back_to_nested_anchor() {
        let html = r#"<body><h2 class="hl"><a href="/x">Headline</a></h2></body>"#;
        let source = routine(
            r#"{"scrape_news": {
                "base_url": "https://n.test",
                "item_selector": "h2.hl",
                "title": {"selector": "self"},
                "link": {"selector": "self"}
            }}"#,
        );
        let records = execute(html, &source, None).unwrap();
        assert_eq!(records[0].title.as_deref(), Some("Headline"));
        assert_eq!(records[0].link.as_deref(), Some("https://n.test/x"));
    }

    #[test]
    fn test_item_with_no_fields_is_skipped() {
        let html = r#"<body><li class="i"><b>One</b></li><li class="i"></li></body>"#;
        let source = routine(
            r#"{"scrape_news": {"item_selector": "li.i", "title": {"selector": "b"}}}"#,
        );
        let records = execute(html, &source, None).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_duplicates_are_kept() {
        let html = r#"<body><p class="x">Same</p><p class="x">Same</p></body>"#;
        let source = routine(
            r#"{"scrape_news": {"item_selector": "p.x", "title": {"selector": "self"}}}"#,
        );
        assert_eq!(execute(html, &source, None).unwrap().len(), 2);
    }

    #[test]
    fn test_missing_entrypoint() {
        let source = routine(r#"{"parse_page": {"item_selector": "div"}}"#);
        let err = execute(PAGE, &source, None).unwrap_err();
        assert!(matches!(err, ExecutionError::MissingEntrypoint(name) if name == "scrape_news"));
    }

    #[test]
    fn test_invalid_json_is_runtime_error() {
        let err = execute(PAGE, "def scrape_news(html): pass", None).unwrap_err();
        assert!(matches!(err, ExecutionError::Runtime(_)));
    }

    #[test]
    fn test_invalid_selector_is_runtime_error() {
        let source = routine(
            r#"{"scrape_news": {"item_selector": "div.card", "title": {"selector": "h3[["}}}"#,
        );
        let err = execute(PAGE, &source, None).unwrap_err();
        assert!(matches!(err, ExecutionError::Runtime(msg) if msg.contains("title")));
    }

    #[test]
    fn test_relative_link_without_any_base_is_kept_raw() {
        assert_eq!(resolve_link("/a", None).unwrap(), "/a");
        assert!(resolve_link("http://[::1", None).is_err());
    }
}
