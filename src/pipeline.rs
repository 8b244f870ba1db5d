//! Selector inference: from raw HTML to an extraction routine in three model
//! calls.
//!
//! 1. **Container discovery**: a bounded sample of the pretty-printed body;
//!    the model names candidate selectors for repeating article containers.
//! 2. **Field mapping**: up to five real containers matched by those
//!    candidates; the model picks the best container selector and the
//!    title, link and description sub-selectors (`"self"` = the container).
//! 3. **Routine synthesis**: the confirmed plan and the base URL; the model
//!    writes the `scrape_news` routine document.
//!
//! Each stage narrows the context the next one sees. Any stage failing
//! (provider error, unparsable reply, nothing found) ends the run.

use crate::api::Generate;
use crate::config::PipelineConfig;
use crate::error::InferenceError;
use crate::executor::CompiledRoutine;
use crate::html::{body_sample, sample_containers};
use crate::models::{ContainerCandidates, ENTRYPOINT, ExtractionRoutine, SelectorPlan};
use crate::sanitize::parse_json;
use crate::utils::truncate_for_log;
use itertools::Itertools;
use scraper::Html;
use std::fmt::Write;
use tracing::{debug, info, instrument, warn};

fn stage1_prompt(site_url: &str, sample: &str) -> String {
    format!(
        r#"Analyze the following HTML from {site_url}. Identify CSS selectors for the main containers that each hold a single news article. Provide your answer as a JSON object with a key "selectors" which is a list of strings. Example: {{"selectors": ["div.story-wrapper", "a.news-card"]}}
HTML:
```html
{sample}
```"#
    )
}

fn stage2_prompt(samples: &[String]) -> String {
    let mut html = String::new();
    for sample in samples {
        let _ = write!(html, "<!-- Sample Article Container -->\n{sample}\n\n");
    }
    format!(
        r#"Based on the HTML samples, determine reliable CSS selectors to extract title, link, and description. Provide analysis as a clean JSON object with keys: "best_article_selector", "title_selector", "link_selector", "description_selector". If the link is on the main container itself, use "self". Use null for a field that has no reliable selector.
HTML SAMPLES:
```html
{html}
```"#
    )
}

fn stage3_prompt(plan: &SelectorPlan, site_url: &str) -> String {
    let plan_json = serde_json::to_string(plan).unwrap_or_default();
    format!(
        r#"Write an extraction routine named `{ENTRYPOINT}` using this analysis: `{plan_json}`. Base URL: `{site_url}`.
The routine is a JSON document of this exact shape:
{{
  "{ENTRYPOINT}": {{
    "base_url": "<base URL used to resolve relative links>",
    "item_selector": "<CSS selector for each article container>",
    "title": {{ "selector": "<CSS selector inside the container, or self>" }},
    "link": {{ "selector": "<CSS selector inside the container, or self>", "attribute": "href" }},
    "description": {{ "selector": "<CSS selector inside the container, or self>" }}
  }}
}}
CRITICAL: relative links must resolve against the base URL, and a single malformed item must be skipped rather than failing the whole extraction, so prefer selectors that tolerate missing children. Omit a field (or use null) when there is no reliable selector for it. Return ONLY the JSON document."#
    )
}

/// Run all three stages, returning the pretty-printed routine document.
///
/// # Arguments
///
/// * `model` - Generation service used for every stage
/// * `html` - Raw page markup
/// * `site_url` - Page URL, given to the model as the base for relative links
/// * `config` - Sample size for stage 1 and container count for stage 2
///
/// # Returns
///
/// The routine as pretty-printed JSON with a `scrape_news` entry point. Its
/// selectors have already been compiled once.
///
/// # Errors
///
/// [`InferenceError`] tagged with the stage that gave up. Later stages are
/// not attempted.
#[instrument(level = "info", skip(model, html, config), fields(html_bytes = html.len()))]
pub async fn infer_detailed<G: Generate>(
    model: &G,
    html: &str,
    site_url: &str,
    config: &PipelineConfig,
) -> Result<String, InferenceError> {
    // Stage 1: container discovery
    let sample = {
        let document = Html::parse_document(html);
        body_sample(&document, config.sample_chars)
    };
    if sample.is_empty() {
        return Err(InferenceError::EmptyResult {
            stage: 1,
            reason: "page has no <body> to sample".to_string(),
        });
    }
    let reply = model
        .generate(&stage1_prompt(site_url, &sample))
        .await
        .map_err(|source| InferenceError::Provider { stage: 1, source })?;
    let candidates: ContainerCandidates =
        parse_json(&reply).map_err(|reason| malformed(1, reason, &reply))?;
    if candidates.selectors.is_empty() {
        return Err(InferenceError::EmptyResult {
            stage: 1,
            reason: "model proposed no container selectors".to_string(),
        });
    }
    info!(candidates = %candidates.selectors.iter().join(" | "), "Stage 1: candidate selectors");

    // Stage 2: field mapping over real samples
    let found = {
        let document = Html::parse_document(html);
        sample_containers(&document, &candidates.selectors, config.max_samples)
    };
    if found.samples.is_empty() {
        return Err(InferenceError::EmptyResult {
            stage: 2,
            reason: "no containers matched the candidate selectors".to_string(),
        });
    }
    debug!(
        valid = %found.valid_selectors.iter().join(" | "),
        "Stage 2: sampling containers"
    );
    let reply = model
        .generate(&stage2_prompt(&found.samples))
        .await
        .map_err(|source| InferenceError::Provider { stage: 2, source })?;
    let plan: SelectorPlan = parse_json(&reply).map_err(|reason| malformed(2, reason, &reply))?;
    if plan.best_article_selector.trim().is_empty() {
        return Err(InferenceError::EmptyResult {
            stage: 2,
            reason: "model returned an empty best_article_selector".to_string(),
        });
    }
    info!(?plan, samples = found.samples.len(), "Stage 2: selector plan");

    // Stage 3: routine synthesis
    let reply = model
        .generate(&stage3_prompt(&plan, site_url))
        .await
        .map_err(|source| InferenceError::Provider { stage: 3, source })?;
    let routine: ExtractionRoutine =
        parse_json(&reply).map_err(|reason| malformed(3, reason, &reply))?;
    let Some(definition) = routine.get(ENTRYPOINT) else {
        return Err(InferenceError::MalformedResponse {
            stage: 3,
            reason: format!("routine has no `{ENTRYPOINT}` entry point"),
        });
    };
    CompiledRoutine::compile(definition).map_err(|e| InferenceError::MalformedResponse {
        stage: 3,
        reason: e.to_string(),
    })?;

    let source = serde_json::to_string_pretty(&routine).map_err(|e| {
        InferenceError::MalformedResponse {
            stage: 3,
            reason: e.to_string(),
        }
    })?;
    info!("Stage 3: routine synthesised");
    Ok(source)
}

fn malformed(stage: u8, reason: String, reply: &str) -> InferenceError {
    warn!(stage, reply = %truncate_for_log(reply, 300), "Unparsable model reply");
    InferenceError::MalformedResponse { stage, reason }
}

/// Infer a routine for `site_url`, or `None` when any stage gives up.
pub async fn infer<G: Generate>(
    model: &G,
    html: &str,
    site_url: &str,
    config: &PipelineConfig,
) -> Option<String> {
    match infer_detailed(model, html, site_url, config).await {
        Ok(source) => Some(source),
        Err(e) => {
            warn!(error = %e, "Selector inference gave up");
            None
        }
    }
}
