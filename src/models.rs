//! Data models shared across the scout pipeline.
//!
//! - [`FetchedPage`]: raw HTML for one processing cycle
//! - [`ArticleRecord`]: one extracted headline
//! - [`KnowledgeEntry`]: an embedded article blob
//! - [`ConversationMessage`]: one turn of the Q&A session
//! - [`SelectorPlan`] / [`ExtractionRoutine`]: the selector-inference outputs
//!
//! The selector plan keeps the snake_case keys the model is asked to emit,
//! so it round-trips through the prompts without renaming.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sentinel selector meaning "the container element itself".
pub const SELF_SELECTOR: &str = "self";

/// Name of the routine the executor invokes.
pub const ENTRYPOINT: &str = "scrape_news";

/// HTML fetched for a single URL.
///
/// Held only for the duration of one processing cycle and replaced wholesale
/// on every new fetch.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// The URL that was requested.
    pub url: String,
    /// The raw (or rendered) HTML.
    pub html: String,
}

/// A single article as extracted from a front page.
///
/// Records are kept in document order and never deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
}

impl ArticleRecord {
    /// Only records with both a title and a link are worth embedding.
    pub fn is_indexable(&self) -> bool {
        self.title.as_deref().is_some_and(|t| !t.is_empty())
            && self.link.as_deref().is_some_and(|l| !l.is_empty())
    }

    /// Text blob embedded for retrieval. The link is part of the blob so the
    /// answerer can cite it straight from the retrieved context.
    pub fn knowledge_content(&self) -> String {
        format!(
            "Title: {}\nDescription: {}\nLink: {}",
            self.title.as_deref().unwrap_or_default(),
            self.description.as_deref().unwrap_or_default(),
            self.link.as_deref().unwrap_or_default()
        )
    }
}

/// An embedded article blob.
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeEntry {
    pub content: String,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn of the question/answer conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    /// Local time the message was appended.
    pub at: DateTime<Local>,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            at: Local::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            at: Local::now(),
        }
    }
}

/// Candidate container selectors returned by inference stage 1.
#[derive(Debug, Default, Deserialize)]
pub struct ContainerCandidates {
    #[serde(default)]
    pub selectors: Vec<String>,
}

/// Field-level selector plan returned by inference stage 2.
///
/// Any selector may be [`SELF_SELECTOR`], meaning the container itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorPlan {
    pub best_article_selector: String,
    #[serde(default)]
    pub title_selector: Option<String>,
    #[serde(default)]
    pub link_selector: Option<String>,
    #[serde(default)]
    pub description_selector: Option<String>,
}

/// How to pull one field out of an article container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    /// CSS selector relative to the container, or `"self"`.
    pub selector: String,
    /// Attribute to read instead of the text content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

/// A declarative extraction routine, interpreted by the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineDefinition {
    /// Base URL relative links are resolved against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Selector matching each repeating article container.
    pub item_selector: String,
    #[serde(default)]
    pub title: Option<FieldRule>,
    #[serde(default)]
    pub link: Option<FieldRule>,
    #[serde(default)]
    pub description: Option<FieldRule>,
}

/// A routine document: named routine definitions, with [`ENTRYPOINT`] as the
/// one the executor calls.
pub type ExtractionRoutine = BTreeMap<String, RoutineDefinition>;
