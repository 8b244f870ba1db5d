//! Question routing and answering.
//!
//! Each question is first classified as an aggregation (whole-corpus view)
//! or a retrieval (targeted lookup):
//!
//! - **Aggregation** sends every record's title and link plus the total
//!   count, and asks for a categorized summary. No similarity search.
//! - **Retrieval** embeds the question, takes the top-k most similar
//!   knowledge entries as context, and asks for an answer grounded in that
//!   context with source links. An empty context short-circuits to
//!   [`NO_RELEVANT_INFORMATION`] without calling the model.

use crate::api::{Embed, Generate, Purpose};
use crate::error::AnswerError;
use crate::knowledge::KnowledgeBase;
use crate::models::ArticleRecord;
use crate::sanitize::{Intent, classify_intent};
use std::fmt::Write;
use tracing::{info, instrument, warn};

/// Reply used when retrieval finds nothing to ground an answer in.
pub const NO_RELEVANT_INFORMATION: &str =
    "Sorry, I couldn't find any relevant information in the extracted news.";

/// Prompt asking the model to pick between the two intents.
pub fn intent_prompt(question: &str) -> String {
    format!(
        r#"Classify the user's query into 'retrieval' or 'aggregation'.
- 'retrieval': Asks about specific content (e.g., "What did the coach say?").
- 'aggregation': Asks for a list, summary, or count (e.g., "List all headlines", "How many news items?").
Query: "{question}" -> Category:"#
    )
}

/// Prompt carrying the whole corpus: every title and link plus the count.
pub fn aggregation_prompt(question: &str, records: &[ArticleRecord], language: &str) -> String {
    let mut data = String::new();
    for record in records {
        let _ = writeln!(
            data,
            "Title: {}\nLink: {}",
            record.title.as_deref().unwrap_or("(untitled)"),
            record.link.as_deref().unwrap_or("(no link)")
        );
    }
    format!(
        "You are an assistant. Answer the user's question in {language} based ONLY on the provided list of data. \
Create a clear, structured, and categorized summary of the news.\n\
Data: Total articles: {total}\n{data}\n\
User's Question: {question}",
        total = records.len(),
    )
}

/// Prompt answering from retrieved context, with mandatory source links.
pub fn retrieval_prompt(question: &str, context: &str, language: &str) -> String {
    format!(
        "You are a helpful AI assistant. Answer the user's question in {language} based ONLY on the provided context.\n\
**CRITICAL: When you mention a news item, you MUST provide its source link, which is included in the context. \
Format the link as a clickable Markdown link, like this: [link text](URL).**\n\
If the answer isn't in the context, say so clearly.\n\n\
Context:\n### Relevant excerpts from the extracted news:\n\n{context}\n\n\
Question: {question}\n"
    )
}

/// Settings for [`answer`].
#[derive(Debug, Clone)]
pub struct AnswerOptions<'a> {
    pub top_k: usize,
    pub language: &'a str,
}

/// Answer `question` from the extracted `records` and their knowledge base.
///
/// # Arguments
///
/// * `model` - Classifies the question, then writes the answer
/// * `embedder` - Embeds the question on the retrieval path only
/// * `knowledge` - Embedded records searched on the retrieval path
/// * `records` - Every extracted record, sent whole on the aggregation path
/// * `options` - `top_k` for retrieval and the answer language
///
/// # Returns
///
/// The model's answer, or [`NO_RELEVANT_INFORMATION`] when retrieval has
/// nothing to ground it in.
#[instrument(level = "info", skip_all, fields(kb = knowledge.len(), records = records.len()))]
pub async fn answer<G: Generate, E: Embed>(
    model: &G,
    embedder: &E,
    question: &str,
    knowledge: &KnowledgeBase,
    records: &[ArticleRecord],
    options: &AnswerOptions<'_>,
) -> Result<String, AnswerError> {
    let intent = classify_intent(&model.generate(&intent_prompt(question)).await?);
    info!(?intent, "Classified question");

    let prompt = match intent {
        Intent::Aggregation => aggregation_prompt(question, records, options.language),
        Intent::Retrieval => {
            if knowledge.is_empty() {
                info!("Knowledge base is empty; nothing to retrieve");
                return Ok(NO_RELEVANT_INFORMATION.to_string());
            }
            let query = embedder.embed_one(question, Purpose::Query).await?;
            if knowledge.dimension() != Some(query.len()) {
                warn!(
                    query = query.len(),
                    indexed = ?knowledge.dimension(),
                    "Query embedding dimension differs from the knowledge base"
                );
            }
            let context = knowledge.context_for(&query, options.top_k);
            if context.trim().is_empty() {
                return Ok(NO_RELEVANT_INFORMATION.to_string());
            }
            retrieval_prompt(question, &context, options.language)
        }
    };

    Ok(model.generate(&prompt).await?)
}
