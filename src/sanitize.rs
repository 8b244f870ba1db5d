//! Response sanitizer for free-text model replies.
//!
//! Models wrap JSON in Markdown fences, add prose around it, and answer
//! classification prompts with whole sentences. Every tolerant parse the
//! pipeline needs lives here, each with a fixed fallback:
//!
//! | Function | Fallback |
//! |----------|----------|
//! | [`strip_code_fences`] | input trimmed, unchanged when no fence is present |
//! | [`parse_json`] | `Err` with the serde error message; never panics |
//! | [`classify_intent`] | [`Intent::Retrieval`] when "aggregation" is absent |

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::utils::truncate_for_log;

static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n?(.*?)```").unwrap());

/// Remove Markdown code fences from a model reply.
///
/// If the reply contains a fenced block, the contents of the first block are
/// returned. Stray fence markers without a closing pair are removed. Text
/// without fences is returned trimmed.
pub fn strip_code_fences(reply: &str) -> String {
    if let Some(caps) = FENCED_BLOCK.captures(reply) {
        if let Some(inner) = caps.get(1) {
            return inner.as_str().trim().to_string();
        }
    }
    reply
        .lines()
        .filter(|l| !l.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Parse a JSON value out of a model reply.
///
/// Fences are stripped first; the remainder must be a JSON document on its
/// own. Prose around an unfenced object is a parse error.
pub fn parse_json<T: DeserializeOwned>(reply: &str) -> Result<T, String> {
    let cleaned = strip_code_fences(reply);
    serde_json::from_str::<T>(&cleaned).map_err(|e| {
        debug!(reply = %truncate_for_log(reply, 300), "Reply is not JSON");
        e.to_string()
    })
}

/// How a user question should be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Whole-corpus view: list, count, summarise.
    Aggregation,
    /// Targeted lookup answered from the top-k similar articles.
    Retrieval,
}

/// Map a classifier reply to an [`Intent`].
///
/// Substring match on the lower-cased reply: anything mentioning
/// "aggregation" is aggregation, everything else (including replies naming
/// neither category) is retrieval.
pub fn classify_intent(reply: &str) -> Intent {
    let lowered = reply.trim().to_lowercase();
    if lowered.contains("aggregation") {
        Intent::Aggregation
    } else {
        if !lowered.contains("retrieval") {
            debug!(reply = %truncate_for_log(&lowered, 120), "Classifier named neither intent; using retrieval");
        }
        Intent::Retrieval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sel {
        selectors: Vec<String>,
    }

    #[test]
    fn test_strip_json_fence() {
        let reply = "```json\n{\"selectors\": [\"div.card\"]}\n```";
        assert_eq!(strip_code_fences(reply), "{\"selectors\": [\"div.card\"]}");
    }

    #[test]
    fn test_strip_fence_with_preamble() {
        let reply = "Here you go:\n```\n{\"a\": 1}\n```\nLet me know!";
        assert_eq!(strip_code_fences(reply), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_no_fence() {
        assert_eq!(strip_code_fences("  {\"a\": 1}\n"), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_unclosed_fence() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_json_fenced() {
        let parsed: Sel = parse_json("```json\n{\"selectors\": [\"li.item\"]}\n```").unwrap();
        assert_eq!(parsed.selectors, vec!["li.item"]);
    }

    #[test]
    fn test_parse_json_rejects_unfenced_prose() {
        let reply = "Sure! The containers are {\"selectors\": [\"article\"]} as requested.";
        assert!(parse_json::<Sel>(reply).is_err());
    }

    #[test]
    fn test_parse_json_garbage() {
        assert!(parse_json::<Sel>("I could not find any articles.").is_err());
        assert!(parse_json::<Sel>("{\"selectors\": [").is_err());
    }

    #[test]
    fn test_classify_intent() {
        assert_eq!(classify_intent("aggregation"), Intent::Aggregation);
        assert_eq!(classify_intent("Category: Aggregation."), Intent::Aggregation);
        assert_eq!(classify_intent("retrieval"), Intent::Retrieval);
        assert_eq!(classify_intent("I'm not sure"), Intent::Retrieval);
        assert_eq!(classify_intent(""), Intent::Retrieval);
    }

    #[test]
    fn test_classify_intent_both_tokens_prefers_aggregation() {
        assert_eq!(
            classify_intent("retrieval or aggregation? aggregation"),
            Intent::Aggregation
        );
    }
}
