//! In-memory knowledge base over extracted articles.
//!
//! [`build`] embeds every record that has both a title and a link, in
//! batches with a fixed pause between them, and [`KnowledgeBase::top_k`] ranks
//! entries by cosine similarity to a query vector.

use crate::api::{Embed, Purpose};
use crate::config::KnowledgeConfig;
use crate::error::IndexingError;
use crate::models::{ArticleRecord, KnowledgeEntry};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::cmp::Ordering;
use tokio::time::sleep;
use tracing::{debug, info, instrument};

/// Embedded articles for the current session.
///
/// Every vector has the same dimension; [`build`] refuses provider output
/// that breaks this.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    entries: Vec<KnowledgeEntry>,
}

impl KnowledgeBase {
    #[cfg(test)]
    pub fn entries(&self) -> &[KnowledgeEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Vector length shared by every entry, `None` when empty.
    pub fn dimension(&self) -> Option<usize> {
        self.entries.first().map(|e| e.vector.len())
    }

    /// Indices and scores of the `k` entries most similar to `query`, best
    /// first. Ties keep index order. Entries whose similarity is undefined
    /// rank last.
    pub fn top_k(&self, query: &[f32], k: usize) -> Vec<(usize, f64)> {
        let mut scored: Vec<(usize, Option<f64>)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(query, &e.vector)))
            .collect();

        // stable sort: equal scores stay in index order
        scored.sort_by(|a, b| match (a.1, b.1) {
            (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });

        scored
            .into_iter()
            .take(k)
            .map(|(i, s)| (i, s.unwrap_or(f64::NEG_INFINITY)))
            .collect()
    }

    /// Content blobs of the `k` best matches, separated by `---` lines.
    /// Empty when the knowledge base is empty.
    pub fn context_for(&self, query: &[f32], k: usize) -> String {
        self.top_k(query, k)
            .into_iter()
            .map(|(i, _)| self.entries[i].content.as_str())
            .collect::<Vec<_>>()
            .join("\n---\n")
    }
}

/// `dot(a, b) / (|a| * |b|)`.
///
/// `None` when the lengths differ, either vector is empty, or either norm
/// is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f64::EPSILON {
        return None;
    }
    Some((dot / denom).clamp(-1.0, 1.0))
}

/// Embed `records` into a fresh knowledge base.
///
/// Records lacking a title or a link are skipped; if none remain the result
/// is an empty knowledge base. Batches run one after another with
/// `batch_pause` between them.
///
/// # Arguments
///
/// * `embedder` - Embedding service, called with [`Purpose::Document`]
/// * `records` - Extracted records, in page order
/// * `config` - Batch size and the pause between batches
///
/// # Returns
///
/// One entry per indexable record, in input order.
///
/// # Errors
///
/// The provider's error, or a count/dimension mismatch in its replies. No
/// partial knowledge base is returned.
#[instrument(level = "info", skip_all, fields(records = records.len()))]
pub async fn build<E: Embed>(
    embedder: &E,
    records: &[ArticleRecord],
    config: &KnowledgeConfig,
) -> Result<KnowledgeBase, IndexingError> {
    let contents: Vec<String> = records
        .iter()
        .filter(|r| r.is_indexable())
        .map(ArticleRecord::knowledge_content)
        .collect();

    if contents.is_empty() {
        info!("No records with both title and link; knowledge base is empty");
        return Ok(KnowledgeBase::default());
    }

    let batch_size = config.batch_size.max(1);
    let batch_count = contents.len().div_ceil(batch_size);
    let pause = config.batch_pause();

    let batches: Vec<Vec<Vec<f32>>> = stream::iter(contents.chunks(batch_size).enumerate())
        .then(|(i, batch)| async move {
            if i > 0 {
                sleep(pause).await;
            }
            let vectors = embedder.embed_batch(batch, Purpose::Document).await?;
            if vectors.len() != batch.len() {
                return Err(IndexingError::CountMismatch {
                    expected: batch.len(),
                    actual: vectors.len(),
                });
            }
            debug!(batch = i + 1, of = batch_count, size = batch.len(), "Embedded batch");
            Ok(vectors)
        })
        .try_collect()
        .await?;

    let mut entries = Vec::with_capacity(contents.len());
    let mut dimension: Option<usize> = None;
    for (content, vector) in contents.into_iter().zip(batches.into_iter().flatten()) {
        let expected = *dimension.get_or_insert(vector.len());
        if vector.len() != expected {
            return Err(IndexingError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
        entries.push(KnowledgeEntry { content, vector });
    }

    info!(entries = entries.len(), batches = batch_count, dimension = ?dimension, "Built knowledge base");
    Ok(KnowledgeBase { entries })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::KeywordEmbedder;

    fn record(title: Option<&str>, link: Option<&str>) -> ArticleRecord {
        ArticleRecord {
            title: title.map(String::from),
            link: link.map(String::from),
            description: None,
        }
    }

    fn kb(vectors: Vec<Vec<f32>>) -> KnowledgeBase {
        KnowledgeBase {
            entries: vectors
                .into_iter()
                .enumerate()
                .map(|(i, vector)| KnowledgeEntry {
                    content: format!("entry {i}"),
                    vector,
                })
                .collect(),
        }
    }

    fn fast() -> KnowledgeConfig {
        KnowledgeConfig {
            batch_size: 100,
            batch_pause_ms: 0,
            top_k: 7,
        }
    }

    #[test]
    fn test_cosine_self_similarity_is_one() {
        let a = [0.3f32, -1.2, 4.0];
        let s = cosine_similarity(&a, &a).unwrap();
        assert!((s - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_bounds() {
        let pairs: [(&[f32], &[f32]); 4] = [
            (&[1.0, 0.0], &[-1.0, 0.0]),
            (&[1.0, 2.0, 3.0], &[-3.0, 0.5, 9.0]),
            (&[1e-3, 1e-3], &[1e3, -1e3]),
            (&[5.0, 5.0], &[5.0, 5.0]),
        ];
        for (a, b) in pairs {
            let s = cosine_similarity(a, b).unwrap();
            assert!((-1.0..=1.0).contains(&s), "{s} out of range");
        }
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]).unwrap() + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_undefined_cases() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), None);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), None);
        assert_eq!(cosine_similarity(&[], &[]), None);
    }

    #[test]
    fn test_top_k_ranks_descending() {
        let base = kb(vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![0.7, 0.7]]);
        let ranked: Vec<usize> = base.top_k(&[1.0, 0.0], 2).into_iter().map(|(i, _)| i).collect();
        assert_eq!(ranked, vec![1, 2]);
    }

    #[test]
    fn test_top_k_is_deterministic_with_ties() {
        let base = kb(vec![
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![2.0, 0.0],
            vec![0.0, 0.0],
            vec![3.0, 0.0],
        ]);
        let query = [1.0, 0.0];
        let first: Vec<usize> = base.top_k(&query, 5).into_iter().map(|(i, _)| i).collect();
        // 0, 2 and 4 tie at 1.0; zero vector ranks last
        assert_eq!(first, vec![0, 2, 4, 1, 3]);
        for _ in 0..10 {
            let again: Vec<usize> = base.top_k(&query, 5).into_iter().map(|(i, _)| i).collect();
            assert_eq!(again, first);
        }
    }

    #[test]
    fn test_context_for_joins_blobs() {
        let base = kb(vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        assert_eq!(base.context_for(&[0.0, 1.0], 2), "entry 1\n---\nentry 0");
        assert_eq!(KnowledgeBase::default().context_for(&[1.0], 7), "");
    }

    #[tokio::test]
    async fn test_build_filters_to_title_and_link() {
        let embedder = KeywordEmbedder::new(Vec::new(), vec![1.0, 0.0]);
        let records = vec![
            record(Some("A"), Some("u1")),
            record(None, Some("u2")),
            record(Some("C"), None),
        ];
        let base = build(&embedder, &records, &fast()).await.unwrap();
        assert_eq!(base.len(), 1);
        assert!(base.entries()[0].content.starts_with("Title: A"));
        assert!(base.entries()[0].content.ends_with("Link: u1"));
        assert_eq!(embedder.purposes.borrow()[0], Purpose::Document);
    }

    #[tokio::test]
    async fn test_build_with_nothing_indexable_skips_provider() {
        let embedder = KeywordEmbedder::failing();
        let base = build(&embedder, &[record(None, None)], &fast()).await.unwrap();
        assert!(base.is_empty());
        assert_eq!(embedder.batch_calls.get(), 0);
    }

    #[tokio::test]
    async fn test_build_batches_preserve_order() {
        let embedder = KeywordEmbedder::new(
            vec![("Title: 0\n", vec![0.0, 1.0]), ("Title: 4\n", vec![1.0, 1.0])],
            vec![1.0, 0.0],
        );
        let records: Vec<ArticleRecord> = (0..5)
            .map(|i| record(Some(&i.to_string()), Some(&format!("https://x.test/{i}"))))
            .collect();
        let config = KnowledgeConfig {
            batch_size: 2,
            ..fast()
        };
        let base = build(&embedder, &records, &config).await.unwrap();
        assert_eq!(embedder.batch_calls.get(), 3);
        assert_eq!(base.len(), 5);
        assert_eq!(base.entries()[0].vector, vec![0.0, 1.0]);
        assert_eq!(base.entries()[4].vector, vec![1.0, 1.0]);
        assert!(base.entries()[3].content.contains("https://x.test/3"));
        assert_eq!(base.dimension(), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_build_pauses_between_batches() {
        let embedder = KeywordEmbedder::new(Vec::new(), vec![1.0]);
        let records: Vec<ArticleRecord> = (0..3)
            .map(|i| record(Some("t"), Some(&format!("u{i}"))))
            .collect();
        let config = KnowledgeConfig {
            batch_size: 1,
            batch_pause_ms: 1000,
            top_k: 7,
        };
        let t0 = tokio::time::Instant::now();
        build(&embedder, &records, &config).await.unwrap();
        // two pauses for three batches, none after the last
        assert_eq!(t0.elapsed(), std::time::Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_build_surfaces_provider_error() {
        let embedder = KeywordEmbedder::failing();
        let err = build(&embedder, &[record(Some("A"), Some("u1"))], &fast())
            .await
            .unwrap_err();
        assert!(matches!(err, IndexingError::Provider(_)));
    }

    #[tokio::test]
    async fn test_build_rejects_mixed_dimensions() {
        let embedder = KeywordEmbedder::new(vec![("Title: B", vec![1.0, 0.0, 0.0])], vec![1.0, 0.0]);
        let records = vec![record(Some("A"), Some("u1")), record(Some("B"), Some("u2"))];
        let err = build(&embedder, &records, &fast()).await.unwrap_err();
        assert!(matches!(
            err,
            IndexingError::DimensionMismatch { expected: 2, actual: 3 }
        ));
    }
}
