//! Deterministic n-gram embedding provider.

use crate::embeddings::provider::EmbeddingProvider;
use coursemate_core::AppResult;
use std::collections::HashMap;

/// Offline provider for tests and development.
///
/// Each whitespace token contributes its character bigrams and the whole
/// token, hashed into a fixed number of buckets. Hangul words are short, so
/// bigrams carry most of the signal. The result is unit length, or all zeros
/// for text without tokens.
#[derive(Debug)]
pub struct MockProvider {
    dimensions: usize,
}

impl MockProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn bucket(&self, feature: &str, seed: u64) -> usize {
        // FNV-1a
        let hash = feature.bytes().fold(seed ^ 0xcbf2_9ce4_8422_2325, |acc, b| {
            (acc ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01b3)
        });
        (hash % self.dimensions as u64) as usize
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; self.dimensions];

        let mut counts: HashMap<String, u32> = HashMap::new();
        for token in text
            .split(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
            .filter(|t| !t.is_empty())
        {
            *counts.entry(token.to_lowercase()).or_insert(0) += 1;
        }

        for (token, count) in &counts {
            let weight = (*count as f32).sqrt();
            let chars: Vec<char> = token.chars().collect();

            for pair in chars.windows(2) {
                let bigram: String = pair.iter().collect();
                embedding[self.bucket(&bigram, 1)] += weight;
            }
            embedding[self.bucket(token, 2)] += weight * 2.0;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut embedding {
                *v /= norm;
            }
        }

        embedding
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for MockProvider {
    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model_name(&self) -> &str {
        "ngram-v1"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.vectorize(text)).collect())
    }
}
