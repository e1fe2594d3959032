//! Local hashed n-gram embedding
//!
//! A deterministic, training-free embedding computed in-process:
//! - No network, no model download, no rate limit
//! - Deterministic (same input → same output, across runs and machines)
//! - Subword-aware: "containers" and "container" share features
//!
//! Algorithm:
//! 1. Tokenize into lowercase words and strip common suffixes
//! 2. Project each token and its character trigrams onto signed hash buckets;
//!    stopwords contribute only a down-weighted whole-word feature
//! 3. Sum token vectors and L2 normalize

use async_trait::async_trait;

use super::EmbeddingProvider;
use crate::core::hash::Fnv64;
use crate::error::{Result, SearchError};

/// Default embedding dimension.
pub const DEFAULT_DIMENSION: usize = 768;

/// Model identifier, part of the provider tag. Bump when the algorithm changes.
pub const MODEL_VERSION: &str = "hash-ngram-v2";

const MIN_DIMENSION: usize = 8;
const MAX_DIMENSION: usize = 65_536;

/// Maximum token length (Unicode code points)
const MAX_TOKEN_LENGTH: usize = 64;

/// Weight of the subword features relative to the whole-token feature.
const SUBWORD_WEIGHT: f64 = 0.5;

/// Weight of a stopword. Non-zero so text made only of stopwords
/// ("How to") still has a direction and matches itself.
const STOPWORD_WEIGHT: f64 = 0.25;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "can", "do", "does", "for", "from",
    "how", "i", "if", "in", "into", "is", "it", "its", "me", "my", "of", "on", "or", "our", "so",
    "that", "the", "their", "then", "there", "these", "this", "to", "was", "we", "what", "when",
    "where", "which", "who", "why", "will", "with", "you", "your",
];

/// Hashed n-gram embedding model.
#[derive(Debug, Clone)]
pub struct HashedNgramModel {
    dimension: usize,
}

impl HashedNgramModel {
    pub fn new(dimension: usize) -> Result<Self> {
        if !(MIN_DIMENSION..=MAX_DIMENSION).contains(&dimension) {
            return Err(SearchError::ModelLoadError(format!(
                "dimension {} outside supported range {}..={}",
                dimension, MIN_DIMENSION, MAX_DIMENSION
            )));
        }
        Ok(Self { dimension })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Generate embedding for a single text.
    ///
    /// Text with no alphanumeric tokens yields the zero vector.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut sum = vec![0.0f64; self.dimension];

        for token in tokenize(text) {
            if token.stopword {
                self.add_feature(&mut sum, "w", &token.text, STOPWORD_WEIGHT);
                continue;
            }
            self.add_feature(&mut sum, "w", &token.text, 1.0);

            let grams = trigrams(&token.text);
            if grams.is_empty() {
                continue;
            }
            let weight = SUBWORD_WEIGHT / grams.len() as f64;
            for gram in &grams {
                self.add_feature(&mut sum, "g", gram, weight);
            }
        }

        // L2 normalize and convert to f32
        let norm: f64 = sum.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm > 0.0 {
            sum.iter().map(|x| (*x / norm) as f32).collect()
        } else {
            vec![0.0; self.dimension]
        }
    }

    /// Signed feature hashing: one bucket per feature, sign from a second bit
    /// so collisions cancel out on average instead of accumulating.
    fn add_feature(&self, acc: &mut [f64], namespace: &str, feature: &str, weight: f64) {
        let mut h = Fnv64::new();
        h.write_field(namespace);
        h.write_field(feature);
        let hash = h.finish();

        let bucket = (hash % self.dimension as u64) as usize;
        let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
        acc[bucket] += sign * weight;
    }
}

/// Embedding provider running [`HashedNgramModel`] in-process.
#[derive(Debug, Clone)]
pub struct LocalProvider {
    model: HashedNgramModel,
    tag: String,
}

impl LocalProvider {
    pub fn new(dimension: usize) -> Result<Self> {
        let model = HashedNgramModel::new(dimension)?;
        Ok(Self {
            tag: format!("local:{}:{}", MODEL_VERSION, dimension),
            model,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.model.embed(text))
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.model.embed(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.model.dimension()
    }

    fn provider_tag(&self) -> &str {
        &self.tag
    }
}

struct Token {
    text: String,
    stopword: bool,
}

/// Split into lowercase words, dropping punctuation.
fn tokenize(text: &str) -> Vec<Token> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .map(|s| {
            if STOPWORDS.contains(&s.as_str()) {
                Token { text: s, stopword: true }
            } else {
                Token {
                    text: stem(&s.chars().take(MAX_TOKEN_LENGTH).collect::<String>()),
                    stopword: false,
                }
            }
        })
        .collect()
}

/// Strip a handful of English inflections.
fn stem(token: &str) -> String {
    let len = token.chars().count();
    if len >= 6 && token.ends_with("ing") {
        return token[..token.len() - 3].to_string();
    }
    if len >= 5 && token.ends_with("ed") {
        return token[..token.len() - 2].to_string();
    }
    if len >= 4 && token.ends_with('s') && !token.ends_with("ss") {
        return token[..token.len() - 1].to_string();
    }
    token.to_string()
}

/// Character trigrams of the token padded with boundary markers.
fn trigrams(token: &str) -> Vec<String> {
    let chars: Vec<char> = std::iter::once('<')
        .chain(token.chars())
        .chain(std::iter::once('>'))
        .collect();
    chars.windows(3).map(|w| w.iter().collect()).collect()
}
