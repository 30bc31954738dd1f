use async_trait::async_trait;

use crate::embed::EmbeddingProvider;
use crate::error::Result;
use crate::rerank::tokenize;

pub const DEFAULT_HASH_DIM: usize = 768;

/// Offline bag-of-words embedding: FNV-1a hashes each lowercase token into a
/// bucket and L2-normalises the counts.
#[derive(Debug, Clone)]
pub struct HashEmbeddingProvider {
    dim: usize,
    name: String,
}

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(FNV_OFFSET_BASIS, |h, b| (h ^ u64::from(*b)).wrapping_mul(FNV_PRIME))
}

impl HashEmbeddingProvider {
    pub fn new(dim: usize) -> Self {
        let dim = dim.max(8);
        Self {
            dim,
            name: format!("hash-{dim}"),
        }
    }

    fn bucket(&self, token: &str) -> usize {
        (fnv1a(token.as_bytes()) % self.dim as u64) as usize
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut counts = vec![0.0f32; self.dim];
        for token in tokenize(text) {
            counts[self.bucket(&token)] += 1.0;
        }

        let norm = counts.iter().map(|c| c * c).sum::<f32>().sqrt();
        if norm > 0.0 {
            counts.iter_mut().for_each(|c| *c /= norm);
        }
        counts
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_DIM)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    fn dimensions(&self) -> usize {
        self.dim
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}
