//! Offline feature-hashing embedder.
//!
//! Each token is hashed (SHA-256) into one of `dims` buckets with a sign
//! taken from the same digest, then the vector is L2-normalized. Texts that
//! share vocabulary land close together. No network, no model files, fully
//! deterministic across runs and platforms, which makes it the embedder of
//! choice for tests and air-gapped installs.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::tokenize::tokenize;

use super::Embedder;

pub struct HashingEmbedder {
    dims: usize,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let slot = (u64::from_le_bytes(bucket) % self.dims as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            v[slot] += sign;
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        "hashing"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
