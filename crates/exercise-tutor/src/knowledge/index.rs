//! TF-IDF vector index over corpus chunks, persisted with bincode.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::corpus::Chunk;
use crate::error::{TutorError, TutorResult};
use crate::utils::TextUtils;

pub const INDEX_FILE_NAME: &str = "index.bin";
const FORMAT_VERSION: u32 = 1;

/// Sparse unit vector: `(term_id, weight)` sorted by term id.
type SparseVector = Vec<(u32, f32)>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeIndex {
    format_version: u32,
    chunks: Vec<Chunk>,
    vocabulary: HashMap<String, u32>,
    idf: Vec<f32>,
    vectors: Vec<SparseVector>,
}

/// One retrieved chunk with its cosine score against the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

impl KnowledgeIndex {
    /// Fit vocabulary and IDF weights over `chunks` and vectorize each one.
    pub fn build(chunks: Vec<Chunk>) -> Self {
        let tokenized: Vec<Vec<String>> = chunks.iter().map(|c| TextUtils::index_terms(&c.text)).collect();

        let mut vocabulary: HashMap<String, u32> = HashMap::new();
        let mut doc_freq: Vec<u32> = Vec::new();
        for terms in &tokenized {
            let mut seen: Vec<u32> = Vec::new();
            for term in terms {
                let next_id = vocabulary.len() as u32;
                let id = *vocabulary.entry(term.clone()).or_insert(next_id);
                if id as usize == doc_freq.len() {
                    doc_freq.push(0);
                }
                if !seen.contains(&id) {
                    seen.push(id);
                    doc_freq[id as usize] += 1;
                }
            }
        }

        // Smoothed idf: ln((1 + n) / (1 + df)) + 1
        let n = tokenized.len() as f32;
        let idf: Vec<f32> = doc_freq
            .iter()
            .map(|&df| ((1.0 + n) / (1.0 + df as f32)).ln() + 1.0)
            .collect();

        let mut index = Self {
            format_version: FORMAT_VERSION,
            chunks,
            vocabulary,
            idf,
            vectors: Vec::new(),
        };
        let vectors = tokenized.iter().map(|terms| index.vectorize(terms)).collect();
        index.vectors = vectors;
        info!(
            "Built knowledge index: {} chunks, {} terms",
            index.chunks.len(),
            index.vocabulary.len()
        );
        index
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    fn vectorize(&self, terms: &[String]) -> SparseVector {
        let mut counts: HashMap<u32, f32> = HashMap::new();
        for term in terms {
            if let Some(&id) = self.vocabulary.get(term) {
                *counts.entry(id).or_insert(0.0) += 1.0;
            }
        }

        let mut vector: SparseVector = counts
            .into_iter()
            .map(|(id, tf)| (id, tf * self.idf[id as usize]))
            .collect();
        vector.sort_by_key(|(id, _)| *id);

        let norm = vector.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
        if norm > 0.0 {
            for (_, w) in vector.iter_mut() {
                *w /= norm;
            }
        }
        vector
    }

    /// Top `k` chunks by cosine similarity to `query`, best first.
    ///
    /// Chunks with zero overlap are never returned. Ties keep corpus order.
    pub fn retrieve(&self, query: &str, k: usize) -> Vec<ScoredChunk> {
        let query_vector = self.vectorize(&TextUtils::index_terms(query));
        if query_vector.is_empty() || k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, sparse_dot(&query_vector, v)))
            .filter(|(_, score)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        debug!("Retrieved {} chunks for query", scored.len());
        scored
            .into_iter()
            .map(|(i, score)| ScoredChunk {
                chunk: self.chunks[i].clone(),
                score,
            })
            .collect()
    }

    pub fn index_path(dir: &Path) -> PathBuf {
        dir.join(INDEX_FILE_NAME)
    }

    /// Write the index to `<dir>/index.bin`, creating `dir` if needed.
    pub fn persist(&self, dir: &Path) -> TutorResult<()> {
        fs::create_dir_all(dir)
            .map_err(|e| TutorError::IndexFormat(format!("cannot create {}: {}", dir.display(), e)))?;
        let bytes = bincode::serialize(self).map_err(|e| TutorError::IndexFormat(e.to_string()))?;
        let path = Self::index_path(dir);
        let tmp = path.with_extension("bin.tmp");
        fs::write(&tmp, bytes)
            .and_then(|_| fs::rename(&tmp, &path))
            .map_err(|e| TutorError::IndexFormat(format!("cannot write {}: {}", path.display(), e)))?;
        info!("Persisted knowledge index to {}", path.display());
        Ok(())
    }

    pub fn load(dir: &Path) -> TutorResult<Self> {
        let path = Self::index_path(dir);
        let bytes = fs::read(&path)
            .map_err(|e| TutorError::IndexFormat(format!("cannot read {}: {}", path.display(), e)))?;
        let index: Self = bincode::deserialize(&bytes)
            .map_err(|e| TutorError::IndexFormat(format!("{}: {}", path.display(), e)))?;
        if index.format_version != FORMAT_VERSION {
            return Err(TutorError::IndexFormat(format!(
                "{}: unsupported format version {}",
                path.display(),
                index.format_version
            )));
        }
        if index.vectors.len() != index.chunks.len() || index.idf.len() != index.vocabulary.len() {
            return Err(TutorError::IndexFormat(format!("{}: inconsistent index", path.display())));
        }
        info!("Loaded knowledge index from {} ({} chunks)", path.display(), index.len());
        Ok(index)
    }
}

fn sparse_dot(a: &[(u32, f32)], b: &[(u32, f32)]) -> f32 {
    let (mut i, mut j, mut sum) = (0, 0, 0.0);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                sum += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    sum
}
