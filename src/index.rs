//! Brute-force cosine index over candidate embeddings, persisted as JSON Lines.
//!
//! File layout: one header line, then one `{record, embedding}` object per
//! line. Saves go through a temp file and a rename so a crash never leaves a
//! half-written index behind.

use std::cmp::Ordering;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::embed::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::model::{CandidateRecord, ScoredCandidate};
use crate::retrieval::cosine_similarity;

const INDEX_FORMAT: &str = "hireflow-index";
const INDEX_VERSION: u32 = 1;

#[derive(Debug, Clone)]
pub struct IndexedRecord {
    pub record: Arc<CandidateRecord>,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexHeader {
    format: String,
    version: u32,
    dimension: usize,
    embedding_model: String,
    record_count: usize,
}

#[derive(Serialize)]
struct RecordLineRef<'a> {
    record: &'a CandidateRecord,
    embedding: &'a [f32],
}

#[derive(Deserialize)]
struct RecordLine {
    record: CandidateRecord,
    embedding: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimension: usize,
    embedding_model: String,
    entries: Vec<IndexedRecord>,
}

impl VectorIndex {
    pub fn empty(dimension: usize, embedding_model: impl Into<String>) -> Self {
        Self {
            dimension,
            embedding_model: embedding_model.into(),
            entries: Vec::new(),
        }
    }

    /// Embed every record and index it. Record ids must be unique.
    pub async fn build<E>(records: Vec<CandidateRecord>, embedder: &E) -> Result<Self>
    where
        E: EmbeddingProvider + ?Sized,
    {
        let mut index = Self::empty(embedder.dimensions(), embedder.model_name());
        if records.is_empty() {
            return Ok(index);
        }

        let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
        let embeddings = embedder.embed_batch(&texts).await?;
        if embeddings.len() != records.len() {
            return Err(RagError::Embedding(format!(
                "provider returned {} embeddings for {} records",
                embeddings.len(),
                records.len()
            )));
        }

        for (record, embedding) in records.into_iter().zip(embeddings) {
            index.insert(record, embedding)?;
        }
        tracing::info!(
            "Built vector index: {} record(s), dimension {}, model {}",
            index.len(),
            index.dimension,
            index.embedding_model
        );
        Ok(index)
    }

    pub fn insert(&mut self, record: CandidateRecord, embedding: Vec<f32>) -> Result<()> {
        if embedding.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        if self.entries.iter().any(|e| e.record.id == record.id) {
            return Err(RagError::InvalidArgument(format!(
                "duplicate record id '{}'",
                record.id
            )));
        }
        self.entries.push(IndexedRecord {
            record: Arc::new(record),
            embedding,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    pub fn records(&self) -> impl Iterator<Item = &Arc<CandidateRecord>> {
        self.entries.iter().map(|e| &e.record)
    }

    /// Top `k` records by cosine similarity, descending; ties broken by id.
    pub fn query(&self, query_embedding: &[f32], k: usize) -> Result<Vec<ScoredCandidate>> {
        if self.entries.is_empty() {
            return Err(RagError::EmptyIndex);
        }
        if query_embedding.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: query_embedding.len(),
            });
        }

        let mut scored: Vec<(&IndexedRecord, f32)> = self
            .entries
            .iter()
            .map(|entry| (entry, cosine_similarity(query_embedding, &entry.embedding)))
            .collect();

        scored.sort_by(|a, b| match b.1.total_cmp(&a.1) {
            Ordering::Equal => a.0.record.id.cmp(&b.0.record.id),
            other => other,
        });

        Ok(scored
            .into_iter()
            .take(k)
            .enumerate()
            .map(|(i, (entry, similarity))| ScoredCandidate {
                record: Arc::clone(&entry.record),
                similarity,
                score: similarity,
                rank: i + 1,
            })
            .collect())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = temp_path(path);

        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            let header = IndexHeader {
                format: INDEX_FORMAT.to_string(),
                version: INDEX_VERSION,
                dimension: self.dimension,
                embedding_model: self.embedding_model.clone(),
                record_count: self.entries.len(),
            };
            serde_json::to_writer(&mut writer, &header)?;
            writer.write_all(b"\n")?;

            for entry in &self.entries {
                let line = RecordLineRef {
                    record: &entry.record,
                    embedding: &entry.embedding,
                };
                serde_json::to_writer(&mut writer, &line)?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }

        fs::rename(&tmp_path, path)?;
        tracing::info!(
            "Saved index ({} records) to {}",
            self.entries.len(),
            path.display()
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let not_found = |reason: String| RagError::IndexNotFound {
            path: path.to_path_buf(),
            reason,
        };

        let file = File::open(path).map_err(|e| not_found(e.to_string()))?;
        let mut lines = BufReader::new(file).lines();

        let header_line = lines
            .next()
            .ok_or_else(|| not_found("file is empty".to_string()))?
            .map_err(|e| not_found(e.to_string()))?;
        let header: IndexHeader =
            serde_json::from_str(&header_line).map_err(|e| not_found(format!("bad header: {e}")))?;
        if header.format != INDEX_FORMAT || header.version != INDEX_VERSION {
            return Err(not_found(format!(
                "unsupported format {} v{}",
                header.format, header.version
            )));
        }

        let mut index = Self::empty(header.dimension, header.embedding_model);
        for (lineno, line) in lines.enumerate() {
            let line = line.map_err(|e| not_found(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            let parsed: RecordLine = serde_json::from_str(&line)
                .map_err(|e| not_found(format!("bad record on line {}: {e}", lineno + 2)))?;
            index
                .insert(parsed.record, parsed.embedding)
                .map_err(|e| not_found(format!("line {}: {e}", lineno + 2)))?;
        }

        if index.len() != header.record_count {
            return Err(not_found(format!(
                "header promises {} records, found {}",
                header.record_count,
                index.len()
            )));
        }
        tracing::info!("Loaded index ({} records) from {}", index.len(), path.display());
        Ok(index)
    }

    /// Like `load`, but an index built by a different embedding model is
    /// reported as not found so callers rebuild it.
    pub fn load_compatible<E>(path: &Path, embedder: &E) -> Result<Self>
    where
        E: EmbeddingProvider + ?Sized,
    {
        let index = Self::load(path)?;
        if index.embedding_model != embedder.model_name() || index.dimension != embedder.dimensions()
        {
            return Err(RagError::IndexNotFound {
                path: path.to_path_buf(),
                reason: format!(
                    "built with {} ({} dims), current embedder is {} ({} dims)",
                    index.embedding_model,
                    index.dimension,
                    embedder.model_name(),
                    embedder.dimensions()
                ),
            });
        }
        Ok(index)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|f| f.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Shared handle to the live index. Readers take a snapshot `Arc`; a rebuild
/// swaps in a complete new index, so no reader ever sees a partial one.
#[derive(Debug, Clone)]
pub struct IndexHandle {
    inner: Arc<RwLock<Arc<VectorIndex>>>,
}

impl IndexHandle {
    pub fn new(index: VectorIndex) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(index))),
        }
    }

    pub fn snapshot(&self) -> Arc<VectorIndex> {
        match self.inner.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replace the live index and return the previous one.
    pub fn swap(&self, index: VectorIndex) -> Arc<VectorIndex> {
        let next = Arc::new(index);
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, next)
    }
}
