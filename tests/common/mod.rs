//! Deterministic collaborators shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use metarag::errors::{RagError, Result};
use metarag::filter::FilterPredicate;
use metarag::providers::{EmbeddingProvider, HashingEmbedder, TextCompletionProvider};
use metarag::store::{IndexStatus, InMemoryVectorStore, UpsertBatch, VectorStoreGateway};
use metarag::types::QueryResult;

/// Completion provider replaying canned replies in order
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl ScriptedCompletion {
    pub fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
            delay: None,
        })
    }

    /// Every reply arrives after `delay`
    pub fn slow(replies: &[&str], delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
            delay: Some(delay),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextCompletionProvider for ScriptedCompletion {
    fn model_id(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| RagError::external("scripted", "no reply left"))
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Fault {
    None,
    DropLast,
    NanLast,
}

/// Hashing embedder that counts calls and can corrupt its output on purpose
pub struct CountingEmbedder {
    inner: HashingEmbedder,
    calls: AtomicUsize,
    fault: Fault,
}

impl CountingEmbedder {
    pub fn new(dimension: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: HashingEmbedder::new(dimension),
            calls: AtomicUsize::new(0),
            fault: Fault::None,
        })
    }

    /// Returns one vector fewer than requested
    pub fn miscounting(dimension: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: HashingEmbedder::new(dimension),
            calls: AtomicUsize::new(0),
            fault: Fault::DropLast,
        })
    }

    /// Puts a NaN into the last vector
    pub fn nan_emitting(dimension: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: HashingEmbedder::new(dimension),
            calls: AtomicUsize::new(0),
            fault: Fault::NanLast,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for CountingEmbedder {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut vectors = self.inner.embed_batch(texts).await?;
        match self.fault {
            Fault::None => {}
            Fault::DropLast => {
                vectors.pop();
            }
            Fault::NanLast => {
                if let Some(last) = vectors.last_mut() {
                    last[0] = f32::NAN;
                }
            }
        }
        Ok(vectors)
    }
}

/// In-memory store that counts upsert calls
#[derive(Default)]
pub struct CountingStore {
    pub inner: InMemoryVectorStore,
    upserts: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn upserts(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorStoreGateway for CountingStore {
    fn backend(&self) -> &'static str {
        "counting"
    }

    async fn create_index(&self, name: &str, dimension: usize) -> Result<IndexStatus> {
        self.inner.create_index(name, dimension).await
    }

    async fn upsert(&self, index: &str, batch: UpsertBatch) -> Result<()> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert(index, batch).await
    }

    async fn query(
        &self,
        index: &str,
        vector: &[f32],
        filter: Option<&FilterPredicate>,
        top_k: usize,
    ) -> Result<Vec<QueryResult>> {
        self.inner.query(index, vector, filter, top_k).await
    }

    async fn count(&self, index: &str) -> Result<usize> {
        self.inner.count(index).await
    }
}
