//! Knowledge index gateway
//!
//! Builds the retrieval index from the corpus or loads a persisted copy,
//! exactly once per process, then answers messages by retrieving the most
//! similar chunks and streaming a grounded reply from the chat backend.
pub mod corpus;
pub mod index;

pub use corpus::{Chunk, Document, MAX_CHUNK_CHARS};
pub use index::{KnowledgeIndex, ScoredChunk};

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::error::{TutorError, TutorResult};
use crate::llm_client::{ChatBackend, FragmentStream};
use crate::message::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayState {
    Uninitialized,
    /// No persisted index; reading the corpus and building one.
    Building,
    /// Persisted index found; deserializing it.
    Loading,
    Ready,
}

/// How the ready index came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrigin {
    Built,
    Loaded,
}

pub struct KnowledgeGateway {
    corpus_dir: PathBuf,
    index_dir: PathBuf,
    top_k: usize,
    backend: Arc<dyn ChatBackend>,
    state: Mutex<GatewayState>,
    index: OnceCell<(Arc<KnowledgeIndex>, IndexOrigin)>,
}

impl KnowledgeGateway {
    pub fn new(
        corpus_dir: impl Into<PathBuf>,
        index_dir: impl Into<PathBuf>,
        top_k: usize,
        backend: Arc<dyn ChatBackend>,
    ) -> Self {
        Self {
            corpus_dir: corpus_dir.into(),
            index_dir: index_dir.into(),
            top_k,
            backend,
            state: Mutex::new(GatewayState::Uninitialized),
            index: OnceCell::new(),
        }
    }

    pub fn state(&self) -> GatewayState {
        self.state.lock().map(|s| *s).unwrap_or(GatewayState::Uninitialized)
    }

    /// `None` until the index is ready.
    pub fn origin(&self) -> Option<IndexOrigin> {
        self.index.get().map(|(_, origin)| *origin)
    }

    fn set_state(&self, state: GatewayState) {
        if let Ok(mut current) = self.state.lock() {
            *current = state;
        }
    }

    /// Bring the index to `Ready`, building or loading it on first call.
    ///
    /// Concurrent first callers wait on the same initialization. A failed
    /// attempt leaves the gateway `Uninitialized`.
    pub async fn ready(&self) -> TutorResult<Arc<KnowledgeIndex>> {
        let (index, _) = self
            .index
            .get_or_try_init(|| async {
                let result = self.initialize().await;
                self.set_state(match result {
                    Ok(_) => GatewayState::Ready,
                    Err(_) => GatewayState::Uninitialized,
                });
                result
            })
            .await?;
        Ok(Arc::clone(index))
    }

    async fn initialize(&self) -> TutorResult<(Arc<KnowledgeIndex>, IndexOrigin)> {
        if self.index_dir.exists() {
            self.set_state(GatewayState::Loading);
            info!("Loading knowledge index from {}", self.index_dir.display());
            let index_dir = self.index_dir.clone();
            match run_blocking(move || KnowledgeIndex::load(&index_dir)).await {
                Ok(index) => return Ok((Arc::new(index), IndexOrigin::Loaded)),
                Err(e) if self.corpus_dir.is_dir() => {
                    warn!("Persisted index unusable ({}), rebuilding from corpus", e);
                }
                Err(e) => {
                    warn!("Persisted index unusable: {}", e);
                    return Err(self.corpus_unavailable());
                }
            }
        }

        self.set_state(GatewayState::Building);
        info!("Building knowledge index from {}", self.corpus_dir.display());
        let corpus_dir = self.corpus_dir.clone();
        let index_dir = self.index_dir.clone();
        let built = run_blocking(move || build_from_corpus(&corpus_dir, &index_dir)).await?;
        match built {
            Some(index) => Ok((Arc::new(index), IndexOrigin::Built)),
            None => Err(self.corpus_unavailable()),
        }
    }

    fn corpus_unavailable(&self) -> TutorError {
        TutorError::CorpusUnavailable {
            corpus_dir: self.corpus_dir.clone(),
            index_dir: self.index_dir.clone(),
        }
    }

    /// Stream an answer to `message`, grounded on retrieved chunks and `context`.
    pub async fn answer(&self, message: &str, context: &[Message]) -> TutorResult<FragmentStream> {
        let index = self.ready().await?;
        let hits = index.retrieve(message, self.top_k);

        let mut messages = Vec::with_capacity(context.len() + 2);
        messages.push(Message::system(grounding_prompt(&hits)));
        messages.extend(context.iter().cloned());
        messages.push(Message::user(message));

        self.backend.stream_chat(messages).await
    }
}

/// `None` when the corpus has no readable documents.
fn build_from_corpus(corpus_dir: &Path, index_dir: &Path) -> TutorResult<Option<KnowledgeIndex>> {
    let documents = match corpus::load_documents(corpus_dir) {
        Ok(documents) if !documents.is_empty() => documents,
        Ok(_) => return Ok(None),
        Err(e) => {
            warn!("Cannot read corpus at {}: {}", corpus_dir.display(), e);
            return Ok(None);
        }
    };

    let chunks: Vec<Chunk> = documents
        .iter()
        .flat_map(|d| corpus::chunk_document(d, MAX_CHUNK_CHARS))
        .collect();
    info!("Loaded {} documents ({} chunks)", documents.len(), chunks.len());

    let index = KnowledgeIndex::build(chunks);
    index.persist(index_dir)?;
    Ok(Some(index))
}

async fn run_blocking<T, F>(f: F) -> TutorResult<T>
where
    F: FnOnce() -> TutorResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TutorError::IndexFormat(format!("index task failed: {}", e)))?
}

fn grounding_prompt(hits: &[ScoredChunk]) -> String {
    if hits.is_empty() {
        return "No reference material matched this request. Answer from general programming knowledge."
            .to_string();
    }
    let material = hits
        .iter()
        .map(|h| format!("[{}]\n{}", h.chunk.source, h.chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Reference material is below.\n---------------------\n{}\n---------------------\n\
         Use the reference material where it helps to answer.",
        material
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::ScriptedBackend;
    use crate::message::Role;
    use futures_util::StreamExt;
    use std::fs;

    fn write_corpus(dir: &Path) {
        fs::create_dir_all(dir).unwrap();
        fs::write(
            dir.join("strings.md"),
            "Use str.split(':') to separate minutes from seconds.\n\nStrip whitespace first.",
        )
        .unwrap();
        fs::write(dir.join("numbers.md"), "float() turns text such as '2.5' into a number.").unwrap();
    }

    fn gateway(root: &Path, backend: Arc<ScriptedBackend>) -> KnowledgeGateway {
        KnowledgeGateway::new(root.join("data"), root.join("storage"), 2, backend)
    }

    #[tokio::test]
    async fn test_builds_once_and_persists_when_storage_absent() {
        let root = tempfile::tempdir().unwrap();
        write_corpus(&root.path().join("data"));
        let gw = gateway(root.path(), Arc::new(ScriptedBackend::new(&[])));
        assert_eq!(gw.state(), GatewayState::Uninitialized);

        let first = gw.ready().await.unwrap();
        let second = gw.ready().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(gw.state(), GatewayState::Ready);
        assert_eq!(gw.origin(), Some(IndexOrigin::Built));
        assert!(root.path().join("storage").join(index::INDEX_FILE_NAME).exists());
    }

    #[tokio::test]
    async fn test_loads_persisted_index_without_corpus() {
        let root = tempfile::tempdir().unwrap();
        write_corpus(&root.path().join("data"));
        gateway(root.path(), Arc::new(ScriptedBackend::new(&[]))).ready().await.unwrap();
        fs::remove_dir_all(root.path().join("data")).unwrap();

        let gw = gateway(root.path(), Arc::new(ScriptedBackend::new(&[])));
        let index = gw.ready().await.unwrap();

        assert_eq!(gw.origin(), Some(IndexOrigin::Loaded));
        assert_eq!(index.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_first_callers_share_one_index() {
        let root = tempfile::tempdir().unwrap();
        write_corpus(&root.path().join("data"));
        let gw = Arc::new(gateway(root.path(), Arc::new(ScriptedBackend::new(&[]))));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let gw = gw.clone();
                tokio::spawn(async move { gw.ready().await.unwrap() })
            })
            .collect();
        let mut indexes = Vec::new();
        for handle in handles {
            indexes.push(handle.await.unwrap());
        }
        assert!(indexes.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn test_corpus_unavailable_when_nothing_on_disk() {
        let root = tempfile::tempdir().unwrap();
        let gw = gateway(root.path(), Arc::new(ScriptedBackend::new(&[])));

        let err = gw.ready().await.unwrap_err();
        assert!(matches!(err, TutorError::CorpusUnavailable { .. }));
        assert_eq!(gw.state(), GatewayState::Uninitialized);
    }

    #[tokio::test]
    async fn test_corrupt_index_falls_back_to_build() {
        let root = tempfile::tempdir().unwrap();
        write_corpus(&root.path().join("data"));
        fs::create_dir_all(root.path().join("storage")).unwrap();
        fs::write(root.path().join("storage").join(index::INDEX_FILE_NAME), b"junk").unwrap();

        let gw = gateway(root.path(), Arc::new(ScriptedBackend::new(&[])));
        gw.ready().await.unwrap();
        assert_eq!(gw.origin(), Some(IndexOrigin::Built));
    }

    #[tokio::test]
    async fn test_answer_orders_grounding_context_then_message() {
        let root = tempfile::tempdir().unwrap();
        write_corpus(&root.path().join("data"));
        let backend = Arc::new(ScriptedBackend::new(&["Try ", "split."]));
        let gw = gateway(root.path(), backend.clone());

        let context = vec![Message::assistant("earlier hint")];
        let mut stream = gw.answer("how to split minutes and seconds", &context).await.unwrap();
        let mut text = String::new();
        while let Some(fragment) = stream.next().await {
            text.push_str(&fragment.unwrap());
        }
        assert_eq!(text, "Try split.");

        let sent = backend.received.lock().unwrap();
        let roles: Vec<Role> = sent[0].iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::Assistant, Role::User]);
        assert!(sent[0][0].content.contains("strings.md"));
        assert_eq!(sent[0][2].content, "how to split minutes and seconds");
    }
}
