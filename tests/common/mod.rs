#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use object_store::memory::InMemory;

use parlance::{
    ChatFlow, CommitConfig, GenerationError, GenerationRequest, Generator, ObjectSessionStore,
    SessionId, SessionState, SessionStore, SessionVersion, StoreError, VersionedState,
};

/// A generator that answers "Arr! <prompt>" and records every request.
///
/// Scripted replies, when queued, are returned first.
#[derive(Default)]
pub struct PirateGenerator {
    scripted: Mutex<VecDeque<Result<String, GenerationError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
    delay: Option<Duration>,
}

impl PirateGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait `delay` before answering, to widen race windows
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn push_reply(&self, reply: Result<String, GenerationError>) {
        self.scripted.lock().unwrap().push_back(reply);
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn reply_for(prompt: &str) -> String {
        format!("Arr! {}", prompt)
    }
}

#[async_trait]
impl Generator for PirateGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.scripted.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(Self::reply_for(&request.prompt)))
    }

    fn name(&self) -> &str {
        "pirate"
    }
}

/// Wraps a store and injects failures on demand.
pub struct FaultyStore {
    inner: Arc<dyn SessionStore>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn SessionStore>) -> Self {
        Self {
            inner,
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Successful and failed write attempts so far
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_write(&self, id: &SessionId) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable(id.as_str(), "simulated outage"));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FaultyStore {
    async fn get(&self, id: &SessionId) -> Result<Option<VersionedState>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable(id.as_str(), "permission denied"));
        }
        self.inner.get(id).await
    }

    async fn save(
        &self,
        id: &SessionId,
        state: &SessionState,
    ) -> Result<SessionVersion, StoreError> {
        self.check_write(id)?;
        self.inner.save(id, state).await
    }

    async fn save_if(
        &self,
        id: &SessionId,
        state: &SessionState,
        expected: Option<&SessionVersion>,
    ) -> Result<SessionVersion, StoreError> {
        self.check_write(id)?;
        self.inner.save_if(id, state, expected).await
    }

    fn name(&self) -> &str {
        "faulty"
    }
}

/// Deletes the whole record the first time an update is attempted against
/// an existing version, and reports that write as a conflict.
pub struct VanishingStore {
    inner: Mutex<Arc<dyn SessionStore>>,
    vanished: AtomicBool,
}

impl VanishingStore {
    pub fn new(inner: Arc<dyn SessionStore>) -> Self {
        Self {
            inner: Mutex::new(inner),
            vanished: AtomicBool::new(false),
        }
    }

    pub fn vanished(&self) -> bool {
        self.vanished.load(Ordering::SeqCst)
    }

    fn current(&self) -> Arc<dyn SessionStore> {
        Arc::clone(&self.inner.lock().unwrap())
    }
}

#[async_trait]
impl SessionStore for VanishingStore {
    async fn get(&self, id: &SessionId) -> Result<Option<VersionedState>, StoreError> {
        self.current().get(id).await
    }

    async fn save(
        &self,
        id: &SessionId,
        state: &SessionState,
    ) -> Result<SessionVersion, StoreError> {
        self.current().save(id, state).await
    }

    async fn save_if(
        &self,
        id: &SessionId,
        state: &SessionState,
        expected: Option<&SessionVersion>,
    ) -> Result<SessionVersion, StoreError> {
        if expected.is_some() && !self.vanished.swap(true, Ordering::SeqCst) {
            // Swap in an empty backend: the record is gone for every reader
            *self.inner.lock().unwrap() = memory_store();
            return Err(StoreError::Conflict {
                key: id.to_string(),
            });
        }
        self.current().save_if(id, state, expected).await
    }

    fn name(&self) -> &str {
        "vanishing"
    }
}

pub fn memory_store() -> Arc<dyn SessionStore> {
    Arc::new(ObjectSessionStore::new(Arc::new(InMemory::new())))
}

/// A flow over `store` and `generator` with default commit settings
pub fn flow_with(store: Arc<dyn SessionStore>, generator: Arc<PirateGenerator>) -> ChatFlow {
    flow_with_commit(store, generator, CommitConfig::default())
}

pub fn flow_with_commit(
    store: Arc<dyn SessionStore>,
    generator: Arc<PirateGenerator>,
    commit: CommitConfig,
) -> ChatFlow {
    ChatFlow::builder()
        .shared_store(store)
        .shared_generator(generator)
        .system_instruction("talk like a pirate")
        .commit(commit)
        .build()
        .expect("build flow")
}
