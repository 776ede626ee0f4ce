// Test doubles for the monitor's trait boundaries:
// - MockSource / FailingSource / SlowSource (ProductSource)
// - RecordingBackend / FailingBackend (NotifyBackend)
// - MemorySeenStore (SeenStore)
// - ScriptedCycle (Cycle) for driving the scheduler

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use stockwatch_common::{DedupKey, Product, SourceError};

use crate::cycle::{Cycle, CycleStats};
use crate::notify::NotifyBackend;
use crate::sources::ProductSource;
use crate::store::SeenStore;

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Returns the same product list on every call.
pub struct MockSource {
    products: Vec<Product>,
    calls: AtomicUsize,
}

impl MockSource {
    pub fn new(products: Vec<Product>) -> Self {
        Self {
            products,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProductSource for MockSource {
    async fn search(&self, _terms: &[String]) -> Result<Vec<Product>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.products.clone())
    }

    fn kind(&self) -> &'static str {
        "mock"
    }
}

/// Always fails with a network error.
pub struct FailingSource {
    message: String,
}

impl FailingSource {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl ProductSource for FailingSource {
    async fn search(&self, _terms: &[String]) -> Result<Vec<Product>, SourceError> {
        Err(SourceError::Network(self.message.clone()))
    }

    fn kind(&self) -> &'static str {
        "mock"
    }
}

/// Sleeps before answering with an empty list.
pub struct SlowSource {
    delay: Duration,
}

impl SlowSource {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl ProductSource for SlowSource {
    async fn search(&self, _terms: &[String]) -> Result<Vec<Product>, SourceError> {
        tokio::time::sleep(self.delay).await;
        Ok(Vec::new())
    }

    fn kind(&self) -> &'static str {
        "mock"
    }
}

// ---------------------------------------------------------------------------
// Notification backends
// ---------------------------------------------------------------------------

/// Records every message. Clones share the same log.
#[derive(Clone, Default)]
pub struct RecordingBackend {
    messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotifyBackend for RecordingBackend {
    async fn send(&self, text: &str) -> anyhow::Result<()> {
        self.messages.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Fails the first `fail_first` sends (or every send), recording the rest.
#[derive(Clone)]
pub struct FailingBackend {
    fail_first: Option<usize>,
    attempts: Arc<AtomicUsize>,
    delivered: Arc<Mutex<Vec<String>>>,
}

impl FailingBackend {
    pub fn always() -> Self {
        Self {
            fail_first: None,
            attempts: Arc::default(),
            delivered: Arc::default(),
        }
    }

    pub fn failing_first(n: usize) -> Self {
        Self {
            fail_first: Some(n),
            ..Self::always()
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotifyBackend for FailingBackend {
    async fn send(&self, text: &str) -> anyhow::Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        match self.fail_first {
            Some(n) if attempt >= n => {
                self.delivered.lock().unwrap().push(text.to_string());
                Ok(())
            }
            _ => bail!("transport unavailable"),
        }
    }
}

// ---------------------------------------------------------------------------
// Seen-store
// ---------------------------------------------------------------------------

/// In-memory seen-store without expiry. `broken()` fails every call.
#[derive(Default)]
pub struct MemorySeenStore {
    keys: Mutex<HashSet<DedupKey>>,
    broken: bool,
}

impl MemorySeenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Self::default()
        }
    }

    pub fn contains(&self, key: &DedupKey) -> bool {
        self.keys.lock().unwrap().contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.lock().unwrap().len()
    }
}

#[async_trait]
impl SeenStore for MemorySeenStore {
    async fn already_seen(&self, key: &DedupKey) -> Result<bool> {
        if self.broken {
            bail!("seen-store unavailable");
        }
        Ok(self.contains(key))
    }

    async fn mark_seen(&self, key: &DedupKey) -> Result<()> {
        if self.broken {
            bail!("seen-store unavailable");
        }
        self.keys.lock().unwrap().insert(key.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Cycle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub enum Step {
    Ok,
    Fail(&'static str),
    Panic,
}

/// Plays back `steps` in order, then succeeds forever.
pub struct ScriptedCycle {
    steps: Mutex<VecDeque<Step>>,
    delay: Option<Duration>,
    runs: AtomicUsize,
    finished: AtomicUsize,
}

impl ScriptedCycle {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            delay: None,
            runs: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        }
    }

    /// Make every run take `delay` before completing.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// Runs that reached the end of their delay.
    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Cycle for ScriptedCycle {
    async fn run_cycle(&self) -> Result<CycleStats> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().unwrap().pop_front().unwrap_or(Step::Ok);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.finished.fetch_add(1, Ordering::SeqCst);

        match step {
            Step::Ok => Ok(CycleStats::default()),
            Step::Fail(msg) => bail!("{msg}"),
            Step::Panic => panic!("scripted cycle panic"),
        }
    }
}
