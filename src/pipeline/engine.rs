//! DegraphEngine: the worker pool that runs changes through the pipeline
//!
//! Every change becomes a job on one shared queue. Workers take jobs in
//! order but serialize on a per-document lock, so at most one job per
//! document id runs at a time while different ids proceed in parallel.
//! Propagation schedules ordinary recompute jobs on the same queue.

use super::change::{ChangeEvent, ChangeKind};
use super::error::EngineError;
use super::sink::{IndexSink, MemoryIndexSink};
use super::stats::{DeadLetter, EngineStats, StatsSnapshot};
use crate::config::EngineConfig;
use crate::document::{Document, DocumentSource, DocumentStore};
use crate::extract::extract_subgraph;
use crate::graph::{GraphStore, NodeId, TypeKey};
use crate::propagate::{DependencyIndex, PropagationPlan, Propagator, WaveId};
use crate::rules::{RuleDescriptor, RuleRegistry, RuleStage};
use crate::walk::{CancellationToken, WalkDependency, WalkEngine};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug)]
enum Job {
    Change {
        id: NodeId,
        kind: ChangeKind,
        seq: u64,
        token: CancellationToken,
        attempt: u32,
    },
    Recompute {
        id: NodeId,
        wave: WaveId,
        depth: usize,
        attempt: u32,
    },
}

impl Job {
    fn id(&self) -> &NodeId {
        match self {
            Job::Change { id, .. } | Job::Recompute { id, .. } => id,
        }
    }

    fn attempt(&self) -> u32 {
        match self {
            Job::Change { attempt, .. } | Job::Recompute { attempt, .. } => *attempt,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Job::Change {
                kind: ChangeKind::Upsert(_),
                ..
            } => "upsert",
            Job::Change {
                kind: ChangeKind::Delete,
                ..
            } => "delete",
            Job::Recompute { .. } => "recompute",
        }
    }

    fn next_attempt(mut self) -> Self {
        match &mut self {
            Job::Change { attempt, .. } | Job::Recompute { attempt, .. } => *attempt += 1,
        }
        self
    }
}

/// A rule together with the base document filter and transform produced
/// for it; `None` means the filter rejected the document.
type Evaluated = Vec<(Arc<RuleDescriptor>, Option<Document>)>;

/// Change bookkeeping for one source document
#[derive(Debug, Default)]
struct ChangeSlot {
    /// Latest submitted sequence number
    latest: u64,
    /// Token of the latest change
    token: CancellationToken,
    /// Change jobs submitted but not yet settled
    outstanding: usize,
}

/// What a rule reload did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReloadReport {
    /// Source keys whose rules were added, removed or edited
    pub changed: Vec<TypeKey>,
    /// Stored documents queued for reprocessing under the new rules
    pub resubmitted: usize,
    /// Target documents of removed rules deleted from the sink
    pub retracted: usize,
}

struct EngineInner {
    registry: RwLock<Arc<RuleRegistry>>,
    config: EngineConfig,
    graph: Arc<GraphStore>,
    documents: Arc<DocumentStore>,
    walks: WalkEngine,
    propagator: Propagator,
    sink: Arc<dyn IndexSink>,
    sequence: AtomicU64,
    /// Pruned once a document is deleted and no newer change is pending
    changes: DashMap<NodeId, ChangeSlot>,
    /// Pruned after release when no other job holds the lock
    locks: DashMap<NodeId, Arc<Mutex<()>>>,
    /// Version of the last write per target document
    written: DashMap<NodeId, u64>,
    dead_letters: std::sync::Mutex<Vec<DeadLetter>>,
    stats: EngineStats,
    queue: mpsc::UnboundedSender<Job>,
    pending: AtomicUsize,
    idle: Notify,
}

/// Configures and starts a [`DegraphEngine`].
pub struct EngineBuilder {
    registry: RuleRegistry,
    config: EngineConfig,
    sink: Option<Arc<dyn IndexSink>>,
    graph: Option<Arc<GraphStore>>,
    documents: Option<Arc<DocumentStore>>,
}

impl EngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn sink(mut self, sink: Arc<dyn IndexSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Share an existing graph instead of starting from an empty one.
    pub fn graph(mut self, graph: Arc<GraphStore>) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn documents(mut self, documents: Arc<DocumentStore>) -> Self {
        self.documents = Some(documents);
        self
    }

    /// Spawn the worker pool on the current tokio runtime.
    pub fn start(self) -> Result<DegraphEngine, EngineError> {
        if self.registry.is_empty() {
            return Err(EngineError::NoRules);
        }
        self.config.validate()?;

        let graph = self.graph.unwrap_or_default();
        let documents = self.documents.unwrap_or_default();
        let sink = self
            .sink
            .unwrap_or_else(|| Arc::new(MemoryIndexSink::new()) as Arc<dyn IndexSink>);
        let walks = WalkEngine::new(
            graph.clone(),
            documents.clone() as Arc<dyn DocumentSource>,
            self.config.max_walk_depth,
        );
        let propagator = Propagator::new(Arc::new(DependencyIndex::new()), self.config.max_propagation_depth);
        let (queue, receiver) = mpsc::unbounded_channel();

        let inner = Arc::new(EngineInner {
            registry: RwLock::new(Arc::new(self.registry)),
            config: self.config,
            graph,
            documents,
            walks,
            propagator,
            sink,
            sequence: AtomicU64::new(0),
            changes: DashMap::new(),
            locks: DashMap::new(),
            written: DashMap::new(),
            dead_letters: std::sync::Mutex::new(Vec::new()),
            stats: EngineStats::default(),
            queue,
            pending: AtomicUsize::new(0),
            idle: Notify::new(),
        });

        let receiver = Arc::new(Mutex::new(receiver));
        let workers = (0..inner.config.workers)
            .map(|n| {
                let inner = inner.clone();
                let receiver = receiver.clone();
                tokio::spawn(async move {
                    debug!(worker = n, "worker started");
                    loop {
                        let job = { receiver.lock().await.recv().await };
                        match job {
                            Some(job) => inner.handle(job).await,
                            None => break,
                        }
                    }
                })
            })
            .collect();

        info!(
            workers = inner.config.workers,
            rules = inner.rules().len(),
            "degraph engine started"
        );
        Ok(DegraphEngine {
            inner,
            workers: std::sync::Mutex::new(workers),
        })
    }
}

/// The denormalization engine.
///
/// Changes are accepted from any task; results reach the [`IndexSink`]
/// asynchronously. Use [`drain`](Self::drain) to wait for quiescence.
pub struct DegraphEngine {
    inner: Arc<EngineInner>,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl DegraphEngine {
    pub fn builder(registry: RuleRegistry) -> EngineBuilder {
        EngineBuilder {
            registry,
            config: EngineConfig::default(),
            sink: None,
            graph: None,
            documents: None,
        }
    }

    /// Enqueue a change, returning its sequence number.
    ///
    /// A newer change for the same id supersedes any older one still
    /// queued or running.
    pub fn submit(&self, event: ChangeEvent) -> Result<u64, EngineError> {
        let inner = &self.inner;
        let token = CancellationToken::new();
        let seq = {
            let mut slot = inner.changes.entry(event.id.clone()).or_default();
            let seq = inner.sequence.fetch_add(1, Ordering::SeqCst) + 1;
            slot.latest = seq;
            slot.outstanding += 1;
            std::mem::replace(&mut slot.token, token.clone()).cancel();
            seq
        };
        EngineStats::bump(&inner.stats.submitted);
        debug!(id = %event.id, seq, "change submitted");

        inner.enqueue(Job::Change {
            id: event.id,
            kind: event.kind,
            seq,
            token,
            attempt: 0,
        })?;
        Ok(seq)
    }

    pub fn upsert(&self, id: NodeId, document: Document) -> Result<u64, EngineError> {
        self.submit(ChangeEvent::upsert(id, document))
    }

    pub fn delete(&self, id: NodeId) -> Result<u64, EngineError> {
        self.submit(ChangeEvent::delete(id))
    }

    /// Resolve once no job is queued, running or waiting for a retry.
    pub async fn drain(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.inner
            .dead_letters
            .lock()
            .map(|letters| letters.clone())
            .unwrap_or_default()
    }

    pub fn graph(&self) -> &Arc<GraphStore> {
        &self.inner.graph
    }

    pub fn documents(&self) -> &Arc<DocumentStore> {
        &self.inner.documents
    }

    pub fn dependencies(&self) -> &Arc<DependencyIndex> {
        self.inner.propagator.index()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// The rules currently in effect
    pub fn rules(&self) -> Arc<RuleRegistry> {
        self.inner.rules()
    }

    /// Swap in a new rule set while the engine runs.
    ///
    /// Targets of rules that no longer exist are deleted from the sink.
    /// Every stored document whose source key has added, removed or edited
    /// rules is resubmitted, so its graph edges and targets follow the new
    /// rules and propagation reaches the documents that walk to it.
    pub async fn reload_rules(&self, registry: RuleRegistry) -> Result<ReloadReport, EngineError> {
        if registry.is_empty() {
            return Err(EngineError::NoRules);
        }
        let inner = &self.inner;
        let previous = inner.rules();
        let retired = previous.retired_in(&registry);
        let mut report = ReloadReport {
            changed: previous.changed_sources(&registry),
            ..Default::default()
        };
        inner.swap_rules(registry);

        for (source, target) in retired {
            for id in inner.documents.ids_of(&source) {
                let target_id = id.retarget(&target);
                let lock = inner.lock_for(&id);
                {
                    let _guard = lock.lock().await;
                    inner.sink.delete(&target_id).await?;
                    inner.written.remove(&target_id);
                }
                inner.release(&id, lock);
                EngineStats::bump(&inner.stats.retracted);
                report.retracted += 1;
            }
        }

        for key in &report.changed {
            for id in inner.documents.ids_of(key) {
                if let Some(document) = inner.documents.get(&id) {
                    self.upsert(id, document)?;
                    report.resubmitted += 1;
                }
            }
        }

        info!(
            changed = report.changed.len(),
            resubmitted = report.resubmitted,
            retracted = report.retracted,
            "rules reloaded"
        );
        Ok(report)
    }

    /// Source documents with change bookkeeping still held
    pub fn tracked_ids(&self) -> usize {
        self.inner.changes.len()
    }

    /// Stop the workers. Queued jobs are dropped.
    pub fn shutdown(&self) {
        if let Ok(mut workers) = self.workers.lock() {
            for handle in workers.drain(..) {
                handle.abort();
            }
        }
        info!("degraph engine stopped");
    }
}

impl Drop for DegraphEngine {
    fn drop(&mut self) {
        if let Ok(mut workers) = self.workers.lock() {
            for handle in workers.drain(..) {
                handle.abort();
            }
        }
    }
}

impl EngineInner {
    fn enqueue(&self, job: Job) -> Result<(), EngineError> {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.queue.send(job).is_err() {
            self.finish_one();
            return Err(EngineError::ShutDown);
        }
        Ok(())
    }

    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    fn rules(&self) -> Arc<RuleRegistry> {
        match self.registry.read() {
            Ok(registry) => registry.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn swap_rules(&self, registry: RuleRegistry) {
        let registry = Arc::new(registry);
        match self.registry.write() {
            Ok(mut current) => *current = registry,
            Err(poisoned) => *poisoned.into_inner() = registry,
        }
    }

    fn lock_for(&self, id: &NodeId) -> Arc<Mutex<()>> {
        self.locks.entry(id.clone()).or_default().clone()
    }

    /// Drop a lock handle, removing the lock once nobody else holds one.
    fn release(&self, id: &NodeId, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.locks.remove_if(id, |_, lock| Arc::strong_count(lock) == 1);
    }

    fn latest_seq(&self, id: &NodeId) -> u64 {
        self.changes.get(id).map(|slot| slot.latest).unwrap_or(0)
    }

    fn token_for(&self, id: &NodeId) -> CancellationToken {
        self.changes.get(id).map(|slot| slot.token.clone()).unwrap_or_default()
    }

    /// Account for a finished change job. The slot goes away with the last
    /// job of a deleted document.
    fn settle(&self, id: &NodeId, seq: u64, deleted: bool) {
        if let Entry::Occupied(mut entry) = self.changes.entry(id.clone()) {
            let slot = entry.get_mut();
            slot.outstanding = slot.outstanding.saturating_sub(1);
            if deleted && slot.outstanding == 0 && slot.latest == seq {
                entry.remove();
            }
        }
    }

    async fn handle(self: &Arc<Self>, job: Job) {
        let id = job.id().clone();
        let change = match &job {
            Job::Change { seq, kind, .. } => Some((*seq, matches!(kind, ChangeKind::Delete))),
            Job::Recompute { .. } => None,
        };
        let lock = self.lock_for(&id);
        let result = {
            let _guard = lock.lock().await;
            self.run(&job).await
        };
        self.release(&id, lock);

        let succeeded = result.is_ok();
        let retrying = match result {
            Ok(()) => false,
            Err(EngineError::Cancelled) => {
                EngineStats::bump(&self.stats.cancelled);
                debug!(id = %id, job = job.kind(), "abandoned superseded work");
                false
            }
            Err(err) if err.is_retryable() => self.retry_or_dead_letter(job, err),
            Err(err) => {
                self.dead_letter(&job, &err);
                false
            }
        };
        if let Some((seq, delete)) = change {
            if !retrying {
                self.settle(&id, seq, delete && succeeded);
            }
        }
        self.finish_one();
    }

    async fn run(&self, job: &Job) -> Result<(), EngineError> {
        match job {
            Job::Change {
                id,
                kind: ChangeKind::Upsert(document),
                seq,
                token,
                ..
            } => self.process_upsert(id, document, *seq, token).await,
            Job::Change {
                id,
                kind: ChangeKind::Delete,
                seq,
                ..
            } => self.process_delete(id, *seq).await,
            Job::Recompute { id, wave, depth, .. } => self.process_recompute(id, *wave, *depth).await,
        }
    }

    /// Requeue `job` after a delay, or dead-letter it once retries are
    /// exhausted. Returns true when the job was requeued.
    fn retry_or_dead_letter(self: &Arc<Self>, job: Job, err: EngineError) -> bool {
        if let EngineError::Rule { .. } = err {
            EngineStats::bump(&self.stats.rule_failures);
        }
        if job.attempt() >= self.config.sink.max_retries {
            self.dead_letter(&job, &err);
            return false;
        }

        let job = job.next_attempt();
        let delay = self.config.sink.delay_for(job.attempt());
        warn!(
            id = %job.id(),
            job = job.kind(),
            attempt = job.attempt(),
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "retrying after failure"
        );
        EngineStats::bump(&self.stats.retries);

        self.pending.fetch_add(1, Ordering::SeqCst);
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(mpsc::error::SendError(job)) = inner.queue.send(job) {
                warn!(id = %job.id(), "engine stopped before retry could be queued");
                inner.finish_one();
            }
        });
        true
    }

    fn dead_letter(&self, job: &Job, err: &EngineError) {
        error!(
            id = %job.id(),
            job = job.kind(),
            attempts = job.attempt() + 1,
            error = %err,
            "giving up, event needs manual intervention"
        );
        EngineStats::bump(&self.stats.dead_lettered);
        if let Ok(mut letters) = self.dead_letters.lock() {
            letters.push(DeadLetter {
                id: job.id().clone(),
                job: job.kind(),
                attempts: job.attempt() + 1,
                reason: err.to_string(),
                failed_at: Utc::now(),
            });
        }
    }

    /// Filter and transform `document` for every rule, failing on the first
    /// rule error.
    fn evaluate(&self, document: &Document, rules: &[Arc<RuleDescriptor>]) -> Result<Evaluated, EngineError> {
        rules
            .iter()
            .map(|rule| {
                if !rule.accepts(document) {
                    return Ok((rule.clone(), None));
                }
                let base = rule
                    .transform(document)
                    .map_err(|source| EngineError::rule(rule, RuleStage::Transform, source))?;
                Ok((rule.clone(), Some(base)))
            })
            .collect()
    }

    #[instrument(skip_all, fields(id = %id, seq = seq))]
    async fn process_upsert(
        &self,
        id: &NodeId,
        document: &Document,
        seq: u64,
        token: &CancellationToken,
    ) -> Result<(), EngineError> {
        if self.latest_seq(id) > seq {
            EngineStats::bump(&self.stats.superseded);
            debug!("skipping superseded version");
            return Ok(());
        }
        token.check()?;

        let registry = self.rules();
        let rules = registry.rules_for(&id.type_key());
        let subgraph = extract_subgraph(id, document, rules)?;
        let evaluated = self.evaluate(document, rules)?;

        let content_changed = self.documents.put(id.clone(), document.clone());
        let events = self.graph.commit(subgraph)?;
        if content_changed || !events.is_empty() {
            let plan = self.propagator.plan(id, &events);
            self.schedule(plan);
        }

        self.publish(id, evaluated, token, seq).await?;
        EngineStats::bump(&self.stats.processed);
        info!(rules = rules.len(), graph_events = events.len(), "document processed");
        Ok(())
    }

    #[instrument(skip_all, fields(id = %id, seq = seq))]
    async fn process_delete(&self, id: &NodeId, seq: u64) -> Result<(), EngineError> {
        if self.latest_seq(id) > seq {
            EngineStats::bump(&self.stats.superseded);
            return Ok(());
        }

        let events = self.graph.delete_owned(id)?;
        let removed = self.documents.remove(id).is_some();
        if removed || !events.is_empty() {
            let plan = self.propagator.plan(id, &events);
            self.schedule(plan);
        }
        self.propagator.index().clear_walker(id);

        for rule in self.rules().rules_for(&id.type_key()) {
            let target = id.retarget(rule.target());
            if self.claim_write(&target, seq) {
                self.sink.delete(&target).await?;
                self.written.remove(&target);
                EngineStats::bump(&self.stats.retracted);
            }
        }
        EngineStats::bump(&self.stats.deleted);
        info!(graph_events = events.len(), "document deleted");
        Ok(())
    }

    #[instrument(skip_all, fields(id = %id, wave = %wave, depth = depth))]
    async fn process_recompute(&self, id: &NodeId, wave: WaveId, depth: usize) -> Result<(), EngineError> {
        let Some(document) = self.documents.get(id) else {
            debug!("document gone, nothing to recompute");
            return Ok(());
        };
        let registry = self.rules();
        let rules = registry.rules_for(&id.type_key());
        if rules.is_empty() {
            return Ok(());
        }
        let token = self.token_for(id);
        let evaluated = self.evaluate(&document, rules)?;
        self.publish(id, evaluated, &token, self.latest_seq(id)).await?;
        EngineStats::bump(&self.stats.recomputed);
        debug!("recomputed");
        Ok(())
    }

    /// Walk, assemble and write every target document of `id`.
    ///
    /// Nothing is written if the token is cancelled before the writes start.
    async fn publish(
        &self,
        id: &NodeId,
        evaluated: Evaluated,
        token: &CancellationToken,
        version: u64,
    ) -> Result<(), EngineError> {
        let mut outputs = Vec::with_capacity(evaluated.len());
        let mut dependencies = Vec::new();
        // Reads become visible as they happen, so a change landing while
        // the reducers run still plans a recompute of `id`.
        let index = self.propagator.index();
        let watch = |dependency: &WalkDependency| index.watch(id, dependency);

        for (rule, base) in evaluated {
            let target = id.retarget(rule.target());
            let Some(mut document) = base else {
                outputs.push((target, None));
                continue;
            };

            let walked = self.walks.run_watched(id, rule.walks(), token, &watch)?;
            self.stats.record_walk(&walked.stats);
            EngineStats::add(&self.stats.reduce_failures, walked.failures.len());
            if let Some(fields) = document.as_object_mut() {
                fields.extend(walked.properties);
            }
            dependencies.extend(walked.dependencies);
            outputs.push((target, Some(document)));
        }

        token.check()?;
        index.record(id, &dependencies);

        for (target, document) in outputs {
            if !self.claim_write(&target, version) {
                EngineStats::bump(&self.stats.stale_writes);
                continue;
            }
            match document {
                Some(document) => {
                    self.sink.upsert(&target, document).await?;
                    EngineStats::bump(&self.stats.written);
                }
                None => {
                    self.sink.delete(&target).await?;
                    EngineStats::bump(&self.stats.retracted);
                }
            }
        }
        Ok(())
    }

    /// Last-write-wins guard: true unless a newer version already wrote `target`.
    fn claim_write(&self, target: &NodeId, version: u64) -> bool {
        match self.written.entry(target.clone()) {
            Entry::Occupied(mut entry) => {
                if *entry.get() > version {
                    return false;
                }
                entry.insert(version);
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(version);
                true
            }
        }
    }

    fn schedule(&self, plan: PropagationPlan) {
        if plan.truncated {
            EngineStats::bump(&self.stats.propagation_truncated);
        }
        if plan.is_empty() {
            return;
        }
        EngineStats::bump(&self.stats.waves);
        debug!(origin = %plan.origin, wave = %plan.wave, targets = plan.targets.len(), "scheduling recomputes");
        for target in plan.targets {
            let job = Job::Recompute {
                id: target.id,
                wave: plan.wave,
                depth: target.depth,
                attempt: 0,
            };
            if let Err(err) = self.enqueue(job) {
                warn!(error = %err, "dropping recompute");
            }
        }
    }
}
