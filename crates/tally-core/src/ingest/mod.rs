//! Incremental ingestion and the batched commit protocol.
//!
//! `ingest` and `uningest` only map and queue. `commit` drains the retraction
//! queue and retracts from stored aggregates, then drains the ingest queue and
//! reduces into them. Every changed bucket is forwarded into the chained stage
//! before the store and the chain are committed.
//!
//! A failing key fails the cycle but not its neighbours: buckets that were
//! written still reach the chain, and a failed retraction phase leaves the
//! ingest queue untouched for the next cycle.

mod flight;


use crate::{
    config::EngineConfig,
    error::InternalError,
    key::Key,
    mapreduce::{KEY_FIELD, Pipeline, Stage},
    obs::{KeyOutcome, MetricsEvent, SinkRef, global_sink},
    store::{StoreRef, named_child},
    value::Document,
};
use std::{
    collections::BTreeMap,
    mem,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};
use tracing::{debug, warn};

// re-exports
pub use flight::{Flight, FlightGuard, SingleFlight};

type Groups = BTreeMap<Key, Vec<Document>>;

///
/// Queues
///

#[derive(Debug, Default)]
struct Queues {
    reduce: Vec<(Key, Document)>,
    unreduce: Vec<(Key, Document)>,
}

impl Queues {
    fn len(&self) -> usize {
        self.reduce.len() + self.unreduce.len()
    }
}

///
/// Change
/// One bucket rewritten by a commit phase, as seen by the chained stage.
///

#[derive(Debug)]
struct Change {
    key: Key,
    old: Option<Document>,
    new: Document,
}

///
/// Phase
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Phase {
    Unreduce,
    Reduce,
}

impl Phase {
    const fn label(self) -> &'static str {
        match self {
            Self::Unreduce => "unreduce",
            Self::Reduce => "reduce",
        }
    }
}

///
/// DataIngestor
///
/// Maintains the aggregates of one pipeline stage in one store scope, plus a
/// nested ingestor for the chained stage under the configured child scope.
/// Cloning is cheap and clones share all state.
///

#[derive(Clone)]
pub struct DataIngestor {
    inner: Arc<IngestorInner>,
}

struct IngestorInner {
    stage: Stage,
    store: StoreRef,
    config: EngineConfig,
    sink: SinkRef,
    auto_commit: bool,
    queues: Mutex<Queues>,
    flight: SingleFlight,
    background_pending: AtomicBool,
    chain: Option<DataIngestor>,
}

impl DataIngestor {
    /// Ingestor for `pipeline` reporting to the process-wide metrics sink.
    pub fn new(
        store: StoreRef,
        pipeline: &Pipeline,
        config: EngineConfig,
    ) -> Result<Self, InternalError> {
        Self::with_sink(store, pipeline, config, global_sink())
    }

    pub fn with_sink(
        store: StoreRef,
        pipeline: &Pipeline,
        config: EngineConfig,
        sink: SinkRef,
    ) -> Result<Self, InternalError> {
        config.validate()?;

        Self::for_stage(store, pipeline.root(), config, sink, true)
    }

    // Chained ingestors never schedule their own commits.
    fn for_stage(
        store: StoreRef,
        stage: &Stage,
        config: EngineConfig,
        sink: SinkRef,
        auto_commit: bool,
    ) -> Result<Self, InternalError> {
        let chain = match stage.chain() {
            Some(next) => {
                let chain_store = named_child(store.as_ref(), &config.chain_store)?;
                Some(Self::for_stage(
                    chain_store,
                    next,
                    config.clone(),
                    Arc::clone(&sink),
                    false,
                )?)
            }
            None => None,
        };

        Ok(Self {
            inner: Arc::new(IngestorInner {
                stage: stage.clone(),
                store,
                config,
                sink,
                auto_commit,
                queues: Mutex::new(Queues::default()),
                flight: SingleFlight::new(),
                background_pending: AtomicBool::new(false),
                chain,
            }),
        })
    }

    /// Store scope holding this stage's buckets.
    #[must_use]
    pub fn store(&self) -> &StoreRef {
        &self.inner.store
    }

    /// Ingestor of the chained stage, if any.
    #[must_use]
    pub fn chain(&self) -> Option<&Self> {
        self.inner.chain.as_ref()
    }

    /// Store scope holding the final stage's buckets (the query results).
    #[must_use]
    pub fn final_store(&self) -> &StoreRef {
        self.chain().map_or(&self.inner.store, Self::final_store)
    }

    /// Entries waiting in both queues.
    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.queues().len()
    }

    /// Map `doc` and queue it for reduction.
    pub fn ingest(&self, doc: &Document) {
        self.enqueue(doc, Phase::Reduce);
    }

    /// Map `doc` and queue it for retraction.
    pub fn uningest(&self, doc: &Document) {
        self.enqueue(doc, Phase::Unreduce);
    }

    /// Run commit cycles until every entry queued before this call is stored.
    ///
    /// If a cycle is already running, waits for it and surfaces its failure;
    /// on success re-checks the queues and leads another cycle if needed.
    pub fn commit(&self) -> Result<(), InternalError> {
        loop {
            match self.inner.flight.begin() {
                Flight::Leader(guard) => return guard.finish(self.run_cycle()),
                Flight::Joined(outcome) => {
                    outcome?;
                    if self.queued_len() == 0 {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn queues(&self) -> MutexGuard<'_, Queues> {
        self.inner
            .queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, event: MetricsEvent) {
        self.inner.sink.record(event);
    }

    fn enqueue(&self, doc: &Document, phase: Phase) {
        let Some(entry) = self.inner.stage.map(doc) else {
            self.record(MetricsEvent::DocRejected);
            return;
        };

        let queued = {
            let mut queues = self.queues();
            match phase {
                Phase::Reduce => queues.reduce.push(entry),
                Phase::Unreduce => queues.unreduce.push(entry),
            }
            queues.len()
        };
        self.record(MetricsEvent::DocQueued {
            retract: phase == Phase::Unreduce,
        });

        self.maybe_schedule(queued);
    }

    // Fire-and-forget commit once the queues reach the threshold.
    fn maybe_schedule(&self, queued: usize) {
        let config = &self.inner.config;
        if !self.inner.auto_commit
            || config.auto_commit_disabled()
            || queued < config.commit_threshold
        {
            return;
        }
        if self.inner.background_pending.swap(true, Ordering::AcqRel) {
            return;
        }

        let this = self.clone();
        let spawned = thread::Builder::new()
            .name("tally-commit".to_string())
            .spawn(move || {
                let outcome = this.commit();
                this.inner.background_pending.store(false, Ordering::Release);
                if let Err(err) = outcome {
                    warn!(error = %err.display_with_class(), "background commit failed");
                }
            });

        if let Err(err) = spawned {
            self.inner
                .background_pending
                .store(false, Ordering::Release);
            warn!(error = %err, "failed to spawn background commit");
        }
    }

    fn run_cycle(&self) -> Result<(), InternalError> {
        self.record(MetricsEvent::CommitStart);

        let outcome = self.run_phases();
        match &outcome {
            Ok(keys_touched) => self.record(MetricsEvent::CommitFinish {
                keys_touched: *keys_touched,
            }),
            Err(_) => self.record(MetricsEvent::CommitFailed),
        }

        outcome.map(|_| ())
    }

    fn run_phases(&self) -> Result<u64, InternalError> {
        let mut touched = 0;
        for phase in [Phase::Unreduce, Phase::Reduce] {
            // Each queue drains when its phase starts, so a failed retraction
            // phase leaves queued ingests for the next cycle.
            let entries = {
                let mut queues = self.queues();
                match phase {
                    Phase::Unreduce => mem::take(&mut queues.unreduce),
                    Phase::Reduce => mem::take(&mut queues.reduce),
                }
            };
            if entries.is_empty() {
                continue;
            }

            let groups = group_by_key(entries);
            debug!(
                phase = phase.label(),
                keys = groups.len(),
                depth = self.inner.stage.depth(),
                "commit phase"
            );

            let (changes, failed) = self.process_groups(phase, groups);
            touched += changes.len() as u64;

            // Written buckets reach the chain even when other keys failed.
            self.forward(&changes);
            if let Some(err) = failed {
                self.settle_chain();
                return Err(err);
            }
        }

        self.inner.store.commit()?;
        if let Some(chain) = self.chain() {
            chain.commit()?;
        }

        Ok(touched)
    }

    // Best-effort chain commit after a failed phase; the phase error wins.
    fn settle_chain(&self) {
        let Some(chain) = self.chain() else {
            return;
        };
        if let Err(err) = chain.commit() {
            warn!(error = %err.display_with_class(), "chain commit after failed phase");
        }
    }

    // Spread key groups over the configured workers by stable key hash.
    // Returns every change that was written plus the first failure, if any.
    fn process_groups(&self, phase: Phase, groups: Groups) -> (Vec<Change>, Option<InternalError>) {
        let workers = self.inner.config.commit_workers.max(1);
        if workers == 1 || groups.len() <= 1 {
            return self.process_partition(phase, groups.into_iter().collect());
        }

        let mut partitions: Vec<Vec<(Key, Vec<Document>)>> = vec![Vec::new(); workers];
        for (key, docs) in groups {
            let slot = usize::try_from(key.stable_hash() % workers as u64).unwrap_or(0);
            partitions[slot].push((key, docs));
        }

        thread::scope(|scope| {
            let handles = partitions
                .into_iter()
                .filter(|partition| !partition.is_empty())
                .map(|partition| scope.spawn(move || self.process_partition(phase, partition)))
                .collect::<Vec<_>>();

            let mut changes = Vec::new();
            let mut first_err = None;
            for handle in handles {
                match handle.join() {
                    Ok((mut part, failed)) => {
                        changes.append(&mut part);
                        if let Some(err) = failed {
                            first_err.get_or_insert(err);
                        }
                    }
                    Err(_) => {
                        first_err.get_or_insert_with(|| {
                            InternalError::ingest_internal("commit worker panicked")
                        });
                    }
                }
            }

            (changes, first_err)
        })
    }

    // Keys are independent, so one failing key does not stop the rest.
    fn process_partition(
        &self,
        phase: Phase,
        partition: Vec<(Key, Vec<Document>)>,
    ) -> (Vec<Change>, Option<InternalError>) {
        let mut changes = Vec::with_capacity(partition.len());
        let mut first_err = None;
        for (key, docs) in partition {
            let outcome = match phase {
                Phase::Unreduce => self.unreduce_group(key, &docs),
                Phase::Reduce => self.reduce_group(key, &docs),
            };
            match outcome {
                Ok(change) => changes.extend(change),
                Err(err) => {
                    first_err.get_or_insert(err);
                }
            }
        }

        (changes, first_err)
    }

    fn unreduce_group(&self, key: Key, docs: &[Document]) -> Result<Option<Change>, InternalError> {
        let store = &self.inner.store;
        let Some(stored) = store.get_value(&key)? else {
            warn!(key = %key, docs = docs.len(), "retraction skipped: no stored aggregate");
            self.record(MetricsEvent::Key {
                outcome: KeyOutcome::Skipped,
            });
            return Ok(None);
        };

        let mut updated = stored.clone();
        self.inner.stage.unreduce(&mut updated, docs);
        store.set_value(&key, Some(&updated))?;
        self.record(MetricsEvent::Key {
            outcome: KeyOutcome::Unreduced,
        });

        Ok(Some(Change {
            key,
            old: Some(stored),
            new: updated,
        }))
    }

    fn reduce_group(&self, key: Key, docs: &[Document]) -> Result<Option<Change>, InternalError> {
        let stage = &self.inner.stage;
        let store = &self.inner.store;
        let Some(candidate) = stage.reduce(docs) else {
            return Ok(None);
        };

        let Some(existing) = store.get_value(&key)? else {
            store.set_value(&key, Some(&candidate))?;
            self.record(MetricsEvent::Key {
                outcome: KeyOutcome::Inserted,
            });

            return Ok(Some(Change {
                key,
                old: None,
                new: candidate,
            }));
        };

        let Some(merged) = stage.rereduce(&[existing.clone(), candidate]) else {
            return Ok(None);
        };
        store.set_value(&key, Some(&merged))?;
        self.record(MetricsEvent::Key {
            outcome: KeyOutcome::Merged,
        });

        Ok(Some(Change {
            key,
            old: Some(existing),
            new: merged,
        }))
    }

    // The chain sees each rewrite as "remove old contribution, add new".
    fn forward(&self, changes: &[Change]) {
        let Some(chain) = self.chain() else {
            return;
        };

        let mut forwarded = 0_u64;
        for change in changes {
            if let Some(old) = &change.old {
                chain.uningest(&tagged(old, &change.key));
                forwarded += 1;
            }
            chain.ingest(&tagged(&change.new, &change.key));
            forwarded += 1;
        }

        self.record(MetricsEvent::ChainForward { docs: forwarded });
    }
}

fn group_by_key(entries: Vec<(Key, Document)>) -> Groups {
    let mut groups = Groups::new();
    for (key, doc) in entries {
        groups.entry(key).or_default().push(doc);
    }

    groups
}

fn tagged(doc: &Document, key: &Key) -> Document {
    doc.clone().with(KEY_FIELD, key.to_value())
}
