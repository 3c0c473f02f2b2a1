//! Engine context and named aggregations.
//!
//! Layout inside the engine's store:
//!
//! ```text
//! [name]               root stage buckets
//! [name] / ["chain"]   chained stages (nested)
//! [name] / ["events"]  raw event log
//! ```


use crate::error::{Error, ErrorKind, ErrorOrigin, QueryErrorKind};
use tally_core::{
    config::EngineConfig,
    ingest::DataIngestor,
    key::{Key, KeyPart},
    mapreduce::Pipeline,
    obs::{SinkRef, global_sink},
    query::{QueryExpr, QueryResults, compile},
    store::{KeyValueStore, MemoryStore, StoreRef, named_child},
    value::{Document, Value},
};
use tracing::debug;

///
/// CONSTANTS
///

/// Child scope of an aggregation that holds its raw event log.
pub const EVENT_LOG_STORE: &str = "events";

///
/// Engine
///
/// Binds a store, a config and a metrics sink. Aggregations opened from the
/// same engine share the store but live in disjoint child scopes.
///

#[derive(Clone)]
pub struct Engine {
    store: StoreRef,
    config: EngineConfig,
    sink: SinkRef,
}

impl Engine {
    /// Engine over a fresh in-memory store with default config.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::shared())
    }

    #[must_use]
    pub fn new(store: StoreRef) -> Self {
        Self {
            store,
            config: EngineConfig::default(),
            sink: global_sink(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: SinkRef) -> Self {
        self.sink = sink;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub const fn store(&self) -> &StoreRef {
        &self.store
    }

    /// Open (or reopen) the aggregation stored under `name`.
    pub fn aggregation(&self, name: &str, query: &QueryExpr) -> Result<Aggregation, Error> {
        self.config.validate()?;
        if self.config.chain_store == EVENT_LOG_STORE {
            return Err(Error::new(
                ErrorKind::Config,
                ErrorOrigin::Config,
                format!("chain_store must not be '{EVENT_LOG_STORE}'"),
            ));
        }

        let pipeline = compile(query)?;
        let ingestor = self.open_ingestor(name, &pipeline)?;
        debug!(
            aggregation = name,
            stages = pipeline.stages().count(),
            "aggregation opened"
        );

        Ok(Aggregation {
            engine: self.clone(),
            name: name.to_string(),
            pipeline,
            ingestor,
        })
    }

    fn scope(&self, name: &str) -> Result<StoreRef, Error> {
        Ok(named_child(self.store.as_ref(), name)?)
    }

    fn open_ingestor(&self, name: &str, pipeline: &Pipeline) -> Result<DataIngestor, Error> {
        let ingestor = DataIngestor::with_sink(
            self.scope(name)?,
            pipeline,
            self.config.clone(),
            self.sink.clone(),
        )?;

        Ok(ingestor)
    }
}

///
/// Aggregation
///
/// One compiled query maintained in its own store scope.
///

pub struct Aggregation {
    engine: Engine,
    name: String,
    pipeline: Pipeline,
    ingestor: DataIngestor,
}

impl Aggregation {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    #[must_use]
    pub const fn ingestor(&self) -> &DataIngestor {
        &self.ingestor
    }

    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.ingestor.queued_len()
    }

    pub fn ingest(&self, doc: &Document) {
        self.ingestor.ingest(doc);
    }

    pub fn uningest(&self, doc: &Document) {
        self.ingestor.uningest(doc);
    }

    /// Blocks until everything queued before the call is stored.
    pub fn commit(&self) -> Result<(), Error> {
        Ok(self.ingestor.commit()?)
    }

    /// Final result rows, in store order.
    pub fn results(&self) -> Result<QueryResults, Error> {
        let scan = self.ingestor.final_store().enumerate_all_values()?;

        Ok(QueryResults::new(scan))
    }

    /// Root-stage buckets whose index values begin with `prefix`.
    ///
    /// Rows still carry every breakdown column, so `lookup_index(&["Click"])`
    /// on an `IndexedBy("Type")` aggregation yields one row per remaining
    /// bucket of Click events.
    pub fn lookup_index(&self, prefix: &[Value]) -> Result<QueryResults, Error> {
        if !self.pipeline.is_indexed() {
            return Err(Error::new(
                ErrorKind::Query(QueryErrorKind::Unsupported),
                ErrorOrigin::Query,
                format!("aggregation '{}' has no IndexedBy", self.name),
            ));
        }

        let prefix = prefix
            .iter()
            .map(KeyPart::from_scalar)
            .collect::<Option<Key>>()
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::Query(QueryErrorKind::Invalid),
                    ErrorOrigin::Query,
                    "index lookups take text or numeric values only",
                )
            })?;

        let scan = self
            .ingestor
            .store()
            .enumerate_values_beginning_with_key(&prefix)?;

        Ok(QueryResults::new(scan))
    }

    /// Append `doc` to the event log, then ingest it. Returns the log marker.
    pub fn record_event(&self, doc: &Document) -> Result<i64, Error> {
        let marker = self.event_log()?.append_value(doc)?;
        self.ingestor.ingest(doc);

        Ok(marker)
    }

    /// Retract a logged event and drop it from the log.
    ///
    /// Returns `false` when nothing is logged under `marker`.
    pub fn retract_event(&self, marker: i64) -> Result<bool, Error> {
        let log = self.event_log()?;
        let key = Key::single(marker);
        let Some(doc) = log.get_value(&key)? else {
            return Ok(false);
        };

        self.ingestor.uningest(&doc);
        log.set_value(&key, None)?;

        Ok(true)
    }

    /// Ingest every logged event appended after `marker`.
    ///
    /// Returns the highest marker seen, or `marker` itself when the log has
    /// nothing newer. Pass [`tally_core::store::APPEND_FROM_START`] to replay
    /// the whole log.
    pub fn replay_since(&self, marker: i64) -> Result<i64, Error> {
        let mut high_water = marker;
        let mut replayed = 0_usize;
        for (key, doc) in self.event_log()?.enumerate_values_appended_since(marker)? {
            if let Some(n) = key.first().and_then(KeyPart::as_int) {
                high_water = high_water.max(n);
            }
            self.ingestor.ingest(&doc);
            replayed += 1;
        }

        debug!(aggregation = %self.name, replayed, high_water, "event log replayed");

        Ok(high_water)
    }

    /// Erase every stage and the event log, leaving an empty aggregation.
    ///
    /// Queued entries that were not committed are discarded with the old
    /// ingestor.
    pub fn reset(&mut self) -> Result<(), Error> {
        // Backends may report a scope that was never created; nothing to erase.
        match self
            .engine
            .store
            .delete_child_store(&Key::single(self.name.as_str()))
        {
            Err(err) if err.is_not_found() => {
                debug!(aggregation = %self.name, "reset found no stored scope");
            }
            other => other?,
        }
        self.ingestor = self.engine.open_ingestor(&self.name, &self.pipeline)?;

        Ok(())
    }

    fn event_log(&self) -> Result<StoreRef, Error> {
        Ok(named_child(self.ingestor.store().as_ref(), EVENT_LOG_STORE)?)
    }
}
