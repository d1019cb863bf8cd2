use std::fs;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::Serialize;

use crate::clean::{CleanSummary, clean};
use crate::config::{HarvestConfig, ScaffoldQuery};
use crate::domain::Genus;
use crate::error::HarvestError;
use crate::executor::{QueryExecutor, Sleeper, ThreadSleeper};
use crate::query::QueryTemplate;
use crate::resume::Accumulator;
use crate::sparql::SparqlClient;
use crate::store::{Store, write_table_atomic};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub level: EventLevel,
    pub message: String,
    pub elapsed: Option<Duration>,
}

impl ProgressEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self::at(EventLevel::Info, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::at(EventLevel::Warn, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::at(EventLevel::Error, message)
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = Some(elapsed);
        self
    }

    fn at(level: EventLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            elapsed: None,
        }
    }
}

/// Receives progress from concurrently running workers.
pub trait ProgressSink: Send + Sync {
    fn event(&self, event: ProgressEvent);
}

pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn event(&self, _event: ProgressEvent) {}
}

#[derive(Debug, Clone, Serialize)]
pub struct HarvestFailure {
    pub genus: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HarvestResult {
    pub requested: usize,
    pub queried: usize,
    pub succeeded: usize,
    pub failures: Vec<HarvestFailure>,
    pub rows: usize,
    pub output_path: Option<Utf8PathBuf>,
    pub failure_path: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScaffoldResult {
    pub written: Vec<ScaffoldItemResult>,
    pub skipped: Vec<ScaffoldSkip>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScaffoldItemResult {
    pub name: String,
    pub output_path: Utf8PathBuf,
    pub summary: CleanSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScaffoldSkip {
    pub name: String,
    pub reason: String,
}

pub struct App<C: SparqlClient, S: Sleeper = ThreadSleeper> {
    config: HarvestConfig,
    store: Store,
    executor: QueryExecutor<C, S>,
}

impl<C: SparqlClient, S: Sleeper> App<C, S> {
    pub fn new(config: HarvestConfig, executor: QueryExecutor<C, S>) -> Self {
        let store = Store::from_config(&config);
        Self {
            config,
            store,
            executor,
        }
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Queries every genus missing from the persisted table, merges the new
    /// rows in, and persists the table plus a failure file.
    pub fn harvest_genera(
        &self,
        genera: &[Genus],
        template: &QueryTemplate,
        timestamp: &str,
        sink: &dyn ProgressSink,
    ) -> Result<HarvestResult, HarvestError> {
        let existing = self.store.load_table()?;
        let accumulator = Accumulator::new(&self.config, &self.executor);
        let outcome = accumulator.run(genera, existing, template, sink)?;
        let persisted = accumulator.persist(&outcome, &self.store, timestamp, sink)?;

        Ok(HarvestResult {
            requested: genera.len(),
            queried: outcome.queried.len(),
            succeeded: outcome.succeeded,
            failures: outcome
                .failures
                .iter()
                .map(|(genus, reason)| HarvestFailure {
                    genus: genus.clone(),
                    reason: reason.clone(),
                })
                .collect(),
            rows: outcome.table.len(),
            output_path: persisted.table_path,
            failure_path: persisted.failure_path,
        })
    }

    /// Runs each configured scaffold query once, cleans the rows and writes
    /// one table per group. A group that cannot be completed is skipped.
    pub fn harvest_scaffolds(&self, sink: &dyn ProgressSink) -> ScaffoldResult {
        let mut written = Vec::new();
        let mut skipped = Vec::new();

        for scaffold in &self.config.scaffolds {
            match self.harvest_scaffold(scaffold, sink) {
                Ok(item) => {
                    sink.event(ProgressEvent::info(item.summary.describe()));
                    written.push(item);
                }
                Err(err) => {
                    sink.event(ProgressEvent::warn(format!(
                        "Skipping {} query: {err}",
                        scaffold.name
                    )));
                    skipped.push(ScaffoldSkip {
                        name: scaffold.name.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        ScaffoldResult { written, skipped }
    }

    fn harvest_scaffold(
        &self,
        scaffold: &ScaffoldQuery,
        sink: &dyn ProgressSink,
    ) -> Result<ScaffoldItemResult, HarvestError> {
        let query = fs::read_to_string(scaffold.query_path.as_std_path()).map_err(|err| {
            HarvestError::Filesystem(format!("read query {}: {err}", scaffold.query_path))
        })?;

        sink.event(ProgressEvent::info(format!(
            "Querying Wikidata for {}...",
            scaffold.name
        )));
        let raw = self
            .executor
            .execute(&query, &scaffold.name, self.config.max_attempts, sink)?;
        let cleaned = clean(raw, &scaffold.name, &self.config.clean_columns)?;

        let output_path = self.store.scaffold_output_path(&scaffold.name);
        write_table_atomic(&output_path, &cleaned.table)?;
        Ok(ScaffoldItemResult {
            name: scaffold.name.clone(),
            output_path,
            summary: cleaned.summary,
        })
    }
}
