use std::collections::{BTreeMap, HashSet};

use camino::Utf8PathBuf;
use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink};
use crate::config::HarvestConfig;
use crate::dispatch::Dispatcher;
use crate::domain::{FailureRecord, Genus};
use crate::error::HarvestError;
use crate::executor::{QueryExecutor, Sleeper};
use crate::query::QueryTemplate;
use crate::sparql::SparqlClient;
use crate::store::Store;
use crate::table::ResultTable;

/// Genera of `genera` absent from the genus column of `existing`.
///
/// An absent or empty prior table means every genus still needs a query.
pub fn missing_genera(
    genera: &[Genus],
    existing: Option<&ResultTable>,
    genus_column: &str,
) -> Result<Vec<Genus>, HarvestError> {
    let Some(existing) = existing.filter(|table| !table.is_empty()) else {
        return Ok(genera.to_vec());
    };
    if !existing.has_column(genus_column) {
        return Err(HarvestError::MissingColumn(genus_column.to_string()));
    }
    let present = existing
        .records()
        .iter()
        .filter_map(|record| record.get(genus_column))
        .collect::<HashSet<_>>();
    Ok(genera
        .iter()
        .filter(|genus| !present.contains(genus.as_str()))
        .cloned()
        .collect())
}

#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub table: ResultTable,
    pub failures: BTreeMap<String, String>,
    /// Genera sent to the endpoint this run.
    pub queried: Vec<Genus>,
    pub succeeded: usize,
}

impl RunOutcome {
    pub fn failure_records(&self) -> Vec<FailureRecord> {
        self.failures
            .iter()
            .map(|(genus, reason)| FailureRecord {
                genus: genus.clone(),
                reason: reason.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PersistReport {
    pub table_path: Option<Utf8PathBuf>,
    pub failure_path: Option<Utf8PathBuf>,
}

/// Merges new query results into the persisted table across runs.
pub struct Accumulator<'a, C: SparqlClient, S: Sleeper> {
    dispatcher: Dispatcher,
    executor: &'a QueryExecutor<C, S>,
    genus_column: String,
}

impl<'a, C: SparqlClient, S: Sleeper> Accumulator<'a, C, S> {
    pub fn new(config: &HarvestConfig, executor: &'a QueryExecutor<C, S>) -> Self {
        Self {
            dispatcher: Dispatcher::from_config(config),
            executor,
            genus_column: config.genus_column.clone(),
        }
    }

    pub fn run(
        &self,
        genera: &[Genus],
        existing: Option<ResultTable>,
        template: &QueryTemplate,
        sink: &dyn ProgressSink,
    ) -> Result<RunOutcome, HarvestError> {
        let pending = missing_genera(genera, existing.as_ref(), &self.genus_column)?;
        let mut table = existing.unwrap_or_default();

        if pending.is_empty() {
            sink.event(ProgressEvent::info(
                "All genera are already present in the output table",
            ));
            return Ok(RunOutcome {
                table,
                ..RunOutcome::default()
            });
        }

        if table.is_empty() {
            sink.event(ProgressEvent::info(format!(
                "Querying {} genera for natural product reports...",
                pending.len()
            )));
        } else {
            sink.event(ProgressEvent::info(format!(
                "{} genera are missing in the output file. Re-querying missing genera...",
                pending.len()
            )));
        }

        let report = self
            .dispatcher
            .dispatch(&pending, template, self.executor, sink)?;
        table.extend(report.table);
        Ok(RunOutcome {
            table,
            failures: report.failures,
            queried: pending,
            succeeded: report.succeeded.len(),
        })
    }

    /// Overwrites the output table and writes a fresh failure file when any
    /// genus failed. A table with no columns and no rows is not written.
    pub fn persist(
        &self,
        outcome: &RunOutcome,
        store: &Store,
        timestamp: &str,
        sink: &dyn ProgressSink,
    ) -> Result<PersistReport, HarvestError> {
        let table_path = if outcome.table.is_blank() {
            sink.event(ProgressEvent::warn(
                "No results to save; output file left untouched",
            ));
            None
        } else {
            store.write_table(&outcome.table)?;
            sink.event(ProgressEvent::info(format!(
                "Results saved to {}",
                store.output_path()
            )));
            Some(store.output_path().to_path_buf())
        };

        let failure_path = if outcome.failures.is_empty() {
            if !outcome.queried.is_empty() {
                sink.event(ProgressEvent::info("All queries completed successfully!"));
            }
            None
        } else {
            let path = store.write_failures(&outcome.failure_records(), timestamp)?;
            sink.event(ProgressEvent::warn(format!(
                "{} queries failed! List of failed queries saved to {path}",
                outcome.failures.len()
            )));
            Some(path)
        };

        Ok(PersistReport {
            table_path,
            failure_path,
        })
    }
}
