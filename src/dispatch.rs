//! Fan-out of one query task per genus over a bounded worker pool.
//!
//! A feeder thread pushes [`QueryTask`]s into a bounded channel read by
//! `concurrency` worker threads. Workers send each outcome back on a
//! completion channel drained by the calling thread, which is the only
//! writer of the merged table and the failure map.

use std::collections::{BTreeMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use crossbeam::channel;

use crate::app::{ProgressEvent, ProgressSink};
use crate::config::HarvestConfig;
use crate::domain::{Genus, ensure_unique};
use crate::error::HarvestError;
use crate::executor::{QueryExecutor, Sleeper};
use crate::query::QueryTemplate;
use crate::sparql::SparqlClient;
use crate::table::ResultTable;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTask {
    pub genus: Genus,
    pub max_attempts: u32,
}

struct TaskOutcome {
    genus: Genus,
    result: Result<ResultTable, HarvestError>,
}

#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// Concatenation of every successful partial table.
    pub table: ResultTable,
    /// Genera whose query succeeded, in completion order.
    pub succeeded: Vec<Genus>,
    /// Failure reason per genus.
    pub failures: BTreeMap<String, String>,
}

impl DispatchReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failures.len()
    }
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    concurrency: usize,
    max_attempts: u32,
    join_column: String,
}

impl Dispatcher {
    pub fn new(concurrency: usize, max_attempts: u32, join_column: impl Into<String>) -> Self {
        Self {
            concurrency: concurrency.max(1),
            max_attempts,
            join_column: join_column.into(),
        }
    }

    pub fn from_config(config: &HarvestConfig) -> Self {
        Self::new(
            config.concurrency,
            config.max_attempts,
            config.genus_column.clone(),
        )
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn dispatch<C, S>(
        &self,
        genera: &[Genus],
        template: &QueryTemplate,
        executor: &QueryExecutor<C, S>,
        sink: &dyn ProgressSink,
    ) -> Result<DispatchReport, HarvestError>
    where
        C: SparqlClient,
        S: Sleeper,
    {
        ensure_unique(genera)?;
        if genera.is_empty() {
            return Ok(DispatchReport::default());
        }

        let workers = self.concurrency.min(genera.len());
        let max_attempts = self.max_attempts;
        let join_column = self.join_column.as_str();
        sink.event(ProgressEvent::info(format!(
            "Dispatching {} queries over {workers} workers",
            genera.len()
        )));

        let mut partials = Vec::new();
        let mut report = DispatchReport::default();
        let mut settled = HashSet::with_capacity(genera.len());

        thread::scope(|scope| {
            let (task_tx, task_rx) = channel::bounded::<QueryTask>(workers);
            let (done_tx, done_rx) = channel::unbounded::<TaskOutcome>();

            for _ in 0..workers {
                let task_rx = task_rx.clone();
                let done_tx = done_tx.clone();
                scope.spawn(move || {
                    for task in task_rx.iter() {
                        let genus = task.genus.clone();
                        let result = panic::catch_unwind(AssertUnwindSafe(|| {
                            run_task(&task, template, executor, join_column, sink)
                        }))
                        .unwrap_or_else(|payload| {
                            Err(HarvestError::TaskPanicked(panic_message(&*payload)))
                        });
                        if done_tx.send(TaskOutcome { genus, result }).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(task_rx);
            drop(done_tx);

            scope.spawn(move || {
                for genus in genera {
                    let task = QueryTask {
                        genus: genus.clone(),
                        max_attempts,
                    };
                    if task_tx.send(task).is_err() {
                        break;
                    }
                }
            });

            for outcome in done_rx.iter() {
                settled.insert(outcome.genus.clone());
                match outcome.result {
                    Ok(table) => {
                        report.failures.remove(outcome.genus.as_str());
                        report.succeeded.push(outcome.genus);
                        partials.push(table);
                    }
                    Err(err) => {
                        report.failures.insert(outcome.genus.to_string(), err.to_string());
                    }
                }
            }
        });

        for genus in genera {
            if !settled.contains(genus) {
                report.failures.insert(
                    genus.to_string(),
                    "task outcome was never received".to_string(),
                );
            }
        }

        report.table = ResultTable::concat(partials);
        sink.event(ProgressEvent::info(format!(
            "Processing completed: {} queries run.",
            genera.len()
        )));
        sink.event(ProgressEvent::info(format!(
            "{} queries succeeded.",
            report.succeeded.len()
        )));
        Ok(report)
    }
}

fn run_task<C: SparqlClient, S: Sleeper>(
    task: &QueryTask,
    template: &QueryTemplate,
    executor: &QueryExecutor<C, S>,
    join_column: &str,
    sink: &dyn ProgressSink,
) -> Result<ResultTable, HarvestError> {
    let genus = task.genus.as_str();
    let query = template.render(genus);
    let mut table = executor.execute(&query, genus, task.max_attempts, sink)?;
    table.fill_column(join_column, genus);
    Ok(table)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}
