use std::thread;
use std::time::{Duration, Instant};

use crate::app::{ProgressEvent, ProgressSink};
use crate::error::HarvestError;
use crate::sparql::{SparqlClient, SparqlPayload};
use crate::table::ResultTable;

pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Blocks the calling worker thread only.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Wait before the attempt following a rate-limited `attempt` (1-based).
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt))
}

/// Runs one query with the rate-limit retry policy.
///
/// HTTP 429 is the only retryable outcome. Every other failure ends the
/// task on the attempt that produced it.
pub struct QueryExecutor<C: SparqlClient, S: Sleeper = ThreadSleeper> {
    client: C,
    sleeper: S,
}

impl<C: SparqlClient> QueryExecutor<C, ThreadSleeper> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            sleeper: ThreadSleeper,
        }
    }
}

impl<C: SparqlClient, S: Sleeper> QueryExecutor<C, S> {
    pub fn with_sleeper(client: C, sleeper: S) -> Self {
        Self { client, sleeper }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn execute(
        &self,
        query: &str,
        identifier: &str,
        max_attempts: u32,
        sink: &dyn ProgressSink,
    ) -> Result<ResultTable, HarvestError> {
        let start = Instant::now();
        for attempt in 1..=max_attempts {
            let response = match self.client.get(query) {
                Ok(response) => response,
                Err(err) => {
                    sink.event(ProgressEvent::error(format!(
                        "Unexpected error when querying '{identifier}' (attempt {attempt}): {err}"
                    )));
                    return Err(err);
                }
            };

            if response.is_rate_limited() {
                if attempt < max_attempts {
                    let wait = backoff_delay(attempt);
                    sink.event(ProgressEvent::warn(format!(
                        "Request limit reached for '{identifier}'. Retrying in {} seconds...",
                        wait.as_secs()
                    )));
                    self.sleeper.sleep(wait);
                }
                continue;
            }

            if !response.is_success() {
                let err = HarvestError::SparqlStatus {
                    status: response.status,
                    message: status_message(&response.body),
                };
                sink.event(ProgressEvent::error(format!(
                    "HTTP error for '{identifier}' on attempt {attempt}: {err}"
                )));
                return Err(err);
            }

            let table = match SparqlPayload::parse(&response.body).into_table() {
                Ok(table) => table,
                Err(err) => {
                    sink.event(ProgressEvent::error(format!(
                        "Unexpected error when querying '{identifier}' (attempt {attempt}): {err}"
                    )));
                    return Err(err);
                }
            };
            sink.event(
                ProgressEvent::info(format!(
                    "Query for '{identifier}' completed in {attempt} attempts."
                ))
                .with_elapsed(start.elapsed()),
            );
            if table.is_empty() {
                sink.event(ProgressEvent::info(format!(
                    "Query for '{identifier}' returned no results"
                )));
            }
            return Ok(table);
        }

        sink.event(ProgressEvent::error(format!(
            "Query for '{identifier}' failed after {max_attempts} attempts."
        )));
        Err(HarvestError::MaxAttemptsReached)
    }
}

fn status_message(body: &str) -> String {
    const MAX_CHARS: usize = 200;
    let first_line = body.lines().map(str::trim).find(|line| !line.is_empty());
    match first_line {
        Some(line) if line.chars().count() > MAX_CHARS => {
            let mut short = line.chars().take(MAX_CHARS).collect::<String>();
            short.push_str("...");
            short
        }
        Some(line) => line.to_string(),
        None => "no response body".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use assert_matches::assert_matches;

    use super::*;
    use crate::app::NoopSink;
    use crate::sparql::SparqlResponse;

    struct ScriptedClient {
        responses: Mutex<VecDeque<Result<SparqlResponse, HarvestError>>>,
        calls: Mutex<usize>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<Result<SparqlResponse, HarvestError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    impl SparqlClient for ScriptedClient {
        fn get(&self, _query: &str) -> Result<SparqlResponse, HarvestError> {
            *self.calls.lock().unwrap() += 1;
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(HarvestError::SparqlHttp("script exhausted".to_string())))
        }
    }

    #[derive(Default)]
    struct RecordingSleeper {
        waits: Mutex<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.waits.lock().unwrap().push(duration);
        }
    }

    fn status(status: u16, body: &str) -> Result<SparqlResponse, HarvestError> {
        Ok(SparqlResponse {
            status,
            body: body.to_string(),
        })
    }

    const ONE_ROW: &str = r#"{"head":{"vars":["genus_name"]},"results":{"bindings":[{"genus_name":{"type":"literal","value":"Vinca"}}]}}"#;

    #[test]
    fn retries_after_rate_limit() {
        let client = ScriptedClient::new(vec![status(429, ""), status(200, ONE_ROW)]);
        let executor = QueryExecutor::with_sleeper(client, RecordingSleeper::default());
        let table = executor.execute("q", "Vinca", 5, &NoopSink).unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(executor.client().calls(), 2);
        assert_eq!(
            *executor.sleeper.waits.lock().unwrap(),
            vec![Duration::from_secs(2)]
        );
    }

    #[test]
    fn backoff_strictly_increases_until_budget_is_spent() {
        let client = ScriptedClient::new((0..4).map(|_| status(429, "")).collect());
        let executor = QueryExecutor::with_sleeper(client, RecordingSleeper::default());
        let err = executor.execute("q", "Rosa", 4, &NoopSink).unwrap_err();

        assert_matches!(err, HarvestError::MaxAttemptsReached);
        assert_eq!(err.to_string(), "max attempts reached");
        let waits = executor.sleeper.waits.lock().unwrap().clone();
        assert_eq!(
            waits,
            vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8)
            ]
        );
        assert!(waits.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(executor.client().calls(), 4);
    }

    #[test]
    fn server_error_is_terminal() {
        let client = ScriptedClient::new(vec![status(500, "Internal Server Error"), status(200, ONE_ROW)]);
        let executor = QueryExecutor::with_sleeper(client, RecordingSleeper::default());
        let err = executor.execute("q", "Bogus", 5, &NoopSink).unwrap_err();

        assert_matches!(err, HarvestError::SparqlStatus { status: 500, .. });
        assert_eq!(executor.client().calls(), 1);
        assert!(executor.sleeper.waits.lock().unwrap().is_empty());
    }

    #[test]
    fn transport_error_is_terminal() {
        let client = ScriptedClient::new(vec![
            Err(HarvestError::SparqlHttp("connection reset".to_string())),
            status(200, ONE_ROW),
        ]);
        let executor = QueryExecutor::with_sleeper(client, RecordingSleeper::default());
        let err = executor.execute("q", "Salix", 5, &NoopSink).unwrap_err();
        assert_matches!(err, HarvestError::SparqlHttp(_));
        assert_eq!(executor.client().calls(), 1);
    }

    #[test]
    fn malformed_success_body_is_terminal() {
        let client = ScriptedClient::new(vec![status(200, r#"{"results":{}}"#)]);
        let executor = QueryExecutor::with_sleeper(client, RecordingSleeper::default());
        let err = executor.execute("q", "Salix", 5, &NoopSink).unwrap_err();
        assert_matches!(err, HarvestError::MalformedResponse(_));
    }

    #[test]
    fn empty_result_is_success() {
        let body = r#"{"head":{"vars":["smiles"]},"results":{"bindings":[]}}"#;
        let client = ScriptedClient::new(vec![status(200, body)]);
        let executor = QueryExecutor::with_sleeper(client, RecordingSleeper::default());
        let table = executor.execute("q", "Quercus", 5, &NoopSink).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn backoff_delay_is_power_of_two() {
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(3), Duration::from_secs(8));
    }
}
