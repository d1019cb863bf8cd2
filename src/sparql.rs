use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::HarvestError;
use crate::table::{ResultTable, normalize_bindings};

pub const WIKIDATA_ENDPOINT: &str = "https://query.wikidata.org/sparql";
pub const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";
/// The endpoint blocks default client user agents.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64)";

/// Raw HTTP outcome of one query, before any status handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparqlResponse {
    pub status: u16,
    pub body: String,
}

impl SparqlResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }
}

pub trait SparqlClient: Send + Sync {
    fn get(&self, query: &str) -> Result<SparqlResponse, HarvestError>;
}

#[derive(Clone)]
pub struct SparqlHttpClient {
    client: Client,
    endpoint: String,
}

impl SparqlHttpClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, HarvestError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(SPARQL_RESULTS_JSON));
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| HarvestError::SparqlHttp(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl SparqlClient for SparqlHttpClient {
    fn get(&self, query: &str) -> Result<SparqlResponse, HarvestError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("query", query)])
            .send()
            .map_err(|err| HarvestError::SparqlHttp(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|err| HarvestError::SparqlHttp(err.to_string()))?;
        Ok(SparqlResponse { status, body })
    }
}

#[derive(Debug, Deserialize)]
struct ResultsDocument {
    #[serde(default)]
    head: Option<Head>,
    results: Option<Results>,
}

#[derive(Debug, Deserialize)]
struct Head {
    #[serde(default)]
    vars: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Results {
    bindings: Option<Vec<Value>>,
}

/// Shape of a 2xx response body.
#[derive(Debug, Clone, PartialEq)]
pub enum SparqlPayload {
    Rows {
        vars: Vec<String>,
        bindings: Vec<Map<String, Value>>,
    },
    Malformed(String),
}

impl SparqlPayload {
    pub fn parse(body: &str) -> Self {
        let document: ResultsDocument = match serde_json::from_str(body) {
            Ok(document) => document,
            Err(err) => return SparqlPayload::Malformed(format!("invalid JSON: {err}")),
        };
        let Some(results) = document.results else {
            return SparqlPayload::Malformed("missing `results` object".to_string());
        };
        let Some(raw) = results.bindings else {
            return SparqlPayload::Malformed("missing `results.bindings` array".to_string());
        };

        let mut bindings = Vec::with_capacity(raw.len());
        for (index, row) in raw.into_iter().enumerate() {
            match row {
                Value::Object(map) => bindings.push(map),
                other => {
                    return SparqlPayload::Malformed(format!(
                        "binding {index} is not an object: {other}"
                    ));
                }
            }
        }
        let vars = document.head.map(|head| head.vars).unwrap_or_default();
        SparqlPayload::Rows { vars, bindings }
    }

    pub fn into_table(self) -> Result<ResultTable, HarvestError> {
        match self {
            SparqlPayload::Rows { vars, bindings } => Ok(normalize_bindings(&vars, &bindings)),
            SparqlPayload::Malformed(reason) => Err(HarvestError::MalformedResponse(reason)),
        }
    }
}
