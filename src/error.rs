use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum HarvestError {
    #[error("invalid genus name: {0:?}")]
    InvalidGenus(String),

    #[error("genus listed more than once in one batch: {0}")]
    DuplicateGenus(String),

    #[error("query template error: {0}")]
    Template(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("SPARQL request failed: {0}")]
    SparqlHttp(String),

    #[error("SPARQL endpoint returned status {status}: {message}")]
    SparqlStatus { status: u16, message: String },

    #[error("max attempts reached")]
    MaxAttemptsReached,

    #[error("malformed SPARQL response: {0}")]
    MalformedResponse(String),

    #[error("query task failed unexpectedly: {0}")]
    TaskPanicked(String),

    #[error("table has no column named {0}")]
    MissingColumn(String),

    #[error("CSV error in {path}: {message}")]
    Csv { path: String, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("logging setup failed: {0}")]
    Logging(String),
}
