use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CatalogError {
    #[error("invalid storage path (expected scheme://bucket/.../ with trailing slash): {0}")]
    #[diagnostic(help("pass the full directory, e.g. s3://mybucket/ModelOutputs/run1/"))]
    InvalidPathFormat(String),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("unknown model: {0}")]
    #[diagnostic(help("run `hc-catalog formats` to list the configured models"))]
    UnknownModel(String),

    #[error("publication metadata request failed: {0}")]
    RemoteFetch(String),

    #[error("publication metadata server returned status {status}: {message}")]
    RemoteStatus { status: u16, message: String },

    #[error("invalid publication metadata: {0}")]
    PublicationMetadata(String),

    #[error("missing upstream input: {0}")]
    MissingUpstreamInput(String),

    #[error("malformed upstream input: {0}")]
    MalformedUpstreamInput(String),

    #[error("unhandled coordinate units ({0}, {1}, {2})")]
    UnhandledCoordinateUnits(String, String, String),

    #[error("start date {start} is after stop date {stop}")]
    InvalidTimeRange { start: String, stop: String },

    #[error("catalog already contains an entry with id {0}")]
    #[diagnostic(help("use --replace to overwrite the existing entry"))]
    DuplicateCatalogId(String),

    #[error("existing catalog is not valid JSON: {0}")]
    #[diagnostic(help("fix or remove catalog.json in the output directory"))]
    MalformedCatalog(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(String),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
