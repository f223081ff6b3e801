use thiserror::Error;

/// everything that can go wrong between a request and its artifacts
#[derive(Error, Debug)]
pub enum RavenError {
    /// bad input: parameter count, bounds, literal type, cardinality
    #[error("invalid input {name}: {reason}")]
    Validation { name: String, reason: String },

    /// a required input was not supplied and has no default
    #[error("missing input: {0}")]
    Missing(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// the remote service answered, but with an error
    #[error("service error: {0}")]
    Service(String),

    #[error("malformed geometry: {0}")]
    Geometry(String),

    #[error("insufficient data (needed: {needed}, found: {found})")]
    InsufficientData { needed: usize, found: usize },

    #[error("numerical failure: {0}")]
    Numerical(String),

    /// the external model engine failed or produced nothing usable
    #[error("engine failure: {0}")]
    Engine(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse GeoJSON: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("failed to decode raster: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl RavenError {
    pub fn validation(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// OGC exception code used when the error is reported as a WPS fault
    pub fn exception_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "InvalidParameterValue",
            Self::Missing(_) => "MissingParameterValue",
            _ => "NoApplicableCode",
        }
    }
}

pub type Result<T> = std::result::Result<T, RavenError>;
