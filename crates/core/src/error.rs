//! Error types for floodmap

use thiserror::Error;

/// Main error type for floodmap operations.
///
/// Variants fall into three groups: input/configuration problems that abort
/// a stage before it writes anything, numeric problems detected while
/// normalising or combining bands, and wrapped I/O failures.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("TIFF error: {0}")]
    Tiff(String),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("CRS mismatch for layer '{layer}': {expected} vs {found}")]
    CrsMismatch {
        layer: String,
        expected: String,
        found: String,
    },

    #[error("Layer '{layer}' is not aligned with the stack grid: {reason}")]
    GridMismatch { layer: String, reason: String },

    #[error("Layer '{0}' not found")]
    MissingLayer(String),

    #[error("Layer '{layer}' does not intersect the study area")]
    ExtentOutsideStudyArea { layer: String },

    #[error("Empty geometry: {what}")]
    EmptyGeometry { what: String },

    #[error("Insufficient training data in {stage}: class {class} has {found} samples, need at least {required}")]
    InsufficientSamples {
        stage: &'static str,
        class: u8,
        found: usize,
        required: usize,
    },

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Non-normalizable band '{band}': min == max == {value}")]
    NonNormalizable { band: String, value: f64 },

    #[error("Reference point ({x}, {y}) cannot select a flood cluster: {reason}")]
    AmbiguousCluster { x: f64, y: f64, reason: String },

    #[error("Feature stack is sealed; cannot append band '{0}'")]
    StackSealed(String),

    #[error("Missing column '{column}' in table {table}")]
    MissingColumn { table: String, column: String },

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("{0}")]
    Other(String),
}

impl From<tiff::TiffError> for Error {
    fn from(e: tiff::TiffError) -> Self {
        Error::Tiff(e.to_string())
    }
}

impl Error {
    /// Shorthand for [`Error::InvalidParameter`].
    pub fn invalid_param(
        name: &'static str,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Error::InvalidParameter {
            name,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for floodmap operations
pub type Result<T> = std::result::Result<T, Error>;
