use thiserror::Error;

/// Errors raised while partitioning a raster, synthesizing tile metadata,
/// or assembling tile file names.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TilerError {
    /// Invalid grid shape, naming template, or tile ordinal.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A code table has no entry for the key and the strict policy is active.
    #[error("No {table} code for '{key}'")]
    Lookup { table: &'static str, key: String },

    /// The primary field and a geolocation field disagree on spatial extent.
    #[error(
        "Field '{field}' has shape {actual_rows}x{actual_cols}, expected {expected_rows}x{expected_cols}"
    )]
    ShapeMismatch {
        field: String,
        expected_rows: usize,
        expected_cols: usize,
        actual_rows: usize,
        actual_cols: usize,
    },

    /// The grid asks for more windows than the raster has pixels along an axis.
    #[error("Cannot split {axis} extent of {extent} pixels into {parts} tiles")]
    DegeneratePartition {
        axis: &'static str,
        extent: usize,
        parts: usize,
    },

    #[error("Variable '{0}' not found in dataset")]
    MissingVariable(String),

    #[error("Invalid time value '{value}': {reason}")]
    InvalidTime { value: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, TilerError>;
