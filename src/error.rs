#[cfg(feature = "python")]
use pyo3::exceptions::{PyRuntimeError, PyValueError};
#[cfg(feature = "python")]
use pyo3::PyErr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IpiError {
    #[error("Invalid indicator: column '{0}' not found")]
    InvalidIndicator(String),

    #[error("No rows for year {year} in column '{column}'")]
    EmptyResult { column: String, year: i64 },

    #[error("No overlap between the history table and the current-value table")]
    NoOverlap,

    #[error("Unknown section: no polygons tagged '{0}'")]
    UnknownSection(String),

    #[error("Data not loaded: {0}")]
    NotLoaded(String),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(feature = "python")]
impl From<IpiError> for PyErr {
    fn from(err: IpiError) -> PyErr {
        match err {
            IpiError::InvalidIndicator(_)
            | IpiError::EmptyResult { .. }
            | IpiError::NoOverlap
            | IpiError::UnknownSection(_) => PyValueError::new_err(err.to_string()),
            _ => PyRuntimeError::new_err(err.to_string()),
        }
    }
}
