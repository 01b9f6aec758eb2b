//! Error types for the fiber tracing engine.
//!
//! Valid terminal states of a trace (open ends, unspliced fibers, equipment,
//! depth guard) are result variants, never errors. This enum only carries
//! data-integrity problems and malformed input.

#[cfg(feature = "python")]
use pyo3::exceptions::{PyIOError, PyKeyError, PyRuntimeError, PyValueError};
#[cfg(feature = "python")]
use pyo3::PyErr;

/// Top-level error enum for the fibertrace core library.
#[derive(Debug, thiserror::Error)]
pub enum FiberError {
    #[error("Cable not found: {0}")]
    CableNotFound(String),

    #[error("Box not found: {0}")]
    BoxNotFound(String),

    #[error("Port not found in box {box_id}: {port}")]
    PortNotFound { box_id: String, port: String },

    #[error("Fiber not found: {0}")]
    FiberNotFound(String),

    #[error("Connectivity mismatch in box {box_id} at {port}: {detail}")]
    ConnectivityMismatch {
        box_id: String,
        port: String,
        detail: String,
    },

    #[error("Cable {cable_id} does not terminate at box {box_id}")]
    CableNotAtBox { cable_id: String, box_id: String },

    #[error("Invalid catalog value: {0}")]
    InvalidCatalog(String),

    #[error("Invalid topology: {0}")]
    InvalidTopology(String),

    #[error("Invalid probe: {0}")]
    InvalidProbe(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FiberError {
    /// True for errors caused by inconsistent splicing data rather than bad
    /// caller input. The UI surfaces these as "check splicing configuration".
    pub fn is_data_integrity(&self) -> bool {
        matches!(
            self,
            FiberError::CableNotFound(_)
                | FiberError::FiberNotFound(_)
                | FiberError::ConnectivityMismatch { .. }
        )
    }
}

#[cfg(feature = "python")]
impl From<FiberError> for PyErr {
    fn from(err: FiberError) -> PyErr {
        match &err {
            FiberError::CableNotFound(_)
            | FiberError::BoxNotFound(_)
            | FiberError::PortNotFound { .. }
            | FiberError::FiberNotFound(_) => PyKeyError::new_err(err.to_string()),
            FiberError::ConnectivityMismatch { .. } => PyRuntimeError::new_err(err.to_string()),
            FiberError::CableNotAtBox { .. }
            | FiberError::InvalidCatalog(_)
            | FiberError::InvalidTopology(_)
            | FiberError::InvalidProbe(_)
            | FiberError::Json(_) => PyValueError::new_err(err.to_string()),
            FiberError::Io(_) => PyIOError::new_err(err.to_string()),
        }
    }
}

pub type FiberResult<T> = Result<T, FiberError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_integrity_classification() {
        assert!(FiberError::CableNotFound("c9".into()).is_data_integrity());
        assert!(FiberError::ConnectivityMismatch {
            box_id: "cto-1".into(),
            port: "fiber c1:1:1@to".into(),
            detail: "peer does not point back".into(),
        }
        .is_data_integrity());
        assert!(!FiberError::InvalidProbe("negative distance".into()).is_data_integrity());
    }

    #[test]
    fn test_display_messages() {
        let err = FiberError::CableNotAtBox {
            cable_id: "c1".into(),
            box_id: "cto-2".into(),
        };
        assert_eq!(err.to_string(), "Cable c1 does not terminate at box cto-2");
    }
}
