//! Fibertrace core library: fiber connectivity and path tracing for FTTH
//! outside-plant networks.
//!
//! A [`TopologySnapshot`](store::snapshot::TopologySnapshot) is built from the
//! persisted project document; the query layer walks it to answer OTDR
//! distance-to-event, VFL illumination and loss budget questions, and the
//! splicing layer proposes bulk pass-through fusions. With the `python`
//! feature the crate also builds as the `_fibertrace_core` extension module.

pub mod config;
pub mod errors;
pub mod models;
pub mod query;
pub mod splicing;
pub mod store;

#[cfg(feature = "python")]
pub mod python;

#[cfg(test)]
mod testing;

pub use config::EngineConfig;
pub use errors::{FiberError, FiberResult};
pub use query::tracer::StartPoint;
pub use store::snapshot::TopologySnapshot;

#[cfg(feature = "python")]
use pyo3::prelude::*;

// ---------------------------------------------------------------------------
// Top-level Python module: _fibertrace_core
// ---------------------------------------------------------------------------

#[cfg(feature = "python")]
#[pymodule]
fn _fibertrace_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    python::register(m)
}
