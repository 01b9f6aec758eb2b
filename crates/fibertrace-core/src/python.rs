//! Python bindings. Results cross the boundary as JSON and are loaded with
//! the stdlib `json` module so callers get plain dicts and lists.

use std::sync::Arc;

use pyo3::prelude::*;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::EngineConfig;
use crate::errors::FiberError;
use crate::query::attenuation::compute_attenuation;
use crate::query::batch::{trace_otdr_batch, OtdrProbe};
use crate::query::otdr::trace_otdr_located;
use crate::query::tracer::StartPoint;
use crate::query::vfl::trace_vfl;
use crate::splicing::auto_splice::propose_auto_splice;
use crate::store::snapshot::TopologySnapshot;

fn from_py<T: DeserializeOwned>(value: &Bound<'_, PyAny>) -> PyResult<T> {
    let json_module = value.py().import("json")?;
    let json_str: String = json_module.call_method1("dumps", (value,))?.extract()?;
    Ok(serde_json::from_str(&json_str).map_err(FiberError::from)?)
}

fn to_py<T: Serialize>(py: Python<'_>, value: &T) -> PyResult<PyObject> {
    let json_str = serde_json::to_string(value).map_err(FiberError::from)?;
    let json_module = py.import("json")?;
    json_module
        .call_method1("loads", (json_str,))
        .map(|o| o.into())
}

#[pyclass]
pub struct TopologyEngine {
    snapshot: Arc<TopologySnapshot>,
}

#[pymethods]
impl TopologyEngine {
    /// Build from a topology document JSON string. Without `config_json`
    /// the `FIBERTRACE_*` environment variables apply.
    #[new]
    #[pyo3(signature = (document_json, config_json=None))]
    fn new(document_json: &str, config_json: Option<&str>) -> PyResult<Self> {
        let config = match config_json {
            Some(raw) => serde_json::from_str::<EngineConfig>(raw).map_err(FiberError::from)?,
            None => EngineConfig::from_env(),
        };
        let snapshot = TopologySnapshot::from_json_str(document_json, config)?;
        Ok(Self {
            snapshot: Arc::new(snapshot),
        })
    }

    #[getter]
    fn project_id(&self) -> String {
        self.snapshot.project_id().to_string()
    }

    fn trace_otdr(
        &self,
        py: Python<'_>,
        start: &Bound<'_, PyAny>,
        distance_m: f64,
    ) -> PyResult<PyObject> {
        let start: StartPoint = from_py(start)?;
        let snapshot = Arc::clone(&self.snapshot);
        let report = py.allow_threads(move || trace_otdr_located(&snapshot, &start, distance_m))?;
        to_py(py, &report)
    }

    fn trace_vfl(&self, py: Python<'_>, start: &Bound<'_, PyAny>) -> PyResult<PyObject> {
        let start: StartPoint = from_py(start)?;
        let snapshot = Arc::clone(&self.snapshot);
        let result = py.allow_threads(move || trace_vfl(&snapshot, &start))?;
        to_py(py, &result)
    }

    #[pyo3(signature = (start, up_to_m=None))]
    fn compute_attenuation(
        &self,
        py: Python<'_>,
        start: &Bound<'_, PyAny>,
        up_to_m: Option<f64>,
    ) -> PyResult<PyObject> {
        let start: StartPoint = from_py(start)?;
        let snapshot = Arc::clone(&self.snapshot);
        let budgets = py.allow_threads(move || compute_attenuation(&snapshot, &start, up_to_m))?;
        to_py(py, &budgets)
    }

    fn propose_auto_splice(
        &self,
        py: Python<'_>,
        box_id: &str,
        cable_a: &str,
        cable_b: &str,
    ) -> PyResult<PyObject> {
        let plan = propose_auto_splice(&self.snapshot, box_id, cable_a, cable_b)?;
        to_py(py, &plan)
    }

    /// Returns one `{"ok": report}` or `{"error": message}` per probe.
    #[pyo3(signature = (probes, workers=4))]
    fn trace_otdr_batch(
        &self,
        py: Python<'_>,
        probes: &Bound<'_, PyAny>,
        workers: i64,
    ) -> PyResult<PyObject> {
        let probes: Vec<OtdrProbe> = from_py(probes)?;
        let snapshot = Arc::clone(&self.snapshot);
        let results = py.allow_threads(move || {
            trace_otdr_batch(&snapshot, &probes, workers.max(1) as usize)
        })?;
        let rows: Vec<serde_json::Value> = results
            .into_iter()
            .map(|result| match result {
                Ok(report) => serde_json::json!({ "ok": report }),
                Err(err) => serde_json::json!({ "error": err.to_string() }),
            })
            .collect();
        to_py(py, &rows)
    }
}

pub fn register(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<TopologyEngine>()?;

    // -- Guards (constants + clamping functions) ------------------------------
    m.add("MAX_DEPTH", crate::query::guards::MAX_DEPTH)?;
    m.add("MAX_TRACE_STEPS", crate::query::guards::MAX_TRACE_STEPS)?;
    m.add("MAX_BRANCHES", crate::query::guards::MAX_BRANCHES)?;
    m.add("MAX_BATCH_PROBES", crate::query::guards::MAX_BATCH_PROBES)?;
    m.add(
        "DEFAULT_BOUNDARY_EPSILON_M",
        crate::query::guards::DEFAULT_BOUNDARY_EPSILON_M,
    )?;

    m.add_function(wrap_pyfunction!(crate::query::guards::clamp_int, m)?)?;
    m.add_function(wrap_pyfunction!(crate::query::guards::clamp_depth, m)?)?;
    m.add_function(wrap_pyfunction!(crate::query::guards::clamp_epsilon, m)?)?;
    m.add_function(wrap_pyfunction!(crate::query::guards::clamp_loss, m)?)?;
    Ok(())
}
