//! Shared guardrails for probe bounds and traversal limits.

#[cfg(feature = "python")]
use pyo3::prelude::*;

use crate::errors::{FiberError, FiberResult};

// Traversal guards
pub const MAX_DEPTH: usize = 500;
pub const MAX_DEPTH_CEILING: usize = 5_000;
pub const MAX_TRACE_STEPS: usize = 20_000;
pub const MAX_TRACE_STEPS_CEILING: usize = 500_000;
pub const MAX_BRANCHES: usize = 4_096;
pub const MAX_BRANCHES_CEILING: usize = 65_536;

// Numeric guards
pub const DEFAULT_BOUNDARY_EPSILON_M: f64 = 0.01;
pub const MAX_BOUNDARY_EPSILON_M: f64 = 5.0;
pub const MAX_LOSS_DB: f64 = 60.0;
pub const MAX_ATTENUATION_DB_PER_KM: f64 = 10.0;

// Batch guards
pub const MAX_BATCH_PROBES: usize = 1_024;

#[cfg_attr(feature = "python", pyfunction)]
pub fn clamp_int(value: i64, minimum: i64, maximum: i64) -> i64 {
    value.max(minimum).min(maximum)
}

#[cfg_attr(feature = "python", pyfunction)]
pub fn clamp_depth(value: i64, maximum: i64) -> i64 {
    clamp_int(value, 1, maximum)
}

#[cfg_attr(feature = "python", pyfunction)]
pub fn clamp_epsilon(value: f64) -> f64 {
    if value.is_nan() {
        return DEFAULT_BOUNDARY_EPSILON_M;
    }
    value.max(0.0).min(MAX_BOUNDARY_EPSILON_M)
}

#[cfg_attr(feature = "python", pyfunction)]
pub fn clamp_loss(value: f64, maximum: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.max(0.0).min(maximum)
}

/// Reject probe distances the tracer cannot interpret.
pub fn validate_probe_distance(distance_m: f64) -> FiberResult<f64> {
    if !distance_m.is_finite() {
        return Err(FiberError::InvalidProbe(format!(
            "distance must be finite, got {distance_m}"
        )));
    }
    if distance_m < 0.0 {
        return Err(FiberError::InvalidProbe(format!(
            "distance must be non-negative, got {distance_m}"
        )));
    }
    Ok(distance_m)
}
