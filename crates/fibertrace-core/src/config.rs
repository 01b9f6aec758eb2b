//! Engine configuration with environment overrides.

use serde::{Deserialize, Serialize};

use crate::query::guards::{
    clamp_epsilon, clamp_int, clamp_loss, DEFAULT_BOUNDARY_EPSILON_M, MAX_ATTENUATION_DB_PER_KM,
    MAX_BRANCHES, MAX_BRANCHES_CEILING, MAX_DEPTH, MAX_DEPTH_CEILING, MAX_LOSS_DB,
    MAX_TRACE_STEPS, MAX_TRACE_STEPS_CEILING,
};
use crate::splicing::colors::ColorStandard;

/// How the auto-splice matcher orders fibers when two cables have different
/// tube/fiber layouts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpliceFallback {
    /// Rank tubes then fibers by the configured color standard.
    ColorCode,
    /// Plain tube/fiber index order.
    Sequential,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_depth: usize,
    pub max_trace_steps: usize,
    pub max_branches: usize,
    pub boundary_epsilon_m: f64,
    pub default_fusion_loss_db: f64,
    pub default_connector_loss_db: f64,
    pub default_cable_db_per_km: f64,
    pub color_standard: ColorStandard,
    pub splice_fallback: SpliceFallback,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: MAX_DEPTH,
            max_trace_steps: MAX_TRACE_STEPS,
            max_branches: MAX_BRANCHES,
            boundary_epsilon_m: DEFAULT_BOUNDARY_EPSILON_M,
            default_fusion_loss_db: 0.1,
            default_connector_loss_db: 0.5,
            default_cable_db_per_km: 0.35,
            color_standard: ColorStandard::Abnt,
            splice_fallback: SpliceFallback::ColorCode,
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
}

fn env_usize(key: &str) -> Option<i64> {
    env_string(key).and_then(|v| v.parse::<i64>().ok())
}

fn env_f64(key: &str) -> Option<f64> {
    env_string(key).and_then(|v| v.replace(',', ".").parse::<f64>().ok())
}

impl EngineConfig {
    /// Defaults overridden by `FIBERTRACE_*` environment variables.
    /// Unparsable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_usize("FIBERTRACE_MAX_DEPTH") {
            config.max_depth = v.max(0) as usize;
        }
        if let Some(v) = env_usize("FIBERTRACE_MAX_TRACE_STEPS") {
            config.max_trace_steps = v.max(0) as usize;
        }
        if let Some(v) = env_usize("FIBERTRACE_MAX_BRANCHES") {
            config.max_branches = v.max(0) as usize;
        }
        if let Some(v) = env_f64("FIBERTRACE_BOUNDARY_EPSILON_M") {
            config.boundary_epsilon_m = v;
        }
        if let Some(v) = env_f64("FIBERTRACE_DEFAULT_FUSION_DB") {
            config.default_fusion_loss_db = v;
        }
        if let Some(v) = env_f64("FIBERTRACE_DEFAULT_CONNECTOR_DB") {
            config.default_connector_loss_db = v;
        }
        if let Some(v) = env_f64("FIBERTRACE_DEFAULT_CABLE_DB_KM") {
            config.default_cable_db_per_km = v;
        }
        if let Some(v) = env_string("FIBERTRACE_COLOR_STANDARD") {
            match v.as_str() {
                "abnt" | "nbr" | "nbr14160" => config.color_standard = ColorStandard::Abnt,
                "eia" | "eia598" | "tia598" | "eia/tia-598" => {
                    config.color_standard = ColorStandard::Eia598
                }
                other => tracing::warn!(value = other, "ignoring unknown color standard"),
            }
        }
        if let Some(v) = env_string("FIBERTRACE_AUTO_SPLICE_FALLBACK") {
            match v.as_str() {
                "color_code" | "color" => config.splice_fallback = SpliceFallback::ColorCode,
                "sequential" | "index" => config.splice_fallback = SpliceFallback::Sequential,
                other => tracing::warn!(value = other, "ignoring unknown splice fallback"),
            }
        }
        config.clamped()
    }

    /// Pull every numeric knob back inside its guard range.
    pub fn clamped(mut self) -> Self {
        self.max_depth = clamp_int(self.max_depth as i64, 1, MAX_DEPTH_CEILING as i64) as usize;
        self.max_trace_steps =
            clamp_int(self.max_trace_steps as i64, 1, MAX_TRACE_STEPS_CEILING as i64) as usize;
        self.max_branches =
            clamp_int(self.max_branches as i64, 1, MAX_BRANCHES_CEILING as i64) as usize;
        self.boundary_epsilon_m = clamp_epsilon(self.boundary_epsilon_m);
        self.default_fusion_loss_db = clamp_loss(self.default_fusion_loss_db, MAX_LOSS_DB);
        self.default_connector_loss_db = clamp_loss(self.default_connector_loss_db, MAX_LOSS_DB);
        self.default_cable_db_per_km =
            clamp_loss(self.default_cable_db_per_km, MAX_ATTENUATION_DB_PER_KM);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_depth, 500);
        assert_eq!(config.color_standard, ColorStandard::Abnt);
        assert_eq!(config.splice_fallback, SpliceFallback::ColorCode);
    }

    #[test]
    fn test_clamped_pulls_values_into_range() {
        let config = EngineConfig {
            max_depth: 0,
            max_trace_steps: usize::MAX / 2,
            boundary_epsilon_m: -3.0,
            default_fusion_loss_db: f64::NAN,
            ..EngineConfig::default()
        }
        .clamped();
        assert_eq!(config.max_depth, 1);
        assert_eq!(config.max_trace_steps, MAX_TRACE_STEPS_CEILING);
        assert_eq!(config.boundary_epsilon_m, 0.0);
        assert_eq!(config.default_fusion_loss_db, 0.0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"max_depth": 64, "color_standard": "eia598"}"#).unwrap();
        assert_eq!(config.max_depth, 64);
        assert_eq!(config.color_standard, ColorStandard::Eia598);
        assert_eq!(config.max_branches, MAX_BRANCHES);
    }
}
