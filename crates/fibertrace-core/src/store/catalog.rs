//! Device loss catalog: strict parsing of mixed loss encodings.
//!
//! Catalog values arrive as JSON numbers or free-form strings (`"0,35"`,
//! `"0.1 dB"`, `"0.35 dB/km"`). Unbalanced splitters may carry a per-leg list
//! or a legacy `{"port1": .., "port2": ..}` object. Everything is validated
//! once here so the tracer only ever sees plain `f64` losses.

use std::collections::HashMap;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{FiberError, FiberResult};
use crate::query::guards::{MAX_ATTENUATION_DB_PER_KM, MAX_LOSS_DB};

static LOSS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(\d+(?:[.,]\d+)?|[.,]\d+)\s*(?:db(?:\s*/\s*km)?)?\s*$").unwrap()
});

static LEG_KEY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s*$").unwrap());

// ---------------------------------------------------------------------------
// Raw catalog records
// ---------------------------------------------------------------------------

/// A loss figure as stored upstream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LossValue {
    Number(f64),
    Text(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SplitterLossRecord {
    Balanced(LossValue),
    Legs(Vec<LossValue>),
    Named(IndexMap<String, LossValue>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SplitterCatalogRecord {
    #[serde(default = "default_inputs")]
    pub inputs: u16,
    pub outputs: u16,
    #[serde(alias = "legs")]
    pub loss: SplitterLossRecord,
}

fn default_inputs() -> u16 {
    1
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogRecord {
    pub fusions: IndexMap<String, LossValue>,
    pub connectors: IndexMap<String, LossValue>,
    pub cables: IndexMap<String, LossValue>,
    pub splitters: IndexMap<String, SplitterCatalogRecord>,
}

// ---------------------------------------------------------------------------
// Parsed catalog
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub enum SplitterLoss {
    Balanced(f64),
    /// Loss per output leg, index 0 is leg 1.
    Unbalanced(Vec<f64>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct SplitterSpec {
    pub inputs: u16,
    pub outputs: u16,
    pub loss: SplitterLoss,
}

impl SplitterSpec {
    /// Loss of a 1-based output leg.
    pub fn leg_loss(&self, leg: u16) -> Option<f64> {
        if leg == 0 || leg > self.outputs {
            return None;
        }
        match &self.loss {
            SplitterLoss::Balanced(db) => Some(*db),
            SplitterLoss::Unbalanced(legs) => legs.get(leg as usize - 1).copied(),
        }
    }

    pub fn is_balanced(&self) -> bool {
        matches!(self.loss, SplitterLoss::Balanced(_))
    }
}

#[derive(Clone, Debug, Default)]
pub struct LossCatalog {
    fusions: HashMap<String, f64>,
    connectors: HashMap<String, f64>,
    cables: HashMap<String, f64>,
    splitters: HashMap<String, SplitterSpec>,
}

/// Parse one loss figure, rejecting negatives and anything non-numeric.
pub fn parse_loss(value: &LossValue, what: &str, maximum: f64) -> FiberResult<f64> {
    let parsed = match value {
        LossValue::Number(n) => *n,
        LossValue::Text(text) => {
            let caps = LOSS_RE.captures(text).ok_or_else(|| {
                FiberError::InvalidCatalog(format!("{what}: cannot parse {text:?}"))
            })?;
            caps[1].replace(',', ".").parse::<f64>().map_err(|_| {
                FiberError::InvalidCatalog(format!("{what}: cannot parse {text:?}"))
            })?
        }
    };
    if !parsed.is_finite() || parsed < 0.0 {
        return Err(FiberError::InvalidCatalog(format!(
            "{what}: loss must be a non-negative number, got {parsed}"
        )));
    }
    if parsed > maximum {
        return Err(FiberError::InvalidCatalog(format!(
            "{what}: {parsed} exceeds the {maximum} limit"
        )));
    }
    Ok(parsed)
}

fn parse_splitter(id: &str, record: &SplitterCatalogRecord) -> FiberResult<SplitterSpec> {
    let what = format!("splitter {id}");
    if record.outputs == 0 || record.inputs == 0 {
        return Err(FiberError::InvalidCatalog(format!(
            "{what}: needs at least one input and one output"
        )));
    }
    let loss = match &record.loss {
        SplitterLossRecord::Balanced(value) => {
            SplitterLoss::Balanced(parse_loss(value, &what, MAX_LOSS_DB)?)
        }
        SplitterLossRecord::Legs(values) => {
            if values.len() != record.outputs as usize {
                return Err(FiberError::InvalidCatalog(format!(
                    "{what}: {} leg losses for {} outputs",
                    values.len(),
                    record.outputs
                )));
            }
            let legs = values
                .iter()
                .map(|v| parse_loss(v, &what, MAX_LOSS_DB))
                .collect::<FiberResult<Vec<f64>>>()?;
            SplitterLoss::Unbalanced(legs)
        }
        SplitterLossRecord::Named(table) => {
            let mut legs: Vec<Option<f64>> = vec![None; record.outputs as usize];
            for (key, value) in table {
                let leg = LEG_KEY_RE
                    .captures(key)
                    .and_then(|caps| caps[1].parse::<usize>().ok())
                    .filter(|leg| (1..=legs.len()).contains(leg))
                    .ok_or_else(|| {
                        FiberError::InvalidCatalog(format!("{what}: bad leg key {key:?}"))
                    })?;
                if legs[leg - 1].is_some() {
                    return Err(FiberError::InvalidCatalog(format!(
                        "{what}: leg {leg} listed twice"
                    )));
                }
                legs[leg - 1] = Some(parse_loss(value, &what, MAX_LOSS_DB)?);
            }
            let legs = legs
                .into_iter()
                .enumerate()
                .map(|(i, db)| {
                    db.ok_or_else(|| {
                        FiberError::InvalidCatalog(format!("{what}: missing loss for leg {}", i + 1))
                    })
                })
                .collect::<FiberResult<Vec<f64>>>()?;
            SplitterLoss::Unbalanced(legs)
        }
    };
    Ok(SplitterSpec {
        inputs: record.inputs,
        outputs: record.outputs,
        loss,
    })
}

impl LossCatalog {
    pub fn from_record(record: &CatalogRecord) -> FiberResult<Self> {
        let mut catalog = LossCatalog::default();
        for (id, value) in &record.fusions {
            let db = parse_loss(value, &format!("fusion {id}"), MAX_LOSS_DB)?;
            catalog.fusions.insert(id.clone(), db);
        }
        for (id, value) in &record.connectors {
            let db = parse_loss(value, &format!("connector {id}"), MAX_LOSS_DB)?;
            catalog.connectors.insert(id.clone(), db);
        }
        for (id, value) in &record.cables {
            let db = parse_loss(value, &format!("cable {id}"), MAX_ATTENUATION_DB_PER_KM)?;
            catalog.cables.insert(id.clone(), db);
        }
        for (id, splitter) in &record.splitters {
            catalog
                .splitters
                .insert(id.clone(), parse_splitter(id, splitter)?);
        }
        Ok(catalog)
    }

    pub fn fusion(&self, id: &str) -> FiberResult<f64> {
        lookup(&self.fusions, id, "fusion")
    }

    pub fn connector(&self, id: &str) -> FiberResult<f64> {
        lookup(&self.connectors, id, "connector")
    }

    pub fn cable(&self, id: &str) -> FiberResult<f64> {
        lookup(&self.cables, id, "cable")
    }

    pub fn splitter(&self, id: &str) -> FiberResult<&SplitterSpec> {
        self.splitters
            .get(id)
            .ok_or_else(|| FiberError::InvalidCatalog(format!("unknown splitter catalog id {id:?}")))
    }
}

fn lookup(table: &HashMap<String, f64>, id: &str, what: &str) -> FiberResult<f64> {
    table
        .get(id)
        .copied()
        .ok_or_else(|| FiberError::InvalidCatalog(format!("unknown {what} catalog id {id:?}")))
}
