//! Topology document handed over by the persistence layer.
//!
//! This is the raw, loosely-typed payload of `getTopologySnapshot`. It is
//! parsed with serde and then validated into a [`TopologySnapshot`].
//!
//! [`TopologySnapshot`]: crate::store::snapshot::TopologySnapshot

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::FiberResult;
use crate::models::{BoxId, BoxKind, CableEnd, CableId, Coordinate, DioFace};
use crate::store::catalog::{CatalogRecord, LossValue};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SplitterRecord {
    pub id: String,
    pub catalog: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DioRecord {
    pub id: String,
    pub slots: u16,
    /// Connector catalog id used for patches that name no loss of their own.
    #[serde(default)]
    pub connector: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OltRecord {
    pub id: String,
    pub pons: u16,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoxRecord {
    pub id: BoxId,
    pub kind: BoxKind,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub location: Option<Coordinate>,
    #[serde(default)]
    pub splitters: Vec<SplitterRecord>,
    #[serde(default)]
    pub dios: Vec<DioRecord>,
    #[serde(default)]
    pub olts: Vec<OltRecord>,
}

/// Fibers of a tube: either a plain count or the recorded color of each.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TubeFibers {
    Count(u16),
    Colors(Vec<String>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TubeRecord {
    #[serde(default)]
    pub color: Option<String>,
    pub fibers: TubeFibers,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CableRecord {
    pub id: CableId,
    #[serde(default)]
    pub from_box: Option<BoxId>,
    #[serde(default)]
    pub to_box: Option<BoxId>,
    #[serde(default)]
    pub path: Vec<Coordinate>,
    /// Explicit optical length; overrides the geometric length.
    #[serde(default)]
    pub length_m: Option<f64>,
    #[serde(default)]
    pub attenuation_db_per_km: Option<LossValue>,
    #[serde(default)]
    pub catalog: Option<String>,
    #[serde(default)]
    pub tubes: Vec<TubeRecord>,
}

/// Port reference as recorded in splice and patch rows. The cable end of a
/// fiber port is implied by the box unless the cable starts and ends there.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PortRef {
    Fiber {
        cable: CableId,
        tube: u16,
        fiber: u16,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        end: Option<CableEnd>,
    },
    SplitterInput {
        splitter: String,
        #[serde(default = "first_index")]
        index: u16,
    },
    SplitterOutput {
        splitter: String,
        leg: u16,
    },
    Dio {
        dio: String,
        slot: u16,
        face: DioFace,
    },
    Olt {
        olt: String,
        pon: u16,
    },
}

fn first_index() -> u16 {
    1
}

/// A splice or patch row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    #[serde(rename = "box")]
    pub box_id: BoxId,
    pub a: PortRef,
    pub b: PortRef,
    #[serde(default)]
    pub catalog: Option<String>,
    #[serde(default)]
    pub loss_db: Option<LossValue>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyDocument {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub revision: Option<String>,
    #[serde(default)]
    pub catalog: CatalogRecord,
    #[serde(default)]
    pub boxes: Vec<BoxRecord>,
    #[serde(default)]
    pub cables: Vec<CableRecord>,
    #[serde(default)]
    pub splices: Vec<ConnectionRecord>,
    #[serde(default)]
    pub patches: Vec<ConnectionRecord>,
}

impl TopologyDocument {
    pub fn from_json_str(json: &str) -> FiberResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: &Path) -> FiberResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Short content hash (first 16 hex chars of SHA-256 over the JSON
    /// encoding), used as a cache revision token.
    pub fn fingerprint(&self) -> FiberResult<String> {
        let encoded = serde_json::to_vec(self)?;
        let mut hasher = Sha256::new();
        hasher.update(&encoded);
        let digest = format!("{:x}", hasher.finalize());
        Ok(digest[..16].to_string())
    }
}
