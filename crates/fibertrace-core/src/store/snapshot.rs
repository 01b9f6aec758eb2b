//! Immutable, validated in-memory view of one project's outside plant.
//!
//! Built from a [`TopologyDocument`] before a trace request. Catalog values,
//! device references and port ranges are validated here; problems that only
//! show up when a particular path is walked (asymmetric edges, fibers of
//! cables missing from the snapshot) are reported lazily by the tracer.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::errors::{FiberError, FiberResult};
use crate::models::{BoxId, BoxKind, CableEnd, CableId, Coordinate, Endpoint, FiberRef};
use crate::query::adjacency::BoxAdjacency;
use crate::query::guards::MAX_ATTENUATION_DB_PER_KM;
use crate::query::guards::MAX_LOSS_DB;
use crate::splicing::colors::FiberColor;
use crate::store::catalog::{parse_loss, LossCatalog, SplitterSpec};
use crate::store::document::{
    CableRecord, ConnectionRecord, PortRef, TopologyDocument, TubeFibers,
};
use crate::store::geometry::{interpolate, polyline_length_m};

// ---------------------------------------------------------------------------
// Cables
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub struct Fiber {
    pub index: u16,
    pub color: Option<FiberColor>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Tube {
    pub index: u16,
    pub color: Option<FiberColor>,
    pub fibers: Vec<Fiber>,
}

#[derive(Clone, Debug)]
pub struct Cable {
    pub id: CableId,
    pub from_box: Option<BoxId>,
    pub to_box: Option<BoxId>,
    pub path: Vec<Coordinate>,
    pub geometric_length_m: f64,
    pub length_m: f64,
    pub attenuation_db_per_km: f64,
    pub tubes: Vec<Tube>,
}

impl Cable {
    pub fn box_at(&self, end: CableEnd) -> Option<&BoxId> {
        match end {
            CableEnd::From => self.from_box.as_ref(),
            CableEnd::To => self.to_box.as_ref(),
        }
    }

    /// Ends of this cable terminating at `box_id` (two for a cable that
    /// starts and ends in the same box).
    pub fn ends_at(&self, box_id: &str) -> Vec<CableEnd> {
        [CableEnd::From, CableEnd::To]
            .into_iter()
            .filter(|end| self.box_at(*end).map(String::as_str) == Some(box_id))
            .collect()
    }

    pub fn tube(&self, tube: u16) -> Option<&Tube> {
        self.tubes.get((tube as usize).checked_sub(1)?)
    }

    pub fn fiber(&self, tube: u16, fiber: u16) -> Option<&Fiber> {
        self.tube(tube)?.fibers.get((fiber as usize).checked_sub(1)?)
    }

    pub fn has_fiber(&self, fiber: &FiberRef) -> bool {
        fiber.cable == self.id && self.fiber(fiber.tube, fiber.fiber).is_some()
    }

    pub fn fiber_count(&self) -> usize {
        self.tubes.iter().map(|t| t.fibers.len()).sum()
    }

    /// Same number of tubes with the same fiber count in each.
    pub fn same_layout(&self, other: &Cable) -> bool {
        self.tubes.len() == other.tubes.len()
            && self
                .tubes
                .iter()
                .zip(&other.tubes)
                .all(|(a, b)| a.fibers.len() == b.fibers.len())
    }

    /// Every fiber of the cable in tube/fiber order.
    pub fn fiber_refs(&self) -> impl Iterator<Item = (FiberRef, &Tube, &Fiber)> + '_ {
        self.tubes.iter().flat_map(move |tube| {
            tube.fibers
                .iter()
                .map(move |fiber| (FiberRef::new(&self.id, tube.index, fiber.index), tube, fiber))
        })
    }

    /// Attenuation of `meters` of this cable.
    pub fn loss_db(&self, meters: f64) -> f64 {
        self.attenuation_db_per_km * meters / 1000.0
    }

    /// Location `offset_m` optical meters into the cable from `entered_at`.
    /// When an explicit length overrides the geometry the offset is scaled
    /// onto the polyline.
    pub fn point_at(&self, entered_at: CableEnd, offset_m: f64) -> Option<Coordinate> {
        if self.path.is_empty() {
            return None;
        }
        let from_start = match entered_at {
            CableEnd::From => offset_m,
            CableEnd::To => self.length_m - offset_m,
        };
        let geometric = if self.length_m > 0.0 {
            from_start / self.length_m * self.geometric_length_m
        } else {
            0.0
        };
        interpolate(&self.path, geometric)
    }
}

// ---------------------------------------------------------------------------
// Boxes and devices
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct Splitter {
    pub id: String,
    pub catalog_id: String,
    pub spec: SplitterSpec,
}

#[derive(Clone, Debug)]
pub struct Dio {
    pub id: String,
    pub slots: u16,
    pub connector: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Olt {
    pub id: String,
    pub pons: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    Fusion,
    Patch,
}

/// One recorded splice or patch edge, as stored. Not guaranteed to be
/// consistent with the other edges of the box.
#[derive(Clone, Debug)]
pub struct Connection {
    pub kind: ConnectionKind,
    pub a: Endpoint,
    pub b: Endpoint,
    pub loss_db: f64,
}

#[derive(Clone, Debug)]
pub struct FiberBox {
    pub id: BoxId,
    pub kind: BoxKind,
    pub name: Option<String>,
    pub location: Option<Coordinate>,
    pub splitters: IndexMap<String, Splitter>,
    pub dios: IndexMap<String, Dio>,
    pub olts: IndexMap<String, Olt>,
    pub connections: Vec<Connection>,
    /// Cable ends terminating in this box, in document order.
    pub cable_ends: Vec<(CableId, CableEnd)>,
}

impl FiberBox {
    /// Whether a device port (splitter leg, DIO face, OLT PON) exists here.
    /// Fiber ports are checked against the snapshot's cables instead.
    pub fn has_device_port(&self, endpoint: &Endpoint) -> bool {
        match endpoint {
            Endpoint::Fiber { .. } => false,
            Endpoint::SplitterInput { splitter, index } => self
                .splitters
                .get(splitter)
                .is_some_and(|s| (1..=s.spec.inputs).contains(index)),
            Endpoint::SplitterOutput { splitter, leg } => self
                .splitters
                .get(splitter)
                .is_some_and(|s| (1..=s.spec.outputs).contains(leg)),
            Endpoint::Dio { dio, slot, .. } => self
                .dios
                .get(dio)
                .is_some_and(|d| (1..=d.slots).contains(slot)),
            Endpoint::Olt { olt, pon } => self
                .olts
                .get(olt)
                .is_some_and(|o| (1..=o.pons).contains(pon)),
        }
    }

    /// Ports that already carry a splice or patch.
    pub fn occupied_ports(&self) -> HashSet<&Endpoint> {
        self.connections
            .iter()
            .flat_map(|c| [&c.a, &c.b])
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct TopologySnapshot {
    project_id: String,
    revision: Option<String>,
    config: EngineConfig,
    boxes: IndexMap<BoxId, FiberBox>,
    cables: IndexMap<CableId, Cable>,
    /// Per-box adjacency, built the first time a trace visits the box.
    pub(crate) adjacency_cache: RwLock<HashMap<BoxId, Arc<BoxAdjacency>>>,
}

impl TopologySnapshot {
    /// Build with configuration taken from the environment.
    pub fn build(document: &TopologyDocument) -> FiberResult<Self> {
        Self::build_with_config(document, EngineConfig::from_env())
    }

    pub fn from_json_str(json: &str, config: EngineConfig) -> FiberResult<Self> {
        Self::build_with_config(&TopologyDocument::from_json_str(json)?, config)
    }

    pub fn build_with_config(document: &TopologyDocument, config: EngineConfig) -> FiberResult<Self> {
        let config = config.clamped();
        let catalog = LossCatalog::from_record(&document.catalog)?;

        let mut boxes: IndexMap<BoxId, FiberBox> = IndexMap::new();
        for record in &document.boxes {
            if boxes.contains_key(&record.id) {
                return Err(invalid(format!("duplicate box id {:?}", record.id)));
            }
            if let Some(location) = record.location {
                if !location.is_valid() {
                    return Err(invalid(format!("box {}: invalid location", record.id)));
                }
            }
            let mut fiber_box = FiberBox {
                id: record.id.clone(),
                kind: record.kind,
                name: record.name.clone(),
                location: record.location,
                splitters: IndexMap::new(),
                dios: IndexMap::new(),
                olts: IndexMap::new(),
                connections: Vec::new(),
                cable_ends: Vec::new(),
            };
            let has_devices =
                !record.splitters.is_empty() || !record.dios.is_empty() || !record.olts.is_empty();
            if has_devices && !record.kind.allows_splicing() {
                return Err(invalid(format!(
                    "box {}: {:?} boxes cannot hold devices",
                    record.id, record.kind
                )));
            }
            for splitter in &record.splitters {
                let spec = catalog.splitter(&splitter.catalog)?.clone();
                let device = Splitter {
                    id: splitter.id.clone(),
                    catalog_id: splitter.catalog.clone(),
                    spec,
                };
                if fiber_box.splitters.insert(splitter.id.clone(), device).is_some() {
                    return Err(invalid(format!(
                        "box {}: duplicate splitter {:?}",
                        record.id, splitter.id
                    )));
                }
            }
            for dio in &record.dios {
                if dio.slots == 0 {
                    return Err(invalid(format!("box {}: dio {} has no slots", record.id, dio.id)));
                }
                if let Some(connector) = &dio.connector {
                    catalog.connector(connector)?;
                }
                let device = Dio {
                    id: dio.id.clone(),
                    slots: dio.slots,
                    connector: dio.connector.clone(),
                };
                if fiber_box.dios.insert(dio.id.clone(), device).is_some() {
                    return Err(invalid(format!("box {}: duplicate dio {:?}", record.id, dio.id)));
                }
            }
            for olt in &record.olts {
                if olt.pons == 0 {
                    return Err(invalid(format!("box {}: olt {} has no ports", record.id, olt.id)));
                }
                let device = Olt {
                    id: olt.id.clone(),
                    pons: olt.pons,
                };
                if fiber_box.olts.insert(olt.id.clone(), device).is_some() {
                    return Err(invalid(format!("box {}: duplicate olt {:?}", record.id, olt.id)));
                }
            }
            boxes.insert(record.id.clone(), fiber_box);
        }

        let mut cables: IndexMap<CableId, Cable> = IndexMap::new();
        for record in &document.cables {
            if cables.contains_key(&record.id) {
                return Err(invalid(format!("duplicate cable id {:?}", record.id)));
            }
            let cable = build_cable(record, &catalog, &config)?;
            for end in [CableEnd::From, CableEnd::To] {
                if let Some(box_id) = cable.box_at(end) {
                    let fiber_box = boxes.get_mut(box_id).ok_or_else(|| {
                        invalid(format!("cable {}: unknown box {box_id:?}", cable.id))
                    })?;
                    fiber_box.cable_ends.push((cable.id.clone(), end));
                }
            }
            cables.insert(record.id.clone(), cable);
        }

        for record in &document.splices {
            let connection = build_connection(
                record,
                ConnectionKind::Fusion,
                &boxes,
                &cables,
                &catalog,
                &config,
            )?;
            if let Some(fiber_box) = boxes.get_mut(&record.box_id) {
                fiber_box.connections.push(connection);
            }
        }
        for record in &document.patches {
            let connection = build_connection(
                record,
                ConnectionKind::Patch,
                &boxes,
                &cables,
                &catalog,
                &config,
            )?;
            if let Some(fiber_box) = boxes.get_mut(&record.box_id) {
                fiber_box.connections.push(connection);
            }
        }

        info!(
            project = %document.project_id,
            boxes = boxes.len(),
            cables = cables.len(),
            splices = document.splices.len(),
            patches = document.patches.len(),
            "built topology snapshot"
        );

        Ok(Self {
            project_id: document.project_id.clone(),
            revision: document.revision.clone(),
            config,
            boxes,
            cables,
            adjacency_cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn boxes(&self) -> impl Iterator<Item = &FiberBox> {
        self.boxes.values()
    }

    pub fn cables(&self) -> impl Iterator<Item = &Cable> {
        self.cables.values()
    }

    pub fn cable(&self, id: &str) -> Option<&Cable> {
        self.cables.get(id)
    }

    pub fn fiber_box(&self, id: &str) -> Option<&FiberBox> {
        self.boxes.get(id)
    }

    pub fn require_cable(&self, id: &str) -> FiberResult<&Cable> {
        self.cable(id)
            .ok_or_else(|| FiberError::CableNotFound(id.to_string()))
    }

    pub fn require_box(&self, id: &str) -> FiberResult<&FiberBox> {
        self.fiber_box(id)
            .ok_or_else(|| FiberError::BoxNotFound(id.to_string()))
    }

    /// Number of boxes whose adjacency has been resolved so far.
    pub fn resolved_boxes(&self) -> usize {
        self.adjacency_cache.read().len()
    }

    /// Fail unless `endpoint` is a real port of `box_id`.
    pub fn require_port(&self, box_id: &str, endpoint: &Endpoint) -> FiberResult<()> {
        let fiber_box = self.require_box(box_id)?;
        let exists = match endpoint {
            Endpoint::Fiber { fiber, end } => {
                let cable = self.require_cable(&fiber.cable)?;
                if !cable.has_fiber(fiber) {
                    return Err(FiberError::FiberNotFound(fiber.to_string()));
                }
                cable.box_at(*end).map(String::as_str) == Some(box_id)
            }
            other => fiber_box.has_device_port(other),
        };
        if exists {
            Ok(())
        } else {
            Err(FiberError::PortNotFound {
                box_id: box_id.to_string(),
                port: endpoint.to_string(),
            })
        }
    }
}

fn invalid(message: String) -> FiberError {
    FiberError::InvalidTopology(message)
}

/// 1-based tube or fiber position from a list offset.
fn position(offset: usize, what: &str) -> FiberResult<u16> {
    u16::try_from(offset + 1).map_err(|_| invalid(format!("{what} has more than {} entries", u16::MAX)))
}

fn build_cable(
    record: &CableRecord,
    catalog: &LossCatalog,
    config: &EngineConfig,
) -> FiberResult<Cable> {
    if let Some(bad) = record.path.iter().find(|c| !c.is_valid()) {
        return Err(invalid(format!(
            "cable {}: invalid coordinate [{}, {}]",
            record.id, bad.lat, bad.lng
        )));
    }
    let geometric_length_m = polyline_length_m(&record.path);
    let length_m = match record.length_m {
        Some(length) if length.is_finite() && length >= 0.0 => length,
        Some(length) => {
            return Err(invalid(format!(
                "cable {}: length must be non-negative, got {length}",
                record.id
            )))
        }
        None => geometric_length_m,
    };
    let what = format!("cable {}", record.id);
    let attenuation_db_per_km = match (&record.attenuation_db_per_km, &record.catalog) {
        (Some(value), _) => parse_loss(value, &what, MAX_ATTENUATION_DB_PER_KM)?,
        (None, Some(catalog_id)) => catalog.cable(catalog_id)?,
        (None, None) => config.default_cable_db_per_km,
    };

    let mut tubes = Vec::with_capacity(record.tubes.len());
    for (i, tube) in record.tubes.iter().enumerate() {
        let color = tube.color.as_deref().map(str::parse::<FiberColor>).transpose()?;
        let fibers = match &tube.fibers {
            TubeFibers::Count(count) => (1..=*count)
                .map(|index| Fiber { index, color: None })
                .collect(),
            TubeFibers::Colors(colors) => {
                let tube_label = format!("{what} tube {}", i + 1);
                colors
                    .iter()
                    .enumerate()
                    .map(|(j, name)| {
                        Ok(Fiber {
                            index: position(j, &tube_label)?,
                            color: Some(name.parse::<FiberColor>()?),
                        })
                    })
                    .collect::<FiberResult<Vec<Fiber>>>()?
            }
        };
        tubes.push(Tube {
            index: position(i, &what)?,
            color,
            fibers,
        });
    }

    Ok(Cable {
        id: record.id.clone(),
        from_box: record.from_box.clone(),
        to_box: record.to_box.clone(),
        path: record.path.clone(),
        geometric_length_m,
        length_m,
        attenuation_db_per_km,
        tubes,
    })
}

fn build_connection(
    record: &ConnectionRecord,
    kind: ConnectionKind,
    boxes: &IndexMap<BoxId, FiberBox>,
    cables: &IndexMap<CableId, Cable>,
    catalog: &LossCatalog,
    config: &EngineConfig,
) -> FiberResult<Connection> {
    let fiber_box = boxes
        .get(&record.box_id)
        .ok_or_else(|| invalid(format!("connection in unknown box {:?}", record.box_id)))?;
    if !fiber_box.kind.allows_splicing() {
        return Err(invalid(format!(
            "box {}: {:?} boxes are pass-through only",
            fiber_box.id, fiber_box.kind
        )));
    }
    let a = resolve_port(fiber_box, cables, &record.a)?;
    let b = resolve_port(fiber_box, cables, &record.b)?;
    if a == b {
        return Err(invalid(format!("box {}: {a} connected to itself", fiber_box.id)));
    }
    let role_ok = match kind {
        ConnectionKind::Fusion => a.is_spliceable() && b.is_spliceable(),
        ConnectionKind::Patch => {
            a.is_patchable() && b.is_patchable() && !(a.is_equipment() && b.is_equipment())
        }
    };
    if !role_ok {
        return Err(invalid(format!(
            "box {}: {kind:?} cannot join {a} and {b}",
            fiber_box.id
        )));
    }

    let what = format!("{kind:?} {a} <-> {b} in box {}", fiber_box.id);
    let loss_db = match (&record.loss_db, &record.catalog, kind) {
        (Some(value), _, _) => parse_loss(value, &what, MAX_LOSS_DB)?,
        (None, Some(id), ConnectionKind::Fusion) => catalog.fusion(id)?,
        (None, Some(id), ConnectionKind::Patch) => catalog.connector(id)?,
        (None, None, ConnectionKind::Fusion) => config.default_fusion_loss_db,
        (None, None, ConnectionKind::Patch) => match dio_connector(fiber_box, &a, &b) {
            Some(id) => catalog.connector(id)?,
            None => config.default_connector_loss_db,
        },
    };
    Ok(Connection { kind, a, b, loss_db })
}

/// Connector catalog id declared by a DIO on either end of a patch.
fn dio_connector<'a>(fiber_box: &'a FiberBox, a: &Endpoint, b: &Endpoint) -> Option<&'a str> {
    [a, b].into_iter().find_map(|endpoint| match endpoint {
        Endpoint::Dio { dio, .. } => fiber_box.dios.get(dio)?.connector.as_deref(),
        _ => None,
    })
}

fn resolve_port(
    fiber_box: &FiberBox,
    cables: &IndexMap<CableId, Cable>,
    port: &PortRef,
) -> FiberResult<Endpoint> {
    let endpoint = match port {
        PortRef::Fiber {
            cable,
            tube,
            fiber,
            end,
        } => {
            let fiber_ref = FiberRef::new(cable, *tube, *fiber);
            let Some(found) = cables.get(cable) else {
                warn!(
                    box_id = %fiber_box.id,
                    fiber = %fiber_ref,
                    "splice references a cable missing from the snapshot"
                );
                return Ok(Endpoint::fiber(fiber_ref, end.unwrap_or(CableEnd::From)));
            };
            if !found.has_fiber(&fiber_ref) {
                return Err(invalid(format!(
                    "box {}: cable {cable} has no fiber {tube}:{fiber}",
                    fiber_box.id
                )));
            }
            let ends = found.ends_at(&fiber_box.id);
            let end = match (end, ends.as_slice()) {
                (_, []) => {
                    return Err(invalid(format!(
                        "box {}: cable {cable} does not terminate here",
                        fiber_box.id
                    )))
                }
                (Some(end), _) if ends.contains(end) => *end,
                (Some(end), _) => {
                    return Err(invalid(format!(
                        "box {}: cable {cable} {end} end is elsewhere",
                        fiber_box.id
                    )))
                }
                (None, [only]) => *only,
                (None, _) => {
                    return Err(invalid(format!(
                        "box {}: cable {cable} starts and ends here; the fiber end is required",
                        fiber_box.id
                    )))
                }
            };
            Endpoint::fiber(fiber_ref, end)
        }
        PortRef::SplitterInput { splitter, index } => Endpoint::SplitterInput {
            splitter: splitter.clone(),
            index: *index,
        },
        PortRef::SplitterOutput { splitter, leg } => Endpoint::SplitterOutput {
            splitter: splitter.clone(),
            leg: *leg,
        },
        PortRef::Dio { dio, slot, face } => Endpoint::Dio {
            dio: dio.clone(),
            slot: *slot,
            face: *face,
        },
        PortRef::Olt { olt, pon } => Endpoint::Olt {
            olt: olt.clone(),
            pon: *pon,
        },
    };
    if !matches!(endpoint, Endpoint::Fiber { .. }) && !fiber_box.has_device_port(&endpoint) {
        return Err(invalid(format!(
            "box {}: no such port {endpoint}",
            fiber_box.id
        )));
    }
    Ok(endpoint)
}
