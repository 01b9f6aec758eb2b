//! Splice graph resolver: which port a signal reaches next inside a box.
//!
//! Adjacency is resolved per box the first time a trace visits it and cached
//! on the snapshot, so boxes a probe never reaches cost nothing.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{FiberError, FiberResult};
use crate::models::{BoxId, BoxKind, CableEnd, DioFace, Endpoint};
use crate::store::snapshot::{ConnectionKind, FiberBox, TopologySnapshot};

/// Which side of a port the signal is leaving through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Traversal {
    /// Cross the splice or patch attached to the port.
    Outward,
    /// Pass through the device behind the port (splitter, DIO slot).
    Inward,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinkKind {
    Fusion,
    Patch,
    /// Fiber continuing through a pole on the same tube/fiber position.
    PassThrough,
    SplitterLeg { leg: u16 },
    DioSlot,
}

/// One edge out of a port.
#[derive(Clone, Debug, PartialEq)]
pub struct Link {
    pub to: Endpoint,
    pub loss_db: f64,
    pub kind: LinkKind,
}

#[derive(Debug)]
struct PortEdge {
    link: Link,
    /// This port or its partner is claimed by more than one record.
    contested: bool,
}

/// Resolved adjacency of a single box.
#[derive(Debug)]
pub struct BoxAdjacency {
    box_id: BoxId,
    kind: BoxKind,
    edges: HashMap<Endpoint, PortEdge>,
    devices: HashMap<Endpoint, Vec<Link>>,
    pole_cables: Vec<(String, CableEnd)>,
}

impl BoxAdjacency {
    fn build(fiber_box: &FiberBox) -> Self {
        let mut edges: HashMap<Endpoint, PortEdge> = HashMap::new();
        let mut claims: HashMap<Endpoint, usize> = HashMap::new();
        for connection in &fiber_box.connections {
            let kind = match connection.kind {
                ConnectionKind::Fusion => LinkKind::Fusion,
                ConnectionKind::Patch => LinkKind::Patch,
            };
            for (from, to) in [(&connection.a, &connection.b), (&connection.b, &connection.a)] {
                *claims.entry(from.clone()).or_default() += 1;
                let edge = PortEdge {
                    link: Link {
                        to: to.clone(),
                        loss_db: connection.loss_db,
                        kind,
                    },
                    contested: false,
                };
                if let Some(previous) = edges.insert(from.clone(), edge) {
                    warn!(
                        box_id = %fiber_box.id,
                        port = %from,
                        replaced = %previous.link.to,
                        "port carries more than one splice or patch"
                    );
                }
            }
        }
        // Every edge touching a double-claimed port is contested, from
        // either side.
        let claimed_twice = |port: &Endpoint| claims.get(port).is_some_and(|&n| n > 1);
        for (from, edge) in edges.iter_mut() {
            if claimed_twice(from) || claimed_twice(&edge.link.to) {
                edge.contested = true;
            }
        }

        let mut devices: HashMap<Endpoint, Vec<Link>> = HashMap::new();
        for splitter in fiber_box.splitters.values() {
            let spec = &splitter.spec;
            let outputs: Vec<Link> = (1..=spec.outputs)
                .map(|leg| Link {
                    to: Endpoint::SplitterOutput {
                        splitter: splitter.id.clone(),
                        leg,
                    },
                    loss_db: spec.leg_loss(leg).unwrap_or_default(),
                    kind: LinkKind::SplitterLeg { leg },
                })
                .collect();
            for index in 1..=spec.inputs {
                devices.insert(
                    Endpoint::SplitterInput {
                        splitter: splitter.id.clone(),
                        index,
                    },
                    outputs.clone(),
                );
            }
            for leg in 1..=spec.outputs {
                let inputs = (1..=spec.inputs)
                    .map(|index| Link {
                        to: Endpoint::SplitterInput {
                            splitter: splitter.id.clone(),
                            index,
                        },
                        loss_db: spec.leg_loss(leg).unwrap_or_default(),
                        kind: LinkKind::SplitterLeg { leg },
                    })
                    .collect();
                devices.insert(
                    Endpoint::SplitterOutput {
                        splitter: splitter.id.clone(),
                        leg,
                    },
                    inputs,
                );
            }
        }
        for dio in fiber_box.dios.values() {
            for slot in 1..=dio.slots {
                for face in [DioFace::Rear, DioFace::Front] {
                    let here = Endpoint::Dio {
                        dio: dio.id.clone(),
                        slot,
                        face,
                    };
                    let there = Endpoint::Dio {
                        dio: dio.id.clone(),
                        slot,
                        face: face.opposite(),
                    };
                    devices.insert(
                        here,
                        vec![Link {
                            to: there,
                            loss_db: 0.0,
                            kind: LinkKind::DioSlot,
                        }],
                    );
                }
            }
        }

        let pole_cables = if fiber_box.kind == BoxKind::Pole {
            fiber_box.cable_ends.clone()
        } else {
            Vec::new()
        };

        Self {
            box_id: fiber_box.id.clone(),
            kind: fiber_box.kind,
            edges,
            devices,
            pole_cables,
        }
    }

    /// Links out of `endpoint` in the given traversal direction. An empty
    /// list means the signal dead-ends here.
    pub fn links(
        &self,
        snapshot: &TopologySnapshot,
        endpoint: &Endpoint,
        traversal: Traversal,
    ) -> FiberResult<Vec<Link>> {
        match traversal {
            Traversal::Outward if self.kind == BoxKind::Pole => {
                self.pole_pass_through(snapshot, endpoint)
            }
            Traversal::Outward => self.outward(endpoint),
            Traversal::Inward => Ok(self.devices.get(endpoint).cloned().unwrap_or_default()),
        }
    }

    fn outward(&self, endpoint: &Endpoint) -> FiberResult<Vec<Link>> {
        let Some(edge) = self.edges.get(endpoint) else {
            return Ok(Vec::new());
        };
        let reciprocal = self
            .edges
            .get(&edge.link.to)
            .is_some_and(|back| &back.link.to == endpoint);
        if edge.contested {
            return Err(FiberError::ConnectivityMismatch {
                box_id: self.box_id.clone(),
                port: endpoint.to_string(),
                detail: format!("{} carries more than one splice or patch", edge.link.to),
            });
        }
        if !reciprocal {
            return Err(FiberError::ConnectivityMismatch {
                box_id: self.box_id.clone(),
                port: endpoint.to_string(),
                detail: format!("{} does not point back", edge.link.to),
            });
        }
        Ok(vec![edge.link.clone()])
    }

    fn pole_pass_through(
        &self,
        snapshot: &TopologySnapshot,
        endpoint: &Endpoint,
    ) -> FiberResult<Vec<Link>> {
        let Endpoint::Fiber { fiber, end } = endpoint else {
            return Ok(Vec::new());
        };
        let others: Vec<&(String, CableEnd)> = self
            .pole_cables
            .iter()
            .filter(|(cable, e)| !(cable == &fiber.cable && e == end))
            .collect();
        let [(cable_id, other_end)] = others.as_slice() else {
            return Ok(Vec::new());
        };
        let continued = fiber.on_cable(cable_id);
        if !snapshot.require_cable(cable_id)?.has_fiber(&continued) {
            return Ok(Vec::new());
        }
        Ok(vec![Link {
            to: Endpoint::fiber(continued, *other_end),
            loss_db: 0.0,
            kind: LinkKind::PassThrough,
        }])
    }
}

/// Adjacency for a box, resolved on first use and cached on the snapshot.
pub fn box_adjacency(snapshot: &TopologySnapshot, box_id: &str) -> FiberResult<Arc<BoxAdjacency>> {
    if let Some(cached) = snapshot.adjacency_cache.read().get(box_id) {
        return Ok(Arc::clone(cached));
    }
    let fiber_box = snapshot.require_box(box_id)?;
    let built = Arc::new(BoxAdjacency::build(fiber_box));
    debug!(
        box_id,
        edges = built.edges.len(),
        device_ports = built.devices.len(),
        "resolved box adjacency"
    );
    let mut cache = snapshot.adjacency_cache.write();
    Ok(Arc::clone(
        cache.entry(box_id.to_string()).or_insert(built),
    ))
}

/// `adjacency(boxId, port, direction)`: the ports reachable from `endpoint`.
/// OLT ports resolve to an empty list.
pub fn resolve(
    snapshot: &TopologySnapshot,
    box_id: &str,
    endpoint: &Endpoint,
    traversal: Traversal,
) -> FiberResult<Vec<Link>> {
    if endpoint.is_equipment() && traversal == Traversal::Inward {
        return Ok(Vec::new());
    }
    box_adjacency(snapshot, box_id)?.links(snapshot, endpoint, traversal)
}
