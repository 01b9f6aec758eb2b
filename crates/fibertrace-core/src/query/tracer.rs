//! Depth-guarded path tracer across cables and through box adjacency.
//!
//! The walk is an explicit loop over a work stack, never recursion. A branch's
//! depth is the number of hops it has emitted (one per cable, one per splice,
//! patch or device crossing). A branch deeper than `max_depth` hops, or a trace
//! that exceeds the global step or branch budget, ends with
//! [`Terminal::MaxDepthReached`].

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{FiberError, FiberResult};
use crate::models::{BoxId, CableEnd, CableId, Endpoint, FiberRef};
use crate::query::adjacency::{resolve, Link, LinkKind, Traversal};
use crate::store::snapshot::TopologySnapshot;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Where a probe injects its signal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StartPoint {
    /// Launch at the end of `fiber` opposite `toward` and travel toward it.
    Fiber { fiber: FiberRef, toward: CableEnd },
    /// Launch into the device behind a box port. OLT ports emit through
    /// their patch cord.
    Port {
        #[serde(rename = "box")]
        box_id: BoxId,
        port: Endpoint,
    },
}

impl StartPoint {
    pub fn fiber(cable: &str, tube: u16, fiber: u16, toward: CableEnd) -> Self {
        StartPoint::Fiber {
            fiber: FiberRef::new(cable, tube, fiber),
            toward,
        }
    }

    pub fn port(box_id: &str, port: Endpoint) -> Self {
        StartPoint::Port {
            box_id: box_id.to_string(),
            port,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "hop", rename_all = "snake_case")]
pub enum Hop {
    Cable {
        cable: CableId,
        fiber: FiberRef,
        entered_at: CableEnd,
        /// Distance from the probe origin to the cable entry.
        start_m: f64,
        length_m: f64,
        loss_db: f64,
    },
    Junction {
        #[serde(rename = "box")]
        box_id: BoxId,
        /// Port the signal moved onto.
        port: Endpoint,
        event: LinkKind,
        at_m: f64,
        loss_db: f64,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "terminal", rename_all = "snake_case")]
pub enum Terminal {
    /// Cable end with no box.
    OpenEnd { cable: CableId, fiber: FiberRef },
    /// Fiber or device port with nothing connected inside the box.
    NotSpliced {
        #[serde(rename = "box")]
        box_id: BoxId,
        port: Endpoint,
    },
    /// OLT port or subscriber ONT.
    EquipmentConnection {
        #[serde(rename = "box")]
        box_id: BoxId,
        port: Endpoint,
    },
    MaxDepthReached,
    /// Branch stopped once it passed the distance limit.
    DistanceLimit,
}

/// One fully walked branch.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TracePath {
    pub hops: Vec<Hop>,
    pub terminal: Terminal,
    pub distance_m: f64,
    pub loss_db: f64,
    pub steps: usize,
}

impl TracePath {
    pub fn cables(&self) -> impl Iterator<Item = &CableId> {
        self.hops.iter().filter_map(|hop| match hop {
            Hop::Cable { cable, .. } => Some(cable),
            Hop::Junction { .. } => None,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Trace {
    /// Branches in depth-first order, splitter legs ascending.
    pub paths: Vec<TracePath>,
    pub total_steps: usize,
    /// Some branch was cut by a guard.
    pub truncated: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TraceLimit {
    Unbounded,
    /// Stop a branch before entering a cable once it is past this distance.
    Distance(f64),
}

// ---------------------------------------------------------------------------
// Tracer
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
enum Cursor {
    Cable { fiber: FiberRef, from_end: CableEnd },
    Outward { box_id: BoxId, port: Endpoint },
    Inward { box_id: BoxId, port: Endpoint },
}

#[derive(Clone, Debug)]
struct Branch {
    cursor: Cursor,
    hops: Vec<Hop>,
    distance_m: f64,
    loss_db: f64,
    steps: usize,
}

impl Branch {
    fn finish(self, terminal: Terminal) -> TracePath {
        TracePath {
            hops: self.hops,
            terminal,
            distance_m: self.distance_m,
            loss_db: self.loss_db,
            steps: self.steps,
        }
    }

    fn cross(&mut self, box_id: &str, link: Link, next: Cursor) {
        self.loss_db += link.loss_db;
        self.hops.push(Hop::Junction {
            box_id: box_id.to_string(),
            port: link.to,
            event: link.kind,
            at_m: self.distance_m,
            loss_db: link.loss_db,
        });
        self.cursor = next;
    }
}

enum Advance {
    Continue,
    Fork(Vec<Branch>),
    Stop(Terminal),
}

pub struct PathTracer<'a> {
    snapshot: &'a TopologySnapshot,
    limit: TraceLimit,
}

impl<'a> PathTracer<'a> {
    pub fn new(snapshot: &'a TopologySnapshot) -> Self {
        Self {
            snapshot,
            limit: TraceLimit::Unbounded,
        }
    }

    pub fn with_limit(mut self, limit: TraceLimit) -> Self {
        self.limit = limit;
        self
    }

    pub fn trace(&self, start: &StartPoint) -> FiberResult<Trace> {
        let config = self.snapshot.config();
        let mut stack = vec![self.initial_branch(start)?];
        let mut paths: Vec<TracePath> = Vec::new();
        let mut total_steps = 0usize;
        let mut branches = 1usize;
        let mut truncated = false;

        while let Some(mut branch) = stack.pop() {
            loop {
                if branch.hops.len() >= config.max_depth
                    || total_steps >= config.max_trace_steps
                {
                    warn!(
                        depth = branch.hops.len(),
                        steps = branch.steps,
                        total_steps,
                        distance_m = branch.distance_m,
                        "trace guard tripped"
                    );
                    truncated = true;
                    paths.push(branch.finish(Terminal::MaxDepthReached));
                    break;
                }
                branch.steps += 1;
                total_steps += 1;
                match self.advance(&mut branch)? {
                    Advance::Continue => {}
                    Advance::Fork(extra) => {
                        let mut kept = Vec::with_capacity(extra.len());
                        for fork in extra {
                            if branches >= config.max_branches {
                                truncated = true;
                                paths.push(fork.finish(Terminal::MaxDepthReached));
                            } else {
                                branches += 1;
                                kept.push(fork);
                            }
                        }
                        // Lowest leg must pop first.
                        stack.extend(kept.into_iter().rev());
                    }
                    Advance::Stop(terminal) => {
                        paths.push(branch.finish(terminal));
                        break;
                    }
                }
            }
        }

        debug!(
            branches = paths.len(),
            total_steps, truncated, "trace complete"
        );
        Ok(Trace {
            paths,
            total_steps,
            truncated,
        })
    }

    fn initial_branch(&self, start: &StartPoint) -> FiberResult<Branch> {
        let cursor = match start {
            StartPoint::Fiber { fiber, toward } => {
                let cable = self.snapshot.require_cable(&fiber.cable)?;
                if !cable.has_fiber(fiber) {
                    return Err(FiberError::FiberNotFound(fiber.to_string()));
                }
                Cursor::Cable {
                    fiber: fiber.clone(),
                    from_end: toward.opposite(),
                }
            }
            StartPoint::Port { box_id, port } => {
                self.snapshot.require_port(box_id, port)?;
                match port {
                    Endpoint::Fiber { fiber, end } => Cursor::Cable {
                        fiber: fiber.clone(),
                        from_end: *end,
                    },
                    Endpoint::Olt { .. } => Cursor::Outward {
                        box_id: box_id.clone(),
                        port: port.clone(),
                    },
                    _ => Cursor::Inward {
                        box_id: box_id.clone(),
                        port: port.clone(),
                    },
                }
            }
        };
        Ok(Branch {
            cursor,
            hops: Vec::new(),
            distance_m: 0.0,
            loss_db: 0.0,
            steps: 0,
        })
    }

    fn advance(&self, branch: &mut Branch) -> FiberResult<Advance> {
        match branch.cursor.clone() {
            Cursor::Cable { fiber, from_end } => {
                if let TraceLimit::Distance(limit) = self.limit {
                    if branch.distance_m > limit + self.snapshot.config().boundary_epsilon_m {
                        return Ok(Advance::Stop(Terminal::DistanceLimit));
                    }
                }
                let cable = self.snapshot.require_cable(&fiber.cable)?;
                if !cable.has_fiber(&fiber) {
                    return Err(FiberError::FiberNotFound(fiber.to_string()));
                }
                let loss_db = cable.loss_db(cable.length_m);
                branch.hops.push(Hop::Cable {
                    cable: cable.id.clone(),
                    fiber: fiber.clone(),
                    entered_at: from_end,
                    start_m: branch.distance_m,
                    length_m: cable.length_m,
                    loss_db,
                });
                branch.distance_m += cable.length_m;
                branch.loss_db += loss_db;

                let far_end = from_end.opposite();
                let Some(box_id) = cable.box_at(far_end) else {
                    return Ok(Advance::Stop(Terminal::OpenEnd {
                        cable: cable.id.clone(),
                        fiber,
                    }));
                };
                let port = Endpoint::fiber(fiber, far_end);
                if self.snapshot.require_box(box_id)?.kind.is_equipment() {
                    return Ok(Advance::Stop(Terminal::EquipmentConnection {
                        box_id: box_id.clone(),
                        port,
                    }));
                }
                branch.cursor = Cursor::Outward {
                    box_id: box_id.clone(),
                    port,
                };
                Ok(Advance::Continue)
            }
            Cursor::Outward { box_id, port } => {
                let mut links = resolve(self.snapshot, &box_id, &port, Traversal::Outward)?;
                let Some(link) = links.pop() else {
                    return Ok(Advance::Stop(Terminal::NotSpliced { box_id, port }));
                };
                let next = Cursor::Inward {
                    box_id: box_id.clone(),
                    port: link.to.clone(),
                };
                branch.cross(&box_id, link, next);
                Ok(Advance::Continue)
            }
            Cursor::Inward { box_id, port } => {
                if let Endpoint::Fiber { fiber, end } = &port {
                    let cable = self.snapshot.require_cable(&fiber.cable)?;
                    if cable.box_at(*end).map(String::as_str) != Some(box_id.as_str()) {
                        return Err(FiberError::ConnectivityMismatch {
                            box_id: box_id.clone(),
                            port: port.to_string(),
                            detail: format!("cable {} {end} end is not in this box", cable.id),
                        });
                    }
                    branch.cursor = Cursor::Cable {
                        fiber: fiber.clone(),
                        from_end: *end,
                    };
                    return Ok(Advance::Continue);
                }
                if port.is_equipment() {
                    return Ok(Advance::Stop(Terminal::EquipmentConnection { box_id, port }));
                }
                let mut links = resolve(self.snapshot, &box_id, &port, Traversal::Inward)?.into_iter();
                let Some(first) = links.next() else {
                    return Ok(Advance::Stop(Terminal::NotSpliced { box_id, port }));
                };
                let forks: Vec<Branch> = links
                    .map(|link| {
                        let mut fork = branch.clone();
                        let next = Cursor::Outward {
                            box_id: box_id.clone(),
                            port: link.to.clone(),
                        };
                        fork.cross(&box_id, link, next);
                        fork
                    })
                    .collect();
                let next = Cursor::Outward {
                    box_id: box_id.clone(),
                    port: first.to.clone(),
                };
                branch.cross(&box_id, first, next);
                if forks.is_empty() {
                    Ok(Advance::Continue)
                } else {
                    Ok(Advance::Fork(forks))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::EngineConfig;
    use crate::models::DioFace;
    use crate::testing::{build, build_with, pop_to_onts, splice_loop, splitter_fanout, two_cable_cto};

    #[test]
    fn test_two_cable_path_hops() {
        let snapshot = build(two_cable_cto());
        let trace = PathTracer::new(&snapshot)
            .trace(&StartPoint::fiber("c1", 1, 1, CableEnd::To))
            .unwrap();
        assert_eq!(trace.paths.len(), 1);
        let path = &trace.paths[0];
        assert_eq!(path.distance_m, 1000.0);
        assert_eq!(path.cables().collect::<Vec<_>>(), vec!["c1", "c2"]);
        assert!(matches!(
            &path.hops[1],
            Hop::Junction { box_id, event: LinkKind::Fusion, at_m, .. }
                if box_id == "cto-1" && *at_m == 500.0
        ));
        assert_eq!(
            path.terminal,
            Terminal::OpenEnd {
                cable: "c2".into(),
                fiber: FiberRef::new("c2", 1, 1)
            }
        );
        assert!(!trace.truncated);
    }

    #[test]
    fn test_not_spliced_is_distinct_from_open_end() {
        let snapshot = build(two_cable_cto());
        let trace = PathTracer::new(&snapshot)
            .trace(&StartPoint::fiber("c1", 1, 5, CableEnd::To))
            .unwrap();
        assert_eq!(
            trace.paths[0].terminal,
            Terminal::NotSpliced {
                box_id: "cto-1".into(),
                port: Endpoint::fiber(FiberRef::new("c1", 1, 5), CableEnd::To),
            }
        );
    }

    #[test]
    fn test_splice_loop_hits_depth_guard() {
        let snapshot = build(splice_loop());
        let trace = PathTracer::new(&snapshot)
            .trace(&StartPoint::fiber("a", 1, 1, CableEnd::To))
            .unwrap();
        assert_eq!(trace.paths.len(), 1);
        assert_eq!(trace.paths[0].terminal, Terminal::MaxDepthReached);
        assert_eq!(trace.paths[0].hops.len(), 500);
        assert!(trace.truncated);
    }

    #[test]
    fn test_long_acyclic_chain_is_not_cut_by_depth_guard() {
        let spans = 200;
        let boxes: Vec<_> = (1..spans)
            .map(|i| json!({"id": format!("ceo-{i}"), "kind": "ceo"}))
            .collect();
        let cables: Vec<_> = (0..spans)
            .map(|i| {
                let mut cable = json!({"id": format!("span-{i}"), "length_m": 10, "tubes": [{"fibers": 1}]});
                if i > 0 {
                    cable["from_box"] = json!(format!("ceo-{i}"));
                }
                if i + 1 < spans {
                    cable["to_box"] = json!(format!("ceo-{}", i + 1));
                }
                cable
            })
            .collect();
        let splices: Vec<_> = (1..spans)
            .map(|i| {
                json!({"box": format!("ceo-{i}"),
                    "a": {"type": "fiber", "cable": format!("span-{}", i - 1), "tube": 1, "fiber": 1},
                    "b": {"type": "fiber", "cable": format!("span-{i}"), "tube": 1, "fiber": 1}})
            })
            .collect();
        let snapshot = build(json!({"boxes": boxes, "cables": cables, "splices": splices}));
        let trace = PathTracer::new(&snapshot)
            .trace(&StartPoint::fiber("span-0", 1, 1, CableEnd::To))
            .unwrap();
        let path = &trace.paths[0];
        assert!(matches!(&path.terminal, Terminal::OpenEnd { cable, .. } if cable == "span-199"));
        assert_eq!(path.cables().count(), 200);
        assert_eq!(path.hops.len(), 399);
        assert!(!trace.truncated);
    }

    #[test]
    fn test_output_leg_resolves_to_single_input() {
        let snapshot = build(pop_to_onts());
        let trace = PathTracer::new(&snapshot)
            .trace(&StartPoint::fiber("drop-1", 1, 1, CableEnd::From))
            .unwrap();
        assert_eq!(trace.paths.len(), 1);
        let path = &trace.paths[0];
        assert_eq!(path.cables().collect::<Vec<_>>(), vec!["drop-1", "feeder"]);
        assert_eq!(
            path.terminal,
            Terminal::EquipmentConnection {
                box_id: "pop-1".into(),
                port: Endpoint::Olt {
                    olt: "o1".into(),
                    pon: 1
                },
            }
        );
        assert_eq!(path.distance_m, 2100.0);
    }

    #[test]
    fn test_input_fans_out_in_leg_order() {
        let snapshot = build(splitter_fanout());
        let trace = PathTracer::new(&snapshot)
            .trace(&StartPoint::fiber("feeder", 1, 1, CableEnd::To))
            .unwrap();
        assert_eq!(trace.paths.len(), 8);
        for (i, path) in trace.paths.iter().enumerate() {
            let drop = format!("drop-{}", i + 1);
            assert_eq!(path.cables().last(), Some(&drop));
            assert!(matches!(path.terminal, Terminal::EquipmentConnection { .. }));
        }
    }

    #[test]
    fn test_olt_port_start_emits_through_patch() {
        let snapshot = build(pop_to_onts());
        let start = StartPoint::port(
            "pop-1",
            Endpoint::Olt {
                olt: "o1".into(),
                pon: 1,
            },
        );
        let trace = PathTracer::new(&snapshot).trace(&start).unwrap();
        assert_eq!(trace.paths.len(), 2);
        let first = &trace.paths[0];
        assert!(matches!(
            &first.hops[0],
            Hop::Junction { event: LinkKind::Patch, port: Endpoint::Dio { face: DioFace::Front, .. }, .. }
        ));
    }

    #[test]
    fn test_branch_budget_truncates_fanout() {
        let config = EngineConfig {
            max_branches: 3,
            ..EngineConfig::default()
        };
        let snapshot = build_with(splitter_fanout(), config);
        let trace = PathTracer::new(&snapshot)
            .trace(&StartPoint::fiber("feeder", 1, 1, CableEnd::To))
            .unwrap();
        assert_eq!(trace.paths.len(), 8);
        assert!(trace.truncated);
        let cut = trace
            .paths
            .iter()
            .filter(|p| p.terminal == Terminal::MaxDepthReached)
            .count();
        assert_eq!(cut, 5);
        let survivors: Vec<&CableId> = trace
            .paths
            .iter()
            .filter(|p| p.terminal != Terminal::MaxDepthReached)
            .filter_map(|p| p.cables().last())
            .collect();
        assert_eq!(survivors, vec!["drop-1", "drop-2", "drop-3"]);
    }

    #[test]
    fn test_distance_limit_stops_before_next_cable() {
        let snapshot = build(two_cable_cto());
        let trace = PathTracer::new(&snapshot)
            .with_limit(TraceLimit::Distance(100.0))
            .trace(&StartPoint::fiber("c1", 1, 1, CableEnd::To))
            .unwrap();
        let path = &trace.paths[0];
        assert_eq!(path.terminal, Terminal::DistanceLimit);
        assert_eq!(path.cables().count(), 1);
    }

    #[test]
    fn test_unknown_cable_and_fiber_are_errors() {
        let snapshot = build(two_cable_cto());
        let err = PathTracer::new(&snapshot)
            .trace(&StartPoint::fiber("nope", 1, 1, CableEnd::To))
            .unwrap_err();
        assert!(matches!(err, FiberError::CableNotFound(_)));

        let snapshot = build(json!({
            "boxes": [{"id": "ceo", "kind": "ceo"}],
            "cables": [{"id": "a", "to_box": "ceo", "length_m": 5, "tubes": [{"fibers": 1}]}],
            "splices": [{"box": "ceo",
                "a": {"type": "fiber", "cable": "a", "tube": 1, "fiber": 1},
                "b": {"type": "fiber", "cable": "ghost", "tube": 1, "fiber": 1, "end": "from"}}]
        }));
        let err = PathTracer::new(&snapshot)
            .trace(&StartPoint::fiber("a", 1, 1, CableEnd::To))
            .unwrap_err();
        assert!(matches!(err, FiberError::CableNotFound(ref id) if id == "ghost"));
    }

    #[test]
    fn test_unknown_start_port_rejected() {
        let snapshot = build(splitter_fanout());
        let err = PathTracer::new(&snapshot)
            .trace(&StartPoint::port(
                "cto-1",
                Endpoint::SplitterOutput {
                    splitter: "s1".into(),
                    leg: 9,
                },
            ))
            .unwrap_err();
        assert!(matches!(err, FiberError::PortNotFound { .. }));
    }
}
