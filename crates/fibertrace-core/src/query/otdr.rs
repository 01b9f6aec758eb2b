//! OTDR distance-to-event resolution over traced paths.

use serde::Serialize;
use tracing::debug;

use crate::errors::{FiberError, FiberResult};
use crate::models::{BoxId, CableEnd, CableId, Coordinate, Endpoint, FiberRef};
use crate::query::adjacency::LinkKind;
use crate::query::guards::validate_probe_distance;
use crate::query::tracer::{Hop, PathTracer, StartPoint, Terminal, TraceLimit, TracePath};
use crate::store::snapshot::TopologySnapshot;

/// Where a probe distance lands.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OtdrResult {
    /// Inside a cable, `length_left_m` meters from the end the pulse entered.
    InCable {
        cable: CableId,
        fiber: FiberRef,
        entered_at: CableEnd,
        length_left_m: f64,
        point: Option<Coordinate>,
    },
    SplicedJunction {
        #[serde(rename = "box")]
        box_id: BoxId,
        /// Every crossing between the two cables, in order.
        events: Vec<LinkKind>,
        distance_m: f64,
    },
    NotSpliced {
        #[serde(rename = "box")]
        box_id: BoxId,
        port: Endpoint,
        distance_m: f64,
    },
    EquipmentConnection {
        #[serde(rename = "box")]
        box_id: BoxId,
        port: Endpoint,
        distance_m: f64,
    },
    OpenEnd {
        cable: CableId,
        fiber: FiberRef,
        distance_m: f64,
    },
    DistanceExceedsNetwork { max_reachable_m: f64 },
    DistanceExceedsLength { cable: CableId, max_reachable_m: f64 },
    MaxDepthReached {
        partial_path: Vec<Hop>,
        traversed_m: f64,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OtdrReport {
    pub distance_m: f64,
    /// One entry per traced branch, identical outcomes collapsed.
    pub results: Vec<OtdrResult>,
    pub truncated: bool,
}

impl OtdrReport {
    /// The only result of an unbranched probe.
    pub fn single(&self) -> Option<&OtdrResult> {
        match self.results.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }
}

/// `traceOtdr`: locate the event `distance_m` meters from the probe origin.
pub fn trace_otdr(
    snapshot: &TopologySnapshot,
    start: &StartPoint,
    distance_m: f64,
) -> FiberResult<OtdrReport> {
    let distance_m = validate_probe_distance(distance_m)?;
    let epsilon = snapshot.config().boundary_epsilon_m;
    let trace = PathTracer::new(snapshot)
        .with_limit(TraceLimit::Distance(distance_m))
        .trace(start)?;

    let mut results: Vec<OtdrResult> = Vec::with_capacity(trace.paths.len());
    for path in &trace.paths {
        let result = resolve_path(path, distance_m, epsilon);
        if !results.contains(&result) {
            results.push(result);
        }
    }
    debug!(
        distance_m,
        branches = trace.paths.len(),
        results = results.len(),
        "otdr probe resolved"
    );
    Ok(OtdrReport {
        distance_m,
        results,
        truncated: trace.truncated,
    })
}

/// Walk the cable hops of one branch, consuming `distance_m`.
pub fn resolve_path(path: &TracePath, distance_m: f64, epsilon: f64) -> OtdrResult {
    let mut remaining = distance_m;
    for (i, hop) in path.hops.iter().enumerate() {
        let Hop::Cable {
            cable,
            fiber,
            entered_at,
            start_m,
            length_m,
            ..
        } = hop
        else {
            continue;
        };
        if (remaining - length_m).abs() <= epsilon {
            return boundary(path, i + 1, start_m + length_m);
        }
        if remaining < *length_m {
            return OtdrResult::InCable {
                cable: cable.clone(),
                fiber: fiber.clone(),
                entered_at: *entered_at,
                length_left_m: remaining,
                point: None,
            };
        }
        remaining -= length_m;
    }
    match &path.terminal {
        Terminal::MaxDepthReached => OtdrResult::MaxDepthReached {
            partial_path: path.hops.clone(),
            traversed_m: path.distance_m,
        },
        _ => OtdrResult::DistanceExceedsNetwork {
            max_reachable_m: path.distance_m,
        },
    }
}

/// Classify the far end of a cable: junction if another cable follows,
/// otherwise the branch terminal.
fn boundary(path: &TracePath, next: usize, at_m: f64) -> OtdrResult {
    let rest = &path.hops[next..];
    let crossings: Vec<(&BoxId, LinkKind)> = rest
        .iter()
        .map_while(|hop| match hop {
            Hop::Junction { box_id, event, .. } => Some((box_id, *event)),
            Hop::Cable { .. } => None,
        })
        .collect();
    let continues = rest.len() > crossings.len();
    if continues {
        if let Some((box_id, _)) = crossings.first() {
            return OtdrResult::SplicedJunction {
                box_id: (*box_id).clone(),
                events: crossings.iter().map(|(_, kind)| *kind).collect(),
                distance_m: at_m,
            };
        }
    }
    match &path.terminal {
        Terminal::OpenEnd { cable, fiber } => OtdrResult::OpenEnd {
            cable: cable.clone(),
            fiber: fiber.clone(),
            distance_m: at_m,
        },
        Terminal::NotSpliced { box_id, port } => OtdrResult::NotSpliced {
            box_id: box_id.clone(),
            port: port.clone(),
            distance_m: at_m,
        },
        Terminal::EquipmentConnection { box_id, port } => OtdrResult::EquipmentConnection {
            box_id: box_id.clone(),
            port: port.clone(),
            distance_m: at_m,
        },
        Terminal::MaxDepthReached => OtdrResult::MaxDepthReached {
            partial_path: path.hops.clone(),
            traversed_m: path.distance_m,
        },
        Terminal::DistanceLimit => match crossings.first() {
            Some((box_id, _)) => OtdrResult::SplicedJunction {
                box_id: (*box_id).clone(),
                events: crossings.iter().map(|(_, kind)| *kind).collect(),
                distance_m: at_m,
            },
            None => OtdrResult::DistanceExceedsNetwork {
                max_reachable_m: path.distance_m,
            },
        },
    }
}

/// Fill in the interpolated location of an in-cable result.
fn locate(snapshot: &TopologySnapshot, result: OtdrResult) -> FiberResult<OtdrResult> {
    match result {
        OtdrResult::InCable {
            cable,
            fiber,
            entered_at,
            length_left_m,
            ..
        } => {
            let point = snapshot
                .require_cable(&cable)?
                .point_at(entered_at, length_left_m);
            Ok(OtdrResult::InCable {
                cable,
                fiber,
                entered_at,
                length_left_m,
                point,
            })
        }
        other => Ok(other),
    }
}

/// Single-cable lookup: `distance_m` meters along `fiber` from `from_end`.
/// The far end itself still counts as inside the cable.
pub fn locate_on_cable(
    snapshot: &TopologySnapshot,
    fiber: &FiberRef,
    from_end: CableEnd,
    distance_m: f64,
) -> FiberResult<OtdrResult> {
    let distance_m = validate_probe_distance(distance_m)?;
    let cable = snapshot.require_cable(&fiber.cable)?;
    if !cable.has_fiber(fiber) {
        return Err(FiberError::FiberNotFound(fiber.to_string()));
    }
    if distance_m > cable.length_m + snapshot.config().boundary_epsilon_m {
        return Ok(OtdrResult::DistanceExceedsLength {
            cable: cable.id.clone(),
            max_reachable_m: cable.length_m,
        });
    }
    let length_left_m = distance_m.min(cable.length_m);
    Ok(OtdrResult::InCable {
        cable: cable.id.clone(),
        fiber: fiber.clone(),
        entered_at: from_end,
        length_left_m,
        point: cable.point_at(from_end, length_left_m),
    })
}

/// [`trace_otdr`] with in-cable results located on the cable geometry.
pub fn trace_otdr_located(
    snapshot: &TopologySnapshot,
    start: &StartPoint,
    distance_m: f64,
) -> FiberResult<OtdrReport> {
    let report = trace_otdr(snapshot, start, distance_m)?;
    let results = report
        .results
        .into_iter()
        .map(|result| locate(snapshot, result))
        .collect::<FiberResult<Vec<_>>>()?;
    Ok(OtdrReport { results, ..report })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{build, lat_at, pop_to_onts, splice_loop, splitter_fanout, two_cable_cto};

    fn from_c1_start() -> StartPoint {
        StartPoint::fiber("c1", 1, 1, CableEnd::To)
    }

    #[test]
    fn test_boundary_exactness_reports_junction() {
        let snapshot = build(two_cable_cto());
        let report = trace_otdr_located(&snapshot, &from_c1_start(), 500.0).unwrap();
        assert_eq!(
            report.single(),
            Some(&OtdrResult::SplicedJunction {
                box_id: "cto-1".into(),
                events: vec![LinkKind::Fusion],
                distance_m: 500.0,
            })
        );
        let near = trace_otdr(&snapshot, &from_c1_start(), 500.005).unwrap();
        assert!(matches!(near.single(), Some(OtdrResult::SplicedJunction { .. })));
    }

    #[test]
    fn test_in_cable_700m_scenario() {
        let snapshot = build(two_cable_cto());
        let report = trace_otdr_located(&snapshot, &from_c1_start(), 700.0).unwrap();
        let Some(OtdrResult::InCable {
            cable,
            entered_at,
            length_left_m,
            point: Some(point),
            ..
        }) = report.single()
        else {
            panic!("expected located in-cable result, got {report:?}");
        };
        assert_eq!(cable, "c2");
        assert_eq!(*entered_at, CableEnd::From);
        assert!((length_left_m - 200.0).abs() < 1e-9);
        assert!((point.lat - lat_at(700.0)).abs() < 1e-9);
        assert_eq!(point.lng, 0.0);
    }

    #[test]
    fn test_distance_exceeds_network() {
        let snapshot = build(two_cable_cto());
        let report = trace_otdr(&snapshot, &from_c1_start(), 1100.0).unwrap();
        assert_eq!(
            report.single(),
            Some(&OtdrResult::DistanceExceedsNetwork {
                max_reachable_m: 1000.0
            })
        );
    }

    #[test]
    fn test_full_length_hits_open_end_in_both_directions() {
        let snapshot = build(two_cable_cto());
        let forward = trace_otdr(&snapshot, &from_c1_start(), 1000.0).unwrap();
        let Some(OtdrResult::OpenEnd { cable, distance_m, .. }) = forward.single() else {
            panic!("expected open end, got {forward:?}");
        };
        assert_eq!(cable, "c2");

        let back = trace_otdr(&snapshot, &StartPoint::fiber("c2", 1, 1, CableEnd::From), 1000.0)
            .unwrap();
        let Some(OtdrResult::OpenEnd {
            cable: back_cable,
            distance_m: back_distance,
            ..
        }) = back.single()
        else {
            panic!("expected open end, got {back:?}");
        };
        assert_eq!(back_cable, "c1");
        assert!((distance_m - back_distance).abs() < 1e-9);
    }

    #[test]
    fn test_unspliced_fiber_boundary() {
        let snapshot = build(two_cable_cto());
        let report = trace_otdr(&snapshot, &StartPoint::fiber("c1", 1, 2, CableEnd::To), 500.0)
            .unwrap();
        assert!(matches!(
            report.single(),
            Some(OtdrResult::NotSpliced { box_id, distance_m, .. })
                if box_id == "cto-1" && *distance_m == 500.0
        ));
    }

    #[test]
    fn test_fanout_reports_each_branch() {
        let snapshot = build(pop_to_onts());
        let start = StartPoint::port(
            "pop-1",
            Endpoint::Olt {
                olt: "o1".into(),
                pon: 1,
            },
        );
        let report = trace_otdr(&snapshot, &start, 2100.0).unwrap();
        assert_eq!(report.results.len(), 2);
        assert!(matches!(
            &report.results[0],
            OtdrResult::EquipmentConnection { box_id, .. } if box_id == "ont-1"
        ));
        assert!(matches!(
            &report.results[1],
            OtdrResult::InCable { cable, length_left_m, .. }
                if cable == "drop-2" && (*length_left_m - 100.0).abs() < 1e-9
        ));
    }

    #[test]
    fn test_identical_branch_outcomes_collapse() {
        let snapshot = build(splitter_fanout());
        let report = trace_otdr(&snapshot, &StartPoint::fiber("feeder", 1, 1, CableEnd::To), 400.0)
            .unwrap();
        assert_eq!(report.results.len(), 1);

        let report = trace_otdr(&snapshot, &StartPoint::fiber("feeder", 1, 1, CableEnd::To), 1000.0)
            .unwrap();
        assert_eq!(report.results.len(), 8);
        for (k, result) in (1u16..).zip(&report.results) {
            let OtdrResult::SplicedJunction { box_id, events, .. } = result else {
                panic!("expected junction, got {result:?}");
            };
            assert_eq!(box_id, "cto-1");
            assert_eq!(
                events,
                &vec![
                    LinkKind::Fusion,
                    LinkKind::SplitterLeg { leg: k },
                    LinkKind::Fusion
                ]
            );
        }
    }

    #[test]
    fn test_loop_surfaces_max_depth_with_partial_path() {
        let snapshot = build(splice_loop());
        let report = trace_otdr(&snapshot, &StartPoint::fiber("a", 1, 1, CableEnd::To), 1.0e9)
            .unwrap();
        let Some(OtdrResult::MaxDepthReached {
            partial_path,
            traversed_m,
        }) = report.single()
        else {
            panic!("expected depth guard, got {report:?}");
        };
        assert!(!partial_path.is_empty());
        assert!(*traversed_m > 0.0);
        assert!(report.truncated);
    }

    #[test]
    fn test_locate_on_cable() {
        let snapshot = build(two_cable_cto());
        let fiber = FiberRef::new("c2", 1, 1);
        let end = locate_on_cable(&snapshot, &fiber, CableEnd::From, 500.0).unwrap();
        assert!(matches!(end, OtdrResult::InCable { length_left_m, .. } if length_left_m == 500.0));

        let beyond = locate_on_cable(&snapshot, &fiber, CableEnd::From, 620.0).unwrap();
        assert_eq!(
            beyond,
            OtdrResult::DistanceExceedsLength {
                cable: "c2".into(),
                max_reachable_m: 500.0
            }
        );
    }

    #[test]
    fn test_invalid_probe_distance() {
        let snapshot = build(two_cable_cto());
        let err = trace_otdr(&snapshot, &from_c1_start(), -5.0).unwrap_err();
        assert!(matches!(err, FiberError::InvalidProbe(_)));
    }
}
